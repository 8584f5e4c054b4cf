//! Shared table of stream records and live process handles.
//!
//! The registry is the only shared mutable structure. All access goes
//! through short critical sections on the underlying maps; no lock is ever
//! held across an await point. The per-(stream, role) handle slot enforces
//! the "at most one live process per role" invariant, and guarded removal
//! keeps a superseded monitor from severing its successor's handle.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Result;
use crate::collaborator::CollaboratorTask;
use crate::domain::{StreamRecord, StreamSnapshot, StreamStatus};
use crate::error::Error;
use crate::process::{ProcessHandle, ProcessRole};

type HandleKey = (Uuid, ProcessRole);

/// A handle slot is reserved while a launch is in flight, so a concurrent
/// second start fails fast instead of racing the spawn.
#[derive(Debug)]
enum HandleSlot {
    Reserved(Uuid),
    Live(Arc<ProcessHandle>),
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    records: DashMap<Uuid, StreamRecord>,
    handles: DashMap<HandleKey, HandleSlot>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- records ---

    pub fn insert(&self, record: StreamRecord) -> Uuid {
        let id = record.id;
        self.records.insert(id, record);
        id
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.contains_key(id)
    }

    /// Remove a record, returning it (with its collaborator task) so the
    /// caller can finish cleanup. `None` for unknown ids.
    pub fn remove(&self, id: &Uuid) -> Option<StreamRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn get(&self, id: &Uuid) -> Option<StreamSnapshot> {
        let is_recording = self.is_role_live(id, ProcessRole::Recording);
        self.records
            .get(id)
            .map(|record| record.snapshot(is_recording))
    }

    pub fn list(&self) -> Vec<StreamSnapshot> {
        self.records
            .iter()
            .map(|entry| {
                let is_recording = self.is_role_live(entry.key(), ProcessRole::Recording);
                entry.value().snapshot(is_recording)
            })
            .collect()
    }

    /// Run a closure against a mutable record. Keep closures small: the
    /// entry lock is held for their whole duration.
    pub fn with_record<R>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut StreamRecord) -> R,
    ) -> Option<R> {
        self.records.get_mut(id).map(|mut record| f(&mut record))
    }

    /// Checked status transition; `NotFound` for unknown ids.
    pub fn transition(&self, id: &Uuid, to: StreamStatus) -> Result<StreamStatus> {
        self.with_record(id, |record| {
            let next = record.status.transition_to(to)?;
            record.status = next;
            Ok(next)
        })
        .unwrap_or_else(|| Err(Error::not_found("stream", id)))
    }

    pub fn status(&self, id: &Uuid) -> Option<StreamStatus> {
        self.with_record(id, |record| record.status)
    }

    pub fn source(&self, id: &Uuid) -> Option<crate::domain::StreamSource> {
        self.with_record(id, |record| record.source.clone())
    }

    pub fn recording_path(&self, id: &Uuid) -> Option<PathBuf> {
        self.with_record(id, |record| record.recording_path.clone())
            .flatten()
    }

    pub fn attach_collaborator(
        &self,
        id: &Uuid,
        task: CollaboratorTask,
    ) -> Result<Option<CollaboratorTask>> {
        self.with_record(id, |record| record.collaborator.replace(task))
            .ok_or_else(|| Error::not_found("stream", id))
    }

    pub fn take_collaborator(&self, id: &Uuid) -> Option<CollaboratorTask> {
        self.with_record(id, |record| record.take_collaborator())
            .flatten()
    }

    // --- handle slots ---

    /// Reserve the (stream, role) slot for an in-flight launch. Fails with
    /// `AlreadyRunning` when any reservation or live handle occupies it.
    pub fn reserve(self: &Arc<Self>, stream_id: Uuid, role: ProcessRole) -> Result<HandleReservation> {
        let token = Uuid::new_v4();
        match self.handles.entry((stream_id, role)) {
            Entry::Occupied(_) => Err(Error::already_running(stream_id, role)),
            Entry::Vacant(slot) => {
                slot.insert(HandleSlot::Reserved(token));
                Ok(HandleReservation {
                    registry: Arc::clone(self),
                    key: (stream_id, role),
                    token,
                    committed: false,
                })
            }
        }
    }

    fn commit_reservation(&self, key: HandleKey, handle: Arc<ProcessHandle>) {
        self.handles.insert(key, HandleSlot::Live(handle));
    }

    fn release_reservation(&self, key: HandleKey, token: Uuid) {
        self.handles
            .remove_if(&key, |_, slot| matches!(slot, HandleSlot::Reserved(t) if *t == token));
    }

    pub fn live_handle(&self, stream_id: &Uuid, role: ProcessRole) -> Option<Arc<ProcessHandle>> {
        self.handles
            .get(&(*stream_id, role))
            .and_then(|slot| match slot.value() {
                HandleSlot::Live(handle) => Some(Arc::clone(handle)),
                HandleSlot::Reserved(_) => None,
            })
    }

    pub fn is_role_live(&self, stream_id: &Uuid, role: ProcessRole) -> bool {
        self.live_handle(stream_id, role).is_some()
    }

    /// Live handles of both roles for one stream.
    pub fn handles_for(&self, stream_id: &Uuid) -> Vec<Arc<ProcessHandle>> {
        [ProcessRole::Recording, ProcessRole::Proxy]
            .into_iter()
            .filter_map(|role| self.live_handle(stream_id, role))
            .collect()
    }

    /// Every live handle across every stream.
    pub fn live_handles(&self) -> Vec<Arc<ProcessHandle>> {
        self.handles
            .iter()
            .filter_map(|entry| match entry.value() {
                HandleSlot::Live(handle) => Some(Arc::clone(handle)),
                HandleSlot::Reserved(_) => None,
            })
            .collect()
    }

    /// A monitor removing its own handle on exit. The slot is only cleared
    /// when it still holds this exact handle; a superseded monitor must not
    /// touch its successor's entry.
    pub fn remove_handle_if_current(&self, handle: &ProcessHandle) -> bool {
        let key = (handle.stream_id(), handle.role());
        let removed = self
            .handles
            .remove_if(&key, |_, slot| {
                matches!(slot, HandleSlot::Live(current) if current.id() == handle.id())
            })
            .is_some();

        if removed {
            debug!(
                stream_id = %handle.stream_id(),
                role = %handle.role(),
                "Removed process handle"
            );
        } else {
            warn!(
                stream_id = %handle.stream_id(),
                role = %handle.role(),
                "Process handle was superseded; leaving successor untouched"
            );
        }
        removed
    }
}

/// Reservation of one (stream, role) handle slot. Dropping an uncommitted
/// reservation releases the slot, so failed launches cannot wedge a role.
pub struct HandleReservation {
    registry: Arc<StreamRegistry>,
    key: HandleKey,
    token: Uuid,
    committed: bool,
}

impl HandleReservation {
    /// Replace the reservation with the live handle.
    pub fn commit(mut self, handle: Arc<ProcessHandle>) {
        self.registry.commit_reservation(self.key, handle);
        self.committed = true;
    }
}

impl Drop for HandleReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.release_reservation(self.key, self.token);
        }
    }
}
