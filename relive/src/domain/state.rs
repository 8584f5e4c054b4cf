//! Stream state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Operational states of a tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// The stream has been classified but liveness is not confirmed yet.
    #[default]
    PendingValidation,
    /// The stream is validated live and idle (no recording in progress).
    Active,
    /// A recording process is attached to the stream.
    Recording,
    /// A supervised process failed at runtime.
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingValidation => "pending_validation",
            Self::Active => "active",
            Self::Recording => "recording",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_validation" => Some(Self::PendingValidation),
            "active" => Some(Self::Active),
            "recording" => Some(Self::Recording),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: StreamStatus) -> bool {
        use StreamStatus::*;

        match (self, target) {
            // Same state is always allowed
            (from, to) if from == &to => true,

            (PendingValidation, Active | Error) => true,

            (Active, Recording | Error) => true,

            (Recording, Active | Error) => true,

            // Errors recover when a later operation succeeds
            (Error, Active) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: StreamStatus) -> Result<StreamStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
