//! relive library crate.
//!
//! Ingests live stream URLs, validates liveness, and supervises external
//! transcoder processes that proxy or record the streams. The
//! [`supervisor::StreamSupervisor`] is the public surface; everything else
//! backs it.

pub mod collaborator;
pub mod config;
pub mod detect;
pub mod domain;
pub mod error;
pub mod logging;
pub mod probe;
pub mod process;
pub mod registry;
pub mod repair;
pub mod resolve;
pub mod supervisor;
pub mod transcode;

pub use error::{Error, Result};
