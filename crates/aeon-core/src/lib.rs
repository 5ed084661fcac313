//! Shared types for the Aeon random beacon.
//!
//! This crate carries the vocabulary the other beacon crates agree on:
//! member identity and cabinet descriptions, the unified [`BeaconError`]
//! taxonomy, the [`Progress`] poll type returned by the cooperative state
//! machines, bounded inbound queues, and the setup timetable. It contains
//! no cryptography and performs no I/O.

pub mod config;
pub mod errors;
pub mod identity;
pub mod progress;
pub mod queue;

pub use config::SetupTimetable;
pub use errors::{BeaconError, Result};
pub use identity::{Cabinet, Identity, ParticipantId};
pub use progress::Progress;
pub use queue::BoundedQueue;
