//! Distributed random beacon.
//!
//! A *cabinet* of nodes runs a distributed key generation to establish a
//! shared BLS threshold key, then produces one publicly verifiable random
//! value per round by combining partial signatures over a chained round
//! seed. Cabinets succeed each other in strictly increasing generations.
//!
//! The moving parts:
//!
//! - [`CabinetSetupCoordinator`] drives the key-generation handshake for
//!   queued cabinets, one at a time.
//! - [`Round`] accumulates partial signatures for a single round and
//!   recovers the group signature and its entropy.
//! - [`CabinetRotationScheduler`] owns cabinet succession and the
//!   per-round entropy pipeline.
//! - [`BeaconNode`] wires the above to a transport endpoint.
//!
//! All state machines are poll-driven: callers invoke `step` and get a
//! [`Progress`](aeon_core::Progress) back; nothing blocks or sleeps.

pub mod aeon;
pub mod messages;
pub mod node;
pub mod round;
pub mod scheduler;
pub mod setup;

pub use aeon::AeonExecutionUnit;
pub use messages::{CabinetMemberDetails, Envelope, EntropyRecord, ShareSubmission, SignatureShare};
pub use node::BeaconNode;
pub use round::{Entropy, Round};
pub use scheduler::{BeaconState, CabinetRotationScheduler, GENESIS_SEED};
pub use setup::{CabinetSetupCoordinator, SetupState, SetupStatus};
