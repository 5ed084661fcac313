//! Unified error taxonomy for beacon operations.
//!
//! Every failure surfaced by the beacon crates falls into one of a small
//! number of classes so that callers can decide between ignoring a peer,
//! aborting a cabinet, or fixing their own input.

use std::time::Duration;

/// Unified error type for beacon operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BeaconError {
    /// A well-formed message from a peer violates the protocol, for
    /// example a share that fails verification or conflicting member
    /// details. Attributable to the sender; the local node keeps going.
    #[error("protocol violation: {message}")]
    ProtocolViolation {
        /// What the peer did wrong
        message: String,
    },

    /// A message or parameter that could not be decoded or fails basic
    /// shape checks before any protocol logic runs.
    #[error("malformed input: {message}")]
    MalformedInput {
        /// What failed to parse or validate
        message: String,
    },

    /// Previously validated state failed re-validation. Indicates a local
    /// bug or memory corruption, never peer behaviour.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Which internal assumption broke
        message: String,
    },

    /// A waiting state exceeded its configured deadline.
    #[error("stalled in {state} after {elapsed:?}")]
    Stalled {
        /// Name of the state that timed out
        state: String,
        /// Time spent in that state
        elapsed: Duration,
    },

    /// The requested value is not available yet.
    #[error("not ready: {message}")]
    NotReady {
        /// What is still outstanding
        message: String,
    },

    /// The transport refused or failed an operation.
    #[error("transport error: {message}")]
    Transport {
        /// What the transport reported
        message: String,
    },
}

impl BeaconError {
    /// Create a protocol violation error.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a malformed input error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create a stall report for a timed-out waiting state.
    pub fn stalled(state: impl Into<String>, elapsed: Duration) -> Self {
        Self::Stalled {
            state: state.into(),
            elapsed,
        }
    }

    /// Create a not-ready error.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Standard result type for beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;
