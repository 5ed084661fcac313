//! Transport capability consumed by the beacon.
//!
//! The beacon does not own networking. It assumes an endpoint that can
//! broadcast to the current cabinet, send a payload to one peer with a
//! delivery acknowledgement, and hand inbound payloads to a subscribed
//! handler. Authentication, encryption, and peer management belong to
//! whatever implements [`Endpoint`]; the [`MemoryHub`] here exists for
//! tests and single-process composition.

pub mod memory;

use std::sync::Arc;

use aeon_core::{Identity, Result};

pub use memory::{MemoryEndpoint, MemoryHub};

/// Outcome of handing a payload to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The peer accepted the payload.
    Accepted,
    /// The peer refused the payload; the sender may retry later.
    Rejected,
}

impl Delivery {
    /// Whether the payload was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Inbound payload handler. Called on the transport's thread, so it must
/// only do cheap work such as pushing into a bounded queue; the returned
/// [`Delivery`] becomes the sender's acknowledgement.
pub type Handler = Arc<dyn Fn(&Identity, &[u8]) -> Delivery + Send + Sync>;

/// A node's connection to its peers.
pub trait Endpoint: Send + Sync {
    /// Identity this endpoint speaks as.
    fn local_identity(&self) -> Identity;

    /// Deliver `payload` to every reachable peer, best effort. No
    /// acknowledgement; broadcast consumers must tolerate loss.
    fn broadcast(&self, payload: &[u8]) -> Result<()>;

    /// Deliver `payload` to one peer and report whether the peer
    /// accepted it. An unreachable peer is a transport error.
    fn send_to(&self, to: &Identity, payload: &[u8]) -> Result<Delivery>;

    /// Install the inbound handler, replacing any previous one.
    fn subscribe(&self, handler: Handler);
}
