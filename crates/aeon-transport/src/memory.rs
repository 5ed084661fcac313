//! In-memory transport hub.
//!
//! Every endpoint registered on a hub can reach every other endpoint.
//! Delivery is a synchronous call into the receiver's handler, so send
//! ordering between any two nodes matches call order, which is what the
//! beacon's FIFO assumptions expect from a transport.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use aeon_core::{BeaconError, Identity, Result};

use crate::{Delivery, Endpoint, Handler};

#[derive(Default)]
struct HubState {
    handlers: HashMap<Identity, Handler>,
}

/// Shared fabric connecting [`MemoryEndpoint`]s.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint for `identity` on this hub. The endpoint is
    /// reachable once a handler is subscribed.
    pub fn endpoint(&self, identity: Identity) -> MemoryEndpoint {
        MemoryEndpoint {
            identity,
            hub: self.clone(),
        }
    }

    fn deliver(&self, from: &Identity, to: &Identity, payload: &[u8]) -> Option<Delivery> {
        // Clone the handler out so no lock is held during delivery.
        let handler = self.state.lock().handlers.get(to).cloned()?;
        Some(handler(from, payload))
    }

    fn peers_of(&self, from: &Identity) -> Vec<(Identity, Handler)> {
        self.state
            .lock()
            .handlers
            .iter()
            .filter(|(identity, _)| *identity != from)
            .map(|(identity, handler)| (*identity, handler.clone()))
            .collect()
    }
}

/// One node's attachment to a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryEndpoint {
    identity: Identity,
    hub: MemoryHub,
}

impl Endpoint for MemoryEndpoint {
    fn local_identity(&self) -> Identity {
        self.identity
    }

    fn broadcast(&self, payload: &[u8]) -> Result<()> {
        for (peer, handler) in self.hub.peers_of(&self.identity) {
            let delivery = handler(&self.identity, payload);
            trace!(from = %self.identity, to = %peer, ?delivery, "broadcast delivery");
        }
        Ok(())
    }

    fn send_to(&self, to: &Identity, payload: &[u8]) -> Result<Delivery> {
        self.hub
            .deliver(&self.identity, to, payload)
            .ok_or_else(|| BeaconError::transport(format!("peer {to} is not attached")))
    }

    fn subscribe(&self, handler: Handler) {
        self.hub
            .state
            .lock()
            .handlers
            .insert(self.identity, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use rand::rngs::OsRng;

    fn collecting_endpoint(
        hub: &MemoryHub,
    ) -> (MemoryEndpoint, Arc<PlMutex<Vec<(Identity, Vec<u8>)>>>) {
        let endpoint = hub.endpoint(Identity::random(&mut OsRng));
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        endpoint.subscribe(Arc::new(move |from, payload| {
            sink.lock().push((*from, payload.to_vec()));
            Delivery::Accepted
        }));
        (endpoint, seen)
    }

    #[test]
    fn broadcast_reaches_everyone_but_the_sender() {
        let hub = MemoryHub::new();
        let (a, seen_a) = collecting_endpoint(&hub);
        let (_b, seen_b) = collecting_endpoint(&hub);
        let (_c, seen_c) = collecting_endpoint(&hub);

        a.broadcast(b"hello").unwrap();

        assert!(seen_a.lock().is_empty());
        assert_eq!(seen_b.lock().len(), 1);
        assert_eq!(seen_c.lock().len(), 1);
        assert_eq!(seen_b.lock()[0], (a.local_identity(), b"hello".to_vec()));
    }

    #[test]
    fn send_to_returns_the_receivers_ack() {
        let hub = MemoryHub::new();
        let (a, _) = collecting_endpoint(&hub);
        let rejecting = hub.endpoint(Identity::random(&mut OsRng));
        rejecting.subscribe(Arc::new(|_, _| Delivery::Rejected));

        let ack = a
            .send_to(&rejecting.local_identity(), b"payload")
            .unwrap();
        assert_eq!(ack, Delivery::Rejected);
    }

    #[test]
    fn send_to_unknown_peer_is_a_transport_error() {
        let hub = MemoryHub::new();
        let (a, _) = collecting_endpoint(&hub);
        let stranger = Identity::random(&mut OsRng);
        assert!(matches!(
            a.send_to(&stranger, b"payload"),
            Err(BeaconError::Transport { .. })
        ));
    }

    #[test]
    fn messages_between_two_nodes_keep_order() {
        let hub = MemoryHub::new();
        let (a, _) = collecting_endpoint(&hub);
        let (b, seen_b) = collecting_endpoint(&hub);

        for i in 0u8..5 {
            a.send_to(&b.local_identity(), &[i]).unwrap();
        }
        let seen: Vec<u8> = seen_b.lock().iter().map(|(_, p)| p[0]).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
