//! Bounded inbound queues.
//!
//! Network handlers push into these queues and state machines drain them
//! on their own cadence, so no protocol logic ever runs on a transport
//! thread. A full queue rejects the push instead of blocking the caller.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// A bounded multi-producer queue drained in FIFO order.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push an item; returns `false` when the queue is full.
    pub fn push(&self, item: T) -> bool {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(item);
        true
    }

    /// Remove and return all queued items in arrival order.
    pub fn drain(&self) -> Vec<T> {
        let mut queue = self.inner.lock();
        queue.drain(..).collect()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.drain(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn rejects_when_full() {
        let queue = BoundedQueue::new(2);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));
        assert_eq!(queue.len(), 2);
    }
}
