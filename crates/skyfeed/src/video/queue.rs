// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded drop-oldest fragment ring.
//!
//! The only structure shared between the datagram receiver and the
//! reassembly loop. On overflow the oldest queued datagram is discarded in
//! favour of the newest: for live video a stale frame is worse than a gap.
//!
//! The ring has exactly one consumer, enforced by [`FragmentReceiver`] not
//! being `Clone`. Producers wake the consumer through a parker so an idle
//! consumer does not spin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use crossbeam::sync::{Parker, Unparker};

/// Ring counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Datagrams accepted.
    pub pushed: u64,
    /// Datagrams discarded to make room for newer ones.
    pub dropped: u64,
    /// Datagrams currently queued.
    pub depth: usize,
}

struct Ring {
    queue: ArrayQueue<Vec<u8>>,
    unparker: Unparker,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

/// Create a ring of `capacity` datagrams.
///
/// # Panics
///
/// Panics if `capacity` is zero (rejected earlier by config validation).
pub fn fragment_ring(capacity: usize) -> (FragmentSender, FragmentReceiver) {
    let parker = Parker::new();
    let ring = Arc::new(Ring {
        queue: ArrayQueue::new(capacity),
        unparker: parker.unparker().clone(),
        pushed: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });
    (
        FragmentSender {
            ring: Arc::clone(&ring),
        },
        FragmentReceiver { ring, parker },
    )
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct FragmentSender {
    ring: Arc<Ring>,
}

impl FragmentSender {
    /// Push a datagram, evicting the oldest one if the ring is full.
    ///
    /// Returns `true` if an older datagram was dropped.
    pub fn push(&self, datagram: Vec<u8>) -> bool {
        let evicted = self.ring.queue.force_push(datagram).is_some();
        self.ring.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.ring.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ring.unparker.unpark();
        evicted
    }

    pub fn stats(&self) -> QueueStats {
        self.ring.stats()
    }
}

/// Consumer side. Not `Clone`: the ring has a single consumer.
pub struct FragmentReceiver {
    ring: Arc<Ring>,
    parker: Parker,
}

impl FragmentReceiver {
    /// Pop the oldest datagram without blocking.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.ring.queue.pop()
    }

    /// Pop the oldest datagram, waiting at most `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        if let Some(datagram) = self.ring.queue.pop() {
            return Some(datagram);
        }
        self.parker.park_timeout(timeout);
        self.ring.queue.pop()
    }

    pub fn capacity(&self) -> usize {
        self.ring.queue.capacity()
    }

    pub fn stats(&self) -> QueueStats {
        self.ring.stats()
    }
}

impl Ring {
    fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth: self.queue.len(),
        }
    }
}
