// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection-attempt generations.
//!
//! Every attempt gets a fresh id. Background tasks hold an
//! [`AttemptContext`] and act only while their id is still the current one,
//! so a straggling task from a torn-down attempt can never touch the next
//! session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::TransportError;

/// Value of `current` when no attempt is live.
const NONE: u64 = 0;

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    current: AtomicU64,
}

/// Issuer of attempt ids. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Generation {
    counters: Arc<Counters>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt, superseding any previous one.
    pub fn begin(&self) -> AttemptContext {
        let id = self.counters.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.current.store(id, Ordering::SeqCst);
        AttemptContext {
            id,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Id of the live attempt, or `None` between attempts.
    pub fn current(&self) -> Option<u64> {
        match self.counters.current.load(Ordering::SeqCst) {
            NONE => None,
            id => Some(id),
        }
    }
}

/// Tag carried by every task spawned for one attempt.
#[derive(Clone, Debug)]
pub struct AttemptContext {
    id: u64,
    counters: Arc<Counters>,
}

impl AttemptContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.counters.current.load(Ordering::SeqCst) == self.id
    }

    /// Invalidate this attempt. No-op if a newer attempt already began.
    pub fn retire(&self) {
        let _ = self.counters.current.compare_exchange(
            self.id,
            NONE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Disconnect notification raised by an attempt's background tasks.
///
/// Only the first failure of a live attempt reaches the supervisor; reports
/// from retired attempts are dropped.
#[derive(Clone, Debug)]
pub(crate) struct DisconnectSignal {
    tx: Sender<TransportError>,
    attempt: AttemptContext,
}

impl DisconnectSignal {
    pub(crate) fn new(attempt: AttemptContext) -> (Self, Receiver<TransportError>) {
        let (tx, rx) = channel::bounded(1);
        (Self { tx, attempt }, rx)
    }

    pub(crate) fn attempt(&self) -> &AttemptContext {
        &self.attempt
    }

    pub(crate) fn raise(&self, reason: TransportError) {
        if !self.attempt.is_current() {
            log::trace!(
                "[CTP] ignoring disconnect from retired attempt {}: {}",
                self.attempt.id(),
                reason
            );
            return;
        }
        let _ = self.tx.try_send(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_attempt_supersedes_old() {
        let generation = Generation::new();
        let first = generation.begin();
        assert!(first.is_current());

        let second = generation.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(second.id(), first.id() + 1);
    }

    #[test]
    fn test_retire_clears_current() {
        let generation = Generation::new();
        let attempt = generation.begin();
        attempt.retire();
        assert!(!attempt.is_current());
        assert_eq!(generation.current(), None);
    }

    #[test]
    fn test_stale_retire_keeps_newer_attempt() {
        let generation = Generation::new();
        let old = generation.begin();
        let new = generation.begin();
        old.retire();
        assert!(new.is_current());
        assert_eq!(generation.current(), Some(new.id()));
    }

    #[test]
    fn test_retired_attempt_cannot_signal() {
        let generation = Generation::new();
        let old = generation.begin();
        let (signal, rx) = DisconnectSignal::new(old.clone());
        let _new = generation.begin();

        signal.raise(TransportError::Closed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_first_disconnect_wins() {
        let generation = Generation::new();
        let (signal, rx) = DisconnectSignal::new(generation.begin());
        signal.raise(TransportError::Closed);
        signal.raise(TransportError::NotConnected);

        assert!(matches!(rx.try_recv(), Ok(TransportError::Closed)));
        assert!(rx.try_recv().is_err());
    }
}
