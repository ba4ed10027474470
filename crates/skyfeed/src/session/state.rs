// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session state and its observable cell.
//!
//! ```text
//!      +-------------+
//!      |Disconnected |<-----------------------------+
//!      +------+------+                              |
//!             | supervisor attempt                  | reconnect delay
//!             v                                     |
//!      +-------------+                              |
//!      | Connecting  |--(connect failed)----------->+
//!      +------+------+                              |
//!             | connected                           |
//!             v                                     |
//!      +-------------+                              |
//!      | Handshaking |--(send failed)-------+       |
//!      +------+------+                      |       |
//!             | access + open-stream sent   |       |
//!             v                             v       |
//!      +-------------+  (error/EOF)   +-----------+ |
//!      |  Streaming  |--------------->|  Closing  |-+
//!      +-------------+                +-----------+
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::ctp::Telemetry;

/// Control session state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection; waiting for the next attempt.
    #[default]
    Disconnected,
    /// Opening the reliable transport.
    Connecting,
    /// Sending access and open-stream requests.
    Handshaking,
    /// Stream open, keepalive running.
    Streaming,
    /// Tearing down the failed attempt.
    Closing,
}

impl SessionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Handshaking => "Handshaking",
            SessionState::Streaming => "Streaming",
            SessionState::Closing => "Closing",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    state: SessionState,
    generation: u64,
    handshakes: u64,
    disconnects: u64,
    keepalives: u64,
    last_keepalive: Option<Instant>,
}

/// Shared view of the session, written by the supervisor and read by
/// anyone holding an `Arc` to it.
#[derive(Debug, Default)]
pub struct SessionMonitor {
    inner: Mutex<Snapshot>,
    changed: Condvar,
    telemetry: RwLock<Option<Telemetry>>,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Generation of the most recent connection attempt (0 before the first).
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Completed handshakes across all attempts.
    pub fn handshakes(&self) -> u64 {
        self.inner.lock().handshakes
    }

    /// Streaming sessions that were lost.
    pub fn disconnects(&self) -> u64 {
        self.inner.lock().disconnects
    }

    /// Keepalives sent across all attempts.
    pub fn keepalives(&self) -> u64 {
        self.inner.lock().keepalives
    }

    /// When the last keepalive of a live attempt went out.
    pub fn last_keepalive(&self) -> Option<Instant> {
        self.inner.lock().last_keepalive
    }

    /// Latest flight telemetry pushed by the device, if any.
    pub fn telemetry(&self) -> Option<Telemetry> {
        *self.telemetry.read()
    }

    /// Block until the session reaches `state` or `timeout` elapses.
    pub fn wait_for(&self, state: SessionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state != state {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.state == state;
            }
        }
        true
    }

    /// Block until at least `count` handshakes completed or `timeout` elapses.
    pub fn wait_for_handshakes(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.handshakes < count {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.handshakes >= count;
            }
        }
        true
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let mut inner = self.inner.lock();
        if inner.state == state {
            return;
        }
        log::debug!("[CTP] session {} -> {}", inner.state, state);
        if inner.state == SessionState::Streaming {
            inner.disconnects += 1;
        }
        inner.state = state;
        drop(inner);
        self.changed.notify_all();
    }

    pub(crate) fn begin_attempt(&self, generation: u64) {
        self.inner.lock().generation = generation;
        self.changed.notify_all();
    }

    pub(crate) fn record_handshake(&self) {
        let mut inner = self.inner.lock();
        inner.handshakes += 1;
        inner.state = SessionState::Streaming;
        drop(inner);
        self.changed.notify_all();
    }

    pub(crate) fn record_keepalive(&self, at: Instant) {
        let mut inner = self.inner.lock();
        inner.keepalives += 1;
        inner.last_keepalive = Some(at);
    }

    pub(crate) fn record_telemetry(&self, telemetry: Telemetry) {
        *self.telemetry.write() = Some(telemetry);
    }
}
