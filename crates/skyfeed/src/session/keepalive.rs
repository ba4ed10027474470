// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keepalive task.
//!
//! Sends an empty-parameter `CTP_KEEP_ALIVE` on a fixed cadence while the
//! attempt it belongs to is current. Each send of a live attempt is recorded
//! on the session monitor. A failed send reports a disconnect and ends the
//! task.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::generation::DisconnectSignal;
use super::link::ControlLink;
use super::state::SessionMonitor;
use crate::ctp::ControlMessage;
use crate::error::Error;
use crate::shutdown::Shutdown;

/// Handle to a running keepalive thread.
///
/// Dropping the handle stops the thread and waits for it.
pub(crate) struct KeepaliveHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl KeepaliveHandle {
    /// Stop the task. The pending wait returns as soon as the stop channel
    /// disconnects.
    pub(crate) fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for KeepaliveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn spawn(
    link: Arc<ControlLink>,
    interval: Duration,
    signal: DisconnectSignal,
    monitor: Arc<SessionMonitor>,
    shutdown: Shutdown,
) -> Result<KeepaliveHandle, Error> {
    let keepalive = ControlMessage::KeepAlive.to_frame()?.encode(link.order())?;
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);

    let thread = thread::Builder::new()
        .name("skyfeed-ctp-keepalive".to_string())
        .spawn(move || {
            let attempt = signal.attempt().id();
            log::debug!(
                "[CTP] keepalive started for attempt {} (every {:?})",
                attempt,
                interval
            );
            let mut sent: u64 = 0;

            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if shutdown.is_triggered() || !signal.attempt().is_current() {
                    break;
                }

                match link.send_raw(&keepalive) {
                    Ok(()) => {
                        sent += 1;
                        // Retired while the write was in flight: not this
                        // session's keepalive any more.
                        if signal.attempt().is_current() {
                            monitor.record_keepalive(Instant::now());
                        }
                        log::trace!("[CTP] -> CTP_KEEP_ALIVE #{}", sent);
                    }
                    Err(e) => {
                        log::warn!("[CTP] keepalive failed: {}", e);
                        signal.raise(e);
                        break;
                    }
                }
            }

            log::debug!(
                "[CTP] keepalive for attempt {} stopped after {} sends",
                attempt,
                sent
            );
        })
        .map_err(|source| Error::Thread {
            name: "skyfeed-ctp-keepalive",
            source,
        })?;

    Ok(KeepaliveHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    })
}
