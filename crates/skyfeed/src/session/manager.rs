// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconnect supervisor.
//!
//! Runs one connection attempt at a time:
//!
//! 1. connect the control transport (bounded timeout)
//! 2. start the inbound drain, send `APP_ACCESS`, wait the handshake gap,
//!    send `OPEN_RT_STREAM`
//! 3. start the keepalive and wait for a disconnect report or shutdown
//! 4. tear the attempt down, wait the reconnect delay, go again
//!
//! Failures at any step are logged and retried; only shutdown ends the loop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::RecvTimeoutError;

use super::command::{ActiveLink, CommandLink};
use super::drain::{self, DrainHandle};
use super::generation::{AttemptContext, DisconnectSignal, Generation};
use super::keepalive::{self, KeepaliveHandle};
use super::link::ControlLink;
use super::state::{SessionMonitor, SessionState};
use crate::config::StreamConfig;
use crate::ctp::ControlMessage;
use crate::error::{Error, TransportError};
use crate::shutdown::Shutdown;

/// Sequential control-session supervisor.
pub struct SessionManager {
    config: StreamConfig,
    monitor: Arc<SessionMonitor>,
    generation: Generation,
    active: ActiveLink,
    shutdown: Shutdown,
}

impl SessionManager {
    pub fn new(config: StreamConfig, shutdown: Shutdown) -> Self {
        Self {
            config,
            monitor: Arc::new(SessionMonitor::new()),
            generation: Generation::new(),
            active: ActiveLink::default(),
            shutdown,
        }
    }

    pub fn monitor(&self) -> Arc<SessionMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn command_link(&self) -> CommandLink {
        CommandLink::new(Arc::clone(&self.active))
    }

    /// Run the supervisor on a named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, Error> {
        thread::Builder::new()
            .name("skyfeed-session".to_string())
            .spawn(move || self.run())
            .map_err(|source| Error::Thread {
                name: "skyfeed-session",
                source,
            })
    }

    /// Supervisor loop. Returns once shutdown is requested.
    pub fn run(&self) {
        log::info!(
            "[CTP] session supervisor started for {}",
            self.config.control_addr()
        );

        while !self.shutdown.is_triggered() {
            let attempt = self.generation.begin();
            self.monitor.begin_attempt(attempt.id());
            log::debug!("[CTP] attempt {} starting", attempt.id());

            match self.run_attempt(&attempt) {
                Ok(Some(reason)) => log::warn!("[CTP] session lost: {}", reason),
                Ok(None) => {}
                Err(e) => log::warn!("[CTP] attempt {} failed: {}", attempt.id(), e),
            }
            self.monitor.set_state(SessionState::Disconnected);

            if self.shutdown.is_triggered() {
                break;
            }
            log::info!(
                "[CTP] reconnecting in {:?}",
                self.config.reconnect_delay()
            );
            if !self
                .shutdown
                .sleep(self.config.reconnect_delay(), self.config.io_timeout())
            {
                break;
            }
        }

        self.monitor.set_state(SessionState::Disconnected);
        log::info!("[CTP] session supervisor stopped");
    }

    /// One attempt. `Ok(None)` means shutdown was requested mid-attempt.
    fn run_attempt(&self, attempt: &AttemptContext) -> Result<Option<TransportError>, Error> {
        let poll = self.config.io_timeout();

        self.monitor.set_state(SessionState::Connecting);
        let link = Arc::new(ControlLink::connect(
            self.config.control_addr(),
            self.config.connect_timeout(),
            poll,
        )?);
        let mut resources = AttemptResources::new(self, attempt.clone(), Arc::clone(&link));
        let (signal, disconnected) = DisconnectSignal::new(attempt.clone());

        self.monitor.set_state(SessionState::Handshaking);
        resources.drain = Some(drain::spawn(
            link.reader()?,
            signal.clone(),
            self.monitor(),
            self.shutdown.clone(),
        )?);

        link.send(&ControlMessage::access(&self.config))?;
        if !self.shutdown.sleep(self.config.handshake_gap(), poll) {
            return Ok(None);
        }
        link.send(&ControlMessage::open_stream(&self.config))?;

        if let Ok(reason) = disconnected.try_recv() {
            return Ok(Some(reason));
        }

        *self.active.write() = Some(Arc::clone(&link));
        self.monitor.record_handshake();
        log::info!(
            "[CTP] streaming {}x{}@{} from {} (attempt {})",
            self.config.width,
            self.config.height,
            self.config.fps,
            link.peer(),
            attempt.id()
        );

        resources.keepalive = Some(keepalive::spawn(
            Arc::clone(&link),
            self.config.keepalive_interval(),
            signal,
            self.monitor(),
            self.shutdown.clone(),
        )?);

        loop {
            match disconnected.recv_timeout(poll) {
                Ok(reason) => return Ok(Some(reason)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shutdown.is_triggered() {
                        return Ok(None);
                    }
                }
                // Every task exited without reporting; treat as closed.
                Err(RecvTimeoutError::Disconnected) => return Ok(Some(TransportError::Closed)),
            }
        }
    }
}

/// Everything an attempt started. Dropping it tears the attempt down.
struct AttemptResources<'a> {
    manager: &'a SessionManager,
    attempt: AttemptContext,
    link: Arc<ControlLink>,
    drain: Option<DrainHandle>,
    keepalive: Option<KeepaliveHandle>,
}

impl<'a> AttemptResources<'a> {
    fn new(manager: &'a SessionManager, attempt: AttemptContext, link: Arc<ControlLink>) -> Self {
        Self {
            manager,
            attempt,
            link,
            drain: None,
            keepalive: None,
        }
    }
}

impl Drop for AttemptResources<'_> {
    fn drop(&mut self) {
        self.manager.monitor.set_state(SessionState::Closing);

        // Retire first so no task acts on this attempt while it unwinds.
        self.attempt.retire();
        self.manager.active.write().take();

        if let Some(mut keepalive) = self.keepalive.take() {
            keepalive.stop();
        }
        self.link.close();
        if let Some(mut drain) = self.drain.take() {
            drain.join();
        }

        log::debug!("[CTP] attempt {} torn down", self.attempt.id());
    }
}
