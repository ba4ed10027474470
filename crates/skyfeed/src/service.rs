// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver service: wires the threads together.
//!
//! ```text
//!  skyfeed-udp-rx ---> fragment ring ---> skyfeed-video ---> sink ---> consumer
//!
//!  skyfeed-session (supervisor) -- drain / keepalive per attempt
//! ```
//!
//! The video endpoint is bound before the first control attempt and stays
//! up across reconnects.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::config::StreamConfig;
use crate::ctp::Telemetry;
use crate::error::Result;
use crate::pipeline::{PipelineConfig, PipelineStats, VideoPipeline};
use crate::session::{CommandLink, SessionManager, SessionMonitor, SessionState};
use crate::shutdown::Shutdown;
use crate::sink::{FrameConsumer, SinkFactory};
use crate::video::{
    fragment_ring, FragmentListener, FragmentSender, ListenerStats, QueueStats, ReassemblerConfig,
    ReassemblerStats,
};

/// Point-in-time view of every counter in the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub session: SessionState,
    pub handshakes: u64,
    pub disconnects: u64,
    pub keepalives: u64,
    pub last_keepalive: Option<Instant>,
    pub datagrams: u64,
    pub bytes: u64,
    pub queue: QueueStats,
    pub reassembly: ReassemblerStats,
    pub units_submitted: u64,
    pub frames_decoded: u64,
    pub sink_failures: u64,
}

pub struct StreamService;

impl StreamService {
    /// Validate `config`, bind the video endpoint and start all threads.
    pub fn start(
        config: StreamConfig,
        sink_factory: impl SinkFactory + 'static,
        consumer: impl FrameConsumer + 'static,
    ) -> Result<StreamHandle> {
        config.validate()?;

        let shutdown = Shutdown::new();
        let (fragments_tx, fragments_rx) = fragment_ring(config.queue_capacity);
        let listener = FragmentListener::bind(&config, fragments_tx.clone())?;
        let pipeline = VideoPipeline::new(
            PipelineConfig::from(&config),
            ReassemblerConfig::from(&config),
            fragments_rx,
            sink_factory,
            consumer,
        );
        let session = SessionManager::new(config.clone(), shutdown.clone());

        let mut handle = StreamHandle {
            video_addr: listener.local_addr(),
            listener: listener.stats(),
            pipeline: pipeline.stats(),
            fragments: fragments_tx,
            monitor: session.monitor(),
            commands: session.command_link(),
            shutdown: shutdown.clone(),
            threads: Vec::with_capacity(3),
        };

        // A spawn failure drops `handle`, which stops what already started.
        handle.threads.push(listener.spawn(shutdown.clone())?);
        handle.threads.push(pipeline.spawn(shutdown)?);
        handle.threads.push(session.spawn()?);

        log::info!(
            "[skyfeed] receiving from {} (video on {})",
            config.control_addr(),
            handle.video_addr
        );
        Ok(handle)
    }
}

/// Running service. Shuts down on drop.
pub struct StreamHandle {
    video_addr: SocketAddr,
    listener: Arc<ListenerStats>,
    pipeline: Arc<PipelineStats>,
    fragments: FragmentSender,
    monitor: Arc<SessionMonitor>,
    commands: CommandLink,
    shutdown: Shutdown,
    threads: Vec<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn session(&self) -> Arc<SessionMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn command_link(&self) -> CommandLink {
        self.commands.clone()
    }

    pub fn telemetry(&self) -> Option<Telemetry> {
        self.monitor.telemetry()
    }

    /// Bound video endpoint.
    pub fn video_addr(&self) -> SocketAddr {
        self.video_addr
    }

    /// The signal the service threads poll; trigger it to stop them.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            session: self.monitor.state(),
            handshakes: self.monitor.handshakes(),
            disconnects: self.monitor.disconnects(),
            keepalives: self.monitor.keepalives(),
            last_keepalive: self.monitor.last_keepalive(),
            datagrams: self.listener.datagrams.load(Ordering::Relaxed),
            bytes: self.listener.bytes.load(Ordering::Relaxed),
            queue: self.fragments.stats(),
            reassembly: self.pipeline.reassembly(),
            units_submitted: self.pipeline.units_submitted.load(Ordering::Relaxed),
            frames_decoded: self.pipeline.frames_decoded.load(Ordering::Relaxed),
            sink_failures: self.pipeline.sink_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop every thread and wait for them. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        for thread in self.threads.drain(..) {
            let name = thread.thread().name().unwrap_or("<unnamed>").to_string();
            if thread.join().is_err() {
                log::error!("[skyfeed] thread {} panicked", name);
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
