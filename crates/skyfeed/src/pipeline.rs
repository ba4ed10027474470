// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembly + decode loop.
//!
//! The single consumer of the fragment ring. Each iteration pops at most one
//! datagram, feeds the reassembler, submits completed access units to the
//! decode sink and hands decoded frames to the consumer. A failing sink is
//! dropped and recreated after a delay; the loop itself never stops for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::StreamConfig;
use crate::error::{Error, SinkError};
use crate::shutdown::Shutdown;
use crate::sink::{DecodeSink, FrameConsumer, RasterFrame, SinkFactory};
use crate::video::{
    AccessUnit, FragmentReceiver, FrameReassembler, ReassemblerConfig, ReassemblerStats,
};

/// Counters published by the pipeline thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub units_submitted: AtomicU64,
    pub units_dropped: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub sink_starts: AtomicU64,
    pub sink_failures: AtomicU64,
    reassembly: Mutex<ReassemblerStats>,
}

impl PipelineStats {
    /// Latest reassembler counters (refreshed every loop iteration).
    pub fn reassembly(&self) -> ReassemblerStats {
        self.reassembly.lock().clone()
    }
}

/// Timing knobs of the loop.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Longest wait for a datagram; bounds shutdown latency.
    pub poll_interval: Duration,
    pub sink_retry_delay: Duration,
    pub idle_notice: Duration,
}

impl From<&StreamConfig> for PipelineConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            poll_interval: config.io_timeout(),
            sink_retry_delay: config.sink_retry_delay(),
            idle_notice: config.idle_notice(),
        }
    }
}

pub struct VideoPipeline {
    config: PipelineConfig,
    fragments: FragmentReceiver,
    reassembler: FrameReassembler,
    factory: Box<dyn SinkFactory>,
    consumer: Box<dyn FrameConsumer>,
    sink: Option<Box<dyn DecodeSink>>,
    next_sink_attempt: Instant,
    stats: Arc<PipelineStats>,
}

impl VideoPipeline {
    pub fn new(
        config: PipelineConfig,
        reassembler: ReassemblerConfig,
        fragments: FragmentReceiver,
        factory: impl SinkFactory + 'static,
        consumer: impl FrameConsumer + 'static,
    ) -> Self {
        Self {
            config,
            fragments,
            reassembler: FrameReassembler::new(reassembler),
            factory: Box::new(factory),
            consumer: Box::new(consumer),
            sink: None,
            next_sink_attempt: Instant::now(),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn spawn(self, shutdown: Shutdown) -> Result<JoinHandle<()>, Error> {
        thread::Builder::new()
            .name("skyfeed-video".to_string())
            .spawn(move || self.run(&shutdown))
            .map_err(|source| Error::Thread {
                name: "skyfeed-video",
                source,
            })
    }

    /// Run until shutdown.
    pub fn run(mut self, shutdown: &Shutdown) {
        log::info!("[VIDEO] reassembly loop started");
        let mut last_activity = Instant::now();
        let mut last_notice = last_activity;

        while !shutdown.is_triggered() {
            self.ensure_sink();

            match self.fragments.recv_timeout(self.config.poll_interval) {
                Some(datagram) => {
                    last_activity = Instant::now();
                    self.handle_datagram(&datagram);
                }
                None => {
                    let now = Instant::now();
                    if now.duration_since(last_activity) >= self.config.idle_notice
                        && now.duration_since(last_notice) >= self.config.idle_notice
                    {
                        log::info!("[VIDEO] waiting for video data...");
                        last_notice = now;
                    }
                }
            }

            let swept = self.reassembler.tick();
            if swept > 0 {
                log::debug!("[VIDEO] swept {} stale assemblies", swept);
            }
            self.drain_sink();
            *self.stats.reassembly.lock() = self.reassembler.stats();
        }

        self.sink.take();
        log::info!(
            "[VIDEO] reassembly loop stopped ({} frames decoded)",
            self.stats.frames_decoded.load(Ordering::Relaxed)
        );
    }

    fn handle_datagram(&mut self, datagram: &[u8]) {
        match self.reassembler.ingest(datagram) {
            Ok(Some(unit)) => self.decode(&unit),
            Ok(None) => {}
            Err(e) => log::trace!("[VIDEO] fragment dropped: {}", e),
        }
    }

    fn decode(&mut self, unit: &AccessUnit) {
        let Some(sink) = self.sink.as_mut() else {
            self.stats.units_dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("[VIDEO] no decoder, frame {} dropped", unit.frame_id);
            return;
        };

        self.stats.units_submitted.fetch_add(1, Ordering::Relaxed);
        match sink.submit(unit) {
            Ok(Some(frame)) => self.deliver(frame),
            Ok(None) => {}
            Err(e) => self.fail_sink(e),
        }
    }

    /// Collect frames the decoder finished since the last submit.
    fn drain_sink(&mut self) {
        while let Some(sink) = self.sink.as_mut() {
            match sink.poll() {
                Ok(Some(frame)) => self.deliver(frame),
                Ok(None) => return,
                Err(e) => self.fail_sink(e),
            }
        }
    }

    fn deliver(&mut self, frame: RasterFrame) {
        self.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.consumer.consume(frame);
    }

    fn ensure_sink(&mut self) {
        if self.sink.is_some() || Instant::now() < self.next_sink_attempt {
            return;
        }
        match self.factory.create() {
            Ok(sink) => {
                self.stats.sink_starts.fetch_add(1, Ordering::Relaxed);
                self.sink = Some(sink);
            }
            Err(e) => {
                log::warn!("[VIDEO] cannot start decoder: {}", e);
                self.next_sink_attempt = Instant::now() + self.config.sink_retry_delay;
            }
        }
    }

    fn fail_sink(&mut self, err: SinkError) {
        log::warn!(
            "[VIDEO] decoder failed, restarting in {:?}: {}",
            self.config.sink_retry_delay,
            err
        );
        self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
        self.sink = None;
        self.next_sink_attempt = Instant::now() + self.config.sink_retry_delay;
    }
}
