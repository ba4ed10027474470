// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame reassembly from video fragments.
//!
//! Fragments of different frames interleave arbitrarily, so every frame
//! identifier gets its own [`FrameAssembly`] and all of them are tracked at
//! once. A frame is complete when every byte of its declared size has been
//! covered; it is then checked for an elementary-stream start code and
//! emitted as an [`AccessUnit`] in completion order.
//!
//! - **Bounds**: a declared size of zero or above the sanity bound never
//!   allocates; a fragment reaching past the declared size is dropped
//!   without touching the buffer.
//! - **Overlap**: coverage is tracked as merged byte ranges, so duplicated or
//!   overlapping fragments overwrite bytes but are only counted once.
//! - **Eviction**: assemblies older than the configured timeout are swept by
//!   [`FrameReassembler::tick`], and the oldest is evicted when the pending
//!   limit is reached.
//!
//! # Usage
//!
//! ```ignore
//! let mut reassembler = FrameReassembler::new(ReassemblerConfig::from(&config));
//!
//! while let Some(datagram) = fragments.recv_timeout(poll) {
//!     if let Ok(Some(unit)) = reassembler.ingest(&datagram) {
//!         sink.submit(&unit)?;
//!     }
//!     reassembler.tick();
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use super::fragment::Fragment;
use crate::config::StreamConfig;
use crate::error::ProtocolError;

/// 3-byte elementary-stream start code.
pub const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// 4-byte elementary-stream start code.
pub const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Whether `data` begins with a recognized start code.
pub fn has_start_code(data: &[u8]) -> bool {
    data.starts_with(&START_CODE_3) || data.starts_with(&START_CODE_4)
}

/// Reassembler configuration.
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Largest declared frame size accepted.
    pub max_frame_size: u32,
    /// Age after which an incomplete assembly is dropped.
    pub timeout: Duration,
    /// Maximum concurrently open assemblies.
    pub max_pending: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 150_000,
            timeout: Duration::from_millis(200),
            max_pending: 32,
        }
    }
}

impl From<&StreamConfig> for ReassemblerConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            timeout: config.assembly_timeout(),
            max_pending: config.max_pending_frames,
        }
    }
}

/// A complete, integrity-checked compressed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub frame_id: u32,
    pub data: Vec<u8>,
}

impl AccessUnit {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Merged set of covered byte ranges `[start, end)`.
#[derive(Debug, Default)]
struct Coverage {
    ranges: BTreeMap<u32, u32>,
}

impl Coverage {
    /// Mark `[start, end)` covered; returns how many bytes were new.
    fn insert(&mut self, start: u32, end: u32) -> u32 {
        if start >= end {
            return 0;
        }

        // Disjoint ranges sorted by start also have descending ends when
        // walked backwards, so the walk can stop at the first one left of us.
        let touching: Vec<(u32, u32)> = self
            .ranges
            .range(..=end)
            .rev()
            .take_while(|(_, &e)| e >= start)
            .map(|(&s, &e)| (s, e))
            .collect();

        let mut merged_start = start;
        let mut merged_end = end;
        let mut already = 0;
        for (s, e) in touching {
            already += e.min(end).saturating_sub(s.max(start));
            merged_start = merged_start.min(s);
            merged_end = merged_end.max(e);
            self.ranges.remove(&s);
        }
        self.ranges.insert(merged_start, merged_end);

        (end - start) - already
    }
}

/// A frame being reassembled.
#[derive(Debug)]
struct FrameAssembly {
    buffer: Vec<u8>,
    coverage: Coverage,
    received: u32,
    created_at: Instant,
}

impl FrameAssembly {
    fn new(size: u32, now: Instant) -> Self {
        Self {
            buffer: vec![0u8; size as usize],
            coverage: Coverage::default(),
            received: 0,
            created_at: now,
        }
    }

    fn size(&self) -> u32 {
        self.buffer.len() as u32
    }

    fn is_complete(&self) -> bool {
        self.received == self.size()
    }
}

/// Reassembler statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Datagrams handed to the reassembler.
    pub fragments_received: u64,
    /// Datagrams dropped (bad header, bad size, out of bounds).
    pub fragments_rejected: u64,
    /// Payload bytes that landed on already-covered ranges.
    pub overlap_bytes: u64,
    /// Frames emitted as access units.
    pub frames_completed: u64,
    /// Complete frames dropped for a missing start code.
    pub frames_invalid: u64,
    /// Incomplete frames swept after the timeout.
    pub frames_timed_out: u64,
    /// Incomplete frames evicted by the pending limit.
    pub frames_evicted: u64,
    /// Currently open assemblies.
    pub pending_frames: usize,
}

/// Frame reassembler.
///
/// Owned by the single reassembly loop; needs no internal locking.
pub struct FrameReassembler {
    config: ReassemblerConfig,
    pending: HashMap<u32, FrameAssembly>,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            stats: ReassemblerStats::default(),
        }
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    pub fn stats(&self) -> ReassemblerStats {
        let mut stats = self.stats.clone();
        stats.pending_frames = self.pending.len();
        stats
    }

    /// Number of open assemblies.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handle one datagram.
    ///
    /// Returns `Some(unit)` when the datagram completed a valid frame.
    /// Errors describe why a fragment or frame was dropped; none of them
    /// affect other assemblies.
    pub fn ingest(&mut self, datagram: &[u8]) -> Result<Option<AccessUnit>, ProtocolError> {
        self.ingest_at(datagram, Instant::now())
    }

    /// [`ingest`](Self::ingest) with an explicit clock.
    pub fn ingest_at(
        &mut self,
        datagram: &[u8],
        now: Instant,
    ) -> Result<Option<AccessUnit>, ProtocolError> {
        self.stats.fragments_received += 1;

        let result = self.place(datagram, now);
        match &result {
            Err(ProtocolError::MissingStartCode) => self.stats.frames_invalid += 1,
            Err(_) => self.stats.fragments_rejected += 1,
            Ok(Some(_)) => self.stats.frames_completed += 1,
            Ok(None) => {}
        }
        result
    }

    fn place(&mut self, datagram: &[u8], now: Instant) -> Result<Option<AccessUnit>, ProtocolError> {
        let fragment = Fragment::parse(datagram)?;
        let header = fragment.header;
        let size = header.frame_size;

        // Size and bounds are validated before anything is allocated.
        if size == 0 {
            return Err(ProtocolError::ZeroFrameSize);
        }
        if size > self.config.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        if header.end() > u64::from(size) {
            return Err(ProtocolError::OutOfBounds {
                offset: header.offset,
                len: fragment.payload.len(),
                size,
            });
        }

        if let Some(assembly) = self.pending.get(&header.frame_id) {
            if assembly.size() != size {
                return Err(ProtocolError::SizeMismatch {
                    frame_id: header.frame_id,
                    declared: size,
                    expected: assembly.size(),
                });
            }
        } else {
            if self.pending.len() >= self.config.max_pending {
                self.evict_oldest();
            }
            self.pending
                .insert(header.frame_id, FrameAssembly::new(size, now));
        }

        let Some(assembly) = self.pending.get_mut(&header.frame_id) else {
            return Ok(None);
        };

        let start = header.offset;
        let end = start + u32::from(header.payload_len);
        assembly.buffer[start as usize..end as usize].copy_from_slice(fragment.payload);
        let fresh = assembly.coverage.insert(start, end);
        assembly.received += fresh;
        self.stats.overlap_bytes += u64::from(end - start - fresh);

        if !assembly.is_complete() {
            return Ok(None);
        }

        let Some(assembly) = self.pending.remove(&header.frame_id) else {
            return Ok(None);
        };
        if !has_start_code(&assembly.buffer) {
            log::debug!(
                "[VIDEO] frame {} ({} bytes) has no start code, dropped",
                header.frame_id,
                size
            );
            return Err(ProtocolError::MissingStartCode);
        }

        Ok(Some(AccessUnit {
            frame_id: header.frame_id,
            data: assembly.buffer,
        }))
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .pending
            .iter()
            .min_by_key(|(_, a)| a.created_at)
            .map(|(id, _)| *id)
        {
            self.pending.remove(&oldest);
            self.stats.frames_evicted += 1;
            log::debug!("[VIDEO] pending limit reached, evicted frame {}", oldest);
        }
    }

    /// Sweep assemblies older than the timeout.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit clock. Returns the number swept.
    pub fn tick_at(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, a| now.saturating_duration_since(a.created_at) < timeout);
        let swept = before - self.pending.len();
        self.stats.frames_timed_out += swept as u64;
        swept
    }

    /// Drop every open assembly.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
