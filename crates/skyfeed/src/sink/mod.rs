// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decode & render sink contract.
//!
//! Access units go in, fixed-size BGR24 raster frames come out. A sink may
//! buffer, so one submitted unit does not necessarily yield one frame. A
//! sink error is fatal to that sink instance only: the pipeline asks its
//! [`SinkFactory`] for a fresh one.

mod ffmpeg;

pub use ffmpeg::{FfmpegSink, DEFAULT_FRAME_WAIT};

use crossbeam::channel::{Sender, TrySendError};

use crate::error::SinkError;
use crate::video::AccessUnit;

/// Bytes per pixel of a BGR24 raster.
pub const BYTES_PER_PIXEL: usize = 3;

/// One decoded frame, interleaved BGR, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterFrame {
    /// Wrap decoder output, checking it is exactly one frame.
    pub fn from_bgr24(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SinkError> {
        let expected = frame_len(width, height);
        if data.len() != expected {
            return Err(SinkError::ShortRead {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// BGR triple at (`x`, `y`), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        // Fields are public, so the buffer may not match the dimensions.
        let px = self.data.get(at..at + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2]])
    }
}

impl std::fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Size in bytes of one BGR24 frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// A decoder instance.
pub trait DecodeSink: Send {
    /// Feed one access unit and return a decoded frame if one is ready.
    ///
    /// `Ok(None)` means the decoder is still buffering.
    fn submit(&mut self, unit: &AccessUnit) -> Result<Option<RasterFrame>, SinkError>;

    /// Collect a frame the decoder produced after the last submit.
    fn poll(&mut self) -> Result<Option<RasterFrame>, SinkError> {
        Ok(None)
    }
}

/// Creates sink instances; called again after a sink fails.
pub trait SinkFactory: Send {
    fn create(&mut self) -> Result<Box<dyn DecodeSink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: FnMut() -> Result<Box<dyn DecodeSink>, SinkError> + Send,
{
    fn create(&mut self) -> Result<Box<dyn DecodeSink>, SinkError> {
        self()
    }
}

/// Receives decoded frames.
pub trait FrameConsumer: Send {
    fn consume(&mut self, frame: RasterFrame);
}

impl<F> FrameConsumer for F
where
    F: FnMut(RasterFrame) + Send,
{
    fn consume(&mut self, frame: RasterFrame) {
        self(frame)
    }
}

/// Forwards frames into a channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: Sender<RasterFrame>,
}

impl ChannelConsumer {
    pub fn new(tx: Sender<RasterFrame>) -> Self {
        Self { tx }
    }
}

impl FrameConsumer for ChannelConsumer {
    fn consume(&mut self, frame: RasterFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("[VIDEO] consumer lagging, frame dropped"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
