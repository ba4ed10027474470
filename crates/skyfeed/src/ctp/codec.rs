// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CTP framing codec.
//!
//! ```text
//! +--------+-----------------+-------+-------------------+---------------+
//! | "CTP:" | topic_len (2B)  | topic | content_len (4B)  | content (JSON)|
//! +--------+-----------------+-------+-------------------+---------------+
//! ```
//!
//! The video control session uses big-endian lengths; the sibling command
//! channel uses little-endian. The two are not bit-compatible, so the byte
//! order is a parameter rather than a constant.

use crate::error::ProtocolError;

/// Fixed tag opening every control frame.
pub const CTP_TAG: &[u8; 4] = b"CTP:";

/// Tag + topic length + content length.
pub const CTP_OVERHEAD: usize = 4 + 2 + 4;

/// Default bound on the content length accepted by [`CtpDecoder`].
pub const DEFAULT_MAX_CONTENT: usize = 64 * 1024;

/// Length-field byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network order, used by the video control session.
    #[default]
    Big,
    /// Used by the flight command channel.
    Little,
}

impl ByteOrder {
    fn put_u16(self, value: u16, out: &mut Vec<u8>) {
        match self {
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn put_u32(self, value: u32, out: &mut Vec<u8>) {
        match self {
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn get_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    fn get_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

/// One control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtpFrame {
    pub topic: String,
    pub content: Vec<u8>,
}

impl CtpFrame {
    pub fn new(topic: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            content,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self, order: ByteOrder) -> Result<Vec<u8>, ProtocolError> {
        let topic = self.topic.as_bytes();
        if topic.len() > u16::MAX as usize {
            return Err(ProtocolError::ControlFrameTooLarge {
                len: topic.len(),
                max: u16::MAX as usize,
            });
        }
        if self.content.len() > u32::MAX as usize {
            return Err(ProtocolError::ControlFrameTooLarge {
                len: self.content.len(),
                max: u32::MAX as usize,
            });
        }

        let mut out = Vec::with_capacity(CTP_OVERHEAD + topic.len() + self.content.len());
        out.extend_from_slice(CTP_TAG);
        order.put_u16(topic.len() as u16, &mut out);
        out.extend_from_slice(topic);
        order.put_u32(self.content.len() as u32, &mut out);
        out.extend_from_slice(&self.content);
        Ok(out)
    }

    /// Content as UTF-8 text (lossy), for logging.
    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Incremental decoder for a CTP byte stream.
///
/// The reliable transport has no message boundaries, so bytes are fed as
/// they arrive and complete frames are pulled out one by one.
#[derive(Debug)]
pub struct CtpDecoder {
    order: ByteOrder,
    buffer: Vec<u8>,
    max_content: usize,
    frames_decoded: u64,
}

impl CtpDecoder {
    pub fn new(order: ByteOrder) -> Self {
        Self::with_max_content(order, DEFAULT_MAX_CONTENT)
    }

    pub fn with_max_content(order: ByteOrder, max_content: usize) -> Self {
        Self {
            order,
            buffer: Vec::with_capacity(4096),
            max_content,
            frames_decoded: 0,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Drop all buffered bytes (after a protocol error).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Pull the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed. On error the buffer is
    /// left untouched; callers are expected to [`reset`](Self::reset).
    pub fn next_frame(&mut self) -> Result<Option<CtpFrame>, ProtocolError> {
        let buf = &self.buffer;
        if buf.len() < CTP_TAG.len() {
            if !CTP_TAG.starts_with(buf) {
                return Err(ProtocolError::BadTag);
            }
            return Ok(None);
        }
        if &buf[..4] != CTP_TAG {
            return Err(ProtocolError::BadTag);
        }
        if buf.len() < 6 {
            return Ok(None);
        }

        let topic_len = self.order.get_u16([buf[4], buf[5]]) as usize;
        let content_len_at = 6 + topic_len;
        if buf.len() < content_len_at + 4 {
            return Ok(None);
        }

        let content_len = self.order.get_u32([
            buf[content_len_at],
            buf[content_len_at + 1],
            buf[content_len_at + 2],
            buf[content_len_at + 3],
        ]) as usize;
        if content_len > self.max_content {
            return Err(ProtocolError::ControlFrameTooLarge {
                len: content_len,
                max: self.max_content,
            });
        }

        let content_at = content_len_at + 4;
        let end = content_at + content_len;
        if buf.len() < end {
            return Ok(None);
        }

        let topic = std::str::from_utf8(&buf[6..content_len_at])
            .map_err(|_| ProtocolError::BadTopic)?
            .to_string();
        let content = buf[content_at..end].to_vec();
        self.buffer.drain(..end);
        self.frames_decoded += 1;

        Ok(Some(CtpFrame { topic, content }))
    }
}
