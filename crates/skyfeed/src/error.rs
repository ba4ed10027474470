// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy.
//!
//! Only shutdown ends the process. Everything below is recoverable:
//!
//! - [`TransportError`] - either transport failed; the control side reconnects,
//!   the video side simply receives again.
//! - [`ProtocolError`] - a fragment, frame or control frame was malformed and is
//!   dropped.
//! - [`SinkError`] - the decoder failed; the sink instance is recreated.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub use crate::config::ConfigError;

/// Failure on the reliable or unreliable transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("no control session is streaming")]
    NotConnected,
}

/// Malformed data on either wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("datagram too short for fragment header ({len} bytes)")]
    ShortHeader { len: usize },

    #[error("fragment payload truncated: declared {declared}, got {available}")]
    TruncatedPayload { declared: usize, available: usize },

    #[error("declared frame size is zero")]
    ZeroFrameSize,

    #[error("declared frame size {size} exceeds bound {max}")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("fragment [{offset}, {offset}+{len}) exceeds frame size {size}")]
    OutOfBounds { offset: u32, len: usize, size: u32 },

    #[error("frame {frame_id} declared size {declared}, assembly has {expected}")]
    SizeMismatch {
        frame_id: u32,
        declared: u32,
        expected: u32,
    },

    #[error("assembled frame does not begin with a start code")]
    MissingStartCode,

    #[error("control frame does not start with the CTP tag")]
    BadTag,

    #[error("control frame field of {len} bytes exceeds limit {max}")]
    ControlFrameTooLarge { len: usize, max: usize },

    #[error("control frame topic is not valid UTF-8")]
    BadTopic,

    #[error("control content is not valid JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err.to_string())
    }
}

/// Failure of a decode sink instance.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to start decoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("write to decoder failed: {0}")]
    Write(#[source] io::Error),

    #[error("read from decoder failed: {0}")]
    Read(#[source] io::Error),

    #[error("decoder produced a short frame ({got} of {expected} bytes)")]
    ShortRead { got: usize, expected: usize },

    #[error("decoder did not accept input within {waited:?}")]
    Stalled { waited: Duration },

    #[error("decoder output closed")]
    Closed,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to spawn thread `{name}`: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
