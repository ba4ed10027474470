// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # skyfeed - live video receiver for consumer drones
//!
//! Holds the device's control session open and turns its fragmented video
//! datagrams back into decodable access units.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skyfeed::sink::{DecodeSink, FfmpegSink, RasterFrame};
//! use skyfeed::{SinkError, StreamConfig, StreamService};
//!
//! fn main() -> skyfeed::Result<()> {
//!     let config = StreamConfig::default();
//!     let (width, height) = (config.width, config.height);
//!
//!     let factory = move || -> Result<Box<dyn DecodeSink>, SinkError> {
//!         Ok(Box::new(FfmpegSink::spawn("ffmpeg", width, height)?))
//!     };
//!     let consumer = |frame: RasterFrame| println!("{}x{} frame", frame.width, frame.height);
//!
//!     let mut handle = StreamService::start(config, factory, consumer)?;
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     println!("{:?}", handle.stats());
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Session (TCP, CTP framing)                                         |
//! |   connect -> APP_ACCESS -> OPEN_RT_STREAM -> CTP_KEEP_ALIVE ...     |
//! |   supervisor reconnects after a fixed delay, one attempt at a time  |
//! +---------------------------------------------------------------------+
//! |  Video (UDP)                                                        |
//! |   listener -> drop-oldest ring -> reassembler -> AccessUnit         |
//! +---------------------------------------------------------------------+
//! |  Sink                                                               |
//! |   AccessUnit -> external decoder -> BGR24 RasterFrame -> consumer   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`session`] - control session supervisor, keepalive, command link
//! - [`video`] - fragment listener, fragment ring, frame reassembler
//! - [`sink`] - decode sink contract and the ffmpeg implementation
//! - [`ctp`] - control framing codec and messages
//! - [`config`] - TOML-loadable configuration

pub mod config;
pub mod ctp;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod video;

pub use config::StreamConfig;
pub use error::{ConfigError, Error, ProtocolError, Result, SinkError, TransportError};
pub use service::{StreamHandle, StreamService, StreamStats};
pub use session::{CommandLink, SessionMonitor, SessionState};
pub use shutdown::Shutdown;
pub use video::{AccessUnit, FrameReassembler};
