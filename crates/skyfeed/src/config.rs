// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream configuration.
//!
//! Host and ports are fixed inputs; nothing in the core parses them at
//! runtime. Values can be built in code or loaded from a TOML file:
//!
//! ```toml
//! host = "192.168.1.1"
//! control_port = 3333
//! video_port = 2224
//! width = 1280
//! height = 720
//! fps = 25
//! bitrate_kbps = 8000
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted SO_RCVBUF request; bursts of a large I-frame need at
/// least this much kernel buffering.
pub const MIN_RECV_BUFFER: usize = 64 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Stream receiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    // === Endpoints ===
    /// Device address.
    pub host: IpAddr,

    /// Reliable control transport port on the device.
    pub control_port: u16,

    /// Local port for the unreliable video endpoint.
    pub video_port: u16,

    /// Local address the video endpoint binds to.
    pub bind_address: IpAddr,

    // === Stream negotiation ===
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,

    /// `format` field of the open-stream request.
    pub stream_format: u32,

    /// `ver` field of the access request.
    pub client_version: String,

    /// `type` field of the access request.
    pub client_type: String,

    // === Session timing ===
    pub keepalive_interval_ms: u64,

    /// Fixed delay between a failed session and the next attempt.
    pub reconnect_delay_ms: u64,

    pub connect_timeout_ms: u64,

    /// Pause between the access and open-stream messages.
    pub handshake_gap_ms: u64,

    /// Upper bound on any blocking network call, so shutdown is observed promptly.
    pub io_timeout_ms: u64,

    // === Video path ===
    /// Requested kernel receive buffer (SO_RCVBUF), at least [`MIN_RECV_BUFFER`].
    pub recv_buffer_size: usize,

    /// Fragment ring capacity (drop-oldest on overflow).
    pub queue_capacity: usize,

    /// Sanity bound on the declared frame size (anti-OOM).
    pub max_frame_size: u32,

    /// Assemblies older than this are evicted.
    pub assembly_timeout_ms: u64,

    /// Upper bound on concurrently open assemblies.
    pub max_pending_frames: usize,

    // === Decode sink ===
    /// Wait before recreating a failed decode sink.
    pub sink_retry_delay_ms: u64,

    /// Interval of the "waiting for video data" notice while idle.
    pub idle_notice_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            control_port: 3333,
            video_port: 2224,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),

            width: 1280,
            height: 720,
            fps: 25,
            bitrate_kbps: 8000,
            stream_format: 1,
            client_version: "907".to_string(),
            client_type: "0".to_string(),

            keepalive_interval_ms: 900,
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 3000,
            handshake_gap_ms: 100,
            io_timeout_ms: 250,

            recv_buffer_size: MIN_RECV_BUFFER,
            queue_capacity: 500,
            max_frame_size: 150_000,
            assembly_timeout_ms: 200, // five frame intervals at 25 fps
            max_pending_frames: 32,

            sink_retry_delay_ms: 1000,
            idle_notice_ms: 5000,
        }
    }
}

impl StreamConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Raster size must be non-zero (got {}x{})",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be non-zero".into()));
        }
        if self.control_port == 0 {
            return Err(ConfigError::Invalid("control_port must be non-zero".into()));
        }
        for (name, value) in [
            ("keepalive_interval_ms", self.keepalive_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("io_timeout_ms", self.io_timeout_ms),
            ("assembly_timeout_ms", self.assembly_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be non-zero".into()));
        }
        if self.max_pending_frames == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_frames must be non-zero".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be non-zero".into()));
        }
        if self.recv_buffer_size < MIN_RECV_BUFFER {
            return Err(ConfigError::Invalid(format!(
                "recv_buffer_size {} is below the {} byte minimum",
                self.recv_buffer_size, MIN_RECV_BUFFER
            )));
        }
        Ok(())
    }

    /// Device control endpoint.
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.control_port)
    }

    /// Local video endpoint.
    pub fn video_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.video_port)
    }

    /// Bytes in one decoded raster frame (3 interleaved channels).
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_gap(&self) -> Duration {
        Duration::from_millis(self.handshake_gap_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn assembly_timeout(&self) -> Duration {
        Duration::from_millis(self.assembly_timeout_ms)
    }

    pub fn sink_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sink_retry_delay_ms)
    }

    pub fn idle_notice(&self) -> Duration {
        Duration::from_millis(self.idle_notice_ms)
    }
}
