// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control messages carried in CTP frames.
//!
//! Content is a JSON object `{"op": ..., "param": {...}}`. Outbound messages
//! are always `PUT`; the device pushes `NOTIFY` messages with sensor values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::CtpFrame;
use crate::config::StreamConfig;
use crate::error::ProtocolError;

pub const TOPIC_ACCESS: &str = "APP_ACCESS";
pub const TOPIC_OPEN_STREAM: &str = "OPEN_RT_STREAM";
pub const TOPIC_KEEPALIVE: &str = "CTP_KEEP_ALIVE";

const OP_PUT: &str = "PUT";
const OP_NOTIFY: &str = "NOTIFY";

/// Wire envelope of every control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: String,
    #[serde(default)]
    pub param: Map<String, Value>,
}

/// Messages the receiver sends to set up and hold the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Capability / version announce.
    Access { version: String, client_type: String },
    /// Request to start the live stream.
    OpenStream {
        format: u32,
        width: u32,
        height: u32,
        fps: u32,
        bitrate_kbps: u32,
    },
    /// Empty-parameter heartbeat.
    KeepAlive,
}

impl ControlMessage {
    pub fn access(config: &StreamConfig) -> Self {
        ControlMessage::Access {
            version: config.client_version.clone(),
            client_type: config.client_type.clone(),
        }
    }

    pub fn open_stream(config: &StreamConfig) -> Self {
        ControlMessage::OpenStream {
            format: config.stream_format,
            width: config.width,
            height: config.height,
            fps: config.fps,
            bitrate_kbps: config.bitrate_kbps,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            ControlMessage::Access { .. } => TOPIC_ACCESS,
            ControlMessage::OpenStream { .. } => TOPIC_OPEN_STREAM,
            ControlMessage::KeepAlive => TOPIC_KEEPALIVE,
        }
    }

    /// Build the JSON envelope. The device expects string-valued parameters.
    pub fn envelope(&self) -> Envelope {
        let mut param = Map::new();
        match self {
            ControlMessage::Access {
                version,
                client_type,
            } => {
                param.insert("ver".into(), Value::String(version.clone()));
                param.insert("type".into(), Value::String(client_type.clone()));
            }
            ControlMessage::OpenStream {
                format,
                width,
                height,
                fps,
                bitrate_kbps,
            } => {
                param.insert("format".into(), Value::String(format.to_string()));
                param.insert("h".into(), Value::String(height.to_string()));
                param.insert("w".into(), Value::String(width.to_string()));
                param.insert("fps".into(), Value::String(fps.to_string()));
                param.insert("rate".into(), Value::String(bitrate_kbps.to_string()));
            }
            ControlMessage::KeepAlive => {}
        }
        Envelope {
            op: OP_PUT.to_string(),
            param,
        }
    }

    pub fn to_frame(&self) -> Result<CtpFrame, ProtocolError> {
        let content = serde_json::to_vec(&self.envelope())?;
        Ok(CtpFrame::new(self.topic(), content))
    }
}

/// Flight telemetry pushed by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub altitude_cm: f32,
    pub battery_percent: u8,
}

/// An inbound `NOTIFY` message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub topic: String,
    pub param: Map<String, Value>,
}

impl Notification {
    /// Parse a frame; returns `Ok(None)` for anything that is not a `NOTIFY`.
    pub fn from_frame(frame: &CtpFrame) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(&frame.content)?;
        if envelope.op != OP_NOTIFY {
            return Ok(None);
        }
        Ok(Some(Self {
            topic: frame.topic.clone(),
            param: envelope.param,
        }))
    }

    /// Altitude (`D8` low byte, `D9` high byte, signed millimetres) and
    /// battery (`D10`, percent).
    pub fn telemetry(&self) -> Option<Telemetry> {
        let low = byte_param(self.param.get("D8")?)?;
        let high = byte_param(self.param.get("D9")?)?;
        let battery = byte_param(self.param.get("D10")?)?;
        let altitude_mm = i16::from_le_bytes([low, high]);
        Some(Telemetry {
            altitude_cm: f32::from(altitude_mm) / 10.0,
            battery_percent: battery,
        })
    }
}

fn byte_param(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u8::try_from(n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_stream_params() {
        let config = StreamConfig::default();
        let frame = ControlMessage::open_stream(&config).to_frame().unwrap();
        assert_eq!(frame.topic, "OPEN_RT_STREAM");

        let envelope: Envelope = serde_json::from_slice(&frame.content).unwrap();
        assert_eq!(envelope.op, "PUT");
        assert_eq!(envelope.param["w"], "1280");
        assert_eq!(envelope.param["h"], "720");
        assert_eq!(envelope.param["fps"], "25");
        assert_eq!(envelope.param["rate"], "8000");
        assert_eq!(envelope.param["format"], "1");
    }

    #[test]
    fn test_keepalive_has_empty_params() {
        let frame = ControlMessage::KeepAlive.to_frame().unwrap();
        assert_eq!(frame.topic, "CTP_KEEP_ALIVE");
        assert_eq!(frame.content_str(), r#"{"op":"PUT","param":{}}"#);
    }

    #[test]
    fn test_access_announces_version() {
        let frame = ControlMessage::access(&StreamConfig::default())
            .to_frame()
            .unwrap();
        let envelope: Envelope = serde_json::from_slice(&frame.content).unwrap();
        assert_eq!(envelope.param["ver"], "907");
        assert_eq!(envelope.param["type"], "0");
    }

    #[test]
    fn test_notify_telemetry() {
        // 1234 mm = 0x04D2
        let frame = CtpFrame::new(
            "DRONE_STATUS",
            br#"{"op":"NOTIFY","param":{"D8":"210","D9":"4","D10":"87"}}"#.to_vec(),
        );
        let notification = Notification::from_frame(&frame).unwrap().unwrap();
        let telemetry = notification.telemetry().unwrap();
        assert!((telemetry.altitude_cm - 123.4).abs() < 1e-4);
        assert_eq!(telemetry.battery_percent, 87);
    }

    #[test]
    fn test_put_is_not_a_notification() {
        let frame = ControlMessage::KeepAlive.to_frame().unwrap();
        assert_eq!(Notification::from_frame(&frame).unwrap(), None);
    }

    #[test]
    fn test_bad_json_is_protocol_error() {
        let frame = CtpFrame::new("X", b"not json".to_vec());
        assert!(matches!(
            Notification::from_frame(&frame),
            Err(ProtocolError::Json(_))
        ));
    }
}
