// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CTP control protocol: framing codec and control messages.
//!
//! - `codec` - length-delimited framing ([`CtpFrame`], [`CtpDecoder`])
//! - `message` - JSON control messages and device notifications

pub mod codec;
pub mod message;

pub use codec::{ByteOrder, CtpDecoder, CtpFrame, CTP_OVERHEAD, CTP_TAG, DEFAULT_MAX_CONTENT};
pub use message::{
    ControlMessage, Envelope, Notification, Telemetry, TOPIC_ACCESS, TOPIC_KEEPALIVE,
    TOPIC_OPEN_STREAM,
};
