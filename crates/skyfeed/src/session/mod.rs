// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control session: handshake, keepalive, disconnect detection, reconnect.
//!
//! # Threads per attempt
//!
//! ```text
//! skyfeed-session (supervisor)
//!   |-- skyfeed-ctp-drain      reads replies/notifications, reports EOF
//!   '-- skyfeed-ctp-keepalive  CTP_KEEP_ALIVE every keepalive_interval
//! ```
//!
//! Both background tasks carry the attempt's generation and go quiet as soon
//! as the supervisor retires it. Attempts never overlap.

mod command;
mod drain;
mod generation;
mod keepalive;
mod link;
mod manager;
mod state;

pub use command::CommandLink;
pub use generation::{AttemptContext, Generation};
pub use link::ControlLink;
pub use manager::SessionManager;
pub use state::{SessionMonitor, SessionState};
