// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Video path: datagram receive, fragment ring, frame reassembly.
//!
//! ```text
//! UDP socket --> FragmentListener --> fragment ring --> FrameReassembler --> AccessUnit
//!                 (receiver thread)   (drop-oldest)     (single consumer)
//! ```

pub mod fragment;
pub mod listener;
pub mod queue;
pub mod reassembler;

pub use fragment::{Fragment, FragmentHeader, FRAGMENT_HEADER_SIZE};
pub use listener::{FragmentListener, ListenerStats, MAX_DATAGRAM_SIZE};
pub use queue::{fragment_ring, FragmentReceiver, FragmentSender, QueueStats};
pub use reassembler::{
    has_start_code, AccessUnit, FrameReassembler, ReassemblerConfig, ReassemblerStats,
    START_CODE_3, START_CODE_4,
};
