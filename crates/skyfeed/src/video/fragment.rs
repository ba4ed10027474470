// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Video fragment header.
//!
//! One datagram carries one fragment: a 20-byte little-endian header
//! followed by `payload_len` bytes of the compressed frame.
//!
//! ```text
//!  0       1        2         4          8            12        16         20
//! +-------+--------+---------+----------+------------+---------+----------+---------
//! | type  | rsvd   | pay_len | sequence | frame_size | offset  | frame_id | payload
//! | (u8)  | (u8)   | (u16)   | (u32)    | (u32)      | (u32)   | (u32)    | ...
//! +-------+--------+---------+----------+------------+---------+----------+---------
//! ```

use crate::error::ProtocolError;

/// Fixed header size.
pub const FRAGMENT_HEADER_SIZE: usize = 20;

/// Parsed fragment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub stream_type: u8,
    pub reserved: u8,
    pub payload_len: u16,
    pub sequence: u32,
    /// Total size of the frame this fragment belongs to.
    pub frame_size: u32,
    /// Byte offset of this payload within the frame.
    pub offset: u32,
    /// Frame identifier (device timestamp).
    pub frame_id: u32,
}

impl FragmentHeader {
    /// Decode the header from the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FRAGMENT_HEADER_SIZE {
            return Err(ProtocolError::ShortHeader { len: buf.len() });
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            stream_type: buf[0],
            reserved: buf[1],
            payload_len: u16::from_le_bytes([buf[2], buf[3]]),
            sequence: u32_at(4),
            frame_size: u32_at(8),
            offset: u32_at(12),
            frame_id: u32_at(16),
        })
    }

    /// Encode the header into its 20-byte wire form.
    pub fn encode(&self) -> [u8; FRAGMENT_HEADER_SIZE] {
        let mut out = [0u8; FRAGMENT_HEADER_SIZE];
        out[0] = self.stream_type;
        out[1] = self.reserved;
        out[2..4].copy_from_slice(&self.payload_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.sequence.to_le_bytes());
        out[8..12].copy_from_slice(&self.frame_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.frame_id.to_le_bytes());
        out
    }

    /// End of this fragment's payload within the frame.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.payload_len)
    }
}

/// A parsed datagram: header plus a borrowed payload.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub header: FragmentHeader,
    pub payload: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Parse one datagram.
    ///
    /// Bytes past `payload_len` are ignored; a datagram shorter than its
    /// declared payload is rejected.
    pub fn parse(datagram: &'a [u8]) -> Result<Self, ProtocolError> {
        let header = FragmentHeader::decode(datagram)?;
        let declared = header.payload_len as usize;
        let available = datagram.len() - FRAGMENT_HEADER_SIZE;
        if available < declared {
            return Err(ProtocolError::TruncatedPayload {
                declared,
                available,
            });
        }

        Ok(Self {
            header,
            payload: &datagram[FRAGMENT_HEADER_SIZE..FRAGMENT_HEADER_SIZE + declared],
        })
    }

    /// Build a datagram (header with `payload_len` filled in + payload).
    ///
    /// Used by device simulators and tests.
    pub fn build(mut header: FragmentHeader, payload: &[u8]) -> Vec<u8> {
        header.payload_len = payload.len() as u16;
        let mut datagram = Vec::with_capacity(FRAGMENT_HEADER_SIZE + payload.len());
        datagram.extend_from_slice(&header.encode());
        datagram.extend_from_slice(payload);
        datagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(frame_id: u32, frame_size: u32, offset: u32) -> FragmentHeader {
        FragmentHeader {
            stream_type: 1,
            reserved: 0,
            payload_len: 0,
            sequence: 5,
            frame_size,
            offset,
            frame_id,
        }
    }

    #[test]
    fn test_decode_little_endian_fields() {
        let mut raw = [0u8; 20];
        raw[0] = 1;
        raw[2] = 10; // payload_len = 10
        raw[4] = 5; // sequence = 5
        raw[8] = 10; // frame_size = 10
        raw[16] = 42; // frame_id = 42
        raw[17] = 1; // frame_id = 42 + 256

        let h = FragmentHeader::decode(&raw).unwrap();
        assert_eq!(h.stream_type, 1);
        assert_eq!(h.payload_len, 10);
        assert_eq!(h.sequence, 5);
        assert_eq!(h.frame_size, 10);
        assert_eq!(h.offset, 0);
        assert_eq!(h.frame_id, 298);
    }

    #[test]
    fn test_short_header_rejected() {
        assert_eq!(
            FragmentHeader::decode(&[0u8; 19]),
            Err(ProtocolError::ShortHeader { len: 19 })
        );
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let mut datagram = Fragment::build(header(1, 100, 0), &[9, 9, 9]);
        datagram.extend_from_slice(&[0xEE; 4]);

        let frag = Fragment::parse(&datagram).unwrap();
        assert_eq!(frag.header.payload_len, 3);
        assert_eq!(frag.payload, &[9, 9, 9]);
    }

    #[test]
    fn test_parse_rejects_truncated_payload() {
        let mut datagram = Fragment::build(header(1, 100, 0), &[1, 2, 3, 4]);
        datagram.truncate(FRAGMENT_HEADER_SIZE + 2);

        assert_eq!(
            Fragment::parse(&datagram).unwrap_err(),
            ProtocolError::TruncatedPayload {
                declared: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_end_does_not_overflow() {
        let h = FragmentHeader {
            offset: u32::MAX,
            payload_len: u16::MAX,
            ..header(1, 1, 0)
        };
        assert_eq!(h.end(), u64::from(u32::MAX) + u64::from(u16::MAX));
    }
}
