// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle for the external command channel.
//!
//! Flight commands are encoded elsewhere; this handle only writes the opaque
//! bytes through the streaming session's write lock, so they interleave
//! safely with handshake and keepalive traffic.

use std::sync::Arc;

use parking_lot::RwLock;

use super::link::ControlLink;
use crate::ctp::CtpFrame;
use crate::error::{Error, TransportError};

/// Slot holding the link of the currently streaming session.
pub(crate) type ActiveLink = Arc<RwLock<Option<Arc<ControlLink>>>>;

/// Cloneable sender for pre-encoded command packets.
#[derive(Clone, Debug)]
pub struct CommandLink {
    active: ActiveLink,
}

impl CommandLink {
    pub(crate) fn new(active: ActiveLink) -> Self {
        Self { active }
    }

    /// Whether a streaming session is available to carry commands.
    pub fn is_connected(&self) -> bool {
        self.active.read().is_some()
    }

    /// Send an opaque packet on the current session.
    pub fn send(&self, packet: &[u8]) -> Result<(), TransportError> {
        // Clone the link out so the slot lock is not held during the write.
        let link = self.current()?;
        link.send_raw(packet)
    }

    /// Encode and send a control frame on the current session.
    pub fn send_frame(&self, frame: &CtpFrame) -> Result<(), Error> {
        let link = self.current()?;
        link.send_frame(frame)
    }

    fn current(&self) -> Result<Arc<ControlLink>, TransportError> {
        self.active.read().clone().ok_or(TransportError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn test_not_connected_without_session() {
        let link = CommandLink::new(ActiveLink::default());
        assert!(!link.is_connected());
        assert!(matches!(
            link.send(&[1, 2, 3]),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_send_uses_active_link() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let control =
            ControlLink::connect(addr, Duration::from_secs(2), Duration::from_millis(50)).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let active = ActiveLink::default();
        *active.write() = Some(Arc::new(control));
        let link = CommandLink::new(Arc::clone(&active));
        assert!(link.is_connected());

        link.send(&[0x66, 0x80, 0x80, 0x99]).unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x66, 0x80, 0x80, 0x99]);

        active.write().take();
        assert!(matches!(link.send(&[0]), Err(TransportError::NotConnected)));
    }
}
