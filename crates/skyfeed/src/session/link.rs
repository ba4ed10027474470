// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reliable control connection.
//!
//! The write half is shared by the handshake, the keepalive task and the
//! external command channel, so every write goes through one mutex. The read
//! half is a cloned stream owned by the drain task.

use std::io::Write;
use std::net::{Shutdown as NetShutdown, SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;

use crate::ctp::{ByteOrder, ControlMessage, CtpFrame};
use crate::error::{Error, TransportError};

/// One open control connection.
pub struct ControlLink {
    writer: Mutex<TcpStream>,
    peer: SocketAddr,
    order: ByteOrder,
}

impl ControlLink {
    /// Connect with a bounded timeout.
    ///
    /// Reads on the stream (and its clones) time out after `io_timeout` so
    /// the drain task observes shutdown and retirement promptly.
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let connect_err = |source| TransportError::Connect { addr, source };

        let stream = TcpStream::connect_timeout(&addr, connect_timeout).map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;
        stream.set_read_timeout(Some(io_timeout)).map_err(connect_err)?;
        stream
            .set_write_timeout(Some(connect_timeout))
            .map_err(connect_err)?;

        log::info!("[CTP] connected to {}", addr);

        Ok(Self {
            writer: Mutex::new(stream),
            peer: addr,
            order: ByteOrder::Big,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Clone the stream for the drain task.
    pub fn reader(&self) -> Result<TcpStream, TransportError> {
        self.writer.lock().try_clone().map_err(TransportError::Receive)
    }

    /// Encode and send one control message.
    pub fn send(&self, message: &ControlMessage) -> Result<(), Error> {
        let frame = message.to_frame()?;
        self.send_frame(&frame)?;
        log::debug!("[CTP] -> {} {}", frame.topic, frame.content_str());
        Ok(())
    }

    pub fn send_frame(&self, frame: &CtpFrame) -> Result<(), Error> {
        let bytes = frame.encode(self.order)?;
        self.send_raw(&bytes)?;
        Ok(())
    }

    /// Write pre-encoded bytes under the write lock.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut stream = self.writer.lock();
        stream.write_all(bytes).map_err(TransportError::Send)?;
        stream.flush().map_err(TransportError::Send)
    }

    /// Shut both directions down, unblocking any pending read.
    pub fn close(&self) {
        if let Err(e) = self.writer.lock().shutdown(NetShutdown::Both) {
            log::trace!("[CTP] shutdown of {}: {}", self.peer, e);
        }
    }
}

impl std::fmt::Debug for ControlLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLink")
            .field("peer", &self.peer)
            .field("order", &self.order)
            .finish()
    }
}
