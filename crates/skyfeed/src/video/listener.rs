// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragment listener: the unreliable-transport receiver.
//!
//! Bound once at startup and kept for the life of the process. Its
//! availability does not depend on the control session, so reconnects never
//! restart it.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::queue::FragmentSender;
use crate::config::StreamConfig;
use crate::error::{Error, TransportError};
use crate::shutdown::Shutdown;

/// Largest possible UDP payload; the receive buffer always holds a whole
/// datagram regardless of the SO_RCVBUF request.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Receiver counters.
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub datagrams: AtomicU64,
    pub bytes: AtomicU64,
    pub errors: AtomicU64,
}

/// Bound video endpoint, ready to spawn.
pub struct FragmentListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    sender: FragmentSender,
    stats: Arc<ListenerStats>,
}

impl FragmentListener {
    /// Bind the video endpoint.
    ///
    /// The kernel receive buffer is a request; a refusal is logged and the
    /// listener continues with whatever the OS granted.
    pub fn bind(config: &StreamConfig, sender: FragmentSender) -> Result<Self, TransportError> {
        let addr = config.video_bind_addr();
        let socket = bind_socket(addr, config.recv_buffer_size, config.io_timeout())
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        log::info!("[VIDEO] listening on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            sender,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the receive loop on a named thread.
    pub fn spawn(self, shutdown: Shutdown) -> Result<JoinHandle<()>, Error> {
        thread::Builder::new()
            .name("skyfeed-udp-rx".to_string())
            .spawn(move || self.run(&shutdown))
            .map_err(|source| Error::Thread {
                name: "skyfeed-udp-rx",
                source,
            })
    }

    /// Receive until shutdown. Errors are counted and retried.
    pub fn run(self, shutdown: &Shutdown) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while !shutdown.is_triggered() {
            match self.socket.recv_from(&mut buf) {
                Ok((0, _)) => {}
                Ok((n, _peer)) => {
                    self.stats.datagrams.fetch_add(1, Ordering::Relaxed);
                    self.stats.bytes.fetch_add(n as u64, Ordering::Relaxed);
                    if self.sender.push(buf[..n].to_vec()) {
                        log::trace!("[VIDEO] fragment ring full, dropped oldest datagram");
                    }
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    if !shutdown.is_triggered() {
                        log::warn!("[VIDEO] {}", TransportError::Receive(e));
                    }
                }
            }
        }

        log::debug!("[VIDEO] listener on {} stopped", self.local_addr);
    }
}

fn bind_socket(addr: SocketAddr, recv_buffer: usize, timeout: Duration) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer) {
        log::warn!("[VIDEO] could not set SO_RCVBUF={}: {}", recv_buffer, e);
    }
    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(timeout))?;
    Ok(socket)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
