// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound drain of the control connection.
//!
//! The device sends replies and notifications that must be read so its send
//! buffer never fills. Reads are bounded by the stream's read timeout; end of
//! stream or a hard error reports a disconnect. Notifications carrying flight
//! telemetry are decoded and published on the session monitor.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::generation::DisconnectSignal;
use super::state::SessionMonitor;
use crate::ctp::{ByteOrder, CtpDecoder, CtpFrame, Notification};
use crate::error::{Error, TransportError};
use crate::shutdown::Shutdown;

const READ_CHUNK: usize = 4096;

pub(crate) struct DrainHandle {
    thread: Option<JoinHandle<()>>,
}

impl DrainHandle {
    /// Wait for the task to exit. The caller retires the attempt (and
    /// usually closes the link) first.
    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DrainHandle {
    fn drop(&mut self) {
        self.join();
    }
}

pub(crate) fn spawn(
    stream: TcpStream,
    signal: DisconnectSignal,
    monitor: Arc<SessionMonitor>,
    shutdown: Shutdown,
) -> Result<DrainHandle, Error> {
    let thread = thread::Builder::new()
        .name("skyfeed-ctp-drain".to_string())
        .spawn(move || run(stream, &signal, &monitor, &shutdown))
        .map_err(|source| Error::Thread {
            name: "skyfeed-ctp-drain",
            source,
        })?;

    Ok(DrainHandle {
        thread: Some(thread),
    })
}

fn run(
    mut stream: TcpStream,
    signal: &DisconnectSignal,
    monitor: &SessionMonitor,
    shutdown: &Shutdown,
) {
    let mut decoder = CtpDecoder::new(ByteOrder::Big);
    let mut buf = [0u8; READ_CHUNK];

    while !shutdown.is_triggered() && signal.attempt().is_current() {
        match stream.read(&mut buf) {
            Ok(0) => {
                log::info!("[CTP] device closed the control connection");
                signal.raise(TransportError::Closed);
                break;
            }
            Ok(n) => {
                decoder.feed(&buf[..n]);
                drain_frames(&mut decoder, monitor);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                signal.raise(TransportError::Receive(e));
                break;
            }
        }
    }

    log::debug!(
        "[CTP] drain for attempt {} stopped ({} frames)",
        signal.attempt().id(),
        decoder.frames_decoded()
    );
}

fn drain_frames(decoder: &mut CtpDecoder, monitor: &SessionMonitor) {
    loop {
        match decoder.next_frame() {
            Ok(Some(frame)) => handle_frame(&frame, monitor),
            Ok(None) => return,
            Err(e) => {
                // Framing is lost; discard what is buffered and resync on
                // the next read.
                log::debug!("[CTP] dropping undecodable inbound data: {}", e);
                decoder.reset();
                return;
            }
        }
    }
}

fn handle_frame(frame: &CtpFrame, monitor: &SessionMonitor) {
    log::trace!("[CTP] <- {} {}", frame.topic, frame.content_str());
    match Notification::from_frame(frame) {
        Ok(Some(notification)) => {
            if let Some(telemetry) = notification.telemetry() {
                monitor.record_telemetry(telemetry);
            }
        }
        Ok(None) => {}
        Err(e) => log::debug!("[CTP] ignoring {} reply: {}", frame.topic, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::generation::Generation;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_eof_raises_closed() {
        let (client, server) = pair();
        let generation = Generation::new();
        let (signal, rx) = DisconnectSignal::new(generation.begin());
        let mut handle = spawn(
            client,
            signal,
            Arc::new(SessionMonitor::new()),
            Shutdown::new(),
        )
        .unwrap();

        drop(server);
        let reason = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(reason, TransportError::Closed));
        handle.join();
    }

    #[test]
    fn test_notify_updates_telemetry() {
        let (client, mut server) = pair();
        let generation = Generation::new();
        let (signal, _rx) = DisconnectSignal::new(generation.begin());
        let monitor = Arc::new(SessionMonitor::new());
        let mut handle = spawn(client, signal, Arc::clone(&monitor), Shutdown::new()).unwrap();

        let notify = CtpFrame::new(
            "DRONE_STATUS",
            br#"{"op":"NOTIFY","param":{"D8":"100","D9":"0","D10":"55"}}"#.to_vec(),
        );
        let bytes = notify.encode(ByteOrder::Big).unwrap();
        // Split across two writes to exercise incremental decoding.
        server.write_all(&bytes[..7]).unwrap();
        server.flush().unwrap();
        thread::sleep(Duration::from_millis(10));
        server.write_all(&bytes[7..]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.telemetry().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let telemetry = monitor.telemetry().unwrap();
        assert_eq!(telemetry.battery_percent, 55);
        assert!((telemetry.altitude_cm - 10.0).abs() < 1e-4);

        drop(server);
        handle.join();
    }

    #[test]
    fn test_retirement_stops_drain() {
        let (client, _server) = pair();
        let generation = Generation::new();
        let attempt = generation.begin();
        let (signal, rx) = DisconnectSignal::new(attempt.clone());
        let mut handle = spawn(
            client,
            signal,
            Arc::new(SessionMonitor::new()),
            Shutdown::new(),
        )
        .unwrap();

        attempt.retire();
        let start = Instant::now();
        handle.join();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(rx.try_recv().is_err());
    }
}
