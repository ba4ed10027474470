// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Control session against a fake device.
//!
//! Test scenarios:
//! - Handshake order: access, open-stream, then keepalives
//! - Device drops the connection: supervisor reconnects and handshakes again
//! - Video endpoint survives the reconnect
//! - Closure is detected within one keepalive interval, and the next
//!   handshake starts within keepalive interval + reconnect delay
//! - Command link follows the streaming session
//! - Shutdown while streaming returns promptly

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};
use serde_json::Value;
use skyfeed::ctp::{ByteOrder, CtpDecoder, CtpFrame};
use skyfeed::sink::{DecodeSink, RasterFrame};
use skyfeed::video::{Fragment, FragmentHeader};
use skyfeed::{
    AccessUnit, SessionState, SinkError, StreamConfig, StreamHandle, StreamService,
    TransportError,
};

const WAIT: Duration = Duration::from_secs(5);

/// Sink that forwards every access unit to the test.
struct Recorder {
    tx: channel::Sender<AccessUnit>,
}

impl DecodeSink for Recorder {
    fn submit(&mut self, unit: &AccessUnit) -> Result<Option<RasterFrame>, SinkError> {
        let _ = self.tx.send(unit.clone());
        Ok(None)
    }
}

fn loopback_config(control_port: u16) -> StreamConfig {
    StreamConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        control_port,
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        video_port: 0,
        keepalive_interval_ms: 40,
        reconnect_delay_ms: 100,
        connect_timeout_ms: 1000,
        handshake_gap_ms: 10,
        io_timeout_ms: 20,
        ..Default::default()
    }
}

fn start(config: StreamConfig) -> (StreamHandle, Receiver<AccessUnit>) {
    let (tx, rx) = channel::unbounded();
    let factory = move || -> Result<Box<dyn DecodeSink>, SinkError> {
        Ok(Box::new(Recorder { tx: tx.clone() }))
    };
    let handle = StreamService::start(config, factory, |_frame: RasterFrame| {}).unwrap();
    (handle, rx)
}

/// Accept with a deadline so a broken supervisor fails the test instead of
/// hanging it.
fn accept(listener: &TcpListener) -> TcpStream {
    listener.set_nonblocking(true).unwrap();
    let deadline = Instant::now() + WAIT;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).unwrap();
                stream
                    .set_read_timeout(Some(Duration::from_millis(50)))
                    .unwrap();
                return stream;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                assert!(Instant::now() < deadline, "no connection attempt");
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("accept failed: {}", e),
        }
    }
}

fn read_frames(stream: &mut TcpStream, count: usize) -> Vec<CtpFrame> {
    let mut decoder = CtpDecoder::new(ByteOrder::Big);
    let mut frames = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + WAIT;

    while frames.len() < count && Instant::now() < deadline {
        if let Ok(n) = stream.read(&mut buf) {
            assert!(n > 0, "receiver closed the control connection");
            decoder.feed(&buf[..n]);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }
    }
    frames
}

fn topics(frames: &[CtpFrame]) -> Vec<&str> {
    frames.iter().map(|f| f.topic.as_str()).collect()
}

fn whole_frame(frame_id: u32, body: &[u8]) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 1];
    data.extend_from_slice(body);
    Fragment::build(
        FragmentHeader {
            stream_type: 1,
            reserved: 0,
            payload_len: 0,
            sequence: frame_id,
            frame_size: data.len() as u32,
            offset: 0,
            frame_id,
        },
        &data,
    )
}

#[test]
fn test_handshake_then_keepalive() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(device.local_addr().unwrap().port());
    let (handle, _units) = start(config);

    let mut conn = accept(&device);
    let frames = read_frames(&mut conn, 4);
    assert_eq!(
        topics(&frames),
        vec![
            "APP_ACCESS",
            "OPEN_RT_STREAM",
            "CTP_KEEP_ALIVE",
            "CTP_KEEP_ALIVE"
        ]
    );

    let access: Value = serde_json::from_slice(&frames[0].content).unwrap();
    assert_eq!(access["op"], "PUT");
    assert_eq!(access["param"]["ver"], "907");

    let open: Value = serde_json::from_slice(&frames[1].content).unwrap();
    assert_eq!(open["param"]["w"], "1280");
    assert_eq!(open["param"]["h"], "720");
    assert_eq!(open["param"]["fps"], "25");
    assert_eq!(open["param"]["rate"], "8000");

    let keepalive: Value = serde_json::from_slice(&frames[2].content).unwrap();
    assert_eq!(keepalive["param"], serde_json::json!({}));

    let session = handle.session();
    assert!(session.wait_for(SessionState::Streaming, WAIT));
    assert_eq!(session.handshakes(), 1);
}

#[test]
fn test_reconnect_after_device_drop() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(device.local_addr().unwrap().port());
    let (handle, units) = start(config);
    let session = handle.session();
    let video_addr = handle.video_addr();

    let mut first = accept(&device);
    assert_eq!(read_frames(&mut first, 2).len(), 2);
    assert!(session.wait_for_handshakes(1, WAIT));
    let first_generation = session.generation();

    // Device goes away.
    drop(first);

    let mut second = accept(&device);
    let frames = read_frames(&mut second, 3);
    assert_eq!(
        topics(&frames),
        vec!["APP_ACCESS", "OPEN_RT_STREAM", "CTP_KEEP_ALIVE"]
    );
    assert!(session.wait_for_handshakes(2, WAIT));
    assert!(session.generation() > first_generation);
    assert!(session.disconnects() >= 1);

    // The video endpoint was never rebound.
    assert_eq!(handle.video_addr(), video_addr);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(&whole_frame(77, &[0x65, 0x88]), video_addr)
        .unwrap();
    let unit = units.recv_timeout(WAIT).unwrap();
    assert_eq!(unit.frame_id, 77);
    assert_eq!(unit.data, vec![0, 0, 0, 1, 0x65, 0x88]);
}

/// Poll `cond` until it holds or `limit` elapses; returns the time taken.
fn time_until(limit: Duration, mut cond: impl FnMut() -> bool) -> Option<Duration> {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return Some(start.elapsed());
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

#[test]
fn test_closure_detected_within_keepalive_interval() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = StreamConfig {
        keepalive_interval_ms: 500,
        reconnect_delay_ms: 100,
        ..loopback_config(device.local_addr().unwrap().port())
    };
    let keepalive = config.keepalive_interval();
    let reconnect = config.reconnect_delay();
    let (handle, _units) = start(config);
    let session = handle.session();

    let mut first = accept(&device);
    assert_eq!(read_frames(&mut first, 2).len(), 2);
    assert!(session.wait_for(SessionState::Streaming, WAIT));

    let dropped_at = Instant::now();
    drop(first);

    let detected = time_until(WAIT, || session.disconnects() >= 1)
        .expect("closure never detected");
    assert!(
        detected < keepalive,
        "closure detected after {:?}, keepalive interval {:?}",
        detected,
        keepalive
    );

    let mut second = accept(&device);
    let frames = read_frames(&mut second, 1);
    let handshake_after = dropped_at.elapsed();
    assert_eq!(topics(&frames), vec!["APP_ACCESS"]);
    assert!(
        handshake_after < keepalive + reconnect,
        "new handshake after {:?}, bound {:?}",
        handshake_after,
        keepalive + reconnect
    );
}

#[test]
fn test_keepalives_recorded_on_monitor() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(device.local_addr().unwrap().port());
    let (handle, _units) = start(config);

    let mut conn = accept(&device);
    let frames = read_frames(&mut conn, 4);
    assert_eq!(&topics(&frames)[2..], &["CTP_KEEP_ALIVE", "CTP_KEEP_ALIVE"]);

    assert!(time_until(WAIT, || handle.stats().keepalives >= 2).is_some());
    let stats = handle.stats();
    let last = stats.last_keepalive.unwrap();
    assert!(last.elapsed() < WAIT);
}

#[test]
fn test_command_link_follows_session() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(device.local_addr().unwrap().port());
    let (handle, _units) = start(config);
    let commands = handle.command_link();
    let session = handle.session();

    let mut conn = accept(&device);
    assert!(session.wait_for(SessionState::Streaming, WAIT));
    commands.send(&[0x66, 0x80, 0x80, 0x80, 0x80, 0x00, 0x99]).unwrap();

    // The raw packet lands somewhere after the handshake frames.
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + WAIT;
    let needle = [0x66, 0x80, 0x80, 0x80, 0x80, 0x00, 0x99];
    while !received.windows(needle.len()).any(|w| w == needle) && Instant::now() < deadline {
        if let Ok(n) = conn.read(&mut buf) {
            received.extend_from_slice(&buf[..n]);
        }
    }
    assert!(received.windows(needle.len()).any(|w| w == needle));

    drop(conn);
    drop(device);
    assert!(session.wait_for(SessionState::Disconnected, WAIT));
    assert!(matches!(
        commands.send(&[0x00]),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn test_shutdown_while_streaming_is_prompt() {
    let device = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = loopback_config(device.local_addr().unwrap().port());
    let (mut handle, _units) = start(config);

    let _conn = accept(&device);
    assert!(handle.session().wait_for(SessionState::Streaming, WAIT));

    let started = Instant::now();
    handle.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(handle.stats().session, SessionState::Disconnected);

    // Idempotent.
    handle.shutdown();
}
