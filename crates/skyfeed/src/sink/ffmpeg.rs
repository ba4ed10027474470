// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! External ffmpeg process as a decode sink.
//!
//! Access units go through a bounded queue to a writer thread that owns the
//! decoder's stdin, so a stalled decoder can never block the caller for
//! longer than the write timeout. A reader thread pulls exactly one raster
//! frame at a time from stdout; a third thread forwards decoder diagnostics
//! from stderr to the log.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{
    self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError,
};

use super::{frame_len, DecodeSink, RasterFrame};
use crate::error::SinkError;
use crate::video::AccessUnit;

/// How long `submit` waits for a frame before reporting "still buffering".
pub const DEFAULT_FRAME_WAIT: Duration = Duration::from_millis(20);

/// How long `submit` may wait for room in the write queue.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Access units queued for the writer thread.
const WRITE_QUEUE_DEPTH: usize = 8;

/// Version/build banner ffmpeg prints on startup.
const BANNER_PREFIXES: &[&str] = &[
    "ffmpeg version",
    "built with",
    "configuration:",
    "libavutil",
    "libavcodec",
    "libavformat",
    "libavdevice",
    "libavfilter",
    "libswscale",
    "libswresample",
];

type FrameResult = Result<Vec<u8>, SinkError>;

pub struct FfmpegSink {
    child: Child,
    units: Option<Sender<Vec<u8>>>,
    frames: Receiver<FrameResult>,
    width: u32,
    height: u32,
    frame_wait: Duration,
    write_timeout: Duration,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    logger: Option<JoinHandle<()>>,
}

impl FfmpegSink {
    /// The decoder command line: raw H.264 in on stdin, BGR24 out on stdout.
    pub fn command(program: &str) -> Command {
        let mut command = Command::new(program);
        command.args([
            "-y", "-f", "h264", "-i", "pipe:0", "-f", "rawvideo", "-pix_fmt", "bgr24", "-vcodec",
            "rawvideo", "pipe:1",
        ]);
        command
    }

    /// Start `program` as an ffmpeg decoder for `width`x`height` output.
    pub fn spawn(program: &str, width: u32, height: u32) -> Result<Self, SinkError> {
        Self::with_command(Self::command(program), width, height)
    }

    /// Start an arbitrary decoder command that speaks the same pipes.
    pub fn with_command(mut command: Command, width: u32, height: u32) -> Result<Self, SinkError> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SinkError::Spawn {
                program: program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SinkError::Closed);
        };

        let (tx, frames) = channel::unbounded();
        let (units, pending) = channel::bounded(WRITE_QUEUE_DEPTH);
        let expected = frame_len(width, height);

        let errors = tx.clone();
        let writer = thread::Builder::new()
            .name("skyfeed-decoder-in".to_string())
            .spawn(move || write_units(stdin, &pending, &errors));
        let reader = thread::Builder::new()
            .name("skyfeed-decoder-out".to_string())
            .spawn(move || read_frames(stdout, expected, &tx));
        let logger = thread::Builder::new()
            .name("skyfeed-decoder-err".to_string())
            .spawn(move || log_diagnostics(stderr));

        let (writer, reader, logger) = match (writer, reader, logger) {
            (Ok(writer), Ok(reader), Ok(logger)) => (writer, reader, logger),
            (Err(source), _, _) | (_, Err(source), _) | (_, _, Err(source)) => {
                // Killing the child ends whichever threads did start.
                let _ = child.kill();
                let _ = child.wait();
                return Err(SinkError::Spawn { program, source });
            }
        };

        log::info!(
            "[VIDEO] decoder `{}` started (pid {}, {}x{} bgr24)",
            program,
            child.id(),
            width,
            height
        );

        Ok(Self {
            child,
            units: Some(units),
            frames,
            width,
            height,
            frame_wait: DEFAULT_FRAME_WAIT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            writer: Some(writer),
            reader: Some(reader),
            logger: Some(logger),
        })
    }

    pub fn with_frame_wait(mut self, wait: Duration) -> Self {
        self.frame_wait = wait;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    fn take_frame(&self, result: FrameResult) -> Result<Option<RasterFrame>, SinkError> {
        let data = result?;
        RasterFrame::from_bgr24(self.width, self.height, data).map(Some)
    }
}

impl DecodeSink for FfmpegSink {
    fn submit(&mut self, unit: &AccessUnit) -> Result<Option<RasterFrame>, SinkError> {
        let units = self.units.as_ref().ok_or(SinkError::Closed)?;
        match units.send_timeout(unit.data.clone(), self.write_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                return Err(SinkError::Stalled {
                    waited: self.write_timeout,
                })
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(SinkError::Closed),
        }

        match self.frames.recv_timeout(self.frame_wait) {
            Ok(result) => self.take_frame(result),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SinkError::Closed),
        }
    }

    fn poll(&mut self) -> Result<Option<RasterFrame>, SinkError> {
        match self.frames.try_recv() {
            Ok(result) => self.take_frame(result),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SinkError::Closed),
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Killing the child also fails any write blocked on a full pipe.
        self.units.take();
        let _ = self.child.kill();
        let _ = self.child.wait();

        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(logger) = self.logger.take() {
            let _ = logger.join();
        }
        log::debug!("[VIDEO] decoder pid {} stopped", self.child.id());
    }
}

/// Feed queued units to the decoder until the queue closes or a write fails.
fn write_units(
    mut stdin: ChildStdin,
    pending: &Receiver<Vec<u8>>,
    errors: &Sender<FrameResult>,
) {
    for unit in pending {
        let written = stdin.write_all(&unit).and_then(|()| stdin.flush());
        if let Err(e) = written {
            let _ = errors.send(Err(SinkError::Write(e)));
            return;
        }
    }
}

/// Read exactly `expected` bytes per frame until the stream ends.
fn read_frames(mut stdout: impl Read, expected: usize, tx: &Sender<FrameResult>) {
    loop {
        let frame = read_frame(&mut stdout, expected);
        let failed = frame.is_err();
        if tx.send(frame).is_err() || failed {
            return;
        }
    }
}

fn read_frame(reader: &mut impl Read, expected: usize) -> FrameResult {
    let mut buf = vec![0u8; expected];
    let mut got = 0;
    while got < expected {
        match reader.read(&mut buf[got..]) {
            Ok(0) => return Err(SinkError::ShortRead { got, expected }),
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(SinkError::Read(e)),
        }
    }
    Ok(buf)
}

fn log_diagnostics(stderr: impl Read) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() || is_banner(line) {
            continue;
        }
        if line.to_ascii_lowercase().contains("error") {
            log::warn!("[VIDEO] decoder: {}", line);
        } else {
            log::debug!("[VIDEO] decoder: {}", line);
        }
    }
}

fn is_banner(line: &str) -> bool {
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn unit(data: &[u8]) -> AccessUnit {
        AccessUnit {
            frame_id: 1,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_command_line() {
        let command = FfmpegSink::command("ffmpeg");
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args.join(" "),
            "-y -f h264 -i pipe:0 -f rawvideo -pix_fmt bgr24 -vcodec rawvideo pipe:1"
        );
    }

    #[test]
    fn test_banner_filter() {
        assert!(is_banner("ffmpeg version 6.1 Copyright (c) 2000-2023"));
        assert!(is_banner("libavcodec     60. 31.102 / 60. 31.102"));
        assert!(!is_banner("[h264 @ 0x55] error while decoding MB 3 2"));
    }

    #[test]
    fn test_read_frame_exact_and_short() {
        let mut input: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(read_frame(&mut input, 6).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(matches!(
            read_frame(&mut input, 6),
            Err(SinkError::ShortRead {
                got: 2,
                expected: 6
            })
        ));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = FfmpegSink::spawn("/nonexistent/skyfeed-no-such-decoder", 2, 2);
        assert!(matches!(result, Err(SinkError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_passthrough_decoder_yields_frame() {
        // `cat` echoes the unit back: 2x1 BGR24 is exactly 6 bytes.
        let mut sink = FfmpegSink::with_command(Command::new("cat"), 2, 1)
            .unwrap()
            .with_frame_wait(Duration::from_secs(5));

        let frame = sink.submit(&unit(&[0, 0, 1, 9, 9, 9])).unwrap().unwrap();
        assert_eq!(frame.data, vec![0, 0, 1, 9, 9, 9]);
        assert_eq!(frame.pixel(1, 0), Some([9, 9, 9]));
        assert_eq!(sink.poll().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_decoder_times_out() {
        // `sleep` never reads stdin: the pipe, then the write queue, fill up.
        let mut command = Command::new("sleep");
        command.arg("30");
        let mut sink = FfmpegSink::with_command(command, 2, 1)
            .unwrap()
            .with_frame_wait(Duration::from_millis(1))
            .with_write_timeout(Duration::from_millis(50));

        let big = unit(&vec![0u8; 256 * 1024]);
        let started = Instant::now();
        let mut result = Ok(None);
        for _ in 0..4 * WRITE_QUEUE_DEPTH {
            result = sink.submit(&big);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(SinkError::Stalled { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));

        // Teardown is not held up by the blocked writer.
        let dropped = Instant::now();
        drop(sink);
        assert!(dropped.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_exit_is_error() {
        let mut command = Command::new("head");
        command.args(["-c", "4"]);
        let mut sink = FfmpegSink::with_command(command, 2, 1)
            .unwrap()
            .with_frame_wait(Duration::from_secs(5));

        assert!(sink.submit(&unit(&[0, 0, 1, 9, 9, 9])).is_err());
    }
}
