// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! skyfeed-viewer - receive and decode a drone's live video feed
//!
//! # Usage
//!
//! ```bash
//! # Defaults: device at 192.168.1.1, control 3333, video 2224, 1280x720@25
//! skyfeed-viewer
//!
//! # Dump decoded BGR24 frames for playback with ffplay
//! skyfeed-viewer --output feed.bgr
//! ffplay -f rawvideo -pixel_format bgr24 -video_size 1280x720 feed.bgr
//!
//! # Using a configuration file
//! skyfeed-viewer --config skyfeed.toml
//! skyfeed-viewer gen-config -o skyfeed.toml
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use skyfeed::sink::{DecodeSink, FfmpegSink, RasterFrame};
use skyfeed::{SinkError, StreamConfig, StreamService, StreamStats};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Drone live video receiver
#[derive(Parser, Debug)]
#[command(name = "skyfeed-viewer")]
#[command(about = "Receive, reassemble and decode a drone's live video feed")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device address
    #[arg(long)]
    host: Option<IpAddr>,

    /// Device control port
    #[arg(long)]
    control_port: Option<u16>,

    /// Local video port
    #[arg(long)]
    video_port: Option<u16>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Requested frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Requested bitrate (kbit/s)
    #[arg(long)]
    bitrate: Option<u32>,

    /// Decoder executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,

    /// Append decoded BGR24 frames to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "5")]
    stats_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a configuration file with the default values
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "skyfeed.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .format_timestamp_millis()
        .init();

    let result = match args.command {
        Some(Commands::GenConfig { ref output }) => cmd_gen_config(output),
        Some(Commands::Validate { ref config }) => cmd_validate(config),
        None => run(&args),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn build_config(args: &Args) -> Result<StreamConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => StreamConfig::from_file(path)?,
        None => StreamConfig::default(),
    };

    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.control_port {
        config.control_port = port;
    }
    if let Some(port) = args.video_port {
        config.video_port = port;
    }
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate_kbps = bitrate;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    let (width, height) = (config.width, config.height);

    let program = args.ffmpeg.clone();
    let factory = move || -> Result<Box<dyn DecodeSink>, SinkError> {
        Ok(Box::new(FfmpegSink::spawn(&program, width, height)?))
    };

    let mut dump = match &args.output {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let consumer = move |frame: RasterFrame| {
        let Some(out) = dump.as_mut() else { return };
        if let Err(e) = out.write_all(&frame.data) {
            log::error!("frame dump failed, disabling output: {}", e);
            dump = None;
        }
    };

    eprintln!("{} skyfeed-viewer v{}", ">>>".green().bold(), env!("CARGO_PKG_VERSION"));
    eprintln!(
        "    device={} video=:{} stream={}x{}@{} {}kbit/s",
        config.control_addr(),
        config.video_port,
        width,
        height,
        config.fps,
        config.bitrate_kbps
    );
    if let Some(path) = &args.output {
        eprintln!("    dumping frames to {}", path.display());
    }
    eprintln!("{}", "    Press Ctrl+C to stop...".dimmed());

    let mut handle = StreamService::start(config, factory, consumer)?;

    let signal = handle.shutdown_signal();
    let on_interrupt = signal.clone();
    ctrlc::set_handler(move || on_interrupt.trigger())?;

    let slice = Duration::from_millis(100);
    if args.stats_interval == 0 {
        while signal.sleep(Duration::from_secs(3600), slice) {}
    } else {
        let interval = Duration::from_secs(args.stats_interval);
        while signal.sleep(interval, slice) {
            print_stats(&handle.stats(), handle.telemetry());
        }
    }

    eprintln!();
    eprintln!("{} shutting down...", ">>>".yellow().bold());
    handle.shutdown();
    print_summary(&handle.stats());
    Ok(())
}

fn print_stats(stats: &StreamStats, telemetry: Option<skyfeed::ctp::Telemetry>) {
    let session = if stats.session.is_streaming() {
        stats.session.to_string().green()
    } else {
        stats.session.to_string().yellow()
    };
    let mut line = format!(
        "[{}] rx={} dgrams ({:.1} MB) dropped={} frames={} decoded={} pending={}",
        session,
        stats.datagrams,
        stats.bytes as f64 / 1_000_000.0,
        stats.queue.dropped,
        stats.reassembly.frames_completed,
        stats.frames_decoded,
        stats.reassembly.pending_frames
    );
    if let Some(t) = telemetry {
        line.push_str(&format!(
            " alt={:.1}cm batt={}%",
            t.altitude_cm, t.battery_percent
        ));
    }
    eprintln!("{}", line);
}

fn print_summary(stats: &StreamStats) {
    let r = &stats.reassembly;
    eprintln!("{}", "Summary".bold());
    eprintln!("  handshakes        {}", stats.handshakes);
    eprintln!("  disconnects       {}", stats.disconnects);
    eprintln!("  keepalives        {}", stats.keepalives);
    eprintln!("  datagrams         {}", stats.datagrams);
    eprintln!("  ring drops        {}", stats.queue.dropped);
    eprintln!("  frames completed  {}", r.frames_completed);
    eprintln!("  frames invalid    {}", r.frames_invalid);
    eprintln!(
        "  frames lost       {} (timed out) / {} (evicted)",
        r.frames_timed_out, r.frames_evicted
    );
    eprintln!("  fragments bad     {}", r.fragments_rejected);
    eprintln!("  frames decoded    {}", stats.frames_decoded);
    if stats.sink_failures > 0 {
        eprintln!(
            "  decoder restarts  {}",
            stats.sink_failures.to_string().red()
        );
    }
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = StreamConfig::default().to_toml()?;
    let content = format!(
        r#"# skyfeed receiver configuration
# Generated by skyfeed-viewer gen-config

{}
"#,
        toml_str
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match StreamConfig::from_file(path) {
        Ok(config) => {
            println!("{}", "Configuration valid!".green());
            println!();
            println!("Device:  {}", config.control_addr());
            println!("Video:   {}", config.video_bind_addr());
            println!(
                "Stream:  {}x{}@{} {}kbit/s",
                config.width, config.height, config.fps, config.bitrate_kbps
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Configuration invalid".red(), e);
            std::process::exit(1);
        }
    }
}
