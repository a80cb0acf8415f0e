//! RGB-D Runner
//!
//! Discovers every connected RGB-D device, selects a matching color and
//! depth stream on each, registers their calibration with a frame sink and
//! streams until Ctrl+C (or a configured duration).
//!
//! Devices come from the simulated driver: the built-in two-camera demo rig,
//! or a rig described in JSON (`--rig`).

mod config;
mod stats_sink;

use clap::Parser;
use config::AppConfig;
use rgbd_capture::sim::SimContext;
use rgbd_capture::{Context, Device, Sensor, StreamProfile, pipeline};
use stats_sink::StatsSink;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Stream color and depth from every connected RGB-D device
#[derive(Parser, Debug)]
#[command(name = "rgbd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON rig description for the simulated driver
    #[arg(short, long)]
    rig: Option<PathBuf>,

    /// Target width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Target height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Target frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Shared frame queue capacity
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Sleep after an empty poll, in milliseconds
    #[arg(long)]
    idle_backoff_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// List devices, sensors, and stream profiles, then exit
    #[arg(short, long)]
    list: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(rig) = &self.rig {
            config.rig = Some(rig.clone());
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(backoff) = self.idle_backoff_ms {
            config.idle_backoff_ms = backoff;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = Some(duration);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let context = SimContext::new(config.load_rig()?);

    if args.list {
        return list_devices(&context);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = stop.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let mut sink = StatsSink::new(stop, config.duration(), config.report_interval());
    let stats = pipeline::run(&context, &config.session_config(), &mut sink)?;

    sink.log_summary();
    info!(
        "Forwarded {} frame(s), ignored {}",
        stats.forwarded(),
        stats.ignored_frames
    );
    Ok(())
}

fn list_devices<C: Context>(context: &C) -> Result<(), Box<dyn Error>> {
    let devices = context.query_devices()?;
    println!("{} device(s)", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!("Device {}: serial {}", index, device.serial_number()?);
        for sensor in device.query_sensors()? {
            println!("  Sensor '{}'", sensor.name());
            for profile in sensor.stream_profiles()? {
                let desc = profile.descriptor();
                println!(
                    "    {} {:>4}x{:<4} @ {:>3} fps  uid {}",
                    desc.kind, desc.width, desc.height, desc.fps, desc.uid
                );
            }
        }
    }
    Ok(())
}
