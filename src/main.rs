//! alcam: grab the first frame from a camera and save it as an image

use std::path::PathBuf;

use alcam::capture::PixelFormat;
use alcam::snapshot::{self, Snapshot};
use alcam::{save, Config};
use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "alcam", version, about = "Capture a single camera frame")]
struct Args {
    /// TOML configuration file; also names the default output (`x.toml` -> `x.png`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index (`/dev/videoN`)
    #[arg(short, long)]
    device: Option<usize>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Capture format (rgba, rgb24, bgr24, yuyv4, mjpeg, nv12, i420)
    #[arg(short, long)]
    format: Option<PixelFormat>,

    /// Output image; the extension picks the encoding
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Delay between frame polls
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Give up waiting for a frame after this long (0 waits forever)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Capture without saving
    #[arg(long)]
    no_save: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    /// Command-line flags take precedence over file and environment
    fn apply(&self, config: &mut Config) {
        if let Some(index) = self.device {
            config.camera.index = index;
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if self.format.is_some() {
            config.camera.format = self.format;
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(interval) = self.interval_ms {
            config.poll.interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            config.poll.timeout_ms = timeout;
        }
        if self.no_save {
            config.output.save = false;
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alcam=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    info!("Using configuration: {:?}", config);

    let output =
        snapshot::resolve_output_path(config.output.path.as_deref(), args.config.as_deref())?;

    // Resolved once; absent means the frame is captured but not written
    let saver = save::default_saver(config.output.save);

    let snapshot = run(&config, saver.as_deref(), &output)?;
    match snapshot {
        Snapshot::Saved {
            path,
            width,
            height,
        } => println!("{}x{} -> {}", width, height, path.display()),
        Snapshot::Skipped { width, height } => println!("{}x{} captured, not saved", width, height),
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn run(
    config: &Config,
    saver: Option<&dyn save::FrameSaver>,
    output: &std::path::Path,
) -> Result<Snapshot> {
    let mut camera = alcam::capture::V4l2Camera::open(
        config.camera.index,
        config.camera.width,
        config.camera.height,
        config.camera.format,
    )?;
    let snapshot = snapshot::capture_snapshot(&mut camera, saver, output, &config.poll.policy())?;
    Ok(snapshot)
}

#[cfg(not(target_os = "linux"))]
fn run(
    _config: &Config,
    _saver: Option<&dyn save::FrameSaver>,
    _output: &std::path::Path,
) -> Result<Snapshot> {
    Err(color_eyre::eyre::eyre!("No camera backend for this platform"))
}

#[cfg(target_os = "linux")]
fn list_devices() -> Result<()> {
    let devices = alcam::utils::list_devices();
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn list_devices() -> Result<()> {
    Err(color_eyre::eyre::eyre!("Device listing is only supported on Linux"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "alcam",
            "--device",
            "1",
            "--width",
            "320",
            "--format",
            "yuyv4",
            "--timeout-ms",
            "0",
            "--no-save",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.camera.index, 1);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 720);
        assert_eq!(config.camera.format, Some(PixelFormat::Yuyv4));
        assert_eq!(config.poll.timeout_ms, 0);
        assert!(!config.output.save);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Args::try_parse_from(["alcam", "--format", "h264"]).is_err());
    }
}
