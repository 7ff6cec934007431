use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use leanloader::config::Config;
use leanloader::{environment, ImageHandle, PixelDescriptor, SystemBinder};

/// leanloader - decode images through the system imaging library, bound at runtime
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image files to load
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Imaging library to bind instead of the configured one
    #[arg(short, long)]
    library: Option<String>,

    /// Print one JSON object per image
    #[arg(long)]
    json: bool,
}

/// What gets printed for each loaded image
#[derive(Debug, Serialize)]
struct ImageReport {
    path: String,
    width: u32,
    height: u32,
    stride: usize,
    alloc_size: usize,
    pixel_format: String,
    first_pixel: Option<String>,
}

impl ImageReport {
    fn new(path: &Path, descriptor: &PixelDescriptor, first_pixel: Option<u32>) -> Self {
        Self {
            path: path.display().to_string(),
            width: descriptor.width,
            height: descriptor.height,
            stride: descriptor.stride,
            alloc_size: descriptor.alloc_size,
            pixel_format: format!("{:#010x}", descriptor.pixel_format.0),
            first_pixel: first_pixel.map(|argb| format!("{argb:#010x}")),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };

    if let Some(library) = args.library {
        config.library.imaging_library = library;
    }

    // Logs go to stderr so stdout stays machine readable with --json
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    environment()
        .configure(SystemBinder::new(config.library.clone()))
        .context("Failed to configure the imaging library binding")?;

    let mut failures = 0usize;
    for path in &args.paths {
        let mut image = ImageHandle::new(path);
        match image.load() {
            Ok(descriptor) => {
                let first_pixel = image.argb().and_then(|pixels| pixels.first().copied());
                let report = ImageReport::new(path, &descriptor, first_pixel);
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string(&report).context("Failed to serialize report")?
                    );
                } else {
                    println!(
                        "{}: {}x{}, stride {} bytes, {} bytes allocated, format {}, first pixel {}",
                        report.path,
                        report.width,
                        report.height,
                        report.stride,
                        report.alloc_size,
                        report.pixel_format,
                        report.first_pixel.as_deref().unwrap_or("-")
                    );
                }
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
        image.dispose();
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images failed to load", failures, args.paths.len());
    }

    Ok(())
}
