use anyhow::{Context, Error as AnyError};
use clap::{ArgAction, Parser};
use log::LevelFilter;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use trail::{CacheConfig, Config, Credentials};

/// Create a hiking booklet from a GPX file, using OpenTopoMap maps and
/// SRTM elevations.
///
/// Downloading elevations requires an account at
/// urs.earthdata.nasa.gov.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log more, repeat for debug output.
    #[arg(short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Flat ground walking speed, in km/h [default: 4.5].
    #[arg(short = 's', long = "speed")]
    pub flat_speed: Option<f64>,

    /// DEM server credentials as "username:password". Saved for later
    /// runs.
    #[arg(short = 'a', long = "auth")]
    pub credentials: Option<Credentials>,

    /// Input GPX file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// JSON settings file, see `trail::Config` and `trail::CacheConfig`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Tile cache directory [default: hikebooklet in the user cache
    /// directory].
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Tile cache size limit, in MiB.
    #[arg(long)]
    pub cache_size: Option<u64>,

    /// Side of map images, in pixels.
    #[arg(short, long)]
    pub resolution: Option<u32>,

    /// Directory receiving the booklet.
    pub out_dir: PathBuf,
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trail: Config,
    pub cache: CacheConfig,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }

    /// Returns settings from the config file, if any, overridden by
    /// command line options.
    pub fn settings(&self) -> Result<Settings, AnyError> {
        let mut settings = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Settings::default(),
        };
        if let Some(speed) = self.flat_speed {
            settings.trail.flat_speed_kmh = speed;
        }
        if let Some(resolution) = self.resolution {
            settings.trail.resolution = resolution;
        }
        if let Some(root) = &self.cache_dir {
            settings.cache.root = root.clone();
        }
        if let Some(mib) = self.cache_size {
            settings.cache.max_size_bytes = mib * 1024 * 1024;
        }
        Ok(settings)
    }
}
