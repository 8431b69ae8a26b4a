use crate::credentials::CREDENTIALS_FILE;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::PathBuf, time::Duration};

/// Default flat-ground walking pace, in km/h.
pub const DEFAULT_FLAT_SPEED_KMH: f64 = 4.5;

/// Rendering and remote service settings, handed to each component
/// at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Side of the square map images, in pixels.
    pub resolution: u32,

    pub flat_speed_kmh: f64,

    /// Track colors as `#RRGGBB`, cycled across tracks.
    pub palette: Vec<String>,

    /// Map tile URL with `{z}`, `{x}` and `{y}` placeholders.
    pub map_url: String,

    /// Prefix of cached map tile names.
    pub map_cache_prefix: String,

    /// DEM archive URL, `{}` is replaced by the archive name.
    pub dem_url: String,

    pub dem_suffix: String,

    /// Samples per DEM tile row.
    pub dem_resolution: usize,

    /// Host allowed to receive DEM credentials across redirects.
    pub dem_auth_host: String,

    pub http_timeout_secs: u64,

    pub max_zoom: u8,

    /// Preferred on-screen length of the scale bar, in pixels.
    pub scale_bar_px: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: 1024,
            flat_speed_kmh: DEFAULT_FLAT_SPEED_KMH,
            palette: vec!["#236AB9".to_owned(), "#FC7307".to_owned()],
            map_url: "https://tile.opentopomap.org/{z}/{x}/{y}.png".to_owned(),
            map_cache_prefix: "OTM".to_owned(),
            dem_url: "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL1.003/2000.02.11/{}".to_owned(),
            dem_suffix: "SRTMGL1.hgt".to_owned(),
            dem_resolution: srtm::SRTMGL1_RESOLUTION,
            dem_auth_host: "urs.earthdata.nasa.gov".to_owned(),
            http_timeout_secs: 30,
            max_zoom: 18,
            scale_bar_px: 150,
        }
    }
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_size_bytes: u64,
    /// File names never evicted.
    pub retain: BTreeSet<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hikebooklet");
        Self {
            root,
            max_size_bytes: 128 * 1024 * 1024,
            retain: BTreeSet::from([CREDENTIALS_FILE.to_owned()]),
        }
    }
}
