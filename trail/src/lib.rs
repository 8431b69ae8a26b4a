//! Hiking track enrichment and rendering.
//!
//! Tracks read from GPX files are enriched with SRTM elevations,
//! cumulative distance, climb and estimated walking time, then drawn
//! as elevation profiles and over slippy map tiles.

mod cache;
mod compose;
mod config;
mod credentials;
mod elevation;
mod enrich;
mod error;
pub mod gpx;
pub mod http;
pub mod math;
mod profile;
pub mod slippy;
mod track;

pub use crate::{
    cache::TileCache,
    compose::{
        crop, draw_scale_bar, overlay_tracks, parse_color, project_point, scale_bar_label,
        scale_bar_length, TileGrid, TrackMap, TrackMapBuilder,
    },
    config::{CacheConfig, Config, DEFAULT_FLAT_SPEED_KMH},
    credentials::{Credentials, CREDENTIALS_FILE},
    elevation::{ElevationService, FillReport, FALLBACK_ELEVATION},
    enrich::TrackEnricher,
    error::TrailError,
    profile::{profile_image, render_profile},
    track::{Cumulative, Track, TrackPoint, TrackSummary},
};
pub use geo;
pub use srtm;
