//! Elevation lookup from SRTM tiles.

use crate::{
    http::{EarthdataClient, HttpClient},
    Config, Credentials, TileCache, TrackPoint, TrailError,
};
use log::{debug, info, warn};
use srtm::{CellId, Tile};
use std::io::Cursor;

/// Elevation assigned when a tile is unavailable and no earlier point
/// has one.
pub const FALLBACK_ELEVATION: f64 = 0.001;

/// Outcome of one [`ElevationService::fill`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Points which lacked an elevation.
    pub missing: usize,
    /// Tiles successfully interpolated.
    pub tiles: usize,
    /// Tiles which could not be obtained.
    pub failed_tiles: usize,
    /// Points given a fallback elevation.
    pub fallback_points: usize,
}

pub struct ElevationService<'a> {
    cache: &'a TileCache,
    client: Box<dyn HttpClient>,
    url: String,
    suffix: String,
    resolution: usize,
}

impl<'a> ElevationService<'a> {
    /// Returns a service downloading from the authenticated DEM
    /// server.
    ///
    /// `credentials` are saved to `cache` for later runs; when absent
    /// previously saved ones are used.
    pub fn new(config: &Config, cache: &'a TileCache, credentials: Option<Credentials>) -> Result<Self, TrailError> {
        let credentials = Credentials::resolve(credentials, cache)?;
        if credentials.is_none() {
            warn!("no credentials for {}, DEM downloads will likely fail", config.dem_auth_host);
        }
        let client = EarthdataClient::new(credentials, &config.dem_auth_host, config.http_timeout())?;
        Ok(Self::with_client(config, cache, Box::new(client)))
    }

    pub fn with_client(config: &Config, cache: &'a TileCache, client: Box<dyn HttpClient>) -> Self {
        Self {
            cache,
            client,
            url: config.dem_url.clone(),
            suffix: config.dem_suffix.clone(),
            resolution: config.dem_resolution,
        }
    }

    /// Sets the elevation of every point lacking one.
    ///
    /// Points are processed one tile at a time: each tile is fetched
    /// once and serves every point it contains. When a tile can't be
    /// obtained its points take the last elevation preceding them, or
    /// [`FALLBACK_ELEVATION`].
    pub fn fill(&self, points: &mut [TrackPoint]) -> FillReport {
        let mut report = FillReport {
            missing: points.iter().filter(|point| point.elevation.is_none()).count(),
            ..FillReport::default()
        };
        if report.missing == 0 {
            return report;
        }
        info!("retrieving elevation for {} track points", report.missing);

        while let Some(cell) = points
            .iter()
            .find(|point| point.elevation.is_none())
            .map(|point| CellId::from_coord(point.coord))
        {
            let in_cell = |point: &TrackPoint| point.elevation.is_none() && CellId::from_coord(point.coord) == cell;
            match self.tile(cell) {
                Ok(tile) => {
                    report.tiles += 1;
                    for point in points.iter_mut().filter(|point| in_cell(point)) {
                        point.elevation = Some(tile.interpolate(point.coord));
                    }
                }
                Err(e) => {
                    warn!("no elevation data for {cell}, using fallback: {e}");
                    report.failed_tiles += 1;
                    let mut last = FALLBACK_ELEVATION;
                    for point in points.iter_mut() {
                        if in_cell(point) {
                            point.elevation = Some(last);
                            report.fallback_points += 1;
                        } else if let Some(elevation) = point.elevation {
                            last = elevation;
                        }
                    }
                }
            }
        }
        debug!("{report:?}");
        report
    }
}

/// Private API
impl<'a> ElevationService<'a> {
    /// Returns the tile for `cell`, downloading it into the cache on a
    /// miss.
    ///
    /// An unreadable cached archive is deleted and downloaded again.
    /// Downloads are only cached once they decode.
    fn tile(&self, cell: CellId) -> Result<Tile, TrailError> {
        let name = cell.archive_name(&self.suffix);
        if let Some(path) = self.cache.probe(&name)? {
            match Tile::open(path, self.resolution) {
                Ok(tile) => return Ok(tile),
                Err(e) => {
                    warn!("discarding unreadable cached {name}: {e}");
                    self.cache.remove(&name)?;
                }
            }
        }

        info!("downloading DEM tile {name}");
        let bytes = self.client.get(&self.url.replace("{}", &name))?;
        let tile = Tile::from_archive(cell, self.resolution, Cursor::new(&bytes))?;
        if let Err(e) = self.cache.store(&name, &bytes, false) {
            warn!("unable to cache {name}: {e}");
        }
        Ok(tile)
    }
}
