//! Web-Mercator slippy map tile math.
//!
//! # References
//!
//! 1. [Slippy map tilenames](https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames)
//! 1. [Zoom levels](https://wiki.openstreetmap.org/wiki/Zoom_levels)

use geo::geometry::Coord;
use serde::Serialize;
use std::f64::consts::PI;

/// Side of a map tile, in pixels.
pub const TILE_SIZE: u32 = 256;

/// Meters per pixel at the equator at zoom 0.
const EQUATOR_METERS_PER_PIXEL: f64 = 156_543.03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileIndex {
    /// Returns the tile `dx` columns east and `dy` rows south of
    /// `self`.
    pub fn offset(self, dx: u32, dy: u32) -> Self {
        Self {
            zoom: self.zoom,
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Lat/lon rectangle, `x` is longitude and `y` latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top_left: Coord<f64>,
    pub bottom_right: Coord<f64>,
}

impl BoundingBox {
    pub fn new(top_left: Coord<f64>, bottom_right: Coord<f64>) -> Self {
        debug_assert!(top_left.y >= bottom_right.y);
        debug_assert!(top_left.x <= bottom_right.x);
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Returns the smallest box containing all `coords`.
    pub fn around<I: IntoIterator<Item = Coord<f64>>>(coords: I) -> Option<Self> {
        let mut coords = coords.into_iter();
        let first = coords.next()?;
        let (mut tl, mut br) = (first, first);
        for Coord { x, y } in coords {
            tl.x = tl.x.min(x);
            tl.y = tl.y.max(y);
            br.x = br.x.max(x);
            br.y = br.y.min(y);
        }
        Some(Self::new(tl, br))
    }

    /// Returns the smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            Coord {
                x: self.top_left.x.min(other.top_left.x),
                y: self.top_left.y.max(other.top_left.y),
            },
            Coord {
                x: self.bottom_right.x.max(other.bottom_right.x),
                y: self.bottom_right.y.min(other.bottom_right.y),
            },
        )
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.top_left.x + self.bottom_right.x) / 2.0,
            y: (self.top_left.y + self.bottom_right.y) / 2.0,
        }
    }
}

/// Ground and angular size of one map pixel around a box's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scales {
    pub meters_per_pixel: f64,
    pub lat_per_pixel: f64,
    pub lon_per_pixel: f64,
}

/// Returns the largest zoom at which `bbox` spans at most
/// `resolution_px / 256` tiles along both axes, capped to
/// `max_zoom`.
pub fn choose_zoom(bbox: &BoundingBox, resolution_px: u32, max_zoom: u8) -> u8 {
    let n = f64::from(resolution_px) / f64::from(TILE_SIZE);
    let a = (mercator_y(bbox.top_left.y) - mercator_y(bbox.bottom_right.y)).abs();
    let z_lat = (n * PI / a).log2() + 1.0;
    let b = (bbox.bottom_right.x.to_radians() - bbox.top_left.x.to_radians()).abs();
    let z_lon = (n * PI / b).log2() + 1.0;
    let zoom = z_lat.min(z_lon);
    if zoom.is_nan() || zoom < 0.0 {
        0
    } else if zoom >= f64::from(max_zoom) {
        max_zoom
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let zoom = zoom.floor() as u8;
        zoom
    }
}

/// Returns the tile containing `coord` at `zoom`.
pub fn lat_lon_to_tile(coord: Coord<f64>, zoom: u8) -> TileIndex {
    let n = f64::from(zoom).exp2();
    let x = (coord.x + 180.0) / 360.0 * n;
    let y = (1.0 - mercator_y(coord.y) / PI) / 2.0 * n;
    let last = n - 1.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    TileIndex {
        zoom,
        x: x.floor().clamp(0.0, last) as u32,
        y: y.floor().clamp(0.0, last) as u32,
    }
}

/// Returns the northwest corner of `tile`.
pub fn tile_to_lat_lon(tile: TileIndex) -> Coord<f64> {
    let n = f64::from(tile.zoom).exp2();
    let lon = f64::from(tile.x) / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * f64::from(tile.y) / n)).sinh().atan();
    Coord {
        x: lon,
        y: lat.to_degrees(),
    }
}

/// Returns per-pixel scales at `bbox`'s center for `zoom`.
///
/// Angular scales are measured on the tile under the center.
pub fn scales(bbox: &BoundingBox, zoom: u8) -> Scales {
    let middle = bbox.center();
    let meters_per_pixel =
        EQUATOR_METERS_PER_PIXEL * middle.y.to_radians().cos() / f64::from(zoom).exp2();
    let tile = lat_lon_to_tile(middle, zoom);
    let tl = tile_to_lat_lon(tile);
    let br = tile_to_lat_lon(tile.offset(1, 1));
    let size = f64::from(TILE_SIZE);
    Scales {
        meters_per_pixel,
        lat_per_pixel: (tl.y - br.y) / size,
        lon_per_pixel: (br.x - tl.x) / size,
    }
}

/// Pads `bbox` evenly on all sides so that it renders as a
/// `resolution_px` square at `scales`.
pub fn reshape_to_square(bbox: &BoundingBox, resolution_px: u32, scales: &Scales) -> BoundingBox {
    let res = f64::from(resolution_px);
    let BoundingBox {
        top_left: tl,
        bottom_right: br,
    } = *bbox;
    let dx = (res - (br.x - tl.x) / scales.lon_per_pixel) / 2.0;
    let dy = (res - (tl.y - br.y) / scales.lat_per_pixel) / 2.0;
    let (dlon, dlat) = (dx * scales.lon_per_pixel, dy * scales.lat_per_pixel);
    BoundingBox {
        top_left: Coord {
            x: tl.x - dlon,
            y: tl.y + dlat,
        },
        bottom_right: Coord {
            x: br.x + dlon,
            y: br.y - dlat,
        },
    }
}

/// Returns the `[top_left, bottom_right_exclusive)` tile span
/// covering `bbox`.
pub fn tile_span(bbox: &BoundingBox, zoom: u8) -> (TileIndex, TileIndex) {
    let tl = lat_lon_to_tile(bbox.top_left, zoom);
    let br = lat_lon_to_tile(bbox.bottom_right, zoom);
    (tl, br.offset(1, 1))
}

fn mercator_y(lat_deg: f64) -> f64 {
    lat_deg.to_radians().tan().asinh()
}
