//! Map images: tile grid stitching and track overlays.

use crate::{
    http::HttpClient,
    slippy::{self, BoundingBox, Scales, TileIndex, TILE_SIZE},
    Config, TileCache, Track, TrailError,
};
use geo::geometry::Coord;
use image::{imageops, RgbImage};
use log::{error, info, warn};
use plotters::{
    coord::Shift,
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use rayon::prelude::*;

/// Distance of the scale bar from the image's bottom right corner.
const SCALE_BAR_MARGIN: i32 = 20;

/// Fetches and stitches slippy map tiles.
pub struct TileGrid<'a> {
    cache: &'a TileCache,
    client: Box<dyn HttpClient>,
    url: String,
    cache_prefix: String,
}

impl<'a> TileGrid<'a> {
    pub fn new(config: &Config, cache: &'a TileCache, client: Box<dyn HttpClient>) -> Self {
        Self {
            cache,
            client,
            url: config.map_url.clone(),
            cache_prefix: config.map_cache_prefix.clone(),
        }
    }

    /// Returns an image of all tiles in `[top_left, bottom_right)`.
    ///
    /// Tiles are fetched concurrently. A tile which can't be fetched
    /// or decoded is logged and left black.
    pub fn build_canvas(&self, top_left: TileIndex, bottom_right: TileIndex) -> RgbImage {
        let dx = bottom_right.x.saturating_sub(top_left.x);
        let dy = bottom_right.y.saturating_sub(top_left.y);
        let mut canvas = RgbImage::new(dx * TILE_SIZE, dy * TILE_SIZE);
        let tiles: Vec<(u32, u32)> = (0..dx).flat_map(|i| (0..dy).map(move |j| (i, j))).collect();
        info!("retrieving {} map tiles at zoom {}", tiles.len(), top_left.zoom);

        let images: Vec<_> = tiles
            .par_iter()
            .map(|&(i, j)| (i, j, self.tile_image(top_left.offset(i, j))))
            .collect();
        for (i, j, image) in images {
            if let Some(image) = image {
                imageops::replace(
                    &mut canvas,
                    &image,
                    i64::from(i * TILE_SIZE),
                    i64::from(j * TILE_SIZE),
                );
            }
        }
        canvas
    }

    fn tile_image(&self, tile: TileIndex) -> Option<RgbImage> {
        match self.fetch_tile(tile) {
            Ok(image) => Some(image),
            Err(e) => {
                error!("unable to retrieve map tile {}-{}-{}: {e}", tile.zoom, tile.x, tile.y);
                None
            }
        }
    }

    /// Returns tile `zoom/x/y` from the cache, or downloads it.
    ///
    /// A cached tile which doesn't decode counts as a miss. Downloads
    /// are only cached once they decode.
    fn fetch_tile(&self, TileIndex { zoom, x, y }: TileIndex) -> Result<RgbImage, TrailError> {
        let name = format!("{}-{zoom}-{x}-{y}.png", self.cache_prefix);
        if let Some(bytes) = self.cache.load(&name, false)? {
            match decode_tile(&bytes) {
                Ok(image) => return Ok(image),
                Err(e) => warn!("ignoring unreadable cached {name}: {e}"),
            }
        }
        info!("downloading map tile {name}");
        let url = self
            .url
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        let bytes = self.client.get(&url)?;
        let image = decode_tile(&bytes)?;
        if let Err(e) = self.cache.store(&name, &bytes, false) {
            warn!("unable to cache {name}: {e}");
        }
        Ok(image)
    }
}

fn decode_tile(bytes: &[u8]) -> Result<RgbImage, TrailError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// A square map centered on one or more tracks.
pub struct TrackMap {
    pub image: RgbImage,
    pub zoom: u8,
    pub scales: Scales,
    /// Area covered by `image`.
    pub bbox: BoundingBox,
}

/// Renders tracks over a [`TileGrid`].
pub struct TrackMapBuilder<'a> {
    grid: TileGrid<'a>,
    resolution: u32,
    max_zoom: u8,
    palette: Vec<RGBColor>,
    scale_bar_px: u32,
}

impl<'a> TrackMapBuilder<'a> {
    pub fn new(config: &Config, grid: TileGrid<'a>) -> Result<Self, TrailError> {
        let palette = config
            .palette
            .iter()
            .map(|hex| parse_color(hex))
            .collect::<Result<Vec<_>, _>>()?;
        if palette.is_empty() {
            return Err(TrailError::InvalidInput("empty track palette".to_owned()));
        }
        Ok(Self {
            grid,
            resolution: config.resolution,
            max_zoom: config.max_zoom,
            palette,
            scale_bar_px: config.scale_bar_px,
        })
    }

    /// Returns a `resolution` square map with `tracks` drawn over it.
    pub fn build(&self, tracks: &[&Track]) -> Result<TrackMap, TrailError> {
        let bbox = tracks
            .iter()
            .filter_map(|track| track.bounding_box())
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| TrailError::InvalidInput("no track points to map".to_owned()))?;

        let zoom = slippy::choose_zoom(&bbox, self.resolution, self.max_zoom);
        let scales = slippy::scales(&bbox, zoom);
        let bbox = slippy::reshape_to_square(&bbox, self.resolution, &scales);
        let (top_left, bottom_right) = slippy::tile_span(&bbox, zoom);
        let origin = slippy::tile_to_lat_lon(top_left);

        let mut canvas = self.grid.build_canvas(top_left, bottom_right);
        let paths: Vec<Vec<(f64, f64)>> = tracks
            .iter()
            .map(|track| {
                track
                    .points
                    .iter()
                    .map(|point| project_point(point.coord, origin, &scales))
                    .collect()
            })
            .collect();
        overlay_tracks(&mut canvas, &paths, &self.palette)?;

        let mut image = crop(&canvas, &bbox, origin, &scales);
        draw_scale_bar(&mut image, &scales, self.scale_bar_px)?;
        Ok(TrackMap {
            image,
            zoom,
            scales,
            bbox,
        })
    }
}

/// Returns `coord`'s pixel position on a canvas whose northwest
/// corner is `origin`.
pub fn project_point(coord: Coord<f64>, origin: Coord<f64>, scales: &Scales) -> (f64, f64) {
    (
        (coord.x - origin.x) / scales.lon_per_pixel,
        (origin.y - coord.y) / scales.lat_per_pixel,
    )
}

/// Draws each path as a thick line with a dot on every point.
///
/// Line colors cycle through `palette` starting at its first entry,
/// dot colors starting at its second.
pub fn overlay_tracks(canvas: &mut RgbImage, paths: &[Vec<(f64, f64)>], palette: &[RGBColor]) -> Result<(), TrailError> {
    let root = drawing_area(canvas);
    let n = palette.len().max(1);
    let color = |idx: usize| palette.get(idx % n).copied().unwrap_or(BLACK);
    for (idx, path) in paths.iter().enumerate() {
        let pixels: Vec<(i32, i32)> = path.iter().map(|&p| to_pixel(p)).collect();
        root.draw(&PathElement::new(pixels, color(idx).stroke_width(5)))?;
    }
    for (idx, path) in paths.iter().enumerate() {
        for &p in path {
            root.draw(&Circle::new(to_pixel(p), 1, color(idx + 1).filled()))?;
        }
    }
    root.present()?;
    Ok(())
}

/// Returns the part of `canvas` covering `bbox`.
pub fn crop(canvas: &RgbImage, bbox: &BoundingBox, origin: Coord<f64>, scales: &Scales) -> RgbImage {
    let (width, height) = canvas.dimensions();
    let (x0, y0) = project_point(bbox.top_left, origin, scales);
    let (x1, y1) = project_point(bbox.bottom_right, origin, scales);
    let clamp = |v: f64, max: u32| -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = v.round().clamp(0.0, f64::from(max)) as u32;
        v
    };
    let (x0, y0, x1, y1) = (clamp(x0, width), clamp(y0, height), clamp(x1, width), clamp(y1, height));
    imageops::crop_imm(canvas, x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)).to_image()
}

/// Returns `(meters, pixels)` of a round scale bar length close to
/// `target_px` pixels.
///
/// The length's leading digit is kept and the rest zeroed, so the bar
/// is never longer than `target_px`.
pub fn scale_bar_length(meters_per_pixel: f64, target_px: u32) -> (f64, f64) {
    let span = f64::from(target_px) * meters_per_pixel;
    if span.is_nan() || span <= 0.0 {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_possible_truncation)]
    let unit = 10_f64.powi(span.log10().trunc() as i32);
    let meters = (span / unit).trunc() * unit;
    (meters, meters / meters_per_pixel)
}

/// Formats a scale bar length, switching to kilometers at 1 km.
pub fn scale_bar_label(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{meters:.0}m")
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

/// Draws a labelled scale bar in the bottom right corner.
///
/// A label which can't be rendered, e.g. for lack of fonts, is
/// skipped with a warning.
pub fn draw_scale_bar(canvas: &mut RgbImage, scales: &Scales, target_px: u32) -> Result<(), TrailError> {
    let (meters, pixels) = scale_bar_length(scales.meters_per_pixel, target_px);
    if meters <= 0.0 {
        return Ok(());
    }
    let (width, height) = canvas.dimensions();
    #[allow(clippy::cast_possible_wrap)]
    let p1 = (width as i32 - SCALE_BAR_MARGIN, height as i32 - SCALE_BAR_MARGIN);
    #[allow(clippy::cast_possible_truncation)]
    let p0 = (p1.0 - pixels.round() as i32, p1.1);

    let root = drawing_area(canvas);
    root.draw(&PathElement::new(vec![p0, p1], BLACK.stroke_width(2)))?;
    let style = ("sans-serif", 20)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Right, VPos::Bottom));
    if let Err(e) = root.draw(&Text::new(scale_bar_label(meters), (p1.0, p1.1 - 4), style)) {
        warn!("unable to draw scale label: {e}");
    }
    root.present()?;
    Ok(())
}

/// Parses a `#RRGGBB` color.
pub fn parse_color(hex: &str) -> Result<RGBColor, TrailError> {
    let mk_err = || TrailError::Color(hex.to_owned());
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(mk_err());
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).map_err(|_| mk_err());
    Ok(RGBColor(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

pub(crate) fn drawing_area(canvas: &mut RgbImage) -> DrawingArea<BitMapBackend<'_>, Shift> {
    let size = canvas.dimensions();
    let buffer: &mut [u8] = canvas;
    BitMapBackend::with_buffer(buffer, size).into_drawing_area()
}

pub(crate) fn to_pixel((x, y): (f64, f64)) -> (i32, i32) {
    #[allow(clippy::cast_possible_truncation)]
    (x.round() as i32, y.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::{
        crop, overlay_tracks, parse_color, project_point, scale_bar_label, scale_bar_length,
        TileGrid, TrackMapBuilder,
    };
    use crate::{
        elevation::tests::test_cache,
        http::mock::MockHttpClient,
        slippy::{self, BoundingBox, Scales, TileIndex},
        Config, Track, TrackPoint, TrailError,
    };
    use approx::assert_relative_eq;
    use geo::geometry::Coord;
    use image::{ImageFormat, Rgb, RgbImage};
    use plotters::style::RGBColor;
    use std::{io::Cursor, sync::atomic::Ordering};
    use tempfile::TempDir;

    const GREEN: Rgb<u8> = Rgb([10, 200, 30]);

    fn png_tile() -> Vec<u8> {
        let tile = RgbImage::from_pixel(256, 256, GREEN);
        let mut bytes = Cursor::new(Vec::new());
        tile.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn unit_scales() -> Scales {
        Scales {
            meters_per_pixel: 1.0,
            lat_per_pixel: 0.001,
            lon_per_pixel: 0.002,
        }
    }

    #[test]
    fn test_build_canvas() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let client = MockHttpClient::serving(png_tile());
        let (calls, urls) = (client.calls(), client.urls());
        let grid = TileGrid::new(&Config::default(), &cache, Box::new(client));
        let tl = TileIndex { zoom: 10, x: 530, y: 360 };
        let canvas = grid.build_canvas(tl, tl.offset(2, 1));
        assert_eq!(canvas.dimensions(), (512, 256));
        assert_eq!(*canvas.get_pixel(0, 0), GREEN);
        assert_eq!(*canvas.get_pixel(511, 255), GREEN);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(urls
            .lock()
            .unwrap()
            .contains(&"https://tile.opentopomap.org/10/531/360.png".to_owned()));
        assert!(dir.path().join("OTM-10-530-360.png").exists());

        // Second pass is served from the cache.
        grid.build_canvas(tl, tl.offset(2, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_tiles_are_blank() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let grid = TileGrid::new(&Config::default(), &cache, Box::new(MockHttpClient::failing()));
        let tl = TileIndex { zoom: 3, x: 1, y: 1 };
        let canvas = grid.build_canvas(tl, tl.offset(1, 1));
        assert_eq!(canvas.dimensions(), (256, 256));
        assert_eq!(*canvas.get_pixel(128, 128), Rgb([0, 0, 0]));

        let garbage = MockHttpClient::serving(b"not a png".to_vec());
        let grid = TileGrid::new(&Config::default(), &cache, Box::new(garbage));
        let canvas = grid.build_canvas(tl, tl.offset(1, 1));
        assert_eq!(*canvas.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert!(cache.load("OTM-3-1-1.png", false).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_cached_tile_is_downloaded() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        cache.store("OTM-3-1-1.png", b"<html>rate limited</html>", false).unwrap();
        let client = MockHttpClient::serving(png_tile());
        let calls = client.calls();
        let grid = TileGrid::new(&Config::default(), &cache, Box::new(client));
        let tl = TileIndex { zoom: 3, x: 1, y: 1 };
        let canvas = grid.build_canvas(tl, tl.offset(1, 1));
        assert_eq!(*canvas.get_pixel(128, 128), GREEN);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        grid.build_canvas(tl, tl.offset(1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tile_used_when_cache_write_fails() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        // A directory in place of the entry makes the write fail.
        std::fs::create_dir(dir.path().join("OTM-3-1-1.png")).unwrap();
        let grid = TileGrid::new(&Config::default(), &cache, Box::new(MockHttpClient::serving(png_tile())));
        let tl = TileIndex { zoom: 3, x: 1, y: 1 };
        let canvas = grid.build_canvas(tl, tl.offset(1, 1));
        assert_eq!(*canvas.get_pixel(128, 128), GREEN);
    }

    #[test]
    fn test_project_point() {
        let origin = Coord { x: 6.0, y: 46.0 };
        let (x, y) = project_point(Coord { x: 6.2, y: 45.9 }, origin, &unit_scales());
        assert_relative_eq!(x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(y, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overlay_draws_palette_colors() {
        let mut canvas = RgbImage::new(64, 64);
        let palette = [RGBColor(255, 0, 0), RGBColor(0, 0, 255)];
        overlay_tracks(&mut canvas, &[vec![(5.0, 32.0), (58.0, 32.0)]], &palette).unwrap();
        // Line body in the first color, point dots in the second.
        assert_eq!(*canvas.get_pixel(32, 32), Rgb([255, 0, 0]));
        assert_eq!(*canvas.get_pixel(5, 32), Rgb([0, 0, 255]));
        assert_eq!(*canvas.get_pixel(32, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop() {
        let mut canvas = RgbImage::new(300, 300);
        canvas.put_pixel(100, 50, GREEN);
        let origin = Coord { x: 6.0, y: 46.0 };
        let bbox = BoundingBox::new(Coord { x: 6.2, y: 45.95 }, Coord { x: 6.4, y: 45.85 });
        let cropped = crop(&canvas, &bbox, origin, &unit_scales());
        assert_eq!(cropped.dimensions(), (100, 100));
        assert_eq!(*cropped.get_pixel(0, 0), GREEN);
    }

    #[test]
    fn test_scale_bar_length() {
        let (meters, pixels) = scale_bar_length(10.0, 150);
        assert_relative_eq!(meters, 1000.0);
        assert_relative_eq!(pixels, 100.0);
        let (meters, pixels) = scale_bar_length(3.0, 150);
        assert_relative_eq!(meters, 400.0);
        assert_relative_eq!(pixels, 400.0 / 3.0);
        assert_eq!(scale_bar_length(0.0, 150), (0.0, 0.0));
    }

    #[test]
    fn test_scale_bar_label() {
        assert_eq!(scale_bar_label(400.0), "400m");
        assert_eq!(scale_bar_label(1000.0), "1.0km");
        assert_eq!(scale_bar_label(20_000.0), "20.0km");
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#236AB9").unwrap(), RGBColor(0x23, 0x6a, 0xb9));
        assert_eq!(parse_color("fc7307").unwrap(), RGBColor(0xfc, 0x73, 0x07));
        assert!(matches!(parse_color("#12345"), Err(TrailError::Color(_))));
        assert!(parse_color("#GGGGGG").is_err());
    }

    #[test]
    fn test_build_track_map() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let config = Config {
            resolution: 512,
            ..Config::default()
        };
        let grid = TileGrid::new(&config, &cache, Box::new(MockHttpClient::serving(png_tile())));
        let builder = TrackMapBuilder::new(&config, grid).unwrap();
        let track = Track::new(
            "loop",
            0,
            vec![
                TrackPoint::new(45.90, 6.80),
                TrackPoint::new(45.95, 6.87),
                TrackPoint::new(45.88, 6.92),
            ],
        );
        let map = builder.build(&[&track]).unwrap();
        let (w, h) = map.image.dimensions();
        assert!((511..=513).contains(&w), "{w}");
        assert!((511..=513).contains(&h), "{h}");
        assert_eq!(map.zoom, slippy::choose_zoom(&track.bounding_box().unwrap(), 512, 18));
        // Track color somewhere in the image.
        let blue = image::Rgb([0x23, 0x6a, 0xb9]);
        assert!(map.image.pixels().any(|p| *p == blue));
    }

    #[test]
    fn test_build_without_points() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let config = Config::default();
        let grid = TileGrid::new(&config, &cache, Box::new(MockHttpClient::failing()));
        let builder = TrackMapBuilder::new(&config, grid).unwrap();
        let empty = Track::new("empty", 0, Vec::new());
        assert!(matches!(builder.build(&[&empty]), Err(TrailError::InvalidInput(_))));
    }
}
