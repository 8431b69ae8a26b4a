//! Elevation profile charts.

use crate::{
    compose::{drawing_area, to_pixel},
    Track, TrailError,
};
use image::{imageops, Rgb, RgbImage};
use log::{debug, warn};
use plotters::{
    coord::Shift,
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use std::path::Path;

const BORDER: u32 = 40;
const MIN_WIDTH: u32 = 400;

/// Distance between two distance markers, in meters.
const DISTANCE_STEP_M: f64 = 5000.0;

/// Time between two hour markers, in hours.
const TIME_STEP_H: f64 = 1.0;

const CURVE: RGBColor = RGBColor(0x4a, 0x52, 0x82);
const HOUR_BAR: RGBColor = RGBColor(0x17, 0x19, 0x28);
const LABEL: RGBColor = RGBColor(0x11, 0x11, 0x11);
const BACKGROUND: RGBColor = RGBColor(0xcc, 0xcc, 0xcc);

/// Renders `track`'s profile and saves it as an image at `path`.
pub fn render_profile(track: &Track, width: u32, path: impl AsRef<Path>) -> Result<(), TrailError> {
    let image = profile_image(track, width)?;
    image.save(path.as_ref())?;
    debug!("saved profile of {:?} to {}", track.name, path.as_ref().display());
    Ok(())
}

/// Returns an image of `track`'s elevation over cumulative distance.
///
/// The image is `width` pixels wide and a quarter as high. Gaps in
/// the filled curve mark every 5 km and dark bars above it every
/// walking hour.
pub fn profile_image(track: &Track, width: u32) -> Result<RgbImage, TrailError> {
    if !track.is_enriched() {
        return Err(TrailError::NotEnriched(track.name.clone()));
    }
    if width < MIN_WIDTH {
        return Err(TrailError::InvalidInput(format!(
            "profile width {width} is below {MIN_WIDTH} pixels"
        )));
    }
    let samples: Vec<Sample> = track
        .points
        .iter()
        .filter_map(|point| {
            point.cumulative().map(|totals| Sample {
                distance_m: totals.distance_m,
                elevation: point.elevation.unwrap_or_default(),
                time_h: totals.time_h,
            })
        })
        .collect();

    let frame = Frame::new(&samples, width - 2 * BORDER, width / 4 - 2 * BORDER);
    let mut curve = RgbImage::from_pixel(frame.width, frame.height, Rgb([BACKGROUND.0, BACKGROUND.1, BACKGROUND.2]));
    let markers = {
        let root = drawing_area(&mut curve);
        let markers = draw_curve(&root, &frame, &samples)?;
        root.present()?;
        markers
    };

    let mut figure = RgbImage::from_pixel(width, frame.height + 2 * BORDER, Rgb([255, 255, 255]));
    imageops::replace(&mut figure, &curve, i64::from(BORDER), i64::from(BORDER));
    let root = drawing_area(&mut figure);
    draw_labels(&root, &frame, &markers);
    root.present()?;
    drop(root);
    Ok(figure)
}

struct Sample {
    distance_m: f64,
    elevation: f64,
    time_h: f64,
}

/// Maps distance and elevation onto the curve image.
struct Frame {
    width: u32,
    height: u32,
    min_elevation: f64,
    max_elevation: f64,
    x_scale: f64,
    y_scale: f64,
}

impl Frame {
    fn new(samples: &[Sample], width: u32, height: u32) -> Self {
        let (mut min_elevation, mut max_elevation) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.elevation), hi.max(s.elevation))
            });
        if min_elevation >= max_elevation {
            min_elevation -= 10.0;
            max_elevation += 10.0;
        }
        let total_m = samples.last().map_or(0.0, |s| s.distance_m);
        Self {
            width,
            height,
            min_elevation,
            max_elevation,
            x_scale: f64::from(width - 1) / total_m.max(f64::EPSILON),
            y_scale: f64::from(height - 1) / (max_elevation - min_elevation),
        }
    }

    fn project(&self, sample: &Sample) -> (f64, f64) {
        (
            sample.distance_m * self.x_scale,
            f64::from(self.height - 1) - (sample.elevation - self.min_elevation) * self.y_scale,
        )
    }

    #[allow(clippy::cast_possible_wrap)]
    fn bottom(&self) -> i32 {
        self.height as i32 - 1
    }
}

/// Horizontal positions of the distance and hour markers.
#[derive(Default)]
struct Markers {
    distance: Vec<i32>,
    hours: Vec<i32>,
}

fn draw_curve(root: &DrawingArea<BitMapBackend<'_>, Shift>, frame: &Frame, samples: &[Sample]) -> Result<Markers, TrailError> {
    let bottom = frame.bottom();
    #[allow(clippy::cast_possible_wrap)]
    let right = frame.width as i32 - 1;
    let mut outline = vec![(0, bottom)];
    outline.extend(samples.iter().map(|s| to_pixel(frame.project(s))));
    outline.push((right, bottom));
    root.draw(&Polygon::new(outline, CURVE.filled()))?;

    let mut markers = Markers::default();
    let (mut distance_step, mut hour_step) = (0_f64, 0_f64);
    for sample in samples {
        let (x, y) = to_pixel(frame.project(sample));
        let step = (sample.distance_m / DISTANCE_STEP_M).trunc();
        if step > distance_step {
            distance_step = step;
            markers.distance.push(x);
            root.draw(&Rectangle::new([(x - 1, y), (x + 1, bottom)], BACKGROUND.filled()))?;
        }
        let step = (sample.time_h / TIME_STEP_H).trunc();
        if step > hour_step {
            hour_step = step;
            markers.hours.push(x);
            root.draw(&Rectangle::new([(x - 1, 0), (x + 1, y)], HOUR_BAR.filled()))?;
        }
    }
    Ok(markers)
}

/// Writes elevation bounds on both sides, distances below the curve
/// and hours above it.
fn draw_labels(root: &DrawingArea<BitMapBackend<'_>, Shift>, frame: &Frame, markers: &Markers) {
    #[allow(clippy::cast_possible_wrap)]
    let (border, right, bottom) = (
        BORDER as i32,
        (BORDER + frame.width) as i32,
        (BORDER + frame.height) as i32,
    );
    let max = format!("{:.0}m", frame.max_elevation);
    let min = format!("{:.0}m", frame.min_elevation);
    label(root, &max, (border - 3, border), Pos::new(HPos::Right, VPos::Top));
    label(root, &max, (right, border), Pos::new(HPos::Left, VPos::Top));
    label(root, &min, (border - 3, bottom), Pos::new(HPos::Right, VPos::Bottom));
    label(root, &min, (right, bottom), Pos::new(HPos::Left, VPos::Bottom));

    for (i, x) in markers.distance.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let km = (i + 1) as f64 * DISTANCE_STEP_M / 1000.0;
        label(root, &format!("{km:.0}km"), (border + x, bottom + 3), Pos::new(HPos::Center, VPos::Top));
    }
    for (i, x) in markers.hours.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let hours = (i + 1) as f64 * TIME_STEP_H;
        label(root, &format!("{hours:.0}H"), (border + x, border - 3), Pos::new(HPos::Center, VPos::Bottom));
    }
}

fn label(root: &DrawingArea<BitMapBackend<'_>, Shift>, text: &str, at: (i32, i32), pos: Pos) {
    let style = ("sans-serif", 12).into_font().color(&LABEL).pos(pos);
    if let Err(e) = root.draw(&Text::new(text, at, style)) {
        warn!("unable to draw profile label {text:?}: {e}");
    }
}
