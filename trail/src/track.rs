use crate::{config::DEFAULT_FLAT_SPEED_KMH, slippy::BoundingBox};
use geo::geometry::Coord;
use serde::Serialize;

/// Running totals from a track's first point up to a given point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Cumulative {
    pub distance_m: f64,
    pub ascent_m: f64,
    /// Positive magnitude of all descents.
    pub descent_m: f64,
    pub time_h: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    /// `x` is longitude, `y` latitude, in degrees.
    pub coord: Coord<f64>,

    /// Meters above sea level.
    pub elevation: Option<f64>,

    pub name: Option<String>,

    /// Recorded time of day, in fractional hours.
    pub time_of_day: Option<f64>,

    /// Set once by enrichment.
    cumulative: Option<Cumulative>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            coord: Coord { x: lon, y: lat },
            elevation: None,
            name: None,
            time_of_day: None,
            cumulative: None,
        }
    }

    #[must_use]
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn lat(&self) -> f64 {
        self.coord.y
    }

    pub fn lon(&self) -> f64 {
        self.coord.x
    }

    pub fn cumulative(&self) -> Option<&Cumulative> {
        self.cumulative.as_ref()
    }

    pub(crate) fn set_cumulative(&mut self, cumulative: Cumulative) {
        self.cumulative = Some(cumulative);
    }
}

/// Per-track totals available once a track is enriched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub name: String,
    pub index: usize,
    pub flat_speed_kmh: f64,
    pub distance_km: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
    /// Walking time as `H:MM:00`.
    pub elapsed: String,
}

impl TrackSummary {
    pub(crate) fn new(track: &Track, last: &Cumulative) -> Self {
        Self {
            name: track.name.clone(),
            index: track.index,
            flat_speed_kmh: track.flat_speed_kmh,
            distance_km: last.distance_m / 1000.0,
            ascent_m: last.ascent_m,
            descent_m: last.descent_m,
            elapsed: elapsed_text(last.time_h),
        }
    }
}

/// An ordered walk. Point order is traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,

    /// Position of this track in its source file.
    pub index: usize,

    pub flat_speed_kmh: f64,

    pub points: Vec<TrackPoint>,

    summary: Option<TrackSummary>,
}

impl Track {
    pub fn new(name: impl Into<String>, index: usize, points: Vec<TrackPoint>) -> Self {
        Self {
            name: name.into(),
            index,
            flat_speed_kmh: DEFAULT_FLAT_SPEED_KMH,
            points,
            summary: None,
        }
    }

    /// Returns the box enclosing all points, `None` for an empty
    /// track.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::around(self.points.iter().map(|point| point.coord))
    }

    pub fn summary(&self) -> Option<&TrackSummary> {
        self.summary.as_ref()
    }

    /// Returns `true` if every point carries cumulative totals.
    pub fn is_enriched(&self) -> bool {
        self.summary.is_some() && self.points.iter().all(|point| point.cumulative.is_some())
    }

    pub(crate) fn set_summary(&mut self, summary: TrackSummary) {
        self.summary = Some(summary);
    }
}

/// Formats fractional `hours` as `H:MM:00`, truncating to the minute.
pub(crate) fn elapsed_text(hours: f64) -> String {
    let hours = hours.max(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (whole, minutes) = (hours as u64, (hours.fract() * 60.0) as u64);
    format!("{whole}:{minutes:02}:00")
}
