use crate::{
    math::{earth_radius, haversine_distance, hiking_time},
    track::{Cumulative, TrackSummary},
    ElevationService, Track, TrailError,
};
use log::{debug, info, warn};

/// Elevation changes steeper than this ratio of the segment length
/// (about 50°) are treated as bad data.
const MAX_SLOPE_RATIO: f64 = 1.2;

/// Fills elevations and computes cumulative distance, climb and
/// walking time along tracks.
pub struct TrackEnricher<'a, 'c> {
    elevation: &'a ElevationService<'c>,
    flat_speed_kmh: f64,
}

impl<'a, 'c> TrackEnricher<'a, 'c> {
    pub fn new(elevation: &'a ElevationService<'c>, flat_speed_kmh: f64) -> Self {
        Self {
            elevation,
            flat_speed_kmh,
        }
    }

    /// Enriches `track` in place and returns its summary.
    ///
    /// An already enriched track is left untouched.
    pub fn enrich<'t>(&self, track: &'t mut Track) -> Result<&'t TrackSummary, TrailError> {
        if track.points.is_empty() {
            return Err(TrailError::EmptyTrack(track.name.clone()));
        }
        if !track.is_enriched() {
            info!("processing track {:?}, {} points", track.name, track.points.len());
            self.elevation.fill(&mut track.points);
            track.flat_speed_kmh = self.flat_speed_kmh;
            accumulate(track);
        } else {
            debug!("track {:?} already enriched", track.name);
        }
        track.summary().ok_or_else(|| TrailError::NotEnriched(track.name.clone()))
    }
}

/// Computes running totals over `track`'s points, which all have an
/// elevation, and its summary.
///
/// The earth radius is taken once, at the first point.
fn accumulate(track: &mut Track) {
    let flat_speed_kmh = track.flat_speed_kmh;
    let Some(first) = track.points.first_mut() else {
        return;
    };
    let radius = earth_radius(first.lat());
    let mut totals = Cumulative::default();
    first.set_cumulative(totals);

    for idx in 1..track.points.len() {
        let (done, rest) = track.points.split_at_mut(idx);
        let (prev, point) = (&done[idx - 1], &mut rest[0]);

        let distance = haversine_distance(prev, point, Some(radius));
        let (prev_ele, ele) = (prev.elevation.unwrap_or_default(), point.elevation.unwrap_or_default());
        let mut slope = ele - prev_ele;
        if slope.abs() > MAX_SLOPE_RATIO * distance {
            warn!("clamping implausible elevation change of {slope:.1} m over {distance:.1} m");
            point.elevation = Some(prev_ele);
            slope = 0.0;
        }

        totals.distance_m += distance;
        if slope > 0.0 {
            totals.ascent_m += slope;
        } else {
            totals.descent_m -= slope;
        }
        totals.time_h += hiking_time(distance, slope, flat_speed_kmh);
        point.set_cumulative(totals);
    }

    let summary = TrackSummary::new(track, &totals);
    debug!("{summary:?}");
    track.set_summary(summary);
}
