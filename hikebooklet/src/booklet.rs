use anyhow::{Context, Error as AnyError};
use chrono::NaiveDateTime;
use log::{error, info};
use quick_xml::escape::escape;
use std::{fs, path::Path};
use trail::{
    gpx::{self, Gpx},
    render_profile, Track, TrackEnricher, TrackMapBuilder, TrackSummary, TrailError,
};

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style type="text/css">@media print { footer { page-break-after: always; } }</style>
</head>
<body>
"#;

const HTML_TAIL: &str = "</body>\n</html>\n";

/// Writes one map and one profile page per track, plus an index
/// gathering them.
pub struct Booklet<'a> {
    enricher: TrackEnricher<'a, 'a>,
    maps: TrackMapBuilder<'a>,
    resolution: u32,
}

impl<'a> Booklet<'a> {
    pub fn new(enricher: TrackEnricher<'a, 'a>, maps: TrackMapBuilder<'a>, resolution: u32) -> Self {
        Self {
            enricher,
            maps,
            resolution,
        }
    }

    /// Enriches every track of `gpx` and writes the booklet to
    /// `out_dir`.
    ///
    /// Only failing to create `out_dir` is an error. A track which
    /// can't be processed, or an output which can't be saved, is
    /// logged and skipped. Written GPX times start at `start`.
    pub fn write(&self, gpx: &mut Gpx, out_dir: &Path, start: NaiveDateTime) -> Result<Vec<TrackSummary>, AnyError> {
        fs::create_dir_all(out_dir).with_context(|| format!("unable to create directory {}", out_dir.display()))?;

        let count = gpx.tracks.len();
        let mut html = String::from(HTML_HEAD);
        let mut summaries = Vec::with_capacity(count);
        for (idx, track) in gpx.tracks.iter_mut().enumerate() {
            let num = idx + 1;
            info!("processing track {num}/{count}");
            let summary = match self.enricher.enrich(track) {
                Ok(summary) => summary.clone(),
                Err(e) => {
                    error!("skipping track {:?}: {e}", track.name);
                    continue;
                }
            };

            let profile = profile_name(num);
            if let Err(e) = render_profile(track, self.resolution, out_dir.join(&profile)) {
                error!("unable to draw profile of {:?}: {e}", track.name);
            }
            info!("mapping track {num}/{count}");
            let map = map_name(num);
            if let Err(e) = self.write_map(track, &out_dir.join(&map)) {
                error!("unable to draw map of {:?}: {e}", track.name);
            }

            info!("{}", summary_text(&summary));
            html.push_str(&track_section(&summary, &map, &profile, self.resolution, num));
            summaries.push(summary);
        }
        html.push_str(HTML_TAIL);

        let index = out_dir.join("index.html");
        if let Err(e) = fs::write(&index, html) {
            error!("unable to save booklet in {}: {e}", index.display());
        }
        let json = out_dir.join("summary.json");
        if let Err(e) = serde_json::to_string_pretty(&summaries)
            .map_err(AnyError::from)
            .and_then(|text| fs::write(&json, text).map_err(AnyError::from))
        {
            error!("unable to save {}: {e}", json.display());
        }
        let tracks: Vec<&Track> = gpx.tracks.iter().collect();
        let rsl = out_dir.join("rsl.gpx");
        if let Err(e) = gpx::write_file(&rsl, &tracks, &gpx.waypoints, start) {
            error!("unable to save {}: {e}", rsl.display());
        }

        info!("booklet available here: {}", index.display());
        Ok(summaries)
    }
}

/// Private API
impl<'a> Booklet<'a> {
    fn write_map(&self, track: &Track, path: &Path) -> Result<(), TrailError> {
        let map = self.maps.build(&[track])?;
        map.image.save(path)?;
        Ok(())
    }
}

fn profile_name(num: usize) -> String {
    format!("profile-{num:02}.png")
}

fn map_name(num: usize) -> String {
    format!("map{num:02}.png")
}

fn summary_text(summary: &TrackSummary) -> String {
    format!(
        "\nTrack         : {}\nLength        : {:.2}km\nTotal ascent  : +{:.0}m\nTotal descent : -{:.0}m\nEstimated time: {}\n",
        summary.name, summary.distance_km, summary.ascent_m, summary.descent_m, summary.elapsed
    )
}

/// Returns the HTML page of one track, ending with a page break.
fn track_section(summary: &TrackSummary, map: &str, profile: &str, width: u32, num: usize) -> String {
    format!(
        r#"<center>
<h2>{name}</h2>
<p><img style="border:5px solid" src="{map}"></p>
<p><img style="border:5px solid" src="{profile}"></p>
<h4><table width="{width}"><tr>
<td align="center">Length: {distance:.2}km</td>
<td align="center">Total ascent: +{ascent:.0}m</td>
<td align="center">Total descent: -{descent:.0}m</td>
<td align="center">Estimated duration: {elapsed} (at {speed}km/h flat speed)</td>
</tr></table></h4>
<footer><table width="{width}"><tr><td align="right">{num}</td></tr></table></footer>
</center>
"#,
        name = escape(summary.name.as_str()),
        distance = summary.distance_km,
        ascent = summary.ascent_m,
        descent = summary.descent_m,
        elapsed = summary.elapsed,
        speed = summary.flat_speed_kmh,
    )
}
