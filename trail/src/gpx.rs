//! GPX reading and writing.
//!
//! Every `trk` and `rte` becomes a [`Track`] made of all elements
//! nested in it which carry `lat` and `lon` attributes. Top level `wpt`
//! elements are kept aside as waypoints.

use crate::{Track, TrackPoint, TrailError};
use chrono::{DateTime, Duration, NaiveDateTime, Timelike};
use log::{debug, warn};
use quick_xml::{
    escape::unescape,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// Time format of written points, UTC with milliseconds.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Accepted timestamp layouts besides RFC 3339.
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gpx {
    pub tracks: Vec<Track>,
    pub waypoints: Vec<TrackPoint>,
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Gpx, TrailError> {
    let xml = fs::read_to_string(path)?;
    parse(&xml)
}

pub fn parse(xml: &str) -> Result<Gpx, TrailError> {
    let mut reader = Reader::from_str(xml);
    let mut gpx = Gpx::default();
    let mut in_root = false;
    let mut saw_root = false;
    // Position among the root's children, names unnamed tracks.
    let mut child = 0;

    loop {
        match reader.read_event()? {
            Event::Start(_) if !in_root => {
                in_root = true;
                saw_root = true;
            }
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"wpt" => {
                        if let Some(point) = parse_point(&e, &mut reader)? {
                            gpx.waypoints.push(point);
                        }
                    }
                    b"trk" | b"rte" => {
                        let index = gpx.tracks.len();
                        gpx.tracks.push(parse_track(&mut reader, child, index)?);
                    }
                    _ => {
                        reader.read_to_end(e.name())?;
                    }
                }
                child += 1;
            }
            Event::Empty(e) if in_root => {
                if e.local_name().as_ref() == b"wpt" {
                    if let Some((lat, lon)) = lat_lon(&e)? {
                        gpx.waypoints.push(TrackPoint::new(lat, lon));
                    }
                }
                child += 1;
            }
            Event::End(_) => in_root = false,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(TrailError::InvalidInput("no GPX root element".to_owned()));
    }
    debug!(
        "read {} tracks and {} waypoints",
        gpx.tracks.len(),
        gpx.waypoints.len()
    );
    Ok(gpx)
}

/// Writes `tracks` and `waypoints` as GPX 1.0.
///
/// Enriched points get a time of `start` plus their walking time, and
/// their cumulative distance in an `extensions` element.
pub fn write<W: Write>(out: W, tracks: &[&Track], waypoints: &[TrackPoint], start: NaiveDateTime) -> Result<(), TrailError> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let root = BytesStart::new("gpx").with_attributes([("version", "1.0"), ("creator", env!("CARGO_PKG_NAME"))]);
    writer.write_event(Event::Start(root))?;

    for waypoint in waypoints {
        write_point(&mut writer, "wpt", waypoint, start)?;
    }
    for track in tracks {
        writer.write_event(Event::Start(BytesStart::new("trk")))?;
        write_text(&mut writer, "name", &track.name)?;
        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
        for point in &track.points {
            write_point(&mut writer, "trkpt", point, start)?;
        }
        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
        writer.write_event(Event::End(BytesEnd::new("trk")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    writer.into_inner().flush()?;
    Ok(())
}

pub fn write_file<P: AsRef<Path>>(path: P, tracks: &[&Track], waypoints: &[TrackPoint], start: NaiveDateTime) -> Result<(), TrailError> {
    write(BufWriter::new(File::create(path)?), tracks, waypoints, start)
}

/// Reads the rest of a track or route element.
fn parse_track(reader: &mut Reader<&[u8]>, child: usize, index: usize) -> Result<Track, TrailError> {
    let mut name = format!("trk{child}");
    let mut points = Vec::new();
    let mut depth = 0;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if lat_lon(&e)?.is_some() {
                    if let Some(point) = parse_point(&e, reader)? {
                        points.push(point);
                    }
                } else if depth == 0 && e.local_name().as_ref() == b"name" {
                    name = read_text(reader, &e)?;
                } else {
                    depth += 1;
                }
            }
            Event::Empty(e) => {
                if let Some((lat, lon)) = lat_lon(&e)? {
                    points.push(TrackPoint::new(lat, lon));
                }
            }
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(TrailError::InvalidInput(format!("unterminated track {name:?}"))),
            _ => {}
        }
    }
    Ok(Track::new(name, index, points))
}

/// Reads a point element and its children, `start` having just been
/// read.
fn parse_point(start: &BytesStart<'_>, reader: &mut Reader<&[u8]>) -> Result<Option<TrackPoint>, TrailError> {
    let Some((lat, lon)) = lat_lon(start)? else {
        reader.read_to_end(start.name())?;
        return Ok(None);
    };
    let mut point = TrackPoint::new(lat, lon);
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => {
                    point.name = Some(read_text(reader, &e)?).filter(|name| !name.is_empty());
                }
                b"ele" => {
                    let text = read_text(reader, &e)?;
                    point.elevation = text.parse().ok();
                    if point.elevation.is_none() {
                        warn!("ignoring invalid elevation {text:?}");
                    }
                }
                b"time" => {
                    let text = read_text(reader, &e)?;
                    point.time_of_day = time_of_day(&text);
                    if point.time_of_day.is_none() {
                        warn!("invalid date-time {text:?}, expected %Y-%m-%dT%H:%M:%S.%fZ");
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(_) => break,
            Event::Eof => return Err(TrailError::InvalidInput("unterminated point".to_owned())),
            _ => {}
        }
    }
    Ok(Some(point))
}

/// Reads the unescaped, trimmed text content of `start`.
fn read_text(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<String, TrailError> {
    let raw = reader.read_text(start.name())?;
    let text = unescape(&raw).map_err(quick_xml::Error::from)?;
    Ok(text.trim().to_owned())
}

/// Returns the `lat` and `lon` attributes of `e`, if it has both.
fn lat_lon(e: &BytesStart<'_>) -> Result<Option<(f64, f64)>, TrailError> {
    let (mut lat, mut lon) = (None, None);
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let slot = match attr.key.local_name().as_ref() {
            b"lat" => &mut lat,
            b"lon" => &mut lon,
            _ => continue,
        };
        let value = std::str::from_utf8(&attr.value).unwrap_or_default();
        let parsed = value
            .trim()
            .parse::<f64>()
            .map_err(|_| TrailError::InvalidInput(format!("invalid coordinate {value:?}")))?;
        *slot = Some(parsed);
    }
    Ok(lat.zip(lon))
}

/// Returns the time of day, in fractional hours truncated to the
/// minute, of a GPX timestamp.
fn time_of_day(text: &str) -> Option<f64> {
    let time = DateTime::parse_from_rfc3339(text)
        .map(|t| t.naive_local())
        .ok()
        .or_else(|| {
            NAIVE_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        })?;
    Some(f64::from(time.hour()) + f64::from(time.minute()) / 60.0)
}

fn write_point<W: Write>(writer: &mut Writer<W>, tag: &str, point: &TrackPoint, start: NaiveDateTime) -> Result<(), TrailError> {
    let (lat, lon) = (format!("{:.5}", point.lat()), format!("{:.5}", point.lon()));
    let element = BytesStart::new(tag).with_attributes([("lat", lat.as_str()), ("lon", lon.as_str())]);
    writer.write_event(Event::Start(element))?;
    if let Some(name) = point.name.as_deref().filter(|name| !name.is_empty()) {
        write_text(writer, "name", name)?;
    }
    if let Some(elevation) = point.elevation {
        write_text(writer, "ele", &format!("{elevation:.0}"))?;
    }
    let hours = point.cumulative().map(|c| c.time_h).or(point.time_of_day);
    if let Some(hours) = hours {
        #[allow(clippy::cast_possible_truncation)]
        let at = start + Duration::milliseconds((hours * 3_600_000.0).round() as i64);
        write_text(writer, "time", &at.format(TIME_FORMAT).to_string())?;
    }
    if let Some(cumulative) = point.cumulative() {
        let km = format!("{:.3}", cumulative.distance_m / 1000.0);
        let extensions = BytesStart::new("extensions").with_attributes([("km", km.as_str())]);
        writer.write_event(Event::Empty(extensions))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_text<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<(), TrailError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
