//! Track points, tracks, and their GPX representation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use gpx::{Gpx, GpxVersion, Waypoint};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::geo::GeoPoint;
use crate::{Result, SpliceError};

const CREATOR: &str = "track_splice";

#[derive(Clone, Debug, PartialEq)]
pub struct TrackPoint {
    pub time: Option<DateTime<Utc>>,
    pub position: GeoPoint,
    pub elevation: Option<f64>,
}

impl TrackPoint {
    pub fn new(position: GeoPoint) -> Self {
        Self {
            time: None,
            position,
            elevation: None,
        }
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }
}

/// A non-empty, ordered sequence of track points.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    name: Option<String>,
    points: Vec<TrackPoint>,
}

impl Track {
    pub fn new(points: Vec<TrackPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(SpliceError::EmptyTrack);
        }
        Ok(Self { name: None, points })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [TrackPoint] {
        &mut self.points
    }

    pub fn first(&self) -> &TrackPoint {
        &self.points[0]
    }

    pub fn last(&self) -> &TrackPoint {
        &self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Never true for a constructed track.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Read the first segment of the first track from GPX bytes.
pub fn read_gpx<R: Read>(reader: R) -> Result<Track> {
    let gpx = gpx::read(reader).map_err(|e| SpliceError::GpxParse(e.to_string()))?;
    if gpx.tracks.len() > 1 {
        warn!("GPX holds {} tracks; using the first", gpx.tracks.len());
    }
    let Some(track) = gpx.tracks.into_iter().next() else {
        return Err(SpliceError::EmptyTrack);
    };
    if track.segments.len() > 1 {
        warn!(
            "track has {} segments; using the first",
            track.segments.len()
        );
    }
    let name = track.name.clone();
    let Some(segment) = track.segments.into_iter().next() else {
        return Err(SpliceError::EmptyTrack);
    };

    let mut points = Vec::with_capacity(segment.points.len());
    for waypoint in segment.points {
        points.push(waypoint_to_point(&waypoint)?);
    }
    debug!("parsed {} track points", points.len());

    let track = Track::new(points)?;
    Ok(match name {
        Some(name) => track.with_name(name),
        None => track,
    })
}

pub fn load_gpx(path: &Path) -> Result<Track> {
    let file = File::open(path).map_err(|e| SpliceError::io(path, e))?;
    read_gpx(BufReader::new(file))
}

/// Serialize `track` as a single-segment GPX 1.1 document.
pub fn write_gpx<W: Write>(track: &Track, writer: W) -> Result<()> {
    let mut segment = gpx::TrackSegment::new();
    for point in track.points() {
        segment.points.push(point_to_waypoint(point)?);
    }
    let mut gpx_track = gpx::Track::new();
    gpx_track.name = track.name().map(str::to_string);
    gpx_track.segments.push(segment);

    let doc = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.to_string()),
        tracks: vec![gpx_track],
        ..Default::default()
    };
    gpx::write(&doc, writer).map_err(|e| SpliceError::GpxWrite(e.to_string()))
}

pub fn save_gpx(track: &Track, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| SpliceError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_gpx(track, &mut writer)?;
    writer.flush().map_err(|e| SpliceError::io(path, e))
}

fn waypoint_to_point(waypoint: &Waypoint) -> Result<TrackPoint> {
    let geo = waypoint.point();
    let mut point = TrackPoint::new(GeoPoint::new(geo.y(), geo.x()));
    point.elevation = waypoint.elevation;
    if let Some(time) = &waypoint.time {
        let iso = time
            .format()
            .map_err(|e| SpliceError::GpxParse(e.to_string()))?;
        let utc = DateTime::parse_from_rfc3339(&iso)
            .map_err(|e| SpliceError::GpxParse(e.to_string()))?
            .with_timezone(&Utc);
        point.time = Some(utc);
    }
    Ok(point)
}

fn point_to_waypoint(point: &TrackPoint) -> Result<Waypoint> {
    let geo = geo_types::Point::new(point.position.lng, point.position.lat);
    let mut waypoint = Waypoint::new(geo);
    waypoint.elevation = point.elevation;
    if let Some(time) = point.time {
        let nanos = time.timestamp_nanos_opt().ok_or_else(|| {
            SpliceError::GpxWrite(format!("timestamp {time} out of range"))
        })?;
        let odt = OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
            .map_err(|e| SpliceError::GpxWrite(e.to_string()))?;
        waypoint.time = Some(odt.into());
    }
    Ok(waypoint)
}
