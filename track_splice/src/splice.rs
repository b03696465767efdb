//! Joining an accepted begin prefix onto the end track.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::retime::retime;
use crate::track::{Track, TrackPoint};
use crate::{Result, SpliceError};

/// Timestamp of the end track's first point, which the retimed prefix must
/// run into.
pub fn arrival_instant(end: &Track) -> Result<DateTime<Utc>> {
    end.first().time.ok_or(SpliceError::MissingTimestamp)
}

/// Join `prefix` onto the front of `end`.
///
/// The prefix is copied and retimed so its last point sits one second before
/// `arrival` (the end track's first timestamp, see [`arrival_instant`]); end points
/// are copied unchanged.
pub fn splice(prefix: &[TrackPoint], end: &Track, arrival: DateTime<Utc>) -> Result<Track> {
    let mut points = Vec::with_capacity(prefix.len() + end.len());
    points.extend_from_slice(prefix);
    retime(&mut points, arrival);
    points.extend_from_slice(end.points());
    debug!(
        "spliced {} prefix points onto {} end points",
        prefix.len(),
        end.len()
    );

    Track::new(points)
}

/// Splice `begin[..=index]` onto `end`, retimed to run into `arrival`.
pub fn splice_at(
    begin: &Track,
    index: usize,
    end: &Track,
    arrival: DateTime<Utc>,
) -> Result<Track> {
    if index >= begin.len() {
        return Err(SpliceError::InvalidParameter(format!(
            "merge index {} outside begin track of {} points",
            index,
            begin.len()
        )));
    }
    let merged = splice(&begin.points()[..=index], end, arrival)?;
    Ok(match begin.name().or(end.name()) {
        Some(name) => merged.with_name(name),
        None => merged,
    })
}
