//! One-second cadence timestamp reconstruction.

use chrono::{DateTime, Duration, Utc};

use crate::track::TrackPoint;

/// Instants for `n` points sampled once per second, the last one a second
/// before `arrival`.
pub fn instants(n: usize, arrival: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let start = arrival - Duration::seconds(n as i64);
    (0..n)
        .map(|i| start + Duration::seconds(i as i64))
        .collect()
}

/// Overwrite every point's timestamp so the sequence runs at one point per
/// second and ends one second before `arrival`. Existing timestamps are
/// discarded.
pub fn retime(points: &mut [TrackPoint], arrival: DateTime<Utc>) {
    let times = instants(points.len(), arrival);
    for (point, time) in points.iter_mut().zip(times) {
        point.time = Some(time);
    }
}
