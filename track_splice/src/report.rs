//! Point-to-point speed reporting for timed tracks.

use serde::Serialize;

use crate::geo::DistanceModel;
use crate::track::Track;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SpeedSample {
    /// Index of the later point of the pair.
    pub index: usize,
    pub distance_m: f64,
    pub elapsed_s: Option<f64>,
    pub speed_mps: Option<f64>,
    pub speed_kmh: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeedSummary {
    pub total_distance_m: f64,
    pub total_elapsed_s: f64,
    pub max_speed_mps: Option<f64>,
    /// Index of the point where `max_speed_mps` was reached.
    pub max_speed_index: Option<usize>,
}

/// Distance, elapsed time, and speed between each pair of consecutive points.
/// Pairs with a missing or non-increasing timestamp carry no speed.
pub fn speed_report(track: &Track, model: DistanceModel) -> Vec<SpeedSample> {
    track
        .points()
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let distance_m = model.distance(pair[0].position, pair[1].position);
            let elapsed_s = match (pair[0].time, pair[1].time) {
                (Some(a), Some(b)) => Some((b - a).num_milliseconds() as f64 / 1000.0),
                _ => None,
            };
            let speed_mps = elapsed_s
                .filter(|&dt| dt > 0.0)
                .map(|dt| distance_m / dt);
            SpeedSample {
                index: i + 1,
                distance_m,
                elapsed_s,
                speed_mps,
                speed_kmh: speed_mps.map(|v| v * 3.6),
            }
        })
        .collect()
}

pub fn summarize(samples: &[SpeedSample]) -> SpeedSummary {
    let mut summary = SpeedSummary::default();
    for sample in samples {
        summary.total_distance_m += sample.distance_m;
        summary.total_elapsed_s += sample.elapsed_s.unwrap_or(0.0);
        if let Some(speed) = sample.speed_mps {
            if summary.max_speed_mps.map_or(true, |best| speed > best) {
                summary.max_speed_mps = Some(speed);
                summary.max_speed_index = Some(sample.index);
            }
        }
    }
    summary
}
