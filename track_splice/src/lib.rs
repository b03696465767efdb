//! Splice two recordings of the same GPS route into one track.
//!
//! The begin track is searched for the point matching the end track's first
//! point, an operator confirms the merge point, and the begin prefix is
//! retimed at one point per second so it runs straight into the end track.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod geo;
pub mod report;
pub mod retime;
pub mod search;
pub mod splice;
pub mod track;

pub use geo::{DistanceModel, GeoPoint};
pub use report::{speed_report, summarize, SpeedSample, SpeedSummary};
pub use search::{Confirmer, MergeCandidate, MergeSearch, ScriptedConfirmer, SearchOutcome};
pub use splice::{arrival_instant, splice, splice_at};
pub use track::{load_gpx, read_gpx, save_gpx, write_gpx, Track, TrackPoint};

pub const DEFAULT_MERGE_OUTPUT: &str = "merged.gpx";
pub const DEFAULT_RETIME_OUTPUT: &str = "retimed.gpx";
pub const DEFAULT_THRESHOLD_M: f64 = 10.0;

#[derive(Error, Debug)]
pub enum SpliceError {
    #[error("track has no points")]
    EmptyTrack,
    #[error("end track's first point has no timestamp")]
    MissingTimestamp,
    #[error("failed to parse GPX: {0}")]
    GpxParse(String),
    #[error("failed to write GPX: {0}")]
    GpxWrite(String),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("confirmation failed: {0}")]
    Confirmation(String),
}

impl SpliceError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        SpliceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpliceError>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfig {
    pub begin_path: PathBuf,
    pub end_path: PathBuf,
    pub output_path: PathBuf,
    pub threshold_m: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            begin_path: PathBuf::new(),
            end_path: PathBuf::new(),
            output_path: PathBuf::from(DEFAULT_MERGE_OUTPUT),
            threshold_m: DEFAULT_THRESHOLD_M,
        }
    }
}

impl MergeConfig {
    pub fn new(begin_path: impl Into<PathBuf>, end_path: impl Into<PathBuf>) -> Self {
        Self {
            begin_path: begin_path.into(),
            end_path: end_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.begin_path.as_os_str().is_empty() {
            return Err(SpliceError::InvalidParameter("begin file not set".into()));
        }
        if self.end_path.as_os_str().is_empty() {
            return Err(SpliceError::InvalidParameter("end file not set".into()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(SpliceError::InvalidParameter("output file not set".into()));
        }
        validate_threshold(self.threshold_m)
    }
}

pub fn validate_threshold(threshold_m: f64) -> Result<()> {
    if !threshold_m.is_finite() || threshold_m < 0.0 {
        return Err(SpliceError::InvalidParameter(format!(
            "merge threshold must be a non-negative distance, got {}",
            threshold_m
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetimeConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Instant the track should have reached its end. The last point is
    /// stamped one second earlier.
    pub arrival: DateTime<Utc>,
    pub distance_model: DistanceModel,
}

impl RetimeConfig {
    pub fn new(input_path: impl Into<PathBuf>, arrival: DateTime<Utc>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: PathBuf::from(DEFAULT_RETIME_OUTPUT),
            arrival,
            distance_model: DistanceModel::Haversine,
        }
    }
}

/// A spliced track together with the begin-track index it was cut at.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedTrack {
    pub index: usize,
    pub track: Track,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MergeOutcome {
    Written {
        path: PathBuf,
        index: usize,
        points: usize,
    },
    /// No candidate was confirmed; nothing was written.
    NoMatch,
}

#[derive(Clone, Debug)]
pub struct RetimeOutcome {
    pub path: PathBuf,
    pub track: Track,
    pub speeds: Vec<SpeedSample>,
}

/// Search `begin` for the merge point and splice on confirmation.
///
/// The end track must start with a timestamp; that is checked before any
/// candidate is presented.
pub fn merge_tracks<C: Confirmer + ?Sized>(
    begin: &Track,
    end: &Track,
    config: &MergeConfig,
    confirmer: &mut C,
) -> Result<Option<MergedTrack>> {
    let arrival = arrival_instant(end)?;
    let target = end.first().position;
    let search = MergeSearch::new(begin.points(), target, config.threshold_m);
    match search.run(confirmer)? {
        SearchOutcome::Confirmed(index) => {
            let track = splice_at(begin, index, end, arrival)?;
            Ok(Some(MergedTrack { index, track }))
        }
        SearchOutcome::Exhausted => Ok(None),
    }
}

/// Load both tracks, search, and write the merged track only once a merge
/// point has been confirmed.
pub fn run_merge<C: Confirmer + ?Sized>(
    config: &MergeConfig,
    confirmer: &mut C,
) -> Result<MergeOutcome> {
    config.validate()?;
    let begin = load_gpx(&config.begin_path)?;
    let end = load_gpx(&config.end_path)?;
    info!(
        "Loaded begin track {} ({} points) and end track {} ({} points)",
        config.begin_path.display(),
        begin.len(),
        config.end_path.display(),
        end.len()
    );
    info!(
        "Searching within {:.1} m of {}",
        config.threshold_m,
        end.first().position
    );

    let Some(merged) = merge_tracks(&begin, &end, config, confirmer)? else {
        return Ok(MergeOutcome::NoMatch);
    };

    info!("Writing merged track to {}", config.output_path.display());
    save_gpx(&merged.track, &config.output_path)?;
    info!(
        "Wrote merged track: {} ({} points)",
        config.output_path.display(),
        merged.track.len()
    );
    Ok(MergeOutcome::Written {
        path: config.output_path.clone(),
        index: merged.index,
        points: merged.track.len(),
    })
}

/// Retime a single track so it ends just before `config.arrival`, then write
/// it out along with its point-to-point speeds.
pub fn run_retime(config: &RetimeConfig) -> Result<RetimeOutcome> {
    let mut track = load_gpx(&config.input_path)?;
    retime::retime(track.points_mut(), config.arrival);
    let speeds = speed_report(&track, config.distance_model);
    info!(
        "Retimed {} points to end at {}; speeds use {} distance",
        track.len(),
        config.arrival.to_rfc3339(),
        config.distance_model.name()
    );

    info!("Writing retimed track to {}", config.output_path.display());
    save_gpx(&track, &config.output_path)?;
    info!(
        "Wrote retimed track: {} ({} points)",
        config.output_path.display(),
        track.len()
    );
    Ok(RetimeOutcome {
        path: config.output_path.clone(),
        track,
        speeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn end_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 4, 15, 20, 0).unwrap()
    }

    /// Begin track approaching (40, -105) at one point per second, on a clock
    /// that disagrees with the end track.
    fn begin_track() -> Track {
        let t0 = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let lats = [39.999, 39.9995, 39.9998, 40.0, 40.0005];
        let points = lats
            .iter()
            .enumerate()
            .map(|(i, &lat)| {
                TrackPoint::new(GeoPoint::new(lat, -105.0))
                    .with_time(t0 + Duration::seconds(i as i64))
                    .with_elevation(1600.0 + i as f64)
            })
            .collect();
        Track::new(points).unwrap().with_name("begin")
    }

    fn end_track() -> Track {
        let points = (0..4)
            .map(|i| {
                TrackPoint::new(GeoPoint::new(40.00005 + i as f64 * 1e-4, -105.00005))
                    .with_time(end_start() + Duration::seconds(i))
                    .with_elevation(1610.0)
            })
            .collect();
        Track::new(points).unwrap()
    }

    fn write_inputs(dir: &TempDir) -> MergeConfig {
        let begin_path = dir.path().join("begin.gpx");
        let end_path = dir.path().join("end.gpx");
        save_gpx(&begin_track(), &begin_path).unwrap();
        save_gpx(&end_track(), &end_path).unwrap();
        let mut config = MergeConfig::new(begin_path, end_path);
        config.output_path = dir.path().join("out.gpx");
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.output_path, PathBuf::from("merged.gpx"));
        assert_eq!(config.threshold_m, 10.0);
    }

    #[test]
    fn test_config_rejects_missing_paths_and_bad_threshold() {
        assert!(matches!(
            MergeConfig::default().validate(),
            Err(SpliceError::InvalidParameter(_))
        ));
        let mut config = MergeConfig::new("a.gpx", "b.gpx");
        assert!(config.validate().is_ok());
        config.threshold_m = -1.0;
        assert!(config.validate().is_err());
        config.threshold_m = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seven_meter_offset_is_the_sole_candidate() {
        let begin = begin_track();
        let end = end_track();
        let config = MergeConfig::new("begin.gpx", "end.gpx");
        let mut confirmer = ScriptedConfirmer::new([true]);

        let merged = merge_tracks(&begin, &end, &config, &mut confirmer)
            .unwrap()
            .unwrap();

        assert_eq!(confirmer.presented().len(), 1);
        let candidate = &confirmer.presented()[0];
        assert_eq!(candidate.index, 3);
        assert!(candidate.is_minimum);
        assert!(candidate.distance_m > 6.0 && candidate.distance_m < 8.0);

        assert_eq!(merged.index, 3);
        let points = merged.track.points();
        assert_eq!(points.len(), 4 + end.len());
        assert_eq!(points[3].time, Some(end_start() - Duration::seconds(1)));
        assert_eq!(points[0].time, Some(end_start() - Duration::seconds(4)));
        assert_eq!(&points[4..], end.points());
    }

    #[test]
    fn test_run_merge_writes_confirmed_result() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir);
        let mut confirmer = ScriptedConfirmer::new([true]);

        let outcome = run_merge(&config, &mut confirmer).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Written {
                path: config.output_path.clone(),
                index: 3,
                points: 8,
            }
        );

        let written = load_gpx(&config.output_path).unwrap();
        assert_eq!(written.len(), 8);
        assert_eq!(written.name(), Some("begin"));
        assert_eq!(written.points()[4].time, Some(end_start()));
        assert_eq!(
            written.points()[3].time,
            Some(end_start() - Duration::seconds(1))
        );
    }

    #[test]
    fn test_rejected_search_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir);
        let mut confirmer = ScriptedConfirmer::rejecting();

        let outcome = run_merge(&config, &mut confirmer).unwrap();
        assert_eq!(outcome, MergeOutcome::NoMatch);
        assert_eq!(confirmer.presented().len(), 1);
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_tight_threshold_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut config = write_inputs(&dir);
        config.threshold_m = 1.0;
        let mut confirmer = ScriptedConfirmer::new([true]);

        let outcome = run_merge(&config, &mut confirmer).unwrap();
        assert_eq!(outcome, MergeOutcome::NoMatch);
        assert!(confirmer.presented().is_empty());
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_untimed_end_fails_before_any_prompt() {
        let dir = TempDir::new().unwrap();
        let config = write_inputs(&dir);
        let untimed: Vec<_> = end_track()
            .points()
            .iter()
            .map(|p| TrackPoint {
                time: None,
                ..p.clone()
            })
            .collect();
        save_gpx(&Track::new(untimed).unwrap(), &config.end_path).unwrap();
        let mut confirmer = ScriptedConfirmer::new([false, true]);

        let err = run_merge(&config, &mut confirmer).unwrap_err();
        assert!(matches!(err, SpliceError::MissingTimestamp));
        assert!(confirmer.presented().is_empty());
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = write_inputs(&dir);
        config.end_path = dir.path().join("absent.gpx");
        let err = run_merge(&config, &mut ScriptedConfirmer::new([true])).unwrap_err();
        assert!(matches!(err, SpliceError::Io { .. }));
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_run_retime_rewrites_times_and_reports_speeds() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("single.gpx");
        save_gpx(&begin_track(), &input).unwrap();

        let mut config = RetimeConfig::new(&input, end_start());
        config.output_path = dir.path().join("retimed.gpx");
        let outcome = run_retime(&config).unwrap();

        assert_eq!(outcome.speeds.len(), 4);
        for sample in &outcome.speeds {
            assert_eq!(sample.elapsed_s, Some(1.0));
        }
        let written = load_gpx(&config.output_path).unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(
            written.last().time,
            Some(end_start() - Duration::seconds(1))
        );
        assert_eq!(
            written.first().time,
            Some(end_start() - Duration::seconds(5))
        );
    }
}
