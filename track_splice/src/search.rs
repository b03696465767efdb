//! Merge-point search over the begin track.
//!
//! The begin track is scanned in order against the end track's first point.
//! Every point within the threshold becomes a [`MergeCandidate`] and is handed
//! to a [`Confirmer`]; the scan blocks on that decision and stops at the first
//! accepted candidate.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info};

use crate::geo::{haversine_distance, linear_distance, GeoPoint};
use crate::track::TrackPoint;
use crate::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct MergeCandidate {
    /// Index into the begin track.
    pub index: usize,
    pub point: TrackPoint,
    /// The end track's first point.
    pub target: GeoPoint,
    /// Haversine distance to `target`; the only distance that gates.
    pub distance_m: f64,
    /// Flat-plane distance to `target`, shown for comparison.
    pub linear_distance_m: f64,
    /// Smallest qualifying distance seen so far, this candidate included.
    pub min_distance_m: f64,
    pub is_minimum: bool,
    /// Target falls between this point and the next one (see
    /// [`GeoPoint::is_between`]).
    pub is_between: bool,
}

impl fmt::Display for MergeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "point #{} at {}", self.index, self.point.position)?;
        if let Some(ele) = self.point.elevation {
            write!(f, " ele {:.1} m", ele)?;
        }
        write!(
            f,
            ", {:.2} m from {} (linear {:.2} m, closest so far {:.2} m)",
            self.distance_m, self.target, self.linear_distance_m, self.min_distance_m
        )?;
        if self.is_minimum {
            f.write_str(" [closest]")?;
        }
        if self.is_between {
            f.write_str(" [between this and next]")?;
        }
        Ok(())
    }
}

/// Decides whether a candidate is the merge point. Implementations may block
/// for as long as they need.
pub trait Confirmer {
    fn confirm(&mut self, candidate: &MergeCandidate) -> Result<bool>;
}

impl<F> Confirmer for F
where
    F: FnMut(&MergeCandidate) -> Result<bool>,
{
    fn confirm(&mut self, candidate: &MergeCandidate) -> Result<bool> {
        self(candidate)
    }
}

/// Replays a fixed list of decisions, answering `false` once it runs out.
/// Every presented candidate is recorded.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConfirmer {
    decisions: VecDeque<bool>,
    presented: Vec<MergeCandidate>,
}

impl ScriptedConfirmer {
    pub fn new(decisions: impl IntoIterator<Item = bool>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            presented: Vec::new(),
        }
    }

    /// Rejects everything.
    pub fn rejecting() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> &[MergeCandidate] {
        &self.presented
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, candidate: &MergeCandidate) -> Result<bool> {
        self.presented.push(candidate.clone());
        Ok(self.decisions.pop_front().unwrap_or(false))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Index of the accepted begin-track point.
    Confirmed(usize),
    Exhausted,
}

#[derive(Clone, Debug)]
pub struct MergeSearch<'a> {
    begin: &'a [TrackPoint],
    target: GeoPoint,
    threshold_m: f64,
    cursor: usize,
    min_distance_m: f64,
}

impl<'a> MergeSearch<'a> {
    pub fn new(begin: &'a [TrackPoint], target: GeoPoint, threshold_m: f64) -> Self {
        Self {
            begin,
            target,
            threshold_m,
            cursor: 0,
            min_distance_m: f64::INFINITY,
        }
    }

    /// Smallest qualifying distance seen so far.
    pub fn min_distance_m(&self) -> Option<f64> {
        self.min_distance_m
            .is_finite()
            .then_some(self.min_distance_m)
    }

    /// Scan until a candidate is confirmed or the track runs out.
    pub fn run<C: Confirmer + ?Sized>(mut self, confirmer: &mut C) -> Result<SearchOutcome> {
        for candidate in self.by_ref() {
            info!("candidate {}", candidate);
            if confirmer.confirm(&candidate)? {
                info!("merge point confirmed at index {}", candidate.index);
                return Ok(SearchOutcome::Confirmed(candidate.index));
            }
            debug!("candidate {} rejected", candidate.index);
        }
        match self.min_distance_m() {
            Some(closest) => info!(
                "no candidate confirmed; closest qualifying point was {:.2} m away",
                closest
            ),
            None => info!(
                "no point within {:.1} m ({} points scanned)",
                self.threshold_m,
                self.begin.len()
            ),
        }
        Ok(SearchOutcome::Exhausted)
    }
}

impl Iterator for MergeSearch<'_> {
    type Item = MergeCandidate;

    fn next(&mut self) -> Option<MergeCandidate> {
        while self.cursor < self.begin.len() {
            let index = self.cursor;
            self.cursor += 1;

            let point = &self.begin[index];
            let distance_m = haversine_distance(point.position, self.target);
            if distance_m.is_nan() || distance_m > self.threshold_m {
                debug!("point {} is {:.2} m away, skipping", index, distance_m);
                continue;
            }

            // `<=` lets a later candidate at the same distance take over.
            let is_minimum = distance_m <= self.min_distance_m;
            if is_minimum {
                self.min_distance_m = distance_m;
            }
            let next = self.begin.get(index + 1).unwrap_or(point);
            let is_between = self.target.is_between(&point.position, &next.position);

            return Some(MergeCandidate {
                index,
                point: point.clone(),
                target: self.target,
                distance_m,
                linear_distance_m: linear_distance(point.position, self.target),
                min_distance_m: self.min_distance_m,
                is_minimum,
                is_between,
            });
        }
        None
    }
}
