//! Pairwise meeting matcher.
//!
//! Finds pairs of records from different subscribers that were observed on
//! the same date, within a time window, and either close together or inside
//! each other's directional antenna sector.
//!
//! ## Algorithm
//! 1. Bucket all records by date (pairs never cross dates)
//! 2. Sort each bucket by time of day
//! 3. For each record, scan forward while the time gap stays in the window
//! 4. Test distance first; fall back to the sector-overlap test only when
//!    the distance test fails and both records carry an azimuth

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "parallel")]
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{require_non_negative, CellMatchError, Result};
use crate::geo_utils::{angular_difference, point_bearing, point_distance};
use crate::progress::ProgressSink;
use crate::records::{Record, Trajectory};
use crate::GpsPoint;

/// Configuration for meeting detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// Maximum distance between two records to count as a meeting (meters).
    /// Default: 400.0
    pub max_distance: f64,
    /// Maximum time difference between two records (minutes).
    /// Default: 30.0
    pub time_window_minutes: f64,
    /// Reach of a directional antenna sector (meters).
    /// Default: 500.0
    pub sector_radius: f64,
    /// Opening angle of a directional antenna sector (degrees).
    /// Default: 120.0
    pub sector_angle: f64,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            max_distance: 400.0,
            time_window_minutes: 30.0,
            sector_radius: 500.0,
            sector_angle: 120.0,
        }
    }
}

impl MeetingConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("max_distance", self.max_distance)?;
        require_non_negative("time_window_minutes", self.time_window_minutes)?;
        require_non_negative("sector_radius", self.sector_radius)?;
        if !(self.sector_angle > 0.0 && self.sector_angle <= 360.0) {
            return Err(CellMatchError::invalid_parameter(
                "sector_angle",
                self.sector_angle,
                "must be in (0, 360]",
            ));
        }
        Ok(())
    }
}

/// Which test produced a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Distance,
    Sector,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Distance => "distance",
            MatchKind::Sector => "sector",
        }
    }
}

/// A co-located pair of records from two subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingCandidate {
    pub date: NaiveDate,
    /// Record of the lexicographically smaller subscriber id
    pub first: Record,
    pub second: Record,
    pub distance_m: f64,
    pub time_delta_minutes: f64,
    pub kind: MatchKind,
}

/// Counters describing a matching run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingStats {
    pub date_buckets: usize,
    pub buckets_scanned: usize,
    /// Cross-subscriber pairs inside the time window
    pub pairs_compared: u64,
    pub distance_matches: usize,
    pub sector_matches: usize,
    /// True if the progress sink asked to stop before all buckets ran
    pub stopped_early: bool,
}

impl MeetingStats {
    fn absorb(&mut self, other: &MeetingStats) {
        self.buckets_scanned += other.buckets_scanned;
        self.pairs_compared += other.pairs_compared;
        self.distance_matches += other.distance_matches;
        self.sector_matches += other.sector_matches;
    }
}

/// Candidates plus run statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingReport {
    pub candidates: Vec<MeetingCandidate>,
    pub stats: MeetingStats,
}

/// Mutual sector containment test.
///
/// Each antenna's cone (`azimuth ± sector_angle / 2`, reaching
/// `sector_radius`) must contain the other station, and the stations must
/// be at most `2 × sector_radius` apart.
pub fn sectors_overlap(
    p1: &GpsPoint,
    azimuth1: f64,
    p2: &GpsPoint,
    azimuth2: f64,
    sector_radius: f64,
    sector_angle: f64,
) -> bool {
    if point_distance(p1, p2) > 2.0 * sector_radius {
        return false;
    }

    let half_angle = sector_angle / 2.0;
    let towards_second = point_bearing(p1, p2);
    let towards_first = point_bearing(p2, p1);

    angular_difference(azimuth1, towards_second) <= half_angle
        && angular_difference(azimuth2, towards_first) <= half_angle
}

/// Classify a pair that already passed the time-window test.
///
/// The distance test takes precedence; the sector test only runs when it
/// fails. Returns the match kind and the distance in meters.
pub fn classify_pair(r1: &Record, r2: &Record, config: &MeetingConfig) -> Option<(MatchKind, f64)> {
    let distance = point_distance(&r1.point, &r2.point);
    if distance <= config.max_distance {
        return Some((MatchKind::Distance, distance));
    }

    match (r1.azimuth, r2.azimuth) {
        (Some(az1), Some(az2))
            if sectors_overlap(
                &r1.point,
                az1,
                &r2.point,
                az2,
                config.sector_radius,
                config.sector_angle,
            ) =>
        {
            Some((MatchKind::Sector, distance))
        }
        _ => None,
    }
}

/// Group records by date, each bucket sorted by time of day.
pub fn bucket_by_date<'a, I>(trajectories: I) -> BTreeMap<NaiveDate, Vec<&'a Record>>
where
    I: IntoIterator<Item = &'a Trajectory>,
{
    let mut buckets: BTreeMap<NaiveDate, Vec<&'a Record>> = BTreeMap::new();
    for trajectory in trajectories {
        buckets
            .entry(trajectory.date)
            .or_default()
            .extend(trajectory.records.iter());
    }
    for records in buckets.values_mut() {
        records.sort_by_key(|r| r.time);
    }
    buckets
}

/// Scan one date bucket (records sorted by time) for meetings.
pub fn match_bucket(records: &[&Record], config: &MeetingConfig) -> (Vec<MeetingCandidate>, MeetingStats) {
    let mut candidates = Vec::new();
    let mut stats = MeetingStats {
        buckets_scanned: 1,
        ..MeetingStats::default()
    };

    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            let time_delta = a.minutes_apart(b);
            if time_delta > config.time_window_minutes {
                break;
            }
            if a.subscriber_id == b.subscriber_id {
                continue;
            }

            stats.pairs_compared += 1;
            let (r1, r2) = if a.subscriber_id < b.subscriber_id {
                (*a, *b)
            } else {
                (*b, *a)
            };

            if let Some((kind, distance_m)) = classify_pair(r1, r2, config) {
                match kind {
                    MatchKind::Distance => stats.distance_matches += 1,
                    MatchKind::Sector => stats.sector_matches += 1,
                }
                candidates.push(MeetingCandidate {
                    date: r1.date,
                    first: r1.clone(),
                    second: r2.clone(),
                    distance_m,
                    time_delta_minutes: time_delta,
                    kind,
                });
            }
        }
    }

    (candidates, stats)
}

/// Find all meetings across the given trajectories.
///
/// Progress is reported once per date bucket; the sink may stop the run
/// between buckets.
pub fn find_meetings<'a, I, P>(
    trajectories: I,
    config: &MeetingConfig,
    progress: &P,
) -> Result<MeetingReport>
where
    I: IntoIterator<Item = &'a Trajectory>,
    P: ProgressSink + ?Sized,
{
    config.validate()?;

    let buckets = bucket_by_date(trajectories);
    let total = buckets.len() as u32;
    let mut report = MeetingReport {
        candidates: Vec::new(),
        stats: MeetingStats {
            date_buckets: buckets.len(),
            ..MeetingStats::default()
        },
    };

    for (done, (date, records)) in buckets.iter().enumerate() {
        if progress.should_stop() {
            report.stats.stopped_early = true;
            info!(
                "[Meetings] Stopped after {} of {} date buckets",
                done, total
            );
            break;
        }

        let (candidates, stats) = match_bucket(records, config);
        debug!(
            "[Meetings] {}: {} records, {} pairs, {} meetings",
            date,
            records.len(),
            stats.pairs_compared,
            candidates.len()
        );
        report.stats.absorb(&stats);
        report.candidates.extend(candidates);
        progress.on_progress(done as u32 + 1, total);
    }

    info!(
        "[Meetings] {} meetings ({} distance, {} sector) over {} date buckets",
        report.candidates.len(),
        report.stats.distance_matches,
        report.stats.sector_matches,
        report.stats.buckets_scanned
    );

    Ok(report)
}

/// Find meetings between two specific subscribers.
pub fn find_meetings_between<'a, I, P>(
    trajectories: I,
    subscriber_a: &str,
    subscriber_b: &str,
    config: &MeetingConfig,
    progress: &P,
) -> Result<MeetingReport>
where
    I: IntoIterator<Item = &'a Trajectory>,
    P: ProgressSink + ?Sized,
{
    if subscriber_a == subscriber_b {
        return Err(CellMatchError::ConfigError {
            message: format!("cannot match subscriber '{}' against itself", subscriber_a),
        });
    }

    let selected = trajectories
        .into_iter()
        .filter(|t| t.subscriber_id == subscriber_a || t.subscriber_id == subscriber_b);

    find_meetings(selected, config, progress)
}

/// Parallel version of [`find_meetings`]: date buckets are scanned with
/// rayon. Produces the same candidates in the same order.
///
/// Progress is reported as buckets finish, so `completed` counts finished
/// buckets rather than a bucket position. Buckets not yet started when the
/// sink asks to stop are skipped.
#[cfg(feature = "parallel")]
pub fn find_meetings_parallel<'a, I, P>(
    trajectories: I,
    config: &MeetingConfig,
    progress: &P,
) -> Result<MeetingReport>
where
    I: IntoIterator<Item = &'a Trajectory>,
    P: ProgressSink + Sync + ?Sized,
{
    config.validate()?;

    let buckets: Vec<Vec<&Record>> = bucket_by_date(trajectories).into_values().collect();
    let total = buckets.len() as u32;
    let finished = AtomicU32::new(0);

    let results: Vec<Option<(Vec<MeetingCandidate>, MeetingStats)>> = buckets
        .par_iter()
        .map(|records| {
            if progress.should_stop() {
                return None;
            }
            let result = match_bucket(records, config);
            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            progress.on_progress(done, total);
            Some(result)
        })
        .collect();

    let mut report = MeetingReport {
        candidates: Vec::new(),
        stats: MeetingStats {
            date_buckets: buckets.len(),
            ..MeetingStats::default()
        },
    };
    for result in results {
        match result {
            Some((candidates, stats)) => {
                report.stats.absorb(&stats);
                report.candidates.extend(candidates);
            }
            None => report.stats.stopped_early = true,
        }
    }

    info!(
        "[Meetings] {} meetings over {} of {} date buckets (parallel)",
        report.candidates.len(),
        report.stats.buckets_scanned,
        report.stats.date_buckets
    );

    Ok(report)
}
