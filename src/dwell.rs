//! Dwell clustering.
//!
//! Collapses a time-ordered trajectory into contiguous same-location
//! episodes on a ~11 m grid, then folds qualifying episodes into
//! per-coordinate visitation profiles.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{require_positive, Result};
use crate::records::{Record, Trajectory};
use crate::GpsPoint;

/// Grid resolution: 4 decimal places (~11 m).
const GRID_SCALE: f64 = 10_000.0;

/// Night starts at this hour (inclusive).
const NIGHT_START_HOUR: u32 = 22;
/// Night ends at this hour (inclusive).
const NIGHT_END_HOUR: u32 = 6;
/// Working day window (inclusive).
const DAY_START_HOUR: u32 = 9;
const DAY_END_HOUR: u32 = 18;

/// Configuration for dwell clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// Minimum episode length counted outside the night window (minutes).
    /// Default: 30
    pub min_day_minutes: f64,
    /// Minimum episode length counted in the night window (minutes).
    /// Default: 60
    pub min_night_minutes: f64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            min_day_minutes: 30.0,
            min_night_minutes: 60.0,
        }
    }
}

impl DwellConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("min_day_minutes", self.min_day_minutes)?;
        require_positive("min_night_minutes", self.min_night_minutes)
    }

    /// Threshold an episode must reach for its period.
    pub fn threshold_for(&self, period: DwellPeriod) -> f64 {
        match period {
            DwellPeriod::Night => self.min_night_minutes,
            DwellPeriod::Day | DwellPeriod::Other => self.min_day_minutes,
        }
    }
}

/// A coordinate rounded to the dwell grid, stored as ten-thousandths of a
/// degree so it can key ordered maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub lat_e4: i64,
    pub lng_e4: i64,
}

impl GridCoord {
    pub fn from_point(point: &GpsPoint) -> Self {
        Self {
            lat_e4: (point.latitude * GRID_SCALE).round() as i64,
            lng_e4: (point.longitude * GRID_SCALE).round() as i64,
        }
    }

    pub fn to_point(self) -> GpsPoint {
        GpsPoint::new(self.lat_e4 as f64 / GRID_SCALE, self.lng_e4 as f64 / GRID_SCALE)
    }
}

/// Part of the day an episode starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DwellPeriod {
    Night,
    Day,
    Other,
}

impl DwellPeriod {
    pub fn classify(start: NaiveTime) -> Self {
        let hour = start.hour();
        if hour >= NIGHT_START_HOUR || hour <= NIGHT_END_HOUR {
            DwellPeriod::Night
        } else if (DAY_START_HOUR..=DAY_END_HOUR).contains(&hour) {
            DwellPeriod::Day
        } else {
            DwellPeriod::Other
        }
    }
}

/// A maximal run of consecutive records on the same grid coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellEpisode {
    pub coord: GridCoord,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration_minutes: f64,
    /// Label of the last record in the run
    pub label: String,
    pub record_count: usize,
}

impl DwellEpisode {
    fn open(record: &Record, coord: GridCoord) -> Self {
        Self {
            coord,
            start: record.time,
            end: record.time,
            duration_minutes: 0.0,
            label: record.label.clone(),
            record_count: 1,
        }
    }

    fn extend(&mut self, record: &Record) {
        self.end = record.time;
        self.label.clone_from(&record.label);
        self.record_count += 1;
    }

    fn close(mut self) -> Self {
        let elapsed = self.end - self.start;
        self.duration_minutes = elapsed.num_seconds() as f64 / 60.0;
        self
    }

    pub fn period(&self) -> DwellPeriod {
        DwellPeriod::classify(self.start)
    }
}

/// Split a trajectory into dwell episodes in a single pass.
///
/// Single-record episodes are emitted with zero duration; the threshold
/// test in [`fold_episodes`] discards them.
pub fn cluster_episodes(trajectory: &Trajectory) -> Vec<DwellEpisode> {
    let mut episodes = Vec::new();
    let mut current: Option<DwellEpisode> = None;

    for record in &trajectory.records {
        let coord = GridCoord::from_point(&record.point);
        match current.as_mut() {
            Some(episode) if episode.coord == coord => episode.extend(record),
            _ => {
                if let Some(done) = current.take() {
                    episodes.push(done.close());
                }
                current = Some(DwellEpisode::open(record, coord));
            }
        }
    }

    if let Some(done) = current {
        episodes.push(done.close());
    }

    episodes
}

/// Visitation statistics for one grid coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationProfile {
    pub coord: GridCoord,
    pub day_count: u32,
    pub night_count: u32,
    pub total_duration_minutes: f64,
    pub label: String,
}

impl LocationProfile {
    fn empty(coord: GridCoord) -> Self {
        Self {
            coord,
            day_count: 0,
            night_count: 0,
            total_duration_minutes: 0.0,
            label: String::new(),
        }
    }

    pub fn point(&self) -> GpsPoint {
        self.coord.to_point()
    }
}

/// Fold qualifying episodes into a coordinate-keyed profile table.
pub fn fold_episodes(
    profiles: &mut BTreeMap<GridCoord, LocationProfile>,
    episodes: &[DwellEpisode],
    config: &DwellConfig,
) {
    for episode in episodes {
        let period = episode.period();
        if episode.duration_minutes < config.threshold_for(period) {
            continue;
        }

        let profile = profiles
            .entry(episode.coord)
            .or_insert_with(|| LocationProfile::empty(episode.coord));

        profile.total_duration_minutes += episode.duration_minutes;
        profile.label.clone_from(&episode.label);
        match period {
            DwellPeriod::Night => profile.night_count += 1,
            DwellPeriod::Day => profile.day_count += 1,
            DwellPeriod::Other => {}
        }
    }
}

/// Build location profiles for one subscriber from all of their
/// trajectories. The result is ordered by grid coordinate.
pub fn build_location_profiles<'a, I>(
    trajectories: I,
    config: &DwellConfig,
) -> Result<Vec<LocationProfile>>
where
    I: IntoIterator<Item = &'a Trajectory>,
{
    config.validate()?;

    let mut profiles = BTreeMap::new();
    for trajectory in trajectories {
        let episodes = cluster_episodes(trajectory);
        fold_episodes(&mut profiles, &episodes, config);
    }

    Ok(profiles.into_values().collect())
}
