//! Home/work location inference from dwell profiles.

use std::cmp::Ordering;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::dwell::{build_location_profiles, DwellConfig, LocationProfile};
use crate::error::Result;
use crate::records::NormalizedBatch;

/// Most probable home and work locations. `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeWork {
    pub home: Option<LocationProfile>,
    pub work: Option<LocationProfile>,
}

/// Location analysis for one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub subscriber_id: String,
    pub home: Option<LocationProfile>,
    pub work: Option<LocationProfile>,
    /// Every qualifying location, ordered by grid coordinate
    pub profiles: Vec<LocationProfile>,
    /// Number of dates that contributed
    pub days_analyzed: usize,
}

/// Lexicographic comparison on (count, total duration).
fn compare_rank(a: (u32, f64), b: (u32, f64)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

/// Pick the profile with the greatest rank; ties keep the earliest one.
fn select_max<'a, I, F>(profiles: I, rank: F) -> Option<&'a LocationProfile>
where
    I: IntoIterator<Item = &'a LocationProfile>,
    F: Fn(&LocationProfile) -> (u32, f64),
{
    let mut best: Option<&LocationProfile> = None;
    for profile in profiles {
        let replace = match best {
            None => true,
            Some(current) => compare_rank(rank(profile), rank(current)) == Ordering::Greater,
        };
        if replace {
            best = Some(profile);
        }
    }
    best
}

/// Select home and work from a subscriber's location profiles.
///
/// Home maximizes `(night_count, total_duration)`; work maximizes
/// `(day_count, total_duration)` among the remaining coordinates. Ties go to
/// the first profile in `profiles`, so pass a stably ordered slice (the
/// output of [`build_location_profiles`] is ordered by coordinate).
pub fn infer_home_work(profiles: &[LocationProfile]) -> HomeWork {
    let home = select_max(profiles, |p| (p.night_count, p.total_duration_minutes));
    let home_coord = home.map(|p| p.coord);

    let work = select_max(
        profiles.iter().filter(|p| Some(p.coord) != home_coord),
        |p| (p.day_count, p.total_duration_minutes),
    );

    HomeWork {
        home: home.cloned(),
        work: work.cloned(),
    }
}

/// Run dwell clustering over every date of one subscriber and infer their
/// home and work. An unknown subscriber yields an empty summary.
pub fn analyze_locations(
    batch: &NormalizedBatch,
    subscriber_id: &str,
    config: &DwellConfig,
) -> Result<LocationSummary> {
    let trajectories = batch.for_subscriber(subscriber_id);
    let profiles = build_location_profiles(trajectories.iter().copied(), config)?;
    let HomeWork { home, work } = infer_home_work(&profiles);

    debug!(
        "[Locations] {}: {} qualifying locations over {} days",
        subscriber_id,
        profiles.len(),
        trajectories.len()
    );
    if let Some(h) = &home {
        info!(
            "[Locations] {} home at {:?} ({} nights, {:.0} min)",
            subscriber_id,
            h.point(),
            h.night_count,
            h.total_duration_minutes
        );
    }

    Ok(LocationSummary {
        subscriber_id: subscriber_id.to_string(),
        home,
        work,
        profiles,
        days_analyzed: trajectories.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwell::GridCoord;

    fn profile(lat_e4: i64, day: u32, night: u32, minutes: f64) -> LocationProfile {
        LocationProfile {
            coord: GridCoord { lat_e4, lng_e4: 0 },
            day_count: day,
            night_count: night,
            total_duration_minutes: minutes,
            label: format!("loc-{}", lat_e4),
        }
    }

    #[test]
    fn test_empty_profiles_unknown() {
        let result = infer_home_work(&[]);
        assert!(result.home.is_none());
        assert!(result.work.is_none());
    }

    #[test]
    fn test_home_and_work_selection() {
        let profiles = vec![
            profile(1, 5, 0, 900.0),
            profile(2, 0, 3, 400.0),
            profile(3, 2, 1, 100.0),
        ];
        let result = infer_home_work(&profiles);
        assert_eq!(result.home.unwrap().coord.lat_e4, 2);
        assert_eq!(result.work.unwrap().coord.lat_e4, 1);
    }

    #[test]
    fn test_duration_breaks_count_ties() {
        let profiles = vec![profile(1, 0, 2, 100.0), profile(2, 0, 2, 300.0)];
        let result = infer_home_work(&profiles);
        assert_eq!(result.home.unwrap().coord.lat_e4, 2);
    }

    #[test]
    fn test_full_tie_keeps_first() {
        let profiles = vec![profile(7, 1, 1, 60.0), profile(8, 1, 1, 60.0)];
        let result = infer_home_work(&profiles);
        assert_eq!(result.home.unwrap().coord.lat_e4, 7);
        assert_eq!(result.work.unwrap().coord.lat_e4, 8);
    }

    #[test]
    fn test_work_excludes_home() {
        let profiles = vec![profile(1, 9, 9, 600.0)];
        let result = infer_home_work(&profiles);
        assert!(result.home.is_some());
        assert!(result.work.is_none());
    }

    #[test]
    fn test_home_without_nights_is_still_home() {
        let profiles = vec![profile(1, 3, 0, 135.0)];
        let result = infer_home_work(&profiles);
        let home = result.home.unwrap();
        assert_eq!(home.coord.lat_e4, 1);
        assert_eq!(home.night_count, 0);
        assert!(result.work.is_none());
    }
}
