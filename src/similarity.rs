//! Route similarity between day trajectories.
//!
//! The score answers "how much of route A is reproduced in route B": the
//! share of base points that have at least one comparison point within
//! `max_distance`. It is intentionally asymmetric.

use std::cmp::Ordering;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{require_non_negative, CellMatchError, Result};
use crate::progress::ProgressSink;
use crate::records::{NormalizedBatch, Trajectory};
use crate::spatial::PointIndex;

/// Configuration for similar-route search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Distance within which a base point counts as reproduced (meters).
    /// Default: 400.0
    pub max_distance: f64,
    /// Minimum similarity for a day to be reported (percent).
    /// Default: 70.0
    pub threshold_percent: f64,
    /// Candidate days shorter than this share of the base day are skipped
    /// without scoring. 0 disables the check.
    /// Default: 0.5
    pub min_overlap_ratio: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_distance: 400.0,
            threshold_percent: 70.0,
            min_overlap_ratio: 0.5,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("max_distance", self.max_distance)?;
        if !(0.0..=100.0).contains(&self.threshold_percent) {
            return Err(CellMatchError::invalid_parameter(
                "threshold_percent",
                self.threshold_percent,
                "must be between 0 and 100",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_overlap_ratio) {
            return Err(CellMatchError::invalid_parameter(
                "min_overlap_ratio",
                self.min_overlap_ratio,
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// A compared day and how much of the base route it reproduces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub date: NaiveDate,
    pub similarity_percent: f64,
    pub trajectory: Trajectory,
}

/// Results of a similar-route search, best match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub results: Vec<SimilarityResult>,
    /// Candidates actually scored
    pub compared: usize,
    /// Candidates skipped by the minimum-overlap precondition
    pub skipped_short: usize,
    pub stopped_early: bool,
}

/// Percentage of `base` points with a `compare` point within
/// `max_distance` meters.
///
/// An empty base scores 0.
///
/// # Example
/// ```
/// use cell_matcher::records::{Record, Trajectory};
/// use cell_matcher::similarity::route_similarity;
/// use chrono::{NaiveDate, NaiveTime};
///
/// let date = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
/// let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
/// let day = Trajectory::new("A", date, vec![
///     Record::new("A", date, at(8), 50.45, 30.52),
///     Record::new("A", date, at(9), 50.46, 30.53),
/// ]);
/// assert_eq!(route_similarity(&day, &day, 400.0).unwrap(), 100.0);
/// ```
pub fn route_similarity(base: &Trajectory, compare: &Trajectory, max_distance: f64) -> Result<f64> {
    require_non_negative("max_distance", max_distance)?;
    if base.is_empty() {
        return Ok(0.0);
    }
    let index = PointIndex::new(compare.points());
    Ok(similarity_against(base, &index, max_distance))
}

fn similarity_against(base: &Trajectory, index: &PointIndex, max_distance: f64) -> f64 {
    if base.is_empty() || index.is_empty() {
        return 0.0;
    }
    let reproduced = base
        .records
        .iter()
        .filter(|r| index.any_within(&r.point, max_distance))
        .count();
    reproduced as f64 * 100.0 / base.len() as f64
}

/// Cheap precondition evaluated before scoring a candidate day: the shorter
/// of the two days must hold at least `ratio` of the base day's points.
pub fn has_min_overlap(base: &Trajectory, compare: &Trajectory, ratio: f64) -> bool {
    let shorter = base.len().min(compare.len()) as f64;
    shorter >= base.len() as f64 * ratio
}

fn rank_results(a: &SimilarityResult, b: &SimilarityResult) -> Ordering {
    b.similarity_percent
        .partial_cmp(&a.similarity_percent)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.date.cmp(&b.date))
        .then_with(|| a.trajectory.subscriber_id.cmp(&b.trajectory.subscriber_id))
}

/// Score `base` against every candidate and keep those at or above the
/// threshold, best first.
///
/// A candidate equal to the base day (same subscriber and date) is skipped.
pub fn find_similar_routes<'a, I, P>(
    base: &Trajectory,
    candidates: I,
    config: &SimilarityConfig,
    progress: &P,
) -> Result<SimilarityReport>
where
    I: IntoIterator<Item = &'a Trajectory>,
    P: ProgressSink + ?Sized,
{
    config.validate()?;
    Ok(score_candidates(base, candidates, config, progress))
}

fn score_candidates<'a, I, P>(
    base: &Trajectory,
    candidates: I,
    config: &SimilarityConfig,
    progress: &P,
) -> SimilarityReport
where
    I: IntoIterator<Item = &'a Trajectory>,
    P: ProgressSink + ?Sized,
{
    let candidates: Vec<&Trajectory> = candidates
        .into_iter()
        .filter(|c| !(c.subscriber_id == base.subscriber_id && c.date == base.date))
        .collect();
    let total = candidates.len() as u32;
    let mut report = SimilarityReport::default();

    for (done, candidate) in candidates.into_iter().enumerate() {
        if progress.should_stop() {
            report.stopped_early = true;
            break;
        }

        if has_min_overlap(base, candidate, config.min_overlap_ratio) {
            let index = PointIndex::new(candidate.points());
            let similarity = similarity_against(base, &index, config.max_distance);
            report.compared += 1;
            debug!(
                "[Similarity] {} {} vs {} {}: {:.1}%",
                base.subscriber_id, base.date, candidate.subscriber_id, candidate.date, similarity
            );

            if similarity >= config.threshold_percent {
                report.results.push(SimilarityResult {
                    date: candidate.date,
                    similarity_percent: similarity,
                    trajectory: candidate.clone(),
                });
            }
        } else {
            report.skipped_short += 1;
        }

        progress.on_progress(done as u32 + 1, total);
    }

    report.results.sort_by(rank_results);
    report
}

/// Find other days on which `subscriber_id` travelled a route similar to
/// the one on `base_date`. A missing base day yields an empty report.
pub fn find_similar_days<P>(
    batch: &NormalizedBatch,
    subscriber_id: &str,
    base_date: NaiveDate,
    config: &SimilarityConfig,
    progress: &P,
) -> Result<SimilarityReport>
where
    P: ProgressSink + ?Sized,
{
    config.validate()?;

    let Some(base) = batch.trajectory(subscriber_id, base_date) else {
        debug!("[Similarity] No records for {} on {}", subscriber_id, base_date);
        return Ok(SimilarityReport::default());
    };

    let report = score_candidates(base, batch.for_subscriber(subscriber_id), config, progress);
    info!(
        "[Similarity] {} on {}: {} similar days out of {} compared",
        subscriber_id,
        base_date,
        report.results.len(),
        report.compared
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::records::Record;
    use chrono::NaiveTime;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn day(sub: &str, d: u32, coords: &[(f64, f64)]) -> Trajectory {
        let records = coords
            .iter()
            .enumerate()
            .map(|(i, &(lat, lon))| {
                let time = NaiveTime::from_hms_opt(8 + i as u32, 0, 0).unwrap();
                Record::new(sub, date(d), time, lat, lon)
            })
            .collect();
        Trajectory::new(sub, date(d), records)
    }

    fn line(n: usize, lat0: f64) -> Vec<(f64, f64)> {
        (0..n).map(|i| (lat0 + i as f64 * 0.01, 30.0)).collect()
    }

    #[test]
    fn test_self_similarity_is_full() {
        let base = day("A", 18, &line(6, 50.0));
        assert_eq!(route_similarity(&base, &base, 400.0).unwrap(), 100.0);
    }

    #[test]
    fn test_partial_reproduction() {
        let base = day("A", 18, &line(10, 50.0));
        let mut coords = line(7, 50.0);
        coords.extend([(40.0, 20.0), (41.0, 20.0), (42.0, 20.0)]);
        let compare = day("A", 19, &coords);
        assert_eq!(route_similarity(&base, &compare, 400.0).unwrap(), 70.0);
    }

    #[test]
    fn test_asymmetric() {
        let base = day("A", 18, &line(2, 50.0));
        let compare = day("A", 19, &line(4, 50.0));
        assert_eq!(route_similarity(&base, &compare, 100.0).unwrap(), 100.0);
        assert_eq!(route_similarity(&compare, &base, 100.0).unwrap(), 50.0);
    }

    #[test]
    fn test_empty_inputs() {
        let empty = day("A", 18, &[]);
        let other = day("A", 19, &line(3, 50.0));
        assert_eq!(route_similarity(&empty, &other, 400.0).unwrap(), 0.0);
        assert_eq!(route_similarity(&other, &empty, 400.0).unwrap(), 0.0);
        assert!(route_similarity(&other, &other, -1.0).is_err());
    }

    #[test]
    fn test_min_overlap() {
        let base = day("A", 18, &line(10, 50.0));
        assert!(has_min_overlap(&base, &day("A", 19, &line(5, 50.0)), 0.5));
        assert!(!has_min_overlap(&base, &day("A", 19, &line(4, 50.0)), 0.5));
        assert!(has_min_overlap(&base, &day("A", 19, &line(1, 50.0)), 0.0));
    }

    #[test]
    fn test_find_similar_days_sorted_and_filtered() {
        let batch = NormalizedBatch::from_records(
            [
                day("A", 18, &line(10, 50.0)),
                day("A", 19, &line(10, 50.0)),
                day("A", 20, &[line(8, 50.0), vec![(10.0, 10.0), (11.0, 10.0)]].concat()),
                day("A", 21, &line(10, 20.0)),
                day("A", 22, &line(2, 50.0)),
                day("B", 19, &line(10, 50.0)),
            ]
            .into_iter()
            .flat_map(|t| t.records),
        );

        let report =
            find_similar_days(&batch, "A", date(18), &SimilarityConfig::default(), &NoProgress)
                .unwrap();

        let dates: Vec<NaiveDate> = report.results.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(19), date(20)]);
        assert_eq!(report.results[0].similarity_percent, 100.0);
        assert_eq!(report.results[1].similarity_percent, 80.0);
        assert_eq!(report.compared, 3);
        assert_eq!(report.skipped_short, 1);
    }

    #[test]
    fn test_missing_base_day() {
        let batch = NormalizedBatch::default();
        let report =
            find_similar_days(&batch, "A", date(18), &SimilarityConfig::default(), &NoProgress)
                .unwrap();
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_without_base_day() {
        let config = SimilarityConfig {
            max_distance: -1.0,
            ..SimilarityConfig::default()
        };
        let result = find_similar_days(&NormalizedBatch::default(), "A", date(18), &config, &NoProgress);
        assert!(matches!(result, Err(CellMatchError::InvalidParameter { .. })));
    }

    #[test]
    fn test_threshold_validation() {
        let config = SimilarityConfig {
            threshold_percent: 120.0,
            ..SimilarityConfig::default()
        };
        let base = day("A", 18, &line(3, 50.0));
        assert!(find_similar_routes(&base, [&base], &config, &NoProgress).is_err());
    }
}
