//! Activity statistics for traffic records.
//!
//! Summarizes when a subscriber is active: events per date, per hour of
//! day and per month, plus a detailed view of a single day including the
//! longest quiet period.
//!
//! ## Example
//! ```rust
//! use cell_matcher::activity::summarize_activity;
//! use cell_matcher::records::Record;
//! use chrono::{NaiveDate, NaiveTime};
//!
//! let date = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
//! let records = vec![
//!     Record::new("A", date, NaiveTime::from_hms_opt(9, 15, 0).unwrap(), 50.45, 30.52),
//!     Record::new("A", date, NaiveTime::from_hms_opt(9, 40, 0).unwrap(), 50.45, 30.52),
//! ];
//! let summary = summarize_activity(&records);
//! assert_eq!(summary.peak_hour, Some(9));
//! ```

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::records::Record;

const HOURS_PER_DAY: usize = 24;

/// Event distribution over dates and hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_events: usize,
    pub events_per_date: BTreeMap<NaiveDate, usize>,
    /// Events per hour of day, index 0-23
    pub events_per_hour: Vec<usize>,
    pub peak_hour: Option<u32>,
    pub busiest_date: Option<NaiveDate>,
    pub avg_events_per_day: f64,
}

/// Statistics for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyActivity {
    /// `YYYY-MM`
    pub month: String,
    pub stats: ActivityStats,
}

/// Overall statistics plus a per-month breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub overall: ActivityStats,
    pub peak_hour: Option<u32>,
    pub months: Vec<MonthlyActivity>,
}

/// Detailed statistics for a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayActivity {
    pub date: NaiveDate,
    pub total_events: usize,
    pub events_per_hour: Vec<usize>,
    /// Hours with at least one event
    pub active_hours: usize,
    pub peak_hour: u32,
    pub peak_hour_events: usize,
    /// Events averaged over all 24 hours
    pub avg_events_per_hour: f64,
    /// Longest gap between consecutive events, in hours
    pub longest_gap_hours: f64,
    /// Fractional hour at which the longest gap starts
    pub longest_gap_start: f64,
}

/// First index holding the maximum value.
fn argmax(values: impl IntoIterator<Item = usize>) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, v) in values.into_iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}

fn compute_stats<'a, I>(records: I) -> ActivityStats
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut stats = ActivityStats {
        events_per_hour: vec![0; HOURS_PER_DAY],
        ..ActivityStats::default()
    };

    for record in records {
        stats.total_events += 1;
        *stats.events_per_date.entry(record.date).or_insert(0) += 1;
        stats.events_per_hour[record.time.hour() as usize] += 1;
    }

    if stats.total_events == 0 {
        return stats;
    }

    stats.peak_hour = argmax(stats.events_per_hour.iter().copied()).map(|(h, _)| h as u32);

    let mut busiest: Option<(NaiveDate, usize)> = None;
    for (&date, &count) in &stats.events_per_date {
        if busiest.map_or(true, |(_, c)| count > c) {
            busiest = Some((date, count));
        }
    }
    stats.busiest_date = busiest.map(|(d, _)| d);
    stats.avg_events_per_day = stats.total_events as f64 / stats.events_per_date.len() as f64;

    stats
}

/// Summarize activity over all given records. Empty input gives an empty
/// summary with no peaks.
pub fn summarize_activity<'a, I>(records: I) -> ActivitySummary
where
    I: IntoIterator<Item = &'a Record>,
{
    let records: Vec<&Record> = records.into_iter().collect();
    let overall = compute_stats(records.iter().copied());

    let mut by_month: BTreeMap<(i32, u32), Vec<&Record>> = BTreeMap::new();
    for record in records {
        by_month
            .entry((record.date.year(), record.date.month()))
            .or_default()
            .push(record);
    }

    let months = by_month
        .into_iter()
        .map(|((year, month), recs)| MonthlyActivity {
            month: format!("{:04}-{:02}", year, month),
            stats: compute_stats(recs),
        })
        .collect();

    ActivitySummary {
        peak_hour: overall.peak_hour,
        overall,
        months,
    }
}

/// Detailed activity for one date, or `None` when there are no events.
pub fn summarize_day<'a, I>(records: I, date: NaiveDate) -> Option<DayActivity>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut hours: Vec<f64> = records
        .into_iter()
        .filter(|r| r.date == date)
        .map(|r| r.time.hour() as f64 + r.time.minute() as f64 / 60.0)
        .collect();
    if hours.is_empty() {
        return None;
    }
    hours.sort_by(f64::total_cmp);

    let mut events_per_hour = vec![0usize; HOURS_PER_DAY];
    for h in &hours {
        events_per_hour[*h as usize] += 1;
    }
    let (peak_hour, peak_hour_events) = argmax(events_per_hour.iter().copied())?;

    let mut longest_gap_hours = 0.0;
    let mut longest_gap_start = 0.0;
    for pair in hours.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > longest_gap_hours {
            longest_gap_hours = gap;
            longest_gap_start = pair[0];
        }
    }

    Some(DayActivity {
        date,
        total_events: hours.len(),
        active_hours: events_per_hour.iter().filter(|&&c| c > 0).count(),
        events_per_hour,
        peak_hour: peak_hour as u32,
        peak_hour_events,
        avg_events_per_hour: hours.len() as f64 / HOURS_PER_DAY as f64,
        longest_gap_hours,
        longest_gap_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn rec(y: i32, m: u32, d: u32, h: u32, min: u32) -> Record {
        Record::new(
            "A",
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            NaiveTime::from_hms_opt(h, min, 0).unwrap(),
            50.0,
            30.0,
        )
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize_activity(&Vec::<Record>::new());
        assert_eq!(summary.overall.total_events, 0);
        assert!(summary.peak_hour.is_none());
        assert!(summary.overall.busiest_date.is_none());
        assert!(summary.months.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let records = vec![
            rec(2025, 6, 30, 8, 0),
            rec(2025, 7, 1, 8, 30),
            rec(2025, 7, 1, 8, 45),
            rec(2025, 7, 1, 20, 0),
            rec(2025, 7, 2, 20, 10),
        ];
        let summary = summarize_activity(&records);

        assert_eq!(summary.overall.total_events, 5);
        assert_eq!(summary.peak_hour, Some(8));
        assert_eq!(summary.overall.events_per_hour[20], 2);
        assert_eq!(
            summary.overall.busiest_date,
            NaiveDate::from_ymd_opt(2025, 7, 1)
        );
        assert!((summary.overall.avg_events_per_day - 5.0 / 3.0).abs() < 1e-12);

        assert_eq!(summary.months.len(), 2);
        assert_eq!(summary.months[0].month, "2025-06");
        assert_eq!(summary.months[1].month, "2025-07");
        assert_eq!(summary.months[1].stats.total_events, 4);
    }

    #[test]
    fn test_peak_hour_tie_prefers_earlier() {
        let records = vec![rec(2025, 7, 1, 14, 0), rec(2025, 7, 1, 9, 0)];
        assert_eq!(summarize_activity(&records).peak_hour, Some(9));
    }

    #[test]
    fn test_summarize_day() {
        let records = vec![
            rec(2025, 7, 1, 7, 0),
            rec(2025, 7, 1, 7, 30),
            rec(2025, 7, 1, 13, 30),
            rec(2025, 7, 1, 14, 0),
            rec(2025, 7, 2, 10, 0),
        ];
        let day = summarize_day(&records, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()).unwrap();

        assert_eq!(day.total_events, 4);
        assert_eq!(day.active_hours, 3);
        assert_eq!(day.peak_hour, 7);
        assert_eq!(day.peak_hour_events, 2);
        assert_eq!(day.longest_gap_hours, 6.0);
        assert_eq!(day.longest_gap_start, 7.5);
        assert!((day.avg_events_per_hour - 4.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_day_without_events() {
        let records = vec![rec(2025, 7, 1, 7, 0)];
        assert!(summarize_day(&records, NaiveDate::from_ymd_opt(2025, 7, 5).unwrap()).is_none());
    }
}
