//! Reference-event filter.
//!
//! For each reference event (an id with a date and time) select the traffic
//! record closest in time. The search window may differ before and after
//! the event. When nothing falls inside the window the nearest record is
//! still reported, flagged as outside the window.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{require_non_negative, Result};
use crate::progress::ProgressSink;
use crate::records::Record;

/// Search window around a reference event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventWindow {
    /// Minutes before the event still inside the window.
    /// Default: 10.0
    pub before_minutes: f64,
    /// Minutes after the event still inside the window.
    /// Default: 10.0
    pub after_minutes: f64,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self {
            before_minutes: 10.0,
            after_minutes: 10.0,
        }
    }
}

impl EventWindow {
    pub fn validate(&self) -> Result<()> {
        require_non_negative("before_minutes", self.before_minutes)?;
        require_non_negative("after_minutes", self.after_minutes)
    }
}

/// A moment of interest to look up in the traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEvent {
    pub id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ReferenceEvent {
    pub fn new(id: &str, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            id: id.to_string(),
            date,
            time,
        }
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Whether the selected record precedes the event. A record at the exact
/// event time counts as after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSide {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMatchKind {
    InWindow,
    /// Nothing inside the window; closest record overall
    Nearest,
}

/// The record selected for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMatch {
    pub event_id: String,
    pub record: Record,
    /// Absolute offset from the event in minutes
    pub offset_minutes: f64,
    pub side: EventSide,
    pub kind: EventMatchKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMatchStats {
    pub events: usize,
    pub in_window: usize,
    pub nearest: usize,
    /// In-window matches preceding their event
    pub before_event: usize,
    /// In-window matches at or after their event
    pub after_event: usize,
    /// Events with no record at all to choose from
    pub unmatched: usize,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMatchReport {
    /// One entry per matched event, in event order
    pub matches: Vec<EventMatch>,
    pub stats: EventMatchStats,
}

fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Time-ordered view over records for nearest-neighbour lookups.
struct Timeline<'a> {
    entries: Vec<(NaiveDateTime, &'a Record)>,
}

impl<'a> Timeline<'a> {
    fn new<I: IntoIterator<Item = &'a Record>>(records: I) -> Self {
        let mut entries: Vec<(NaiveDateTime, &Record)> =
            records.into_iter().map(|r| (r.datetime(), r)).collect();
        entries.sort_by_key(|(dt, _)| *dt);
        Self { entries }
    }

    /// Latest record strictly before `at` (first of equal times) and
    /// earliest record at or after `at`.
    fn neighbours(&self, at: NaiveDateTime) -> (Option<&'a Record>, Option<&'a Record>) {
        let split = self.entries.partition_point(|(dt, _)| *dt < at);
        let after = self.entries.get(split).map(|(_, r)| *r);
        let before = split.checked_sub(1).map(|i| {
            let dt = self.entries[i].0;
            let first = self.entries.partition_point(|(d, _)| *d < dt);
            self.entries[first].1
        });
        (before, after)
    }
}

/// Pick the closer of two optional candidates; ties go to `before`.
fn closer<'a>(
    at: NaiveDateTime,
    before: Option<&'a Record>,
    after: Option<&'a Record>,
) -> Option<&'a Record> {
    match (before, after) {
        (Some(b), Some(a)) => {
            if minutes_between(b.datetime(), at) <= minutes_between(at, a.datetime()) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (b, a) => b.or(a),
    }
}

/// Select, for every event, the record closest to it in time.
///
/// Progress is reported once per event; the sink may stop the run between
/// events.
pub fn match_events<'a, I, P>(
    records: I,
    events: &[ReferenceEvent],
    window: &EventWindow,
    progress: &P,
) -> Result<EventMatchReport>
where
    I: IntoIterator<Item = &'a Record>,
    P: ProgressSink + ?Sized,
{
    window.validate()?;

    let timeline = Timeline::new(records);
    let total = events.len() as u32;
    let mut report = EventMatchReport::default();

    for (done, event) in events.iter().enumerate() {
        if progress.should_stop() {
            report.stats.stopped_early = true;
            break;
        }
        report.stats.events += 1;

        let at = event.datetime();
        let (before, after) = timeline.neighbours(at);
        let before_in = before.filter(|r| minutes_between(r.datetime(), at) <= window.before_minutes);
        let after_in = after.filter(|r| minutes_between(at, r.datetime()) <= window.after_minutes);

        let (selected, kind) = match closer(at, before_in, after_in) {
            Some(record) => (record, EventMatchKind::InWindow),
            None => match closer(at, before, after) {
                Some(record) => (record, EventMatchKind::Nearest),
                None => {
                    report.stats.unmatched += 1;
                    progress.on_progress(done as u32 + 1, total);
                    continue;
                }
            },
        };

        let offset = minutes_between(at, selected.datetime());
        let side = if offset < 0.0 {
            EventSide::Before
        } else {
            EventSide::After
        };

        match kind {
            EventMatchKind::InWindow => {
                report.stats.in_window += 1;
                match side {
                    EventSide::Before => report.stats.before_event += 1,
                    EventSide::After => report.stats.after_event += 1,
                }
            }
            EventMatchKind::Nearest => {
                report.stats.nearest += 1;
                debug!(
                    "[Events] {}: nearest record {:.2} min away, outside window",
                    event.id,
                    offset.abs()
                );
            }
        }

        report.matches.push(EventMatch {
            event_id: event.id.clone(),
            record: selected.clone(),
            offset_minutes: offset.abs(),
            side,
            kind,
        });
        progress.on_progress(done as u32 + 1, total);
    }

    info!(
        "[Events] {} events: {} in window ({} before, {} after), {} nearest, {} unmatched",
        report.stats.events,
        report.stats.in_window,
        report.stats.before_event,
        report.stats.after_event,
        report.stats.nearest,
        report.stats.unmatched
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 18).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rec(h: u32, m: u32, label: &str) -> Record {
        Record::new("A", date(), at(h, m), 50.0, 30.0).with_label(label)
    }

    fn event(id: &str, h: u32, m: u32) -> ReferenceEvent {
        ReferenceEvent::new(id, date(), at(h, m))
    }

    fn window(before: f64, after: f64) -> EventWindow {
        EventWindow {
            before_minutes: before,
            after_minutes: after,
        }
    }

    #[test]
    fn test_closest_in_window() {
        let records = vec![rec(9, 50, "early"), rec(10, 3, "close"), rec(10, 8, "late")];
        let report =
            match_events(&records, &[event("e1", 10, 0)], &EventWindow::default(), &NoProgress)
                .unwrap();

        assert_eq!(report.matches.len(), 1);
        let m = &report.matches[0];
        assert_eq!(m.event_id, "e1");
        assert_eq!(m.record.label, "close");
        assert_eq!(m.kind, EventMatchKind::InWindow);
        assert_eq!(m.side, EventSide::After);
        assert_eq!(m.offset_minutes, 3.0);
        assert_eq!(report.stats.in_window, 1);
        assert_eq!(report.stats.after_event, 1);
    }

    #[test]
    fn test_before_and_after_classification() {
        let records = vec![rec(9, 56, "before"), rec(12, 0, "exact")];
        let events = [event("b", 10, 0), event("x", 12, 0)];
        let report = match_events(&records, &events, &EventWindow::default(), &NoProgress).unwrap();

        assert_eq!(report.matches[0].side, EventSide::Before);
        assert_eq!(report.matches[0].offset_minutes, 4.0);
        assert_eq!(report.matches[1].side, EventSide::After);
        assert_eq!(report.matches[1].offset_minutes, 0.0);
        assert_eq!(report.stats.before_event, 1);
        assert_eq!(report.stats.after_event, 1);
    }

    #[test]
    fn test_asymmetric_window() {
        // The closer record lies before the event but outside a 2 minute
        // before-window; the later one fits the 15 minute after-window
        let records = vec![rec(9, 55, "before"), rec(10, 12, "after")];
        let report =
            match_events(&records, &[event("e", 10, 0)], &window(2.0, 15.0), &NoProgress).unwrap();

        let m = &report.matches[0];
        assert_eq!(m.record.label, "after");
        assert_eq!(m.kind, EventMatchKind::InWindow);
        assert_eq!(m.offset_minutes, 12.0);
    }

    #[test]
    fn test_nearest_fallback_outside_window() {
        let records = vec![rec(8, 0, "far"), rec(11, 0, "nearer")];
        let report =
            match_events(&records, &[event("e", 10, 30)], &EventWindow::default(), &NoProgress)
                .unwrap();

        let m = &report.matches[0];
        assert_eq!(m.record.label, "nearer");
        assert_eq!(m.kind, EventMatchKind::Nearest);
        assert_eq!(m.side, EventSide::After);
        assert_eq!(m.offset_minutes, 30.0);
        assert_eq!(report.stats.nearest, 1);
        assert_eq!(report.stats.in_window, 0);
        assert_eq!(report.stats.after_event, 0);
    }

    #[test]
    fn test_equal_distance_prefers_earlier() {
        let records = vec![rec(9, 55, "before"), rec(10, 5, "after")];
        let report =
            match_events(&records, &[event("e", 10, 0)], &EventWindow::default(), &NoProgress)
                .unwrap();
        assert_eq!(report.matches[0].record.label, "before");
    }

    #[test]
    fn test_no_records() {
        let records: Vec<Record> = Vec::new();
        let report =
            match_events(&records, &[event("e", 10, 0)], &EventWindow::default(), &NoProgress)
                .unwrap();
        assert!(report.matches.is_empty());
        assert_eq!(report.stats.unmatched, 1);
    }

    #[test]
    fn test_invalid_window() {
        let records = vec![rec(10, 0, "x")];
        let result = match_events(&records, &[], &window(-1.0, 5.0), &NoProgress);
        assert!(result.is_err());
    }
}
