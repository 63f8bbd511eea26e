//! # Correlation Engine
//!
//! Owns one normalized batch of traffic records together with a validated
//! [`EngineConfig`] and runs every analysis over it.
//!
//! ## Architecture
//!
//! The engine holds:
//! - The normalized batch (trajectories plus drop counters)
//! - The configuration used by every operation
//!
//! Operations are read-only, so one engine can answer any number of
//! queries. Each result has a JSON rendering for downstream reporting.

use chrono::NaiveDate;
use log::info;
use serde::Serialize;

#[cfg(feature = "parallel")]
use crate::meetings::find_meetings_parallel;

use crate::activity::{summarize_activity, summarize_day, ActivitySummary, DayActivity};
use crate::config::EngineConfig;
use crate::error::{CellMatchError, Result};
use crate::filter::{match_events, EventMatchReport, ReferenceEvent};
use crate::locations::{analyze_locations, LocationSummary};
use crate::meetings::{find_meetings, find_meetings_between, MeetingReport};
use crate::progress::ProgressSink;
use crate::records::{normalize_rows, DropStats, NormalizedBatch, RawRow, Record};
use crate::region::Region;
use crate::similarity::{find_similar_days, SimilarityReport};

// ============================================================================
// Correlation Engine
// ============================================================================

/// Analysis front end over one batch of records.
#[derive(Debug, Clone)]
pub struct CorrelationEngine {
    batch: NormalizedBatch,
    config: EngineConfig,
}

impl CorrelationEngine {
    /// Create an engine over an already normalized batch.
    pub fn new(batch: NormalizedBatch, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "[CorrelationEngine] Initialized with {} records, {} subscribers, {} trajectories",
            batch.record_count(),
            batch.subscribers().len(),
            batch.trajectories.len()
        );
        Ok(Self { batch, config })
    }

    /// Normalize raw rows and create an engine over them.
    pub fn from_rows<I>(rows: I, config: EngineConfig) -> Result<Self>
    where
        I: IntoIterator<Item = RawRow>,
    {
        config.validate()?;
        let batch = normalize_rows(rows);
        if batch.dropped.total() > 0 {
            info!(
                "[CorrelationEngine] Dropped {} invalid rows",
                batch.dropped.total()
            );
        }
        Self::new(batch, config)
    }

    pub fn batch(&self) -> &NormalizedBatch {
        &self.batch
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dropped(&self) -> &DropStats {
        &self.batch.dropped
    }

    pub fn subscribers(&self) -> Vec<String> {
        self.batch.subscribers()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.batch.dates()
    }

    // ========================================================================
    // Locations
    // ========================================================================

    /// Home/work inference for one subscriber.
    pub fn locations(&self, subscriber_id: &str) -> Result<LocationSummary> {
        info!("[CorrelationEngine] Analyzing locations of {}", subscriber_id);
        analyze_locations(&self.batch, subscriber_id, &self.config.dwell)
    }

    /// Home/work inference for every subscriber, ordered by id.
    pub fn all_locations(&self) -> Result<Vec<LocationSummary>> {
        let subscribers = self.batch.subscribers();
        info!(
            "[CorrelationEngine] Analyzing locations of {} subscribers",
            subscribers.len()
        );
        subscribers
            .iter()
            .map(|id| analyze_locations(&self.batch, id, &self.config.dwell))
            .collect()
    }

    // ========================================================================
    // Meetings
    // ========================================================================

    /// All meetings between any two subscribers.
    pub fn meetings<P>(&self, progress: &P) -> Result<MeetingReport>
    where
        P: ProgressSink + ?Sized,
    {
        info!(
            "[CorrelationEngine] Finding meetings across {} trajectories",
            self.batch.trajectories.len()
        );
        find_meetings(&self.batch.trajectories, &self.config.meeting, progress)
    }

    /// All meetings, scanning date buckets in parallel.
    #[cfg(feature = "parallel")]
    pub fn meetings_parallel<P>(&self, progress: &P) -> Result<MeetingReport>
    where
        P: ProgressSink + Sync + ?Sized,
    {
        info!(
            "[CorrelationEngine] Finding meetings across {} trajectories (parallel)",
            self.batch.trajectories.len()
        );
        find_meetings_parallel(&self.batch.trajectories, &self.config.meeting, progress)
    }

    /// Meetings between two specific subscribers.
    pub fn meetings_between<P>(
        &self,
        subscriber_a: &str,
        subscriber_b: &str,
        progress: &P,
    ) -> Result<MeetingReport>
    where
        P: ProgressSink + ?Sized,
    {
        info!(
            "[CorrelationEngine] Finding meetings between {} and {}",
            subscriber_a, subscriber_b
        );
        find_meetings_between(
            &self.batch.trajectories,
            subscriber_a,
            subscriber_b,
            &self.config.meeting,
            progress,
        )
    }

    // ========================================================================
    // Similarity
    // ========================================================================

    /// Days on which the subscriber repeated the route of `base_date`.
    pub fn similar_days<P>(
        &self,
        subscriber_id: &str,
        base_date: NaiveDate,
        progress: &P,
    ) -> Result<SimilarityReport>
    where
        P: ProgressSink + ?Sized,
    {
        info!(
            "[CorrelationEngine] Finding days similar to {} {}",
            subscriber_id, base_date
        );
        find_similar_days(
            &self.batch,
            subscriber_id,
            base_date,
            &self.config.similarity,
            progress,
        )
    }

    // ========================================================================
    // Activity and region
    // ========================================================================

    pub fn activity(&self, subscriber_id: &str) -> ActivitySummary {
        let summary = summarize_activity(self.subscriber_records(subscriber_id));
        info!(
            "[CorrelationEngine] Activity of {}: {} events",
            subscriber_id, summary.overall.total_events
        );
        summary
    }

    pub fn activity_on(&self, subscriber_id: &str, date: NaiveDate) -> Option<DayActivity> {
        summarize_day(self.subscriber_records(subscriber_id), date)
    }

    /// Records lying outside `region`.
    pub fn outside_region(&self, region: &Region) -> Vec<&Record> {
        region.records_outside(&self.batch)
    }

    // ========================================================================
    // Reference events
    // ========================================================================

    /// Record closest in time to each event, optionally limited to one
    /// subscriber. Uses the configured event window.
    pub fn match_events<P>(
        &self,
        subscriber_id: Option<&str>,
        events: &[ReferenceEvent],
        progress: &P,
    ) -> Result<EventMatchReport>
    where
        P: ProgressSink + ?Sized,
    {
        info!(
            "[CorrelationEngine] Matching {} events against {}",
            events.len(),
            subscriber_id.unwrap_or("all subscribers")
        );
        let records = self
            .batch
            .records()
            .filter(|r| subscriber_id.map_or(true, |id| r.subscriber_id == id));
        match_events(records, events, &self.config.events, progress)
    }

    fn subscriber_records<'a>(&'a self, subscriber_id: &'a str) -> impl Iterator<Item = &'a Record> {
        self.batch
            .trajectories
            .iter()
            .filter(move |t| t.subscriber_id == subscriber_id)
            .flat_map(|t| t.records.iter())
    }

    // ========================================================================
    // JSON renderings
    // ========================================================================

    pub fn locations_json(&self, subscriber_id: &str) -> Result<String> {
        to_json(&self.locations(subscriber_id)?)
    }

    pub fn meetings_json<P>(&self, progress: &P) -> Result<String>
    where
        P: ProgressSink + ?Sized,
    {
        to_json(&self.meetings(progress)?)
    }

    pub fn meetings_between_json<P>(
        &self,
        subscriber_a: &str,
        subscriber_b: &str,
        progress: &P,
    ) -> Result<String>
    where
        P: ProgressSink + ?Sized,
    {
        to_json(&self.meetings_between(subscriber_a, subscriber_b, progress)?)
    }

    pub fn similar_days_json<P>(
        &self,
        subscriber_id: &str,
        base_date: NaiveDate,
        progress: &P,
    ) -> Result<String>
    where
        P: ProgressSink + ?Sized,
    {
        to_json(&self.similar_days(subscriber_id, base_date, progress)?)
    }

    pub fn activity_json(&self, subscriber_id: &str) -> Result<String> {
        to_json(&self.activity(subscriber_id))
    }

    pub fn match_events_json<P>(
        &self,
        subscriber_id: Option<&str>,
        events: &[ReferenceEvent],
        progress: &P,
    ) -> Result<String>
    where
        P: ProgressSink + ?Sized,
    {
        to_json(&self.match_events(subscriber_id, events, progress)?)
    }

    pub fn outside_region_json(&self, region: &Region) -> Result<String> {
        to_json(&self.outside_region(region))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CellMatchError::Internal {
        message: format!("serialization failed: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn row(sub: &str, date: &str, time: &str, lat: f64, lon: f64) -> RawRow {
        RawRow {
            subscriber_id: sub.into(),
            date: date.into(),
            time: time.into(),
            latitude: lat.into(),
            longitude: lon.into(),
            ..RawRow::default()
        }
    }

    fn engine() -> CorrelationEngine {
        let rows = vec![
            row("A", "18.07.2025", "10:00:00", 50.45, 30.52),
            row("B", "18.07.2025", "10:10:00", 50.4501, 30.5201),
            row("A", "19.07.2025", "10:00:00", 50.45, 30.52),
            row("", "19.07.2025", "10:00:00", 50.45, 30.52),
            row("C", "bad", "10:00:00", 50.45, 30.52),
        ];
        CorrelationEngine::from_rows(rows, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_from_rows_counts_drops() {
        let engine = engine();
        assert_eq!(engine.batch().record_count(), 3);
        assert_eq!(engine.dropped().total(), 2);
        assert_eq!(engine.subscribers(), vec!["A", "B"]);
        assert_eq!(engine.dates().len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.meeting.max_distance = -1.0;
        let result = CorrelationEngine::new(NormalizedBatch::default(), config);
        assert!(matches!(result, Err(CellMatchError::InvalidParameter { .. })));
    }

    #[test]
    fn test_meetings_and_json() {
        let engine = engine();
        let report = engine.meetings(&NoProgress).unwrap();
        assert_eq!(report.candidates.len(), 1);

        let json = engine.meetings_json(&NoProgress).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["candidates"][0]["kind"], "distance");
        assert_eq!(value["candidates"][0]["first"]["subscriber_id"], "A");
    }

    #[test]
    fn test_meetings_between() {
        let engine = engine();
        assert_eq!(
            engine.meetings_between("B", "A", &NoProgress).unwrap().candidates.len(),
            1
        );
        assert!(engine.meetings_between("A", "A", &NoProgress).is_err());
    }

    #[test]
    fn test_similar_days() {
        let engine = engine();
        let date = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
        let report = engine.similar_days("A", date, &NoProgress).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].similarity_percent, 100.0);
    }

    #[test]
    fn test_activity() {
        let engine = engine();
        let summary = engine.activity("A");
        assert_eq!(summary.overall.total_events, 2);
        assert_eq!(summary.peak_hour, Some(10));
        assert!(engine.activity_json("A").unwrap().contains("\"months\""));

        let day = engine
            .activity_on("A", NaiveDate::from_ymd_opt(2025, 7, 19).unwrap())
            .unwrap();
        assert_eq!(day.total_events, 1);
    }

    #[test]
    fn test_locations_for_all_subscribers() {
        let engine = engine();
        let all = engine.all_locations().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].subscriber_id, "A");
        assert!(engine.locations_json("A").unwrap().contains("\"subscriber_id\":\"A\""));
    }

    #[test]
    fn test_match_events_per_subscriber() {
        let engine = engine();
        let date = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
        let events = [ReferenceEvent::new(
            "e1",
            date,
            chrono::NaiveTime::from_hms_opt(10, 8, 0).unwrap(),
        )];

        let any = engine.match_events(None, &events, &NoProgress).unwrap();
        assert_eq!(any.matches[0].record.subscriber_id, "B");
        assert_eq!(any.matches[0].offset_minutes, 2.0);

        let only_a = engine.match_events(Some("A"), &events, &NoProgress).unwrap();
        assert_eq!(only_a.matches[0].record.subscriber_id, "A");
        assert_eq!(only_a.stats.before_event, 1);

        let json = engine.match_events_json(Some("A"), &events, &NoProgress).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["matches"][0]["kind"], "in_window");
        assert_eq!(value["matches"][0]["side"], "before");
    }
}
