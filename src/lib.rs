//! # Cell Matcher
//!
//! Spatiotemporal correlation of cellular traffic records.
//!
//! This library provides:
//! - Meeting detection between subscribers (distance and antenna-sector tests)
//! - Home/work inference from dwell patterns
//! - Similar-route search across days
//! - Activity statistics and region filtering
//! - Nearest-record lookup around reference events
//!
//! ## Features
//!
//! - **`parallel`** - Scan date buckets in parallel with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use cell_matcher::{CorrelationEngine, EngineConfig, NoProgress, RawRow};
//!
//! let rows = vec![
//!     RawRow::from_columns([
//!         ("Subscriber", "A"), ("Date", "18.07.2025"), ("Time", "10:00:00"),
//!         ("Latitude", "50.4501"), ("Longitude", "30.5234"),
//!     ]),
//!     RawRow::from_columns([
//!         ("Subscriber", "B"), ("Date", "18.07.2025"), ("Time", "10:12:00"),
//!         ("Latitude", "50.4503"), ("Longitude", "30.5236"),
//!     ]),
//! ];
//!
//! let engine = CorrelationEngine::from_rows(rows, EngineConfig::default()).unwrap();
//! let report = engine.meetings(&NoProgress).unwrap();
//! for meeting in &report.candidates {
//!     println!(
//!         "{} met {} on {} ({:.0} m, {})",
//!         meeting.first.subscriber_id,
//!         meeting.second.subscriber_id,
//!         meeting.date,
//!         meeting.distance_m,
//!         meeting.kind.as_str()
//!     );
//! }
//! assert_eq!(report.candidates.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{CellMatchError, OptionExt, Result};

// Geographic utilities (distance, bearing, envelopes)
pub mod geo_utils;

// R-tree point index for radius queries
pub mod spatial;

// Progress callbacks and cooperative cancellation
pub mod progress;
pub use progress::{NoProgress, ProgressSink};

// Input rows, validated records and per-day trajectories
pub mod records;
pub use records::{
    normalize_rows, DropStats, NormalizedBatch, RawRow, RawValue, Record, Trajectory,
};

// Dwell episodes and per-location profiles
pub mod dwell;
pub use dwell::{build_location_profiles, cluster_episodes, DwellConfig, DwellEpisode, LocationProfile};

// Home/work inference
pub mod locations;
pub use locations::{analyze_locations, infer_home_work, HomeWork, LocationSummary};

// Pairwise meeting detection
pub mod meetings;
#[cfg(feature = "parallel")]
pub use meetings::find_meetings_parallel;
pub use meetings::{
    find_meetings, find_meetings_between, MatchKind, MeetingCandidate, MeetingConfig,
    MeetingReport, MeetingStats,
};

// Route similarity between days
pub mod similarity;
pub use similarity::{
    find_similar_days, find_similar_routes, route_similarity, SimilarityConfig, SimilarityReport,
    SimilarityResult,
};

// Activity statistics by day, hour and month
pub mod activity;
pub use activity::{summarize_activity, summarize_day, ActivitySummary, DayActivity};

// GeoJSON region filter
pub mod region;
pub use region::Region;

// Nearest-record lookup around reference events
pub mod filter;
pub use filter::{
    match_events, EventMatch, EventMatchKind, EventMatchReport, EventMatchStats, EventSide,
    EventWindow, ReferenceEvent,
};

// Engine configuration
pub mod config;
pub use config::EngineConfig;

// Analysis front end over one batch
pub mod engine;
pub use engine::CorrelationEngine;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use cell_matcher::GpsPoint;
/// let point = GpsPoint::new(50.4501, 30.5234); // Kyiv
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(50.4501, 30.5234).is_valid());
        assert!(GpsPoint::new(-90.0, 180.0).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_gps_point_serde_field_names() {
        let json = serde_json::to_string(&GpsPoint::new(50.0, 30.0)).unwrap();
        assert_eq!(json, r#"{"latitude":50.0,"longitude":30.0}"#);
    }
}
