//! Record and trajectory model.
//!
//! Raw rows (from a spreadsheet reader, a CSV parser or JSON) are validated
//! into [`Record`]s and partitioned into per-subscriber, per-date
//! [`Trajectory`]s. Rows that fail validation are dropped and counted in
//! [`DropStats`]; normalization never fails.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::geo_utils::normalize_degrees;
use crate::GpsPoint;

/// Date formats accepted for the date column.
const DATE_FORMATS: [&str; 3] = ["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Time formats accepted for the time column.
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Largest spreadsheet serial day number (31.12.9999).
const MAX_SERIAL_DAY: f64 = 2_958_465.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Raw input
// ============================================================================

/// A single cell of a raw input row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl RawValue {
    /// Trimmed, non-empty textual form of the value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            RawValue::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            _ => None,
        }
    }

    /// Numeric form of the value. Text accepts a decimal comma.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
            RawValue::Empty => return None,
        };
        value.is_finite().then_some(value)
    }

    fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RawValue::Text(s) => parse_date(s),
            RawValue::Number(n) => serial_to_date(*n),
            RawValue::Empty => None,
        }
    }

    fn as_time(&self) -> Option<NaiveTime> {
        match self {
            RawValue::Text(s) => parse_time(s),
            RawValue::Number(n) => fraction_to_time(*n),
            RawValue::Empty => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Empty)
    }
}

/// Canonical fields of a traffic row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Subscriber,
    Date,
    Time,
    Latitude,
    Longitude,
    Azimuth,
    Label,
}

/// Header spellings seen in operator exports, lowercased.
static COLUMN_ALIASES: Lazy<HashMap<String, Field>> = Lazy::new(|| {
    let table: [(Field, &[&str]); 7] = [
        (
            Field::Subscriber,
            &["абонент а", "абонент", "subscriber", "subscriber_id", "subscriber_a", "msisdn"],
        ),
        (Field::Date, &["дата", "date"]),
        (Field::Time, &["час", "время", "time"]),
        (
            Field::Latitude,
            &["широта", "latitude", "lat", "latitude_degrees"],
        ),
        (
            Field::Longitude,
            &["довгота", "долгота", "longitude", "lon", "long", "lng", "longitude_degrees"],
        ),
        (Field::Azimuth, &["азимут", "аз.", "аз", "azimuth"]),
        (
            Field::Label,
            &["адреса бс", "адреса", "адрес бс", "адрес", "bs address", "bs_address", "address", "label"],
        ),
    ];

    table
        .iter()
        .flat_map(|(field, names)| names.iter().map(move |n| (n.to_string(), *field)))
        .collect()
});

/// Resolve a column header to its canonical field, ignoring case and
/// surrounding whitespace.
pub fn resolve_column(header: &str) -> Option<Field> {
    COLUMN_ALIASES.get(&header.trim().to_lowercase()).copied()
}

/// One unvalidated input row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRow {
    pub subscriber_id: RawValue,
    pub date: RawValue,
    pub time: RawValue,
    pub latitude: RawValue,
    pub longitude: RawValue,
    pub azimuth: RawValue,
    pub label: RawValue,
}

impl RawRow {
    /// Build a row from `(header, value)` pairs.
    ///
    /// Headers are resolved through the alias table; unknown headers are
    /// ignored and the first non-empty value for a field wins.
    ///
    /// # Example
    /// ```
    /// use cell_matcher::records::RawRow;
    ///
    /// let row = RawRow::from_columns([
    ///     ("Абонент А", "380501112233"),
    ///     ("Дата", "18.07.2025"),
    ///     ("Час", "23:10:00"),
    ///     ("Широта", "50,4501"),
    ///     ("Долгота", "30.5234"),
    /// ]);
    /// assert_eq!(row.latitude.as_f64(), Some(50.4501));
    /// ```
    pub fn from_columns<I, K, V>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let mut row = RawRow::default();
        for (header, value) in columns {
            let Some(field) = resolve_column(header.as_ref()) else {
                continue;
            };
            let slot = row.slot_mut(field);
            if *slot == RawValue::Empty {
                *slot = value.into();
            }
        }
        row
    }

    fn slot_mut(&mut self, field: Field) -> &mut RawValue {
        match field {
            Field::Subscriber => &mut self.subscriber_id,
            Field::Date => &mut self.date,
            Field::Time => &mut self.time,
            Field::Latitude => &mut self.latitude,
            Field::Longitude => &mut self.longitude,
            Field::Azimuth => &mut self.azimuth,
            Field::Label => &mut self.label,
        }
    }
}

// ============================================================================
// Validated model
// ============================================================================

/// One observed traffic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subscriber_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub point: GpsPoint,
    /// Antenna direction in degrees [0, 360), directional sources only
    pub azimuth: Option<f64>,
    /// Address or cell name, carried through for reporting
    pub label: String,
}

impl Record {
    /// Create a record without azimuth or label.
    pub fn new(
        subscriber_id: &str,
        date: NaiveDate,
        time: NaiveTime,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            subscriber_id: subscriber_id.to_string(),
            date,
            time,
            point: GpsPoint::new(latitude, longitude),
            azimuth: None,
            label: String::new(),
        }
    }

    /// Attach an antenna azimuth (wrapped into [0, 360)).
    pub fn with_azimuth(mut self, azimuth: f64) -> Self {
        self.azimuth = azimuth.is_finite().then(|| normalize_degrees(azimuth));
        self
    }

    /// Attach a location label.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Absolute time difference to another record in minutes.
    pub fn minutes_apart(&self, other: &Record) -> f64 {
        let delta = self.datetime() - other.datetime();
        (delta.num_milliseconds() as f64 / 60_000.0).abs()
    }

    /// Hour of the day (0-23).
    pub fn hour(&self) -> u32 {
        self.time.hour()
    }
}

/// All records of one subscriber on one date, ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub subscriber_id: String,
    pub date: NaiveDate,
    pub records: Vec<Record>,
}

impl Trajectory {
    /// Create a trajectory, stably sorting the records by time of day.
    pub fn new(subscriber_id: &str, date: NaiveDate, mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.time);
        Self {
            subscriber_id: subscriber_id.to_string(),
            date,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Coordinates of the trajectory in time order.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.records.iter().map(|r| r.point).collect()
    }
}

/// Why a raw row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingSubscriber,
    BadTimestamp,
    BadCoordinates,
}

/// Counters of rows dropped during normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    pub missing_subscriber: usize,
    pub bad_timestamp: usize,
    pub bad_coordinates: usize,
}

impl DropStats {
    pub fn total(&self) -> usize {
        self.missing_subscriber + self.bad_timestamp + self.bad_coordinates
    }

    fn count(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingSubscriber => self.missing_subscriber += 1,
            DropReason::BadTimestamp => self.bad_timestamp += 1,
            DropReason::BadCoordinates => self.bad_coordinates += 1,
        }
    }
}

/// Validated trajectories plus the count of rejected rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBatch {
    /// Ordered by (subscriber, date)
    pub trajectories: Vec<Trajectory>,
    pub dropped: DropStats,
}

impl NormalizedBatch {
    /// Partition already-validated records into trajectories.
    pub fn from_records<I: IntoIterator<Item = Record>>(records: I) -> Self {
        let mut buckets: BTreeMap<(String, NaiveDate), Vec<Record>> = BTreeMap::new();
        for record in records {
            buckets
                .entry((record.subscriber_id.clone(), record.date))
                .or_default()
                .push(record);
        }

        let trajectories = buckets
            .into_iter()
            .map(|((subscriber_id, date), records)| Trajectory::new(&subscriber_id, date, records))
            .collect();

        Self {
            trajectories,
            dropped: DropStats::default(),
        }
    }

    /// Sorted, de-duplicated subscriber ids.
    pub fn subscribers(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .trajectories
            .iter()
            .map(|t| t.subscriber_id.as_str())
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Sorted, de-duplicated dates across all subscribers.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self.trajectories.iter().map(|t| t.date).collect();
        dates.into_iter().collect()
    }

    /// All trajectories of one subscriber, ordered by date.
    pub fn for_subscriber(&self, subscriber_id: &str) -> Vec<&Trajectory> {
        self.trajectories
            .iter()
            .filter(|t| t.subscriber_id == subscriber_id)
            .collect()
    }

    pub fn trajectory(&self, subscriber_id: &str, date: NaiveDate) -> Option<&Trajectory> {
        self.trajectories
            .iter()
            .find(|t| t.subscriber_id == subscriber_id && t.date == date)
    }

    pub fn record_count(&self) -> usize {
        self.trajectories.iter().map(Trajectory::len).sum()
    }

    /// Iterate over every record in (subscriber, date, time) order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.trajectories.iter().flat_map(|t| t.records.iter())
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Validate one raw row.
pub fn normalize_row(row: &RawRow) -> std::result::Result<Record, DropReason> {
    let subscriber_id = row
        .subscriber_id
        .as_text()
        .ok_or(DropReason::MissingSubscriber)?;

    let date = row.date.as_date().ok_or(DropReason::BadTimestamp)?;
    let time = row.time.as_time().ok_or(DropReason::BadTimestamp)?;

    let latitude = row.latitude.as_f64().ok_or(DropReason::BadCoordinates)?;
    let longitude = row.longitude.as_f64().ok_or(DropReason::BadCoordinates)?;
    let point = GpsPoint::new(latitude, longitude);
    if !point.is_valid() {
        return Err(DropReason::BadCoordinates);
    }

    Ok(Record {
        subscriber_id,
        date,
        time,
        point,
        azimuth: row.azimuth.as_f64().map(normalize_degrees),
        label: row.label.as_text().unwrap_or_default(),
    })
}

/// Validate raw rows and partition them into trajectories.
///
/// Invalid rows are dropped and counted; this never fails.
pub fn normalize_rows<I: IntoIterator<Item = RawRow>>(rows: I) -> NormalizedBatch {
    let mut dropped = DropStats::default();
    let mut records = Vec::new();

    for row in rows {
        match normalize_row(&row) {
            Ok(record) => records.push(record),
            Err(reason) => dropped.count(reason),
        }
    }

    if dropped.total() > 0 {
        warn!(
            "[Records] Dropped {} rows ({} missing subscriber, {} bad timestamp, {} bad coordinates)",
            dropped.total(),
            dropped.missing_subscriber,
            dropped.bad_timestamp,
            dropped.bad_coordinates
        );
    }

    let mut batch = NormalizedBatch::from_records(records);
    batch.dropped = dropped;
    batch
}

/// Parse a date column value, ignoring any trailing time component.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let date_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parse a time column value (`HH:MM:SS` or `HH:MM`).
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
}

/// Spreadsheet serial day number to a date (1900 date system).
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=MAX_SERIAL_DAY).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Fraction of a day (or the fractional part of a serial date-time) to a
/// time of day.
fn fraction_to_time(value: f64) -> Option<NaiveTime> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = (value.fract() * SECONDS_PER_DAY).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
}
