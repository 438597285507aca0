/// Core data types for the river flood recommendation engine.
///
/// This module defines the shared domain model imported by all other modules:
/// forecast points and their thresholds, time-series samples, hydrographs,
/// group/county collections, and the error types raised at the DAO boundary.
/// It contains no analysis logic.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sentinels and codes
// ---------------------------------------------------------------------------

/// Missing-value marker used by the hydrologic database. Only ever seen at
/// the DAO boundary; ingestion turns it into `None`.
pub const MISSING_VALUE: f64 = -9999.0;

/// Values at or above this are questionable/bad and are excluded from
/// threshold analysis (they stay in the hydrograph for display).
pub const QUESTIONABLE_BAD_THRESHOLD: f64 = 1_073_741_824.0;

/// Type-source prefix for observed (reading) data, e.g. "RG", "RZ".
pub const OBSERVED_TS_PREFIX: &str = "R";

/// Type-source prefix for forecast data, e.g. "FF", "FZ".
pub const FORECAST_TS_PREFIX: &str = "F";

/// Physical element for river stage.
pub const PE_STAGE: &str = "HG";

/// Physical element for pool elevation.
pub const PE_POOL: &str = "HP";

/// Hazard phenomenon emitted for river flooding.
pub const PHENOMENON_FLOOD: &str = "FL";

/// Translates a raw database value into the engine's optional form.
///
/// Anything within a hair of the missing sentinel counts as missing, since
/// the value has usually been through a float4 column.
pub fn value_from_raw(raw: f64) -> Option<f64> {
    if (raw - MISSING_VALUE).abs() < 0.01 || raw.is_nan() {
        None
    } else {
        Some(raw)
    }
}

/// Returns true if the physical element measures flow (discharge) rather
/// than height.
pub fn is_flow_element(physical_element: &str) -> bool {
    physical_element.starts_with('Q')
}

// ---------------------------------------------------------------------------
// Forecast points
// ---------------------------------------------------------------------------

/// Flood thresholds for one governing quantity (stage in feet or flow in
/// cfs). Any level may be undefined.
///
/// Levels in ascending order when all are defined:
///   action <= flood <= moderate <= major
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FloodThresholds {
    pub action: Option<f64>,
    pub flood: Option<f64>,
    pub moderate: Option<f64>,
    pub major: Option<f64>,
}

impl FloodThresholds {
    /// True if every pair of defined levels is in non-decreasing order.
    pub fn is_ordered(&self) -> bool {
        let defined: Vec<f64> = [self.action, self.flood, self.moderate, self.major]
            .into_iter()
            .flatten()
            .collect();
        defined.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.flood.is_none() && self.moderate.is_none() && self.major.is_none()
    }
}

/// Per-point overrides of the session-wide hour windows. `None` means the
/// point uses the global default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowOverrides {
    pub look_back_hours: Option<i64>,
    pub look_forward_hours: Option<i64>,
    pub basis_hours: Option<i64>,
    pub shift_hours: Option<i64>,
}

/// A river gauge location for which recommendations are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Location identifier, e.g. "DCTN1".
    pub lid: String,
    pub name: String,
    pub county: String,
    pub state: String,
    /// Responsible office (hydrologic service area).
    pub office: String,
    /// Forecast group the point belongs to.
    pub group_id: String,
    /// Primary physical element, e.g. "HG".
    pub physical_element: String,
    pub stage: FloodThresholds,
    pub flow: FloodThresholds,
    #[serde(default)]
    pub overrides: WindowOverrides,
}

impl ForecastPoint {
    /// Thresholds that apply to the point's primary physical element.
    pub fn governing_thresholds(&self) -> &FloodThresholds {
        if is_flow_element(&self.physical_element) {
            &self.flow
        } else {
            &self.stage
        }
    }
}

/// A named, ordered collection of forecast points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastGroup {
    pub group_id: String,
    pub name: String,
    pub ordinal: i32,
    pub point_ids: Vec<String>,
}

/// Forecast points grouped by the county they lie in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyForecastGroup {
    pub county: String,
    pub state: String,
    pub point_ids: Vec<String>,
}

/// Settings stored alongside the hydrologic data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardSettings {
    /// Hours after issuance at which a recommended hazard expires.
    pub expiration_hours: i64,
    pub look_back_hours: i64,
    pub look_forward_hours: i64,
    /// Home office identifier, e.g. "OAX".
    pub home_office: String,
}

impl Default for HazardSettings {
    fn default() -> Self {
        Self {
            expiration_hours: 24,
            look_back_hours: 72,
            look_forward_hours: 360,
            home_office: String::new(),
        }
    }
}

/// One entry of a point's crest history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrestHistory {
    pub value: Option<f64>,
    pub date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

/// A single observed or forecast sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub lid: String,
    pub physical_element: String,
    pub duration: i32,
    pub type_source: String,
    pub extremum: String,
    pub valid_time: DateTime<Utc>,
    /// Present only for forecast records.
    pub basis_time: Option<DateTime<Utc>>,
    /// `None` when the source carried the missing sentinel.
    pub value: Option<f64>,
    pub shef_qual_code: Option<String>,
    pub quality_code: Option<i64>,
    pub revision: Option<i32>,
    pub product_id: Option<String>,
    pub product_time: Option<DateTime<Utc>>,
    pub posting_time: Option<DateTime<Utc>>,
}

impl TimeSeriesRecord {
    pub fn is_forecast(&self) -> bool {
        self.basis_time.is_some()
    }

    /// True if the value is at or above the questionable/bad threshold.
    pub fn is_suspect(&self) -> bool {
        self.value.is_some_and(|v| v >= QUESTIONABLE_BAD_THRESHOLD)
    }

    /// The value if it may take part in threshold analysis.
    pub fn usable_value(&self) -> Option<f64> {
        if self.is_suspect() { None } else { self.value }
    }
}

/// Time-ascending merged series for one point and physical element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Hydrograph {
    pub lid: String,
    pub physical_element: String,
    /// Basis time of the forecast issuance spliced in, if any.
    pub basis_time: Option<DateTime<Utc>>,
    pub records: Vec<TimeSeriesRecord>,
}

impl Hydrograph {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Samples eligible for threshold evaluation, as (valid time, value).
    pub fn usable_samples(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.records
            .iter()
            .filter_map(|r| r.usable_value().map(|v| (r.valid_time, v)))
    }

    /// Latest usable observed sample.
    pub fn latest_observed(&self) -> Option<(DateTime<Utc>, f64)> {
        self.records
            .iter()
            .rev()
            .filter(|r| !r.is_forecast())
            .find_map(|r| r.usable_value().map(|v| (r.valid_time, v)))
    }

    /// Maximum usable value across the observed and forecast segments.
    pub fn max_value(&self) -> Option<f64> {
        self.usable_samples().map(|(_, v)| v).reduce(f64::max)
    }
}

// ---------------------------------------------------------------------------
// Hour windows
// ---------------------------------------------------------------------------

/// Look-back / look-forward / basis / shift hours resolved for one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointWindow {
    pub look_back_hours: i64,
    pub look_forward_hours: i64,
    pub basis_hours: i64,
    pub shift_hours: i64,
}

/// Largest hour count accepted for any window or expiration setting
/// (ten years).
pub const MAX_WINDOW_HOURS: i64 = 24 * 366 * 10;

/// True if `hours` is a usable window length.
pub fn hours_in_range(hours: i64) -> bool {
    (0..=MAX_WINDOW_HOURS).contains(&hours)
}

/// `time` moved by `hours`, or `None` if the result is not representable.
pub fn offset_hours(time: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_hours(hours).and_then(|d| time.checked_add_signed(d))
}

/// Like [`offset_hours`] but pinned to the representable range.
fn saturating_offset(time: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    offset_hours(time, hours).unwrap_or(if hours < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC })
}

impl PointWindow {
    pub fn observed_begin(&self, system_time: DateTime<Utc>) -> DateTime<Utc> {
        saturating_offset(system_time, self.look_back_hours.saturating_neg())
    }

    pub fn forecast_end(&self, system_time: DateTime<Utc>) -> DateTime<Utc> {
        saturating_offset(system_time, self.look_forward_hours)
    }

    pub fn basis_begin(&self, system_time: DateTime<Utc>) -> DateTime<Utc> {
        saturating_offset(system_time, self.basis_hours.saturating_neg())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while reading a positional row through its column schema.
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    /// The schema has no column with this name.
    UnknownColumn { table: &'static str, column: String },
    /// The row is shorter than the schema expects.
    MissingColumn { table: &'static str, index: usize },
    /// The column holds a value of a different type.
    WrongType { table: &'static str, column: &'static str, expected: &'static str },
    /// A required column was null.
    NullValue { table: &'static str, column: &'static str },
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::UnknownColumn { table, column } => {
                write!(f, "Invalid column '{}' for table {}", column, table)
            }
            RowError::MissingColumn { table, index } => {
                write!(f, "Row for table {} has no column at position {}", table, index)
            }
            RowError::WrongType { table, column, expected } => {
                write!(f, "Column {}.{} is not of type {}", table, column, expected)
            }
            RowError::NullValue { table, column } => {
                write!(f, "Column {}.{} is null", table, column)
            }
        }
    }
}

impl std::error::Error for RowError {}

/// Errors surfaced by a data-access implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum DaoError {
    /// A returned row could not be read.
    Row(RowError),
    /// The underlying query failed.
    Query(String),
    /// A required entity does not exist.
    NotFound(String),
}

impl std::fmt::Display for DaoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaoError::Row(e) => write!(f, "Row error: {}", e),
            DaoError::Query(msg) => write!(f, "Query error: {}", msg),
            DaoError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for DaoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaoError::Row(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RowError> for DaoError {
    fn from(e: RowError) -> Self {
        DaoError::Row(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
