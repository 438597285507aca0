//! Positional rows returned by the data-access layer.
//!
//! Every query hands back rows in the column order of the table it reads
//! from. Each table is described once by a [`TableSchema`]; typed accessors
//! look columns up by name through that schema, so there is no per-table
//! hand-written column switch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ranker::{IngestEntry, RankEntry};
use crate::model::{
    CrestHistory, FloodThresholds, ForecastGroup, ForecastPoint, HazardSettings, RowError,
    TimeSeriesRecord, WindowOverrides, value_from_raw,
};

/// A single column value as produced by the database driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Text(s.to_string())
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Float(v)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Int(v)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(t: DateTime<Utc>) -> Self {
        ColumnValue::Time(t)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ColumnValue::Null)
    }
}

pub type RawRow = Vec<ColumnValue>;

/// Splits a pipe-delimited row such as `"12|FF"` into text columns.
pub fn pipe_row(line: &str) -> RawRow {
    line.split('|').map(|s| ColumnValue::Text(s.trim().to_string())).collect()
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

pub struct TableSchema {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl TableSchema {
    pub fn index_of(&self, column: &str) -> Result<usize, RowError> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| RowError::UnknownColumn {
                table: self.table,
                column: column.to_string(),
            })
    }

    pub fn view<'a>(&'static self, values: &'a [ColumnValue]) -> RowView<'a> {
        RowView { schema: self, values }
    }
}

pub static OBSERVED_HYDROGRAPH: TableSchema = TableSchema {
    table: "observed_hydrograph",
    columns: &[
        "lid", "pe", "dur", "ts", "extremum", "validtime", "value", "shef_qual_code",
        "quality_code", "revision", "product_id", "producttime", "postingtime",
    ],
};

pub static FORECAST_HYDROGRAPH: TableSchema = TableSchema {
    table: "forecast_hydrograph",
    columns: &[
        "lid", "pe", "dur", "ts", "extremum", "probability", "validtime", "basistime", "value",
        "shef_qual_code", "quality_code", "revision", "product_id", "producttime", "postingtime",
    ],
};

pub static BASIS_TIMES: TableSchema = TableSchema {
    table: "forecast_basis_times",
    columns: &["basistime"],
};

pub static RIVER_STATUS: TableSchema = TableSchema {
    table: "riverstatus",
    columns: &[
        "lid", "pe", "dur", "ts", "extremum", "probability", "validtime", "basistime", "value",
    ],
};

pub static INGEST_SETTINGS: TableSchema = TableSchema {
    table: "ingest_settings",
    columns: &["rank", "ts"],
};

pub static INGEST_TABLE: TableSchema = TableSchema {
    table: "ingestfilter",
    columns: &["rank", "pe", "ts"],
};

pub static FORECAST_POINT_INFO: TableSchema = TableSchema {
    table: "fpinfo",
    columns: &[
        "lid", "name", "county", "state", "hsa", "group_id", "pe", "wstg", "fs",
        "moderate_stage", "major_stage", "action_flow", "fq", "moderate_flow", "major_flow",
        "backhrs", "forwardhrs", "adjustendhrs",
    ],
};

pub static FORECAST_GROUP: TableSchema = TableSchema {
    table: "rpffcstgroup",
    columns: &["group_id", "group_name", "ordinal"],
};

pub static CREST_HISTORY: TableSchema = TableSchema {
    table: "crest",
    columns: &["value", "datcrst"],
};

pub static RPF_PARAMS: TableSchema = TableSchema {
    table: "rpfparams",
    columns: &["obshrs", "fcsthrs", "flwexphrs", "hsa"],
};

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

pub struct RowView<'a> {
    schema: &'static TableSchema,
    values: &'a [ColumnValue],
}

impl<'a> RowView<'a> {
    fn column(&self, name: &str) -> Result<(&'static str, &'a ColumnValue), RowError> {
        let index = self.schema.index_of(name)?;
        let value = self.values.get(index).ok_or(RowError::MissingColumn {
            table: self.schema.table,
            index,
        })?;
        Ok((self.schema.columns[index], value))
    }

    fn wrong_type(&self, column: &'static str, expected: &'static str) -> RowError {
        RowError::WrongType { table: self.schema.table, column, expected }
    }

    fn null(&self, column: &'static str) -> RowError {
        RowError::NullValue { table: self.schema.table, column }
    }

    pub fn text(&self, name: &str) -> Result<Option<&'a str>, RowError> {
        match self.column(name)? {
            (_, ColumnValue::Null) => Ok(None),
            (_, ColumnValue::Text(s)) => Ok(Some(s.as_str())),
            (column, _) => Err(self.wrong_type(column, "text")),
        }
    }

    pub fn required_text(&self, name: &str) -> Result<&'a str, RowError> {
        let (column, _) = self.column(name)?;
        self.text(name)?.ok_or_else(|| self.null(column))
    }

    /// Integer column. Text holding a decimal integer is accepted, so ranks
    /// stored as strings still compare numerically.
    pub fn int(&self, name: &str) -> Result<Option<i64>, RowError> {
        match self.column(name)? {
            (_, ColumnValue::Null) => Ok(None),
            (_, ColumnValue::Int(i)) => Ok(Some(*i)),
            (column, ColumnValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.wrong_type(column, "integer")),
            (column, _) => Err(self.wrong_type(column, "integer")),
        }
    }

    pub fn required_int(&self, name: &str) -> Result<i64, RowError> {
        let (column, _) = self.column(name)?;
        self.int(name)?.ok_or_else(|| self.null(column))
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, RowError> {
        match self.column(name)? {
            (_, ColumnValue::Null) => Ok(None),
            (_, ColumnValue::Float(v)) => Ok(Some(*v)),
            (_, ColumnValue::Int(i)) => Ok(Some(*i as f64)),
            (column, ColumnValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.wrong_type(column, "float")),
            (column, _) => Err(self.wrong_type(column, "float")),
        }
    }

    /// Timestamp column. Integers are read as epoch milliseconds.
    pub fn time(&self, name: &str) -> Result<Option<DateTime<Utc>>, RowError> {
        match self.column(name)? {
            (_, ColumnValue::Null) => Ok(None),
            (_, ColumnValue::Time(t)) => Ok(Some(*t)),
            (column, ColumnValue::Int(ms)) => DateTime::from_timestamp_millis(*ms)
                .map(Some)
                .ok_or_else(|| self.wrong_type(column, "timestamp")),
            (column, _) => Err(self.wrong_type(column, "timestamp")),
        }
    }

    pub fn required_time(&self, name: &str) -> Result<DateTime<Utc>, RowError> {
        let (column, _) = self.column(name)?;
        self.time(name)?.ok_or_else(|| self.null(column))
    }
}

// ---------------------------------------------------------------------------
// Row → domain conversions
// ---------------------------------------------------------------------------

fn record_from(view: &RowView<'_>, basis_time: Option<DateTime<Utc>>) -> Result<TimeSeriesRecord, RowError> {
    Ok(TimeSeriesRecord {
        lid: view.required_text("lid")?.to_string(),
        physical_element: view.required_text("pe")?.to_string(),
        duration: view.int("dur")?.unwrap_or(0) as i32,
        type_source: view.required_text("ts")?.to_string(),
        extremum: view.text("extremum")?.unwrap_or("Z").to_string(),
        valid_time: view.required_time("validtime")?,
        basis_time,
        value: view.float("value")?.and_then(value_from_raw),
        shef_qual_code: view.text("shef_qual_code")?.map(str::to_string),
        quality_code: view.int("quality_code")?,
        revision: view.int("revision")?.map(|r| r as i32),
        product_id: view.text("product_id")?.map(str::to_string),
        product_time: view.time("producttime")?,
        posting_time: view.time("postingtime")?,
    })
}

pub fn observed_record(row: &[ColumnValue]) -> Result<TimeSeriesRecord, RowError> {
    record_from(&OBSERVED_HYDROGRAPH.view(row), None)
}

pub fn forecast_record(row: &[ColumnValue]) -> Result<TimeSeriesRecord, RowError> {
    let view = FORECAST_HYDROGRAPH.view(row);
    let basis = view.required_time("basistime")?;
    record_from(&view, Some(basis))
}

pub fn basis_time(row: &[ColumnValue]) -> Result<DateTime<Utc>, RowError> {
    BASIS_TIMES.view(row).required_time("basistime")
}

/// Type-source present in a river status row.
pub fn river_status_type_source(row: &[ColumnValue]) -> Result<String, RowError> {
    Ok(RIVER_STATUS.view(row).required_text("ts")?.to_string())
}

pub fn rank_entry(row: &[ColumnValue]) -> Result<RankEntry, RowError> {
    let view = INGEST_SETTINGS.view(row);
    Ok(RankEntry {
        rank: view.required_int("rank")?,
        type_source: view.required_text("ts")?.to_string(),
    })
}

pub fn ingest_entry(row: &[ColumnValue]) -> Result<IngestEntry, RowError> {
    let view = INGEST_TABLE.view(row);
    Ok(IngestEntry {
        rank: view.required_int("rank")?,
        physical_element: view.required_text("pe")?.to_string(),
        type_source: view.required_text("ts")?.to_string(),
    })
}

fn threshold(view: &RowView<'_>, name: &str) -> Result<Option<f64>, RowError> {
    Ok(view.float(name)?.and_then(value_from_raw))
}

pub fn forecast_point(row: &[ColumnValue]) -> Result<ForecastPoint, RowError> {
    let view = FORECAST_POINT_INFO.view(row);
    let text = |name: &str| -> Result<String, RowError> { Ok(view.text(name)?.unwrap_or_default().trim().to_string()) };
    Ok(ForecastPoint {
        lid: view.required_text("lid")?.trim().to_string(),
        name: text("name")?,
        county: text("county")?,
        state: text("state")?,
        office: text("hsa")?,
        group_id: text("group_id")?,
        physical_element: view.required_text("pe")?.trim().to_string(),
        stage: FloodThresholds {
            action: threshold(&view, "wstg")?,
            flood: threshold(&view, "fs")?,
            moderate: threshold(&view, "moderate_stage")?,
            major: threshold(&view, "major_stage")?,
        },
        flow: FloodThresholds {
            action: threshold(&view, "action_flow")?,
            flood: threshold(&view, "fq")?,
            moderate: threshold(&view, "moderate_flow")?,
            major: threshold(&view, "major_flow")?,
        },
        overrides: WindowOverrides {
            look_back_hours: view.int("backhrs")?,
            look_forward_hours: view.int("forwardhrs")?,
            basis_hours: None,
            shift_hours: view.int("adjustendhrs")?,
        },
    })
}

pub fn forecast_group(row: &[ColumnValue]) -> Result<ForecastGroup, RowError> {
    let view = FORECAST_GROUP.view(row);
    Ok(ForecastGroup {
        group_id: view.required_text("group_id")?.trim().to_string(),
        name: view.text("group_name")?.unwrap_or_default().trim().to_string(),
        ordinal: view.int("ordinal")?.unwrap_or(i64::from(i32::MAX)) as i32,
        point_ids: Vec::new(),
    })
}

pub fn crest_entry(row: &[ColumnValue]) -> Result<CrestHistory, RowError> {
    let view = CREST_HISTORY.view(row);
    Ok(CrestHistory {
        value: view.float("value")?.and_then(value_from_raw),
        date: view.required_time("datcrst")?,
    })
}

/// Settings from the `rpfparams` row; absent columns keep their defaults.
pub fn hazard_settings(row: &[ColumnValue]) -> Result<HazardSettings, RowError> {
    let view = RPF_PARAMS.view(row);
    let defaults = HazardSettings::default();
    Ok(HazardSettings {
        look_back_hours: view.int("obshrs")?.unwrap_or(defaults.look_back_hours),
        look_forward_hours: view.int("fcsthrs")?.unwrap_or(defaults.look_forward_hours),
        expiration_hours: view.int("flwexphrs")?.unwrap_or(defaults.expiration_hours),
        home_office: view.text("hsa")?.map(|s| s.trim().to_string()).unwrap_or(defaults.home_office),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
