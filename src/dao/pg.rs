/// PostgreSQL implementation of the DAO against the hydrologic database.
///
/// Observed values live in `height` (stage PEs) or `discharge` (flow PEs),
/// forecasts in `fcstheight` / `fcstdischarge`. Timestamps in these tables
/// are `timestamp without time zone` holding UTC.
///
/// Every query result is converted into positional [`RawRow`]s so the engine
/// parses database rows and fixture rows the same way.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use postgres::types::Type;
use postgres::{Client, NoTls, Row};

use super::row::{self, ColumnValue, RawRow};
use super::{RiverDao, county_groups_from, forecast_groups_from, parse_each};
use crate::analysis::ranker;
use crate::model::{
    CountyForecastGroup, CrestHistory, DaoError, ForecastGroup, ForecastPoint, HazardSettings,
    is_flow_element,
};

impl From<postgres::Error> for DaoError {
    fn from(e: postgres::Error) -> Self {
        DaoError::Query(e.to_string())
    }
}

pub struct PgRiverDao {
    client: Client,
    /// Replay offset: the DAO reports a system time this many days ago.
    days_offset: i64,
}

impl PgRiverDao {
    pub fn connect(database_url: &str) -> Result<Self, DaoError> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(Self { client, days_offset: 0 })
    }

    /// Connects using `DATABASE_URL` from the environment or `.env`.
    pub fn from_env() -> Result<Self, DaoError> {
        dotenv::dotenv().ok();
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DaoError::NotFound("DATABASE_URL environment variable".to_string()))?;
        Self::connect(&url)
    }

    /// Replays historical data as if it were current. Check the offset
    /// with [`replay_time`] first; an unrepresentable one fails every
    /// `system_time` call.
    pub fn with_days_offset(mut self, days_offset: i64) -> Self {
        self.days_offset = days_offset;
        self
    }

    fn query_rows(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Result<Vec<RawRow>, DaoError> {
        let rows = self.client.query(sql, params)?;
        rows.iter().map(raw_row).collect()
    }
}

fn observed_table(pe: &str) -> &'static str {
    if is_flow_element(pe) { "discharge" } else { "height" }
}

fn forecast_table(pe: &str) -> &'static str {
    if is_flow_element(pe) { "fcstdischarge" } else { "fcstheight" }
}

fn naive(t: DateTime<Utc>) -> NaiveDateTime {
    t.naive_utc()
}

/// Converts one driver row into column values by declared column type.
fn raw_row(row: &Row) -> Result<RawRow, DaoError> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?.map(|v| ColumnValue::Int(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.map(|v| ColumnValue::Int(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(ColumnValue::Int)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?.map(|v| ColumnValue::Float(v.into()))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(ColumnValue::Float)
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(|t| ColumnValue::Time(t.and_utc()))
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<DateTime<Utc>>>(idx)?.map(ColumnValue::Time)
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<NaiveDate>>(idx)?
                .map(|d| ColumnValue::Time(d.and_time(NaiveTime::MIN).and_utc()))
        } else {
            row.try_get::<_, Option<String>>(idx)?
                .map(|s| ColumnValue::Text(s.trim_end().to_string()))
        };
        values.push(value.unwrap_or(ColumnValue::Null));
    }
    Ok(values)
}

/// `now` moved back by `days_offset` days.
pub fn replay_time(now: DateTime<Utc>, days_offset: i64) -> Result<DateTime<Utc>, DaoError> {
    TimeDelta::try_days(days_offset)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| DaoError::Query(format!("replay offset of {} days is out of range", days_offset)))
}

const FORECAST_COLUMNS: &str = "lid, pe, dur, ts, extremum, probability, validtime, basistime, value, \
     shef_qual_code, quality_code, revision, product_id, producttime, postingtime";

impl RiverDao for PgRiverDao {
    fn forecast_point_info(&mut self, settings: &HazardSettings) -> Result<Vec<ForecastPoint>, DaoError> {
        let rows = self.query_rows(
            "SELECT lid, name, county, state, hsa, group_id, pe, wstg, fs,
                    moderate_stage, major_stage, action_flow, fq, moderate_flow, major_flow,
                    backhrs, forwardhrs, adjustendhrs
             FROM fpinfo
             WHERE ($1 = '' OR hsa = $1)
             ORDER BY group_id, ordinal, lid",
            &[&settings.home_office],
        )?;
        Ok(parse_each(&rows, "fpinfo", row::forecast_point))
    }

    fn forecast_group_info(&mut self, points: &[ForecastPoint]) -> Result<Vec<ForecastGroup>, DaoError> {
        let rows = self.query_rows(
            "SELECT group_id, group_name, ordinal FROM rpffcstgroup ORDER BY ordinal, group_id",
            &[],
        )?;
        let configured = parse_each(&rows, "rpffcstgroup", row::forecast_group);
        Ok(forecast_groups_from(&configured, points))
    }

    fn forecast_county_groups(
        &mut self,
        _settings: &HazardSettings,
        points: &[ForecastPoint],
    ) -> Result<Vec<CountyForecastGroup>, DaoError> {
        Ok(county_groups_from(points))
    }

    fn retrieve_settings(&mut self) -> Result<HazardSettings, DaoError> {
        let rows = self.query_rows(
            "SELECT p.obshrs, p.fcsthrs, p.flwexphrs, a.hsa
             FROM rpfparams p CROSS JOIN admin a
             LIMIT 1",
            &[],
        )?;
        match rows.first() {
            Some(r) => Ok(row::hazard_settings(r)?),
            None => Ok(HazardSettings::default()),
        }
    }

    fn retrieve_river_status(
        &mut self,
        lid: &str,
        pe: &str,
        begin_valid_time: DateTime<Utc>,
        system_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError> {
        self.query_rows(
            "SELECT lid, pe, dur, ts, extremum, probability, validtime, basistime, value
             FROM riverstatus
             WHERE lid = $1 AND pe = $2 AND validtime >= $3
               AND (ts LIKE 'F%' OR validtime <= $4)
             ORDER BY ts",
            &[&lid, &pe, &naive(begin_valid_time), &naive(system_time)],
        )
    }

    fn retrieve_ingest_settings(&mut self, lid: &str, pe: &str) -> Result<Vec<RawRow>, DaoError> {
        self.query_rows(
            "SELECT ts_rank, ts FROM ingestfilter
             WHERE lid = $1 AND pe = $2 AND ingest = 'T'
             ORDER BY ts_rank, ts",
            &[&lid, &pe],
        )
    }

    fn ingest_table(&mut self, primary_pe: &str) -> Result<Vec<RawRow>, DaoError> {
        self.query_rows(
            "SELECT DISTINCT ts_rank, pe, ts FROM ingestfilter
             WHERE pe = $1 AND ingest = 'T'
             ORDER BY ts_rank, ts",
            &[&primary_pe],
        )
    }

    fn river_observed_hydrograph(
        &mut self,
        lid: &str,
        pe: &str,
        ts: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError> {
        let sql = format!(
            "SELECT lid, pe, dur, ts, extremum, obstime, value, shef_qual_code, quality_code,
                    revision, product_id, producttime, postingtime
             FROM {}
             WHERE lid = $1 AND pe = $2 AND ts = $3 AND obstime >= $4 AND obstime <= $5
             ORDER BY obstime ASC",
            observed_table(pe)
        );
        self.query_rows(&sql, &[&lid, &pe, &ts, &naive(begin_time), &naive(end_time)])
    }

    fn river_forecast_basis_times(
        &mut self,
        lid: &str,
        pe: &str,
        ts: &str,
        system_time: DateTime<Utc>,
        end_valid_time: DateTime<Utc>,
        basis_begin_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError> {
        let sql = format!(
            "SELECT DISTINCT basistime FROM {}
             WHERE lid = $1 AND pe = $2 AND ts = $3 AND probability < 0.0
               AND validtime >= $4 AND validtime <= $5 AND basistime >= $6
             ORDER BY basistime DESC",
            forecast_table(pe)
        );
        self.query_rows(
            &sql,
            &[&lid, &pe, &ts, &naive(system_time), &naive(end_valid_time), &naive(basis_begin_time)],
        )
    }

    fn river_forecast_hydrograph(
        &mut self,
        lid: &str,
        pe: &str,
        ts: &str,
        system_time: DateTime<Utc>,
        end_valid_time: DateTime<Utc>,
        basis_begin_time: DateTime<Utc>,
        use_latest_forecast: bool,
        basis_times: &[DateTime<Utc>],
    ) -> Result<Vec<RawRow>, DaoError> {
        let wanted: Vec<NaiveDateTime> = if use_latest_forecast {
            basis_times.iter().copied().max().map(naive).into_iter().collect()
        } else {
            basis_times.iter().copied().map(naive).collect()
        };
        let sql = format!(
            "SELECT {} FROM {}
             WHERE lid = $1 AND pe = $2 AND ts = $3 AND probability < 0.0
               AND validtime >= $4 AND validtime <= $5 AND basistime >= $6
               AND basistime = ANY($7)
             ORDER BY validtime ASC",
            FORECAST_COLUMNS,
            forecast_table(pe)
        );
        self.query_rows(
            &sql,
            &[
                &lid,
                &pe,
                &ts,
                &naive(system_time),
                &naive(end_valid_time),
                &naive(basis_begin_time),
                &wanted,
            ],
        )
    }

    fn flow_crest_history(&mut self, lid: &str) -> Result<Vec<CrestHistory>, DaoError> {
        let rows = self.query_rows(
            "SELECT q, datcrst FROM crest WHERE lid = $1 AND q IS NOT NULL ORDER BY datcrst",
            &[&lid],
        )?;
        rows.iter().map(|r| row::crest_entry(r).map_err(DaoError::from)).collect()
    }

    fn stage_crest_history(&mut self, lid: &str) -> Result<Vec<CrestHistory>, DaoError> {
        let rows = self.query_rows(
            "SELECT stage, datcrst FROM crest WHERE lid = $1 AND stage IS NOT NULL ORDER BY datcrst",
            &[&lid],
        )?;
        rows.iter().map(|r| row::crest_entry(r).map_err(DaoError::from)).collect()
    }

    fn best_ts(&mut self, lid: &str, pe: &str, ts_prefix: &str, ordinal: usize) -> Result<Option<String>, DaoError> {
        let entries = self
            .retrieve_ingest_settings(lid, pe)?
            .iter()
            .map(|r| row::rank_entry(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ranker::best_ts(&entries, ts_prefix, ordinal))
    }

    fn system_time(&mut self) -> Result<DateTime<Utc>, DaoError> {
        replay_time(Utc::now(), self.days_offset)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
