/// Data-access boundary of the recommendation engine.
///
/// The engine never talks to storage directly; it calls a [`RiverDao`]. Two
/// implementations exist:
/// - `fixture::FixtureDao`: in-memory record fixtures (tests, replays)
/// - `pg::PgRiverDao`     : queries against the hydrologic database
///
/// Time-series queries return positional rows (see `row`) that the engine
/// parses itself.

pub mod fixture;
pub mod pg;
pub mod row;

use chrono::{DateTime, Utc};

use crate::logging::{self, Component};
use crate::model::{
    CountyForecastGroup, CrestHistory, DaoError, ForecastGroup, ForecastPoint, HazardSettings, RowError,
};
use row::{ColumnValue, RawRow};

pub trait RiverDao {
    /// Forecast points served by the settings' home office.
    fn forecast_point_info(&mut self, settings: &HazardSettings) -> Result<Vec<ForecastPoint>, DaoError>;

    /// Forecast groups containing the given points, each listing only
    /// those points.
    fn forecast_group_info(&mut self, points: &[ForecastPoint]) -> Result<Vec<ForecastGroup>, DaoError>;

    fn forecast_county_groups(
        &mut self,
        settings: &HazardSettings,
        points: &[ForecastPoint],
    ) -> Result<Vec<CountyForecastGroup>, DaoError>;

    fn retrieve_settings(&mut self) -> Result<HazardSettings, DaoError>;

    /// Latest status rows per type-source for a point and PE.
    fn retrieve_river_status(
        &mut self,
        lid: &str,
        pe: &str,
        begin_valid_time: DateTime<Utc>,
        system_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError>;

    /// `rank, ts` rows for a point and PE.
    fn retrieve_ingest_settings(&mut self, lid: &str, pe: &str) -> Result<Vec<RawRow>, DaoError>;

    /// `rank, pe, ts` rows for a physical element.
    fn ingest_table(&mut self, primary_pe: &str) -> Result<Vec<RawRow>, DaoError>;

    fn river_observed_hydrograph(
        &mut self,
        lid: &str,
        pe: &str,
        ts: &str,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError>;

    /// Distinct basis times, newest first.
    fn river_forecast_basis_times(
        &mut self,
        lid: &str,
        pe: &str,
        ts: &str,
        system_time: DateTime<Utc>,
        end_valid_time: DateTime<Utc>,
        basis_begin_time: DateTime<Utc>,
    ) -> Result<Vec<RawRow>, DaoError>;

    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<Vec<RawRow>, DaoError>;

    fn flow_crest_history(&mut self, lid: &str) -> Result<Vec<CrestHistory>, DaoError>;

    fn stage_crest_history(&mut self, lid: &str) -> Result<Vec<CrestHistory>, DaoError>;

    /// The `ordinal`-th best ranked type-source starting with `ts_prefix`.
    fn best_ts(&mut self, lid: &str, pe: &str, ts_prefix: &str, ordinal: usize) -> Result<Option<String>, DaoError>;

    fn system_time(&mut self) -> Result<DateTime<Utc>, DaoError>;
}

/// Parses session-wide rows one at a time. A row that does not parse is
/// logged and dropped so it cannot take the other rows down with it.
pub fn parse_each<T>(rows: &[RawRow], what: &str, parse: impl Fn(&[ColumnValue]) -> Result<T, RowError>) -> Vec<T> {
    rows.iter()
        .filter_map(|r| match parse(r.as_slice()) {
            Ok(value) => Some(value),
            Err(e) => {
                logging::warn(Component::Dao, None, &format!("Dropping {} row: {}", what, e));
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Grouping helpers shared by implementations
// ---------------------------------------------------------------------------

/// Groups points by county/state in first-seen order.
pub fn county_groups_from(points: &[ForecastPoint]) -> Vec<CountyForecastGroup> {
    let mut groups: Vec<CountyForecastGroup> = Vec::new();
    for point in points {
        match groups
            .iter_mut()
            .find(|g| g.county == point.county && g.state == point.state)
        {
            Some(group) => group.point_ids.push(point.lid.clone()),
            None => groups.push(CountyForecastGroup {
                county: point.county.clone(),
                state: point.state.clone(),
                point_ids: vec![point.lid.clone()],
            }),
        }
    }
    groups
}

/// Restricts configured groups to the given points. Points whose group is
/// not configured get a group of their own named after the group id.
pub fn forecast_groups_from(configured: &[ForecastGroup], points: &[ForecastPoint]) -> Vec<ForecastGroup> {
    let mut groups: Vec<ForecastGroup> = configured
        .iter()
        .map(|g| ForecastGroup { point_ids: Vec::new(), ..g.clone() })
        .collect();

    for point in points {
        match groups.iter_mut().find(|g| g.group_id == point.group_id) {
            Some(group) => group.point_ids.push(point.lid.clone()),
            None => groups.push(ForecastGroup {
                group_id: point.group_id.clone(),
                name: point.group_id.clone(),
                ordinal: i32::MAX,
                point_ids: vec![point.lid.clone()],
            }),
        }
    }

    groups.retain(|g| !g.point_ids.is_empty());
    groups.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.group_id.cmp(&b.group_id)));
    groups
}
