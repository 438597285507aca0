//! Recommendation run.
//!
//! A run loads a [`Session`] once (system time, settings, forecast points,
//! groupings, ingest ranks) and then walks every forecast point through the
//! same pipeline:
//!
//! ```text
//! river status -> type-source ranking -> observed + forecast rows
//!     -> hydrograph -> flood crossings -> category + record -> candidate
//! ```
//!
//! Failures are isolated per point. A query or row error for one point is
//! logged and the point is reported as skipped; the rest of the run goes on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::alert::record::{PointRecordSubject, evaluate_record_status, flood_category_table, record_crest};
use crate::alert::thresholds::classify;
use crate::analysis::crossing::analyze_crossings;
use crate::analysis::hydrograph::{BasisPolicy, HydrographInputs, build_hydrograph};
use crate::analysis::ranker::{IngestEntry, RankEntry, TypeSourceChoice, rank_entries_for, select_type_source};
use crate::config::{EngineConfig, checked_settings, resolve_window};
use crate::dao::{RiverDao, parse_each};
use crate::dao::row::{self, RawRow};
use crate::logging::{self, Component};
use crate::model::{
    CountyForecastGroup, DaoError, FORECAST_TS_PREFIX, ForecastGroup, ForecastPoint, HazardSettings, Hydrograph,
    OBSERVED_TS_PREFIX, PointWindow, RowError, TimeSeriesRecord, is_flow_element,
};
use crate::recommend::{
    CandidateParts, CountyRecommendation, FloodCandidate, GroupRecommendation, assemble_candidate, county_candidates,
    group_candidates,
};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything loaded once per run.
#[derive(Debug, Clone)]
pub struct Session {
    pub system_time: DateTime<Utc>,
    pub settings: HazardSettings,
    pub config: EngineConfig,
    pub defaults: PointWindow,
    pub points: Vec<ForecastPoint>,
    pub groups: Vec<ForecastGroup>,
    pub counties: Vec<CountyForecastGroup>,
    /// Ingest table entries keyed by primary physical element.
    pub ingest: BTreeMap<String, Vec<IngestEntry>>,
}

fn parse_rows<T>(rows: &[RawRow], parse: impl Fn(&[row::ColumnValue]) -> Result<T, RowError>) -> Result<Vec<T>, DaoError> {
    rows.iter().map(|r| parse(r.as_slice()).map_err(DaoError::from)).collect()
}

impl Session {
    pub fn load<D: RiverDao + ?Sized>(dao: &mut D, config: EngineConfig) -> Result<Self, DaoError> {
        let system_time = dao.system_time()?;
        let settings = checked_settings(dao.retrieve_settings()?);
        let points = dao.forecast_point_info(&settings)?;
        let groups = dao.forecast_group_info(&points)?;
        let counties = dao.forecast_county_groups(&settings, &points)?;

        let mut ingest = BTreeMap::new();
        for point in &points {
            let pe = &point.physical_element;
            if ingest.contains_key(pe) {
                continue;
            }
            let entries = match dao.ingest_table(pe) {
                Ok(rows) => parse_each(&rows, "ingest table", row::ingest_entry),
                Err(e) => {
                    logging::warn(Component::Dao, None, &format!("Ingest table for {} unavailable: {}", pe, e));
                    Vec::new()
                }
            };
            ingest.insert(pe.clone(), entries);
        }

        let defaults = config.default_window(&settings);
        logging::info(
            Component::System,
            None,
            &format!(
                "Session at {} with {} forecast points in {} groups",
                system_time.format("%Y-%m-%d %H:%M UTC"),
                points.len(),
                groups.len()
            ),
        );

        Ok(Self { system_time, settings, config, defaults, points, groups, counties, ingest })
    }

    pub fn window_for(&self, point: &ForecastPoint) -> PointWindow {
        resolve_window(self.defaults, point)
    }
}

// ---------------------------------------------------------------------------
// Per-point outcome
// ---------------------------------------------------------------------------

/// Why a point produced no candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Neither an observed nor a forecast type-source could be chosen.
    NoPrimarySource,
    /// The hydrograph has no usable samples in the window.
    NoUsableData,
    /// The governing threshold set has no flood stage/flow.
    NoFloodThreshold,
    /// Nothing in the window is above flood stage.
    BelowFloodStage,
    /// A query or row error for this point.
    DataFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoPrimarySource => write!(f, "no primary type-source"),
            SkipReason::NoUsableData => write!(f, "no usable data in window"),
            SkipReason::NoFloodThreshold => write!(f, "no flood threshold defined"),
            SkipReason::BelowFloodStage => write!(f, "below flood stage"),
            SkipReason::DataFailure(msg) => write!(f, "data failure: {}", msg),
        }
    }
}

impl Serialize for SkipReason {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPoint {
    pub lid: String,
    pub reason: SkipReason,
}

impl SkippedPoint {
    pub fn is_failure(&self) -> bool {
        matches!(self.reason, SkipReason::DataFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    Candidate(FloodCandidate),
    Skipped(SkipReason),
}

/// The type-sources chosen for one point.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSelection {
    pub observed: TypeSourceChoice,
    pub forecast: TypeSourceChoice,
}

impl SourceSelection {
    pub fn is_empty(&self) -> bool {
        self.observed.type_source().is_none() && self.forecast.type_source().is_none()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Ranks the type-sources currently reporting for a point.
///
/// With no status rows at all the ingest ranks alone decide, through the
/// DAO's best-ts lookup.
pub fn select_sources<D: RiverDao + ?Sized>(
    dao: &mut D,
    session: &Session,
    point: &ForecastPoint,
    window: &PointWindow,
) -> Result<SourceSelection, DaoError> {
    let lid = point.lid.as_str();
    let pe = point.physical_element.as_str();

    let status = dao.retrieve_river_status(lid, pe, window.observed_begin(session.system_time), session.system_time)?;
    let available = parse_rows(&status, row::river_status_type_source)?;

    if available.is_empty() {
        let fallback = |ts: Option<String>| match ts {
            Some(type_source) => TypeSourceChoice::Fallback { type_source },
            None => TypeSourceChoice::NoRankedSource,
        };
        let observed = fallback(dao.best_ts(lid, pe, OBSERVED_TS_PREFIX, 1)?);
        let forecast = fallback(dao.best_ts(lid, pe, FORECAST_TS_PREFIX, 1)?);
        logging::debug(Component::Ranker, Some(lid), "no river status, using ingest ranks");
        return Ok(SourceSelection { observed, forecast });
    }

    let rows = dao.retrieve_ingest_settings(lid, pe)?;
    let mut entries: Vec<RankEntry> = parse_rows(&rows, row::rank_entry)?;
    if entries.is_empty() {
        entries = session
            .ingest
            .get(pe)
            .map(|ingest| rank_entries_for(ingest, pe))
            .unwrap_or_default();
    }

    let of_kind = |prefix: &str| -> Vec<String> {
        available.iter().filter(|ts| ts.starts_with(prefix)).cloned().collect()
    };
    let observed = select_type_source(&entries, &of_kind(OBSERVED_TS_PREFIX));
    let forecast = select_type_source(&entries, &of_kind(FORECAST_TS_PREFIX));

    if let TypeSourceChoice::Fallback { type_source } = &observed {
        logging::debug(Component::Ranker, Some(lid), &format!("no ranked observed source, using {}", type_source));
    }
    Ok(SourceSelection { observed, forecast })
}

/// Fetches both segments and splices them into one hydrograph.
pub fn load_hydrograph<D: RiverDao + ?Sized>(
    dao: &mut D,
    session: &Session,
    point: &ForecastPoint,
    window: &PointWindow,
    sources: &SourceSelection,
) -> Result<Hydrograph, DaoError> {
    let lid = point.lid.as_str();
    let pe = point.physical_element.as_str();
    let system = session.system_time;
    let policy = BasisPolicy {
        use_latest_forecast: session.config.use_latest_forecast,
        merge_issuances: session.config.merge_forecast_issuances,
    };

    let observed: Vec<TimeSeriesRecord> = match sources.observed.type_source() {
        Some(ts) => {
            let rows = dao.river_observed_hydrograph(lid, pe, ts, window.observed_begin(system), system)?;
            parse_rows(&rows, row::observed_record)?
        }
        None => Vec::new(),
    };

    let mut basis_times = Vec::new();
    let mut forecast: Vec<TimeSeriesRecord> = Vec::new();
    if let Some(ts) = sources.forecast.type_source() {
        let end = window.forecast_end(system);
        let basis_begin = window.basis_begin(system);
        let rows = dao.river_forecast_basis_times(lid, pe, ts, system, end, basis_begin)?;
        basis_times = parse_rows(&rows, row::basis_time)?;
        if !basis_times.is_empty() {
            let rows = dao.river_forecast_hydrograph(
                lid,
                pe,
                ts,
                system,
                end,
                basis_begin,
                policy.use_latest_forecast,
                &basis_times,
            )?;
            forecast = parse_rows(&rows, row::forecast_record)?;
        } else {
            logging::debug(Component::Hydrograph, Some(lid), &format!("no {} issuance in basis window", ts));
        }
    }

    let inputs = HydrographInputs {
        lid,
        physical_element: pe,
        system_time: system,
        window: *window,
        observed: &observed,
        basis_times: &basis_times,
        forecast: &forecast,
    };
    Ok(build_hydrograph(&inputs, policy))
}

/// Runs one point through the whole pipeline.
pub fn recommend_point<D: RiverDao + ?Sized>(
    dao: &mut D,
    session: &Session,
    point: &ForecastPoint,
) -> Result<PointOutcome, DaoError> {
    let lid = point.lid.as_str();
    let window = session.window_for(point);

    let sources = select_sources(dao, session, point, &window)?;
    if sources.is_empty() {
        return Ok(PointOutcome::Skipped(SkipReason::NoPrimarySource));
    }

    let hydrograph = load_hydrograph(dao, session, point, &window, &sources)?;
    if hydrograph.usable_samples().next().is_none() {
        return Ok(PointOutcome::Skipped(SkipReason::NoUsableData));
    }

    let thresholds = point.governing_thresholds();
    if !thresholds.is_ordered() {
        logging::warn(Component::Classifier, Some(lid), "flood categories are not ascending");
    }
    let Some(flood_stage) = thresholds.flood else {
        logging::warn(Component::Crossing, Some(lid), "no flood threshold for governing element");
        return Ok(PointOutcome::Skipped(SkipReason::NoFloodThreshold));
    };

    let Some(envelope) = analyze_crossings(&hydrograph, flood_stage, session.config.crossing_time_mode) else {
        return Ok(PointOutcome::Skipped(SkipReason::BelowFloodStage));
    };

    let max_value = hydrograph.max_value();
    let category = classify(max_value, thresholds);

    let crests = if is_flow_element(&point.physical_element) {
        dao.flow_crest_history(lid)?
    } else {
        dao.stage_crest_history(lid)?
    };
    let record = record_crest(&crests);
    if record.is_none() {
        logging::debug(Component::Record, Some(lid), "no period-of-record crest");
    }
    let subject = PointRecordSubject {
        physical_element: point.physical_element.clone(),
        max_value,
        categories: flood_category_table(thresholds, record),
    };
    let record_status = evaluate_record_status(&subject, session.config.near_record_offset);

    let parts = CandidateParts {
        point,
        thresholds,
        flood_stage,
        envelope,
        category,
        record_status,
        current: hydrograph.latest_observed(),
        max_value,
        basis_time: hydrograph.basis_time,
        window,
    };
    let candidate = assemble_candidate(
        &parts,
        &session.config.significance,
        session.system_time,
        session.settings.expiration_hours,
    );
    logging::info(
        Component::Assembler,
        Some(lid),
        &format!(
            "{}.{} category {} crest {:.2} record {}",
            candidate.phenomenon, candidate.significance, candidate.category, candidate.crest_value, candidate.flood_record
        ),
    );
    Ok(PointOutcome::Candidate(candidate))
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Result of one recommendation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(serialize_with = "system_millis")]
    pub system_time: DateTime<Utc>,
    pub candidates: Vec<FloodCandidate>,
    pub groups: Vec<GroupRecommendation>,
    pub counties: Vec<CountyRecommendation>,
    pub skipped: Vec<SkippedPoint>,
}

fn system_millis<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(t.timestamp_millis())
}

impl Recommendation {
    pub fn candidate(&self, lid: &str) -> Option<&FloodCandidate> {
        self.candidates.iter().find(|c| c.lid == lid)
    }

    pub fn skip_reason(&self, lid: &str) -> Option<&SkipReason> {
        self.skipped.iter().find(|s| s.lid == lid).map(|s| &s.reason)
    }
}

/// Runs every point of a loaded session.
pub fn run_session<D: RiverDao + ?Sized>(dao: &mut D, session: &Session) -> Recommendation {
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();

    for point in &session.points {
        match recommend_point(dao, session, point) {
            Ok(PointOutcome::Candidate(candidate)) => candidates.push(candidate),
            Ok(PointOutcome::Skipped(reason)) => {
                logging::debug(Component::System, Some(&point.lid), &format!("skipped: {}", reason));
                skipped.push(SkippedPoint { lid: point.lid.clone(), reason });
            }
            Err(e) => {
                logging::log_point_failure(&point.lid, "recommendation", &e);
                skipped.push(SkippedPoint { lid: point.lid.clone(), reason: SkipReason::DataFailure(e.to_string()) });
            }
        }
    }

    let failed = skipped.iter().filter(|s| s.is_failure()).count();
    logging::log_run_summary(session.points.len(), candidates.len(), failed);

    Recommendation {
        system_time: session.system_time,
        groups: group_candidates(&candidates, &session.groups),
        counties: county_candidates(&candidates, &session.counties),
        candidates,
        skipped,
    }
}

/// Loads a session and runs it.
pub fn get_recommendation<D: RiverDao + ?Sized>(dao: &mut D, config: EngineConfig) -> Result<Recommendation, DaoError> {
    let session = Session::load(dao, config)?;
    Ok(run_session(dao, &session))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::fixture::{FixtureDao, forecast_row, observed_row};
    use crate::model::{FloodThresholds, WindowOverrides};
    use chrono::TimeZone;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 2, day, hour, 0, 0).unwrap()
    }

    fn point(lid: &str, flood: Option<f64>) -> ForecastPoint {
        ForecastPoint {
            lid: lid.to_string(),
            name: lid.to_string(),
            county: "Burt".to_string(),
            state: "NE".to_string(),
            office: "OAX".to_string(),
            group_id: "MISSOURI".to_string(),
            physical_element: "HG".to_string(),
            stage: FloodThresholds { action: Some(33.0), flood, moderate: Some(38.0), major: Some(41.0) },
            flow: FloodThresholds::default(),
            overrides: WindowOverrides::default(),
        }
    }

    #[test]
    fn test_ranked_sources_use_integer_order() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_observed(vec![
                observed_row("DCTN1", "HG", "RG", t(8, 1), 30.0),
                observed_row("DCTN1", "HG", "RX", t(8, 2), 30.0),
            ])
            .with_forecast(vec![forecast_row("DCTN1", "HG", "FF", t(8, 12), t(8, 0), 31.0)])
            .with_ingest_settings("DCTN1", "HG", &["12|RX", "3|RG", "1|FF"]);
        let session = Session::load(&mut dao, EngineConfig::default()).unwrap();
        let p = session.points[0].clone();
        let window = session.window_for(&p);
        let sources = select_sources(&mut dao, &session, &p, &window).unwrap();
        assert_eq!(sources.observed.type_source(), Some("RG"));
        assert_eq!(sources.forecast.type_source(), Some("FF"));
    }

    #[test]
    fn test_no_status_falls_back_to_ingest_table() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_ingest_table(&["2|HG|RG", "1|HG|RZ", "1|HG|FF"]);
        let session = Session::load(&mut dao, EngineConfig::default()).unwrap();
        let p = session.points[0].clone();
        let window = session.window_for(&p);
        let sources = select_sources(&mut dao, &session, &p, &window).unwrap();
        assert_eq!(sources.observed, TypeSourceChoice::Fallback { type_source: "RZ".to_string() });
        assert_eq!(sources.forecast.type_source(), Some("FF"));
    }

    #[test]
    fn test_bad_ingest_row_for_other_element_is_harmless() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_ingest_table(&["2|HG|RG", "1|HG|RZ", "x|QR|RG", "1|HG|FF"]);
        let session = Session::load(&mut dao, EngineConfig::default()).unwrap();
        assert_eq!(session.ingest["HG"].len(), 3);
        let p = session.points[0].clone();
        let window = session.window_for(&p);
        let sources = select_sources(&mut dao, &session, &p, &window).unwrap();
        assert_eq!(sources.observed.type_source(), Some("RZ"));
    }

    #[test]
    fn test_bad_ingest_row_for_same_element_is_dropped() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_ingest_table(&["2|HG|RG", "x|HG|RZ"]);
        let session = Session::load(&mut dao, EngineConfig::default()).unwrap();
        let codes: Vec<&str> = session.ingest["HG"].iter().map(|e| e.type_source.as_str()).collect();
        assert_eq!(codes, vec!["RG"]);
    }

    #[test]
    fn test_out_of_range_settings_do_not_panic() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_settings(HazardSettings {
                expiration_hours: i64::MAX,
                look_back_hours: 72,
                look_forward_hours: 1_000_000_000_000,
                home_office: String::new(),
            })
            .with_point(ForecastPoint {
                overrides: WindowOverrides { basis_hours: Some(i64::MAX), ..WindowOverrides::default() },
                ..point("DCTN1", Some(35.0))
            })
            .with_observed(vec![observed_row("DCTN1", "HG", "RG", t(8, 4), 36.0)])
            .with_forecast(vec![forecast_row("DCTN1", "HG", "FF", t(8, 12), t(8, 0), 34.0)]);
        let session = Session::load(&mut dao, EngineConfig::default()).unwrap();
        assert_eq!(session.settings.expiration_hours, 24);
        assert_eq!(session.defaults.look_forward_hours, 360);
        assert_eq!(session.window_for(&session.points[0]).basis_hours, 72);

        let rec = run_session(&mut dao, &session);
        let c = rec.candidate("DCTN1").expect("point above flood stage");
        assert_eq!(c.expiration_time, t(9, 5));
        assert_eq!(c.fall_below_time.map(|f| f > t(8, 4)), Some(true));
    }

    #[test]
    fn test_point_without_data_is_skipped_not_failed() {
        let mut dao = FixtureDao::new(t(8, 5)).with_point(point("DCTN1", Some(35.0)));
        let rec = get_recommendation(&mut dao, EngineConfig::default()).unwrap();
        assert!(rec.candidates.is_empty());
        assert_eq!(rec.skip_reason("DCTN1"), Some(&SkipReason::NoPrimarySource));
    }

    #[test]
    fn test_missing_flood_stage_yields_no_candidate() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", None))
            .with_observed(vec![observed_row("DCTN1", "HG", "RG", t(8, 4), 50.0)]);
        let rec = get_recommendation(&mut dao, EngineConfig::default()).unwrap();
        assert_eq!(rec.skip_reason("DCTN1"), Some(&SkipReason::NoFloodThreshold));
    }

    #[test]
    fn test_below_flood_stage_is_skipped() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_observed(vec![observed_row("DCTN1", "HG", "RG", t(8, 4), 34.0)])
            .with_forecast(vec![forecast_row("DCTN1", "HG", "FF", t(8, 12), t(8, 0), 35.0)]);
        let rec = get_recommendation(&mut dao, EngineConfig::default()).unwrap();
        assert_eq!(rec.skip_reason("DCTN1"), Some(&SkipReason::BelowFloodStage), "equal to flood stage is not above");
    }

    #[test]
    fn test_missing_values_do_not_count() {
        let mut dao = FixtureDao::new(t(8, 5))
            .with_point(point("DCTN1", Some(35.0)))
            .with_observed(vec![
                observed_row("DCTN1", "HG", "RG", t(8, 3), -9999.0),
                observed_row("DCTN1", "HG", "RG", t(8, 4), 2_000_000_000.0),
            ]);
        let rec = get_recommendation(&mut dao, EngineConfig::default()).unwrap();
        assert_eq!(rec.skip_reason("DCTN1"), Some(&SkipReason::NoUsableData));
    }
}
