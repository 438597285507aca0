//! Flood candidate assembly and grouping.
//!
//! A [`FloodCandidate`] is the engine's product for one forecast point: a
//! fully populated river flood hazard recommendation. Candidates are only
//! built once every piece of the analysis is available, then collected per
//! forecast group and per county for product generation downstream.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::alert::record::RecordStatus;
use crate::alert::thresholds::FloodCategory;
use crate::analysis::crossing::CrossingEnvelope;
use crate::logging::{self, Component};
use crate::model::{
    CountyForecastGroup, FloodThresholds, ForecastGroup, ForecastPoint, PHENOMENON_FLOOD, PointWindow, offset_hours,
};

fn millis<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(t.timestamp_millis())
}

/// Absent times go out as `0`, which consumers read as "not yet".
fn millis_or_zero<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(t.map(|t| t.timestamp_millis()).unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodCandidate {
    pub lid: String,
    pub name: String,
    pub phenomenon: String,
    pub significance: String,
    #[serde(serialize_with = "millis")]
    pub start_time: DateTime<Utc>,
    /// Fall-below time shifted by the point's shift hours; `None` if the
    /// river has not fallen below flood stage within the window.
    #[serde(serialize_with = "millis_or_zero")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "millis")]
    pub rise_above_time: DateTime<Utc>,
    #[serde(serialize_with = "millis_or_zero")]
    pub fall_below_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "millis")]
    pub crest_time: DateTime<Utc>,
    pub crest_value: f64,
    pub current_value: Option<f64>,
    #[serde(serialize_with = "millis_or_zero")]
    pub current_time: Option<DateTime<Utc>>,
    pub max_value: Option<f64>,
    pub category: FloodCategory,
    pub flood_severity: String,
    pub record_status: RecordStatus,
    pub flood_record: String,
    pub action_stage: Option<f64>,
    pub flood_stage: f64,
    #[serde(serialize_with = "millis_or_zero")]
    pub basis_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "millis")]
    pub expiration_time: DateTime<Utc>,
}

impl FloodCandidate {
    pub fn start_millis(&self) -> i64 {
        self.start_time.timestamp_millis()
    }

    /// End time in epoch milliseconds, `0` while still above flood stage.
    pub fn end_millis(&self) -> i64 {
        self.end_time.map(|t| t.timestamp_millis()).unwrap_or(0)
    }

    pub fn crest_millis(&self) -> i64 {
        self.crest_time.timestamp_millis()
    }

    pub fn fall_below_millis(&self) -> i64 {
        self.fall_below_time.map(|t| t.timestamp_millis()).unwrap_or(0)
    }
}

/// Everything known about a point once its analysis has finished.
#[derive(Debug, Clone)]
pub struct CandidateParts<'a> {
    pub point: &'a ForecastPoint,
    pub thresholds: &'a FloodThresholds,
    pub flood_stage: f64,
    pub envelope: CrossingEnvelope,
    pub category: FloodCategory,
    pub record_status: RecordStatus,
    pub current: Option<(DateTime<Utc>, f64)>,
    pub max_value: Option<f64>,
    pub basis_time: Option<DateTime<Utc>>,
    pub window: PointWindow,
}

/// `time` moved by `hours`; an unrepresentable result keeps `time`.
fn shifted_or_unchanged(lid: &str, what: &str, time: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    offset_hours(time, hours).unwrap_or_else(|| {
        logging::warn(Component::Assembler, Some(lid), &format!("{} + {}h overflows, left unshifted", what, hours));
        time
    })
}

/// Builds the candidate for one point.
pub fn assemble_candidate(
    parts: &CandidateParts<'_>,
    significance: &str,
    system_time: DateTime<Utc>,
    expiration_hours: i64,
) -> FloodCandidate {
    let env = &parts.envelope;
    let lid = parts.point.lid.as_str();
    let end_time = env
        .fall_below
        .map(|t| shifted_or_unchanged(lid, "end time", t, parts.window.shift_hours));

    FloodCandidate {
        lid: parts.point.lid.clone(),
        name: parts.point.name.clone(),
        phenomenon: PHENOMENON_FLOOD.to_string(),
        significance: significance.to_string(),
        start_time: env.rise_above,
        end_time,
        rise_above_time: env.rise_above,
        fall_below_time: env.fall_below,
        crest_time: env.crest_time,
        crest_value: env.crest_value,
        current_value: parts.current.map(|(_, v)| v),
        current_time: parts.current.map(|(t, _)| t),
        max_value: parts.max_value,
        category: parts.category,
        flood_severity: parts.category.severity_code().to_string(),
        record_status: parts.record_status,
        flood_record: parts.record_status.code().to_string(),
        action_stage: parts.thresholds.action,
        flood_stage: parts.flood_stage,
        basis_time: parts.basis_time,
        expiration_time: shifted_or_unchanged(lid, "expiration time", system_time, expiration_hours),
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecommendation {
    pub group_id: String,
    pub name: String,
    pub candidates: Vec<FloodCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyRecommendation {
    pub county: String,
    pub state: String,
    pub candidates: Vec<FloodCandidate>,
}

fn candidates_for(candidates: &[FloodCandidate], point_ids: &[String]) -> Vec<FloodCandidate> {
    point_ids
        .iter()
        .filter_map(|id| candidates.iter().find(|c| &c.lid == id))
        .cloned()
        .collect()
}

/// Groups that have at least one candidate, in group order. Every
/// qualifying point is kept; nothing is merged across points.
pub fn group_candidates(candidates: &[FloodCandidate], groups: &[ForecastGroup]) -> Vec<GroupRecommendation> {
    groups
        .iter()
        .map(|g| GroupRecommendation {
            group_id: g.group_id.clone(),
            name: g.name.clone(),
            candidates: candidates_for(candidates, &g.point_ids),
        })
        .filter(|g| !g.candidates.is_empty())
        .collect()
}

pub fn county_candidates(candidates: &[FloodCandidate], counties: &[CountyForecastGroup]) -> Vec<CountyRecommendation> {
    counties
        .iter()
        .map(|c| CountyRecommendation {
            county: c.county.clone(),
            state: c.state.clone(),
            candidates: candidates_for(candidates, &c.point_ids),
        })
        .filter(|c| !c.candidates.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WindowOverrides;
    use chrono::TimeZone;

    fn point(lid: &str) -> ForecastPoint {
        ForecastPoint {
            lid: lid.to_string(),
            name: format!("{} gauge", lid),
            county: "Burt".to_string(),
            state: "NE".to_string(),
            office: "OAX".to_string(),
            group_id: "MISSOURI".to_string(),
            physical_element: "HG".to_string(),
            stage: FloodThresholds { action: Some(33.0), flood: Some(35.0), moderate: Some(38.0), major: Some(41.0) },
            flow: FloodThresholds::default(),
            overrides: WindowOverrides::default(),
        }
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 2, day, hour, 0, 0).unwrap()
    }

    fn parts<'a>(p: &'a ForecastPoint, fall: Option<DateTime<Utc>>, shift: i64) -> CandidateParts<'a> {
        CandidateParts {
            point: p,
            thresholds: &p.stage,
            flood_stage: 35.0,
            envelope: CrossingEnvelope {
                rise_above: t(7, 19),
                crest_time: t(8, 18),
                crest_value: 39.91,
                fall_below: fall,
                above_at_start: false,
            },
            category: FloodCategory::Moderate,
            record_status: RecordStatus::NotRecord,
            current: Some((t(8, 4), 39.04)),
            max_value: Some(39.91),
            basis_time: Some(t(8, 0)),
            window: PointWindow { look_back_hours: 72, look_forward_hours: 360, basis_hours: 72, shift_hours: shift },
        }
    }

    #[test]
    fn test_candidate_carries_envelope_and_codes() {
        let p = point("DCTN1");
        let c = assemble_candidate(&parts(&p, Some(t(9, 5)), 0), "W", t(8, 5), 24);
        assert_eq!(c.phenomenon, "FL");
        assert_eq!(c.significance, "W");
        assert_eq!(c.start_time, t(7, 19));
        assert_eq!(c.end_time, Some(t(9, 5)));
        assert_eq!(c.crest_millis(), 1_297_188_000_000);
        assert_eq!(c.flood_severity, "2");
        assert_eq!(c.flood_record, "NO");
        assert_eq!(c.current_value, Some(39.04));
        assert_eq!(c.action_stage, Some(33.0));
        assert_eq!(c.expiration_time, t(9, 5));
    }

    #[test]
    fn test_shift_hours_move_only_the_end_time() {
        let p = point("DCTN1");
        let c = assemble_candidate(&parts(&p, Some(t(9, 5)), 6), "W", t(8, 5), 24);
        assert_eq!(c.end_time, Some(t(9, 11)));
        assert_eq!(c.fall_below_time, Some(t(9, 5)));
    }

    #[test]
    fn test_overflowing_hours_leave_times_unshifted() {
        let p = point("DCTN1");
        let c = assemble_candidate(&parts(&p, Some(t(9, 5)), i64::MAX), "W", t(8, 5), i64::MAX);
        assert_eq!(c.end_time, Some(t(9, 5)));
        assert_eq!(c.expiration_time, t(8, 5));
    }

    #[test]
    fn test_open_ended_event_serializes_zero_end() {
        let p = point("NEBN1");
        let c = assemble_candidate(&parts(&p, None, 6), "W", t(8, 5), 24);
        assert_eq!(c.end_millis(), 0);
        assert_eq!(c.fall_below_millis(), 0);

        let json: serde_json::Value = serde_json::to_value(&c).unwrap();
        assert_eq!(json["end_time"], 0);
        assert_eq!(json["fall_below_time"], 0);
        assert_eq!(json["crest_time"], 1_297_188_000_000i64);
        assert_eq!(json["category"], "moderate");
    }

    #[test]
    fn test_grouping_keeps_every_qualifying_point() {
        let a = point("DCTN1");
        let b = point("BLAN1");
        let candidates = vec![
            assemble_candidate(&parts(&a, None, 0), "W", t(8, 5), 24),
            assemble_candidate(&parts(&b, None, 0), "W", t(8, 5), 24),
        ];
        let groups = vec![
            ForecastGroup { group_id: "MISSOURI".into(), name: "Missouri".into(), ordinal: 1, point_ids: vec!["BLAN1".into(), "DCTN1".into(), "NEBN1".into()] },
            ForecastGroup { group_id: "PLATTE".into(), name: "Platte".into(), ordinal: 2, point_ids: vec!["LSLN1".into()] },
        ];
        let grouped = group_candidates(&candidates, &groups);
        assert_eq!(grouped.len(), 1, "groups without candidates are left out");
        let lids: Vec<&str> = grouped[0].candidates.iter().map(|c| c.lid.as_str()).collect();
        assert_eq!(lids, vec!["BLAN1", "DCTN1"], "group order, no suppression");

        let counties = vec![CountyForecastGroup { county: "Burt".into(), state: "NE".into(), point_ids: vec!["DCTN1".into(), "BLAN1".into()] }];
        let by_county = county_candidates(&candidates, &counties);
        assert_eq!(by_county[0].candidates.len(), 2);
    }
}
