//! Period-of-record comparison.
//!
//! Decides whether the highest observed or forecast value of an event sets
//! (or comes close to) the historical record crest.

use serde::Serialize;

use crate::model::{CrestHistory, FloodThresholds, is_flow_element};

/// What the evaluator needs to know about a forecast point.
///
/// The flood category array is ascending; its last entry is the record
/// crest, which may be undefined.
pub trait RecordSubject {
    fn physical_element(&self) -> &str;
    fn maximum_observed_forecast_value(&self) -> Option<f64>;
    fn flood_category(&self) -> &[Option<f64>];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// At or above the record crest.
    NewRecord,
    /// Within the near-record offset of the record crest.
    NearRecord,
    NotRecord,
    /// The value or the record crest is undefined.
    Unknown,
}

impl RecordStatus {
    /// VTEC flood record code. Near and new records share "NR".
    pub fn code(&self) -> &'static str {
        match self {
            RecordStatus::NewRecord | RecordStatus::NearRecord => "NR",
            RecordStatus::NotRecord => "NO",
            RecordStatus::Unknown => "UU",
        }
    }
}

/// Classifies the subject's maximum value against its record crest.
pub fn evaluate_record_status<S: RecordSubject + ?Sized>(subject: &S, near_record_offset: f64) -> RecordStatus {
    let pe = subject.physical_element();
    if !(pe.starts_with('H') || is_flow_element(pe)) {
        return RecordStatus::Unknown;
    }

    let record = subject.flood_category().last().copied().flatten();
    let (Some(value), Some(record)) = (subject.maximum_observed_forecast_value(), record) else {
        return RecordStatus::Unknown;
    };

    if value >= record {
        RecordStatus::NewRecord
    } else if record - value <= near_record_offset {
        RecordStatus::NearRecord
    } else {
        RecordStatus::NotRecord
    }
}

/// Highest known crest in a crest history.
pub fn record_crest(history: &[CrestHistory]) -> Option<f64> {
    history.iter().filter_map(|c| c.value).reduce(f64::max)
}

/// Builds the ascending flood category array with the record crest last.
pub fn flood_category_table(thresholds: &FloodThresholds, record: Option<f64>) -> Vec<Option<f64>> {
    vec![thresholds.action, thresholds.flood, thresholds.moderate, thresholds.major, record]
}

/// The per-point subject used by the recommender.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecordSubject {
    pub physical_element: String,
    pub max_value: Option<f64>,
    pub categories: Vec<Option<f64>>,
}

impl RecordSubject for PointRecordSubject {
    fn physical_element(&self) -> &str {
        &self.physical_element
    }

    fn maximum_observed_forecast_value(&self) -> Option<f64> {
        self.max_value
    }

    fn flood_category(&self) -> &[Option<f64>] {
        &self.categories
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    /// Stand-in subject with a fixed category table topping out at 20.0.
    struct StubPoint {
        pe: &'static str,
        max: Option<f64>,
        table: Vec<Option<f64>>,
    }

    impl RecordSubject for StubPoint {
        fn physical_element(&self) -> &str {
            self.pe
        }
        fn maximum_observed_forecast_value(&self) -> Option<f64> {
            self.max
        }
        fn flood_category(&self) -> &[Option<f64>] {
            &self.table
        }
    }

    fn stub(max: Option<f64>, record: Option<f64>) -> StubPoint {
        StubPoint { pe: "HG", max, table: vec![Some(10.0), Some(12.0), Some(15.0), Some(18.0), record] }
    }

    #[test]
    fn test_value_equal_to_record_is_new_record() {
        assert_eq!(evaluate_record_status(&stub(Some(20.0), Some(20.0)), 2.0).code(), "NR");
        assert_eq!(evaluate_record_status(&stub(Some(21.0), Some(20.0)), 2.0), RecordStatus::NewRecord);
    }

    #[test]
    fn test_value_within_offset_is_near_record() {
        let status = evaluate_record_status(&stub(Some(18.0), Some(20.0)), 2.0);
        assert_eq!(status, RecordStatus::NearRecord);
        assert_eq!(status.code(), "NR");
    }

    #[test]
    fn test_value_beyond_offset_is_not_record() {
        assert_eq!(evaluate_record_status(&stub(Some(17.9), Some(20.0)), 2.0).code(), "NO");
    }

    #[test]
    fn test_missing_value_or_record_is_unknown() {
        assert_eq!(evaluate_record_status(&stub(None, Some(20.0)), 2.0).code(), "UU");
        assert_eq!(evaluate_record_status(&stub(Some(19.0), None), 2.0).code(), "UU");
    }

    #[test]
    fn test_unsupported_physical_element_is_unknown() {
        let mut s = stub(Some(20.0), Some(20.0));
        s.pe = "PP";
        assert_eq!(evaluate_record_status(&s, 2.0), RecordStatus::Unknown);
    }

    #[test]
    fn test_record_crest_ignores_missing_entries() {
        let at = Utc.with_ymd_and_hms(1993, 7, 10, 0, 0, 0).unwrap();
        let history = vec![
            CrestHistory { value: Some(41.2), date: at },
            CrestHistory { value: None, date: at },
            CrestHistory { value: Some(44.6), date: at },
        ];
        assert_eq!(record_crest(&history), Some(44.6));
        assert_eq!(record_crest(&[]), None);
    }

    #[test]
    fn test_point_subject_uses_table_tail() {
        let thresholds = FloodThresholds { action: Some(33.0), flood: Some(35.0), moderate: Some(38.0), major: Some(41.0) };
        let subject = PointRecordSubject {
            physical_element: "HG".to_string(),
            max_value: Some(39.91),
            categories: flood_category_table(&thresholds, Some(44.6)),
        };
        assert_eq!(subject.flood_category().len(), 5);
        assert_eq!(evaluate_record_status(&subject, 2.0).code(), "NO");
    }
}
