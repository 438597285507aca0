//! Flood category classification.
//!
//! Maps a stage or flow value onto the point's threshold ladder. Points with
//! an incomplete ladder still classify as far as the defined levels allow.

use serde::Serialize;

use crate::model::FloodThresholds;

/// Flood categories, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodCategory {
    /// No value, or no thresholds to compare against.
    Indeterminate,
    BelowAction,
    /// Between action and flood stage.
    Action,
    Minor,
    /// Moderate, or higher when the major level is undefined.
    Moderate,
    Major,
}

impl FloodCategory {
    /// VTEC flood severity code.
    pub fn severity_code(&self) -> &'static str {
        match self {
            FloodCategory::Indeterminate => "U",
            FloodCategory::BelowAction => "N",
            FloodCategory::Action => "0",
            FloodCategory::Minor => "1",
            FloodCategory::Moderate => "2",
            FloodCategory::Major => "3",
        }
    }
}

impl std::fmt::Display for FloodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FloodCategory::Indeterminate => "indeterminate",
            FloodCategory::BelowAction => "below action",
            FloodCategory::Action => "action",
            FloodCategory::Minor => "minor",
            FloodCategory::Moderate => "moderate",
            FloodCategory::Major => "major",
        };
        write!(f, "{}", name)
    }
}

/// Classifies `value` against `thresholds`.
///
/// Levels are checked from the top down and a level counts as reached when
/// the value is at or above it. Undefined levels are skipped.
pub fn classify(value: Option<f64>, thresholds: &FloodThresholds) -> FloodCategory {
    let Some(value) = value else {
        return FloodCategory::Indeterminate;
    };
    if thresholds.is_empty() {
        return FloodCategory::Indeterminate;
    }

    let ladder = [
        (thresholds.major, FloodCategory::Major),
        (thresholds.moderate, FloodCategory::Moderate),
        (thresholds.flood, FloodCategory::Minor),
        (thresholds.action, FloodCategory::Action),
    ];

    ladder
        .into_iter()
        .find_map(|(level, category)| level.filter(|l| value >= *l).map(|_| category))
        .unwrap_or(FloodCategory::BelowAction)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
