/// Flood threshold crossing detection.
///
/// One forward pass over the usable samples of a hydrograph finds the
/// envelope of the flood event: when the river first rose above the
/// threshold, its highest point, and when it finally fell back to or below
/// the threshold. A series that bounces around flood stage yields a single
/// envelope running from the first rise to the last fall.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Hydrograph;

/// How rise/fall times are placed between two samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingTimeMode {
    /// Time of the first sample on the far side of the threshold.
    #[default]
    Exact,
    /// Linear interpolation between the two straddling samples.
    Interpolated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingEnvelope {
    pub rise_above: DateTime<Utc>,
    pub crest_time: DateTime<Utc>,
    pub crest_value: f64,
    /// `None` while the river has not fallen back below the threshold
    /// within the window.
    pub fall_below: Option<DateTime<Utc>>,
    /// The first usable sample was already above the threshold.
    pub above_at_start: bool,
}

fn crossing_time(
    mode: CrossingTimeMode,
    threshold: f64,
    (t0, v0): (DateTime<Utc>, f64),
    (t1, v1): (DateTime<Utc>, f64),
) -> DateTime<Utc> {
    match mode {
        CrossingTimeMode::Exact => t1,
        CrossingTimeMode::Interpolated => {
            if v1 == v0 {
                return t1;
            }
            let fraction = ((threshold - v0) / (v1 - v0)).clamp(0.0, 1.0);
            let span_ms = (t1 - t0).num_milliseconds() as f64;
            t0 + Duration::milliseconds((fraction * span_ms).round() as i64)
        }
    }
}

/// Scans time-ascending `(time, value)` samples for the flood envelope.
///
/// "Above" means strictly greater than `threshold`. Returns `None` if no
/// sample is above.
pub fn find_envelope<I>(samples: I, threshold: f64, mode: CrossingTimeMode) -> Option<CrossingEnvelope>
where
    I: IntoIterator<Item = (DateTime<Utc>, f64)>,
{
    let mut previous: Option<(DateTime<Utc>, f64)> = None;
    let mut rise: Option<DateTime<Utc>> = None;
    let mut above_at_start = false;
    let mut crest: Option<(DateTime<Utc>, f64)> = None;
    let mut fall: Option<DateTime<Utc>> = None;

    for (time, value) in samples {
        let above = value > threshold;

        match previous {
            None if above => {
                rise = Some(time);
                above_at_start = true;
            }
            Some(prev) => {
                let prev_above = prev.1 > threshold;
                if !prev_above && above && rise.is_none() {
                    rise = Some(crossing_time(mode, threshold, prev, (time, value)));
                } else if prev_above && !above {
                    fall = Some(crossing_time(mode, threshold, prev, (time, value)));
                }
            }
            None => {}
        }

        if above {
            // A later rise reopens the event.
            fall = None;
            if crest.is_none_or(|(_, v)| value > v) {
                crest = Some((time, value));
            }
        }

        previous = Some((time, value));
    }

    let rise_above = rise?;
    let (crest_time, crest_value) = crest?;
    Some(CrossingEnvelope {
        rise_above,
        crest_time,
        crest_value,
        fall_below: fall,
        above_at_start,
    })
}

/// Envelope of a hydrograph against `threshold`. Missing and suspect
/// samples are skipped.
pub fn analyze_crossings(hydrograph: &Hydrograph, threshold: f64, mode: CrossingTimeMode) -> Option<CrossingEnvelope> {
    find_envelope(hydrograph.usable_samples(), threshold, mode)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
