/// Hydrograph construction.
///
/// Splices the observed history of a forecast point onto one forecast
/// issuance to get a single time-ascending series:
///
/// ```text
///   system - look_back        system              system + look_forward
///   |------ observed ---------|------ forecast (one basis) ------|
/// ```
///
/// Missing and suspect values are kept so the series stays continuous for
/// display; the crossing analyzer skips them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{Hydrograph, PointWindow, TimeSeriesRecord};

/// How forecast issuances are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasisPolicy {
    /// Take the newest basis time even if it is later than system time.
    pub use_latest_forecast: bool,
    /// Fill valid times the selected issuance lacks from older issuances
    /// in the basis window.
    pub merge_issuances: bool,
}

/// Everything the builder needs for one point, already fetched.
#[derive(Debug, Clone)]
pub struct HydrographInputs<'a> {
    pub lid: &'a str,
    pub physical_element: &'a str,
    pub system_time: DateTime<Utc>,
    pub window: PointWindow,
    pub observed: &'a [TimeSeriesRecord],
    pub basis_times: &'a [DateTime<Utc>],
    pub forecast: &'a [TimeSeriesRecord],
}

/// Selects the forecast issuance to splice in.
///
/// Only basis times inside the basis window count. Without
/// `use_latest_forecast` the basis time must not be later than system time.
pub fn select_basis_time(
    basis_times: &[DateTime<Utc>],
    system_time: DateTime<Utc>,
    basis_begin: DateTime<Utc>,
    use_latest_forecast: bool,
) -> Option<DateTime<Utc>> {
    basis_times
        .iter()
        .copied()
        .filter(|b| *b >= basis_begin)
        .filter(|b| use_latest_forecast || *b <= system_time)
        .max()
}

/// Candidate basis times: the listed ones, or those carried by the forecast
/// records when no list was supplied.
fn candidate_basis_times(inputs: &HydrographInputs<'_>) -> Vec<DateTime<Utc>> {
    if !inputs.basis_times.is_empty() {
        return inputs.basis_times.to_vec();
    }
    let mut times: Vec<DateTime<Utc>> = inputs.forecast.iter().filter_map(|r| r.basis_time).collect();
    times.sort();
    times.dedup();
    times
}

/// Later posting (then later revision) replaces an earlier duplicate.
fn supersedes(new: &TimeSeriesRecord, old: &TimeSeriesRecord) -> bool {
    (new.posting_time, new.revision) > (old.posting_time, old.revision)
}

/// One record per valid time, resolving duplicates with [`supersedes`] so
/// the result does not depend on row order.
fn latest_postings<'a>(
    records: impl Iterator<Item = &'a TimeSeriesRecord>,
) -> BTreeMap<DateTime<Utc>, &'a TimeSeriesRecord> {
    let mut by_valid: BTreeMap<DateTime<Utc>, &TimeSeriesRecord> = BTreeMap::new();
    for rec in records {
        let replace = by_valid
            .get(&rec.valid_time)
            .is_none_or(|existing| supersedes(rec, existing));
        if replace {
            by_valid.insert(rec.valid_time, rec);
        }
    }
    by_valid
}

pub fn build_hydrograph(inputs: &HydrographInputs<'_>, policy: BasisPolicy) -> Hydrograph {
    let system = inputs.system_time;
    let observed_begin = inputs.window.observed_begin(system);
    let forecast_end = inputs.window.forecast_end(system);
    let basis_begin = inputs.window.basis_begin(system);

    let candidates = candidate_basis_times(inputs);
    let selected = select_basis_time(&candidates, system, basis_begin, policy.use_latest_forecast);

    let mut series: BTreeMap<DateTime<Utc>, TimeSeriesRecord> = BTreeMap::new();

    if let Some(basis) = selected {
        let in_window = |r: &&TimeSeriesRecord| r.valid_time >= system && r.valid_time <= forecast_end;

        let issuance = inputs.forecast.iter().filter(|r| r.basis_time == Some(basis)).filter(in_window);
        for (valid, rec) in latest_postings(issuance) {
            series.insert(valid, rec.clone());
        }

        if policy.merge_issuances {
            let mut older: Vec<DateTime<Utc>> = candidates
                .iter()
                .copied()
                .filter(|b| *b < basis && *b >= basis_begin)
                .collect();
            older.sort_by(|a, b| b.cmp(a));
            for b in older {
                let issuance = inputs.forecast.iter().filter(|r| r.basis_time == Some(b)).filter(in_window);
                for (valid, rec) in latest_postings(issuance) {
                    series.entry(valid).or_insert_with(|| rec.clone());
                }
            }
        }
    }

    // Observed goes in last: it is ground truth wherever it meets the forecast.
    let observed = latest_postings(
        inputs
            .observed
            .iter()
            .filter(|r| r.valid_time >= observed_begin && r.valid_time <= system),
    );
    for (valid, rec) in observed {
        series.insert(valid, rec.clone());
    }

    Hydrograph {
        lid: inputs.lid.to_string(),
        physical_element: inputs.physical_element.to_string(),
        basis_time: selected,
        records: series.into_values().collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
