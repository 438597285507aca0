/// Type-source ranking.
///
/// A forecast point may receive the same physical element from several
/// sources (a gauge, a DCP, a couple of forecast models). The ingest filter
/// assigns each (location, PE, type-source) a rank, 1 being the most
/// trusted. Ranks are integers: rank 3 outranks rank 12 even though "12"
/// sorts before "3" as text.

use std::collections::BTreeSet;

use crate::model::{FORECAST_TS_PREFIX, OBSERVED_TS_PREFIX};

/// One ingest-filter rank for a location and physical element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankEntry {
    pub rank: i64,
    pub type_source: String,
}

/// One row of the ingest table for a physical element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEntry {
    pub rank: i64,
    pub physical_element: String,
    pub type_source: String,
}

/// Outcome of ranking the available type-sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSourceChoice {
    /// A configured rank matched an available code.
    Ranked { type_source: String, rank: i64 },
    /// No rank matched; the best-available rule picked a code.
    Fallback { type_source: String },
    /// Nothing usable. The point has no primary source.
    NoRankedSource,
}

impl TypeSourceChoice {
    pub fn type_source(&self) -> Option<&str> {
        match self {
            TypeSourceChoice::Ranked { type_source, .. } | TypeSourceChoice::Fallback { type_source } => {
                Some(type_source)
            }
            TypeSourceChoice::NoRankedSource => None,
        }
    }
}

/// Picks the lowest-numbered rank among the codes actually present.
///
/// Equal ranks are broken alphabetically so the choice is stable.
pub fn select_type_source(entries: &[RankEntry], available: &[String]) -> TypeSourceChoice {
    let present: BTreeSet<&str> = available.iter().map(String::as_str).collect();

    let ranked = entries
        .iter()
        .filter(|e| present.contains(e.type_source.as_str()))
        .min_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.type_source.cmp(&b.type_source)));

    if let Some(entry) = ranked {
        return TypeSourceChoice::Ranked {
            type_source: entry.type_source.clone(),
            rank: entry.rank,
        };
    }

    match best_available(&present) {
        Some(ts) => TypeSourceChoice::Fallback { type_source: ts.to_string() },
        None => TypeSourceChoice::NoRankedSource,
    }
}

/// Observed codes beat forecast codes; anything else does not qualify.
fn best_available<'a>(present: &BTreeSet<&'a str>) -> Option<&'a str> {
    let with_prefix = |prefix: &str| present.iter().find(|ts| ts.starts_with(prefix)).copied();
    with_prefix(OBSERVED_TS_PREFIX).or_else(|| with_prefix(FORECAST_TS_PREFIX))
}

/// Returns the `ordinal`-th best (1-based) distinct type-source starting
/// with `prefix`.
pub fn best_ts(entries: &[RankEntry], prefix: &str, ordinal: usize) -> Option<String> {
    if ordinal == 0 {
        return None;
    }
    let mut matching: Vec<&RankEntry> = entries
        .iter()
        .filter(|e| e.type_source.starts_with(prefix))
        .collect();
    matching.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.type_source.cmp(&b.type_source)));
    let mut seen = BTreeSet::new();
    matching
        .into_iter()
        .filter(|e| seen.insert(e.type_source.as_str()))
        .nth(ordinal - 1)
        .map(|e| e.type_source.clone())
}

/// Rank entries from the ingest table that apply to one physical element.
pub fn rank_entries_for(ingest: &[IngestEntry], physical_element: &str) -> Vec<RankEntry> {
    ingest
        .iter()
        .filter(|e| e.physical_element == physical_element)
        .map(|e| RankEntry { rank: e.rank, type_source: e.type_source.clone() })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rank: i64, ts: &str) -> RankEntry {
        RankEntry { rank, type_source: ts.to_string() }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rank_three_beats_rank_twelve() {
        // "12" < "3" as strings; ranks must compare as integers.
        let entries = vec![entry(12, "FF"), entry(3, "RG")];
        let choice = select_type_source(&entries, &codes(&["FF", "RG"]));
        assert_eq!(choice, TypeSourceChoice::Ranked { type_source: "RG".to_string(), rank: 3 });
    }

    #[test]
    fn test_only_present_codes_are_considered() {
        let entries = vec![entry(1, "RX"), entry(2, "RG")];
        let choice = select_type_source(&entries, &codes(&["RG"]));
        assert_eq!(choice.type_source(), Some("RG"), "RX is ranked higher but has no data");
    }

    #[test]
    fn test_equal_ranks_break_alphabetically() {
        let entries = vec![entry(1, "RZ"), entry(1, "RG")];
        let choice = select_type_source(&entries, &codes(&["RZ", "RG"]));
        assert_eq!(choice.type_source(), Some("RG"));
    }

    #[test]
    fn test_fallback_prefers_observed_prefix() {
        let choice = select_type_source(&[], &codes(&["FF", "RZ"]));
        assert_eq!(choice, TypeSourceChoice::Fallback { type_source: "RZ".to_string() });

        let choice = select_type_source(&[entry(1, "RG")], &codes(&["FZ"]));
        assert_eq!(choice, TypeSourceChoice::Fallback { type_source: "FZ".to_string() });
    }

    #[test]
    fn test_no_overlap_and_no_fallback_is_explicit() {
        let choice = select_type_source(&[entry(1, "RG")], &codes(&["PZ"]));
        assert_eq!(choice, TypeSourceChoice::NoRankedSource);
        assert_eq!(choice.type_source(), None);

        assert_eq!(select_type_source(&[], &[]), TypeSourceChoice::NoRankedSource);
    }

    #[test]
    fn test_best_ts_by_prefix_and_ordinal() {
        let entries = vec![entry(12, "FF"), entry(3, "FZ"), entry(1, "RG"), entry(2, "RX")];
        assert_eq!(best_ts(&entries, "F", 1), Some("FZ".to_string()));
        assert_eq!(best_ts(&entries, "F", 2), Some("FF".to_string()));
        assert_eq!(best_ts(&entries, "F", 3), None);
        assert_eq!(best_ts(&entries, "R", 1), Some("RG".to_string()));
        assert_eq!(best_ts(&entries, "R", 0), None);
    }

    #[test]
    fn test_rank_entries_filtered_by_pe() {
        let ingest = vec![
            IngestEntry { rank: 1, physical_element: "HG".into(), type_source: "RG".into() },
            IngestEntry { rank: 1, physical_element: "QR".into(), type_source: "RG".into() },
            IngestEntry { rank: 4, physical_element: "HG".into(), type_source: "FF".into() },
        ];
        let entries = rank_entries_for(&ingest, "HG");
        assert_eq!(entries, vec![entry(1, "RG"), entry(4, "FF")]);
    }
}
