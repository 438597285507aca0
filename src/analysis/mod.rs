/// Hydrologic analysis for the recommendation engine.
///
/// Submodules:
/// - `ranker`    : picks the type-source to trust for each point.
/// - `hydrograph`: splices observed history onto one forecast issuance.
/// - `crossing`  : finds when the series rises above, crests, and falls
///   below flood stage.

pub mod crossing;
pub mod hydrograph;
pub mod ranker;
