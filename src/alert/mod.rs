/// Flood severity and record evaluation.
///
/// Submodules:
/// - `thresholds`: flood category ladder and VTEC severity codes.
/// - `record`: comparison against the period-of-record crest.

pub mod record;
pub mod thresholds;
