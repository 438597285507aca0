/// flood_recommender: river flood hazard recommendation engine.
///
/// Reads observed and forecast river data for every forecast point of an
/// office, decides which points are expected to exceed flood stage, and
/// produces a flood hazard candidate for each of them.
///
/// # Module structure
///
/// ```text
/// flood_recommender
/// ├── model      : shared data types (ForecastPoint, Hydrograph, DaoError, …)
/// ├── config     : TOML engine configuration and hour windows
/// ├── logging    : component-tagged console/file logging
/// ├── dao
/// │   ├── row    : positional rows and per-table column schemas
/// │   ├── fixture: in-memory DAO over record fixtures
/// │   └── pg     : PostgreSQL DAO against the hydrologic database
/// ├── analysis
/// │   ├── ranker    : type-source ranking
/// │   ├── hydrograph: observed + forecast splicing
/// │   └── crossing  : rise-above / crest / fall-below detection
/// ├── alert
/// │   ├── thresholds: flood category and severity
/// │   └── record    : record crest comparison
/// ├── recommend  : flood candidates and their groupings
/// └── engine     : session loading and the per-point pipeline
/// ```

pub mod alert;
pub mod analysis;
pub mod config;
pub mod dao;
pub mod engine;
pub mod logging;
pub mod model;
pub mod recommend;
