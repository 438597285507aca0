/// flood_recommender command line.
///
/// Usage: flood_recommender [CONFIG.toml]
///
/// Connects to the database named by DATABASE_URL (read from .env when
/// present), runs one recommendation and prints it as JSON on stdout. An
/// unreadable config file is reported and the defaults are used.
///
/// REPLAY_DAYS_OFFSET=N runs against the database as it stood N days ago.

use std::env;
use std::process;

use flood_recommender::config::EngineConfig;
use chrono::Utc;

use flood_recommender::dao::pg::{PgRiverDao, replay_time};
use flood_recommender::engine::get_recommendation;
use flood_recommender::logging::{self, Component, init_logger};

fn main() {
    dotenv::dotenv().ok();

    let mut config_problem = None;
    let config = match env::args().nth(1) {
        Some(path) => EngineConfig::load(&path).unwrap_or_else(|e| {
            config_problem = Some(e);
            EngineConfig::default()
        }),
        None => EngineConfig::default(),
    };

    init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    if let Some(e) = config_problem {
        logging::warn(Component::System, None, &format!("{}; continuing with defaults", e));
    }

    let mut dao = match PgRiverDao::from_env() {
        Ok(dao) => dao,
        Err(e) => {
            logging::error(Component::Dao, None, &format!("Database connection failed: {}", e));
            process::exit(1);
        }
    };

    if let Ok(raw) = env::var("REPLAY_DAYS_OFFSET") {
        match raw.trim().parse::<i64>() {
            Ok(days) if replay_time(Utc::now(), days).is_ok() => {
                logging::info(Component::System, None, &format!("Replaying {} days back", days));
                dao = dao.with_days_offset(days);
            }
            _ => logging::warn(
                Component::System,
                None,
                &format!("Ignoring REPLAY_DAYS_OFFSET={:?}: not a usable day count", raw),
            ),
        }
    }

    let recommendation = match get_recommendation(&mut dao, config) {
        Ok(rec) => rec,
        Err(e) => {
            logging::error(Component::System, None, &format!("Session load failed: {}", e));
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&recommendation) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            logging::error(Component::System, None, &format!("Serialization failed: {}", e));
            process::exit(1);
        }
    }
}
