/// Structured logging for the recommendation engine
///
/// Provides context-rich logging tagged with the engine component and the
/// forecast point being processed. Supports console output and
/// file-based logging for scheduled runs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::DaoError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Dao,
    Ranker,
    Hydrograph,
    Crossing,
    Classifier,
    Record,
    Assembler,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Dao => write!(f, "DAO"),
            Component::Ranker => write!(f, "RANK"),
            Component::Hydrograph => write!(f, "HYDRO"),
            Component::Crossing => write!(f, "CROSS"),
            Component::Classifier => write!(f, "CLASS"),
            Component::Record => write!(f, "RECORD"),
            Component::Assembler => write!(f, "ASSEMBLE"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected - the point simply has no data to work with
    Expected,
    /// Unexpected - query failure or malformed data from the database
    Unexpected,
    /// Unknown - cannot tell which
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

/// Formats one log line as written to the log file.
pub fn format_entry(level: LogLevel, component: Component, lid: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let lid_part = lid.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, component, lid_part, message)
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, component: Component, lid: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = format_entry(level, component, lid, message);
        let lid_part = lid.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output goes to stderr; stdout carries the recommendation
        if self.console_timestamps {
            eprintln!("{}", log_entry);
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, lid_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, lid_part, message),
                LogLevel::Info => eprintln!("   {}{}: {}", component, lid_part, message),
                LogLevel::Debug => {}  // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, component: Component, lid: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, lid, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, lid: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, lid, message);
}

/// Log a warning message
pub fn warn(component: Component, lid: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, lid, message);
}

/// Log an error message
pub fn error(component: Component, lid: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, lid, message);
}

/// Log a debug message
pub fn debug(component: Component, lid: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, lid, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-point DAO failure
pub fn classify_point_failure(err: &DaoError) -> FailureType {
    match err {
        DaoError::NotFound(_) => FailureType::Expected,
        DaoError::Row(_) => FailureType::Unexpected,
        DaoError::Query(msg) if msg.contains("timeout") || msg.contains("connection") => {
            FailureType::Unexpected
        }
        DaoError::Query(_) => FailureType::Unknown,
    }
}

/// Log a point failure with automatic classification
pub fn log_point_failure(lid: &str, operation: &str, err: &DaoError) {
    let failure_type = classify_point_failure(err);

    let message = format!(
        "{} failed [{}]: {}",
        operation,
        failure_type,
        err
    );

    match failure_type {
        FailureType::Expected => debug(Component::Dao, Some(lid), &message),
        FailureType::Unexpected => error(Component::Dao, Some(lid), &message),
        FailureType::Unknown => warn(Component::Dao, Some(lid), &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a recommendation run
pub fn log_run_summary(total: usize, recommended: usize, failed: usize) {
    let message = format!(
        "Recommendation run complete: {}/{} points recommended, {} failed",
        recommended,
        total,
        failed
    );

    if failed == 0 {
        info(Component::Assembler, None, &message);
    } else if failed == total {
        error(Component::Assembler, None, &message);
    } else {
        warn(Component::Assembler, None, &message);
    }
}
