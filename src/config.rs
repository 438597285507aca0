/// Engine configuration.
///
/// Read once from a TOML file at session start and passed by reference to
/// every component; nothing here is mutated during a run.
///
/// ```toml
/// basis_hours = 72
/// use_latest_forecast = false
/// crossing_time_mode = "exact"
/// significance = "W"
/// near_record_offset = 2.0
///
/// [logging]
/// level = "info"
/// file = "/var/log/flood_recommender.log"
/// ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::crossing::CrossingTimeMode;
use crate::logging::{self, Component, LogLevel};
use crate::model::{ForecastPoint, HazardSettings, MAX_WINDOW_HOURS, PointWindow, hours_in_range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, file: None, timestamps: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the database setting when present.
    pub look_back_hours: Option<i64>,
    /// Overrides the database setting when present.
    pub look_forward_hours: Option<i64>,
    /// How far before system time a forecast issuance may be.
    pub basis_hours: i64,
    /// Hours added to a known fall-below time to get the hazard end.
    pub shift_hours: i64,
    pub use_latest_forecast: bool,
    pub merge_forecast_issuances: bool,
    pub crossing_time_mode: CrossingTimeMode,
    /// Significance of recommended hazards ("W" warning).
    pub significance: String,
    /// Within this much of the record crest counts as near record.
    pub near_record_offset: f64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            look_back_hours: None,
            look_forward_hours: None,
            basis_hours: 72,
            shift_hours: 0,
            use_latest_forecast: false,
            merge_forecast_issuances: false,
            crossing_time_mode: CrossingTimeMode::Exact,
            significance: "W".to_string(),
            near_record_offset: 2.0,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(String),
    /// The file is not valid TOML for this structure.
    Parse(String),
    /// A value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hours = [
            ("look_back_hours", self.look_back_hours.unwrap_or(0)),
            ("look_forward_hours", self.look_forward_hours.unwrap_or(0)),
            ("basis_hours", self.basis_hours),
            ("shift_hours", self.shift_hours),
        ];
        if let Some((name, value)) = hours.iter().find(|(_, v)| !hours_in_range(*v)) {
            return Err(ConfigError::Invalid(format!(
                "{} must be between 0 and {}, got {}",
                name, MAX_WINDOW_HOURS, value
            )));
        }
        if self.near_record_offset < 0.0 || self.near_record_offset.is_nan() {
            return Err(ConfigError::Invalid(format!(
                "near_record_offset must not be negative, got {}",
                self.near_record_offset
            )));
        }
        if self.significance.trim().is_empty() {
            return Err(ConfigError::Invalid("significance must not be empty".to_string()));
        }
        Ok(())
    }

    /// Session-wide hour windows: configured values, else the database
    /// settings.
    pub fn default_window(&self, settings: &HazardSettings) -> PointWindow {
        PointWindow {
            look_back_hours: self.look_back_hours.unwrap_or(settings.look_back_hours),
            look_forward_hours: self.look_forward_hours.unwrap_or(settings.look_forward_hours),
            basis_hours: self.basis_hours,
            shift_hours: self.shift_hours,
        }
    }
}

/// Replaces out-of-range database settings with the built-in defaults.
pub fn checked_settings(settings: HazardSettings) -> HazardSettings {
    let fallback = HazardSettings::default();
    let pick = |name: &str, value: i64, default: i64| {
        if hours_in_range(value) {
            value
        } else {
            logging::warn(
                Component::System,
                None,
                &format!("setting {} = {} out of range, using {}", name, value, default),
            );
            default
        }
    };
    HazardSettings {
        expiration_hours: pick("expiration_hours", settings.expiration_hours, fallback.expiration_hours),
        look_back_hours: pick("look_back_hours", settings.look_back_hours, fallback.look_back_hours),
        look_forward_hours: pick("look_forward_hours", settings.look_forward_hours, fallback.look_forward_hours),
        home_office: settings.home_office,
    }
}

/// Applies a point's overrides on top of the session defaults. An override
/// outside `0..=MAX_WINDOW_HOURS` is ignored with a warning.
pub fn resolve_window(defaults: PointWindow, point: &ForecastPoint) -> PointWindow {
    let o = &point.overrides;
    let pick = |name: &str, value: Option<i64>, default: i64| match value {
        Some(hours) if hours_in_range(hours) => hours,
        Some(hours) => {
            logging::warn(
                Component::System,
                Some(&point.lid),
                &format!("{} override {} out of range, using {}", name, hours, default),
            );
            default
        }
        None => default,
    };
    PointWindow {
        look_back_hours: pick("look_back_hours", o.look_back_hours, defaults.look_back_hours),
        look_forward_hours: pick("look_forward_hours", o.look_forward_hours, defaults.look_forward_hours),
        basis_hours: pick("basis_hours", o.basis_hours, defaults.basis_hours),
        shift_hours: pick("shift_hours", o.shift_hours, defaults.shift_hours),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FloodThresholds, WindowOverrides};

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.significance, "W");
        assert_eq!(config.crossing_time_mode, CrossingTimeMode::Exact);
    }

    #[test]
    fn test_full_file_parses() {
        let text = r#"
            look_back_hours = 48
            basis_hours = 24
            use_latest_forecast = true
            crossing_time_mode = "interpolated"
            near_record_offset = 1.5

            [logging]
            level = "debug"
            file = "recommender.log"
        "#;
        let config = EngineConfig::from_toml_str(text).expect("valid config");
        assert_eq!(config.look_back_hours, Some(48));
        assert_eq!(config.look_forward_hours, None);
        assert!(config.use_latest_forecast);
        assert_eq!(config.crossing_time_mode, CrossingTimeMode::Interpolated);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.file.as_deref(), Some("recommender.log"));
        assert!(config.logging.timestamps, "unset logging fields keep defaults");
    }

    #[test]
    fn test_negative_hours_rejected() {
        let err = EngineConfig::from_toml_str("basis_hours = -1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_oversized_hours_rejected() {
        let err = EngineConfig::from_toml_str("look_forward_hours = 1000000000000").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);

        let ok = EngineConfig::from_toml_str(&format!("shift_hours = {}", MAX_WINDOW_HOURS));
        assert!(ok.is_ok(), "the bound itself is accepted");
    }

    #[test]
    fn test_out_of_range_settings_fall_back_to_defaults() {
        let settings = HazardSettings {
            expiration_hours: i64::MAX,
            look_back_hours: -5,
            look_forward_hours: 240,
            home_office: "OAX".to_string(),
        };
        let checked = checked_settings(settings);
        assert_eq!(checked.expiration_hours, 24);
        assert_eq!(checked.look_back_hours, 72);
        assert_eq!(checked.look_forward_hours, 240);
        assert_eq!(checked.home_office, "OAX");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("basis_hours = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load("/nonexistent/flood_recommender.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_window_prefers_config_then_settings_then_point() {
        let settings = HazardSettings { look_back_hours: 72, look_forward_hours: 360, ..HazardSettings::default() };
        let config = EngineConfig { look_forward_hours: Some(120), ..EngineConfig::default() };
        let defaults = config.default_window(&settings);
        assert_eq!(defaults.look_back_hours, 72);
        assert_eq!(defaults.look_forward_hours, 120);

        let point = ForecastPoint {
            lid: "DCTN1".into(),
            name: "Decatur".into(),
            county: "Burt".into(),
            state: "NE".into(),
            office: "OAX".into(),
            group_id: "MISSOURI".into(),
            physical_element: "HG".into(),
            stage: FloodThresholds::default(),
            flow: FloodThresholds::default(),
            overrides: WindowOverrides { look_back_hours: Some(24), shift_hours: Some(6), ..WindowOverrides::default() },
        };
        let window = resolve_window(defaults, &point);
        assert_eq!(window.look_back_hours, 24);
        assert_eq!(window.look_forward_hours, 120);
        assert_eq!(window.basis_hours, 72);
        assert_eq!(window.shift_hours, 6);

        let wild = ForecastPoint {
            overrides: WindowOverrides {
                look_forward_hours: Some(1_000_000_000_000),
                shift_hours: Some(-3),
                ..WindowOverrides::default()
            },
            ..point
        };
        let window = resolve_window(defaults, &wild);
        assert_eq!(window.look_forward_hours, 120, "out-of-range override ignored");
        assert_eq!(window.shift_hours, 0);
        assert_eq!(window.look_back_hours, 72);
    }
}
