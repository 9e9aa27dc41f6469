use std::{net::SocketAddr, path::{Path, PathBuf}, str::FromStr, time::Duration};

use justrun_data_management::DATA_DIR;
use justrun_lib::{
    sample_filter::{FilterConfig, MAX_ACCURACY_M, MAX_SEGMENT_KM, MIN_SEGMENT_KM, SEGMENT_TOLERANCE_KM},
    tracking_session::STEPS_PER_KM,
};
use thiserror::Error;

use crate::{controller::ControllerSettings, platform::WatchOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("line {line}: expected `key = value`")]
    Syntax { line: usize },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub user_id: String,

    pub max_accuracy_m: f64,
    pub min_segment_km: f64,
    pub max_segment_km: f64,
    pub segment_tolerance_km: f64,
    pub steps_per_km: f64,

    pub tick_interval_ms: u64,
    pub high_accuracy: bool,
    pub watch_timeout_ms: u64,
    pub watch_max_age_ms: u64,

    /// Keys that were present but not understood.
    pub unknown_keys: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let watch = WatchOptions::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: PathBuf::from(DATA_DIR),
            user_id: "local".to_string(),
            max_accuracy_m: MAX_ACCURACY_M,
            min_segment_km: MIN_SEGMENT_KM,
            max_segment_km: MAX_SEGMENT_KM,
            segment_tolerance_km: SEGMENT_TOLERANCE_KM,
            steps_per_km: STEPS_PER_KM,
            tick_interval_ms: 1000,
            high_accuracy: watch.high_accuracy,
            watch_timeout_ms: watch.timeout_ms,
            watch_max_age_ms: watch.max_sample_age_ms,
            unknown_keys: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax { line: index + 1 });
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "listen_addr" => config.listen_addr = parse_value(key, value)?,
                "data_dir" => config.data_dir = PathBuf::from(value),
                "user_id" => config.user_id = value.to_string(),
                "max_accuracy_m" => config.max_accuracy_m = parse_positive(key, value)?,
                "min_segment_km" => config.min_segment_km = parse_positive(key, value)?,
                "max_segment_km" => config.max_segment_km = parse_positive(key, value)?,
                "segment_tolerance_km" => config.segment_tolerance_km = parse_positive(key, value)?,
                "steps_per_km" => config.steps_per_km = parse_positive(key, value)?,
                "tick_interval_ms" => config.tick_interval_ms = parse_value(key, value)?,
                "high_accuracy" => config.high_accuracy = parse_value(key, value)?,
                "watch_timeout_ms" => config.watch_timeout_ms = parse_value(key, value)?,
                "watch_max_age_ms" => config.watch_max_age_ms = parse_value(key, value)?,
                _ => config.unknown_keys.push(key.to_string()),
            }
        }

        if config.min_segment_km > config.max_segment_km {
            return Err(ConfigError::InvalidValue {
                key: "min_segment_km".to_string(),
                value: config.min_segment_km.to_string(),
            });
        }
        if config.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue { key: "tick_interval_ms".to_string(), value: "0".to_string() });
        }

        Ok(config)
    }

    /// `data_dir`, anchored at the project root when relative.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if self.data_dir.is_absolute() {
            return self.data_dir.clone();
        }

        match project_root::get_project_root() {
            Ok(root) => root.join(&self.data_dir),
            Err(_) => self.data_dir.clone(),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            filter: FilterConfig {
                max_accuracy_m: self.max_accuracy_m,
                min_segment_km: self.min_segment_km,
                max_segment_km: self.max_segment_km,
                segment_tolerance_km: self.segment_tolerance_km,
            },
            watch: WatchOptions {
                high_accuracy: self.high_accuracy,
                timeout_ms: self.watch_timeout_ms,
                max_sample_age_ms: self.watch_max_age_ms,
            },
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            steps_per_km: self.steps_per_km,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    T::from_str(value).map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() })
}

fn parse_positive(key: &str, value: &str) -> Result<f64, ConfigError> {
    let number: f64 = parse_value(key, value)?;
    if number.is_finite() && number >= 0.0 {
        Ok(number)
    } else {
        Err(ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tracking_constants() {
        let settings = TrackerConfig::parse("").unwrap().controller_settings();
        assert_eq!(settings, ControllerSettings::default());
    }

    #[test]
    fn parses_overrides_and_collects_unknown_keys() {
        let config = TrackerConfig::parse(
            "
            # Tracker settings
            listen_addr = 127.0.0.1:8080
            user_id = anna
            max_accuracy_m = 30
            max_segment_km=0.2
            high_accuracy = false
            colour = blue
            ",
        )
        .unwrap();

        assert_eq!(config.listen_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.user_id, "anna");
        assert_eq!(config.max_accuracy_m, 30.0);
        assert_eq!(config.max_segment_km, 0.2);
        assert!(!config.high_accuracy);
        assert_eq!(config.unknown_keys, vec!["colour".to_string()]);
        assert_eq!(config.min_segment_km, MIN_SEGMENT_KM);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(TrackerConfig::parse("max_accuracy_m = loud"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(TrackerConfig::parse("steps_per_km = -4"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(TrackerConfig::parse("tick_interval_ms = 0"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(TrackerConfig::parse("min_segment_km = 1.0"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(TrackerConfig::parse("just some words"), Err(ConfigError::Syntax { line: 1 })));
    }

    #[test]
    fn load_without_path_uses_defaults() {
        assert_eq!(TrackerConfig::load(None).unwrap(), TrackerConfig::default());

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "user_id = bob\n").unwrap();
        assert_eq!(TrackerConfig::load(Some(file.path())).unwrap().user_id, "bob");
    }
}
