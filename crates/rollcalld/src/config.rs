use rollcall_core::matcher::{DistanceMetric, DEFAULT_THRESHOLD};
use rollcall_core::recorder::DEFAULT_STATUS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Daemon configuration.
///
/// Resolution order: built-in defaults, then the optional TOML file named
/// by `ROLLCALL_CONFIG`, then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root of the enrollment image tree (`<images_dir>/<employee_id>/`).
    pub images_dir: PathBuf,
    /// Match decision threshold. Metric-dependent; 0.6 is the Euclidean
    /// reference value.
    pub threshold: f32,
    /// Distance metric used across the whole gallery.
    pub metric: DistanceMetric,
    /// Status stamped on recorded events.
    pub default_status: String,
    /// Suppress repeat events for one identity inside this many seconds.
    /// 0 disables suppression and records every resolved match.
    pub dedup_window_secs: u64,
    /// Upper bound on one attendance write before it fails as a timeout.
    pub record_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            db_path: data_dir.join("rollcall.db"),
            images_dir: data_dir.join("images"),
            threshold: DEFAULT_THRESHOLD,
            metric: DistanceMetric::Euclidean,
            default_status: DEFAULT_STATUS.to_string(),
            dedup_window_secs: 0,
            record_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration: defaults ← optional TOML file ← environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_IMAGES_DIR") {
            self.images_dir = PathBuf::from(v);
        }
        self.threshold = env_f32("ROLLCALL_THRESHOLD", self.threshold);
        if let Ok(v) = std::env::var("ROLLCALL_METRIC") {
            match v.to_lowercase().as_str() {
                "euclidean" => self.metric = DistanceMetric::Euclidean,
                "cosine" => self.metric = DistanceMetric::Cosine,
                other => {
                    tracing::warn!(metric = other, "unknown ROLLCALL_METRIC; keeping current")
                }
            }
        }
        if let Ok(v) = std::env::var("ROLLCALL_STATUS") {
            self.default_status = v;
        }
        self.dedup_window_secs = env_u64("ROLLCALL_DEDUP_WINDOW_SECS", self.dedup_window_secs);
        self.record_timeout_secs = env_u64("ROLLCALL_RECORD_TIMEOUT_SECS", self.record_timeout_secs);
    }

    pub fn dedup_window(&self) -> Option<Duration> {
        (self.dedup_window_secs > 0).then(|| Duration::from_secs(self.dedup_window_secs))
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.metric, DistanceMetric::Euclidean);
        assert_eq!(config.default_status, "check-in");
        assert!(config.dedup_window().is_none());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let text = r#"
            threshold = 0.45
            metric = "cosine"
            dedup_window_secs = 90
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.threshold, 0.45);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.dedup_window(), Some(Duration::from_secs(90)));
        // Untouched fields keep their defaults.
        assert_eq!(config.default_status, "check-in");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<Config, _> = toml::from_str("treshold = 0.5");
        assert!(result.is_err());
    }
}
