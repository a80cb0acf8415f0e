//! Runner configuration: JSON file defaults overridden by CLI flags.

use rgbd_capture::SessionConfig;
use rgbd_capture::sim::RigDescription;
use rgbd_data::VideoMode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the runner can be told, with the defaults of [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub queue_capacity: usize,
    pub idle_backoff_ms: u64,
    /// Rig description for the simulated driver; the built-in demo rig when unset.
    pub rig: Option<PathBuf>,
    /// Stop after this many seconds; run until Ctrl+C when unset.
    pub duration_secs: Option<f64>,
    pub report_interval_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            width: session.target.width,
            height: session.target.height,
            fps: session.target.fps,
            queue_capacity: session.queue_capacity,
            idle_backoff_ms: session.idle_backoff.as_millis() as u64,
            rig: None,
            duration_secs: None,
            report_interval_secs: DEFAULT_REPORT_INTERVAL.as_secs_f64(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(ConfigError::Invalid(format!(
                "target mode {}x{}@{} must be non-zero",
                self.width, self.height, self.fps
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".to_string()));
        }
        if let Some(secs) = self.duration_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "duration {} is not a valid time",
                    secs
                )));
            }
        }
        match Duration::try_from_secs_f64(self.report_interval_secs) {
            Ok(interval) if !interval.is_zero() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "report_interval_secs {} must be a positive time",
                    self.report_interval_secs
                )));
            }
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            target: VideoMode::new(self.width, self.height, self.fps),
            queue_capacity: self.queue_capacity,
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
        }
    }

    /// Run time limit; `None` when unset or not representable.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Falls back to the default interval when not representable.
    pub fn report_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.report_interval_secs)
            .unwrap_or(DEFAULT_REPORT_INTERVAL)
    }

    /// Rig to simulate, with frame generation switched on.
    pub fn load_rig(&self) -> Result<RigDescription, ConfigError> {
        let rig = match &self.rig {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            None => RigDescription::demo(),
        };
        Ok(rig.with_generation(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_session_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.session_config(), SessionConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "fps": 15, "duration_secs": 3 }"#).unwrap();
        assert_eq!(config.fps, 15);
        assert_eq!(config.width, 640);
        assert_eq!(config.duration(), Some(Duration::from_secs(3)));
        assert_eq!(config.session_config().target, VideoMode::new(640, 480, 15));
    }

    #[test]
    fn test_zero_fps_rejected() {
        let config = AppConfig {
            fps: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let config = AppConfig {
            duration_secs: Some(-1.0),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_duration_rejected() {
        let config = AppConfig {
            duration_secs: Some(1e30),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.duration(), None);

        let config = AppConfig {
            duration_secs: Some(f64::NAN),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_report_interval_rejected() {
        let config = AppConfig {
            report_interval_secs: 1e30,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.report_interval(), Duration::from_secs(2));

        let config = AppConfig {
            report_interval_secs: 0.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_demo_rig_generates() {
        let rig = AppConfig::default().load_rig().unwrap();
        assert!(rig.generate);
        assert_eq!(rig.devices.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/rgbd.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
