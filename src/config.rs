// src/config.rs

use crate::detection::DetectionConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub replay: ReplayConfig,
    pub classifier: ClassifierConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory searched recursively for `*.jsonl` pose logs.
    pub input_dir: String,
    pub output_dir: String,
    pub camera_id: String,
    pub max_timeline_events: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "recordings".to_string(),
            output_dir: "output".to_string(),
            camera_id: "Webcam".to_string(),
            max_timeline_events: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub server_url: String,
    /// Minimum spacing between classifier calls, in session seconds.
    pub interval_sec: f64,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:3001".to_string(),
            interval_sec: 1.5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub server_url: String,
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:3001".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection
            .validate()
            .context("Invalid detection section")?;

        if self.classifier.enabled
            && !(self.classifier.interval_sec.is_finite() && self.classifier.interval_sec > 0.0)
        {
            bail!(
                "classifier.interval_sec must be positive, got {}",
                self.classifier.interval_sec
            );
        }
        if self.replay.max_timeline_events == 0 {
            bail!("replay.max_timeline_events must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file = write_config("logging:\n  level: debug\n");
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.replay.camera_id, "Webcam");
        assert_eq!(config.classifier.interval_sec, 1.5);
        assert!(!config.alert.enabled);
        assert_eq!(config.detection.cooldown_sec, 5.0);
    }

    #[test]
    fn test_detection_overrides_accept_camel_case() {
        let file = write_config(
            "detection:\n  cooldownSec: 2.0\n  ground_duration_sec: 3.0\nalert:\n  enabled: true\n  server_url: http://alerts:8080\n",
        );
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.detection.cooldown_sec, 2.0);
        assert_eq!(config.detection.ground_duration_sec, 3.0);
        assert!(config.alert.enabled);
        assert_eq!(config.alert.server_url, "http://alerts:8080");
    }

    #[test]
    fn test_invalid_detection_values_are_rejected() {
        let file = write_config("detection:\n  confidence_threshold: 1.5\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("confidence_threshold"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }
}
