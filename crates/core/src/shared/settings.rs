use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_CAMERA_STARTUP_TIMEOUT_MS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH,
    DEFAULT_GAZE_THRESHOLD, DEFAULT_MODEL_BASE_URI, DEFAULT_MULTI_FACE_SUSTAIN_MS,
    DEFAULT_TAB_INACTIVE_LIMIT, DEFAULT_TICK_INTERVAL_MS,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("{0}")]
    Invalid(String),
}

/// Persisted monitoring settings. Missing fields fall back to defaults so
/// older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_ms: u64,
    pub multi_face_sustain_ms: u64,
    pub tab_inactive_limit: u32,
    pub gaze_threshold: f64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub camera_startup_timeout_ms: u64,
    /// Face detection confidence in percent (0-100).
    pub confidence: u32,
    pub model_base_uri: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            multi_face_sustain_ms: DEFAULT_MULTI_FACE_SUSTAIN_MS,
            tab_inactive_limit: DEFAULT_TAB_INACTIVE_LIMIT,
            gaze_threshold: DEFAULT_GAZE_THRESHOLD,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            camera_startup_timeout_ms: DEFAULT_CAMERA_STARTUP_TIMEOUT_MS,
            confidence: 50,
            model_base_uri: DEFAULT_MODEL_BASE_URI.to_string(),
        }
    }
}

impl MonitorSettings {
    /// `<config_dir>/Facewatch/settings.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Facewatch").join("settings.json"))
    }

    /// Loads from the platform config path, falling back to defaults when
    /// the file is absent or unreadable.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    /// Loads from an explicit path. Unlike [`MonitorSettings::load`], a
    /// missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |e| SettingsError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tick_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "Tick interval must be at least 1 ms".into(),
            ));
        }
        if self.multi_face_sustain_ms == 0 {
            return Err(SettingsError::Invalid(
                "Multi-face sustain must be at least 1 ms".into(),
            ));
        }
        if self.tab_inactive_limit == 0 {
            return Err(SettingsError::Invalid(
                "Tab inactive limit must be at least 1".into(),
            ));
        }
        if !self.gaze_threshold.is_finite() || self.gaze_threshold <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "Gaze threshold must be a positive number, got {}",
                self.gaze_threshold
            )));
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(SettingsError::Invalid(format!(
                "Capture size must be non-zero, got {}x{}",
                self.capture_width, self.capture_height
            )));
        }
        if self.confidence > 100 {
            return Err(SettingsError::Invalid(format!(
                "Confidence must be between 0 and 100, got {}",
                self.confidence
            )));
        }
        if self.model_base_uri.trim().is_empty() {
            return Err(SettingsError::Invalid("Model base URI is empty".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn multi_face_sustain(&self) -> Duration {
        Duration::from_millis(self.multi_face_sustain_ms)
    }

    pub fn camera_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.camera_startup_timeout_ms)
    }

    pub fn confidence_fraction(&self) -> f64 {
        self.confidence.min(100) as f64 / 100.0
    }
}
