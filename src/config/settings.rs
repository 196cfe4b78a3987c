//! Application settings: where layouts live and how they are flushed

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::constants::config::{
    APP_DIR, ENV_DATA_DIR, ENV_FLUSH_MS, ENV_SNAPSHOT_DIR, FILENAME, LAYOUTS_DIR, SNAPSHOT_DIR,
};
use crate::constants::persistence::{DEFAULT_FLUSH_QUIET_MS, MAX_FLUSH_QUIET_MS, MIN_FLUSH_QUIET_MS};
use crate::constants::snapshot::{DEFAULT_QUOTA_BYTES, MAX_QUOTA_BYTES, MIN_QUOTA_BYTES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Local fallback snapshot directory
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_flush_quiet_ms")]
    pub flush_quiet_ms: u64,
    #[serde(default = "default_snapshot_quota_bytes")]
    pub snapshot_quota_bytes: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path.push(LAYOUTS_DIR);
    path
}

fn default_snapshot_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path.push(SNAPSHOT_DIR);
    path
}

fn default_flush_quiet_ms() -> u64 {
    DEFAULT_FLUSH_QUIET_MS
}

fn default_snapshot_quota_bytes() -> u64 {
    DEFAULT_QUOTA_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            snapshot_dir: default_snapshot_dir(),
            flush_quiet_ms: default_flush_quiet_ms(),
            snapshot_quota_bytes: default_snapshot_quota_bytes(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(FILENAME);
        path
    }

    /// Load from the default location, writing defaults on first run
    pub fn load() -> Self {
        let path = Self::config_path();
        let exists = path.exists();
        let mut settings = Self::load_from(&path);
        if !exists {
            info!(path = %path.display(), "no settings file found, writing defaults");
            if let Err(e) = settings.save_to(&path) {
                warn!(path = %path.display(), error = %e, "failed to write default settings");
            }
        }
        settings.apply_env_overrides();
        settings.validate_and_clamp();
        settings
    }

    /// Parse `path`; a missing or broken file yields defaults and is left untouched
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => {
                info!(path = %path.display(), "loaded settings");
                settings
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to parse settings file, using defaults");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize settings to JSON")?;
        fs::write(path, contents).context(format!("Failed to write settings file to {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_path(ENV_DATA_DIR) {
            self.data_dir = dir;
        }
        if let Some(dir) = env_path(ENV_SNAPSHOT_DIR) {
            self.snapshot_dir = dir;
        }
        if let Ok(raw) = env::var(ENV_FLUSH_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.flush_quiet_ms = ms,
                Err(e) => error!(var = ENV_FLUSH_MS, value = %raw, error = %e, "failed to parse env var"),
            }
        }
    }

    /// Clamp numeric settings into their supported ranges
    pub fn validate_and_clamp(&mut self) {
        if self.flush_quiet_ms < MIN_FLUSH_QUIET_MS {
            warn!(flush_quiet_ms = self.flush_quiet_ms, min = MIN_FLUSH_QUIET_MS, "flush_quiet_ms below minimum, clamping");
            self.flush_quiet_ms = MIN_FLUSH_QUIET_MS;
        } else if self.flush_quiet_ms > MAX_FLUSH_QUIET_MS {
            warn!(flush_quiet_ms = self.flush_quiet_ms, max = MAX_FLUSH_QUIET_MS, "flush_quiet_ms exceeds maximum, clamping");
            self.flush_quiet_ms = MAX_FLUSH_QUIET_MS;
        }

        if self.snapshot_quota_bytes < MIN_QUOTA_BYTES {
            warn!(snapshot_quota_bytes = self.snapshot_quota_bytes, min = MIN_QUOTA_BYTES, "snapshot_quota_bytes below minimum, clamping");
            self.snapshot_quota_bytes = MIN_QUOTA_BYTES;
        } else if self.snapshot_quota_bytes > MAX_QUOTA_BYTES {
            warn!(snapshot_quota_bytes = self.snapshot_quota_bytes, max = MAX_QUOTA_BYTES, "snapshot_quota_bytes exceeds maximum, clamping");
            self.snapshot_quota_bytes = MAX_QUOTA_BYTES;
        }
    }

    pub fn flush_quiet(&self) -> Duration {
        Duration::from_millis(self.flush_quiet_ms)
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    let value = env::var_os(var)?;
    (!value.is_empty()).then(|| PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_and_clamp() {
        let mut settings = Settings {
            flush_quiet_ms: 1,
            snapshot_quota_bytes: u64::MAX,
            ..Settings::default()
        };
        settings.validate_and_clamp();
        assert_eq!(settings.flush_quiet_ms, MIN_FLUSH_QUIET_MS);
        assert_eq!(settings.snapshot_quota_bytes, MAX_QUOTA_BYTES);

        let mut settings = Settings::default();
        settings.validate_and_clamp();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILENAME);
        fs::write(&path, r#"{"flush_quiet_ms": 250}"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.flush_quiet_ms, 250);
        assert_eq!(settings.snapshot_quota_bytes, DEFAULT_QUOTA_BYTES);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_broken_file_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILENAME);
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(FILENAME);
        let settings = Settings {
            flush_quiet_ms: 900,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }
}
