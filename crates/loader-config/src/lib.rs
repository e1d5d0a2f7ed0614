use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_VERSION: u64 = 1;
const APP_DIR: &str = "resizable-image";
const CONFIG_FILE: &str = "config.json";
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub version: u64,
    /// Physical pixels per logical unit on the target display.
    pub device_scale_factor: f64,
    pub memory_cache_entries: usize,
    /// Total payload bytes held in memory. `0` disables the byte limit.
    pub memory_cache_bytes: u64,
    pub disk_cache: bool,
    /// Total bytes kept on disk before the oldest responses are evicted.
    /// `0` disables eviction.
    pub disk_cache_bytes: u64,
    /// Overrides `<cache dir>/resizable-image/http`.
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            device_scale_factor: 1.0,
            memory_cache_entries: 200,
            memory_cache_bytes: 64 * MIB,
            disk_cache: true,
            disk_cache_bytes: 256 * MIB,
            cache_dir: None,
            request_timeout_secs: 30,
            user_agent: format!("{}/{}", APP_DIR, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl LoaderConfig {
    /// Directory the HTTP response cache persists into, if any.
    pub fn http_cache_dir(&self) -> Option<PathBuf> {
        if !self.disk_cache {
            return None;
        }

        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("http")))
    }

    /// Clamp values that would make the loader misbehave.
    pub fn sanitized(mut self) -> Self {
        if self.version > CONFIG_VERSION {
            warn!(
                "Config version {} is newer than supported version {}",
                self.version, CONFIG_VERSION
            );
        }
        self.version = CONFIG_VERSION;

        if !self.device_scale_factor.is_finite() || self.device_scale_factor <= 0.0 {
            warn!(
                "Ignoring invalid device scale factor {}",
                self.device_scale_factor
            );
            self.device_scale_factor = 1.0;
        }
        self.memory_cache_entries = self.memory_cache_entries.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: LoaderConfig = serde_json::from_str(&contents)?;
        Ok(config.sanitized())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load the user config, falling back to defaults when it is missing or
    /// unreadable.
    pub fn load() -> Self {
        let Ok(path) = config_path() else {
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                warn!("Failed to load config from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_path()?)
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.device_scale_factor, 1.0);
        assert_eq!(config.memory_cache_entries, 200);
        assert_eq!(config.memory_cache_bytes, 64 * MIB);
        assert!(config.disk_cache);
        assert_eq!(config.disk_cache_bytes, 256 * MIB);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.user_agent.starts_with("resizable-image/"));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = LoaderConfig {
            device_scale_factor: 3.0,
            memory_cache_entries: 12,
            disk_cache: false,
            ..LoaderConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = LoaderConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "device_scale_factor": 2.0 }"#).unwrap();

        let loaded = LoaderConfig::load_from(&path).unwrap();
        assert_eq!(loaded.device_scale_factor, 2.0);
        assert_eq!(loaded.memory_cache_entries, 200);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            LoaderConfig::load_from(&missing),
            Err(ConfigError::Io(_))
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "not json").unwrap();
        assert!(matches!(
            LoaderConfig::load_from(&bad),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_sanitized() {
        let config = LoaderConfig {
            device_scale_factor: -1.0,
            memory_cache_entries: 0,
            request_timeout_secs: 0,
            ..LoaderConfig::default()
        }
        .sanitized();

        assert_eq!(config.device_scale_factor, 1.0);
        assert_eq!(config.memory_cache_entries, 1);
        assert_eq!(config.request_timeout_secs, 1);
    }

    #[test]
    fn test_version_is_normalized_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{ "version": 7, "disk_cache_bytes": 0 }"#).unwrap();
        let loaded = LoaderConfig::load_from(&path).unwrap();
        assert_eq!(loaded.version, CONFIG_VERSION);
        assert_eq!(loaded.disk_cache_bytes, 0);

        // Files written before versioning carry no version at all
        fs::write(&path, r#"{ "disk_cache": false }"#).unwrap();
        let loaded = LoaderConfig::load_from(&path).unwrap();
        assert_eq!(loaded.version, CONFIG_VERSION);
        assert!(!loaded.disk_cache);
    }

    #[test]
    fn test_http_cache_dir() {
        let config = LoaderConfig {
            cache_dir: Some(PathBuf::from("/tmp/images")),
            ..LoaderConfig::default()
        };
        assert_eq!(config.http_cache_dir(), Some(PathBuf::from("/tmp/images")));

        let disabled = LoaderConfig {
            disk_cache: false,
            ..config
        };
        assert_eq!(disabled.http_cache_dir(), None);
    }
}
