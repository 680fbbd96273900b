//! Service configuration
//!
//! Loaded in three tiers: a TOML file, then `MINDSCORE_*` environment
//! variables, then explicit CLI overrides applied by the caller.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ml::model::ModelKind;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "mindscore.toml";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `MINDSCORE_CONFIG_PATH` points at nothing
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// File could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Full service configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Project root
    pub project: ProjectConfig,
    /// Model and dump locations under the project root
    pub storage: StorageConfig,
    /// EEG record location
    pub data: DataConfig,
    /// Windowing parameters
    pub signal: SignalConfig,
    /// Prediction retry policy
    pub retry: RetryConfig,
    /// Project/label routing table
    pub routes: Vec<Route>,
}

/// `[project]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root directory for models, dumps and the registry
    pub dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".") }
    }
}

/// `[storage]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Model artifacts, relative to the project root
    pub model_subdir: PathBuf,
    /// Failure dumps, relative to the project root
    pub dumps_subdir: PathBuf,
    /// SQLite registry file, relative to the project root
    pub registry_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_subdir: PathBuf::from("models"),
            dumps_subdir: PathBuf::from("dumps"),
            registry_file: PathBuf::from("registry.sqlite3"),
        }
    }
}

/// `[data]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the file data source
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("data") }
    }
}

/// `[signal]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Headset sample rate in Hz
    pub sample_rate: f64,
    /// Training window length in seconds
    pub window_secs: f64,
    /// Prediction window length in seconds
    pub predict_secs: f64,
    /// Minimum labelled data to train on, in seconds
    pub train_secs: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sample_rate: mindscore_core::types::DEFAULT_SAMPLE_RATE_HZ,
            window_secs: 5.0,
            predict_secs: 5.0,
            train_secs: 30.0,
        }
    }
}

impl SignalConfig {
    /// Training window length in samples
    #[must_use]
    pub fn window_samples(&self) -> usize {
        secs_to_samples(self.window_secs, self.sample_rate)
    }

    /// Prediction window length in samples
    #[must_use]
    pub fn predict_samples(&self) -> usize {
        secs_to_samples(self.predict_secs, self.sample_rate)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_samples(secs: f64, sample_rate: f64) -> usize {
    (secs * sample_rate).round().max(0.0) as usize
}

/// `[retry]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Wait between attempts in milliseconds
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Backoff as a duration
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// `[[routes]]`: which model serves a project label
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Project the route belongs to
    pub project_name: String,
    /// Label carried by predict requests
    pub label: String,
    /// Model kind to train and load
    pub model: ModelKind,
    /// Record label marking the target class during training
    pub target_label: String,
}

impl ServiceConfig {
    /// Load configuration.
    ///
    /// Uses `path` when given, otherwise searches with
    /// [`find_config_file`], falling back to defaults when nothing is found.
    /// Environment overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file()?,
        };

        let mut config = match file {
            Some(file) => {
                debug!(path = %file.display(), "Loading configuration");
                Self::from_toml(&fs::read_to_string(&file)?)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MINDSCORE_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MINDSCORE_PROJECT_DIR") {
            self.project.dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("MINDSCORE_DATA_DIR") {
            self.data.dir = PathBuf::from(value);
        }
        if let Some(attempts) = lookup("MINDSCORE_RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.retry.max_attempts = attempts;
        }
        if let Some(backoff) = lookup("MINDSCORE_RETRY_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.retry.backoff_ms = backoff;
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        let signal = &self.signal;
        if !(signal.sample_rate.is_finite() && signal.sample_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "signal.sample_rate must be positive, got {}",
                signal.sample_rate
            )));
        }
        if signal.window_samples() == 0 || signal.predict_samples() == 0 {
            return Err(ConfigError::Invalid("signal windows must hold at least one sample".into()));
        }
        if signal.predict_secs > signal.train_secs {
            return Err(ConfigError::Invalid(format!(
                "signal.predict_secs ({}) exceeds signal.train_secs ({})",
                signal.predict_secs, signal.train_secs
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.project_name.is_empty() || route.label.is_empty() {
                return Err(ConfigError::Invalid("routes need a project_name and a label".into()));
            }
            if !seen.insert((route.project_name.as_str(), route.label.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate route for project {:?} label {:?}",
                    route.project_name, route.label
                )));
            }
        }

        Ok(())
    }

    /// Directory holding model artifacts
    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.project.dir.join(&self.storage.model_subdir)
    }

    /// Directory holding failure dumps
    #[must_use]
    pub fn dumps_dir(&self) -> PathBuf {
        self.project.dir.join(&self.storage.dumps_subdir)
    }

    /// Path of the SQLite model registry
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.project.dir.join(&self.storage.registry_file)
    }
}

/// Locate the configuration file.
///
/// Search order:
/// 1. `MINDSCORE_CONFIG_PATH` (an error if it names a missing file)
/// 2. `./mindscore.toml`
///
/// Returns `Ok(None)` when neither exists.
pub fn find_config_file() -> ConfigResult<Option<PathBuf>> {
    if let Ok(env_path) = env::var("MINDSCORE_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        return if path.exists() {
            Ok(Some(path))
        } else {
            Err(ConfigError::FileNotFound(path))
        };
    }

    let local = env::current_dir()?.join(CONFIG_FILE_NAME);
    Ok(local.exists().then_some(local))
}
