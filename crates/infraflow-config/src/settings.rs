//! Engine settings
//!
//! Read from YAML in two layers, global (`~/.config/infraflow/settings.yaml`)
//! then project (`.infraflow/settings.yaml`), merged key by key. Environment
//! variables override both.

use crate::error::{ConfigError, Result};
use crate::PROJECT_DIR;
use infraflow_cloud::{DEFAULT_MAX_PARALLEL, PollConfig, ReconcilerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const SETTINGS_FILE: &str = "settings.yaml";

const ENV_MAX_PARALLEL: &str = "INFRAFLOW_MAX_PARALLEL";
const ENV_MAX_ATTEMPTS: &str = "INFRAFLOW_MAX_ATTEMPTS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on concurrently running operations
    pub max_parallel: usize,
    /// Provider backend; only `sandbox` ships with InfraFlow
    pub provider: String,
    pub region: String,
    pub retry: RetrySettings,
    pub poll: PollSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            provider: "sandbox".to_string(),
            region: "us-east-1".to_string(),
            retry: RetrySettings::default(),
            poll: PollSettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            timeout_ms: 600_000,
        }
    }
}

impl EngineSettings {
    /// Load global and project settings, then apply environment overrides
    pub fn load(project_root: Option<&Path>) -> Result<Self> {
        let global = dirs::config_dir().map(|dir| dir.join("infraflow").join(SETTINGS_FILE));
        let project = project_root.map(|root| root.join(PROJECT_DIR).join(SETTINGS_FILE));
        Self::load_from(global.as_deref(), project.as_deref())
    }

    /// Like [`load`](Self::load) with explicit file locations. Missing files
    /// are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut merged = Value::Mapping(Default::default());
        for path in [global, project].into_iter().flatten() {
            if let Some(layer) = read_layer(path)? {
                merge(&mut merged, layer);
            }
        }

        let mut settings: EngineSettings =
            serde_yaml::from_value(merged).map_err(|source| ConfigError::Yaml {
                path: project.or(global).map(Path::to_path_buf).unwrap_or_default(),
                source,
            })?;
        settings.apply_env()?;
        settings.check()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_number(ENV_MAX_PARALLEL)? {
            self.max_parallel = value;
        }
        if let Some(value) = env_number(ENV_MAX_ATTEMPTS)? {
            self.retry.max_attempts = value;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid("max_parallel must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.multiplier,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_parallel: self.max_parallel,
            retry: self.retry_config(),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(self.poll.initial_delay_ms),
            max_delay: Duration::from_millis(self.poll.max_delay_ms),
            timeout: Duration::from_millis(self.poll.timeout_ms),
        }
    }
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "Reading settings");
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: PathBuf::from(path),
        source,
    })?;
    // An empty file parses as null
    Ok((!value.is_null()).then_some(value))
}

/// Deep-merge `overlay` into `base`: mappings merge per key, anything else
/// replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}
