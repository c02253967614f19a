//! Backend configuration
//!
//! Loaded from TOML or YAML (chosen by file extension). Every section has
//! defaults, so an empty file is a valid configuration. `AIDE_ENV`
//! overrides the configured environment.

use aide_fs::{DEFAULT_ALLOWED_PATHS, DEFAULT_IGNORED_DIRS, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FILE_SIZE};
use aide_txn::DEFAULT_FORMATTABLE_EXTENSIONS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding [`AideConfig::environment`]
pub const ENV_VAR: &str = "AIDE_ENV";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("unknown environment: {0} (expected development or production)")]
    InvalidEnvironment(String),
}

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_paths: Vec<String>,
    pub ignored_dirs: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_paths: DEFAULT_ALLOWED_PATHS.iter().map(ToString::to_string).collect(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Size and depth limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_tree_depth: usize,
    pub max_file_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_DEPTH,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// How long in-memory records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub plan_ttl_secs: u64,
    pub journal_ttl_secs: u64,
}

impl RetentionConfig {
    #[must_use]
    pub const fn plan_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_ttl_secs)
    }

    #[must_use]
    pub const fn journal_ttl(&self) -> Duration {
        Duration::from_secs(self.journal_ttl_secs)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            plan_ttl_secs: 3_600,
            journal_ttl_secs: 86_400,
        }
    }
}

/// Event fan-out settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub subscriber_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: aide_events::DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Build runner settings; builds are disabled without a `program`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
    pub debounce_ms: u64,
    pub output_limit: usize,
    /// How long finished build statuses stay queryable
    pub retention_secs: u64,
}

impl BuildConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            debounce_ms: 300,
            output_limit: 64 * 1024,
            retention_secs: 3_600,
        }
    }
}

/// External formatter used on save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_FORMATTABLE_EXTENSIONS
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AideConfig {
    pub workspace_root: PathBuf,
    pub environment: Environment,
    pub policy: PolicyConfig,
    pub limits: LimitsConfig,
    pub retention: RetentionConfig,
    pub events: EventsConfig,
    pub build: BuildConfig,
    pub formatter: Option<FormatterConfig>,
}

impl Default for AideConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            environment: Environment::default(),
            policy: PolicyConfig::default(),
            limits: LimitsConfig::default(),
            retention: RetentionConfig::default(),
            events: EventsConfig::default(),
            build: BuildConfig::default(),
            formatter: None,
        }
    }
}

impl AideConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_allowed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy.allowed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_build_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.build.program = Some(program.into());
        self.build.args = args;
        self
    }

    #[must_use]
    pub fn with_build_debounce(mut self, debounce: Duration) -> Self {
        self.build.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: FormatterConfig) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file, then apply `AIDE_ENV`
    ///
    /// A relative `workspace_root` is resolved against the file's directory.
    ///
    /// # Errors
    /// Read, parse or environment override failures
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut config = match ext.as_str() {
            "toml" => Self::from_toml_str(&raw)?,
            "yaml" | "yml" => Self::from_yaml_str(&raw)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        if config.workspace_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.workspace_root = dir.join(&config.workspace_root);
            }
        }
        config.apply_environment_override(std::env::var(ENV_VAR).ok().as_deref())?;
        tracing::debug!(path = %path.display(), environment = %config.environment, "configuration loaded");
        Ok(config)
    }

    /// # Errors
    /// Malformed TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// # Errors
    /// Malformed YAML
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Replace the environment with `value` when present
    ///
    /// # Errors
    /// [`ConfigError::InvalidEnvironment`] for unknown names
    pub fn apply_environment_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.environment = value.parse()?;
        }
        Ok(())
    }
}
