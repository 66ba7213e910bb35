use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub retry: RetryConfig,
    pub resource_types: ResourceTypesConfig,
    pub filters: Vec<FilterRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Listers run concurrently during a scan
    pub scan_jobs: usize,
    /// Concurrent removals within one resource type
    pub parallel_jobs: usize,
    /// Deadline across all listers in seconds (0 = none)
    pub scan_timeout_secs: u64,
    /// Deadline for the whole run in seconds (0 = none)
    pub run_timeout_secs: u64,
    /// Re-list each type after removal and report resources still present
    pub verify_removals: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Remove attempts per resource, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between retries in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor applied to the delay after each retry
    pub multiplier: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTypesConfig {
    /// Only these types are processed (empty = all)
    pub includes: Vec<String>,
    /// These types are never processed
    pub excludes: Vec<String>,
}

/// What a matching filter rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Keep,
    Remove,
}

/// How a filter rule compares its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    #[default]
    Exact,
    Contains,
    Glob,
    Regex,
    /// Value is an age such as `30d`; the target must hold an RFC 3339 timestamp
    DateOlderThan,
}

/// One keep/remove rule.
///
/// Matches the resource identity unless `property` or `tag` names another
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRuleConfig {
    pub action: RuleAction,
    /// Types the rule applies to (empty = all)
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
    pub value: String,
    #[serde(default)]
    pub invert: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scan_jobs: 8,
            parallel_jobs: 4,
            scan_timeout_secs: 600,
            run_timeout_secs: 0,
            verify_removals: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RunConfig {
    pub fn scan_timeout(&self) -> Option<Duration> {
        secs_or_none(self.scan_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        secs_or_none(self.run_timeout_secs)
    }
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cloud-sweeper").join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// if present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|err| match err {
            ConfigError::ParseError { source, .. } => ConfigError::ParseError {
                path: path.clone(),
                source,
            },
            other => other,
        })?;

        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::ParseError {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.scan_jobs == 0 {
            return Err(ConfigError::Invalid("run.scan_jobs must be at least 1".into()));
        }
        if self.run.parallel_jobs == 0 {
            return Err(ConfigError::Invalid(
                "run.parallel_jobs must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        for (i, rule) in self.filters.iter().enumerate() {
            if rule.property.is_some() && rule.tag.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "filters[{i}] sets both property and tag"
                )));
            }
        }
        Ok(())
    }
}
