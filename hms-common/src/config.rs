//! Configuration loading
//!
//! Priority order (highest first):
//! 1. Command-line arguments (applied by each binary)
//! 2. Environment variables (`HMS_*`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing config file is not an error: defaults are used and a warning is
//! logged. A config file that exists but does not parse, or values that fail
//! validation, are errors.

use crate::confidence::{ConfidenceError, ScoringWeights, DEFAULT_THRESHOLD};
use crate::evidence::{SourceIdentity, SourcePolicy, SourceWeights};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "HMS_CONFIG";

pub const ENV_CONFIDENCE_THRESHOLD: &str = "HMS_CONFIDENCE_THRESHOLD";
pub const ENV_WEBHOOK_SECRET: &str = "HMS_WEBHOOK_SECRET";
pub const ENV_VERIFY_SIGNATURES: &str = "HMS_VERIFY_SIGNATURES";
pub const ENV_WEBHOOK_MAX_ATTEMPTS: &str = "HMS_WEBHOOK_MAX_ATTEMPTS";
pub const ENV_WEBHOOK_BASE_DELAY_MS: &str = "HMS_WEBHOOK_BASE_DELAY_MS";
pub const ENV_LOG_LEVEL: &str = "HMS_LOG_LEVEL";

/// Complete HMS configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HmsConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub confidence: ConfidenceConfig,
    /// Per-source weight overrides, keyed by source name
    pub sources: BTreeMap<String, SourceWeights>,
    pub webhook: WebhookConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address shared by both services
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub threshold: f64,
    pub completeness_weight: f64,
    pub filter_match_weight: f64,
    pub source_reliability_weight: f64,
    /// Upper bound for one source client query
    pub source_timeout_ms: u64,
}

impl ConfidenceConfig {
    pub fn source_timeout(&self) -> Duration {
        crate::time::millis_to_duration(self.source_timeout_ms)
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        let weights = ScoringWeights::default();
        Self {
            threshold: DEFAULT_THRESHOLD,
            completeness_weight: weights.completeness(),
            filter_match_weight: weights.filter_match(),
            source_reliability_weight: weights.source_reliability(),
            source_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Attempts per event, including the first
    pub max_attempts: u32,
    /// Backoff before attempt n+1 is `base_delay_ms * 2^(n-1)`
    pub base_delay_ms: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub verify_signatures: bool,
    pub signing_secret: Option<String>,
    /// Upper bound for each cache/verifier/index call
    pub collaborator_timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            workers: 4,
            queue_capacity: 1024,
            verify_signatures: false,
            signing_secret: None,
            collaborator_timeout_ms: 2000,
        }
    }
}

impl WebhookConfig {
    pub fn base_delay(&self) -> Duration {
        crate::time::millis_to_duration(self.base_delay_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        crate::time::millis_to_duration(self.collaborator_timeout_ms)
    }
}

impl HmsConfig {
    /// Load configuration: TOML file (if any), then environment overrides,
    /// then validation.
    ///
    /// `explicit_path` comes from `--config`; without it `HMS_CONFIG` and then
    /// the platform config directory are tried.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                let config = Self::from_toml_str(&content)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `HMS_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(threshold) = env_parse::<f64>(ENV_CONFIDENCE_THRESHOLD)? {
            self.confidence.threshold = threshold;
        }
        if let Ok(secret) = std::env::var(ENV_WEBHOOK_SECRET) {
            if !secret.is_empty() {
                self.webhook.signing_secret = Some(secret);
            }
        }
        if let Some(verify) = env_parse::<bool>(ENV_VERIFY_SIGNATURES)? {
            self.webhook.verify_signatures = verify;
        }
        if let Some(attempts) = env_parse::<u32>(ENV_WEBHOOK_MAX_ATTEMPTS)? {
            self.webhook.max_attempts = attempts;
        }
        if let Some(delay) = env_parse::<u64>(ENV_WEBHOOK_BASE_DELAY_MS)? {
            self.webhook.base_delay_ms = delay;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        crate::confidence::check_threshold(self.confidence.threshold).map_err(config_error)?;
        self.scoring_weights()?;

        for (name, weights) in &self.sources {
            for (field, value) in [
                ("reliability", weights.reliability),
                ("aggregation_weight", weights.aggregation_weight),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(Error::Config(format!(
                        "sources.{}.{} = {} must be within [0, 1]",
                        name, field, value
                    )));
                }
            }
        }

        if self.webhook.max_attempts == 0 {
            return Err(Error::Config("webhook.max_attempts must be at least 1".to_string()));
        }
        if self.webhook.workers == 0 {
            return Err(Error::Config("webhook.workers must be at least 1".to_string()));
        }
        if self.webhook.queue_capacity == 0 {
            return Err(Error::Config("webhook.queue_capacity must be at least 1".to_string()));
        }
        if self.webhook.verify_signatures
            && self.webhook.signing_secret.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::Config(
                "webhook.verify_signatures requires webhook.signing_secret".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scoring_weights(&self) -> Result<ScoringWeights> {
        ScoringWeights::new(
            self.confidence.completeness_weight,
            self.confidence.filter_match_weight,
            self.confidence.source_reliability_weight,
        )
        .map_err(config_error)
    }

    pub fn source_policy(&self) -> SourcePolicy {
        self.sources
            .iter()
            .fold(SourcePolicy::new(), |policy, (name, weights)| {
                policy.with_override(SourceIdentity::from(name.as_str()), *weights)
            })
    }
}

/// `<config_dir>/hms/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hms").join("config.toml"))
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
        _ => Ok(None),
    }
}

fn config_error(err: ConfidenceError) -> Error {
    Error::Config(err.to_string())
}
