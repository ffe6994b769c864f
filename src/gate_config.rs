//! Configuration for the gatekeeper engine.
//!
//! Settings are layered with the following precedence (highest first):
//!
//! 1. CLI flags (`--db`, `--threshold`), which clap also fills from
//!    `GATEKEEPER_DB` and `GATEKEEPER_THRESHOLD`
//! 2. `gatekeeper.toml` (or the file given with `--config`)
//! 3. Built-in defaults
//!
//! # Example gatekeeper.toml
//!
//! ```toml
//! [store]
//! path = ".gatekeeper/gate.db"
//!
//! [circuit_breaker]
//! threshold = 85
//!
//! [validation]
//! timeout_ms = 5000
//!
//! [validation.weights]
//! handoff_content_quality = 0.5
//!
//! [delivery]
//! max_attempts = 5
//!
//! [logging]
//! level = "warn"
//! format = "pretty"
//!
//! [[triggers]]
//! phrase = "breaking change"
//! kind = "keyword"
//! context = "directive"
//! priority = 90
//! reviewer = "REGRESSION"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use gatekeeper_common::Score;
use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};
use crate::gates::{CircuitBreaker, DEFAULT_THRESHOLD};
use crate::review::{DEFAULT_MAX_ATTEMPTS, Trigger, TriggerDispatcher, default_triggers};
use crate::validation::{Validator, ValidatorRegistry};
use crate::validation::builtin;
use crate::validation::registry::DEFAULT_VALIDATOR_TIMEOUT_MS;

/// File name looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "gatekeeper.toml";

// ── Sections ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".gatekeeper/gate.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSection {
    /// Minimum aggregate score a handoff needs to be accepted (1-100).
    #[serde(default = "default_threshold")]
    pub threshold: Score,
}

fn default_threshold() -> Score {
    Score::saturating(DEFAULT_THRESHOLD)
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Per-validator time limit in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Weight overrides keyed by validator name.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_VALIDATOR_TIMEOUT_MS
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            weights: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySection {
    /// Delivery attempts per activation before it is left for inspection.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Optional log file, rotated daily. Always written as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

// ── gatekeeper.toml ──────────────────────────────────────────────────

/// Contents of `gatekeeper.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateToml {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub delivery: DeliverySection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Trigger table. Empty means the built-in defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}

impl GateToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse gatekeeper.toml")
    }

    /// Load `gatekeeper.toml` from `dir`, or defaults when it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize gatekeeper.toml")
    }

    /// Triggers in effect: the configured table, or the defaults when empty.
    pub fn effective_triggers(&self) -> Vec<Trigger> {
        if self.triggers.is_empty() {
            default_triggers()
        } else {
            self.triggers.clone()
        }
    }

    /// Check the configuration and return every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.circuit_breaker.threshold == Score::MIN {
            problems.push("circuit_breaker.threshold must be between 1 and 100".to_string());
        }
        if self.validation.timeout_ms == 0 {
            problems.push("validation.timeout_ms must be greater than 0".to_string());
        }
        let builtins = builtin::all();
        let known: Vec<&str> = builtins.iter().map(|v| v.name()).collect();
        let mut names: Vec<&String> = self.validation.weights.keys().collect();
        names.sort();
        for name in names {
            let weight = self.validation.weights[name];
            if !known.contains(&name.as_str()) {
                problems.push(format!("validation.weights: unknown validator '{}'", name));
            }
            if !weight.is_finite() || weight < 0.0 {
                problems.push(format!(
                    "validation.weights.{} must be a non-negative number, got {}",
                    name, weight
                ));
            }
        }
        if self.delivery.max_attempts == 0 {
            problems.push("delivery.max_attempts must be at least 1".to_string());
        }
        if self.logging.level.trim().is_empty() {
            problems.push("logging.level must not be blank".to_string());
        }
        if let Err(e) = TriggerDispatcher::new(self.triggers.clone()) {
            problems.push(e.to_string());
        }

        problems
    }
}

// ── Resolved configuration ───────────────────────────────────────────

/// Configuration with CLI and environment overrides applied.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub toml: GateToml,
    /// File the settings came from, if any.
    pub source: Option<PathBuf>,
    cli_db: Option<PathBuf>,
    cli_threshold: Option<Score>,
}

impl GateConfig {
    /// Load from `path`, or from `./gatekeeper.toml` when `path` is `None`.
    ///
    /// An explicit path must exist. The result is validated.
    pub fn load(path: Option<&Path>) -> GateResult<Self> {
        let load = |path: &Path| {
            GateToml::load(path).map_err(|e| GateError::Config(format!("{:#}", e)))
        };
        let (toml, source) = match path {
            Some(path) => (load(path)?, Some(path.to_path_buf())),
            None => {
                let default_path = PathBuf::from(CONFIG_FILE_NAME);
                if default_path.exists() {
                    (load(&default_path)?, Some(default_path))
                } else {
                    (GateToml::default(), None)
                }
            }
        };
        let config = Self::from_toml(toml);
        Ok(Self { source, ..config })
    }

    pub fn from_toml(toml: GateToml) -> Self {
        Self {
            toml,
            source: None,
            cli_db: None,
            cli_threshold: None,
        }
    }

    /// Apply CLI overrides. Rejects an out-of-range threshold.
    pub fn with_cli_args(mut self, db: Option<PathBuf>, threshold: Option<i64>) -> GateResult<Self> {
        self.cli_db = db;
        self.cli_threshold = match threshold {
            Some(value) => Some(
                Score::new(value)
                    .ok()
                    .filter(|s| *s > Score::MIN)
                    .ok_or_else(|| {
                        GateError::Config(format!("threshold must be between 1 and 100, got {}", value))
                    })?,
            ),
            None => None,
        };
        Ok(self)
    }

    /// Fail with every problem in one error.
    pub fn ensure_valid(&self) -> GateResult<()> {
        let problems = self.toml.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(GateError::Config(problems.join("; ")))
        }
    }

    /// Database path (CLI → file → default).
    pub fn db_path(&self) -> PathBuf {
        self.cli_db
            .clone()
            .unwrap_or_else(|| self.toml.store.path.clone())
    }

    /// Acceptance threshold (CLI → file → default).
    pub fn threshold(&self) -> Score {
        self.cli_threshold
            .unwrap_or(self.toml.circuit_breaker.threshold)
    }

    pub fn circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(self.threshold())
    }

    pub fn registry(&self) -> ValidatorRegistry {
        ValidatorRegistry::with_builtins()
            .with_timeout(Duration::from_millis(self.toml.validation.timeout_ms))
            .with_weights(self.toml.validation.weights.clone())
    }

    pub fn dispatcher(&self) -> GateResult<TriggerDispatcher> {
        TriggerDispatcher::new(self.toml.effective_triggers())
    }

    pub fn max_delivery_attempts(&self) -> u32 {
        self.toml.delivery.max_attempts
    }

    pub fn logging(&self) -> &LoggingSection {
        &self.toml.logging
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from_toml(GateToml::default())
    }
}
