//! Configuration management for geminicli
//!
//! Values come from, lowest precedence first: built-in defaults, the optional
//! `~/.geminicli/config.toml`, and environment variables. Bad values never
//! abort startup; they fall back to the default and are reported as
//! [`ConfigWarning`]s.

use crate::history::EvictionPolicy;
use crate::llm::gemini::DEFAULT_BASE_URL;
use crate::llm::tokens::{CharHeuristic, EstimatorKind, WordHeuristic};
use crate::llm::types::{GenerationSettings, HarmCategory, SafetySettings, SafetyThreshold};
use anyhow::{Context, Result};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TOKEN_LIMIT: usize = 30720;
pub const DEFAULT_TOKEN_WARNING: usize = 25000;
pub const DEFAULT_MODEL: &str = "gemini-1.0-pro";
pub const DEFAULT_API_VERSION: &str = "v1beta";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// A configuration value that was rejected and replaced by a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("{key}: '{value}' is not a valid safety threshold, using BLOCK_NONE")]
    InvalidSafetyThreshold { key: String, value: String },

    #[error("{key}: '{value}' is not a valid number, using default {default}")]
    InvalidNumber {
        key: String,
        value: String,
        default: String,
    },

    #[error("{key}: '{value}' is not one of {expected}, using {default}")]
    InvalidChoice {
        key: String,
        value: String,
        expected: String,
        default: String,
    },
}

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Required to talk to the API; checked by the binary, not here
    pub api_key: Option<String>,
    pub model: String,
    pub api_version: String,
    pub base_url: String,
    pub generation: GenerationSettings,
    pub safety: SafetySettings,
    pub request_timeout_secs: u64,
    pub estimator: EstimatorKind,
    pub eviction: EvictionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            generation: GenerationSettings::default(),
            safety: SafetySettings::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            estimator: EstimatorKind::default(),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl Config {
    /// Resolve from the process environment, falling back to `file`.
    pub fn load(file: Option<&ConfigFile>) -> (Self, Vec<ConfigWarning>) {
        Self::resolve(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.and_then(|f| f.get(key)))
        })
    }

    /// Resolve every key through `lookup`. Warnings are logged and returned.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<ConfigWarning>) {
        let mut r = Resolver {
            lookup: &lookup,
            warnings: Vec::new(),
        };
        let defaults = Self::default();
        let base = &defaults.generation;

        let api_key = r.raw("API_KEY");
        let model = r.string("MODEL_TYPE", &defaults.model);
        let api_version = r.string("API_VERSION", &defaults.api_version);
        let base_url = r.string("BASE_URL", &defaults.base_url);

        let generation = GenerationSettings {
            temperature: r.number("TEMPERATURE", base.temperature, |t: &f64| {
                t.is_finite() && *t >= 0.0
            }),
            top_k: r.number("TOP_K", base.top_k, |_: &u32| true),
            top_p: r.number("TOP_P", base.top_p, |p: &f64| (0.0..=1.0).contains(p)),
            max_output_tokens: r.number("MAX_OUTPUT_TOKENS", base.max_output_tokens, |n: &u32| {
                *n > 0
            }),
            stop_sequences: r
                .raw("STOP_SEQUENCES")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let mut safety = SafetySettings::default();
        for category in HarmCategory::all() {
            safety.set(category, r.threshold(category.config_key()));
        }

        let request_timeout_secs =
            r.number("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs, |n: &u64| *n > 0);

        let estimator = match r.choice("TOKEN_ESTIMATOR", "words", &["words", "chars"]).as_str() {
            "chars" => EstimatorKind::Chars {
                chars_per_token: r.number(
                    "CHARS_PER_TOKEN",
                    CharHeuristic::DEFAULT_CHARS_PER_TOKEN,
                    |n: &usize| *n > 0,
                ),
            },
            _ => EstimatorKind::Words {
                tokens_per_word: r.number(
                    "TOKENS_PER_WORD",
                    WordHeuristic::DEFAULT_TOKENS_PER_WORD,
                    |n: &f64| {
                        n.is_finite() && *n > 0.0 && *n <= WordHeuristic::MAX_TOKENS_PER_WORD
                    },
                ),
            },
        };

        let eviction = match r.raw("EVICTION_POLICY") {
            None => EvictionPolicy::default(),
            Some(value) => value.parse::<EvictionPolicy>().unwrap_or_else(|_| {
                r.warn(ConfigWarning::InvalidChoice {
                    key: "EVICTION_POLICY".to_string(),
                    value,
                    expected: "pair, until-under-budget".to_string(),
                    default: EvictionPolicy::default().to_string(),
                });
                EvictionPolicy::default()
            }),
        };

        let config = Self {
            api_key,
            model,
            api_version,
            base_url,
            generation,
            safety,
            request_timeout_secs,
            estimator,
            eviction,
        };
        (config, r.warnings)
    }
}

/// Collects warnings while looking keys up.
struct Resolver<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    warnings: Vec<ConfigWarning>,
}

impl Resolver<'_> {
    /// Trimmed value; blank counts as unset.
    fn raw(&self, key: &str) -> Option<String> {
        let value = (self.lookup)(key)?.trim().to_string();
        if value.is_empty() {
            return None;
        }
        if key != "API_KEY" {
            debug!(key, value = %value, "imported configuration value");
        }
        Some(value)
    }

    fn warn(&mut self, warning: ConfigWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn number<T>(&mut self, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
    where
        T: FromStr + Display,
    {
        let Some(value) = self.raw(key) else {
            return default;
        };
        match value.parse::<T>() {
            Ok(parsed) if valid(&parsed) => parsed,
            _ => {
                self.warn(ConfigWarning::InvalidNumber {
                    key: key.to_string(),
                    value,
                    default: default.to_string(),
                });
                default
            }
        }
    }

    fn choice(&mut self, key: &str, default: &str, allowed: &[&str]) -> String {
        let Some(value) = self.raw(key) else {
            return default.to_string();
        };
        let lowered = value.to_lowercase();
        if allowed.contains(&lowered.as_str()) {
            return lowered;
        }
        self.warn(ConfigWarning::InvalidChoice {
            key: key.to_string(),
            value,
            expected: allowed.join(", "),
            default: default.to_string(),
        });
        default.to_string()
    }

    fn threshold(&mut self, key: &str) -> SafetyThreshold {
        let Some(value) = self.raw(key) else {
            return SafetyThreshold::default();
        };
        resolve_threshold(key, &value).unwrap_or_else(|warning| {
            self.warn(warning);
            SafetyThreshold::BlockNone
        })
    }
}

/// Parse a threshold, case-insensitively. Anything unrecognised is a
/// warning; the caller substitutes `BLOCK_NONE`.
pub fn resolve_threshold(key: &str, value: &str) -> Result<SafetyThreshold, ConfigWarning> {
    value
        .parse()
        .map_err(|_| ConfigWarning::InvalidSafetyThreshold {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Optional on-disk configuration (`~/.geminicli/config.toml`).
///
/// Keys are the lower-case names of the environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    values: toml::Table,
}

impl ConfigFile {
    /// Get the config file path
    pub fn path() -> Result<PathBuf> {
        Ok(app_dir()?.join("config.toml"))
    }

    /// Load the default config file, or None if it doesn't exist
    pub fn load() -> Result<Option<Self>> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let values: toml::Table = toml::from_str(content)?;
        Ok(Self { values })
    }

    /// Value for an environment-style key, rendered as a string.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.values.get(&key.to_lowercase())?;
        Some(match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        })
    }
}

/// Get the base directory path (~/.geminicli)
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".geminicli"))
}
