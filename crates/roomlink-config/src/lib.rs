//! Shared configuration for roomlink tools.
//!
//! A TOML file in the platform config directory, merged over built-in
//! defaults and `ROOMLINK_`-prefixed environment variables, translated
//! into `roomlink_core::RegistryConfig`. The core crate never reads files;
//! binaries load a [`Config`] here and hand the translated value in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use roomlink_core::{CoreError, RegistryConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Registry naming and reconciliation settings.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Presentation defaults for the CLI.
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistrySettings {
    /// Domain of external references, e.g. `media_player`.
    #[serde(default = "default_reference_domain")]
    pub reference_domain: String,

    /// Suffix of generated group representative references.
    #[serde(default = "default_representative_suffix")]
    pub representative_suffix: String,

    /// Upper bound on one follower query, in seconds.
    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            reference_domain: default_reference_domain(),
            representative_suffix: default_representative_suffix(),
            reconcile_timeout_secs: default_reconcile_timeout(),
        }
    }
}

fn default_reference_domain() -> String {
    "media_player".into()
}
fn default_representative_suffix() -> String {
    "group".into()
}
fn default_reconcile_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

impl Config {
    /// Translate into the runtime configuration, validating it on the way.
    pub fn to_registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let cfg = RegistryConfig {
            reference_domain: self.registry.reference_domain.trim().to_owned(),
            representative_suffix: self.registry.representative_suffix.trim().to_owned(),
            reconcile_timeout: Duration::from_secs(self.registry.reconcile_timeout_secs),
        };
        cfg.validate().map_err(|err| match err {
            CoreError::Config { message } => ConfigError::Validation {
                field: "registry".into(),
                reason: message,
            },
            other => ConfigError::Validation {
                field: "registry".into(),
                reason: other.to_string(),
            },
        })?;
        Ok(cfg)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "roomlink", "roomlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("roomlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// `ROOMLINK_REGISTRY__REFERENCE_DOMAIN=speaker` overrides
/// `registry.reference_domain`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ROOMLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
