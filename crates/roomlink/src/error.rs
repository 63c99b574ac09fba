//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use roomlink_config::ConfigError;
use roomlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const TIMEOUT: i32 = 8;
    pub const TOPOLOGY: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────

    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(roomlink::not_found),
        help("Identify devices by UUID, IP, hardware address or reference. Run with --steps to see what was registered.")
    )]
    NotFound { identifier: String },

    #[error("{path} already exists")]
    #[diagnostic(code(roomlink::conflict), help("Use --force to overwrite it."))]
    AlreadyExists { path: String },

    // ── Script ───────────────────────────────────────────────────────

    #[error("Invalid scenario script {path}: {reason}")]
    #[diagnostic(code(roomlink::script))]
    Script { path: String, reason: String },

    #[error("Step {step} left the topology inconsistent: {message}")]
    #[diagnostic(
        code(roomlink::topology),
        help("This is a registry bug. Re-run with -vv to trace the offending step.")
    )]
    Topology { step: usize, message: String },

    #[error("Topology invariant violated: {message}")]
    #[diagnostic(code(roomlink::invariant))]
    Invariant { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(roomlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(roomlink::config),
        help("Inspect the file with: roomlink config show")
    )]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Follower query timed out after {timeout:?}")]
    #[diagnostic(
        code(roomlink::timeout),
        help("Raise registry.reconcile_timeout_secs in the config file.")
    )]
    Timeout { timeout: Duration },

    // ── Registry ─────────────────────────────────────────────────────

    #[error("Registry error: {message}")]
    #[diagnostic(code(roomlink::registry))]
    Registry { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(roomlink::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(roomlink::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(roomlink::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::AlreadyExists { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Topology { .. } | Self::Invariant { .. } => exit_code::TOPOLOGY,
            Self::Validation { .. } | Self::Script { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { identifier } => Self::NotFound { identifier },
            CoreError::InvariantViolation { message } => Self::Invariant { message },
            CoreError::Timeout { timeout } => Self::Timeout { timeout },
            CoreError::Config { message } => Self::Validation {
                field: "registry".into(),
                reason: message,
            },
            other => Self::Registry {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let not_found: CliError = CoreError::DeviceNotFound {
            identifier: "u1".into(),
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);

        let invariant: CliError = CoreError::InvariantViolation {
            message: "x".into(),
        }
        .into();
        assert_eq!(invariant.exit_code(), exit_code::TOPOLOGY);

        let timeout: CliError = CoreError::Timeout {
            timeout: Duration::from_millis(250),
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
        assert_eq!(timeout.to_string(), "Follower query timed out after 250ms");

        let other: CliError = CoreError::Reconciliation {
            device: "u1".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(other.exit_code(), exit_code::GENERAL);
    }
}
