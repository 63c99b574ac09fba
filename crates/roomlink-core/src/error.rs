// ── Core error types ──
//
// Resolution misses are not errors: lookups return `None` or empty lists.
// Reconciliation failures are recovered inside the engine and only
// surface here so collaborators have something typed to return.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Resolution ───────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Topology ─────────────────────────────────────────────────────
    #[error("Topology invariant violated: {message}")]
    InvariantViolation { message: String },

    // ── Reconciliation ───────────────────────────────────────────────
    #[error("Follower query for {device} failed: {reason}")]
    Reconciliation { device: String, reason: String },

    #[error("No controller available for {device}")]
    ControllerUnavailable { device: String },

    #[error("Follower query timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_timeouts_keep_their_precision() {
        let err = CoreError::Timeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Follower query timed out after 250ms");
    }
}
