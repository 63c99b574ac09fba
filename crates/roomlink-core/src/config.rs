// ── Runtime registry configuration ──
//
// Describes naming conventions and reconciliation tuning. Never touches
// disk: `roomlink-config` (or any embedder) builds one and hands it in.

use std::time::Duration;

use crate::error::CoreError;

/// Configuration for a single registry instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Domain prefix of external references (`media_player` in
    /// `media_player.kitchen`).
    pub reference_domain: String,
    /// Suffix appended to generated references of group representatives.
    pub representative_suffix: String,
    /// Upper bound on one authoritative follower query.
    pub reconcile_timeout: Duration,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.reference_domain.is_empty() || self.reference_domain.contains('.') {
            return Err(CoreError::Config {
                message: format!(
                    "reference_domain must be a non-empty name without dots, got '{}'",
                    self.reference_domain
                ),
            });
        }
        if self.representative_suffix.is_empty() {
            return Err(CoreError::Config {
                message: "representative_suffix must not be empty".into(),
            });
        }
        if self.reconcile_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "reconcile_timeout must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reference_domain: "media_player".into(),
            representative_suffix: "group".into(),
            reconcile_timeout: Duration::from_secs(10),
        }
    }
}
