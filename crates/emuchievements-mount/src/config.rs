//! Mount manager configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MountError;

/// What `register()` does when one mount fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationPolicy {
    /// Report the failure and keep applying the remaining mounts.
    #[default]
    BestEffort,
    /// Stop at the first failure and roll back everything applied so far.
    FailFast,
}

impl fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActivationPolicy::BestEffort => "best-effort",
            ActivationPolicy::FailFast => "fail-fast",
        })
    }
}

impl FromStr for ActivationPolicy {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(ActivationPolicy::BestEffort),
            "fail-fast" | "fail_fast" => Ok(ActivationPolicy::FailFast),
            other => Err(MountError::InvalidArgument(format!(
                "unknown activation policy '{other}'"
            ))),
        }
    }
}

/// Configuration for a [`crate::MountManager`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default)]
    pub activation_policy: ActivationPolicy,
}

impl MountConfig {
    /// Build config from environment variables.
    ///
    /// `MOUNT_ACTIVATION_POLICY` selects `best-effort` (default) or `fail-fast`.
    /// Unknown values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let activation_policy = match std::env::var("MOUNT_ACTIVATION_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("ignoring MOUNT_ACTIVATION_POLICY: {e}");
                ActivationPolicy::default()
            }),
            Err(_) => ActivationPolicy::default(),
        };
        Self { activation_policy }
    }

    pub fn fail_fast() -> Self {
        Self {
            activation_policy: ActivationPolicy::FailFast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_best_effort() {
        assert_eq!(MountConfig::default().activation_policy, ActivationPolicy::BestEffort);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "fail-fast".parse::<ActivationPolicy>().unwrap(),
            ActivationPolicy::FailFast
        );
        assert_eq!(
            " Best_Effort ".parse::<ActivationPolicy>().unwrap(),
            ActivationPolicy::BestEffort
        );
        assert!("all-or-nothing".parse::<ActivationPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [ActivationPolicy::BestEffort, ActivationPolicy::FailFast] {
            assert_eq!(policy.to_string().parse::<ActivationPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_config_deserializes_kebab_case() {
        let cfg: MountConfig =
            serde_json::from_str(r#"{"activation_policy":"fail-fast"}"#).unwrap();
        assert_eq!(cfg, MountConfig::fail_fast());
        let cfg: MountConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, MountConfig::default());
    }
}
