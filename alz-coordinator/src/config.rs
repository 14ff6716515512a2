//! Coordinator configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CoordinatorError;

/// What to do with the rest of a batch once one request has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Start nothing new after the first failure; in-flight requests finish.
    #[default]
    FailFast,
    /// Attempt every request.
    RunAll,
}

impl FromStr for FailurePolicy {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "run-all" | "run_all" | "runall" => Ok(FailurePolicy::RunAll),
            other => Err(CoordinatorError::Config(format!(
                "unknown failure policy {other:?} (expected fail-fast or run-all)"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::RunAll => "run-all",
        })
    }
}

/// Coordinator configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Budget for the whole execution phase.
    pub execution_timeout: Duration,
    /// Budget for generating and registering every proof.
    pub proving_timeout: Duration,
    /// Budget for verifying every proof.
    pub verification_timeout: Duration,
    /// Budget for each individual compensation call.
    pub compensation_timeout: Duration,
    /// Upper bound on concurrent adapter calls and proof jobs.
    pub max_parallelism: usize,
    pub failure_policy: FailurePolicy,
    /// Require every proof to be present in the registry during verification.
    pub require_registry_membership: bool,
    /// Also compensate successful read-only operations.
    pub compensate_read_only: bool,
    /// Refuse batches touching adapters in simulated mode.
    pub reject_simulated: bool,
    /// Issuer id stamped on generated proofs.
    pub issuer_id: String,
    /// Seed of the default hash-commitment ZK backend.
    pub zk_seed: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_millis(30_000),
            proving_timeout: Duration::from_millis(60_000),
            verification_timeout: Duration::from_millis(30_000),
            compensation_timeout: Duration::from_millis(30_000),
            max_parallelism: 8,
            failure_policy: FailurePolicy::FailFast,
            require_registry_membership: true,
            compensate_read_only: true,
            reject_simulated: false,
            issuer_id: "alz-coordinator".to_string(),
            zk_seed: "alz-dev-seed".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self, CoordinatorError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoordinatorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            execution_timeout: millis(&lookup, "ALZ_EXECUTION_TIMEOUT_MS")?
                .unwrap_or(defaults.execution_timeout),
            proving_timeout: millis(&lookup, "ALZ_PROVING_TIMEOUT_MS")?
                .unwrap_or(defaults.proving_timeout),
            verification_timeout: millis(&lookup, "ALZ_VERIFICATION_TIMEOUT_MS")?
                .unwrap_or(defaults.verification_timeout),
            compensation_timeout: millis(&lookup, "ALZ_COMPENSATION_TIMEOUT_MS")?
                .unwrap_or(defaults.compensation_timeout),
            max_parallelism: parsed(&lookup, "ALZ_MAX_PARALLELISM")?
                .unwrap_or(defaults.max_parallelism),
            failure_policy: parsed(&lookup, "ALZ_FAILURE_POLICY")?
                .unwrap_or(defaults.failure_policy),
            require_registry_membership: flag(&lookup, "ALZ_REQUIRE_REGISTRY_MEMBERSHIP")?
                .unwrap_or(defaults.require_registry_membership),
            compensate_read_only: flag(&lookup, "ALZ_COMPENSATE_READ_ONLY")?
                .unwrap_or(defaults.compensate_read_only),
            reject_simulated: flag(&lookup, "ALZ_REJECT_SIMULATED")?
                .unwrap_or(defaults.reject_simulated),
            issuer_id: lookup("ALZ_ISSUER_ID").unwrap_or(defaults.issuer_id),
            zk_seed: lookup("ALZ_ZK_SEED").unwrap_or(defaults.zk_seed),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.max_parallelism == 0 {
            return Err(CoordinatorError::Config(
                "max_parallelism must be at least 1".into(),
            ));
        }
        for (name, timeout) in [
            ("execution_timeout", self.execution_timeout),
            ("proving_timeout", self.proving_timeout),
            ("verification_timeout", self.verification_timeout),
            ("compensation_timeout", self.compensation_timeout),
        ] {
            if timeout.is_zero() {
                return Err(CoordinatorError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.issuer_id.trim().is_empty() {
            return Err(CoordinatorError::Config("issuer_id must not be empty".into()));
        }
        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, CoordinatorError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| CoordinatorError::Config(format!("{key}={raw:?}: {err}"))),
    }
}

fn millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>, CoordinatorError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parsed::<F, u64>(lookup, key)?.map(Duration::from_millis))
}

fn flag<F>(lookup: &F, key: &str) -> Result<Option<bool>, CoordinatorError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(raw) => match raw.as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(CoordinatorError::Config(format!(
                "{key}={raw:?} is not a boolean"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<CoordinatorConfig, CoordinatorError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CoordinatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert_eq!(config.proving_timeout, Duration::from_secs(60));
        assert_eq!(config.max_parallelism, 8);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert!(config.require_registry_membership);
        assert!(config.compensate_read_only);
        assert!(!config.reject_simulated);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("ALZ_EXECUTION_TIMEOUT_MS", "250"),
            ("ALZ_MAX_PARALLELISM", "2"),
            ("ALZ_FAILURE_POLICY", "run-all"),
            ("ALZ_COMPENSATE_READ_ONLY", "false"),
            ("ALZ_REJECT_SIMULATED", "1"),
            ("ALZ_ISSUER_ID", "node-7"),
        ])
        .unwrap();
        assert_eq!(config.execution_timeout, Duration::from_millis(250));
        assert_eq!(config.max_parallelism, 2);
        assert_eq!(config.failure_policy, FailurePolicy::RunAll);
        assert!(!config.compensate_read_only);
        assert!(config.reject_simulated);
        assert_eq!(config.issuer_id, "node-7");
    }

    #[test]
    fn test_invalid_values() {
        for pairs in [
            [("ALZ_MAX_PARALLELISM", "zero")],
            [("ALZ_MAX_PARALLELISM", "0")],
            [("ALZ_PROVING_TIMEOUT_MS", "-5")],
            [("ALZ_VERIFICATION_TIMEOUT_MS", "0")],
            [("ALZ_FAILURE_POLICY", "sometimes")],
            [("ALZ_REQUIRE_REGISTRY_MEMBERSHIP", "maybe")],
        ] {
            assert!(
                matches!(from_pairs(&pairs), Err(CoordinatorError::Config(_))),
                "{pairs:?} accepted"
            );
        }
    }

    #[test]
    fn test_failure_policy_round_trip() {
        for policy in [FailurePolicy::FailFast, FailurePolicy::RunAll] {
            assert_eq!(policy.to_string().parse::<FailurePolicy>().unwrap(), policy);
        }
    }
}
