//! Broadcast configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of dial attempts per peer.
pub const DEFAULT_RETRY_MAX: u32 = 10;

/// Default pause between two dial attempts to the same peer.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(20);

pub const ENV_RETRY_MAX: &str = "MESHCAST_RETRY_MAX";
pub const ENV_RETRY_WAIT_MS: &str = "MESHCAST_RETRY_WAIT_MS";
pub const ENV_COMPLETION_POLICY: &str = "MESHCAST_COMPLETION_POLICY";

/// What a node does with peers whose retry budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    /// Every peer must be connected. A single failed peer keeps the round
    /// from ever reaching `Done`; the caller sees a timeout.
    #[default]
    Strict,
    /// Failed peers are dropped from the required set. The round completes
    /// once no peer is still pending.
    BestEffort,
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::BestEffort => write!(f, "best-effort"),
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "best-effort" | "best_effort" | "besteffort" => Ok(Self::BestEffort),
            other => Err(Error::Config(format!("unknown completion policy {other:?}"))),
        }
    }
}

/// Configuration for a Broadcast instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Maximum dial attempts per peer. Must be at least 1.
    pub retry_max: u32,

    /// Wait between consecutive attempts to the same peer.
    pub retry_wait: Duration,

    /// Treatment of peers that exhaust their retry budget.
    pub policy: CompletionPolicy,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            retry_max: DEFAULT_RETRY_MAX,
            retry_wait: DEFAULT_RETRY_WAIT,
            policy: CompletionPolicy::default(),
        }
    }
}

impl BroadcastConfig {
    /// Short retries for in-process tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            retry_max: 5,
            retry_wait: Duration::from_millis(2),
            policy: CompletionPolicy::Strict,
        }
    }

    /// Set the per-peer attempt budget.
    #[must_use]
    pub fn with_retry_max(mut self, retry_max: u32) -> Self {
        self.retry_max = retry_max;
        self
    }

    /// Set the pause between attempts.
    #[must_use]
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Set the completion policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reject configurations that can never connect anything.
    pub fn validate(&self) -> Result<()> {
        if self.retry_max == 0 {
            return Err(Error::Config("retry_max must be at least 1".into()));
        }
        Ok(())
    }

    /// Longest time a single `connect` spends waiting between attempts.
    pub fn max_dial_wait(&self) -> Duration {
        self.retry_wait * self.retry_max.saturating_sub(1)
    }

    /// Conventional deadline for a whole round over `nodes` nodes:
    /// `retry_wait × retry_max × nodes × 2`.
    ///
    /// The protocol itself never enforces it; callers race the done
    /// callback against it.
    pub fn round_timeout(&self, nodes: usize) -> Duration {
        let factor = u32::try_from(nodes.saturating_mul(2)).unwrap_or(u32::MAX);
        self.retry_wait
            .saturating_mul(self.retry_max)
            .saturating_mul(factor)
    }

    /// Build a config from `MESHCAST_*` environment variables, falling back
    /// to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RETRY_MAX) {
            config.retry_max = raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{ENV_RETRY_MAX}={raw:?}: {e}")))?;
        }
        if let Some(raw) = lookup(ENV_RETRY_WAIT_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{ENV_RETRY_WAIT_MS}={raw:?}: {e}")))?;
            config.retry_wait = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup(ENV_COMPLETION_POLICY) {
            config.policy = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BroadcastConfig::default();
        assert_eq!(config.retry_max, 10);
        assert_eq!(config.retry_wait, Duration::from_millis(20));
        assert_eq!(config.policy, CompletionPolicy::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn round_timeout_scales_with_nodes() {
        let config = BroadcastConfig::default();
        // 20ms * 10 * 3 * 2
        assert_eq!(config.round_timeout(3), Duration::from_millis(1200));
        assert_eq!(config.round_timeout(14), Duration::from_millis(5600));
    }

    #[test]
    fn max_dial_wait_skips_final_pause() {
        let config = BroadcastConfig::default().with_retry_max(4);
        assert_eq!(config.max_dial_wait(), Duration::from_millis(60));
        assert_eq!(config.with_retry_max(1).max_dial_wait(), Duration::ZERO);
    }

    #[test]
    fn zero_retries_rejected() {
        let err = BroadcastConfig::default().with_retry_max(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("strict".parse::<CompletionPolicy>().unwrap(), CompletionPolicy::Strict);
        assert_eq!(" Best-Effort ".parse::<CompletionPolicy>().unwrap(), CompletionPolicy::BestEffort);
        assert_eq!("best_effort".parse::<CompletionPolicy>().unwrap(), CompletionPolicy::BestEffort);
        assert!("majority".parse::<CompletionPolicy>().is_err());
        assert_eq!(CompletionPolicy::BestEffort.to_string(), "best-effort");
    }

    #[test]
    fn policy_serde_uses_kebab_case() {
        let json = serde_json::to_string(&CompletionPolicy::BestEffort).unwrap();
        assert_eq!(json, "\"best-effort\"");
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = BroadcastConfig::from_lookup(lookup(&[
            (ENV_RETRY_MAX, "3"),
            (ENV_RETRY_WAIT_MS, "150"),
            (ENV_COMPLETION_POLICY, "best-effort"),
        ]))
        .unwrap();
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.retry_wait, Duration::from_millis(150));
        assert_eq!(config.policy, CompletionPolicy::BestEffort);
    }

    #[test]
    fn lookup_without_keys_is_default() {
        let config = BroadcastConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BroadcastConfig::default());
    }

    #[test]
    fn lookup_rejects_garbage() {
        assert!(BroadcastConfig::from_lookup(lookup(&[(ENV_RETRY_MAX, "ten")])).is_err());
        assert!(BroadcastConfig::from_lookup(lookup(&[(ENV_RETRY_MAX, "0")])).is_err());
        assert!(BroadcastConfig::from_lookup(lookup(&[(ENV_RETRY_WAIT_MS, "-1")])).is_err());
    }
}
