//! Settings for the `meshcast-sim` binary.

use meshcast_protocols::{BroadcastConfig, Error, Result};
use meshcast_tree::DEFAULT_BRANCHING;

pub const ENV_NODES: &str = "MESHCAST_NODES";
pub const ENV_BRANCHING: &str = "MESHCAST_BRANCHING";
pub const ENV_UNREACHABLE: &str = "MESHCAST_UNREACHABLE";

pub const DEFAULT_NODES: usize = 10;

/// Shape of the simulated round plus the protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub nodes: usize,
    pub branching: usize,
    /// Tree positions nobody can dial.
    pub unreachable: Vec<usize>,
    pub broadcast: BroadcastConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_NODES,
            branching: DEFAULT_BRANCHING,
            unreachable: Vec::new(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            broadcast: BroadcastConfig::from_lookup(&lookup)?,
            ..Self::default()
        };

        if let Some(raw) = lookup(ENV_NODES) {
            config.nodes = parse(ENV_NODES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BRANCHING) {
            config.branching = parse(ENV_BRANCHING, &raw)?;
        }
        if let Some(raw) = lookup(ENV_UNREACHABLE) {
            config.unreachable = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse(ENV_UNREACHABLE, s))
                .collect::<Result<_>>()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(Error::Config(format!("{ENV_NODES} must be at least 1")));
        }
        if let Some(&pos) = self.unreachable.iter().find(|&&p| p >= self.nodes) {
            return Err(Error::Config(format!(
                "{ENV_UNREACHABLE}: position {pos} outside a {}-node tree",
                self.nodes
            )));
        }
        self.broadcast.validate()
    }
}

fn parse(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcast_protocols::CompletionPolicy;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<SimConfig> {
        let map: HashMap<_, _> = pairs.iter().copied().collect();
        SimConfig::from_lookup(|key: &str| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(config(&[]).unwrap(), SimConfig::default());
    }

    #[test]
    fn reads_shape_and_protocol_settings() {
        let sim = config(&[
            ("MESHCAST_NODES", "14"),
            ("MESHCAST_BRANCHING", "3"),
            ("MESHCAST_UNREACHABLE", " 4, 7 ,"),
            ("MESHCAST_COMPLETION_POLICY", "best-effort"),
        ])
        .unwrap();
        assert_eq!(sim.nodes, 14);
        assert_eq!(sim.branching, 3);
        assert_eq!(sim.unreachable, vec![4, 7]);
        assert_eq!(sim.broadcast.policy, CompletionPolicy::BestEffort);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("MESHCAST_NODES", "0")]), Err(Error::Config(_))));
        assert!(matches!(config(&[("MESHCAST_NODES", "many")]), Err(Error::Config(_))));
        assert!(matches!(
            config(&[("MESHCAST_NODES", "3"), ("MESHCAST_UNREACHABLE", "3")]),
            Err(Error::Config(_))
        ));
    }
}
