use std::collections::BTreeMap;

use tracing::info;

use common::{Error, PolicyConfig, Result};

use crate::{BollingerParams, BollingerPolicy, Policy, ZoneParams, ZonePolicy};

/// Builds a policy instance from its config table.
pub type PolicyConstructor = fn(&PolicyConfig) -> Box<dyn Policy>;

/// Maps policy identifiers to constructors. Resolved once at startup.
pub struct PolicyRegistry {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in policy.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(BollingerPolicy::NAME, build_bollinger);
        registry.register(ZonePolicy::NAME, build_zone);
        registry
    }

    pub fn register(&mut self, name: &str, constructor: PolicyConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Instantiate the policy named by `cfg.policy_type`.
    pub fn build(&self, cfg: &PolicyConfig) -> Result<Box<dyn Policy>> {
        let name = cfg.policy_type.trim().to_lowercase();
        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| Error::UnknownPolicy(cfg.policy_type.clone()))?;
        let policy = constructor(cfg);
        info!(policy = %policy.name(), "Resolved trading policy");
        Ok(policy)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// ─── Policy builders ──────────────────────────────────────────────────────────

fn build_bollinger(cfg: &PolicyConfig) -> Box<dyn Policy> {
    let defaults = BollingerParams::default();
    let min_gradient = cfg.param_f64("min_gradient", defaults.min_gradient);
    Box::new(BollingerPolicy::new(BollingerParams {
        min_gradient,
        sell_gradient: cfg.param_f64("sell_gradient", min_gradient),
        sell_safety_threshold: cfg.param_f64(
            "sell_safety_threshold",
            defaults.sell_safety_threshold,
        ),
    }))
}

fn build_zone(cfg: &PolicyConfig) -> Box<dyn Policy> {
    let defaults = ZoneParams::default();
    Box::new(ZonePolicy::new(ZoneParams {
        zone_height: cfg.param_f64("zone_height", defaults.zone_height),
        zone_threshold: cfg.param_f64("zone_threshold", defaults.zone_threshold),
    }))
}
