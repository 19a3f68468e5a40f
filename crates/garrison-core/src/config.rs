//! Controller configuration, loaded from a scenario YAML file or built in
//! code by the embedding script.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use garrison_host::Tier;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Full configuration of one automated base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Named marker the base is anchored at. Unresolvable at construction
    /// time is a fatal configuration error.
    pub base_marker: String,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub engineers: EngineerConfig,

    #[serde(default)]
    pub tasking: TaskingConfig,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            base_marker: "BASE".to_string(),
            allocator: AllocatorConfig::default(),
            engineers: EngineerConfig::default(),
            tasking: TaskingConfig::default(),
        }
    }
}

impl BaseConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would panic or wedge the tick loops.
    pub fn validate(&self) -> Result<(), CoreError> {
        let intervals = [
            ("allocator", self.allocator.tick_secs),
            ("engineers", self.engineers.tick_secs),
            ("tasking", self.tasking.tick_secs),
        ];
        for (section, secs) in intervals {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "{section}.tick_secs must be positive, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

/// Factory allocator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Reconciliation interval in game seconds.
    #[serde(default = "default_allocator_tick")]
    pub tick_secs: f64,

    /// Allow a higher-priority request to steal factories from a
    /// strictly-lower-priority holder. Off by default.
    #[serde(default)]
    pub preemption: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_allocator_tick(),
            preemption: false,
        }
    }
}

/// Engineer pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineerConfig {
    /// Target alive headcount per tier.
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<Tier, usize>,

    /// Blueprint produced per tier.
    #[serde(default = "default_blueprints")]
    pub blueprints: BTreeMap<Tier, String>,

    /// Lease priority; higher wins.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Desired factory count on the lease. 0 means "all available".
    #[serde(default)]
    pub want: usize,

    /// Search radius of the lease around the base anchor.
    #[serde(default = "default_lease_radius")]
    pub lease_radius: f32,

    /// Radius around the base/factories in which roll-offs are claimed.
    #[serde(default = "default_collect_radius")]
    pub collect_radius: f32,

    /// Spawn the full target roster instantly at start, bypassing
    /// production. Scenario bootstrapping only.
    #[serde(default)]
    pub instant_bootstrap: bool,

    /// Reconciliation interval in game seconds.
    #[serde(default = "default_pool_tick")]
    pub tick_secs: f64,

    /// No progress for this long while leased factories sit idle resets the
    /// assumed in-flight state.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: f64,
}

impl Default for EngineerConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            blueprints: default_blueprints(),
            priority: default_priority(),
            want: 0,
            lease_radius: default_lease_radius(),
            collect_radius: default_collect_radius(),
            instant_bootstrap: false,
            tick_secs: default_pool_tick(),
            stall_timeout_secs: default_stall_timeout(),
        }
    }
}

/// Task scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskingConfig {
    /// Reconciliation interval in game seconds.
    #[serde(default = "default_tasking_tick")]
    pub tick_secs: f64,

    #[serde(default)]
    pub quotas: Quotas,

    /// Radius around the base used to capture the rebuild template.
    #[serde(default = "default_capture_radius")]
    pub rebuild_capture_radius: f32,

    /// Radius around the base in which assist targets are searched.
    #[serde(default = "default_assist_radius")]
    pub assist_radius: f32,

    /// Idle micro-routine radii.
    #[serde(default = "default_repair_radius")]
    pub repair_radius: f32,
    #[serde(default = "default_reclaim_radius")]
    pub reclaim_radius: f32,
    #[serde(default = "default_patrol_radius")]
    pub patrol_radius: f32,

    /// Experimental construction; absent means the category never has
    /// demand.
    #[serde(default)]
    pub experimental: Option<ExperimentalConfig>,

    /// Seed for the idle patrol RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TaskingConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tasking_tick(),
            quotas: Quotas::default(),
            rebuild_capture_radius: default_capture_radius(),
            assist_radius: default_assist_radius(),
            repair_radius: default_repair_radius(),
            reclaim_radius: default_reclaim_radius(),
            patrol_radius: default_patrol_radius(),
            experimental: None,
            seed: default_seed(),
        }
    }
}

/// Floor/cap quotas per category. Idle has no cap; it is the reserve pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Quotas {
    #[serde(default = "default_build_floor")]
    pub build_floor: usize,
    #[serde(default = "default_build_cap")]
    pub build_cap: usize,
    #[serde(default = "default_assist_floor")]
    pub assist_floor: usize,
    #[serde(default = "default_assist_cap")]
    pub assist_cap: usize,
    #[serde(default)]
    pub experimental_floor: usize,
    #[serde(default = "default_experimental_cap")]
    pub experimental_cap: usize,
    /// Guaranteed minimum of idle agents kept back for repair/reclaim
    /// coverage.
    #[serde(default)]
    pub idle_floor: usize,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            build_floor: default_build_floor(),
            build_cap: default_build_cap(),
            assist_floor: default_assist_floor(),
            assist_cap: default_assist_cap(),
            experimental_floor: 0,
            experimental_cap: default_experimental_cap(),
            idle_floor: 0,
        }
    }
}

/// One experimental construction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentalConfig {
    pub blueprint: String,

    /// Named marker the experimental is built at.
    pub marker: String,

    /// Cooldown measured from last completion, in game seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: f64,

    /// Free-form payload forwarded to the attack behavior at handoff.
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_allocator_tick() -> f64 {
    0.5
}
fn default_pool_tick() -> f64 {
    2.0
}
fn default_tasking_tick() -> f64 {
    1.0
}
fn default_priority() -> i32 {
    100
}
fn default_targets() -> BTreeMap<Tier, usize> {
    BTreeMap::from([(Tier::Tech1, 4)])
}
fn default_blueprints() -> BTreeMap<Tier, String> {
    BTreeMap::from([
        (Tier::Tech1, "engineer_t1".to_string()),
        (Tier::Tech2, "engineer_t2".to_string()),
        (Tier::Tech3, "engineer_t3".to_string()),
        (Tier::Heavy, "engineer_heavy".to_string()),
    ])
}
fn default_lease_radius() -> f32 {
    120.0
}
fn default_collect_radius() -> f32 {
    40.0
}
fn default_stall_timeout() -> f64 {
    90.0
}
fn default_capture_radius() -> f32 {
    80.0
}
fn default_assist_radius() -> f32 {
    100.0
}
fn default_repair_radius() -> f32 {
    60.0
}
fn default_reclaim_radius() -> f32 {
    60.0
}
fn default_patrol_radius() -> f32 {
    30.0
}
fn default_seed() -> u64 {
    0x6A77
}
fn default_build_floor() -> usize {
    1
}
fn default_build_cap() -> usize {
    4
}
fn default_assist_floor() -> usize {
    1
}
fn default_assist_cap() -> usize {
    4
}
fn default_experimental_cap() -> usize {
    3
}
fn default_cooldown() -> f64 {
    300.0
}
