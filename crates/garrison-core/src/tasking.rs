//! Task scheduler: continuous reconciliation of the worker roster across
//! competing categories.
//!
//! Precedence is fixed: Build > Assist > Experimental > Idle. Floors are
//! met first (pulling only from Idle, only while the category has demand),
//! caps are topped up afterwards, and anything unclaimed stays Idle. An
//! agent whose assignment did not change is never reissued orders; only a
//! category change clears and reorders it.

use std::collections::BTreeMap;
use std::sync::Arc;

use garrison_host::{AuthorityId, BlueprintId, Host, Order, Position, Tier, UnitId};
use tracing::{debug, info, warn};

use crate::config::{ExperimentalConfig, TaskingConfig};
use crate::handoff::{self, AttackBehavior};
use crate::rebuild::RebuildPlan;
use crate::rng::SplitMix64;

/// A bucket of work. `Idle` is the reserve pool; it has no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Build,
    Assist,
    Experimental,
    Idle,
}

/// Fixed precedence of the active categories, highest first.
const PRECEDENCE: [Category; 3] = [Category::Build, Category::Assist, Category::Experimental];

/// How close a completed experimental must stand to the site to count.
const EXP_MATCH_RADIUS: f32 = 10.0;

/// What an idle agent is currently busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdleTask {
    Repair(UnitId),
    Reclaim(UnitId),
    Patrol,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExperimentalPhase {
    Idle,
    Building { lead: UnitId },
    Cooldown { until: f64 },
}

/// Continuous-reconciliation scheduler for one base's worker roster.
pub struct TaskScheduler {
    authority: AuthorityId,
    base: Position,
    config: TaskingConfig,
    plan: RebuildPlan,
    attack: Option<Arc<dyn AttackBehavior>>,

    assignments: BTreeMap<UnitId, Category>,
    build_slots: BTreeMap<UnitId, usize>,
    assist_targets: BTreeMap<UnitId, UnitId>,
    guard_targets: BTreeMap<UnitId, UnitId>,
    idle_tasks: BTreeMap<UnitId, IdleTask>,

    experimental: ExperimentalPhase,
    platoons_formed: u64,
    rng: SplitMix64,
}

impl TaskScheduler {
    pub fn new(
        authority: AuthorityId,
        base: Position,
        config: TaskingConfig,
        plan: RebuildPlan,
        attack: Option<Arc<dyn AttackBehavior>>,
    ) -> Self {
        let seed = config.seed;
        Self {
            authority,
            base,
            config,
            plan,
            attack,
            assignments: BTreeMap::new(),
            build_slots: BTreeMap::new(),
            assist_targets: BTreeMap::new(),
            guard_targets: BTreeMap::new(),
            idle_tasks: BTreeMap::new(),
            experimental: ExperimentalPhase::Idle,
            platoons_formed: 0,
            rng: SplitMix64::new(seed),
        }
    }

    pub fn assignment(&self, unit: UnitId) -> Option<Category> {
        self.assignments.get(&unit).copied()
    }

    pub fn count(&self, category: Category) -> usize {
        self.assignments
            .values()
            .filter(|c| **c == category)
            .count()
    }

    /// One reconciliation pass over the current roster.
    pub fn tick<H: Host>(&mut self, host: &H, roster: &[(UnitId, Tier)]) {
        let tiers = self.snapshot(host, roster);
        let now = host.game_time();

        if let ExperimentalPhase::Cooldown { until } = self.experimental {
            if now >= until {
                self.experimental = ExperimentalPhase::Idle;
            }
        }

        let missing_slots = self.plan.missing(host);
        let assist_pool = self.assist_candidates(host);
        let exp_site = self.experimental_site(host);

        let build_demand = !missing_slots.is_empty();
        let assist_demand = !assist_pool.is_empty();
        let exp_demand = exp_site.is_some()
            && matches!(
                self.experimental,
                ExperimentalPhase::Idle | ExperimentalPhase::Building { .. }
            );

        let demand = |category: Category| match category {
            Category::Build => build_demand,
            Category::Assist => assist_demand,
            Category::Experimental => exp_demand,
            Category::Idle => true,
        };

        self.floor_pass(host, &tiers, &demand);
        if self.floors_met(&demand) {
            self.cap_pass(host, &tiers, &demand);
        }

        self.act_build(host, &missing_slots);
        self.act_assist(host, &assist_pool);
        self.act_experimental(host, exp_site, now);
        self.act_idle(host);
    }

    /// Forget every assignment and auxiliary state. Used at shutdown.
    pub fn clear(&mut self) {
        self.assignments.clear();
        self.build_slots.clear();
        self.assist_targets.clear();
        self.guard_targets.clear();
        self.idle_tasks.clear();
    }

    /// Keep only owned, alive, complete agents; newcomers default to Idle.
    /// Returns the tier of every kept agent.
    fn snapshot<H: Host>(&mut self, host: &H, roster: &[(UnitId, Tier)]) -> BTreeMap<UnitId, Tier> {
        let mut tiers = BTreeMap::new();
        for (unit, tier) in roster {
            let alive = host
                .unit(*unit)
                .map(|info| info.complete && info.authority == self.authority)
                .unwrap_or(false);
            if alive {
                tiers.insert(*unit, *tier);
                self.assignments.entry(*unit).or_insert(Category::Idle);
            }
        }
        let keep = |unit: &UnitId| tiers.contains_key(unit);
        self.assignments.retain(|u, _| keep(u));
        self.build_slots.retain(|u, _| keep(u));
        self.assist_targets.retain(|u, _| keep(u));
        self.guard_targets.retain(|u, _| keep(u));
        self.idle_tasks.retain(|u, _| keep(u));
        tiers
    }

    /// Factories of this authority actively producing near the base, plus
    /// an experimental lead mid-construction.
    fn assist_candidates<H: Host>(&self, host: &H) -> Vec<UnitId> {
        let mut pool: Vec<UnitId> = host
            .factories_near(self.authority, self.base, self.config.assist_radius)
            .into_iter()
            .filter(|f| {
                host.factory(*f)
                    .map(|info| info.busy || info.queue_len > 0)
                    .unwrap_or(false)
            })
            .collect();
        if let ExperimentalPhase::Building { lead } = self.experimental {
            if host.unit(lead).is_some() {
                pool.push(lead);
            }
        }
        pool
    }

    /// Resolved experimental build site, if one is configured and its
    /// marker resolves. Unresolvable is a demand gate, not an error.
    fn experimental_site<H: Host>(&self, host: &H) -> Option<Position> {
        let exp = self.config.experimental.as_ref()?;
        host.resolve_marker(&exp.marker)
    }

    fn floor(&self, category: Category) -> usize {
        let q = &self.config.quotas;
        match category {
            Category::Build => q.build_floor,
            Category::Assist => q.assist_floor,
            Category::Experimental => q.experimental_floor,
            Category::Idle => q.idle_floor,
        }
    }

    fn cap(&self, category: Category) -> usize {
        let q = &self.config.quotas;
        match category {
            Category::Build => q.build_cap,
            Category::Assist => q.assist_cap,
            Category::Experimental => q.experimental_cap,
            Category::Idle => usize::MAX,
        }
    }

    /// Idle agents eligible for `category`, stable order. Experimental work
    /// is restricted to heavy-tier classes.
    fn idle_eligible(&self, tiers: &BTreeMap<UnitId, Tier>, category: Category) -> Vec<UnitId> {
        self.assignments
            .iter()
            .filter(|(_, c)| **c == Category::Idle)
            .map(|(u, _)| *u)
            .filter(|u| category != Category::Experimental || tiers.get(u) == Some(&Tier::Heavy))
            .collect()
    }

    /// Meet floors in precedence order, pulling only from Idle. Floors are
    /// never met by stealing from other active categories.
    fn floor_pass<H: Host>(
        &mut self,
        host: &H,
        tiers: &BTreeMap<UnitId, Tier>,
        demand: &dyn Fn(Category) -> bool,
    ) {
        for category in PRECEDENCE {
            if !demand(category) {
                continue;
            }
            let shortfall = self.floor(category).saturating_sub(self.count(category));
            if shortfall == 0 {
                continue;
            }
            for unit in self.idle_eligible(tiers, category).into_iter().take(shortfall) {
                self.assign(host, unit, category);
            }
        }
    }

    /// All demanded floors currently satisfied, including the idle reserve.
    fn floors_met(&self, demand: &dyn Fn(Category) -> bool) -> bool {
        PRECEDENCE
            .into_iter()
            .filter(|c| demand(*c))
            .all(|c| self.count(c) >= self.floor(c))
            && self.count(Category::Idle) >= self.floor(Category::Idle)
    }

    /// Top categories up to their caps while demand holds, in precedence
    /// order, keeping the idle reserve intact.
    fn cap_pass<H: Host>(
        &mut self,
        host: &H,
        tiers: &BTreeMap<UnitId, Tier>,
        demand: &dyn Fn(Category) -> bool,
    ) {
        for category in PRECEDENCE {
            if !demand(category) {
                continue;
            }
            let idle_spare = self
                .count(Category::Idle)
                .saturating_sub(self.floor(Category::Idle));
            if idle_spare == 0 {
                return;
            }
            let room = self.cap(category).saturating_sub(self.count(category));
            let take = room.min(idle_spare);
            for unit in self.idle_eligible(tiers, category).into_iter().take(take) {
                self.assign(host, unit, category);
            }
        }
    }

    /// Move an agent between categories. A no-op when the assignment is
    /// unchanged; a real change clears the agent's orders and sub-state so
    /// the category action can issue fresh ones.
    fn assign<H: Host>(&mut self, host: &H, unit: UnitId, category: Category) {
        if self.assignments.get(&unit) == Some(&category) {
            return;
        }
        self.build_slots.remove(&unit);
        self.assist_targets.remove(&unit);
        self.guard_targets.remove(&unit);
        self.idle_tasks.remove(&unit);
        host.issue(&[unit], Order::ClearOrders);
        debug!(unit = %unit, ?category, "Reassigned");
        self.assignments.insert(unit, category);
    }

    fn members(&self, category: Category) -> Vec<UnitId> {
        self.assignments
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(u, _)| *u)
            .collect()
    }

    /// Build agents drive the rebuild plan: one open slot per agent.
    fn act_build<H: Host>(&mut self, host: &H, missing: &[usize]) {
        // Slots whose structure reappeared are complete for now; free the
        // agents that were on them.
        let done: Vec<UnitId> = self
            .build_slots
            .iter()
            .filter(|(_, slot)| !missing.contains(slot))
            .map(|(u, _)| *u)
            .collect();
        for unit in done {
            self.build_slots.remove(&unit);
        }

        for unit in self.members(Category::Build) {
            if self.build_slots.contains_key(&unit) {
                continue;
            }
            let claimed: Vec<usize> = self.build_slots.values().copied().collect();
            let open = missing.iter().copied().find(|s| !claimed.contains(s));
            match open.and_then(|s| self.plan.slot(s).cloned().map(|slot| (s, slot))) {
                Some((index, slot)) => {
                    host.issue(
                        &[unit],
                        Order::BuildAt {
                            blueprint: slot.blueprint,
                            position: slot.position,
                            facing: slot.facing,
                        },
                    );
                    self.build_slots.insert(unit, index);
                }
                None => {
                    debug!(unit = %unit, "No open rebuild slot; demoting to idle");
                    self.assign(host, unit, Category::Idle);
                }
            }
        }
    }

    /// Assist agents guard the least-loaded active target; load-balanced by
    /// current guard count, not proximity.
    fn act_assist<H: Host>(&mut self, host: &H, pool: &[UnitId]) {
        for unit in self.members(Category::Assist) {
            if let Some(&target) = self.assist_targets.get(&unit) {
                if pool.contains(&target) {
                    continue;
                }
                self.assist_targets.remove(&unit);
            }

            let least_loaded = pool
                .iter()
                .copied()
                .min_by_key(|t| {
                    let load = self.assist_targets.values().filter(|x| *x == t).count();
                    (load, *t)
                });
            match least_loaded {
                Some(target) => {
                    host.issue(&[unit], Order::Guard(target));
                    self.assist_targets.insert(unit, target);
                }
                None => {
                    debug!(unit = %unit, "No assist target; demoting to idle");
                    self.assign(host, unit, Category::Idle);
                }
            }
        }
    }

    /// Single-lead experimental construction with guards, then handoff and
    /// cooldown.
    fn act_experimental<H: Host>(&mut self, host: &H, site: Option<Position>, now: f64) {
        let members = self.members(Category::Experimental);

        let Some(site) = site else {
            // Configured but unresolvable (or not configured at all):
            // nobody can work here this tick.
            for unit in members {
                debug!(unit = %unit, "Experimental site unavailable; demoting to idle");
                self.assign(host, unit, Category::Idle);
            }
            return;
        };
        let Some(exp) = self.config.experimental.clone() else {
            return;
        };
        let blueprint = BlueprintId::new(exp.blueprint.clone());

        match self.experimental {
            ExperimentalPhase::Cooldown { .. } => {
                for unit in members {
                    self.assign(host, unit, Category::Idle);
                }
            }
            ExperimentalPhase::Idle => {
                let Some(lead) = members.first().copied() else {
                    return;
                };
                host.issue(
                    &[lead],
                    Order::BuildAt {
                        blueprint: blueprint.clone(),
                        position: site,
                        facing: 0.0,
                    },
                );
                info!(lead = %lead, blueprint = %blueprint, "Experimental construction started");
                self.experimental = ExperimentalPhase::Building { lead };
                for unit in members.into_iter().skip(1) {
                    self.guard(host, unit, lead);
                }
            }
            ExperimentalPhase::Building { lead } => {
                let completed = host.completed_of_at(&blueprint, site, EXP_MATCH_RADIUS);
                if let Some(finished) = completed.first().copied() {
                    self.finish_experimental(host, finished, &exp, now);
                    return;
                }

                let lead = if host.unit(lead).is_some() && members.contains(&lead) {
                    lead
                } else {
                    // Lead died or was pulled; promote a replacement and
                    // restart its construction order.
                    let Some(next) = members.first().copied() else {
                        return;
                    };
                    host.issue(
                        &[next],
                        Order::BuildAt {
                            blueprint: blueprint.clone(),
                            position: site,
                            facing: 0.0,
                        },
                    );
                    self.guard_targets.remove(&next);
                    self.experimental = ExperimentalPhase::Building { lead: next };
                    next
                };

                for unit in members {
                    if unit != lead {
                        self.guard(host, unit, lead);
                    }
                }
            }
        }
    }

    fn guard<H: Host>(&mut self, host: &H, unit: UnitId, target: UnitId) {
        if self.guard_targets.get(&unit) == Some(&target) {
            return;
        }
        host.issue(&[unit], Order::Guard(target));
        self.guard_targets.insert(unit, target);
    }

    fn finish_experimental<H: Host>(
        &mut self,
        host: &H,
        finished: UnitId,
        exp: &ExperimentalConfig,
        now: f64,
    ) {
        self.platoons_formed += 1;
        let name = format!("experimental-{}", self.platoons_formed);

        if let Some(attack) = self.attack.clone() {
            handoff::hand_off(
                host,
                &name,
                &[finished],
                garrison_host::Formation::Attack,
                attack.as_ref(),
                exp.payload.clone(),
            );
        } else {
            warn!(unit = %finished, "Experimental finished with no attack behavior configured");
        }

        self.experimental = ExperimentalPhase::Cooldown {
            until: now + exp.cooldown_secs,
        };
        for unit in self.members(Category::Experimental) {
            self.assign(host, unit, Category::Idle);
        }
    }

    /// Idle micro-routine: repair first, else reclaim, else patrol. Orders
    /// are only reissued when the chosen task changes.
    fn act_idle<H: Host>(&mut self, host: &H) {
        for unit in self.members(Category::Idle) {
            let pos = match host.unit(unit) {
                Some(info) => info.position,
                None => continue,
            };

            let damaged = host
                .structures_near(self.authority, pos, self.config.repair_radius)
                .into_iter()
                .find(|s| s.health_fraction < 1.0)
                .map(|s| s.id);
            let task = if let Some(target) = damaged {
                IdleTask::Repair(target)
            } else if let Some(target) = host
                .reclaimables_near(pos, self.config.reclaim_radius)
                .first()
                .copied()
            {
                IdleTask::Reclaim(target)
            } else {
                IdleTask::Patrol
            };

            if self.idle_tasks.get(&unit) == Some(&task) {
                continue;
            }
            match task {
                IdleTask::Repair(target) => host.issue(&[unit], Order::Repair(target)),
                IdleTask::Reclaim(target) => host.issue(&[unit], Order::Reclaim(target)),
                IdleTask::Patrol => {
                    let point = self.patrol_point();
                    host.issue(&[unit], Order::Move(point));
                }
            }
            self.idle_tasks.insert(unit, task);
        }
    }

    /// Random point within the patrol radius of the base, on the ground
    /// plane.
    fn patrol_point(&mut self) -> Position {
        let radius = self.config.patrol_radius;
        let angle = self.rng.next_f32_unit() * core::f32::consts::TAU;
        let dist = self.rng.next_f32_unit().sqrt() * radius;
        Position::new(
            self.base.x + angle.cos() * dist,
            self.base.y,
            self.base.z + angle.sin() * dist,
        )
    }
}

