//! Engineer pool: keeps a live worker roster at its configured per-tier
//! targets, producing replacements through a factory lease.
//!
//! The controller cycles `{no lease} -> {lease requested} -> {building}
//! -> {lease returned}` as the deficit opens and closes. Order issuance has
//! no synchronous result, so a landed production order is detected by the
//! factory's pending-queue length growing; that adapter stays here at the
//! boundary and never leaks into scheduling decisions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use garrison_host::{
    AuthorityId, BlueprintId, Domain, DomainFilter, Host, Order, Position, Tier, UnitId,
};
use tracing::{debug, info, warn};

use crate::allocator::{Anchor, FactoryAllocator, LeaseEvents, LeaseSpec, RequestId, RevokeReason};
use crate::config::EngineerConfig;
use crate::error::CoreError;
use crate::ownership::{OwnerId, OwnershipLedger};

/// Shared counters observable by the embedding scenario and by tests.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub leases_completed: AtomicUsize,
    pub factories_granted: AtomicUsize,
    pub factories_revoked: AtomicUsize,
}

struct PoolLeaseEvents {
    stats: Arc<PoolStats>,
}

impl LeaseEvents for PoolLeaseEvents {
    fn on_grant(&mut self, request: RequestId, granted: &[UnitId]) -> Result<()> {
        self.stats
            .factories_granted
            .fetch_add(granted.len(), Ordering::SeqCst);
        debug!(request = %request, count = granted.len(), "Pool lease granted");
        Ok(())
    }

    fn on_update(&mut self, request: RequestId, granted: &[UnitId]) -> Result<()> {
        self.stats
            .factories_granted
            .fetch_add(granted.len(), Ordering::SeqCst);
        debug!(request = %request, count = granted.len(), "Pool lease grew");
        Ok(())
    }

    fn on_revoke(&mut self, request: RequestId, lost: &[UnitId], reason: RevokeReason) -> Result<()> {
        self.stats
            .factories_revoked
            .fetch_add(lost.len(), Ordering::SeqCst);
        debug!(request = %request, count = lost.len(), ?reason, "Pool lease revoked");
        Ok(())
    }

    fn on_complete(&mut self, request: RequestId) -> Result<()> {
        self.stats.leases_completed.fetch_add(1, Ordering::SeqCst);
        debug!(request = %request, "Pool lease complete");
        Ok(())
    }
}

/// Headcount controller for one base.
pub struct EngineerPool {
    authority: AuthorityId,
    owner: OwnerId,
    base: Position,
    config: EngineerConfig,
    allocator: Arc<Mutex<FactoryAllocator>>,
    ledger: Arc<Mutex<OwnershipLedger>>,
    stats: Arc<PoolStats>,

    roster: BTreeMap<UnitId, Tier>,
    in_flight: BTreeMap<Tier, usize>,
    lease: Option<RequestId>,
    rr_cursor: usize,
    last_alive_total: usize,
    last_progress_at: f64,
    stopped: bool,
}

impl EngineerPool {
    /// Construct a pool anchored at `base_marker`. An unresolvable marker is
    /// a fatal configuration error; the caller must not proceed.
    pub fn new<H: Host>(
        host: &H,
        authority: AuthorityId,
        base_marker: &str,
        config: EngineerConfig,
        allocator: Arc<Mutex<FactoryAllocator>>,
        ledger: Arc<Mutex<OwnershipLedger>>,
    ) -> Result<Self, CoreError> {
        let base = host
            .resolve_marker(base_marker)
            .ok_or_else(|| CoreError::UnresolvedMarker(base_marker.to_string()))?;

        let mut pool = Self {
            authority,
            owner: OwnerId::next(),
            base,
            config,
            allocator,
            ledger,
            stats: Arc::new(PoolStats::default()),
            roster: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            lease: None,
            rr_cursor: 0,
            last_alive_total: 0,
            last_progress_at: host.game_time(),
            stopped: false,
        };

        if pool.config.instant_bootstrap {
            pool.bootstrap(host);
        }

        Ok(pool)
    }

    /// Spawn the full target roster directly, bypassing production.
    fn bootstrap<H: Host>(&mut self, host: &H) {
        let targets = self.config.targets.clone();
        for (tier, count) in targets {
            let Some(blueprint) = self.blueprint_for(tier) else {
                continue;
            };
            for _ in 0..count {
                let Some(unit) = host.spawn_unit(self.authority, &blueprint, self.base) else {
                    warn!(?tier, "Bootstrap spawn failed");
                    continue;
                };
                if self.ledger.lock().unwrap().claim(unit, self.owner) {
                    self.roster.insert(unit, tier);
                }
            }
        }
        info!(count = self.roster.len(), "Pool bootstrapped");
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    pub fn lease(&self) -> Option<RequestId> {
        self.lease
    }

    /// Current roster, stable order.
    pub fn roster(&self) -> Vec<(UnitId, Tier)> {
        self.roster.iter().map(|(u, t)| (*u, *t)).collect()
    }

    pub fn alive_count(&self, tier: Tier) -> usize {
        self.roster.values().filter(|t| **t == tier).count()
    }

    /// One reconciliation pass.
    pub fn tick<H: Host>(&mut self, host: &H) {
        if self.stopped {
            return;
        }

        self.sweep_roster(host);
        let mut deficit = self.deficits();
        let total_deficit: usize = deficit.values().sum();

        if total_deficit == 0 {
            if let Some(lease) = self.lease.take() {
                info!("Roster at target; returning lease");
                self.allocator.lock().unwrap().return_lease(lease);
            }
            self.in_flight.clear();
            self.last_alive_total = self.roster.len();
            return;
        }

        self.ensure_lease(host);
        let usable = self.usable_factories(host);

        self.detect_regression(host, &usable);
        self.watch_stall(host, total_deficit, &usable);
        self.queue_production(host, &deficit, &usable);
        self.collect_rolloffs(host, &mut deficit);

        self.last_alive_total = self.roster.len();
    }

    /// Return the lease and release every owned agent. Idempotent; safe on a
    /// never-ticked pool.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(lease) = self.lease.take() {
            self.allocator.lock().unwrap().return_lease(lease);
        }
        self.ledger.lock().unwrap().release_all(self.owner);
        self.roster.clear();
        self.in_flight.clear();
        info!(owner = %self.owner, "Pool stopped");
    }

    /// Drop dead/foreign roster entries in place (lazy cleanup), releasing
    /// their ownership tags.
    fn sweep_roster<H: Host>(&mut self, host: &H) {
        let authority = self.authority;
        let mut dropped = Vec::new();
        self.roster.retain(|unit, _| {
            let keep = host
                .unit(*unit)
                .map(|info| info.authority == authority)
                .unwrap_or(false);
            if !keep {
                dropped.push(*unit);
            }
            keep
        });
        if !dropped.is_empty() {
            let mut ledger = self.ledger.lock().unwrap();
            for unit in &dropped {
                ledger.release(*unit, self.owner);
            }
            debug!(count = dropped.len(), "Dropped dead/foreign agents from roster");
        }
    }

    fn deficits(&self) -> BTreeMap<Tier, usize> {
        self.config
            .targets
            .iter()
            .map(|(tier, target)| {
                let alive = self.alive_count(*tier);
                (*tier, target.saturating_sub(alive))
            })
            .collect()
    }

    fn ensure_lease<H: Host>(&mut self, host: &H) {
        if self.lease.is_some() {
            return;
        }
        let spec = LeaseSpec {
            anchor: Anchor::Position(self.base),
            radius: self.config.lease_radius,
            domain: DomainFilter::Only(Domain::Land),
            quantity: self.config.want,
            priority: self.config.priority,
        };
        let events = Box::new(PoolLeaseEvents {
            stats: self.stats.clone(),
        });
        match self.allocator.lock().unwrap().request_lease(host, spec, events) {
            Ok(id) => {
                debug!(request = %id, "Pool lease requested");
                self.lease = Some(id);
            }
            Err(err) => warn!(error = %err, "Pool lease request failed"),
        }
    }

    /// Granted factories that are alive and currently able to take orders.
    fn usable_factories<H: Host>(&self, host: &H) -> Vec<UnitId> {
        let Some(lease) = self.lease else {
            return Vec::new();
        };
        self.allocator
            .lock()
            .unwrap()
            .granted(lease)
            .into_iter()
            .filter(|f| host.factory(*f).map(|info| info.usable()).unwrap_or(false))
            .collect()
    }

    /// Alive count dropped since last tick: agents died mid-cycle. Resync
    /// the assumed in-flight orders against the factories' real queues
    /// instead of resetting everything, to avoid an order storm.
    fn detect_regression<H: Host>(&mut self, host: &H, usable: &[UnitId]) {
        if self.roster.len() >= self.last_alive_total {
            return;
        }
        let pending: usize = usable
            .iter()
            .filter_map(|f| host.factory(*f))
            .map(|info| info.queue_len)
            .sum();
        let assumed: usize = self.in_flight.values().sum();
        if assumed > pending {
            let mut excess = assumed - pending;
            for count in self.in_flight.values_mut().rev() {
                let cut = (*count).min(excess);
                *count -= cut;
                excess -= cut;
                if excess == 0 {
                    break;
                }
            }
            debug!(assumed, pending, "Regression detected; in-flight resynced");
        }
    }

    /// No progress for too long while leased factories sit idle: assume the
    /// in-flight bookkeeping is wrong and requeue from scratch.
    fn watch_stall<H: Host>(&mut self, host: &H, total_deficit: usize, usable: &[UnitId]) {
        let now = host.game_time();
        if total_deficit == 0 || self.in_flight.values().sum::<usize>() == 0 {
            self.last_progress_at = now;
            return;
        }
        let all_idle = usable
            .iter()
            .filter_map(|f| host.factory(*f))
            .all(|info| info.queue_len == 0);
        if !all_idle || usable.is_empty() {
            return;
        }
        if now - self.last_progress_at > self.config.stall_timeout_secs {
            warn!(
                stalled_secs = now - self.last_progress_at,
                "Production stalled; resetting in-flight state"
            );
            self.in_flight.clear();
            self.last_progress_at = now;
        }
    }

    fn blueprint_for(&self, tier: Tier) -> Option<BlueprintId> {
        self.config
            .blueprints
            .get(&tier)
            .map(|bp| BlueprintId::new(bp.clone()))
    }

    /// Issue production orders for uncovered deficit, round-robin across
    /// usable factories. An order counts as landed only when the factory's
    /// pending queue grows; a full pass with no landing defers to the next
    /// tick.
    fn queue_production<H: Host>(
        &mut self,
        host: &H,
        deficit: &BTreeMap<Tier, usize>,
        usable: &[UnitId],
    ) {
        if usable.is_empty() {
            return;
        }
        for (tier, wanted) in deficit {
            let covered = self.in_flight.get(tier).copied().unwrap_or(0);
            let missing = wanted.saturating_sub(covered);
            if missing == 0 {
                continue;
            }
            let Some(blueprint) = self.blueprint_for(*tier) else {
                warn!(?tier, "No blueprint configured for tier");
                continue;
            };

            for _ in 0..missing {
                if self.issue_landed(host, usable, &blueprint) {
                    *self.in_flight.entry(*tier).or_insert(0) += 1;
                    self.last_progress_at = host.game_time();
                } else {
                    debug!(?tier, "No factory accepted the order; deferring");
                    return;
                }
            }
        }
    }

    /// One round-robin pass; true once some factory's queue grew.
    fn issue_landed<H: Host>(&mut self, host: &H, usable: &[UnitId], blueprint: &BlueprintId) -> bool {
        for _ in 0..usable.len() {
            let factory = usable[self.rr_cursor % usable.len()];
            self.rr_cursor = self.rr_cursor.wrapping_add(1);

            let before = match host.factory(factory) {
                Some(info) => info.queue_len,
                None => continue,
            };
            host.issue(&[factory], Order::Produce(blueprint.clone()));
            let after = match host.factory(factory) {
                Some(info) => info.queue_len,
                None => continue,
            };
            if after > before {
                return true;
            }
        }
        false
    }

    /// Claim newly completed engineers near the base or the leased
    /// factories: untagged only, and only while a deficit remains for their
    /// tier.
    fn collect_rolloffs<H: Host>(&mut self, host: &H, deficit: &mut BTreeMap<Tier, usize>) {
        let mut spots = vec![self.base];
        if let Some(lease) = self.lease {
            for factory in self.allocator.lock().unwrap().granted(lease) {
                if let Some(info) = host.factory(factory) {
                    spots.push(info.position);
                }
            }
        }

        let mut seen = Vec::new();
        for spot in spots {
            for unit in host.engineers_near(self.authority, spot, self.config.collect_radius) {
                if !seen.contains(&unit) {
                    seen.push(unit);
                }
            }
        }

        for unit in seen {
            if self.roster.contains_key(&unit) {
                continue;
            }
            let Some(info) = host.unit(unit) else {
                continue;
            };
            if !info.complete || info.authority != self.authority {
                continue;
            }
            let remaining = deficit.get(&info.tier).copied().unwrap_or(0);
            if remaining == 0 {
                continue;
            }
            if !self.ledger.lock().unwrap().claim(unit, self.owner) {
                continue;
            }

            self.roster.insert(unit, info.tier);
            deficit.insert(info.tier, remaining - 1);
            if let Some(count) = self.in_flight.get_mut(&info.tier) {
                *count = count.saturating_sub(1);
            }
            self.last_progress_at = host.game_time();
            debug!(unit = %unit, tier = ?info.tier, "Claimed roll-off");
        }
    }
}
