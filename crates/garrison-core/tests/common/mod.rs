//! In-memory host world for integration tests.
//!
//! Orders are recorded verbatim so tests can assert on issuance counts;
//! the only order with a simulated side effect is `Produce`, which grows
//! the factory queue (that is what landed-order detection watches).

// Each test binary uses a subset of the fixture.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use garrison_host::{
    AuthorityId, BlueprintId, Bootstrap, Clock, Domain, FactoryInfo, Formation, GroupOps, Markers,
    Order, OrderSink, PlatoonId, Position, Probe, Spatial, StructureInfo, Tier, UnitId, UnitInfo,
};

#[derive(Debug, Clone)]
pub struct SimFactory {
    pub position: Position,
    pub authority: AuthorityId,
    pub domain: Domain,
    pub busy: bool,
    pub upgrading: bool,
    pub paused: bool,
    pub queue: Vec<BlueprintId>,
}

#[derive(Debug, Clone)]
pub struct SimUnit {
    pub position: Position,
    pub authority: AuthorityId,
    pub tier: Tier,
    pub blueprint: BlueprintId,
    pub complete: bool,
    pub building: bool,
    pub engineer: bool,
}

#[derive(Debug, Clone)]
pub struct SimStructure {
    pub blueprint: BlueprintId,
    pub position: Position,
    pub authority: AuthorityId,
    pub facing: f32,
    pub health_fraction: f32,
}

#[derive(Default)]
struct SimState {
    time: f64,
    markers: HashMap<String, Position>,
    factories: BTreeMap<UnitId, SimFactory>,
    units: BTreeMap<UnitId, SimUnit>,
    structures: BTreeMap<UnitId, SimStructure>,
    reclaim: BTreeMap<UnitId, Position>,
    platoons: Vec<(String, Vec<UnitId>)>,
}

/// Deterministic in-memory world.
#[derive(Default)]
pub struct SimHost {
    state: Mutex<SimState>,
    orders: Mutex<Vec<(Vec<UnitId>, Order)>>,
    next_id: AtomicU64,
}

impl SimHost {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let host = Self::default();
        host.next_id.store(1, Ordering::SeqCst);
        host
    }

    fn fresh_id(&self) -> UnitId {
        UnitId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn set_marker(&self, name: &str, pos: Position) {
        self.state.lock().unwrap().markers.insert(name.to_string(), pos);
    }

    pub fn clear_marker(&self, name: &str) {
        self.state.lock().unwrap().markers.remove(name);
    }

    pub fn advance_time(&self, secs: f64) {
        self.state.lock().unwrap().time += secs;
    }

    pub fn add_factory(&self, authority: AuthorityId, pos: Position, domain: Domain) -> UnitId {
        let id = self.fresh_id();
        self.state.lock().unwrap().factories.insert(
            id,
            SimFactory {
                position: pos,
                authority,
                domain,
                busy: false,
                upgrading: false,
                paused: false,
                queue: Vec::new(),
            },
        );
        id
    }

    pub fn add_engineer(
        &self,
        authority: AuthorityId,
        pos: Position,
        tier: Tier,
        blueprint: &str,
    ) -> UnitId {
        let id = self.fresh_id();
        self.state.lock().unwrap().units.insert(
            id,
            SimUnit {
                position: pos,
                authority,
                tier,
                blueprint: BlueprintId::new(blueprint),
                complete: true,
                building: false,
                engineer: true,
            },
        );
        id
    }

    pub fn add_unit(
        &self,
        authority: AuthorityId,
        pos: Position,
        tier: Tier,
        blueprint: &str,
    ) -> UnitId {
        let id = self.add_engineer(authority, pos, tier, blueprint);
        self.state.lock().unwrap().units.get_mut(&id).unwrap().engineer = false;
        id
    }

    pub fn add_structure(
        &self,
        authority: AuthorityId,
        pos: Position,
        blueprint: &str,
        health_fraction: f32,
    ) -> UnitId {
        let id = self.fresh_id();
        self.state.lock().unwrap().structures.insert(
            id,
            SimStructure {
                blueprint: BlueprintId::new(blueprint),
                position: pos,
                authority,
                facing: 0.0,
                health_fraction,
            },
        );
        id
    }

    pub fn add_reclaimable(&self, pos: Position) -> UnitId {
        let id = self.fresh_id();
        self.state.lock().unwrap().reclaim.insert(id, pos);
        id
    }

    pub fn remove_reclaimable(&self, id: UnitId) {
        self.state.lock().unwrap().reclaim.remove(&id);
    }

    pub fn kill_factory(&self, id: UnitId) {
        self.state.lock().unwrap().factories.remove(&id);
    }

    pub fn kill_unit(&self, id: UnitId) {
        self.state.lock().unwrap().units.remove(&id);
    }

    pub fn kill_structure(&self, id: UnitId) {
        self.state.lock().unwrap().structures.remove(&id);
    }

    pub fn damage_structure(&self, id: UnitId, health_fraction: f32) {
        if let Some(s) = self.state.lock().unwrap().structures.get_mut(&id) {
            s.health_fraction = health_fraction;
        }
    }

    pub fn factory_queue_len(&self, id: UnitId) -> usize {
        self.state
            .lock()
            .unwrap()
            .factories
            .get(&id)
            .map(|f| f.queue.len())
            .unwrap_or(0)
    }

    /// Pop the head of a factory's queue and roll the finished engineer off
    /// next to it. Tier is derived from the blueprint name suffix.
    pub fn complete_production(&self, factory: UnitId) -> Option<UnitId> {
        let (blueprint, pos, authority) = {
            let mut state = self.state.lock().unwrap();
            let f = state.factories.get_mut(&factory)?;
            if f.queue.is_empty() {
                return None;
            }
            let bp = f.queue.remove(0);
            (bp, f.position, f.authority)
        };
        let tier = tier_for(&blueprint);
        Some(self.add_engineer(authority, pos, tier, &blueprint.0))
    }

    /// Drop the head of a factory's queue without rolling a unit off,
    /// simulating an order the engine silently lost.
    pub fn drop_queued(&self, factory: UnitId) {
        if let Some(f) = self.state.lock().unwrap().factories.get_mut(&factory) {
            if !f.queue.is_empty() {
                f.queue.remove(0);
            }
        }
    }

    pub fn set_unit_complete(&self, id: UnitId, complete: bool) {
        if let Some(u) = self.state.lock().unwrap().units.get_mut(&id) {
            u.complete = complete;
        }
    }

    pub fn set_factory_busy(&self, id: UnitId, busy: bool) {
        if let Some(f) = self.state.lock().unwrap().factories.get_mut(&id) {
            f.busy = busy;
        }
    }

    /// Every order issued so far against `unit`.
    pub fn orders_for(&self, unit: UnitId) -> Vec<Order> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .filter(|(units, _)| units.contains(&unit))
            .map(|(_, order)| order.clone())
            .collect()
    }

    pub fn order_count(&self, unit: UnitId) -> usize {
        self.orders_for(unit).len()
    }

    pub fn clear_order_log(&self) {
        self.orders.lock().unwrap().clear();
    }

    pub fn platoons(&self) -> Vec<(String, Vec<UnitId>)> {
        self.state.lock().unwrap().platoons.clone()
    }
}

fn tier_for(blueprint: &BlueprintId) -> Tier {
    match blueprint.0.as_str() {
        "engineer_t2" => Tier::Tech2,
        "engineer_t3" => Tier::Tech3,
        "engineer_heavy" => Tier::Heavy,
        _ => Tier::Tech1,
    }
}

impl Spatial for SimHost {
    fn factories_near(&self, authority: AuthorityId, pos: Position, radius: f32) -> Vec<UnitId> {
        self.state
            .lock()
            .unwrap()
            .factories
            .iter()
            .filter(|(_, f)| f.authority == authority && f.position.within(&pos, radius))
            .map(|(id, _)| *id)
            .collect()
    }

    fn engineers_near(&self, authority: AuthorityId, pos: Position, radius: f32) -> Vec<UnitId> {
        self.state
            .lock()
            .unwrap()
            .units
            .iter()
            .filter(|(_, u)| {
                u.engineer && u.authority == authority && u.position.within(&pos, radius)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn structures_near(
        &self,
        authority: AuthorityId,
        pos: Position,
        radius: f32,
    ) -> Vec<StructureInfo> {
        self.state
            .lock()
            .unwrap()
            .structures
            .iter()
            .filter(|(_, s)| s.authority == authority && s.position.within(&pos, radius))
            .map(|(id, s)| StructureInfo {
                id: *id,
                blueprint: s.blueprint.clone(),
                position: s.position,
                facing: s.facing,
                health_fraction: s.health_fraction,
            })
            .collect()
    }

    fn completed_of_at(&self, blueprint: &BlueprintId, pos: Position, radius: f32) -> Vec<UnitId> {
        let state = self.state.lock().unwrap();
        let structures = state
            .structures
            .iter()
            .filter(|(_, s)| s.blueprint == *blueprint && s.position.within(&pos, radius))
            .map(|(id, _)| *id);
        let units = state
            .units
            .iter()
            .filter(|(_, u)| u.complete && u.blueprint == *blueprint && u.position.within(&pos, radius))
            .map(|(id, _)| *id);
        structures.chain(units).collect()
    }

    fn reclaimables_near(&self, pos: Position, radius: f32) -> Vec<UnitId> {
        self.state
            .lock()
            .unwrap()
            .reclaim
            .iter()
            .filter(|(_, p)| p.within(&pos, radius))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Probe for SimHost {
    fn factory(&self, id: UnitId) -> Option<FactoryInfo> {
        self.state.lock().unwrap().factories.get(&id).map(|f| FactoryInfo {
            position: f.position,
            authority: f.authority,
            domain: f.domain,
            busy: f.busy,
            upgrading: f.upgrading,
            paused: f.paused,
            queue_len: f.queue.len(),
        })
    }

    fn unit(&self, id: UnitId) -> Option<UnitInfo> {
        self.state.lock().unwrap().units.get(&id).map(|u| UnitInfo {
            position: u.position,
            authority: u.authority,
            tier: u.tier,
            complete: u.complete,
            building: u.building,
        })
    }

}

impl OrderSink for SimHost {
    fn issue(&self, units: &[UnitId], order: Order) {
        if let Order::Produce(blueprint) = &order {
            let mut state = self.state.lock().unwrap();
            for unit in units {
                if let Some(f) = state.factories.get_mut(unit) {
                    if !f.paused && !f.upgrading {
                        f.queue.push(blueprint.clone());
                    }
                }
            }
        }
        self.orders.lock().unwrap().push((units.to_vec(), order));
    }
}

impl GroupOps for SimHost {
    fn form_platoon(&self, name: &str, members: &[UnitId], _formation: Formation) -> PlatoonId {
        let mut state = self.state.lock().unwrap();
        state.platoons.push((name.to_string(), members.to_vec()));
        PlatoonId(state.platoons.len() as u64)
    }
}

impl Bootstrap for SimHost {
    fn spawn_unit(
        &self,
        authority: AuthorityId,
        blueprint: &BlueprintId,
        pos: Position,
    ) -> Option<UnitId> {
        Some(self.add_engineer(authority, pos, tier_for(blueprint), &blueprint.0))
    }
}

impl Markers for SimHost {
    fn resolve_marker(&self, name: &str) -> Option<Position> {
        self.state.lock().unwrap().markers.get(name).copied()
    }
}

impl Clock for SimHost {
    fn game_time(&self) -> f64 {
        self.state.lock().unwrap().time
    }
}
