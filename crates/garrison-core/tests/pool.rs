mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use garrison_core::{
    AllocatorConfig, EngineerConfig, EngineerPool, FactoryAllocator, OwnershipLedger,
    ResourceRegistry,
};
use garrison_host::{AuthorityId, Domain, Position, Tier, UnitId};

use common::SimHost;

const ME: AuthorityId = AuthorityId(1);
const BASE: Position = Position::new(0.0, 0.0, 0.0);

struct World {
    host: SimHost,
    allocator: Arc<Mutex<FactoryAllocator>>,
    ledger: Arc<Mutex<OwnershipLedger>>,
    factory: UnitId,
}

impl World {
    fn new() -> Self {
        let host = SimHost::new();
        host.set_marker("BASE", BASE);
        let factory = host.add_factory(ME, BASE, Domain::Land);
        let allocator = Arc::new(Mutex::new(FactoryAllocator::new(
            ResourceRegistry::new(ME),
            AllocatorConfig::default(),
        )));
        let ledger = Arc::new(Mutex::new(OwnershipLedger::new()));
        Self {
            host,
            allocator,
            ledger,
            factory,
        }
    }

    fn pool(&self, targets: BTreeMap<Tier, usize>) -> EngineerPool {
        let config = EngineerConfig {
            targets,
            ..EngineerConfig::default()
        };
        EngineerPool::new(
            &self.host,
            ME,
            "BASE",
            config,
            self.allocator.clone(),
            self.ledger.clone(),
        )
        .unwrap()
    }

    /// One pool pass with an allocator pass in between, so a lease requested
    /// this tick is granted before production runs.
    fn cycle(&self, pool: &mut EngineerPool) {
        pool.tick(&self.host);
        self.allocator.lock().unwrap().tick(&self.host);
        pool.tick(&self.host);
    }

    /// Roll every queued order off the factory.
    fn finish_queue(&self) {
        while self.host.complete_production(self.factory).is_some() {}
    }
}

#[test]
fn converges_to_target_without_overshoot() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 3)]));

    world.cycle(&mut pool);
    assert_eq!(world.host.factory_queue_len(world.factory), 3);

    world.finish_queue();
    pool.tick(&world.host);

    assert_eq!(pool.alive_count(Tier::Tech1), 3);
    assert_eq!(world.host.factory_queue_len(world.factory), 0);

    // Converged: the next pass returns the lease and orders nothing more.
    pool.tick(&world.host);
    assert!(pool.lease().is_none());
    assert_eq!(world.host.factory_queue_len(world.factory), 0);
    assert_eq!(pool.stats().leases_completed.load(Ordering::SeqCst), 1);
}

#[test]
fn mixed_tiers_use_their_blueprints() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 2), (Tier::Tech2, 1)]));

    world.cycle(&mut pool);
    assert_eq!(world.host.factory_queue_len(world.factory), 3);

    world.finish_queue();
    pool.tick(&world.host);

    assert_eq!(pool.alive_count(Tier::Tech1), 2);
    assert_eq!(pool.alive_count(Tier::Tech2), 1);
}

#[test]
fn death_reopens_the_cycle() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 2)]));

    world.cycle(&mut pool);
    world.finish_queue();
    pool.tick(&world.host);
    pool.tick(&world.host);
    assert!(pool.lease().is_none());

    let (victim, _) = pool.roster()[0];
    world.host.kill_unit(victim);

    world.cycle(&mut pool);
    assert_eq!(world.host.factory_queue_len(world.factory), 1);

    world.finish_queue();
    pool.tick(&world.host);
    assert_eq!(pool.alive_count(Tier::Tech1), 2);

    pool.tick(&world.host);
    assert_eq!(pool.stats().leases_completed.load(Ordering::SeqCst), 2);
}

#[test]
fn rolloffs_are_not_claimed_beyond_the_deficit() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 1)]));

    // Two strangers roll off before the pool ever orders anything.
    let a = world.host.add_engineer(ME, BASE, Tier::Tech1, "engineer_t1");
    let b = world.host.add_engineer(ME, BASE, Tier::Tech1, "engineer_t1");

    world.cycle(&mut pool);

    assert_eq!(pool.alive_count(Tier::Tech1), 1);
    let claimed: Vec<UnitId> = pool.roster().iter().map(|(u, _)| *u).collect();
    let leftover = if claimed.contains(&a) { b } else { a };
    assert!(world.ledger.lock().unwrap().is_unclaimed(leftover));
}

#[test]
fn ownership_prevents_cross_pool_claims() {
    let world = World::new();
    let mut first = world.pool(BTreeMap::from([(Tier::Tech1, 1)]));
    let mut second = world.pool(BTreeMap::from([(Tier::Tech1, 1)]));

    let rolloff = world.host.add_engineer(ME, BASE, Tier::Tech1, "engineer_t1");
    first.tick(&world.host);
    second.tick(&world.host);

    assert_eq!(first.roster(), vec![(rolloff, Tier::Tech1)]);
    assert!(second.roster().is_empty());
    assert_eq!(
        world.ledger.lock().unwrap().owner_of(rolloff),
        Some(first.owner())
    );
}

#[test]
fn stop_is_idempotent_and_releases_everything() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 2)]));

    world.cycle(&mut pool);
    world.finish_queue();
    pool.tick(&world.host);
    let members: Vec<UnitId> = pool.roster().iter().map(|(u, _)| *u).collect();
    assert!(pool.lease().is_some());

    pool.stop();
    pool.stop();

    assert!(pool.lease().is_none());
    assert!(pool.roster().is_empty());
    assert_eq!(pool.stats().leases_completed.load(Ordering::SeqCst), 1);
    assert_eq!(world.allocator.lock().unwrap().leased_total(), 0);
    for unit in members {
        assert!(world.ledger.lock().unwrap().is_unclaimed(unit));
    }

    // A stopped pool's tick is inert.
    pool.tick(&world.host);
    assert!(pool.lease().is_none());
}

#[test]
fn instant_bootstrap_skips_production() {
    let world = World::new();
    let config = EngineerConfig {
        targets: BTreeMap::from([(Tier::Tech1, 3)]),
        instant_bootstrap: true,
        ..EngineerConfig::default()
    };
    let mut pool = EngineerPool::new(
        &world.host,
        ME,
        "BASE",
        config,
        world.allocator.clone(),
        world.ledger.clone(),
    )
    .unwrap();

    assert_eq!(pool.alive_count(Tier::Tech1), 3);

    pool.tick(&world.host);
    assert!(pool.lease().is_none());
    assert_eq!(world.host.factory_queue_len(world.factory), 0);
}

#[test]
fn regression_resync_reissues_only_the_shortfall() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 3)]));

    world.cycle(&mut pool);
    assert_eq!(world.host.factory_queue_len(world.factory), 3);

    // One engineer rolls off and is claimed, then dies; its sibling order is
    // lost by the engine at the same time.
    world.host.complete_production(world.factory);
    pool.tick(&world.host);
    let (victim, _) = pool.roster()[0];
    world.host.kill_unit(victim);
    world.host.drop_queued(world.factory);
    assert_eq!(world.host.factory_queue_len(world.factory), 1);

    pool.tick(&world.host);

    // In-flight resyncs to the real queue, then tops it back up to the
    // deficit instead of re-ordering everything.
    assert_eq!(world.host.factory_queue_len(world.factory), 3);
    world.finish_queue();
    pool.tick(&world.host);
    assert_eq!(pool.alive_count(Tier::Tech1), 3);
}

#[test]
fn stall_watchdog_requeues_after_timeout() {
    let world = World::new();
    let mut pool = world.pool(BTreeMap::from([(Tier::Tech1, 1)]));

    world.cycle(&mut pool);
    assert_eq!(world.host.factory_queue_len(world.factory), 1);

    // The engine drops the order; bookkeeping still says one in flight.
    world.host.drop_queued(world.factory);
    pool.tick(&world.host);
    assert_eq!(world.host.factory_queue_len(world.factory), 0);

    // Not yet stalled long enough.
    world.host.advance_time(30.0);
    pool.tick(&world.host);
    assert_eq!(world.host.factory_queue_len(world.factory), 0);

    // Past the timeout the in-flight state resets and the order is reissued.
    world.host.advance_time(120.0);
    pool.tick(&world.host);
    pool.tick(&world.host);
    assert_eq!(world.host.factory_queue_len(world.factory), 1);
}

#[test]
fn unresolvable_base_marker_is_fatal() {
    let world = World::new();
    let result = EngineerPool::new(
        &world.host,
        ME,
        "NO_SUCH_MARKER",
        EngineerConfig::default(),
        world.allocator.clone(),
        world.ledger.clone(),
    );
    assert!(result.is_err());
}
