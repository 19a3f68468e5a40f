//! Per-authority wiring.
//!
//! The embedding application owns one [`AllocatorDirectory`] and one
//! ownership ledger; each automated base is a [`Base`] built from a
//! [`BaseConfig`], running its allocator, pool, and scheduler as
//! cooperative tick tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use garrison_host::{AuthorityId, Host};
use tracing::info;

use crate::allocator::FactoryAllocator;
use crate::config::{AllocatorConfig, BaseConfig};
use crate::error::CoreError;
use crate::handoff::AttackBehavior;
use crate::ownership::OwnershipLedger;
use crate::pool::EngineerPool;
use crate::rebuild::RebuildPlan;
use crate::registry::ResourceRegistry;
use crate::runtime::TickTask;
use crate::tasking::TaskScheduler;

/// Application-owned registry of allocators, one per authority. Replaces
/// any notion of ambient global state: controllers receive their allocator
/// explicitly.
pub struct AllocatorDirectory {
    config: AllocatorConfig,
    allocators: Mutex<HashMap<AuthorityId, Arc<Mutex<FactoryAllocator>>>>,
}

impl AllocatorDirectory {
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            allocators: Mutex::new(HashMap::new()),
        }
    }

    /// The shared allocator of `authority`, created on first use.
    pub fn allocator_for(&self, authority: AuthorityId) -> Arc<Mutex<FactoryAllocator>> {
        self.allocators
            .lock()
            .unwrap()
            .entry(authority)
            .or_insert_with(|| {
                Arc::new(Mutex::new(FactoryAllocator::new(
                    ResourceRegistry::new(authority),
                    self.config.clone(),
                )))
            })
            .clone()
    }
}

/// One automated base: allocator tick, engineer pool, task scheduler.
pub struct Base {
    allocator: Arc<Mutex<FactoryAllocator>>,
    pool: Arc<Mutex<EngineerPool>>,
    scheduler: Arc<Mutex<TaskScheduler>>,
    tasks: Vec<TickTask>,
    stopped: bool,
}

impl Base {
    /// Construct the controllers and spawn their tick loops. Fails only on
    /// configuration errors (unresolvable base marker).
    pub fn start<H: Host>(
        host: Arc<H>,
        authority: AuthorityId,
        config: BaseConfig,
        directory: &AllocatorDirectory,
        ledger: Arc<Mutex<OwnershipLedger>>,
        attack: Option<Arc<dyn AttackBehavior>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let base_pos = host
            .resolve_marker(&config.base_marker)
            .ok_or_else(|| CoreError::UnresolvedMarker(config.base_marker.clone()))?;

        let allocator = directory.allocator_for(authority);
        let pool = Arc::new(Mutex::new(EngineerPool::new(
            host.as_ref(),
            authority,
            &config.base_marker,
            config.engineers.clone(),
            allocator.clone(),
            ledger,
        )?));

        let plan = RebuildPlan::capture(
            host.as_ref(),
            authority,
            base_pos,
            config.tasking.rebuild_capture_radius,
        );
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new(
            authority,
            base_pos,
            config.tasking.clone(),
            plan,
            attack,
        )));

        let mut tasks = Vec::new();
        {
            let allocator = allocator.clone();
            let host = host.clone();
            tasks.push(TickTask::spawn(
                "allocator",
                Duration::from_secs_f64(config.allocator.tick_secs),
                move || allocator.lock().unwrap().tick(host.as_ref()),
            ));
        }
        {
            let pool = pool.clone();
            let host = host.clone();
            tasks.push(TickTask::spawn(
                "pool",
                Duration::from_secs_f64(config.engineers.tick_secs),
                move || pool.lock().unwrap().tick(host.as_ref()),
            ));
        }
        {
            let pool = pool.clone();
            let scheduler = scheduler.clone();
            tasks.push(TickTask::spawn(
                "tasking",
                Duration::from_secs_f64(config.tasking.tick_secs),
                move || {
                    let roster = pool.lock().unwrap().roster();
                    scheduler.lock().unwrap().tick(host.as_ref(), &roster);
                },
            ));
        }

        info!(authority = %authority, "Base started");
        Ok(Self {
            allocator,
            pool,
            scheduler,
            tasks,
            stopped: false,
        })
    }

    pub fn pool(&self) -> Arc<Mutex<EngineerPool>> {
        self.pool.clone()
    }

    pub fn scheduler(&self) -> Arc<Mutex<TaskScheduler>> {
        self.scheduler.clone()
    }

    pub fn allocator(&self) -> Arc<Mutex<FactoryAllocator>> {
        self.allocator.clone()
    }

    /// Halt every tick loop at its next yield point, return held leases,
    /// and release owned agents. Idempotent.
    pub async fn stop(&mut self) {
        for task in &mut self.tasks {
            task.stop().await;
        }
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.pool.lock().unwrap().stop();
        self.scheduler.lock().unwrap().clear();
        info!("Base stopped");
    }
}
