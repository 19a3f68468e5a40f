//! Base-automation scheduling core: factory leasing and engineer tasking.
//!
//! Two cooperating pieces form an admission-control system for one
//! authority's base: the [`allocator::FactoryAllocator`] brokers exclusive
//! factory leases by priority, and the [`tasking::TaskScheduler`]
//! continuously reconciles the worker roster across quota'd task
//! categories. The [`pool::EngineerPool`] sits between them, leasing
//! production to keep the roster at target. Everything engine-specific
//! arrives through the `garrison-host` capability traits.

#![forbid(unsafe_code)]

pub mod allocator;
pub mod base;
pub mod config;
pub mod error;
pub mod handoff;
pub mod ownership;
pub mod pool;
pub mod rebuild;
pub mod registry;
pub mod rng;
pub mod runtime;
pub mod tasking;

pub use allocator::{
    Anchor, FactoryAllocator, LeaseEvents, LeaseSpec, RequestId, RevokeReason,
};
pub use base::{AllocatorDirectory, Base};
pub use config::{AllocatorConfig, BaseConfig, EngineerConfig, ExperimentalConfig, Quotas, TaskingConfig};
pub use error::CoreError;
pub use handoff::{hand_off, AttackBehavior, HandoffPayload};
pub use ownership::{OwnerId, OwnershipLedger};
pub use pool::{EngineerPool, PoolStats};
pub use rebuild::{RebuildPlan, RebuildSlot};
pub use registry::ResourceRegistry;
pub use runtime::{poll_until, PollOutcome, TickTask};
pub use tasking::{Category, TaskScheduler};
