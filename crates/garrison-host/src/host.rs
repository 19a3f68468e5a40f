//! Host capability traits.
//!
//! Each trait covers one slice of what the engine can do for the core. The
//! blanket [`Host`] bound is what controllers actually take; an engine
//! binding (or a test world) implements the individual traits.
//!
//! All methods take `&self`: engine calls are effectively FFI into the
//! host's own state, and test worlds use interior mutability.

use crate::entity::{
    AuthorityId, BlueprintId, FactoryInfo, PlatoonId, StructureInfo, UnitId, UnitInfo,
};
use crate::order::{Formation, Order};
use crate::position::Position;

/// Spatial queries over the live world.
pub trait Spatial {
    /// Factories owned by `authority` within `radius` of `pos`.
    fn factories_near(&self, authority: AuthorityId, pos: Position, radius: f32) -> Vec<UnitId>;

    /// Engineer-class mobile units owned by `authority` within `radius` of
    /// `pos`, regardless of completion state.
    fn engineers_near(&self, authority: AuthorityId, pos: Position, radius: f32) -> Vec<UnitId>;

    /// Structures owned by `authority` within `radius` of `pos`.
    fn structures_near(
        &self,
        authority: AuthorityId,
        pos: Position,
        radius: f32,
    ) -> Vec<StructureInfo>;

    /// Completed instances of exactly `blueprint` (structure or unit)
    /// within `radius` of `pos`, any owner. Used for presence scans.
    fn completed_of_at(&self, blueprint: &BlueprintId, pos: Position, radius: f32) -> Vec<UnitId>;

    /// Reclaimable wreckage/props within `radius` of `pos`.
    fn reclaimables_near(&self, pos: Position, radius: f32) -> Vec<UnitId>;
}

/// Snapshot introspection. `None` means dead or unknown.
pub trait Probe {
    fn factory(&self, id: UnitId) -> Option<FactoryInfo>;
    fn unit(&self, id: UnitId) -> Option<UnitInfo>;
}

/// Fire-and-forget order issuance.
pub trait OrderSink {
    fn issue(&self, units: &[UnitId], order: Order);
}

/// Platoon creation and behavior forking.
pub trait GroupOps {
    /// Create a named platoon containing `members` with a formation hint.
    fn form_platoon(&self, name: &str, members: &[UnitId], formation: Formation) -> PlatoonId;
}

/// Scenario bootstrapping: create a unit directly, bypassing production.
pub trait Bootstrap {
    fn spawn_unit(
        &self,
        authority: AuthorityId,
        blueprint: &BlueprintId,
        pos: Position,
    ) -> Option<UnitId>;
}

/// Named-marker resolution. Failure is a first-class outcome.
pub trait Markers {
    fn resolve_marker(&self, name: &str) -> Option<Position>;
}

/// Monotonic game-time seconds.
pub trait Clock {
    fn game_time(&self) -> f64;
}

/// What a controller needs from its host.
pub trait Host:
    Spatial + Probe + OrderSink + GroupOps + Bootstrap + Markers + Clock + Send + Sync + 'static
{
}

impl<T> Host for T where
    T: Spatial + Probe + OrderSink + GroupOps + Bootstrap + Markers + Clock + Send + Sync + 'static
{
}
