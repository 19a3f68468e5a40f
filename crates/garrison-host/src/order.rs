use crate::entity::{BlueprintId, UnitId};
use crate::position::Position;

/// A fire-and-forget command issued against one or more units.
///
/// No order has a synchronous result; effects are observed through later
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    ClearOrders,
    Move(Position),
    AggressiveMove(Position),
    Attack(UnitId),
    Guard(UnitId),
    Repair(UnitId),
    Reclaim(UnitId),
    BuildAt {
        blueprint: BlueprintId,
        position: Position,
        facing: f32,
    },
    /// Queue production of a mobile unit on a factory.
    Produce(BlueprintId),
}

/// Formation hint attached to a platoon at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Formation {
    #[default]
    None,
    Attack,
    Growth,
}
