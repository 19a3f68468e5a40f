//! Base reconstruction template.
//!
//! Slots are captured once at initialization from the structures actually
//! standing (or supplied explicitly by the scenario). Presence is freshly
//! scanned every tick; a slot is never marked permanently done, so a
//! structure destroyed later reopens its slot.

use garrison_host::{AuthorityId, BlueprintId, Host, Position};
use tracing::debug;

/// How close a completed structure must stand to count as filling a slot.
const SLOT_MATCH_RADIUS: f32 = 2.0;

/// One structure the base wants standing.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildSlot {
    pub blueprint: BlueprintId,
    pub position: Position,
    pub facing: f32,
}

/// The full reconstruction template of one base.
#[derive(Debug, Clone, Default)]
pub struct RebuildPlan {
    slots: Vec<RebuildSlot>,
}

impl RebuildPlan {
    /// Capture the template from the structures currently standing around
    /// the base.
    pub fn capture<H: Host>(
        host: &H,
        authority: AuthorityId,
        base: Position,
        radius: f32,
    ) -> Self {
        let slots: Vec<RebuildSlot> = host
            .structures_near(authority, base, radius)
            .into_iter()
            .map(|s| RebuildSlot {
                blueprint: s.blueprint,
                position: s.position,
                facing: s.facing,
            })
            .collect();
        debug!(count = slots.len(), "Captured rebuild template");
        Self { slots }
    }

    /// Use an explicitly provided template.
    pub fn from_slots(slots: Vec<RebuildSlot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<&RebuildSlot> {
        self.slots.get(index)
    }

    /// Indices of slots with no completed matching structure standing,
    /// freshly scanned.
    pub fn missing<H: Host>(&self, host: &H) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                host.completed_of_at(&slot.blueprint, slot.position, SLOT_MATCH_RADIUS)
                    .is_empty()
            })
            .map(|(i, _)| i)
            .collect()
    }
}
