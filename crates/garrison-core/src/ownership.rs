//! Neutral check-and-claim arbiter for worker ownership.
//!
//! Multiple engineer pools may share one authority; a unit belongs to at
//! most one of them. Claiming is check-then-set, safe under the cooperative
//! single-writer scheduling model.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use garrison_host::UnitId;

/// Identity of a claiming controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner:{}", self.0)
    }
}

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    /// Mint a process-unique owner identity.
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// `UnitId -> OwnerId` map queried via check-and-claim.
#[derive(Debug, Default)]
pub struct OwnershipLedger {
    owners: HashMap<UnitId, OwnerId>,
}

impl OwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a unit for `owner`. Returns false if it is already claimed by
    /// anyone (including `owner` itself).
    pub fn claim(&mut self, unit: UnitId, owner: OwnerId) -> bool {
        match self.owners.get(&unit) {
            Some(_) => false,
            None => {
                self.owners.insert(unit, owner);
                true
            }
        }
    }

    pub fn owner_of(&self, unit: UnitId) -> Option<OwnerId> {
        self.owners.get(&unit).copied()
    }

    pub fn is_unclaimed(&self, unit: UnitId) -> bool {
        !self.owners.contains_key(&unit)
    }

    /// Release one unit. No-op unless `owner` actually holds it.
    pub fn release(&mut self, unit: UnitId, owner: OwnerId) {
        if self.owners.get(&unit) == Some(&owner) {
            self.owners.remove(&unit);
        }
    }

    /// Release everything held by `owner` (controller shutdown).
    pub fn release_all(&mut self, owner: OwnerId) {
        self.owners.retain(|_, o| *o != owner);
    }
}
