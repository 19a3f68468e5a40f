//! Factory bookkeeping for one authority.
//!
//! Pure state: which factories are known, and which lease request currently
//! holds each one. Policy (who gets what) lives in the allocator.

use std::collections::BTreeMap;

use garrison_host::{AuthorityId, Host, UnitId};
use tracing::debug;

use crate::allocator::RequestId;

#[derive(Debug, Default, Clone)]
struct FactoryRecord {
    leased_to: Option<RequestId>,
}

/// Live/dead and lease-holder state of the leasable factories owned by one
/// authority.
#[derive(Debug)]
pub struct ResourceRegistry {
    authority: AuthorityId,
    factories: BTreeMap<UnitId, FactoryRecord>,
}

impl ResourceRegistry {
    pub fn new(authority: AuthorityId) -> Self {
        Self {
            authority,
            factories: BTreeMap::new(),
        }
    }

    pub fn authority(&self) -> AuthorityId {
        self.authority
    }

    /// Track a factory if it is not already known.
    pub fn observe(&mut self, id: UnitId) {
        self.factories.entry(id).or_default();
    }

    /// Drop every factory that is dead or no longer owned by this
    /// authority. Returns the removed ids together with the lease holder
    /// each one was bound to, so the caller can fire revocations.
    pub fn sweep<H: Host>(&mut self, host: &H) -> Vec<(UnitId, Option<RequestId>)> {
        let authority = self.authority;
        let mut removed = Vec::new();
        self.factories.retain(|id, record| {
            let keep = host
                .factory(*id)
                .map(|info| info.authority == authority)
                .unwrap_or(false);
            if !keep {
                removed.push((*id, record.leased_to));
            }
            keep
        });
        if !removed.is_empty() {
            debug!(authority = %authority, count = removed.len(), "Swept dead/foreign factories");
        }
        removed
    }

    pub fn is_known(&self, id: UnitId) -> bool {
        self.factories.contains_key(&id)
    }

    pub fn holder(&self, id: UnitId) -> Option<RequestId> {
        self.factories.get(&id).and_then(|r| r.leased_to)
    }

    pub fn is_free(&self, id: UnitId) -> bool {
        matches!(self.factories.get(&id), Some(r) if r.leased_to.is_none())
    }

    /// Bind a factory to a request. Returns false if the factory is unknown
    /// or already leased (the exclusivity invariant).
    pub fn lease(&mut self, id: UnitId, request: RequestId) -> bool {
        match self.factories.get_mut(&id) {
            Some(record) if record.leased_to.is_none() => {
                record.leased_to = Some(request);
                true
            }
            _ => false,
        }
    }

    /// Release a factory back to the free pool.
    pub fn release(&mut self, id: UnitId) {
        if let Some(record) = self.factories.get_mut(&id) {
            record.leased_to = None;
        }
    }

    pub fn live_count(&self) -> usize {
        self.factories.len()
    }

    pub fn leased_count(&self) -> usize {
        self.factories
            .values()
            .filter(|r| r.leased_to.is_some())
            .count()
    }

    /// Known factory ids in stable order.
    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.factories.keys().copied()
    }
}
