//! Factory allocator: a priority-ordered broker of exclusive factory
//! leases.
//!
//! Requests queue by `(priority desc, request id asc)`; insertion order is
//! the tie-break, so equal-priority requesters are served FIFO. Each tick
//! sweeps dead factories, then services requests in that fixed order, so
//! a scarcity outcome is fully determined by the queue.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use garrison_host::{DomainFilter, Host, Position, UnitId};
use tracing::{debug, warn};

use crate::config::AllocatorConfig;
use crate::error::CoreError;
use crate::registry::ResourceRegistry;

/// Monotonic identity of a lease request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lease:{}", self.0)
    }
}

/// Where a lease searches for factories.
#[derive(Debug, Clone)]
pub enum Anchor {
    Position(Position),
    Marker(String),
}

/// Parameters of a lease request.
#[derive(Debug, Clone)]
pub struct LeaseSpec {
    pub anchor: Anchor,
    pub radius: f32,
    pub domain: DomainFilter,
    /// Desired factory count; 0 means "all available".
    pub quantity: usize,
    /// Higher wins.
    pub priority: i32,
}

/// Why a granted factory was taken back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// The factory died or changed hands.
    Lost,
    /// A higher-priority request took it.
    Preempted,
}

/// Caller-supplied lease lifecycle hooks.
///
/// Errors are isolated: a failing hook is logged and the allocator tick
/// continues with its tables intact.
pub trait LeaseEvents: Send {
    /// First non-empty grant.
    fn on_grant(&mut self, request: RequestId, granted: &[UnitId]) -> Result<()> {
        let _ = (request, granted);
        Ok(())
    }

    /// The grant grew after the first grant.
    fn on_update(&mut self, request: RequestId, granted: &[UnitId]) -> Result<()> {
        let _ = (request, granted);
        Ok(())
    }

    /// Factories were taken out of the grant.
    fn on_revoke(&mut self, request: RequestId, lost: &[UnitId], reason: RevokeReason) -> Result<()> {
        let _ = (request, lost, reason);
        Ok(())
    }

    /// The lease was returned, or its grant emptied through loss.
    fn on_complete(&mut self, request: RequestId) -> Result<()> {
        let _ = request;
        Ok(())
    }
}

struct LeaseRequest {
    anchor: Position,
    radius: f32,
    domain: DomainFilter,
    quantity: usize,
    priority: i32,
    granted: BTreeSet<UnitId>,
    ever_granted: bool,
    events: Box<dyn LeaseEvents>,
}

impl LeaseRequest {
    fn need(&self) -> usize {
        if self.quantity == 0 {
            usize::MAX
        } else {
            self.quantity.saturating_sub(self.granted.len())
        }
    }
}

/// Exclusive-resource broker for the factories of one authority.
pub struct FactoryAllocator {
    config: AllocatorConfig,
    registry: ResourceRegistry,
    requests: BTreeMap<RequestId, LeaseRequest>,
    /// Service order: priority desc, then id asc.
    queue: Vec<RequestId>,
    next_id: u64,
}

impl FactoryAllocator {
    pub fn new(registry: ResourceRegistry, config: AllocatorConfig) -> Self {
        Self {
            config,
            registry,
            requests: BTreeMap::new(),
            queue: Vec::new(),
            next_id: 1,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Register a lease request. Fails only when the anchor cannot be
    /// resolved; nothing is registered in that case.
    pub fn request_lease<H: Host>(
        &mut self,
        host: &H,
        spec: LeaseSpec,
        events: Box<dyn LeaseEvents>,
    ) -> Result<RequestId, CoreError> {
        let anchor = match spec.anchor {
            Anchor::Position(pos) => pos,
            Anchor::Marker(ref name) => host
                .resolve_marker(name)
                .ok_or_else(|| CoreError::UnresolvedAnchor(name.clone()))?,
        };

        let id = RequestId(self.next_id);
        self.next_id += 1;

        self.requests.insert(
            id,
            LeaseRequest {
                anchor,
                radius: spec.radius,
                domain: spec.domain,
                quantity: spec.quantity,
                priority: spec.priority,
                granted: BTreeSet::new(),
                ever_granted: false,
                events,
            },
        );

        let pos = self
            .queue
            .partition_point(|other| self.requests[other].priority >= spec.priority);
        self.queue.insert(pos, id);

        debug!(request = %id, priority = spec.priority, quantity = spec.quantity, "Lease requested");
        Ok(id)
    }

    /// Release everything granted to a request and remove it. Idempotent.
    pub fn return_lease(&mut self, id: RequestId) {
        let Some(request) = self.requests.get(&id) else {
            return;
        };
        for factory in request.granted.clone() {
            self.registry.release(factory);
        }
        self.fire(id, |events, id| events.on_complete(id));
        self.requests.remove(&id);
        self.queue.retain(|q| *q != id);
        debug!(request = %id, "Lease returned");
    }

    /// Read-only snapshot of the factories currently granted to a request.
    pub fn granted(&self, id: RequestId) -> Vec<UnitId> {
        self.requests
            .get(&id)
            .map(|r| r.granted.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    /// Total factories granted across all requests.
    pub fn leased_total(&self) -> usize {
        self.registry.leased_count()
    }

    /// One reconciliation pass: sweep losses, discover factories, service
    /// requests in priority order.
    pub fn tick<H: Host>(&mut self, host: &H) {
        self.sweep_losses(host);
        self.discover(host);
        self.service(host);

        // Defensive against queue/table drift.
        let requests = &self.requests;
        self.queue.retain(|id| requests.contains_key(id));
    }

    fn sweep_losses<H: Host>(&mut self, host: &H) {
        let removed = self.registry.sweep(host);
        if removed.is_empty() {
            return;
        }

        let mut lost_by_holder: BTreeMap<RequestId, Vec<UnitId>> = BTreeMap::new();
        for (factory, holder) in removed {
            if let Some(holder) = holder {
                lost_by_holder.entry(holder).or_default().push(factory);
            }
        }

        for (holder, lost) in lost_by_holder {
            let emptied = match self.requests.get_mut(&holder) {
                Some(request) => {
                    for factory in &lost {
                        request.granted.remove(factory);
                    }
                    request.granted.is_empty()
                }
                None => continue,
            };

            self.fire(holder, |events, id| {
                events.on_revoke(id, &lost, RevokeReason::Lost)
            });
            if emptied {
                self.fire(holder, |events, id| events.on_complete(id));
            }
        }
    }

    fn discover<H: Host>(&mut self, host: &H) {
        let authority = self.registry.authority();
        let anchors: Vec<(Position, f32)> = self
            .requests
            .values()
            .map(|r| (r.anchor, r.radius))
            .collect();
        for (anchor, radius) in anchors {
            for factory in host.factories_near(authority, anchor, radius) {
                self.registry.observe(factory);
            }
        }
    }

    fn service<H: Host>(&mut self, host: &H) {
        let authority = self.registry.authority();
        for id in self.queue.clone() {
            let Some(request) = self.requests.get(&id) else {
                continue;
            };
            let need = request.need();
            if need == 0 {
                continue;
            }

            let (anchor, radius, domain, priority) =
                (request.anchor, request.radius, request.domain, request.priority);

            let candidates: Vec<UnitId> = self
                .registry
                .ids()
                .filter(|f| self.registry.is_free(*f))
                .filter(|f| match host.factory(*f) {
                    Some(info) => {
                        info.authority == authority
                            && domain.accepts(info.domain)
                            && info.position.within(&anchor, radius)
                    }
                    None => false,
                })
                .collect();

            let mut newly: Vec<UnitId> = Vec::new();
            for factory in candidates.into_iter().take(need) {
                if self.registry.lease(factory, id) {
                    newly.push(factory);
                }
            }

            if self.config.preemption && newly.len() < need {
                let stolen = self.preempt(host, id, anchor, radius, domain, priority, need - newly.len());
                newly.extend(stolen);
            }

            if newly.is_empty() {
                continue;
            }

            let Some(request) = self.requests.get_mut(&id) else {
                continue;
            };
            request.granted.extend(newly.iter().copied());
            let first = !request.ever_granted;
            request.ever_granted = true;

            debug!(request = %id, count = newly.len(), first, "Factories granted");
            if first {
                self.fire(id, |events, id| events.on_grant(id, &newly));
            } else {
                self.fire(id, |events, id| events.on_update(id, &newly));
            }
        }
    }

    /// Pull factories away from strictly-lower-priority holders near the
    /// winner's anchor. Config-gated, off by default.
    fn preempt<H: Host>(
        &mut self,
        host: &H,
        winner: RequestId,
        anchor: Position,
        radius: f32,
        domain: DomainFilter,
        priority: i32,
        mut want: usize,
    ) -> Vec<UnitId> {
        let authority = self.registry.authority();
        let mut stolen_by_loser: BTreeMap<RequestId, Vec<UnitId>> = BTreeMap::new();
        let mut stolen = Vec::new();

        let leased: Vec<(UnitId, RequestId)> = self
            .registry
            .ids()
            .filter_map(|f| self.registry.holder(f).map(|h| (f, h)))
            .collect();

        for (factory, holder) in leased {
            if want == 0 {
                break;
            }
            if holder == winner {
                continue;
            }
            let Some(loser) = self.requests.get(&holder) else {
                continue;
            };
            if loser.priority >= priority {
                continue;
            }
            let suitable = match host.factory(factory) {
                Some(info) => {
                    info.authority == authority
                        && domain.accepts(info.domain)
                        && info.position.within(&anchor, radius)
                }
                None => false,
            };
            if !suitable {
                continue;
            }

            self.registry.release(factory);
            if self.registry.lease(factory, winner) {
                stolen_by_loser.entry(holder).or_default().push(factory);
                stolen.push(factory);
                want -= 1;
            }
        }

        for (loser, lost) in stolen_by_loser {
            if let Some(request) = self.requests.get_mut(&loser) {
                for factory in &lost {
                    request.granted.remove(factory);
                }
            }
            warn!(loser = %loser, winner = %winner, count = lost.len(), "Lease preempted");
            self.fire(loser, |events, id| {
                events.on_revoke(id, &lost, RevokeReason::Preempted)
            });
        }

        stolen
    }

    fn fire<F>(&mut self, id: RequestId, f: F)
    where
        F: FnOnce(&mut dyn LeaseEvents, RequestId) -> Result<()>,
    {
        if let Some(request) = self.requests.get_mut(&id) {
            if let Err(err) = f(request.events.as_mut(), id) {
                warn!(request = %id, error = %err, "Lease callback failed");
            }
        }
    }
}
