use core::fmt;

use crate::position::Position;

/// Stable engine identity of a unit or structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// The owning entity (one player/army) of units and factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AuthorityId(pub u32);

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authority:{}", self.0)
    }
}

/// Identity of a buildable template (structure or unit type).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlueprintId(pub String);

impl BlueprintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for BlueprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a formed platoon, opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatoonId(pub u64);

/// Production domain of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Domain {
    Land,
    Air,
    Naval,
}

/// Domain constraint on a lease request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DomainFilter {
    /// Any domain is acceptable.
    #[default]
    Auto,
    Only(Domain),
}

impl DomainFilter {
    pub fn accepts(&self, domain: Domain) -> bool {
        match self {
            DomainFilter::Auto => true,
            DomainFilter::Only(d) => *d == domain,
        }
    }
}

/// Worker tier/class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    Tech1,
    Tech2,
    Tech3,
    /// Heavy engineering class; the only tier allowed to lead experimental
    /// construction.
    Heavy,
}

/// Point-in-time snapshot of a factory, taken through the host probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactoryInfo {
    pub position: Position,
    pub authority: AuthorityId,
    pub domain: Domain,
    pub busy: bool,
    pub upgrading: bool,
    pub paused: bool,
    /// Length of the pending production queue. Order-issuance has no
    /// synchronous result; callers detect a landed order by watching this
    /// grow.
    pub queue_len: usize,
}

impl FactoryInfo {
    /// Whether the factory can accept production work right now.
    pub fn usable(&self) -> bool {
        !self.busy && !self.upgrading && !self.paused
    }
}

/// Point-in-time snapshot of a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureInfo {
    pub id: UnitId,
    pub blueprint: BlueprintId,
    pub position: Position,
    pub facing: f32,
    /// 1.0 means undamaged.
    pub health_fraction: f32,
}

/// Point-in-time snapshot of a mobile unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitInfo {
    pub position: Position,
    pub authority: AuthorityId,
    pub tier: Tier,
    /// False while still rolling off production.
    pub complete: bool,
    /// True while the unit is actively constructing something.
    pub building: bool,
}
