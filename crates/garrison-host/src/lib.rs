//! Engine-agnostic capability interfaces for RTS base automation.
//!
//! The scheduling core never talks to a game engine directly; it talks to
//! the traits in this crate. A hosting scenario script implements them on
//! top of whatever engine it embeds, and tests implement them over an
//! in-memory world.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod entity;
pub mod host;
pub mod order;
pub mod position;

pub use entity::{
    AuthorityId, BlueprintId, Domain, DomainFilter, FactoryInfo, PlatoonId, StructureInfo, Tier,
    UnitId, UnitInfo,
};
pub use host::{Bootstrap, Clock, GroupOps, Host, Markers, OrderSink, Probe, Spatial};
pub use order::{Formation, Order};
pub use position::Position;
