//! Attack handoff boundary.
//!
//! The core's whole contract with attack behaviors: deliver a named platoon
//! of live, order-cleared units plus a free-form payload, then never touch
//! those units again. Behavior internals are out of scope.

use anyhow::Result;
use garrison_host::{Formation, Host, Order, PlatoonId, UnitId};
use tracing::{info, warn};

/// Free-form configuration attached to a handoff.
#[derive(Debug, Clone)]
pub struct HandoffPayload {
    pub name: String,
    pub data: serde_json::Value,
}

/// An external attack behavior consuming a finished platoon.
pub trait AttackBehavior: Send + Sync {
    fn launch(&self, platoon: PlatoonId, payload: &HandoffPayload) -> Result<()>;
}

/// Package `units` as a platoon and hand it to `behavior`.
///
/// Dead units are filtered out; survivors get their orders cleared first.
/// A failing behavior is logged and otherwise ignored; the handoff itself
/// still happened and the core no longer owns the units.
pub fn hand_off<H: Host>(
    host: &H,
    name: &str,
    units: &[UnitId],
    formation: Formation,
    behavior: &dyn AttackBehavior,
    data: serde_json::Value,
) -> Option<PlatoonId> {
    let live: Vec<UnitId> = units
        .iter()
        .copied()
        .filter(|u| host.unit(*u).is_some())
        .collect();
    if live.is_empty() {
        warn!(platoon = name, "Nothing alive to hand off");
        return None;
    }

    host.issue(&live, Order::ClearOrders);
    let platoon = host.form_platoon(name, &live, formation);
    info!(platoon = name, members = live.len(), "Platoon handed off");

    let payload = HandoffPayload {
        name: name.to_string(),
        data,
    };
    if let Err(err) = behavior.launch(platoon, &payload) {
        warn!(platoon = name, error = %err, "Attack behavior launch failed");
    }
    Some(platoon)
}
