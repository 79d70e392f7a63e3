//! ============================================================================
//! Display Surface - Where the gate renders status, banners and controls
//! ============================================================================
//! The gate never touches a concrete UI. It calls `DisplaySurface` for
//! messages, and `bind` keeps the action controls in step with the tier by
//! listening to `access-update`.
//! ============================================================================

use std::sync::Arc;

use super::types::ControlState;
use crate::events::{EventBus, GateEvent, Subscription, Topic};

pub trait DisplaySurface: Send + Sync {
    /// One-line status under the controls
    fn set_status(&self, message: &str);

    /// Error banner; the text may carry `<br>`/`<small>` markup.
    /// None hides the banner.
    fn show_error(&self, message: Option<&str>);

    fn set_loading(&self, loading: bool);

    fn set_controls(&self, controls: ControlState);

    /// Cluster / endpoint label
    fn set_network_label(&self, label: &str);

    /// Ask whether to continue with reduced access. `message` explains the
    /// shortfall.
    fn confirm_reduced_entry(&self, message: &str) -> bool;
}

/// Drive `display` controls from tier changes on `bus`
pub fn bind(bus: &EventBus, display: Arc<dyn DisplaySurface>) -> Subscription {
    bus.subscribe(Topic::AccessUpdate, move |event| {
        if let GateEvent::AccessUpdate { tier, .. } = event {
            display.set_controls(ControlState::for_tier(*tier));
        }
    })
}
