//! Shared context handed to every gate component: the configuration and the
//! event bus. Built once per gate; cloning shares both.

use std::sync::Arc;

use crate::config::GateConfig;
use crate::events::EventBus;

#[derive(Debug, Clone)]
pub struct GateContext {
    pub config: Arc<GateConfig>,
    pub bus: EventBus,
}

impl GateContext {
    pub fn new(config: GateConfig) -> Self {
        Self::with_bus(config, EventBus::new())
    }

    pub fn with_bus(config: GateConfig, bus: EventBus) -> Self {
        Self {
            config: Arc::new(config),
            bus,
        }
    }
}
