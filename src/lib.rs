//! Async orchestrator that routes edge sensor streams through a remote
//! inference gateway (§2 System overview).

pub mod actions;
pub mod agents;
pub mod cli;
pub mod config;
pub mod connectors;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod pipeline;
pub mod plugins;
pub mod scheduler;
pub mod wire;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Defaults applied when the config document omits a field (§7).
pub mod defaults {
    pub const GATEWAY_POOL_SIZE: usize = 4;
    pub const GATEWAY_TIMEOUT_S: f64 = 2.0;
    pub const METRICS_PORT: u16 = 9108;
    pub const INGRESS_QUEUE_CAPACITY: usize = 1024;
}
