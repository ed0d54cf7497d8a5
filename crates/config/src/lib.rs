//! Environment-variable configuration for the ingestor.
//!
//! Every knob the pipeline reads lives here: the primary geyser endpoint, the
//! optional Helius fallback, the JetStream publisher, and the metrics
//! listener. Values come from the process environment plus the programs YAML
//! file; validation failures are fatal init errors.

mod env;
mod geyser;
mod helius;
mod nats;

pub use geyser::GeyserConfig;
pub use helius::HeliusConfig;
pub use nats::NatsConfig;

use anyhow::Result;

use crate::env::parse_env_bool;

const ENV_METRICS_ADDR: &str = "INGESTOR_METRICS_ADDR";
const ENV_ENABLE_HELIUS_FALLBACK: &str = "ENABLE_HELIUS_FALLBACK";

/// Fully resolved ingestor configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub geyser: GeyserConfig,
    /// Present only when `ENABLE_HELIUS_FALLBACK` is set truthy.
    pub helius: Option<HeliusConfig>,
    pub nats: NatsConfig,
    /// Prometheus listener address; `None` disables the metrics server.
    pub metrics_addr: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let geyser = GeyserConfig::from_env()?;
        let nats = NatsConfig::from_env()?;

        let fallback_enabled = std::env::var(ENV_ENABLE_HELIUS_FALLBACK)
            .ok()
            .and_then(parse_env_bool)
            .unwrap_or(false);
        let helius = if fallback_enabled {
            let mut cfg = HeliusConfig::from_env()?;
            cfg.program_filters = geyser.program_filters.clone();
            Some(cfg)
        } else {
            None
        };

        let metrics_addr = std::env::var(ENV_METRICS_ADDR)
            .ok()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty());

        Ok(Self {
            geyser,
            helius,
            nats,
            metrics_addr,
        })
    }
}
