use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::env::{env_duration_ms, env_string, env_u64, mask_key};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_REPLAY_WINDOW: u64 = 64;

const ENV_HELIUS_GRPC: &str = "HELIUS_GRPC";
const ENV_HELIUS_WS: &str = "HELIUS_WS";
const ENV_HELIUS_API_KEY: &str = "HELIUS_API_KEY";
const ENV_HELIUS_TIMEOUT_MS: &str = "HELIUS_TIMEOUT_MS";
const ENV_HELIUS_BACKOFF_MS: &str = "HELIUS_BACKOFF_MS";
const ENV_HELIUS_REPLAY_SLOTS: &str = "HELIUS_REPLAY_SLOTS";

/// Configuration for the Helius LaserStream fallback source.
#[derive(Debug, Clone)]
pub struct HeliusConfig {
    pub grpc_endpoint: String,
    pub ws_endpoint: String,
    /// Value for the per-RPC `x-api-key` metadata header.
    pub api_key: String,
    pub request_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub replay_slots: u64,
    /// Shared with the primary source; populated by the caller.
    pub program_filters: BTreeMap<String, String>,
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            grpc_endpoint: String::new(),
            ws_endpoint: String::new(),
            api_key: String::new(),
            request_timeout: DEFAULT_TIMEOUT,
            reconnect_backoff: DEFAULT_BACKOFF,
            replay_slots: DEFAULT_REPLAY_WINDOW,
            program_filters: BTreeMap::new(),
        }
    }
}

impl HeliusConfig {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            grpc_endpoint: env_string(ENV_HELIUS_GRPC),
            ws_endpoint: env_string(ENV_HELIUS_WS),
            api_key: env_string(ENV_HELIUS_API_KEY),
            request_timeout: env_duration_ms(ENV_HELIUS_TIMEOUT_MS, DEFAULT_TIMEOUT)?,
            reconnect_backoff: env_duration_ms(ENV_HELIUS_BACKOFF_MS, DEFAULT_BACKOFF)?,
            replay_slots: env_u64(ENV_HELIUS_REPLAY_SLOTS, DEFAULT_REPLAY_WINDOW)?,
            program_filters: BTreeMap::new(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.grpc_endpoint.trim().is_empty() {
            missing.push(ENV_HELIUS_GRPC);
        }
        if self.ws_endpoint.trim().is_empty() {
            missing.push(ENV_HELIUS_WS);
        }
        if self.api_key.trim().is_empty() {
            missing.push(ENV_HELIUS_API_KEY);
        }
        if !missing.is_empty() {
            return Err(anyhow!("missing required Helius config: {missing:?}"));
        }
        if self.replay_slots == 0 {
            return Err(anyhow!("{ENV_HELIUS_REPLAY_SLOTS} must be >= 1"));
        }
        Ok(())
    }

    pub fn masked_api_key(&self) -> String {
        mask_key(&self.api_key)
    }

    pub fn program_ids(&self) -> Vec<String> {
        self.program_filters.values().cloned().collect()
    }
}
