use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::env::{env_duration_ms, env_string};

const DEFAULT_SUBJECT_ROOT: &str = "dex.sol";
const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_NATS_URL: &str = "NATS_URL";
const ENV_NATS_STREAM: &str = "NATS_STREAM";
const ENV_NATS_SUBJECT_ROOT: &str = "NATS_SUBJECT_ROOT";
const ENV_NATS_PUBLISH_TIMEOUT_MS: &str = "NATS_PUBLISH_TIMEOUT_MS";

/// Runtime parameters for the JetStream publisher.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    /// Durable stream the subjects are bound to; publish acks must name it.
    pub stream: String,
    pub subject_root: String,
    pub publish_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            stream: String::new(),
            subject_root: DEFAULT_SUBJECT_ROOT.to_string(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

impl NatsConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            url: env_string(ENV_NATS_URL),
            stream: env_string(ENV_NATS_STREAM),
            publish_timeout: env_duration_ms(ENV_NATS_PUBLISH_TIMEOUT_MS, DEFAULT_PUBLISH_TIMEOUT)?,
            ..Self::default()
        };
        let subject_root = env_string(ENV_NATS_SUBJECT_ROOT);
        if !subject_root.trim().is_empty() {
            cfg.subject_root = subject_root.trim().to_string();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("{ENV_NATS_URL} is required"));
        }
        if self.stream.trim().is_empty() {
            return Err(anyhow!("{ENV_NATS_STREAM} is required"));
        }
        if self.subject_root.trim().is_empty() {
            return Err(anyhow!("subject root cannot be empty"));
        }
        if self.publish_timeout.is_zero() {
            return Err(anyhow!("publish timeout must be positive"));
        }
        Ok(())
    }
}
