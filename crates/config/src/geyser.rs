use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::env::{env_string, mask_key};

const ENV_GEYSER_ENDPOINT: &str = "GEYSER_ENDPOINT";
const ENV_GEYSER_API_KEY: &str = "GEYSER_API_KEY";

/// Configuration for the primary Yellowstone Geyser stream.
#[derive(Debug, Clone, Default)]
pub struct GeyserConfig {
    /// gRPC endpoint, e.g. `https://grpc.example.com:443`.
    pub endpoint: String,
    /// Value for the per-RPC `x-token` metadata header.
    pub api_key: String,
    /// Friendly name -> program id, used to build subscription filters.
    pub program_filters: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProgramsFile {
    programs: BTreeMap<String, String>,
}

impl GeyserConfig {
    /// Builds the config from `GEYSER_ENDPOINT`, `GEYSER_API_KEY`, and the
    /// programs YAML at `PROGRAMS_YAML_PATH` (`programs: { name: id, ... }`).
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            endpoint: env_string(ENV_GEYSER_ENDPOINT),
            api_key: env_string(ENV_GEYSER_API_KEY),
            program_filters: BTreeMap::new(),
        };

        if let Ok(path) = env::var("PROGRAMS_YAML_PATH") {
            if !path.trim().is_empty() {
                cfg.program_filters = load_program_filters(Path::new(path.trim()))?;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.endpoint.trim().is_empty() {
            problems.push(format!("{ENV_GEYSER_ENDPOINT} is required"));
        }
        if self.api_key.trim().is_empty() {
            problems.push(format!("{ENV_GEYSER_API_KEY} is required"));
        }
        if self.program_filters.is_empty() {
            problems.push("at least one program filter is required".to_string());
        }
        for (name, program_id) in &self.program_filters {
            if program_id.is_empty() {
                problems.push(format!("program filter {name:?} has an empty program id"));
            } else if program_id.len() < 32 || program_id.len() > 44 {
                problems.push(format!(
                    "program filter {name:?} has an invalid program id length: {program_id}"
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "geyser configuration invalid:\n  - {}",
                problems.join("\n  - ")
            ))
        }
    }

    pub fn masked_api_key(&self) -> String {
        mask_key(&self.api_key)
    }

    pub fn program_ids(&self) -> Vec<String> {
        self.program_filters.values().cloned().collect()
    }
}

pub(crate) fn load_program_filters(path: &Path) -> Result<BTreeMap<String, String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read programs file: {}", path.display()))?;
    let parsed: ProgramsFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse programs YAML: {}", path.display()))?;
    Ok(parsed.programs)
}
