use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

pub(crate) fn parse_env_bool(value: String) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an env var holding a millisecond count and returns it as a duration.
/// Unset or empty keeps the default; a malformed or non-positive value is an
/// error naming the variable.
pub(crate) fn env_duration_ms(name: &str, default: Duration) -> Result<Duration> {
    let raw = match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(default),
    };
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid {name}: {raw:?} is not a millisecond count"))?;
    if ms == 0 {
        return Err(anyhow!("invalid {name}: must be positive"));
    }
    Ok(Duration::from_millis(ms))
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64> {
    let raw = match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(default),
    };
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("invalid {name}: {raw:?} is not an integer"))
}

pub(crate) fn env_string(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

/// Masks an API key for log output, keeping the first and last four
/// characters of long keys.
pub(crate) fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    if key.len() > 8 {
        format!("{}****{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}
