// ABOUTME: Environment variable overrides applied after the config file is parsed.
// ABOUTME: Invalid values are configuration errors, never silently ignored.

use std::path::PathBuf;
use std::time::Duration;

use super::Config;
use crate::error::{Error, Result};
use crate::runtime::RuntimeType;

pub const ENV_RUNTIME: &str = "BASCULE_RUNTIME";
pub const ENV_COMPOSE_FILE: &str = "BASCULE_COMPOSE_FILE";
pub const ENV_ENV_FILE: &str = "BASCULE_ENV_FILE";
pub const ENV_STATE_DIR: &str = "BASCULE_STATE_DIR";
pub const ENV_HEALTH_TIMEOUT: &str = "BASCULE_HEALTH_TIMEOUT";
pub const ENV_HEALTH_INTERVAL: &str = "BASCULE_HEALTH_INTERVAL";
pub const ENV_HEALTH_ATTEMPTS: &str = "BASCULE_HEALTH_ATTEMPTS";
pub const ENV_WEBHOOK_URL: &str = "BASCULE_WEBHOOK_URL";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Apply overrides from any variable source. Empty values count as unset.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(value) = get(ENV_RUNTIME) {
        let runtime = value
            .parse::<RuntimeType>()
            .map_err(|reason| invalid(ENV_RUNTIME, &value, reason))?;
        config.runtime = Some(runtime);
    }
    if let Some(value) = get(ENV_COMPOSE_FILE) {
        config.compose_file = PathBuf::from(value);
    }
    if let Some(value) = get(ENV_ENV_FILE) {
        config.env_file = Some(PathBuf::from(value));
    }
    if let Some(value) = get(ENV_STATE_DIR) {
        config.state_dir = PathBuf::from(value);
    }
    if let Some(value) = get(ENV_HEALTH_TIMEOUT) {
        config.health.timeout = parse_duration(ENV_HEALTH_TIMEOUT, &value)?;
    }
    if let Some(value) = get(ENV_HEALTH_INTERVAL) {
        config.health.interval = parse_duration(ENV_HEALTH_INTERVAL, &value)?;
    }
    if let Some(value) = get(ENV_HEALTH_ATTEMPTS) {
        let attempts = value
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(ENV_HEALTH_ATTEMPTS, &value, e.to_string()))?;
        if attempts == 0 {
            return Err(invalid(ENV_HEALTH_ATTEMPTS, &value, "must be at least 1"));
        }
        config.health.attempts = attempts;
    }
    if let Some(value) = get(ENV_WEBHOOK_URL) {
        config.notify.webhook = Some(value);
    }
    Ok(())
}

/// Accepts humantime (`30s`, `1m 30s`) or bare seconds.
fn parse_duration(var: &str, value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).map_err(|e| invalid(var, value, e.to_string()))
}

fn invalid(var: &str, value: &str, reason: impl Into<String>) -> Error {
    Error::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}
