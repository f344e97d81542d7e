//! Configuration loading: environment variables first, then a TOML file,
//! then [`OutboxConfig::default`].
//!
//! Grounded on `infra/src/config/loader.rs`'s env-first-then-file-probe
//! strategy, with the env prefix renamed to `RELAYBOX_*`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relaybox_domain::{OutboxConfig, RelayError, Result, SenderStrategy};
use serde::Deserialize;

const CONFIG_FILE_CANDIDATES: &[&str] =
    &["relaybox.toml", "config/relaybox.toml", "/etc/relaybox/config.toml"];

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    wait_duration_secs: Option<u64>,
    max_times: Option<i64>,
    batch_size: Option<usize>,
    poll_interval_secs: Option<u64>,
    iter_deadline_secs: Option<u64>,
    lock_acquire_deadline_secs: Option<u64>,
    sender_strategy: Option<String>,
    metrics_enabled: Option<bool>,
}

/// Loads configuration the same way on every call: `.env` (if present) is
/// merged into the process environment, a config file is read if one of
/// [`CONFIG_FILE_CANDIDATES`] exists, and environment variables win over
/// file values field-by-field.
pub fn load_config() -> Result<OutboxConfig> {
    let _ = dotenvy::dotenv();
    let mut raw = find_config_file().map(|path| load_toml(&path)).transpose()?.unwrap_or_default();
    apply_env_overrides(&mut raw);
    Ok(merge_with_defaults(raw))
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists())
}

fn load_toml(path: &Path) -> Result<RawConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&text)
        .map_err(|e| RelayError::Config(format!("failed to parse {}: {e}", path.display())))
}

fn apply_env_overrides(raw: &mut RawConfig) {
    if let Some(v) = env_parsed("RELAYBOX_WAIT_DURATION_SECS") {
        raw.wait_duration_secs = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_MAX_TIMES") {
        raw.max_times = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_BATCH_SIZE") {
        raw.batch_size = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_POLL_INTERVAL_SECS") {
        raw.poll_interval_secs = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_ITER_DEADLINE_SECS") {
        raw.iter_deadline_secs = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_LOCK_ACQUIRE_DEADLINE_SECS") {
        raw.lock_acquire_deadline_secs = Some(v);
    }
    if let Ok(v) = std::env::var("RELAYBOX_SENDER_STRATEGY") {
        raw.sender_strategy = Some(v);
    }
    if let Some(v) = env_parsed("RELAYBOX_METRICS_ENABLED") {
        raw.metrics_enabled = Some(v);
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn merge_with_defaults(raw: RawConfig) -> OutboxConfig {
    let defaults = OutboxConfig::default();
    OutboxConfig {
        wait_duration: raw.wait_duration_secs.map(Duration::from_secs).unwrap_or(defaults.wait_duration),
        max_times: raw.max_times.unwrap_or(defaults.max_times),
        batch_size: raw.batch_size.unwrap_or(defaults.batch_size),
        poll_interval: raw.poll_interval_secs.map(Duration::from_secs).unwrap_or(defaults.poll_interval),
        iter_deadline: raw.iter_deadline_secs.map(Duration::from_secs).unwrap_or(defaults.iter_deadline),
        lock_acquire_deadline: raw
            .lock_acquire_deadline_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.lock_acquire_deadline),
        sender_strategy: match raw.sender_strategy.as_deref() {
            Some("batch") => SenderStrategy::Batch,
            Some("per_message") => SenderStrategy::PerMessage,
            Some(other) => {
                tracing::warn!(other, "unknown sender strategy in config, using default");
                defaults.sender_strategy
            }
            None => defaults.sender_strategy,
        },
        metrics_enabled: raw.metrics_enabled.unwrap_or(defaults.metrics_enabled),
    }
}
