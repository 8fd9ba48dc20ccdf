// SPDX-License-Identifier: Apache-2.0

use custodian_model::NameRules;
use regex::Regex;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

/// Entry TTL applied when Redis backs the cache.
pub const CACHE_ENTRY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub name_rules: NameRules,
    /// Owner directories not matching this pattern are invisible.
    pub owner_alias_filter: Regex,
    pub default_promoters: Vec<String>,
    /// Owners whose promoters always join every promoter listing.
    pub additional_promoter_owners: Vec<String>,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    /// Detached deadline for webhook-triggered updates.
    pub webhook_update_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name_rules: NameRules::default(),
            owner_alias_filter: Regex::new("^[a-z0-9-]+$").expect("owner alias filter regex"),
            default_promoters: Vec::new(),
            additional_promoter_owners: Vec::new(),
            max_body_bytes: 256 * 1024,
            request_timeout: Duration::from_secs(30),
            webhook_update_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub entry_ttl: Duration,
    pub redis_op_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: "custodian".to_string(),
            entry_ttl: CACHE_ENTRY_TTL,
            redis_op_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub update_interval: Duration,
    pub run_timeout: Duration,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(300),
            run_timeout: Duration::from_secs(120),
        }
    }
}

pub fn validate_startup_config_contract(
    runtime: &RuntimeConfig,
    cache: &CacheSettings,
    trigger: &TriggerSettings,
) -> Result<(), String> {
    if runtime.max_body_bytes == 0 {
        return Err("max body bytes must be > 0".to_string());
    }
    if runtime.request_timeout.is_zero() || runtime.webhook_update_timeout.is_zero() {
        return Err("timeouts must be > 0".to_string());
    }
    if runtime.name_rules.repository_types.is_empty() {
        return Err("at least one repository type must be configured".to_string());
    }
    if cache.entry_ttl.is_zero() || cache.redis_op_timeout.is_zero() {
        return Err("cache ttl and redis timeout must be > 0".to_string());
    }
    if cache.redis_url.is_some() && cache.redis_prefix.is_empty() {
        return Err("redis prefix must not be empty when redis is enabled".to_string());
    }
    if trigger.update_interval.is_zero() || trigger.run_timeout.is_zero() {
        return Err("trigger interval and timeout must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_the_contract() {
        validate_startup_config_contract(
            &RuntimeConfig::default(),
            &CacheSettings::default(),
            &TriggerSettings::default(),
        )
        .expect("valid defaults");
    }

    #[test]
    fn redis_without_prefix_is_rejected() {
        let cache = CacheSettings {
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            redis_prefix: String::new(),
            ..CacheSettings::default()
        };
        let err = validate_startup_config_contract(
            &RuntimeConfig::default(),
            &cache,
            &TriggerSettings::default(),
        )
        .expect_err("missing prefix");
        assert!(err.contains("prefix"));
    }
}
