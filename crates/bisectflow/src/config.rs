use chrono::Duration;

use crate::dispatch::{Endpoints, Protocol};
use crate::jobs::cancel::AccessPolicy;
use crate::jobs::sweep::SweepConfig;

/// Runtime configuration, loaded from environment variables. `BISECT_`-
/// prefixed names win over their unprefixed fallbacks.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub api_addr: Option<String>,
    pub protocol: Protocol,
    pub endpoints: Endpoints,
    pub dispatch_timeout_secs: u64,
    pub staleness_threshold_secs: i64,
    pub max_retries: u32,
    pub sweep_interval_secs: u64,
    pub administrators: Vec<String>,
    pub delegation_allowlist: Vec<String>,
    pub migrate_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("BISECT_DATABASE_URL", "DATABASE_URL");

        let api_addr = env_or_fallback("BISECT_API_ADDR", "API_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let protocol =
            match env_or_fallback("BISECT_BUILDBUCKET_PROTOCOL", "BUILDBUCKET_PROTOCOL").as_deref()
            {
                Some("legacy") | Some("v1") => Protocol::Legacy,
                Some("modern") | Some("v2") | None => Protocol::Modern,
                Some(other) => anyhow::bail!(
                    "unknown build-dispatch protocol {other:?} (expected legacy or modern)"
                ),
            };

        let mut endpoints = Endpoints::default();
        if let Some(url) = env_or_fallback("BISECT_BUILDBUCKET_V1_URL", "BUILDBUCKET_V1_URL") {
            endpoints.legacy_base = url;
        }
        if let Some(url) = env_or_fallback("BISECT_BUILDBUCKET_V2_URL", "BUILDBUCKET_V2_URL") {
            endpoints.modern_base = url;
        }

        let dispatch_timeout_secs =
            env_or_fallback("BISECT_DISPATCH_TIMEOUT_SECS", "DISPATCH_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);

        let staleness_threshold_secs =
            env_or_fallback("BISECT_STALENESS_THRESHOLD_SECS", "STALENESS_THRESHOLD_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(6 * 60 * 60);

        let max_retries = env_or_fallback("BISECT_MAX_RETRIES", "MAX_RETRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let sweep_interval_secs = env_or_fallback("BISECT_SWEEP_INTERVAL_SECS", "SWEEP_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);

        let administrators = env_list("BISECT_ADMINISTRATORS");
        let delegation_allowlist = env_list("BISECT_DELEGATION_ALLOWLIST");

        let migrate_on_startup = env_bool("BISECT_MIGRATE_ON_STARTUP").unwrap_or(false);

        Ok(Self {
            database_url,
            api_addr,
            protocol,
            endpoints,
            dispatch_timeout_secs,
            staleness_threshold_secs,
            max_retries,
            sweep_interval_secs,
            administrators,
            delegation_allowlist,
            migrate_on_startup,
        })
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            staleness_threshold: Duration::seconds(self.staleness_threshold_secs),
            max_retries: self.max_retries,
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(
            self.administrators.iter().cloned(),
            self.delegation_allowlist.iter().cloned(),
        )
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
