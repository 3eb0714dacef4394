use std::collections::HashMap;
use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub redis: RedisSettings,
    pub upstream: UpstreamSettings,
    pub slots: SlotSettings,
    pub tenants: TenantSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Connection and resilience settings for the slot cache.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub operation_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_attempts: u32,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub health_check_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub bifrost_url: String,
    pub bifrost_secret: String,
    pub listing_service_url: String,
    pub package_listing_url: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SlotSettings {
    /// Local time of day after which next-day slots bypass the cache.
    pub provider_final_slot_time: NaiveTime,
    pub slot_cache_ttl: Duration,
    pub fetch_window_days: i64,
    pub slot_list_days: i64,
    pub slot_hold_time: String,
    pub reference_utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct TenantSettings {
    pub rcp: String,
    pub manipal: String,
    pub meddibuddy: String,
    pub jhh_managed_tenant_id: Option<String>,
    pub male_gender_code: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let server = ServerSettings {
            host: vars.or_default("SERVER_HOST", "0.0.0.0".to_string()),
            port: vars.parsed_or("SERVER_PORT", 3000)?,
        };

        let redis = RedisSettings {
            url: redis_url(&vars)?,
            operation_timeout: vars.secs_or("REDIS_OPERATION_TIMEOUT_SECS", 5)?,
            connect_timeout: vars.secs_or("REDIS_CONNECT_TIMEOUT_SECS", 5)?,
            retry_attempts: vars.parsed_or("REDIS_RETRY_ATTEMPTS", 3)?,
            reconnect_attempts: vars.parsed_or("REDIS_RECONNECT_ATTEMPTS", 3)?,
            reconnect_delay: vars.secs_or("REDIS_RECONNECT_DELAY_SECS", 2)?,
            health_check_interval: vars.secs_or("REDIS_HEALTH_CHECK_INTERVAL_SECS", 30)?,
        };

        let upstream = UpstreamSettings {
            bifrost_url: vars.required("BIFROST_API_SERVER_BASE_URL")?,
            bifrost_secret: vars.required("BIFROST_SECRET")?,
            listing_service_url: vars.required("LISTING_SERVICE_URL")?,
            package_listing_url: vars.required("PACKAGE_LISTING_URL")?,
            max_retries: vars.parsed_or("MAX_RETRIES", 3)?,
            retry_delay: vars.secs_or("UPSTREAM_RETRY_DELAY_SECS", 2)?,
            request_timeout: vars.secs_or("UPSTREAM_TIMEOUT_SECS", 30)?,
        };

        let final_slot_time = vars.required("PROVIDERS_FINAL_SLOT_TIME")?;
        let slots = SlotSettings {
            provider_final_slot_time: parse_time_of_day(&final_slot_time).ok_or_else(|| {
                ConfigError::Invalid {
                    var: "PROVIDERS_FINAL_SLOT_TIME".to_string(),
                    reason: format!("expected HH:MM, got {final_slot_time:?}"),
                }
            })?,
            slot_cache_ttl: vars.secs_or("VACCINATION_GET_SLOT_CACHE_TIME", 300)?,
            fetch_window_days: vars.parsed_or("NO_OF_SLOT_DAYS_TO_BE_ADDED_FOR_PME", 30)?,
            slot_list_days: vars.parsed_or("MAX_SLOT_LIST_DAYS_INCLINIC", 7)?,
            slot_hold_time: vars.or_default("SLOT_HOLD_TIME", "5".to_string()),
            reference_utc_offset_minutes: vars.parsed_or("REFERENCE_UTC_OFFSET_MINUTES", 330)?,
        };
        if slots.slot_list_days < 1 {
            return Err(ConfigError::Invalid {
                var: "MAX_SLOT_LIST_DAYS_INCLINIC".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if slots.slot_cache_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "VACCINATION_GET_SLOT_CACHE_TIME".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let tenant_ids: HashMap<String, String> = vars.json("TENANT_IDS")?;
        let tenant = |name: &str| {
            tenant_ids.get(name).cloned().ok_or_else(|| ConfigError::Invalid {
                var: "TENANT_IDS".to_string(),
                reason: format!("missing tenant {name}"),
            })
        };
        let male_gender_code = match (vars.lookup)("GENDER") {
            Some(raw) => {
                let genders: HashMap<String, serde_json::Value> =
                    serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                        var: "GENDER".to_string(),
                        reason: e.to_string(),
                    })?;
                match genders.get("male") {
                    Some(serde_json::Value::String(code)) => code.clone(),
                    Some(other) => other.to_string(),
                    None => "1".to_string(),
                }
            }
            None => "1".to_string(),
        };
        let tenants = TenantSettings {
            rcp: tenant("RCP")?,
            manipal: tenant("MANIPAL")?,
            meddibuddy: tenant("MEDDIBUDDY")?,
            jhh_managed_tenant_id: (vars.lookup)("JHH_MANAGED_TENANT_ID")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            male_gender_code,
        };
        if tenants.jhh_managed_tenant_id.is_none() {
            warn!("JHH_MANAGED_TENANT_ID not set, externally managed requests will be rejected");
        }

        Ok(Self {
            server,
            redis,
            upstream,
            slots,
            tenants,
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        match (self.lookup)(key) {
            Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
            _ => Err(ConfigError::Missing(key.to_string())),
        }
    }

    fn or_default(&self, key: &str, default: String) -> String {
        (self.lookup)(key).unwrap_or_else(|| {
            warn!("{} not set, using default {:?}", key, default);
            default
        })
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        match (self.lookup)(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn secs_or(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed_or(key, default).map(Duration::from_secs)
    }

    fn json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self.required(key)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        })
    }
}

fn redis_url<F: Fn(&str) -> Option<String>>(vars: &Vars<'_, F>) -> Result<String, ConfigError> {
    if let Some(url) = (vars.lookup)("REDIS_URL").filter(|u| !u.trim().is_empty()) {
        return Ok(url.trim().to_string());
    }

    let host = vars.required("REDIS_HOST")?;
    let port: u16 = vars.parsed_or("REDIS_PORT", 6379)?;
    let db: u32 = vars.parsed_or("REDIS_DB", 0)?;
    let tls: bool = vars.parsed_or("REDIS_TLS", true)?;
    let scheme = if tls { "rediss" } else { "redis" };

    Ok(match (vars.lookup)("REDIS_PASSWORD").filter(|p| !p.is_empty()) {
        Some(password) => format!("{scheme}://:{password}@{host}:{port}/{db}"),
        None => format!("{scheme}://{host}:{port}/{db}"),
    })
}

fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}
