use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;

use shared_config::{
    AppConfig, RedisSettings, ServerSettings, SlotSettings, TenantSettings, UpstreamSettings,
};

pub struct TestConfig {
    pub redis_url: String,
    pub upstream_base_url: String,
    pub bifrost_secret: String,
    pub provider_final_slot_time: NaiveTime,
    pub slot_list_days: i64,
    pub jhh_managed_tenant_id: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            redis_url: std::env::var("REDIS_TEST_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            upstream_base_url: "http://localhost:9".to_string(),
            bifrost_secret: "test-bifrost-secret".to_string(),
            provider_final_slot_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            slot_list_days: 7,
            jhh_managed_tenant_id: Some("jhh".to_string()),
        }
    }
}

impl TestConfig {
    /// Points every upstream at one mock server, each on its own path.
    pub fn with_upstream(base_url: &str) -> Self {
        Self {
            upstream_base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            redis: RedisSettings {
                url: self.redis_url.clone(),
                operation_timeout: Duration::from_millis(500),
                connect_timeout: Duration::from_millis(500),
                retry_attempts: 2,
                reconnect_attempts: 1,
                reconnect_delay: Duration::from_millis(10),
                health_check_interval: Duration::from_secs(30),
            },
            upstream: UpstreamSettings {
                bifrost_url: format!("{}/bifrost/slots", self.upstream_base_url),
                bifrost_secret: self.bifrost_secret.clone(),
                listing_service_url: format!("{}/listing", self.upstream_base_url),
                package_listing_url: format!("{}/packages", self.upstream_base_url),
                max_retries: 2,
                retry_delay: Duration::from_millis(10),
                request_timeout: Duration::from_secs(2),
            },
            slots: SlotSettings {
                provider_final_slot_time: self.provider_final_slot_time,
                slot_cache_ttl: Duration::from_secs(300),
                fetch_window_days: 30,
                slot_list_days: self.slot_list_days,
                slot_hold_time: "5".to_string(),
                reference_utc_offset_minutes: 330,
            },
            tenants: TenantSettings {
                rcp: "rcp".to_string(),
                manipal: "manipal".to_string(),
                meddibuddy: "meddibuddy".to_string(),
                jhh_managed_tenant_id: self.jhh_managed_tenant_id.clone(),
                male_gender_code: "1".to_string(),
            },
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::with_upstream("http://127.0.0.1:4000/").to_app_config();

        assert_eq!(config.upstream.bifrost_url, "http://127.0.0.1:4000/bifrost/slots");
        assert_eq!(config.upstream.listing_service_url, "http://127.0.0.1:4000/listing");
        assert_eq!(config.tenants.manipal, "manipal");
        assert_eq!(config.slots.reference_utc_offset_minutes, 330);
    }
}
