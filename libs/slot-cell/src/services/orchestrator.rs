use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as Days, NaiveTime};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use shared_cache::{CacheError, JsonCache, SetMode};
use shared_config::{AppConfig, TenantSettings};

use crate::error::SlotError;
use crate::models::{
    decode_nested, is_empty_payload, DaySlotResult, ProviderSlots, RoutingDetails, SlotRequest,
    SlotResponse,
};
use crate::services::clock::Clock;
use crate::services::keys::SlotCacheKeys;
use crate::services::mapper::DaySlotMapper;
use crate::services::provider::SlotProvider;
use crate::services::resolvers::{FacilityResolver, PackageResolver};

/// Collaborators the orchestrator delegates to.
pub struct SlotServices {
    pub cache: Arc<dyn JsonCache>,
    pub provider: Arc<dyn SlotProvider>,
    pub facility_resolver: Arc<dyn FacilityResolver>,
    pub package_resolver: Arc<dyn PackageResolver>,
    pub clock: Arc<dyn Clock>,
}

/// Decides, per request, between the immediate path, a cache hit and a
/// provider fetch, and owns write-back of both cache tiers.
///
/// Concurrent misses on the same key each call the provider; only the
/// create-only writes arbitrate which result stays cached.
pub struct SlotOrchestrator {
    cache: Arc<dyn JsonCache>,
    provider: Arc<dyn SlotProvider>,
    facility_resolver: Arc<dyn FacilityResolver>,
    package_resolver: Arc<dyn PackageResolver>,
    clock: Arc<dyn Clock>,
    mapper: DaySlotMapper,
    tenants: TenantSettings,
    final_slot_time: NaiveTime,
    cache_ttl: Duration,
    fetch_window_days: i64,
}

enum CachedSlots {
    Mapped(Vec<DaySlotResult>),
    Raw(Value),
    Miss,
}

impl SlotOrchestrator {
    pub fn new(config: &AppConfig, services: SlotServices) -> Self {
        let mapper = DaySlotMapper::new(services.cache.clone(), services.clock.clone(), &config.slots);

        Self {
            cache: services.cache,
            provider: services.provider,
            facility_resolver: services.facility_resolver,
            package_resolver: services.package_resolver,
            clock: services.clock,
            mapper,
            tenants: config.tenants.clone(),
            final_slot_time: config.slots.provider_final_slot_time,
            cache_ttl: config.slots.slot_cache_ttl,
            fetch_window_days: config.slots.fetch_window_days,
        }
    }

    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, facility = %request.facility_id, date = %request.date))]
    pub async fn get_slots(&self, request: &SlotRequest) -> Result<SlotResponse, SlotError> {
        let started = Instant::now();
        let result = self.resolve_slots(request).await;
        info!(
            "Total slot lookup took {} ms",
            started.elapsed().as_millis()
        );

        result.map(SlotResponse::success).inspect_err(|e| {
            error!(
                "Slot lookup failed for tenant {} facility {} on {}: {}",
                request.tenant_id,
                request.facility_id,
                request.date_label(),
                e
            )
        })
    }

    async fn resolve_slots(&self, request: &SlotRequest) -> Result<Vec<DaySlotResult>, SlotError> {
        let managed;
        let request = if request.externally_managed {
            let tenant = self.tenants.jhh_managed_tenant_id.as_deref().ok_or_else(|| {
                SlotError::Routing("Tenant ID for externally managed slots is not configured".to_string())
            })?;
            info!("Slots are externally managed, using tenant {}", tenant);
            managed = request.with_tenant(tenant);
            &managed
        } else {
            request
        };

        if self.cutoff_applies(request) {
            info!("Provider cutoff passed, returning immediate slots");
            let phase = Instant::now();
            let data = self.mapper.map(request, &ProviderSlots::empty()).await?;
            info!("Immediate slot mapping took {} ms", phase.elapsed().as_millis());
            return Ok(data);
        }

        let keys = SlotCacheKeys::for_request(request);
        debug!("Slot cache keys: mapped={} raw={}", keys.mapped, keys.raw);

        let phase = Instant::now();
        let cached = self.lookup(&keys).await?;
        info!("Slot cache lookup took {} ms", phase.elapsed().as_millis());

        match cached {
            CachedSlots::Mapped(data) => {
                info!("Mapped slots served from cache");
                Ok(data)
            }
            CachedSlots::Raw(raw) => {
                info!("Raw provider response served from cache");
                let source = parse_provider_slots(&raw)?;
                let data = self.mapper.map(request, &source).await?;
                self.write_back(&keys.mapped, &data).await;
                Ok(data)
            }
            CachedSlots::Miss => self.fetch_and_map(request, &keys).await,
        }
    }

    /// True when a request without a pre-integrated provider (or one whose
    /// slots are externally managed) targets today or tomorrow after the
    /// provider's final slot time.
    pub fn cutoff_applies(&self, request: &SlotRequest) -> bool {
        let now = self.clock.now();
        let tomorrow = now.date() + Days::days(1);

        (!request.has_api_integration || request.externally_managed)
            && request.date <= tomorrow
            && now.time() > self.final_slot_time
    }

    async fn lookup(&self, keys: &SlotCacheKeys) -> Result<CachedSlots, SlotError> {
        let mapped = self.read_tier(&keys.mapped).await?;
        let raw = self.read_tier(&keys.raw).await?;

        if let Some(mapped) = mapped.map(decode_nested).filter(|v| !is_empty_payload(v)) {
            let data: Vec<DaySlotResult> = serde_json::from_value(mapped).map_err(|source| {
                error!("Mapped slot entry at {} does not match the day layout", keys.mapped);
                SlotError::Cache(CacheError::Corrupt {
                    key: keys.mapped.clone(),
                    source,
                })
            })?;
            return Ok(CachedSlots::Mapped(data));
        }

        Ok(match raw.map(decode_nested).filter(|v| !is_empty_payload(v)) {
            Some(raw) => CachedSlots::Raw(raw),
            None => CachedSlots::Miss,
        })
    }

    /// Transient failures read as a miss.
    async fn read_tier(&self, key: &str) -> Result<Option<Value>, SlotError> {
        match self.cache.get_json(key).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                warn!("Cache read for {} failed, treating as miss: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_and_map(
        &self,
        request: &SlotRequest,
        keys: &SlotCacheKeys,
    ) -> Result<Vec<DaySlotResult>, SlotError> {
        info!("No cached slots found, fetching from provider");

        let phase = Instant::now();
        let routing = self.routing_for(request).await?;
        let request = match routing {
            Some(routing) => request.with_routing(routing),
            None => request.clone(),
        };
        info!("Routing resolution took {} ms", phase.elapsed().as_millis());

        let proposed_end = self.clock.today() + Days::days(self.fetch_window_days);
        let end_date = match request.end_date {
            Some(requested) => requested.min(proposed_end),
            None => proposed_end,
        };

        let phase = Instant::now();
        let raw = self.provider.fetch_slots(&request, end_date).await?;
        info!("Provider fetch took {} ms", phase.elapsed().as_millis());

        self.write_back(&keys.raw, &raw).await;

        let source = parse_provider_slots(&raw)?;
        let source = if self.cutoff_applies(&request) {
            info!("Provider cutoff passed during fetch, dropping provider slots");
            source.without_slots()
        } else {
            source
        };

        let phase = Instant::now();
        let data = self.mapper.map(&request, &source).await?;
        info!("Slot mapping took {} ms", phase.elapsed().as_millis());

        self.write_back(&keys.mapped, &data).await;
        Ok(data)
    }

    async fn routing_for(&self, request: &SlotRequest) -> Result<Option<RoutingDetails>, SlotError> {
        let tenant = request.tenant_id.as_str();

        if tenant == self.tenants.rcp || tenant == self.tenants.manipal {
            debug!("Resolving facility routing for tenant {}", tenant);
            self.facility_resolver.resolve(request).await.map(Some)
        } else if tenant == self.tenants.meddibuddy {
            debug!("Resolving package routing for tenant {}", tenant);
            self.package_resolver.resolve(request).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Create-only write; losing the race or a cache outage never fails the request.
    async fn write_back<T: serde::Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                error!("Could not serialize slots for {}: {}", key, e);
                return;
            }
        };

        match self
            .cache
            .set_json(key, &value, self.cache_ttl, SetMode::CreateOnly)
            .await
        {
            Ok(true) => debug!("Cached {}", key),
            Ok(false) => info!("{} already cached by a concurrent request, keeping it", key),
            Err(e) => warn!("Failed to cache {}: {}", key, e),
        }
    }
}

fn parse_provider_slots(raw: &Value) -> Result<ProviderSlots, SlotError> {
    ProviderSlots::from_value(raw).map_err(|reason| SlotError::InvalidResponse {
        upstream: "bifrost",
        reason,
    })
}
