#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tokio::sync::Barrier;

use shared_cache::MemoryCache;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;
use slot_cell::{
    Clock, FacilityResolver, PackageResolver, RoutingDetails, SlotError, SlotOrchestrator,
    SlotProvider, SlotRequest, SlotRequestPayload, SlotServices,
};

pub fn date(day: u32, month: u32, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn at(day: u32, month: u32, year: i32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date(day, month, year).and_hms_opt(h, m, s).unwrap()
}

pub fn request(value: Value) -> SlotRequest {
    let payload: SlotRequestPayload = serde_json::from_value(value).unwrap();
    SlotRequest::try_from(payload).unwrap()
}

pub fn scenario_request() -> SlotRequest {
    request(json!({
        "date": "15-03-2025",
        "tenant_id": "manipal",
        "facility_id": "F1",
        "facility_name": "Whitefield Clinic",
        "provider_id": "P1",
        "patient_user_id": "U1"
    }))
}

pub fn two_slots() -> Value {
    json!([
        {"slot_start_time": "9:00 AM", "slot_end_time": "9:30 AM", "isbooked": 0, "additional_info": {"room": 1}},
        {"slot_start_time": "9:30 AM", "slot_end_time": "10:00 AM", "isbooked": 1}
    ])
}

pub fn config() -> AppConfig {
    TestConfig::default().to_app_config()
}

/// Clock the test can move while a request is in flight.
pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

pub struct StubProvider {
    response: Result<Value, String>,
    advance: Option<(Arc<ManualClock>, NaiveDateTime)>,
    scripted: Vec<Value>,
    gate: Option<Barrier>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(SlotRequest, NaiveDate)>>,
}

impl StubProvider {
    pub fn returning(response: Value) -> Arc<Self> {
        Arc::new(Self::new(Ok(response), None))
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self::new(Err(reason.to_string()), None))
    }

    /// Moves `clock` to `to` while the fetch is running.
    pub fn returning_after(response: Value, clock: Arc<ManualClock>, to: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self::new(Ok(response), Some((clock, to))))
    }

    /// Answers call `n` with `responses[n]`. No call returns before
    /// `responses.len()` fetches are in flight together.
    pub fn gated(responses: Vec<Value>) -> Arc<Self> {
        let mut provider = Self::new(Ok(Value::Null), None);
        provider.gate = Some(Barrier::new(responses.len()));
        provider.scripted = responses;
        Arc::new(provider)
    }

    fn new(response: Result<Value, String>, advance: Option<(Arc<ManualClock>, NaiveDateTime)>) -> Self {
        Self {
            response,
            advance,
            scripted: Vec::new(),
            gate: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> (SlotRequest, NaiveDate) {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SlotProvider for StubProvider {
    async fn fetch_slots(&self, request: &SlotRequest, end_date: NaiveDate) -> Result<Value, SlotError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((request.clone(), end_date));
        if let Some((clock, to)) = &self.advance {
            clock.set(*to);
        }
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if let Some(response) = self.scripted.get(call) {
            return Ok(response.clone());
        }

        self.response.clone().map_err(|reason| SlotError::UpstreamUnavailable {
            upstream: "bifrost",
            reason,
        })
    }
}

pub struct StubResolver {
    routing: Option<RoutingDetails>,
    pub calls: AtomicUsize,
}

impl StubResolver {
    pub fn resolving(routing: RoutingDetails) -> Arc<Self> {
        Arc::new(Self {
            routing: Some(routing),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            routing: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<RoutingDetails, SlotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routing.clone().ok_or_else(|| SlotError::InvalidResponse {
            upstream: "listing-service",
            reason: "'filters' missing or empty".to_string(),
        })
    }
}

#[async_trait]
impl FacilityResolver for StubResolver {
    async fn resolve(&self, _request: &SlotRequest) -> Result<RoutingDetails, SlotError> {
        self.answer()
    }
}

#[async_trait]
impl PackageResolver for StubResolver {
    async fn resolve(&self, _request: &SlotRequest) -> Result<RoutingDetails, SlotError> {
        self.answer()
    }
}

/// Orchestrator over an in-memory cache and stub collaborators.
pub struct Harness {
    pub cache: Arc<MemoryCache>,
    pub provider: Arc<StubProvider>,
    pub facility: Arc<StubResolver>,
    pub package: Arc<StubResolver>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: SlotOrchestrator,
}

impl Harness {
    pub fn new(provider: Arc<StubProvider>, clock: Arc<ManualClock>) -> Self {
        Self::with(config(), provider, doctor_routing(), clock)
    }

    pub fn with(
        config: AppConfig,
        provider: Arc<StubProvider>,
        facility: Arc<StubResolver>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let package = StubResolver::resolving(RoutingDetails {
            doctor_id: None,
            additional_info: Some(json!(r#"{"ext_bat_package_id": "PKG-M"}"#)),
        });

        let orchestrator = SlotOrchestrator::new(
            &config,
            SlotServices {
                cache: cache.clone(),
                provider: provider.clone(),
                facility_resolver: facility.clone(),
                package_resolver: package.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            cache,
            provider,
            facility,
            package,
            clock,
            orchestrator,
        }
    }
}

pub fn doctor_routing() -> Arc<StubResolver> {
    StubResolver::resolving(RoutingDetails {
        doctor_id: Some("D1".to_string()),
        additional_info: Some(json!(r#"{"speciality_code": "GP"}"#)),
    })
}
