use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use shared_config::{TenantSettings, UpstreamSettings};

use crate::error::SlotError;
use crate::models::{RoutingDetails, SlotRequest};
use crate::services::upstream::UpstreamClient;

const LISTING: &str = "listing-service";
const PACKAGES: &str = "package-onboarding";

/// Looks up the doctor booked behind a facility.
#[async_trait]
pub trait FacilityResolver: Send + Sync {
    async fn resolve(&self, request: &SlotRequest) -> Result<RoutingDetails, SlotError>;
}

/// Looks up the provider-side package for a corporate booking.
#[async_trait]
pub trait PackageResolver: Send + Sync {
    async fn resolve(&self, request: &SlotRequest) -> Result<RoutingDetails, SlotError>;
}

pub struct ListingServiceResolver {
    http: UpstreamClient,
    url: String,
}

impl ListingServiceResolver {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, SlotError> {
        Ok(Self {
            http: UpstreamClient::new(settings)?,
            url: settings.listing_service_url.clone(),
        })
    }

    pub fn request_body(request: &SlotRequest) -> Value {
        json!({
            "entity": "partners_booking_info",
            "filter": [
                {"type": "service_type", "values": "PME"},
                {"type": "tenant", "values": request.tenant_id},
                {"type": "external_facility_code", "values": request.external_facility_id},
                {"type": "internal_facility_id", "values": request.facility_id},
            ],
            "list_length": 1,
            "start_from_entry": 0
        })
    }

    /// The last association in `data.filters` wins and must name a doctor.
    pub fn routing_from(response: &Value) -> Result<RoutingDetails, SlotError> {
        let association = response
            .pointer("/data/filters")
            .and_then(Value::as_array)
            .and_then(|filters| filters.last())
            .ok_or_else(|| SlotError::InvalidResponse {
                upstream: LISTING,
                reason: "'filters' missing or empty in response['data']".to_string(),
            })?;

        let doctor_id = match association.get("doctor_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            other => {
                return Err(SlotError::InvalidResponse {
                    upstream: LISTING,
                    reason: format!("unusable doctor_id in association: {:?}", other),
                })
            }
        };
        let additional_info = association
            .get("speciality_code")
            .map(|code| Value::String(json!({ "speciality_code": code }).to_string()));

        Ok(RoutingDetails {
            doctor_id: Some(doctor_id),
            additional_info,
        })
    }
}

#[async_trait]
impl FacilityResolver for ListingServiceResolver {
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, facility = %request.facility_id))]
    async fn resolve(&self, request: &SlotRequest) -> Result<RoutingDetails, SlotError> {
        let body = Self::request_body(request).to_string();
        let response = self
            .http
            .post_json(LISTING, &self.url, UpstreamClient::default_headers(), body)
            .await?;
        debug!("Listing service response: {}", response);

        Self::routing_from(&response).inspect_err(|e| {
            error!("Listing service gave no routing for facility {}: {}", request.facility_id, e)
        })
    }
}

pub struct PackageOnboardingResolver {
    http: UpstreamClient,
    url: String,
    male_gender_code: String,
}

impl PackageOnboardingResolver {
    pub fn new(upstream: &UpstreamSettings, tenants: &TenantSettings) -> Result<Self, SlotError> {
        Ok(Self {
            http: UpstreamClient::new(upstream)?,
            url: upstream.package_listing_url.clone(),
            male_gender_code: tenants.male_gender_code.clone(),
        })
    }

    pub fn request_body(request: &SlotRequest) -> Value {
        json!({
            "corporate": request.corporate_id,
            "provider_id": request.provider_id,
            "facility_id": request.clinic_id,
            "internal_package_id": request.internal_package_id,
        })
    }

    /// Picks the gender-specific id when the package id is a
    /// `{"Male": .., "Female": ..}` document; otherwise returns it as is.
    pub fn package_for_gender(&self, external_package_id: &Value, gender: Option<&str>) -> Value {
        let Some(raw) = external_package_id.as_str() else {
            return external_package_id.clone();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(by_gender)) if !by_gender.is_empty() => {
                let is_male = gender.is_some_and(|g| same_gender_code(g, &self.male_gender_code));
                let pick = if is_male { "Male" } else { "Female" };
                by_gender.get(pick).cloned().unwrap_or(Value::Null)
            }
            Ok(_) => external_package_id.clone(),
            Err(e) => {
                debug!("external_package_id is not a gender map: {}", e);
                external_package_id.clone()
            }
        }
    }

    pub fn routing_from(&self, response: &Value, gender: Option<&str>) -> Result<RoutingDetails, SlotError> {
        let record = match response {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        let external_package_id = record.get("external_package_id").ok_or_else(|| {
            SlotError::InvalidResponse {
                upstream: PACKAGES,
                reason: format!("No package details found in {}", response),
            }
        })?;

        let package = self.package_for_gender(external_package_id, gender);
        if package.is_null() {
            warn!("Package map has no entry for gender {:?}", gender);
        }

        Ok(RoutingDetails {
            doctor_id: None,
            additional_info: Some(Value::String(
                json!({ "ext_bat_package_id": package }).to_string(),
            )),
        })
    }
}

#[async_trait]
impl PackageResolver for PackageOnboardingResolver {
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, provider = %request.provider_id))]
    async fn resolve(&self, request: &SlotRequest) -> Result<RoutingDetails, SlotError> {
        let body = Self::request_body(request).to_string();
        let response = self
            .http
            .post_json(PACKAGES, &self.url, UpstreamClient::default_headers(), body)
            .await?;
        debug!("Package onboarding response: {}", response);

        self.routing_from(&response, request.gender.as_deref())
            .inspect_err(|e| error!("Package onboarding gave no package: {}", e))
    }
}

/// Numeric codes compare by value, so `"01"` matches `"1"`.
fn same_gender_code(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
