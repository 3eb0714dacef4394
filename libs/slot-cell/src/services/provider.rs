use async_trait::async_trait;
use chrono::NaiveDate;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, instrument};

use shared_config::UpstreamSettings;

use crate::error::SlotError;
use crate::models::{SlotRequest, DATE_FORMAT};
use crate::services::upstream::UpstreamClient;

const UPSTREAM: &str = "bifrost";

/// Source of raw slot records for one facility and provider.
#[async_trait]
pub trait SlotProvider: Send + Sync {
    /// Returns the provider `result` untouched: a slot list, a summary
    /// object, or `{}` when nothing is available.
    async fn fetch_slots(&self, request: &SlotRequest, end_date: NaiveDate)
        -> Result<Value, SlotError>;
}

pub struct BifrostSlotProvider {
    http: UpstreamClient,
    url: String,
    secret: String,
}

impl BifrostSlotProvider {
    pub fn new(settings: &UpstreamSettings) -> Result<Self, SlotError> {
        Ok(Self {
            http: UpstreamClient::new(settings)?,
            url: settings.bifrost_url.clone(),
            secret: settings.bifrost_secret.clone(),
        })
    }

    pub fn request_body(request: &SlotRequest, end_date: NaiveDate) -> Value {
        let tenant = request.tenant_id.as_str();
        json!({
            "data": {
                "clinicid": request.clinic_id.clone().unwrap_or_default(),
                "doctorid": request.doctor_id.as_deref().unwrap_or_default().trim(),
                "appointmenttype": "PME",
                "user_corp_partner_auth_id": request.user_corporate_id,
                "ext_health_center_id": request.external_facility_id,
                "date": request.date_label(),
                "ext_health_center_location": request.external_facility_location,
                "provider_id": request.provider_id,
                "pincode": request.pincode.clone().unwrap_or_default(),
                "additional_info": request.additional_info.clone().unwrap_or(Value::Null),
                "end_date": end_date.format(DATE_FORMAT).to_string(),
            },
            "metadata": {
                "interface_key": format!("jhhservice_{}_bat_slot_list", tenant),
                "integration_name": tenant,
                "source": "jhhservice",
            }
        })
    }

    /// Hex HMAC-SHA256 of the exact body bytes sent on the wire.
    pub fn checksum(secret: &str, body: &str) -> Result<String, SlotError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| SlotError::Routing(format!("Invalid Bifrost secret: {}", e)))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn headers(tenant_id: &str, checksum: &str) -> Result<HeaderMap, SlotError> {
        let value = |raw: &str| {
            HeaderValue::from_str(raw)
                .map_err(|e| SlotError::Validation(format!("Invalid header value {:?}: {}", raw, e)))
        };

        let mut headers = UpstreamClient::default_headers();
        headers.insert("tenantid", value(tenant_id)?);
        headers.insert("event", HeaderValue::from_static("OUT_GET_BAT_SLOT"));
        headers.insert("checksum", value(checksum)?);
        headers.insert("requesttype", HeaderValue::from_static("sync"));
        headers.insert("pme-identifier", HeaderValue::from_static("true"));
        Ok(headers)
    }

    fn unwrap_envelope(envelope: Value) -> Result<Value, SlotError> {
        let status_code = envelope.get("status_code").and_then(Value::as_i64);
        let status = envelope.get("status").and_then(Value::as_str);

        match (status_code, status) {
            (Some(200), Some("success")) => Ok(envelope
                .get("result")
                .cloned()
                .unwrap_or_else(|| json!({}))),
            (Some(204), _) => Ok(json!({})),
            _ => {
                error!("Unexpected response from Bifrost: {}", envelope);
                Err(SlotError::InvalidResponse {
                    upstream: UPSTREAM,
                    reason: format!("unexpected envelope: {}", envelope),
                })
            }
        }
    }
}

#[async_trait]
impl SlotProvider for BifrostSlotProvider {
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, facility = %request.facility_id))]
    async fn fetch_slots(
        &self,
        request: &SlotRequest,
        end_date: NaiveDate,
    ) -> Result<Value, SlotError> {
        let body = Self::request_body(request, end_date).to_string();
        let checksum = Self::checksum(&self.secret, &body)?;
        let headers = Self::headers(&request.tenant_id, &checksum)?;

        let envelope = self.http.post_json(UPSTREAM, &self.url, headers, body).await?;
        let result = Self::unwrap_envelope(envelope)?;
        info!("Bifrost returned slots for {}", request.date_label());
        Ok(result)
    }
}
