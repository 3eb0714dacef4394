use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::SlotError;

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const PROVIDER_TIME_FORMAT: &str = "%I:%M %p";
pub const CONSULTATION_SERVICE_TYPE: &str = "4";
pub const ALL_DAY: &str = "All Day";

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Incoming slot lookup body. Identifiers may arrive as strings or numbers
/// and flags as booleans or `"true"`/`"false"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotRequestPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tenant_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub facility_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub facility_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub provider_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub patient_user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub external_facility_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub external_facility_location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_corporate_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub service_type_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub corporate_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub clinic_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub internal_package_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pincode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub additional_info: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub has_api_integration: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_slots_managed_by_jhh: bool,
}

/// Validated, normalized slot lookup. Never mutated after construction;
/// tenant substitution and routing enrichment produce new values.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub tenant_id: String,
    pub facility_id: String,
    pub facility_name: String,
    pub provider_id: String,
    pub patient_user_id: String,
    pub external_facility_id: String,
    pub external_facility_location: String,
    pub user_corporate_id: String,
    pub service_type_id: String,
    pub corporate_id: Option<String>,
    pub clinic_id: Option<String>,
    pub internal_package_id: Option<String>,
    pub pincode: Option<String>,
    pub gender: Option<String>,
    pub doctor_id: Option<String>,
    pub additional_info: Option<Value>,
    pub end_date: Option<NaiveDate>,
    pub has_api_integration: bool,
    pub externally_managed: bool,
}

impl SlotRequest {
    /// Target date rendered the way every key and payload expects it.
    pub fn date_label(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn with_tenant(&self, tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            ..self.clone()
        }
    }

    pub fn with_routing(&self, routing: RoutingDetails) -> Self {
        Self {
            doctor_id: routing.doctor_id.or_else(|| self.doctor_id.clone()),
            additional_info: routing.additional_info.or_else(|| self.additional_info.clone()),
            ..self.clone()
        }
    }
}

impl TryFrom<SlotRequestPayload> for SlotRequest {
    type Error = SlotError;

    fn try_from(payload: SlotRequestPayload) -> Result<Self, Self::Error> {
        let date = parse_date("date", &required("date", payload.date)?)?;
        let end_date = match clean(payload.end_date) {
            Some(raw) => Some(parse_date("end_date", &raw)?),
            None => None,
        };

        Ok(Self {
            date,
            tenant_id: required("tenant_id", payload.tenant_id)?,
            facility_id: required("facility_id", payload.facility_id)?,
            facility_name: clean(payload.facility_name).unwrap_or_default(),
            provider_id: required("provider_id", payload.provider_id)?,
            patient_user_id: required("patient_user_id", payload.patient_user_id)?,
            external_facility_id: clean(payload.external_facility_id).unwrap_or_default(),
            external_facility_location: clean(payload.external_facility_location)
                .unwrap_or_default(),
            user_corporate_id: clean(payload.user_corporate_id).unwrap_or_default(),
            service_type_id: clean(payload.service_type_id).unwrap_or_default(),
            corporate_id: clean(payload.corporate_id),
            clinic_id: clean(payload.clinic_id),
            internal_package_id: clean(payload.internal_package_id),
            pincode: clean(payload.pincode),
            gender: clean(payload.gender),
            doctor_id: clean(payload.doctor_id),
            additional_info: payload.additional_info.filter(|v| !v.is_null()),
            end_date,
            has_api_integration: payload.has_api_integration,
            externally_managed: payload.is_slots_managed_by_jhh,
        })
    }
}

/// Identifiers merged into the provider request for tenants that need them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingDetails {
    pub doctor_id: Option<String>,
    pub additional_info: Option<Value>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &str, value: Option<String>) -> Result<String, SlotError> {
    clean(value).ok_or_else(|| SlotError::Validation(format!("{field} is required")))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, SlotError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| SlotError::Validation(format!("{field} must be dd-mm-YYYY, got {raw:?}")))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

// ==============================================================================
// PROVIDER MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSlot {
    pub slot_start_time: String,
    pub slot_end_time: String,
    #[serde(default)]
    pub isbooked: i64,
    #[serde(default = "empty_object")]
    pub additional_info: Value,
}

impl ProviderSlot {
    pub fn is_booked(&self) -> bool {
        self.isbooked != 0
    }
}

fn empty_object() -> Value {
    json!({})
}

/// Provider result normalized from either of its shapes: a bare slot list,
/// or an object carrying `slot_available`, `next_available_date` and `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSlots {
    pub slots: Vec<ProviderSlot>,
    pub slot_available: Value,
    pub next_available_date: Value,
}

impl ProviderSlots {
    /// Source used when the cutoff rule suppresses provider data.
    pub fn empty() -> Self {
        Self {
            slots: Vec::new(),
            slot_available: json!(0),
            next_available_date: Value::Null,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self {
                slots: Vec::new(),
                slot_available: Value::Null,
                next_available_date: Value::Null,
            }),
            Value::Array(_) => Ok(Self {
                slots: parse_slots(value)?,
                slot_available: Value::Null,
                next_available_date: Value::Null,
            }),
            Value::Object(map) => Ok(Self {
                slots: match map.get("result") {
                    Some(result) if !result.is_null() => parse_slots(result)?,
                    _ => Vec::new(),
                },
                slot_available: map.get("slot_available").cloned().unwrap_or(Value::Null),
                next_available_date: map
                    .get("next_available_date")
                    .cloned()
                    .unwrap_or(Value::Null),
            }),
            other => Err(format!("unexpected slot payload: {other}")),
        }
    }

    /// Drops the slots but keeps the provider's availability hints.
    pub fn without_slots(self) -> Self {
        Self {
            slots: Vec::new(),
            ..self
        }
    }
}

fn parse_slots(value: &Value) -> Result<Vec<ProviderSlot>, String> {
    Vec::<ProviderSlot>::deserialize(value).map_err(|e| format!("invalid slot list: {e}"))
}

/// True when a cached raw response carries nothing worth mapping.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Peers that share the cache store some values as a JSON string holding
/// the encoded document. Unwraps one such level; anything else is returned
/// unchanged.
pub fn decode_nested(value: Value) -> Value {
    if let Value::String(text) = &value {
        if let Ok(inner) = serde_json::from_str::<Value>(text) {
            return inner;
        }
    }
    value
}

/// One bookable interval, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl SlotWindow {
    /// Combines `date` with provider `h:mm AM/PM` strings read in the
    /// reference timezone and shifts the result to UTC.
    pub fn from_provider_times(
        date: NaiveDate,
        start: &str,
        end: &str,
        utc_offset_minutes: i32,
    ) -> Result<Self, String> {
        let offset = Duration::minutes(i64::from(utc_offset_minutes));
        let at = |raw: &str| {
            NaiveTime::parse_from_str(raw.trim(), PROVIDER_TIME_FORMAT)
                .map(|time| date.and_time(time) - offset)
                .map_err(|_| format!("unparseable slot time {raw:?}"))
        };

        Ok(Self {
            start: at(start)?,
            end: at(end)?,
        })
    }
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SlotStatus {
    Available,
    Reserved,
}

impl From<SlotStatus> for u8 {
    fn from(status: SlotStatus) -> Self {
        match status {
            SlotStatus::Available => 1,
            SlotStatus::Reserved => 2,
        }
    }
}

impl TryFrom<u8> for SlotStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SlotStatus::Available),
            2 => Ok(SlotStatus::Reserved),
            other => Err(format!("unknown slot status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: SlotStatus,
    #[serde(default = "empty_object")]
    pub additional_info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterSlots {
    pub center_name: String,
    pub partner_consult_center_id: String,
    pub consultation_fees: u32,
    pub mrn_required: bool,
    pub patient_consent_required: bool,
    pub patient_consent_box_text: String,
    pub partner_name: String,
    pub slot_list: Vec<SlotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWiseSlots {
    pub part_of_the_day: String,
    pub available_slot_count: usize,
    pub center_wise_slots_list: Vec<CenterSlots>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySlotResult {
    pub consultation_service_type: String,
    pub date: String,
    pub available_slot_count: usize,
    pub block_slot_hold_time: String,
    #[serde(default)]
    pub next_available_date: Value,
    /// Present on the requested day only, possibly as `null`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub slot_available: Option<Value>,
    #[serde(default)]
    pub time_wise_slots_list: Vec<TimeWiseSlots>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl DaySlotResult {
    pub fn placeholder(date: NaiveDate, hold_time: &str) -> Self {
        Self {
            consultation_service_type: CONSULTATION_SERVICE_TYPE.to_string(),
            date: date.format(DATE_FORMAT).to_string(),
            available_slot_count: 0,
            block_slot_hold_time: hold_time.to_string(),
            next_available_date: Value::String(String::new()),
            slot_available: None,
            time_wise_slots_list: Vec::new(),
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotEntry> {
        self.time_wise_slots_list
            .iter()
            .flat_map(|part| part.center_wise_slots_list.iter())
            .flat_map(|center| center.slot_list.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotResponse {
    pub status: String,
    pub data: Vec<DaySlotResult>,
}

impl SlotResponse {
    pub fn success(data: Vec<DaySlotResult>) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}
