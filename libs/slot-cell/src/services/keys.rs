//! Cache key builders.
//!
//! - `tenant-slots-{date}-{tenant}-{user_corporate}-{external_facility}-{service_type}-{facility}-{external_location}`
//!   holds the mapped day list.
//! - `tenant-slots-bifrost-response-{same tuple}` holds the raw provider result.
//! - `PME_{start}_{end}_FACILITY_{facility}_PROVIDER_{provider}` holds a
//!   reservation for one slot window, times in UTC as `%d_%m_%YT%H:%M:%S`.
//!
//! Field order and separators are shared with every other service reading
//! these keys and must not change.

use crate::models::{SlotRequest, SlotWindow};

pub const MAPPED_SLOTS_PREFIX: &str = "tenant-slots";
pub const RAW_RESPONSE_PREFIX: &str = "tenant-slots-bifrost-response";
pub const RESERVATION_PREFIX: &str = "PME";
const RESERVATION_TIME_FORMAT: &str = "%d_%m_%YT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCacheKeys {
    pub mapped: String,
    pub raw: String,
}

impl SlotCacheKeys {
    pub fn for_request(request: &SlotRequest) -> Self {
        let tuple = format!(
            "{}-{}-{}-{}-{}-{}-{}",
            request.date_label(),
            request.tenant_id,
            request.user_corporate_id,
            request.external_facility_id,
            request.service_type_id,
            request.facility_id,
            request.external_facility_location,
        );

        Self {
            mapped: format!("{}-{}", MAPPED_SLOTS_PREFIX, tuple),
            raw: format!("{}-{}", RAW_RESPONSE_PREFIX, tuple),
        }
    }
}

pub fn reservation_key(window: &SlotWindow, facility_id: &str, provider_id: &str) -> String {
    format!(
        "{}_{}_{}_FACILITY_{}_PROVIDER_{}",
        RESERVATION_PREFIX,
        window.start.format(RESERVATION_TIME_FORMAT),
        window.end.format(RESERVATION_TIME_FORMAT),
        facility_id,
        provider_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotRequestPayload;
    use chrono::NaiveDate;
    use serde_json::json;

    fn request(value: serde_json::Value) -> SlotRequest {
        let payload: SlotRequestPayload = serde_json::from_value(value).unwrap();
        SlotRequest::try_from(payload).unwrap()
    }

    #[test]
    fn keys_follow_the_shared_layout() {
        let keys = SlotCacheKeys::for_request(&request(json!({
            "date": "15-03-2025", "tenant_id": "manipal", "facility_id": "F1",
            "provider_id": "P1", "patient_user_id": "U1", "user_corporate_id": "C9",
            "external_facility_id": "EXT1", "service_type_id": "4",
            "external_facility_location": "BLR"
        })));

        assert_eq!(keys.mapped, "tenant-slots-15-03-2025-manipal-C9-EXT1-4-F1-BLR");
        assert_eq!(keys.raw, "tenant-slots-bifrost-response-15-03-2025-manipal-C9-EXT1-4-F1-BLR");
    }

    #[test]
    fn equivalent_requests_share_keys() {
        let a = request(json!({
            "date": "5-3-2025", "tenant_id": "manipal ", "facility_id": 1,
            "provider_id": "P1", "patient_user_id": "U1"
        }));
        let b = request(json!({
            "date": "05-03-2025", "tenant_id": "manipal", "facility_id": "1",
            "provider_id": "P1", "patient_user_id": "U2", "has_api_integration": true
        }));

        assert_eq!(SlotCacheKeys::for_request(&a), SlotCacheKeys::for_request(&b));
    }

    #[test]
    fn reservation_key_uses_utc_window() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let window = SlotWindow::from_provider_times(date, "9:00 AM", "9:30 AM", 330).unwrap();

        assert_eq!(
            reservation_key(&window, "F1", "P1"),
            "PME_15_03_2025T03:30:00_15_03_2025T04:00:00_FACILITY_F1_PROVIDER_P1"
        );
    }
}
