use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use shared_cache::JsonCache;
use shared_config::SlotSettings;

use crate::error::SlotError;
use crate::models::{
    decode_nested, CenterSlots, DaySlotResult, ProviderSlots, SlotEntry, SlotRequest, SlotStatus,
    SlotWindow, TimeWiseSlots, ALL_DAY, CONSULTATION_SERVICE_TYPE,
};
use crate::services::clock::Clock;
use crate::services::keys::reservation_key;

/// Builds the day list returned to callers: the requested day with its
/// classified slots, every other day in the window as an empty placeholder.
pub struct DaySlotMapper {
    cache: Arc<dyn JsonCache>,
    clock: Arc<dyn Clock>,
    slot_list_days: i64,
    hold_time: String,
    utc_offset_minutes: i32,
}

impl DaySlotMapper {
    pub fn new(cache: Arc<dyn JsonCache>, clock: Arc<dyn Clock>, settings: &SlotSettings) -> Self {
        Self {
            cache,
            clock,
            slot_list_days: settings.slot_list_days,
            hold_time: settings.slot_hold_time.clone(),
            utc_offset_minutes: settings.reference_utc_offset_minutes,
        }
    }

    /// One result per day starting today, in day order.
    #[instrument(skip(self, request, source), fields(date = %request.date, slots = source.slots.len()))]
    pub async fn map(
        &self,
        request: &SlotRequest,
        source: &ProviderSlots,
    ) -> Result<Vec<DaySlotResult>, SlotError> {
        let today = self.clock.today();
        let days = (0..self.slot_list_days).map(|offset| {
            let day = today + Duration::days(offset);
            self.map_day(day, request, source)
        });

        join_all(days).await.into_iter().collect()
    }

    async fn map_day(
        &self,
        day: NaiveDate,
        request: &SlotRequest,
        source: &ProviderSlots,
    ) -> Result<DaySlotResult, SlotError> {
        if day != request.date {
            return Ok(DaySlotResult::placeholder(day, &self.hold_time));
        }

        let windows = source
            .slots
            .iter()
            .map(|slot| {
                SlotWindow::from_provider_times(
                    day,
                    &slot.slot_start_time,
                    &slot.slot_end_time,
                    self.utc_offset_minutes,
                )
                .map_err(|reason| SlotError::InvalidResponse {
                    upstream: "bifrost",
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let reservations = self.reservations(request, &windows).await?;
        let date_id = day.format("%Y-%m-%d");

        let slot_list = source
            .slots
            .iter()
            .zip(&reservations)
            .enumerate()
            .map(|(index, (slot, reservation))| SlotEntry {
                id: format!("{}-{}", date_id, index + 1),
                start_time: slot.slot_start_time.clone(),
                end_time: slot.slot_end_time.clone(),
                status: classify(slot.is_booked(), reservation.as_ref(), &request.patient_user_id),
                additional_info: slot.additional_info.clone(),
            })
            .collect();

        let count = source.slots.len();
        Ok(DaySlotResult {
            consultation_service_type: CONSULTATION_SERVICE_TYPE.to_string(),
            date: request.date_label(),
            available_slot_count: count,
            block_slot_hold_time: self.hold_time.clone(),
            next_available_date: source.next_available_date.clone(),
            slot_available: Some(source.slot_available.clone()),
            time_wise_slots_list: vec![TimeWiseSlots {
                part_of_the_day: ALL_DAY.to_string(),
                available_slot_count: count,
                center_wise_slots_list: vec![CenterSlots {
                    center_name: request.facility_name.clone(),
                    partner_consult_center_id: String::new(),
                    consultation_fees: 0,
                    mrn_required: false,
                    patient_consent_required: false,
                    patient_consent_box_text: String::new(),
                    partner_name: request.tenant_id.clone(),
                    slot_list,
                }],
            }],
        })
    }

    /// Reservation records aligned with `windows`. An unreachable cache means
    /// no known reservations; a corrupt record fails the request.
    async fn reservations(
        &self,
        request: &SlotRequest,
        windows: &[SlotWindow],
    ) -> Result<Vec<Option<Value>>, SlotError> {
        let keys: Vec<String> = windows
            .iter()
            .map(|window| reservation_key(window, &request.facility_id, &request.provider_id))
            .collect();
        debug!("Reservation keys: {:?}", keys);

        match self.cache.mget_json(&keys).await {
            Ok(values) => Ok(values),
            Err(e) if e.is_transient() => {
                warn!("Reservation lookup failed, treating slots as unreserved: {}", e);
                Ok(vec![None; keys.len()])
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Reserved when the provider says booked, or another patient holds the
/// window in the cache.
pub fn classify(provider_booked: bool, reservation: Option<&Value>, patient_user_id: &str) -> SlotStatus {
    if provider_booked {
        return SlotStatus::Reserved;
    }

    let record = match reservation.cloned().map(decode_nested) {
        None | Some(Value::Null) => return SlotStatus::Available,
        Some(record) => record,
    };

    let holder = match record.get("patient_user_id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    match holder {
        Some(holder) if holder == patient_user_id => SlotStatus::Available,
        _ => SlotStatus::Reserved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_rules() {
        let other = json!({"patient_user_id": "U2"});
        let same = json!({"patient_user_id": "U1"});
        let numeric = json!({"patient_user_id": 1});

        assert_eq!(classify(false, None, "U1"), SlotStatus::Available);
        assert_eq!(classify(true, None, "U1"), SlotStatus::Reserved);
        assert_eq!(classify(false, Some(&other), "U1"), SlotStatus::Reserved);
        assert_eq!(classify(false, Some(&same), "U1"), SlotStatus::Available);
        assert_eq!(classify(true, Some(&same), "U1"), SlotStatus::Reserved);
        assert_eq!(classify(false, Some(&numeric), "1"), SlotStatus::Available);
        assert_eq!(classify(false, Some(&json!({})), "U1"), SlotStatus::Reserved);

        let wrapped_same = Value::String(same.to_string());
        let wrapped_other = Value::String(other.to_string());
        assert_eq!(classify(false, Some(&wrapped_same), "U1"), SlotStatus::Available);
        assert_eq!(classify(false, Some(&wrapped_other), "U1"), SlotStatus::Reserved);
    }
}
