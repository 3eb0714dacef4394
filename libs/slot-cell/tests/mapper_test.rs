mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use shared_cache::{JsonCache, MemoryCache, SetMode};
use slot_cell::{
    reservation_key, DaySlotMapper, FixedClock, ProviderSlots, SlotStatus, SlotWindow,
};

use common::*;

fn mapper(cache: Arc<MemoryCache>, days: i64) -> DaySlotMapper {
    let mut settings = config().slots;
    settings.slot_list_days = days;
    DaySlotMapper::new(cache, Arc::new(FixedClock(at(15, 3, 2025, 9, 0, 0))), &settings)
}

async fn reserve(cache: &MemoryCache, start: &str, end: &str, patient: &str) {
    let window = SlotWindow::from_provider_times(date(15, 3, 2025), start, end, 330).unwrap();
    cache
        .set_json(
            &reservation_key(&window, "F1", "P1"),
            &json!({"patient_user_id": patient}),
            Duration::from_secs(60),
            SetMode::Overwrite,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn reservation_classification_depends_on_patient() {
    let cache = Arc::new(MemoryCache::new());
    reserve(&cache, "9:00 AM", "9:30 AM", "U2").await;
    reserve(&cache, "9:30 AM", "10:00 AM", "U1").await;
    let source = ProviderSlots::from_value(&json!([
        {"slot_start_time": "9:00 AM", "slot_end_time": "9:30 AM", "isbooked": 0},
        {"slot_start_time": "9:30 AM", "slot_end_time": "10:00 AM", "isbooked": 0},
        {"slot_start_time": "10:00 AM", "slot_end_time": "10:30 AM", "isbooked": 0}
    ]))
    .unwrap();

    let days = mapper(cache.clone(), 3).map(&scenario_request(), &source).await.unwrap();

    let statuses: Vec<_> = days[0].slots().map(|s| s.status).collect();
    assert_eq!(statuses, [SlotStatus::Reserved, SlotStatus::Available, SlotStatus::Available]);
    assert_eq!(days[0].available_slot_count, 3);
    assert_eq!(days[0].time_wise_slots_list[0].available_slot_count, 3);
    assert_eq!(cache.reads(), 1);
}

#[tokio::test]
async fn window_length_and_order_follow_configuration() {
    let days = mapper(Arc::new(MemoryCache::new()), 4)
        .map(&scenario_request(), &ProviderSlots::empty())
        .await
        .unwrap();

    let dates: Vec<_> = days.iter().map(|d| d.date.as_str()).collect();
    assert_eq!(dates, ["15-03-2025", "16-03-2025", "17-03-2025", "18-03-2025"]);
    assert_eq!(days[0].slot_available, Some(json!(0)));
    assert_eq!(days[0].time_wise_slots_list[0].part_of_the_day, "All Day");
    assert!(days[1..].iter().all(|d| d.slot_available.is_none() && d.available_slot_count == 0));
}

#[tokio::test]
async fn target_outside_window_yields_only_placeholders() {
    let cache = Arc::new(MemoryCache::new());
    let far = request(json!({
        "date": "30-04-2025", "tenant_id": "manipal", "facility_id": "F1",
        "provider_id": "P1", "patient_user_id": "U1"
    }));

    let days = mapper(cache.clone(), 7)
        .map(&far, &ProviderSlots::from_value(&two_slots()).unwrap())
        .await
        .unwrap();

    assert_eq!(days.len(), 7);
    assert!(days.iter().all(|d| d.time_wise_slots_list.is_empty()));
    assert_eq!(cache.reads(), 0);
}

#[tokio::test]
async fn corrupt_reservation_fails_mapping() {
    let cache = Arc::new(MemoryCache::new());
    let window = SlotWindow::from_provider_times(date(15, 3, 2025), "9:00 AM", "9:30 AM", 330).unwrap();
    cache
        .insert_raw(&reservation_key(&window, "F1", "P1"), "{oops", Duration::from_secs(60))
        .await;

    let result = mapper(cache, 2)
        .map(&scenario_request(), &ProviderSlots::from_value(&two_slots()).unwrap())
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn string_wrapped_reservations_are_read_like_plain_ones() {
    let cache = Arc::new(MemoryCache::new());
    let first = SlotWindow::from_provider_times(date(15, 3, 2025), "9:00 AM", "9:30 AM", 330).unwrap();
    let second = SlotWindow::from_provider_times(date(15, 3, 2025), "9:30 AM", "10:00 AM", 330).unwrap();
    cache
        .insert_raw(
            &reservation_key(&first, "F1", "P1"),
            r#""{\"patient_user_id\":\"U1\"}""#,
            Duration::from_secs(60),
        )
        .await;
    cache
        .insert_raw(
            &reservation_key(&second, "F1", "P1"),
            r#""{\"patient_user_id\":\"U2\"}""#,
            Duration::from_secs(60),
        )
        .await;
    let source = ProviderSlots::from_value(&json!([
        {"slot_start_time": "9:00 AM", "slot_end_time": "9:30 AM", "isbooked": 0},
        {"slot_start_time": "9:30 AM", "slot_end_time": "10:00 AM", "isbooked": 0}
    ]))
    .unwrap();

    let days = mapper(cache, 1).map(&scenario_request(), &source).await.unwrap();

    let statuses: Vec<_> = days[0].slots().map(|s| s.status).collect();
    assert_eq!(statuses, [SlotStatus::Available, SlotStatus::Reserved]);
}
