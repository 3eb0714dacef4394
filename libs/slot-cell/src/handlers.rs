use std::sync::Arc;

use axum::{extract::State, Json};

use shared_models::error::AppError;

use crate::models::{SlotRequest, SlotRequestPayload, SlotResponse};
use crate::services::SlotOrchestrator;

#[axum::debug_handler]
pub async fn get_slots(
    State(orchestrator): State<Arc<SlotOrchestrator>>,
    Json(payload): Json<SlotRequestPayload>,
) -> Result<Json<SlotResponse>, AppError> {
    let request = SlotRequest::try_from(payload)?;
    let response = orchestrator.get_slots(&request).await?;
    Ok(Json(response))
}
