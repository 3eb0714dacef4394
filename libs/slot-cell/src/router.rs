use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers;
use crate::services::SlotOrchestrator;

pub fn slot_routes(orchestrator: Arc<SlotOrchestrator>) -> Router {
    Router::new()
        .route("/", post(handlers::get_slots))
        .with_state(orchestrator)
}
