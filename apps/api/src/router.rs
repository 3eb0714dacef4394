use std::sync::Arc;

use axum::{routing::get, Router};

use slot_cell::{slot_routes, SlotOrchestrator};

pub fn create_router(orchestrator: Arc<SlotOrchestrator>) -> Router {
    Router::new()
        .route("/", get(|| async { "PME slot API is running!" }))
        .nest("/slots", slot_routes(orchestrator))
}
