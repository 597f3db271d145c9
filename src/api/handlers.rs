use std::collections::BTreeMap;
use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use log::error;

use crate::data::PriceStore;
use crate::db::PriceRepository;

#[derive(Clone)]
pub struct ApiState {
    pub price_store: PriceStore,
    pub repository: Arc<dyn PriceRepository>,
}

// GET /v1/stocks - Full persisted history, newest first
pub async fn get_all_stocks(State(state): State<ApiState>) -> Response {
    match state.repository.load_all().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            error!("Failed to fetch stock prices: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch stock prices").into_response()
        }
    }
}

// GET /v1/prices - Live price table
pub async fn get_current_prices(State(state): State<ApiState>) -> Json<BTreeMap<String, f64>> {
    Json(state.price_store.snapshot_all())
}

// GET /api/health - Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stock_notifier",
        "timestamp": chrono::Utc::now()
    }))
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let v1_routes = Router::new()
        .route("/stocks", get(get_all_stocks))
        .route("/prices", get(get_current_prices))
        .with_state(state);

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/v1", v1_routes)
}
