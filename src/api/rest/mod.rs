pub mod cleaners;
pub mod drivers;
pub mod orders;
pub mod units;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::engine::reconcile::{reconcile_once, ReconcileReport};
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(units::router())
        .merge(drivers::router())
        .merge(cleaners::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/reconcile", post(reconcile))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    open_orders: usize,
    drivers: usize,
    cleaners: usize,
    units: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        open_orders: state.orders.open_count(),
        drivers: state.drivers.len(),
        cleaners: state.cleaners.len(),
        units: state.units.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn reconcile(State(state): State<Arc<AppState>>) -> Result<Json<ReconcileReport>, AppError> {
    reconcile_once(&state).map(Json)
}
