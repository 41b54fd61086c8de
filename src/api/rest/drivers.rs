use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::actor::Driver;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/background-check", patch(update_background_check))
        .route("/drivers/:id/active-orders", get(active_orders))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    #[serde(default)]
    pub background_checked: bool,
}

#[derive(Deserialize)]
pub struct BackgroundCheckRequest {
    pub background_checked: bool,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    Ok(Json(state.add_driver(payload.name, payload.background_checked)))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by_key(|driver| driver.created_at);
    Json(drivers)
}

async fn update_background_check(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BackgroundCheckRequest>,
) -> Result<Json<Driver>, AppError> {
    state
        .set_background_check(id, payload.background_checked)
        .map(Json)
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    lifecycle::driver_active_orders(&state, id).map(Json)
}
