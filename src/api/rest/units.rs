use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{self, LifecycleOutcome};
use crate::error::AppError;
use crate::models::unit::Unit;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/units", post(create_unit))
        .route("/units/queue", get(list_queue))
        .route("/units/:id", get(get_unit))
        .route("/units/:id/client", patch(update_client))
        .route("/units/:id/active", patch(update_active))
        .route("/units/:id/queue", post(queue_unit).delete(dequeue_unit))
        .route("/units/:id/orders", post(create_order_for_unit))
}

#[derive(Deserialize)]
pub struct CreateUnitRequest {
    pub building: String,
    pub unit_number: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateClientRequest {
    pub client_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct UnitOrderRequest {
    pub driver_id: Uuid,
}

async fn create_unit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUnitRequest>,
) -> Result<Json<Unit>, AppError> {
    if payload.building.trim().is_empty() {
        return Err(AppError::BadRequest("building cannot be empty".to_string()));
    }

    if payload.unit_number.trim().is_empty() {
        return Err(AppError::BadRequest("unit_number cannot be empty".to_string()));
    }

    let unit = state.units.create(payload.building, payload.unit_number);
    match payload.client_id {
        Some(client_id) => state.units.set_client(unit.id, Some(client_id)).map(Json),
        None => Ok(Json(unit)),
    }
}

async fn get_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Unit>, AppError> {
    state.units.get(id).map(Json)
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<Unit>, AppError> {
    state.units.set_client(id, payload.client_id).map(Json)
}

async fn update_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<Unit>, AppError> {
    state.units.set_active(id, payload.is_active).map(Json)
}

async fn queue_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Unit>, AppError> {
    state.units.queue(id).map(Json)
}

async fn dequeue_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Unit>, AppError> {
    state.units.dequeue(id).map(Json)
}

async fn list_queue(State(state): State<Arc<AppState>>) -> Json<Vec<Unit>> {
    Json(state.units.queued())
}

async fn create_order_for_unit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UnitOrderRequest>,
) -> Result<Json<LifecycleOutcome>, AppError> {
    lifecycle::create_order_for_unit(&state, id, payload.driver_id).map(Json)
}
