use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::actor::{Cleaner, CleanerStaff};
use crate::models::catalog::Service;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cleaners", post(create_cleaner).get(list_cleaners))
        .route("/cleaners/:id/staff", post(add_staff))
        .route("/cleaners/:id/active-orders", get(active_orders))
        .route("/services", post(create_service).get(list_services))
}

#[derive(Deserialize)]
pub struct CreateCleanerRequest {
    pub name: String,
    pub address: String,
}

#[derive(Deserialize)]
pub struct AddStaffRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub price_cents: u64,
}

async fn create_cleaner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCleanerRequest>,
) -> Result<Json<Cleaner>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.address.trim().is_empty() {
        return Err(AppError::BadRequest("address cannot be empty".to_string()));
    }

    Ok(Json(state.add_cleaner(payload.name, payload.address)))
}

async fn list_cleaners(State(state): State<Arc<AppState>>) -> Json<Vec<Cleaner>> {
    let mut cleaners: Vec<Cleaner> = state
        .cleaners
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    cleaners.sort_by_key(|cleaner| cleaner.created_at);
    Json(cleaners)
}

async fn add_staff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddStaffRequest>,
) -> Result<Json<CleanerStaff>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    state.add_staff(id, payload.name).map(Json)
}

async fn active_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    lifecycle::cleaner_active_orders(&state, id).map(Json)
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.price_cents == 0 {
        return Err(AppError::BadRequest("price_cents must be > 0".to_string()));
    }

    Ok(Json(state.catalog.add(payload.name, payload.price_cents)))
}

async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<Service>> {
    Json(state.catalog.list())
}
