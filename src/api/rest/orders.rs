use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{self, LifecycleOutcome};
use crate::error::AppError;
use crate::models::actor::ActorRef;
use crate::models::event::EventEntry;
use crate::models::order::{DriverRole, Order, OrderStatus, ServiceLine};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(post_order).get(list_orders))
        .route("/orders/available", get(available_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/events", get(order_events))
        .route("/orders/:id/claim", post(claim_order))
        .route("/orders/:id/client-pickup", post(record_client_pickup))
        .route("/orders/:id/drop-at-cleaner", post(drop_at_cleaner))
        .route("/orders/:id/approve-drop-off", post(approve_drop_off))
        .route("/orders/:id/pricing", put(set_pricing))
        .route(
            "/orders/:id/machine",
            post(load_machine).delete(unload_machine),
        )
        .route("/orders/:id/ready", post(mark_ready))
        .route("/orders/:id/request-delivery", post(request_delivery))
        .route("/orders/:id/en-route", post(report_en_route))
        .route("/orders/:id/cleaner-pickup", post(cleaner_pickup))
        .route("/orders/:id/client-dropoff", post(client_dropoff))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/payment", post(mark_paid))
}

#[derive(Deserialize)]
pub struct PostOrderRequest {
    pub client_id: Uuid,
    #[serde(default)]
    pub unit_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub driver_id: Uuid,
    pub role: DriverRole,
}

#[derive(Deserialize)]
pub struct DriverRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct DropAtCleanerRequest {
    pub driver_id: Uuid,
    pub cleaner_id: Uuid,
}

#[derive(Deserialize)]
pub struct StaffRequest {
    pub staff_id: Uuid,
}

#[derive(Deserialize)]
pub struct PricingRequest {
    pub staff_id: Uuid,
    pub services: Vec<ServiceLine>,
}

#[derive(Deserialize)]
pub struct LoadMachineRequest {
    pub staff_id: Uuid,
    pub machine_id: Uuid,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: ActorRef,
}

type Outcome = Result<Json<LifecycleOutcome>, AppError>;

async fn post_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PostOrderRequest>,
) -> Outcome {
    lifecycle::post_order(&state, payload.client_id, payload.unit_id).map(Json)
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    Json(state.orders.list(query.status))
}

async fn available_orders(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(lifecycle::available_orders(&state))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    state.orders.get(id).map(Json)
}

async fn order_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EventEntry>>, AppError> {
    let order = state.orders.get(id)?;
    Ok(Json(order.event_log.entries().to_vec()))
}

async fn claim_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClaimRequest>,
) -> Outcome {
    lifecycle::claim_order(&state, id, payload.driver_id, payload.role).map(Json)
}

async fn record_client_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Outcome {
    lifecycle::record_client_pickup(&state, id, payload.driver_id).map(Json)
}

async fn drop_at_cleaner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DropAtCleanerRequest>,
) -> Outcome {
    lifecycle::drop_at_cleaner(&state, id, payload.driver_id, payload.cleaner_id).map(Json)
}

async fn approve_drop_off(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StaffRequest>,
) -> Outcome {
    lifecycle::approve_drop_off(&state, id, payload.staff_id).map(Json)
}

async fn set_pricing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PricingRequest>,
) -> Outcome {
    lifecycle::set_pricing(&state, id, payload.staff_id, &payload.services).map(Json)
}

async fn load_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LoadMachineRequest>,
) -> Outcome {
    lifecycle::load_machine(&state, id, payload.staff_id, payload.machine_id).map(Json)
}

async fn unload_machine(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StaffRequest>,
) -> Outcome {
    lifecycle::unload_machine(&state, id, payload.staff_id).map(Json)
}

async fn mark_ready(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StaffRequest>,
) -> Outcome {
    lifecycle::mark_ready(&state, id, payload.staff_id).map(Json)
}

async fn request_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Outcome {
    lifecycle::request_delivery(&state, id, payload.actor).map(Json)
}

async fn report_en_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Outcome {
    lifecycle::report_en_route(&state, id, payload.driver_id).map(Json)
}

async fn cleaner_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Outcome {
    lifecycle::cleaner_pickup(&state, id, payload.driver_id).map(Json)
}

async fn client_dropoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverRequest>,
) -> Outcome {
    lifecycle::client_dropoff(&state, id, payload.driver_id).map(Json)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Outcome {
    lifecycle::cancel(&state, id, payload.actor).map(Json)
}

async fn mark_paid(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Outcome {
    lifecycle::mark_paid(&state, id).map(Json)
}
