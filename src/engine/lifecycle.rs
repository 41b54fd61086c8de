use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::effects::apply_effects;
use crate::engine::transitions::{
    self, CleanerCredentials, Command, DeliveryRequester, DriverCredentials, OpenOrder,
    StaffCredentials, Transition,
};
use crate::error::AppError;
use crate::models::actor::{ActorKind, ActorRef};
use crate::models::event::OrderEvent;
use crate::models::order::{DriverRole, Order, OrderOrigin, ServiceLine};
use crate::state::AppState;

/// What a lifecycle operation hands back: the committed order plus any
/// registry updates that failed after the commit.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutcome {
    pub order: Order,
    pub registry_warnings: Vec<String>,
}

pub fn post_order(
    state: &AppState,
    client_id: Uuid,
    unit_id: Option<Uuid>,
) -> Result<LifecycleOutcome, AppError> {
    if let Some(unit_id) = unit_id {
        let unit = state.units.get(unit_id)?;
        if !unit.client.is(client_id) {
            return Err(AppError::BadRequest(format!(
                "unit {unit_id} does not belong to client {client_id}"
            )));
        }
    }

    let opened = transitions::open(
        OpenOrder {
            id: Uuid::new_v4(),
            client_id,
            unit: unit_id,
            origin: OrderOrigin::Client,
        },
        Utc::now(),
    );
    open_order(state, "post_order", opened)
}

/// Opens an order on the spot for a unit the driver is standing at. A unit
/// that already has an order, is inactive, or changed resident meanwhile
/// leaves nothing behind.
pub fn create_order_for_unit(
    state: &AppState,
    unit_id: Uuid,
    driver_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let driver = state.driver(driver_id)?;
    if !driver.background_checked {
        return Err(AppError::InvalidTransition(format!(
            "driver {driver_id} has not passed the background check"
        )));
    }

    let unit = state.units.get(unit_id)?;
    let client_id = unit
        .client
        .id()
        .ok_or_else(|| AppError::Conflict(format!("unit {unit_id} has no resident")))?;

    let opened = transitions::open(
        OpenOrder {
            id: Uuid::new_v4(),
            client_id,
            unit: Some(unit_id),
            origin: OrderOrigin::Unit { unit_id, driver_id },
        },
        Utc::now(),
    );
    open_order(state, "create_order_for_unit", opened)
}

pub fn claim_order(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    role: DriverRole,
) -> Result<LifecycleOutcome, AppError> {
    let driver = driver_credentials(state, driver_id)?;
    execute(state, order_id, Command::Claim { driver, role })
}

pub fn record_client_pickup(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    state.driver(driver_id)?;
    execute(state, order_id, Command::RecordClientPickup { driver_id })
}

pub fn drop_at_cleaner(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    cleaner_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    state.driver(driver_id)?;
    let cleaner = state.cleaner(cleaner_id)?;
    execute(
        state,
        order_id,
        Command::DropAtCleaner {
            driver_id,
            cleaner: CleanerCredentials {
                id: cleaner.id,
                address: cleaner.address,
            },
        },
    )
}

pub fn approve_drop_off(
    state: &AppState,
    order_id: Uuid,
    staff_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let staff = staff_credentials(state, staff_id)?;
    execute(state, order_id, Command::ApproveDropOff { staff })
}

pub fn set_pricing(
    state: &AppState,
    order_id: Uuid,
    staff_id: Uuid,
    lines: &[ServiceLine],
) -> Result<LifecycleOutcome, AppError> {
    let staff = staff_credentials(state, staff_id)?;
    let services = state.pricing.price(lines)?;
    execute(state, order_id, Command::SetPricing { staff, services })
}

pub fn load_machine(
    state: &AppState,
    order_id: Uuid,
    staff_id: Uuid,
    machine_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let staff = staff_credentials(state, staff_id)?;
    execute(state, order_id, Command::LoadMachine { staff, machine_id })
}

pub fn unload_machine(
    state: &AppState,
    order_id: Uuid,
    staff_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let staff = staff_credentials(state, staff_id)?;
    execute(state, order_id, Command::UnloadMachine { staff })
}

pub fn mark_ready(
    state: &AppState,
    order_id: Uuid,
    staff_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let staff = staff_credentials(state, staff_id)?;
    execute(state, order_id, Command::MarkReady { staff })
}

pub fn request_delivery(
    state: &AppState,
    order_id: Uuid,
    actor: ActorRef,
) -> Result<LifecycleOutcome, AppError> {
    let requester = match actor.kind {
        ActorKind::Client => DeliveryRequester::Client(actor.id),
        ActorKind::CleanerStaff => DeliveryRequester::Staff(staff_credentials(state, actor.id)?),
        other => {
            return Err(AppError::InvalidTransition(format!(
                "{other} may not request delivery"
            )));
        }
    };
    execute(state, order_id, Command::RequestDelivery { requester })
}

pub fn report_en_route(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    state.driver(driver_id)?;
    execute(state, order_id, Command::ReportEnRoute { driver_id })
}

pub fn cleaner_pickup(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    let driver = driver_credentials(state, driver_id)?;
    execute(state, order_id, Command::CleanerPickup { driver })
}

pub fn client_dropoff(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<LifecycleOutcome, AppError> {
    state.driver(driver_id)?;
    execute(state, order_id, Command::ClientDropoff { driver_id })
}

pub fn cancel(
    state: &AppState,
    order_id: Uuid,
    actor: ActorRef,
) -> Result<LifecycleOutcome, AppError> {
    match actor.kind {
        ActorKind::Driver => {
            state.driver(actor.id)?;
        }
        ActorKind::CleanerStaff => {
            state.staff_member(actor.id)?;
        }
        ActorKind::Client | ActorKind::Management | ActorKind::System => {}
    }
    execute(state, order_id, Command::Cancel { actor })
}

/// Billing-provider callback.
pub fn mark_paid(state: &AppState, order_id: Uuid) -> Result<LifecycleOutcome, AppError> {
    execute(state, order_id, Command::MarkPaid)
}

/// Orders posted and waiting for a driver, oldest first.
pub fn available_orders(state: &AppState) -> Vec<Order> {
    state
        .orders
        .list(None)
        .into_iter()
        .filter(|order| order.status.is_posted())
        .collect()
}

pub fn driver_active_orders(state: &AppState, driver_id: Uuid) -> Result<Vec<Order>, AppError> {
    state.driver(driver_id)?;
    Ok(resolve_orders(state, state.driver_orders.orders(driver_id)?))
}

pub fn cleaner_active_orders(state: &AppState, cleaner_id: Uuid) -> Result<Vec<Order>, AppError> {
    state.cleaner(cleaner_id)?;
    Ok(resolve_orders(state, state.cleaner_orders.orders(cleaner_id)?))
}

/// Active-set views may briefly lag the orders they point at; ids that no
/// longer resolve are skipped rather than failing the whole view.
fn resolve_orders(state: &AppState, ids: Vec<Uuid>) -> Vec<Order> {
    ids.into_iter()
        .filter_map(|id| state.orders.get(id).ok())
        .collect()
}

fn driver_credentials(state: &AppState, driver_id: Uuid) -> Result<DriverCredentials, AppError> {
    let driver = state.driver(driver_id)?;
    Ok(DriverCredentials {
        id: driver.id,
        background_checked: driver.background_checked,
    })
}

fn staff_credentials(state: &AppState, staff_id: Uuid) -> Result<StaffCredentials, AppError> {
    let staff = state.staff_member(staff_id)?;
    Ok(StaffCredentials {
        id: staff.id,
        cleaner_id: staff.cleaner_id,
    })
}

fn open_order(
    state: &AppState,
    operation: &'static str,
    opened: Transition,
) -> Result<LifecycleOutcome, AppError> {
    let start = Instant::now();
    let Transition { order, effects } = opened;

    // A unit order is inserted while the unit entry is locked, so the unit
    // never points at an order the store does not have yet.
    let committed = match order.unit {
        Some(unit_id) => state
            .units
            .reserve_for(unit_id, order.id, order.client_id, || {
                state.orders.insert(order.clone())
            })
            .map(|_| ()),
        None => state.orders.insert(order.clone()),
    };
    if let Err(err) = committed {
        record(state, operation, err.kind(), start);
        return Err(err);
    }

    record(state, operation, "committed", start);
    state.metrics.open_orders.inc();
    info!(order_id = %order.id, client_id = %order.client_id, status = %order.status, operation, "order opened");

    let registry_warnings = apply_effects(state, &effects);
    publish(state, &order);

    Ok(LifecycleOutcome {
        order,
        registry_warnings,
    })
}

/// Runs one command through the conditional update, then the registry
/// effects, then the live feed.
fn execute(state: &AppState, order_id: Uuid, command: Command) -> Result<LifecycleOutcome, AppError> {
    let start = Instant::now();
    let operation = command.operation();
    let actor = command.actor();

    let committed = state.orders.update_if(order_id, |current| {
        let transition = transitions::apply(current, &command, Utc::now())?;
        let was_open = !current.status.is_terminal();
        Ok((transition.order, (transition.effects, was_open)))
    });

    let (order, (effects, was_open)) = match committed {
        Ok(committed) => committed,
        Err(err) => {
            debug!(%order_id, %actor, operation, error = %err, "transition rejected");
            record(state, operation, err.kind(), start);
            return Err(err);
        }
    };

    record(state, operation, "committed", start);
    if was_open && order.status.is_terminal() {
        state.metrics.open_orders.dec();
    }
    info!(%order_id, %actor, operation, status = %order.status, "order transitioned");

    let registry_warnings = apply_effects(state, &effects);
    publish(state, &order);

    Ok(LifecycleOutcome {
        order,
        registry_warnings,
    })
}

fn record(state: &AppState, operation: &str, outcome: &str, start: Instant) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[operation, outcome])
        .inc();
    state
        .metrics
        .order_transition_latency_seconds
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}

fn publish(state: &AppState, order: &Order) {
    if let Some(entry) = order.event_log.last() {
        // No subscribers is the common case and not an error.
        let _ = state.order_events_tx.send(OrderEvent {
            order_id: order.id,
            status: order.status,
            entry: entry.clone(),
        });
    }
}
