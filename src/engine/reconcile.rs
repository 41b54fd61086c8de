use std::sync::Arc;

use serde::Serialize;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;
use crate::store::active_set::{ActiveSetKind, ActiveSetRegistry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub orders_scanned: usize,
    pub driver_repairs: usize,
    pub cleaner_repairs: usize,
    pub unit_repairs: usize,
    /// Open orders whose unit is held by another order or is inactive.
    pub unit_conflicts: usize,
}

impl ReconcileReport {
    pub fn total_repairs(&self) -> usize {
        self.driver_repairs + self.cleaner_repairs + self.unit_repairs
    }
}

pub async fn run_reconciliation_sweep(state: Arc<AppState>, period: Duration) {
    info!(period_secs = period.as_secs(), "reconciliation sweep started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup is quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match reconcile_once(&state) {
            Ok(report) if report.total_repairs() > 0 || report.unit_conflicts > 0 => {
                warn!(
                    driver_repairs = report.driver_repairs,
                    cleaner_repairs = report.cleaner_repairs,
                    unit_repairs = report.unit_repairs,
                    unit_conflicts = report.unit_conflicts,
                    "reconciliation repaired registry drift"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "reconciliation sweep failed"),
        }
    }
}

/// Brings every active set and every unit's active order back in line with
/// the order collection. The snapshot only nominates candidates: each repair
/// re-reads the order while the registry entry is locked, so a transition
/// that commits mid-sweep is never undone. Idempotent.
pub fn reconcile_once(state: &AppState) -> Result<ReconcileReport, AppError> {
    let orders = state.orders.list(None);
    let mut report = ReconcileReport {
        orders_scanned: orders.len(),
        ..ReconcileReport::default()
    };

    report.driver_repairs = repair_active_sets(state, &state.driver_orders, &orders)?;
    report.cleaner_repairs = repair_active_sets(state, &state.cleaner_orders, &orders)?;
    repair_units(state, &orders, &mut report)?;

    state.metrics.open_orders.set(state.orders.open_count() as i64);
    for (registry, repairs) in [
        ("driver", report.driver_repairs),
        ("cleaner", report.cleaner_repairs),
        ("unit", report.unit_repairs),
    ] {
        if repairs > 0 {
            state
                .metrics
                .reconciliation_repairs_total
                .with_label_values(&[registry])
                .inc_by(repairs as u64);
        }
    }

    Ok(report)
}

fn repair_active_sets(
    state: &AppState,
    registry: &ActiveSetRegistry,
    orders: &[Order],
) -> Result<usize, AppError> {
    let kind = registry.kind();
    let mut repairs = 0;

    for actor_id in registry.actors() {
        for order_id in registry.orders(actor_id)? {
            let stray = || !currently_holds(state, kind, actor_id, order_id);
            if registry.remove_if(actor_id, order_id, stray)? {
                warn!(%kind, %actor_id, %order_id, "removed stray active order");
                repairs += 1;
            }
        }
    }

    for order in orders {
        let Some(actor_id) = holder(order, kind) else {
            continue;
        };
        if registry.contains(actor_id, order.id) {
            continue;
        }
        if !registry.is_registered(actor_id) {
            // Held by an actor whose set was never created.
            if !in_directory(state, kind, actor_id) {
                warn!(%kind, %actor_id, order_id = %order.id, "open order held by unknown actor");
                continue;
            }
            registry.register(actor_id);
        }

        let held = || currently_holds(state, kind, actor_id, order.id);
        if registry.add_if(actor_id, order.id, held)? {
            warn!(%kind, %actor_id, order_id = %order.id, "restored missing active order");
            repairs += 1;
        }
    }

    Ok(repairs)
}

fn repair_units(
    state: &AppState,
    orders: &[Order],
    report: &mut ReconcileReport,
) -> Result<(), AppError> {
    for unit in state.units.list() {
        let Some(order_id) = unit.active_order() else {
            continue;
        };
        let released = || !occupies(state, order_id, unit.id);
        if state.units.clear_order_if(unit.id, order_id, released)? {
            warn!(unit_id = %unit.id, %order_id, "cleared unit pointing at closed order");
            report.unit_repairs += 1;
        }
    }

    for order in orders {
        let Some(unit_id) = order.occupied_unit() else {
            continue;
        };
        let still_open = || occupies(state, order.id, unit_id);
        match state.units.assign_order_if(unit_id, order.id, still_open) {
            Ok(true) => {
                warn!(%unit_id, order_id = %order.id, "restored unit active order");
                report.unit_repairs += 1;
            }
            Ok(false) => {}
            Err(AppError::NotFound(_)) => {
                warn!(%unit_id, order_id = %order.id, "open order references a missing unit");
            }
            Err(err) => {
                warn!(%unit_id, order_id = %order.id, error = %err, "could not restore unit active order");
                report.unit_conflicts += 1;
            }
        }
    }

    Ok(())
}

fn holder(order: &Order, kind: ActiveSetKind) -> Option<Uuid> {
    let holders = order.holders();
    match kind {
        ActiveSetKind::Driver => holders.driver,
        ActiveSetKind::Cleaner => holders.cleaner,
    }
}

/// Reads the latest committed order, not the sweep's snapshot.
fn currently_holds(state: &AppState, kind: ActiveSetKind, actor_id: Uuid, order_id: Uuid) -> bool {
    state
        .orders
        .get(order_id)
        .is_ok_and(|order| holder(&order, kind) == Some(actor_id))
}

fn occupies(state: &AppState, order_id: Uuid, unit_id: Uuid) -> bool {
    state
        .orders
        .get(order_id)
        .is_ok_and(|order| order.occupied_unit() == Some(unit_id))
}

fn in_directory(state: &AppState, kind: ActiveSetKind, actor_id: Uuid) -> bool {
    match kind {
        ActiveSetKind::Driver => state.drivers.contains_key(&actor_id),
        ActiveSetKind::Cleaner => state.cleaners.contains_key(&actor_id),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::reconcile_once;
    use crate::engine::lifecycle::{
        cancel, claim_order, drop_at_cleaner, post_order, record_client_pickup,
    };
    use crate::models::actor::{ActorRef, Cleaner};
    use crate::error::AppError;
    use crate::models::order::DriverRole;
    use crate::state::AppState;

    #[test]
    fn consistent_state_needs_no_repairs() {
        let state = AppState::new(16);
        let driver = state.add_driver("Avery".to_string(), true).id;
        let id = post_order(&state, Uuid::new_v4(), None).unwrap().order.id;
        claim_order(&state, id, driver, DriverRole::Pickup).unwrap();

        let report = reconcile_once(&state).unwrap();
        assert_eq!(report.total_repairs(), 0);
        assert_eq!(report.orders_scanned, 1);
    }

    #[test]
    fn stray_and_missing_memberships_are_repaired() {
        let state = AppState::new(16);
        let driver = state.add_driver("Avery".to_string(), true).id;
        let id = post_order(&state, Uuid::new_v4(), None).unwrap().order.id;
        claim_order(&state, id, driver, DriverRole::Pickup).unwrap();

        state.driver_orders.remove(driver, id).unwrap();
        state.driver_orders.add(driver, Uuid::from_u128(404)).unwrap();

        let report = reconcile_once(&state).unwrap();
        assert_eq!(report.driver_repairs, 2);
        assert_eq!(state.driver_orders.orders(driver).unwrap(), vec![id]);

        assert_eq!(reconcile_once(&state).unwrap().total_repairs(), 0);
    }

    #[test]
    fn unit_pointing_at_cancelled_order_is_cleared() {
        let state = AppState::new(16);
        let client = Uuid::new_v4();
        let unit = state.units.create("Maple Court".to_string(), "4B".to_string());
        state.units.set_client(unit.id, Some(client)).unwrap();
        let id = post_order(&state, client, Some(unit.id)).unwrap().order.id;
        cancel(&state, id, ActorRef::client(client)).unwrap();

        // Simulate a lost clear.
        assert!(state.units.assign_order_if(unit.id, id, || true).unwrap());

        let report = reconcile_once(&state).unwrap();
        assert_eq!(report.unit_repairs, 1);
        assert_eq!(state.units.get(unit.id).unwrap().active_order(), None);
    }

    #[test]
    fn actor_missing_a_set_is_registered_and_filled() {
        let state = AppState::new(16);
        let driver = state.add_driver("Avery".to_string(), true).id;
        let cleaner_id = Uuid::new_v4();
        state.cleaners.insert(
            cleaner_id,
            Cleaner {
                id: cleaner_id,
                name: "Late Registration".to_string(),
                address: "1 Steam Row".to_string(),
                created_at: Utc::now(),
            },
        );

        let id = post_order(&state, Uuid::new_v4(), None).unwrap().order.id;
        claim_order(&state, id, driver, DriverRole::Pickup).unwrap();
        record_client_pickup(&state, id, driver).unwrap();
        let dropped = drop_at_cleaner(&state, id, driver, cleaner_id).unwrap();
        assert_eq!(dropped.registry_warnings.len(), 1);

        let report = reconcile_once(&state).unwrap();
        assert_eq!(report.cleaner_repairs, 1);
        assert_eq!(state.cleaner_orders.orders(cleaner_id).unwrap(), vec![id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sweep_running_alongside_transitions_never_undoes_them() {
        let state = Arc::new(AppState::new(1024));
        let client = Uuid::new_v4();
        let driver_a = state.add_driver("Avery".to_string(), true).id;
        let driver_b = state.add_driver("Blake".to_string(), true).id;
        let cleaner = state.add_cleaner("Steam Co".to_string(), "1 Steam Row".to_string()).id;
        let unit = state.units.create("Maple Court".to_string(), "4B".to_string());
        state.units.set_client(unit.id, Some(client)).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let sweeper = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || {
                while !stop.load(Ordering::Relaxed) {
                    reconcile_once(&state).unwrap();
                }
            })
        };

        for _ in 0..300 {
            let id = post_order(&state, client, Some(unit.id)).unwrap().order.id;
            assert!(matches!(
                post_order(&state, client, Some(unit.id)),
                Err(AppError::Conflict(_))
            ));
            assert_eq!(state.units.get(unit.id).unwrap().active_order(), Some(id));

            claim_order(&state, id, driver_a, DriverRole::Pickup).unwrap();
            assert!(state.driver_orders.contains(driver_a, id));
            cancel(&state, id, ActorRef::client(client)).unwrap();
            assert_eq!(state.units.get(unit.id).unwrap().active_order(), None);
            assert!(!state.driver_orders.contains(driver_a, id));

            let id = post_order(&state, client, None).unwrap().order.id;
            claim_order(&state, id, driver_b, DriverRole::Pickup).unwrap();
            record_client_pickup(&state, id, driver_b).unwrap();
            drop_at_cleaner(&state, id, driver_b, cleaner).unwrap();
            assert!(!state.driver_orders.contains(driver_b, id));
            assert!(state.cleaner_orders.contains(cleaner, id));
        }

        stop.store(true, Ordering::Relaxed);
        sweeper.await.unwrap();

        assert_eq!(reconcile_once(&state).unwrap().total_repairs(), 0);
        for order in state.orders.list(None) {
            let holders = order.holders();
            for driver in [driver_a, driver_b] {
                assert_eq!(
                    state.driver_orders.contains(driver, order.id),
                    holders.driver == Some(driver)
                );
            }
            assert_eq!(
                state.cleaner_orders.contains(cleaner, order.id),
                holders.cleaner == Some(cleaner)
            );
        }
        assert_eq!(state.units.get(unit.id).unwrap().active_order(), None);
        assert_eq!(state.cleaner_orders.orders(cleaner).unwrap().len(), 300);
    }
}
