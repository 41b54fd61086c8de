use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Projection update implied by a committed order transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEffect {
    AddToDriver { driver_id: Uuid, order_id: Uuid },
    RemoveFromDriver { driver_id: Uuid, order_id: Uuid },
    AddToCleaner { cleaner_id: Uuid, order_id: Uuid },
    RemoveFromCleaner { cleaner_id: Uuid, order_id: Uuid },
    ClearUnit { unit_id: Uuid, order_id: Uuid },
}

impl RegistryEffect {
    pub fn registry(&self) -> &'static str {
        match self {
            RegistryEffect::AddToDriver { .. } | RegistryEffect::RemoveFromDriver { .. } => {
                "driver"
            }
            RegistryEffect::AddToCleaner { .. } | RegistryEffect::RemoveFromCleaner { .. } => {
                "cleaner"
            }
            RegistryEffect::ClearUnit { .. } => "unit",
        }
    }
}

/// Applies effects after the order itself has been committed. A failure here
/// cannot undo the transition: it is logged and handed back to the caller as
/// a warning, and the remaining effects still run. Leftover drift is repaired
/// by the reconciliation sweep.
pub fn apply_effects(state: &AppState, effects: &[RegistryEffect]) -> Vec<String> {
    let mut warnings = Vec::new();

    for effect in effects {
        let result = match *effect {
            RegistryEffect::AddToDriver {
                driver_id,
                order_id,
            } => state.driver_orders.add(driver_id, order_id).map(|_| ()),
            RegistryEffect::RemoveFromDriver {
                driver_id,
                order_id,
            } => state.driver_orders.remove(driver_id, order_id).map(|_| ()),
            RegistryEffect::AddToCleaner {
                cleaner_id,
                order_id,
            } => state.cleaner_orders.add(cleaner_id, order_id).map(|_| ()),
            RegistryEffect::RemoveFromCleaner {
                cleaner_id,
                order_id,
            } => state.cleaner_orders.remove(cleaner_id, order_id).map(|_| ()),
            RegistryEffect::ClearUnit { unit_id, order_id } => {
                state.units.clear_order(unit_id, order_id).map(|cleared| {
                    if !cleared {
                        debug!(%unit_id, %order_id, "unit no longer pointed at order");
                    }
                })
            }
        };

        if let Err(err) = result {
            let failure = AppError::RegistrySyncFailure(format!("{effect:?}: {err}"));
            warn!(error = %failure, registry = effect.registry(), "registry update failed after commit");
            state
                .metrics
                .registry_sync_failures_total
                .with_label_values(&[effect.registry()])
                .inc();
            warnings.push(failure.to_string());
        }
    }

    warnings
}
