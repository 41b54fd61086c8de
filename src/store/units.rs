use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Assignee;
use crate::models::unit::{Occupancy, Unit};

/// Apartment units, their single in-flight order, and the FIFO pickup queue.
///
/// Queue order comes from a monotonically increasing position stamped on the
/// unit when it is queued, so queueing is a single-entry update.
#[derive(Default)]
pub struct UnitRegistry {
    units: DashMap<Uuid, Unit>,
    next_position: AtomicU64,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, building: String, unit_number: String) -> Unit {
        let now = Utc::now();
        let unit = Unit {
            id: Uuid::new_v4(),
            building,
            unit_number,
            client: Assignee::Unassigned,
            is_active: true,
            occupancy: Occupancy::Vacant,
            created_at: now,
            updated_at: now,
        };

        self.units.insert(unit.id, unit.clone());
        unit
    }

    pub fn get(&self, unit_id: Uuid) -> Result<Unit, AppError> {
        self.units
            .get(&unit_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(unit_id))
    }

    pub fn list(&self) -> Vec<Unit> {
        let mut units: Vec<Unit> = self.units.iter().map(|entry| entry.value().clone()).collect();
        units.sort_by_key(|unit| unit.created_at);
        units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Moves the resident. Refused while the unit holds an order so the
    /// in-flight order keeps the client it was opened for.
    pub fn set_client(&self, unit_id: Uuid, client: Option<Uuid>) -> Result<Unit, AppError> {
        self.update(unit_id, |unit| {
            if let Some(order_id) = unit.active_order() {
                return Err(AppError::Conflict(format!(
                    "unit {} has active order {order_id}",
                    unit.id
                )));
            }

            unit.client = match client {
                Some(id) => Assignee::AssignedTo(id),
                None => Assignee::Unassigned,
            };
            if client.is_none() && unit.is_queued() {
                unit.occupancy = Occupancy::Vacant;
            }
            Ok(())
        })
    }

    /// Deactivating a queued unit also takes it off the queue.
    pub fn set_active(&self, unit_id: Uuid, is_active: bool) -> Result<Unit, AppError> {
        self.update(unit_id, |unit| {
            unit.is_active = is_active;
            if !is_active && unit.is_queued() {
                unit.occupancy = Occupancy::Vacant;
            }
            Ok(())
        })
    }

    /// Reserves the unit for a new order and runs `commit` while the unit
    /// entry is still locked, so the reservation only becomes visible once
    /// the order exists. The resident is re-checked under the same lock.
    /// A failed `commit` leaves the unit untouched.
    pub fn reserve_for<F>(
        &self,
        unit_id: Uuid,
        order_id: Uuid,
        client_id: Uuid,
        commit: F,
    ) -> Result<Unit, AppError>
    where
        F: FnOnce() -> Result<(), AppError>,
    {
        self.update(unit_id, |unit| {
            if let Some(current) = unit.active_order() {
                return Err(AppError::Conflict(format!(
                    "unit {} already has active order {current}",
                    unit.id
                )));
            }
            if !unit.is_active {
                return Err(AppError::Conflict(format!("unit {} is not active", unit.id)));
            }
            if !unit.client.is(client_id) {
                return Err(AppError::Conflict(format!(
                    "unit {} no longer belongs to client {client_id}",
                    unit.id
                )));
            }

            commit()?;
            // Taking an order also takes the unit off the pickup queue.
            unit.occupancy = Occupancy::Occupied { order_id };
            Ok(())
        })
    }

    /// Points a vacant or queued unit back at `order_id` if `still_open`
    /// holds when checked under the unit lock. Returns whether the unit
    /// changed.
    pub fn assign_order_if<F>(
        &self,
        unit_id: Uuid,
        order_id: Uuid,
        still_open: F,
    ) -> Result<bool, AppError>
    where
        F: FnOnce() -> bool,
    {
        let mut assigned = false;
        self.update(unit_id, |unit| {
            if unit.active_order() == Some(order_id) || !still_open() {
                return Ok(());
            }
            if let Some(current) = unit.active_order() {
                return Err(AppError::Conflict(format!(
                    "unit {} already has active order {current}",
                    unit.id
                )));
            }
            if !unit.is_active {
                return Err(AppError::Conflict(format!("unit {} is not active", unit.id)));
            }

            unit.occupancy = Occupancy::Occupied { order_id };
            assigned = true;
            Ok(())
        })?;
        Ok(assigned)
    }

    /// Clears the active order only if it is still `order_id`; a unit that
    /// has already moved on to a newer order is left alone.
    pub fn clear_order(&self, unit_id: Uuid, order_id: Uuid) -> Result<bool, AppError> {
        let mut cleared = false;
        self.update(unit_id, |unit| {
            if unit.active_order() == Some(order_id) {
                unit.occupancy = Occupancy::Vacant;
                cleared = true;
            }
            Ok(())
        })?;
        Ok(cleared)
    }

    /// Like [`UnitRegistry::clear_order`], but only when `released` holds
    /// under the unit lock.
    pub fn clear_order_if<F>(
        &self,
        unit_id: Uuid,
        order_id: Uuid,
        released: F,
    ) -> Result<bool, AppError>
    where
        F: FnOnce() -> bool,
    {
        let mut cleared = false;
        self.update(unit_id, |unit| {
            if unit.active_order() == Some(order_id) && released() {
                unit.occupancy = Occupancy::Vacant;
                cleared = true;
            }
            Ok(())
        })?;
        Ok(cleared)
    }

    pub fn queue(&self, unit_id: Uuid) -> Result<Unit, AppError> {
        let position = self.next_position.fetch_add(1, Ordering::SeqCst);
        self.update(unit_id, |unit| {
            match unit.occupancy {
                Occupancy::Occupied { order_id } => {
                    return Err(AppError::Conflict(format!(
                        "unit {} has active order {order_id}",
                        unit.id
                    )));
                }
                Occupancy::Queued { .. } => {
                    return Err(AppError::Conflict(format!("unit {} is already queued", unit.id)));
                }
                Occupancy::Vacant => {}
            }

            if !unit.is_active {
                return Err(AppError::Conflict(format!("unit {} is not active", unit.id)));
            }
            if !unit.client.is_assigned() {
                return Err(AppError::Conflict(format!("unit {} has no resident", unit.id)));
            }

            unit.occupancy = Occupancy::Queued {
                position,
                since: Utc::now(),
            };
            Ok(())
        })
    }

    pub fn dequeue(&self, unit_id: Uuid) -> Result<Unit, AppError> {
        self.update(unit_id, |unit| match unit.occupancy {
            Occupancy::Occupied { order_id } => Err(AppError::Conflict(format!(
                "unit {} has active order {order_id}",
                unit.id
            ))),
            Occupancy::Vacant => Err(AppError::Conflict(format!("unit {} is not queued", unit.id))),
            Occupancy::Queued { .. } => {
                unit.occupancy = Occupancy::Vacant;
                Ok(())
            }
        })
    }

    /// Queued units, oldest first.
    pub fn queued(&self) -> Vec<Unit> {
        let mut queued: Vec<(u64, Unit)> = self
            .units
            .iter()
            .filter_map(|entry| match entry.occupancy {
                Occupancy::Queued { position, .. } => Some((position, entry.value().clone())),
                _ => None,
            })
            .collect();

        queued.sort_by_key(|(position, _)| *position);
        queued.into_iter().map(|(_, unit)| unit).collect()
    }

    fn update<F>(&self, unit_id: Uuid, apply: F) -> Result<Unit, AppError>
    where
        F: FnOnce(&mut Unit) -> Result<(), AppError>,
    {
        let mut entry = self.units.get_mut(&unit_id).ok_or_else(|| not_found(unit_id))?;

        let mut next = entry.value().clone();
        apply(&mut next)?;
        next.updated_at = Utc::now();
        *entry.value_mut() = next.clone();

        Ok(next)
    }
}

fn not_found(unit_id: Uuid) -> AppError {
    AppError::NotFound(format!("unit {unit_id} not found"))
}
