use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSetKind {
    Driver,
    Cleaner,
}

impl fmt::Display for ActiveSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveSetKind::Driver => f.write_str("driver"),
            ActiveSetKind::Cleaner => f.write_str("cleaner"),
        }
    }
}

/// Per-actor set of orders that actor currently holds. A projection of the
/// order collection, written only as a side effect of order transitions or
/// by the reconciliation sweep.
pub struct ActiveSetRegistry {
    kind: ActiveSetKind,
    sets: DashMap<Uuid, HashSet<Uuid>>,
}

impl ActiveSetRegistry {
    pub fn new(kind: ActiveSetKind) -> Self {
        Self {
            kind,
            sets: DashMap::new(),
        }
    }

    pub fn kind(&self) -> ActiveSetKind {
        self.kind
    }

    /// Creates an empty set for a newly registered actor. Existing sets are kept.
    pub fn register(&self, actor_id: Uuid) {
        self.sets.entry(actor_id).or_default();
    }

    pub fn is_registered(&self, actor_id: Uuid) -> bool {
        self.sets.contains_key(&actor_id)
    }

    /// Idempotent union. Returns whether the order was newly added.
    pub fn add(&self, actor_id: Uuid, order_id: Uuid) -> Result<bool, AppError> {
        let mut set = self.set_mut(actor_id)?;
        Ok(set.insert(order_id))
    }

    /// Idempotent difference. Returns whether the order was present.
    pub fn remove(&self, actor_id: Uuid, order_id: Uuid) -> Result<bool, AppError> {
        let mut set = self.set_mut(actor_id)?;
        Ok(set.remove(&order_id))
    }

    pub fn remove_many(&self, actor_id: Uuid, order_ids: &[Uuid]) -> Result<usize, AppError> {
        let mut set = self.set_mut(actor_id)?;
        Ok(order_ids.iter().filter(|id| set.remove(*id)).count())
    }

    pub fn contains(&self, actor_id: Uuid, order_id: Uuid) -> bool {
        self.sets
            .get(&actor_id)
            .is_some_and(|set| set.contains(&order_id))
    }

    pub fn orders(&self, actor_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let set = self
            .sets
            .get(&actor_id)
            .ok_or_else(|| self.unknown_actor(actor_id))?;

        let mut orders: Vec<Uuid> = set.iter().copied().collect();
        orders.sort();
        Ok(orders)
    }

    pub fn actors(&self) -> Vec<Uuid> {
        self.sets.iter().map(|entry| *entry.key()).collect()
    }

    /// Adds the order only if `still_held` holds while the set is locked.
    /// Returns whether the order was newly added.
    pub fn add_if<F>(&self, actor_id: Uuid, order_id: Uuid, still_held: F) -> Result<bool, AppError>
    where
        F: FnOnce() -> bool,
    {
        let mut set = self.set_mut(actor_id)?;
        if set.contains(&order_id) || !still_held() {
            return Ok(false);
        }
        Ok(set.insert(order_id))
    }

    /// Removes the order only if `released` holds while the set is locked.
    /// Returns whether the order was removed.
    pub fn remove_if<F>(&self, actor_id: Uuid, order_id: Uuid, released: F) -> Result<bool, AppError>
    where
        F: FnOnce() -> bool,
    {
        let mut set = self.set_mut(actor_id)?;
        if !set.contains(&order_id) || !released() {
            return Ok(false);
        }
        Ok(set.remove(&order_id))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn set_mut(
        &self,
        actor_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, HashSet<Uuid>>, AppError> {
        self.sets
            .get_mut(&actor_id)
            .ok_or_else(|| self.unknown_actor(actor_id))
    }

    fn unknown_actor(&self, actor_id: Uuid) -> AppError {
        AppError::NotFound(format!("{} {actor_id} has no active order set", self.kind))
    }
}
