use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

/// Authoritative order collection.
///
/// All mutations of an existing order go through [`OrderStore::update_if`],
/// which evaluates the caller's check against the stored document and swaps
/// in the replacement while holding the entry's write lock. Two writers racing
/// on the same order are therefore serialized, and the loser evaluates its
/// precondition against the winner's result rather than a stale copy.
#[derive(Default)]
pub struct OrderStore {
    orders: DashMap<Uuid, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) -> Result<(), AppError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    /// Conditional atomic update. `check` sees the current document and
    /// returns the replacement plus any extra output; an error leaves the
    /// stored order untouched.
    pub fn update_if<T, F>(&self, id: Uuid, check: F) -> Result<(Order, T), AppError>
    where
        F: FnOnce(&Order) -> Result<(Order, T), AppError>,
    {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let (next, output) = check(entry.value())?;
        if next.id != id {
            return Err(AppError::Internal(format!(
                "update for order {id} produced order {}",
                next.id
            )));
        }

        *entry.value_mut() = next.clone();
        Ok((next, output))
    }

    pub fn list(&self, status: Option<OrderStatus>) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by_key(|order| order.timestamps.created);
        orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.orders
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::OrderStore;
    use crate::error::AppError;
    use crate::models::order::{Order, OrderOrigin, OrderStatus};

    fn posted() -> Order {
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            OrderOrigin::Client,
            Utc::now(),
        )
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = OrderStore::new();
        let order = posted();

        store.insert(order.clone()).unwrap();
        let result = store.insert(order);

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_check_leaves_order_unchanged() {
        let store = OrderStore::new();
        let order = posted();
        let id = order.id;
        store.insert(order.clone()).unwrap();

        let result = store.update_if(id, |_| -> Result<(Order, ()), AppError> {
            Err(AppError::InvalidTransition("nope".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.get(id).unwrap(), order);
    }

    #[test]
    fn successful_check_replaces_document() {
        let store = OrderStore::new();
        let order = posted();
        let id = order.id;
        store.insert(order).unwrap();

        let (updated, ()) = store
            .update_if(id, |current| {
                let mut next = current.clone();
                next.status = OrderStatus::Cancelled;
                Ok((next, ()))
            })
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Cancelled);
        assert_eq!(store.get(id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(store.open_count(), 0);
    }

    #[test]
    fn update_of_missing_order_is_not_found() {
        let store = OrderStore::new();
        let result = store.update_if(Uuid::new_v4(), |current| Ok((current.clone(), ())));

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn list_filters_by_status() {
        let store = OrderStore::new();
        let first = posted();
        let mut second = posted();
        second.status = OrderStatus::Ready;
        store.insert(first).unwrap();
        store.insert(second.clone()).unwrap();

        let ready = store.list(Some(OrderStatus::Ready));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, second.id);
        assert_eq!(store.list(None).len(), 2);
    }
}
