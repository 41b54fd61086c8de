use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::pricing::{PricingCalculator, ServiceCatalog};
use crate::error::AppError;
use crate::models::actor::{Cleaner, CleanerStaff, Driver};
use crate::models::event::OrderEvent;
use crate::observability::metrics::Metrics;
use crate::store::active_set::{ActiveSetKind, ActiveSetRegistry};
use crate::store::orders::OrderStore;
use crate::store::units::UnitRegistry;

pub struct AppState {
    pub drivers: DashMap<Uuid, Driver>,
    pub cleaners: DashMap<Uuid, Cleaner>,
    pub staff: DashMap<Uuid, CleanerStaff>,
    pub catalog: Arc<ServiceCatalog>,
    pub pricing: Arc<dyn PricingCalculator>,
    pub orders: OrderStore,
    pub units: UnitRegistry,
    pub driver_orders: ActiveSetRegistry,
    pub cleaner_orders: ActiveSetRegistry,
    pub order_events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let catalog = Arc::new(ServiceCatalog::new());
        let pricing: Arc<dyn PricingCalculator> = catalog.clone();
        Self::with_pricing(event_buffer_size, catalog, pricing)
    }

    /// Builds state around an external pricing calculator; the catalog is
    /// still used to list services.
    pub fn with_pricing(
        event_buffer_size: usize,
        catalog: Arc<ServiceCatalog>,
        pricing: Arc<dyn PricingCalculator>,
    ) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            drivers: DashMap::new(),
            cleaners: DashMap::new(),
            staff: DashMap::new(),
            catalog,
            pricing,
            orders: OrderStore::new(),
            units: UnitRegistry::new(),
            driver_orders: ActiveSetRegistry::new(ActiveSetKind::Driver),
            cleaner_orders: ActiveSetRegistry::new(ActiveSetKind::Cleaner),
            order_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn add_driver(&self, name: String, background_checked: bool) -> Driver {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            name,
            background_checked,
            created_at: now,
            updated_at: now,
        };

        self.drivers.insert(driver.id, driver.clone());
        self.driver_orders.register(driver.id);
        driver
    }

    pub fn set_background_check(&self, id: Uuid, background_checked: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.background_checked = background_checked;
        driver.updated_at = Utc::now();
        Ok(driver.clone())
    }

    pub fn add_cleaner(&self, name: String, address: String) -> Cleaner {
        let cleaner = Cleaner {
            id: Uuid::new_v4(),
            name,
            address,
            created_at: Utc::now(),
        };

        self.cleaners.insert(cleaner.id, cleaner.clone());
        self.cleaner_orders.register(cleaner.id);
        cleaner
    }

    pub fn add_staff(&self, cleaner_id: Uuid, name: String) -> Result<CleanerStaff, AppError> {
        if !self.cleaners.contains_key(&cleaner_id) {
            return Err(AppError::NotFound(format!("cleaner {cleaner_id} not found")));
        }

        let staff = CleanerStaff {
            id: Uuid::new_v4(),
            cleaner_id,
            name,
            created_at: Utc::now(),
        };

        self.staff.insert(staff.id, staff.clone());
        Ok(staff)
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn cleaner(&self, id: Uuid) -> Result<Cleaner, AppError> {
        self.cleaners
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("cleaner {id} not found")))
    }

    pub fn staff_member(&self, id: Uuid) -> Result<CleanerStaff, AppError> {
        self.staff
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("cleaner staff {id} not found")))
    }
}
