use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::EventLog;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    PostedPickup,
    PostedDropoff,
    PickupDriverEnRoute,
    DropoffDriverEnRoute,
    ClothesToCleaner,
    AwaitingPricing,
    AwaitingClean,
    BeingCleaned,
    Ready,
    PickedUpFromCleaner,
    DriverToCleaner,
    ClothesToHome,
    Complete,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 14] = [
        OrderStatus::PostedPickup,
        OrderStatus::PostedDropoff,
        OrderStatus::PickupDriverEnRoute,
        OrderStatus::DropoffDriverEnRoute,
        OrderStatus::ClothesToCleaner,
        OrderStatus::AwaitingPricing,
        OrderStatus::AwaitingClean,
        OrderStatus::BeingCleaned,
        OrderStatus::Ready,
        OrderStatus::PickedUpFromCleaner,
        OrderStatus::DriverToCleaner,
        OrderStatus::ClothesToHome,
        OrderStatus::Complete,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Cancelled)
    }

    /// Posted and waiting for a driver to claim it.
    pub fn is_posted(self) -> bool {
        matches!(self, OrderStatus::PostedPickup | OrderStatus::PostedDropoff)
    }

    /// Clothes have not reached a cleaner yet.
    pub fn is_before_cleaner(self) -> bool {
        matches!(
            self,
            OrderStatus::PostedPickup | OrderStatus::PickupDriverEnRoute | OrderStatus::ClothesToCleaner
        )
    }

    /// The pickup driver holds the order.
    pub fn is_pickup_leg(self) -> bool {
        matches!(
            self,
            OrderStatus::PickupDriverEnRoute | OrderStatus::ClothesToCleaner
        )
    }

    /// The drop-off driver holds the order.
    pub fn is_delivery_leg(self) -> bool {
        matches!(
            self,
            OrderStatus::DropoffDriverEnRoute
                | OrderStatus::DriverToCleaner
                | OrderStatus::PickedUpFromCleaner
                | OrderStatus::ClothesToHome
        )
    }

    /// The clothes are physically at the cleaner.
    pub fn is_at_cleaner(self) -> bool {
        matches!(
            self,
            OrderStatus::AwaitingPricing
                | OrderStatus::AwaitingClean
                | OrderStatus::BeingCleaned
                | OrderStatus::Ready
                | OrderStatus::PostedDropoff
                | OrderStatus::DropoffDriverEnRoute
                | OrderStatus::DriverToCleaner
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Who currently holds a role on an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Assignee {
    #[default]
    Unassigned,
    AssignedTo(Uuid),
}

impl Assignee {
    pub fn id(self) -> Option<Uuid> {
        match self {
            Assignee::Unassigned => None,
            Assignee::AssignedTo(id) => Some(id),
        }
    }

    pub fn is_assigned(self) -> bool {
        matches!(self, Assignee::AssignedTo(_))
    }

    pub fn is(self, id: Uuid) -> bool {
        self == Assignee::AssignedTo(id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverRole {
    Pickup,
    Dropoff,
}

impl fmt::Display for DriverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverRole::Pickup => f.write_str("pickup"),
            DriverRole::Dropoff => f.write_str("dropoff"),
        }
    }
}

/// How the order came into existence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderOrigin {
    /// Posted by the client, waiting to be claimed.
    Client,
    /// Opened on the spot by a driver collecting from an apartment unit.
    Unit { unit_id: Uuid, driver_id: Uuid },
}

/// One line of a pricing request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceLine {
    pub service_id: Uuid,
    pub quantity: u32,
}

/// A priced line in `desired_services`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesiredService {
    pub service_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub cost_cents: u64,
}

/// Each timestamp is written once, by the transition that produces it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderTimestamps {
    pub created: DateTime<Utc>,
    pub client_pickup_time: Option<DateTime<Utc>>,
    pub cleaner_drop_off_time: Option<DateTime<Utc>>,
    pub clean_finish_time: Option<DateTime<Utc>>,
    pub cleaner_pickup_time: Option<DateTime<Utc>>,
    pub client_dropoff_time: Option<DateTime<Utc>>,
    pub closed_time: Option<DateTime<Utc>>,
}

impl OrderTimestamps {
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            created,
            client_pickup_time: None,
            cleaner_drop_off_time: None,
            clean_finish_time: None,
            cleaner_pickup_time: None,
            client_dropoff_time: None,
            closed_time: None,
        }
    }
}

/// Actors that should list this order in their active set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holders {
    pub driver: Option<Uuid>,
    pub cleaner: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub client_id: Uuid,
    pub pick_up_driver: Assignee,
    pub drop_off_driver: Assignee,
    pub cleaner: Assignee,
    pub cleaner_address: Option<String>,
    pub unit: Option<Uuid>,
    pub origin: OrderOrigin,
    pub is_drop_off: bool,
    pub cleaner_approved: bool,
    pub machine: Assignee,
    pub desired_services: Vec<DesiredService>,
    pub order_total_cents: u64,
    pub order_paid_for: bool,
    pub order_closed: bool,
    pub timestamps: OrderTimestamps,
    pub event_log: EventLog,
}

impl Order {
    pub fn new(
        id: Uuid,
        client_id: Uuid,
        unit: Option<Uuid>,
        origin: OrderOrigin,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: OrderStatus::PostedPickup,
            client_id,
            pick_up_driver: Assignee::Unassigned,
            drop_off_driver: Assignee::Unassigned,
            cleaner: Assignee::Unassigned,
            cleaner_address: None,
            unit,
            origin,
            is_drop_off: false,
            cleaner_approved: false,
            machine: Assignee::Unassigned,
            desired_services: Vec::new(),
            order_total_cents: 0,
            order_paid_for: false,
            order_closed: false,
            timestamps: OrderTimestamps::new(created),
            event_log: EventLog::new(),
        }
    }

    pub fn is_unit_originated(&self) -> bool {
        matches!(self.origin, OrderOrigin::Unit { .. })
    }

    /// The driver whose active set should contain this order right now.
    pub fn active_driver(&self) -> Option<Uuid> {
        if self.status.is_pickup_leg() {
            self.pick_up_driver.id()
        } else if self.status.is_delivery_leg() {
            self.drop_off_driver.id()
        } else {
            None
        }
    }

    /// Derives the active-set memberships implied by the current status.
    pub fn holders(&self) -> Holders {
        if self.status.is_terminal() {
            return Holders::default();
        }

        Holders {
            driver: self.active_driver(),
            cleaner: if self.status.is_at_cleaner() {
                self.cleaner.id()
            } else {
                None
            },
        }
    }

    /// The unit whose `active_order` should point at this order.
    pub fn occupied_unit(&self) -> Option<Uuid> {
        if self.status.is_terminal() {
            None
        } else {
            self.unit
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Assignee, Order, OrderOrigin, OrderStatus};

    fn order() -> Order {
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(Uuid::from_u128(7)),
            OrderOrigin::Client,
            Utc::now(),
        )
    }

    #[test]
    fn only_complete_and_cancelled_are_terminal() {
        let terminal: Vec<OrderStatus> = OrderStatus::ALL
            .into_iter()
            .filter(|status| status.is_terminal())
            .collect();

        assert_eq!(terminal, vec![OrderStatus::Complete, OrderStatus::Cancelled]);
    }

    #[test]
    fn pickup_leg_holder_is_pickup_driver() {
        let driver = Uuid::from_u128(1);
        let mut order = order();
        order.status = OrderStatus::PickupDriverEnRoute;
        order.pick_up_driver = Assignee::AssignedTo(driver);

        let holders = order.holders();
        assert_eq!(holders.driver, Some(driver));
        assert_eq!(holders.cleaner, None);
    }

    #[test]
    fn claimed_delivery_is_held_by_driver_and_cleaner() {
        let driver = Uuid::from_u128(1);
        let cleaner = Uuid::from_u128(2);
        let mut order = order();
        order.status = OrderStatus::DropoffDriverEnRoute;
        order.pick_up_driver = Assignee::AssignedTo(Uuid::from_u128(3));
        order.drop_off_driver = Assignee::AssignedTo(driver);
        order.cleaner = Assignee::AssignedTo(cleaner);

        let holders = order.holders();
        assert_eq!(holders.driver, Some(driver));
        assert_eq!(holders.cleaner, Some(cleaner));
    }

    #[test]
    fn terminal_orders_have_no_holders_or_unit() {
        let mut order = order();
        order.status = OrderStatus::Cancelled;
        order.cleaner = Assignee::AssignedTo(Uuid::from_u128(2));

        assert_eq!(order.holders(), super::Holders::default());
        assert_eq!(order.occupied_unit(), None);
    }

    #[test]
    fn assignee_serializes_as_tagged_enum() {
        let id = Uuid::from_u128(9);
        let json = serde_json::to_value(Assignee::AssignedTo(id)).unwrap();
        assert_eq!(json["assigned_to"], id.to_string());

        let json = serde_json::to_value(Assignee::Unassigned).unwrap();
        assert_eq!(json, "unassigned");
    }
}
