//! The order state machine.
//!
//! Every lifecycle operation is expressed as a [`Command`] and evaluated by
//! [`apply`] against a snapshot of the order. `apply` is pure: it returns the
//! next snapshot (with exactly one new event-log entry) and the registry
//! updates the transition implies, or an error and no changes at all. The
//! engine runs it inside the order store's conditional update, so the
//! precondition is always checked against the latest committed document.
//!
//! ```text
//! PostedPickup ──claim──▶ PickupDriverEnRoute ──client pickup──▶ ClothesToCleaner
//!                                                                     │ drop at cleaner
//!                                                                     ▼
//!   BeingCleaned ◀──load machine── AwaitingClean ◀──pricing── AwaitingPricing
//!        │ mark ready
//!        ▼
//!      Ready ──request delivery──▶ PostedDropoff ──claim──▶ DropoffDriverEnRoute ─▶ DriverToCleaner
//!        │                                                          │                  │
//!        └──────────────────── cleaner pickup ──────────────────────┴──────────────────┘
//!                                     ▼
//!                          PickedUpFromCleaner ─▶ ClothesToHome ──client dropoff──▶ Complete
//! ```
//!
//! `Cancelled` is reachable from `PostedPickup` and from the pickup leg
//! until the client hands the clothes over. Unit orders stay cancellable
//! until the clothes reach a cleaner. Nothing is cancellable once paid for.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::effects::RegistryEffect;
use crate::error::AppError;
use crate::models::actor::{ActorKind, ActorRef};
use crate::models::order::{
    Assignee, DesiredService, DriverRole, Order, OrderOrigin, OrderStatus,
};

/// Driver facts the table needs, resolved from the driver directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCredentials {
    pub id: Uuid,
    pub background_checked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffCredentials {
    pub id: Uuid,
    pub cleaner_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerCredentials {
    pub id: Uuid,
    pub address: String,
}

/// Who may post the return leg of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRequester {
    Client(Uuid),
    Staff(StaffCredentials),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Claim {
        driver: DriverCredentials,
        role: DriverRole,
    },
    RecordClientPickup {
        driver_id: Uuid,
    },
    DropAtCleaner {
        driver_id: Uuid,
        cleaner: CleanerCredentials,
    },
    ApproveDropOff {
        staff: StaffCredentials,
    },
    SetPricing {
        staff: StaffCredentials,
        services: Vec<DesiredService>,
    },
    LoadMachine {
        staff: StaffCredentials,
        machine_id: Uuid,
    },
    UnloadMachine {
        staff: StaffCredentials,
    },
    MarkReady {
        staff: StaffCredentials,
    },
    RequestDelivery {
        requester: DeliveryRequester,
    },
    ReportEnRoute {
        driver_id: Uuid,
    },
    CleanerPickup {
        driver: DriverCredentials,
    },
    ClientDropoff {
        driver_id: Uuid,
    },
    Cancel {
        actor: ActorRef,
    },
    MarkPaid,
}

impl Command {
    /// Stable operation name used in logs and metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            Command::Claim { .. } => "claim_order",
            Command::RecordClientPickup { .. } => "record_client_pickup",
            Command::DropAtCleaner { .. } => "drop_at_cleaner",
            Command::ApproveDropOff { .. } => "approve_drop_off",
            Command::SetPricing { .. } => "set_pricing",
            Command::LoadMachine { .. } => "load_machine",
            Command::UnloadMachine { .. } => "unload_machine",
            Command::MarkReady { .. } => "mark_ready",
            Command::RequestDelivery { .. } => "request_delivery",
            Command::ReportEnRoute { .. } => "report_en_route",
            Command::CleanerPickup { .. } => "cleaner_pickup",
            Command::ClientDropoff { .. } => "client_dropoff",
            Command::Cancel { .. } => "cancel",
            Command::MarkPaid => "mark_paid",
        }
    }

    pub fn actor(&self) -> ActorRef {
        match self {
            Command::Claim { driver, .. } | Command::CleanerPickup { driver } => {
                ActorRef::driver(driver.id)
            }
            Command::RecordClientPickup { driver_id }
            | Command::DropAtCleaner { driver_id, .. }
            | Command::ReportEnRoute { driver_id }
            | Command::ClientDropoff { driver_id } => ActorRef::driver(*driver_id),
            Command::ApproveDropOff { staff }
            | Command::SetPricing { staff, .. }
            | Command::LoadMachine { staff, .. }
            | Command::UnloadMachine { staff }
            | Command::MarkReady { staff } => ActorRef::cleaner_staff(staff.id),
            Command::RequestDelivery { requester } => match requester {
                DeliveryRequester::Client(id) => ActorRef::client(*id),
                DeliveryRequester::Staff(staff) => ActorRef::cleaner_staff(staff.id),
            },
            Command::Cancel { actor } => *actor,
            Command::MarkPaid => ActorRef::system(),
        }
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub effects: Vec<RegistryEffect>,
}

/// Parameters for opening a new order.
#[derive(Debug, Clone, Copy)]
pub struct OpenOrder {
    pub id: Uuid,
    pub client_id: Uuid,
    pub unit: Option<Uuid>,
    pub origin: OrderOrigin,
}

/// Builds a freshly posted order. Unit-originated orders start already
/// claimed by the driver who opened them at the door.
pub fn open(request: OpenOrder, now: DateTime<Utc>) -> Transition {
    let mut order = Order::new(
        request.id,
        request.client_id,
        request.unit,
        request.origin,
        now,
    );

    match request.origin {
        OrderOrigin::Client => {
            order.event_log.append(
                now,
                "Order Posted",
                "client posted a pickup request",
                ActorRef::client(request.client_id),
            );
            Transition {
                order,
                effects: Vec::new(),
            }
        }
        OrderOrigin::Unit { unit_id, driver_id } => {
            order.status = OrderStatus::PickupDriverEnRoute;
            order.pick_up_driver = Assignee::AssignedTo(driver_id);
            order.event_log.append(
                now,
                "Order Created For Unit",
                format!("driver {driver_id} opened an order for unit {unit_id}"),
                ActorRef::driver(driver_id),
            );
            Transition {
                effects: vec![RegistryEffect::AddToDriver {
                    driver_id,
                    order_id: order.id,
                }],
                order,
            }
        }
    }
}

/// Evaluates `command` against `current`.
pub fn apply(current: &Order, command: &Command, now: DateTime<Utc>) -> Result<Transition, AppError> {
    if current.order_closed || current.status.is_terminal() {
        return Err(AppError::AlreadyClosed(current.id));
    }

    let mut next = current.clone();
    let mut effects = Vec::new();
    let actor = command.actor();

    let (event, details) = match command {
        Command::Claim { driver, role } => {
            claim(&mut next, *driver, *role)?;
            effects.push(RegistryEffect::AddToDriver {
                driver_id: driver.id,
                order_id: next.id,
            });
            (
                "Driver Claimed Order",
                format!("driver {} claimed the {role} leg", driver.id),
            )
        }

        Command::RecordClientPickup { driver_id } => {
            expect_status(&next, &[OrderStatus::PickupDriverEnRoute])?;
            expect_holder(&next, next.pick_up_driver, *driver_id, "pickup driver")?;
            set_once(&mut next.timestamps.client_pickup_time, now, "client pickup time")?;
            next.status = OrderStatus::ClothesToCleaner;
            (
                "Clothes Picked Up From Client",
                format!("driver {driver_id} collected the clothes"),
            )
        }

        Command::DropAtCleaner { driver_id, cleaner } => {
            expect_status(&next, &[OrderStatus::ClothesToCleaner])?;
            expect_holder(&next, next.pick_up_driver, *driver_id, "pickup driver")?;
            set_once(&mut next.timestamps.cleaner_drop_off_time, now, "cleaner drop-off time")?;
            next.cleaner = Assignee::AssignedTo(cleaner.id);
            next.cleaner_address = Some(cleaner.address.clone());
            next.status = OrderStatus::AwaitingPricing;
            effects.push(RegistryEffect::AddToCleaner {
                cleaner_id: cleaner.id,
                order_id: next.id,
            });
            effects.push(RegistryEffect::RemoveFromDriver {
                driver_id: *driver_id,
                order_id: next.id,
            });
            (
                "Clothes Dropped At Cleaner",
                format!("driver {driver_id} left the clothes at cleaner {}", cleaner.id),
            )
        }

        Command::ApproveDropOff { staff } => {
            expect_status(&next, &[OrderStatus::AwaitingPricing])?;
            expect_staff(&next, *staff)?;
            if next.cleaner_approved {
                return Err(invalid(&next, "drop-off was already approved"));
            }
            next.cleaner_approved = true;
            (
                "Cleaner Approved Drop-Off",
                format!("staff {} confirmed receipt of the clothes", staff.id),
            )
        }

        Command::SetPricing { staff, services } => {
            expect_status(
                &next,
                &[
                    OrderStatus::AwaitingPricing,
                    OrderStatus::AwaitingClean,
                    OrderStatus::BeingCleaned,
                    OrderStatus::Ready,
                ],
            )?;
            expect_staff(&next, *staff)?;
            if !next.cleaner_approved {
                return Err(invalid(&next, "cleaner has not approved the drop-off"));
            }
            if next.order_paid_for {
                return Err(invalid(&next, "order is already paid for"));
            }
            if services.is_empty() {
                return Err(AppError::BadRequest("pricing needs at least one service".to_string()));
            }

            next.order_total_cents = services.iter().map(|line| line.cost_cents).sum();
            next.desired_services = services.clone();
            if next.status == OrderStatus::AwaitingPricing {
                next.status = OrderStatus::AwaitingClean;
            }
            (
                "Order Priced",
                format!(
                    "staff {} priced {} service(s) at {}",
                    staff.id,
                    services.len(),
                    format_cents(next.order_total_cents)
                ),
            )
        }

        Command::LoadMachine { staff, machine_id } => {
            expect_status(&next, &[OrderStatus::AwaitingClean, OrderStatus::BeingCleaned])?;
            expect_staff(&next, *staff)?;
            if let Some(current_machine) = next.machine.id() {
                return Err(invalid(
                    &next,
                    &format!("order is already in machine {current_machine}"),
                ));
            }
            next.machine = Assignee::AssignedTo(*machine_id);
            next.status = OrderStatus::BeingCleaned;
            (
                "Loaded Into Machine",
                format!("staff {} loaded the order into machine {machine_id}", staff.id),
            )
        }

        Command::UnloadMachine { staff } => {
            expect_status(&next, &[OrderStatus::BeingCleaned])?;
            expect_staff(&next, *staff)?;
            let Some(machine_id) = next.machine.id() else {
                return Err(invalid(&next, "order is not in a machine"));
            };
            next.machine = Assignee::Unassigned;
            (
                "Unloaded From Machine",
                format!("staff {} took the order out of machine {machine_id}", staff.id),
            )
        }

        Command::MarkReady { staff } => {
            expect_status(&next, &[OrderStatus::BeingCleaned])?;
            expect_staff(&next, *staff)?;
            if let Some(machine_id) = next.machine.id() {
                return Err(invalid(&next, &format!("order is still in machine {machine_id}")));
            }
            set_once(&mut next.timestamps.clean_finish_time, now, "clean finish time")?;
            next.status = OrderStatus::Ready;
            (
                "Cleaning Finished",
                format!("staff {} marked the order ready", staff.id),
            )
        }

        Command::RequestDelivery { requester } => {
            expect_status(&next, &[OrderStatus::Ready])?;
            match requester {
                DeliveryRequester::Client(client_id) if *client_id != next.client_id => {
                    return Err(invalid(&next, "only the order's client may request delivery"));
                }
                DeliveryRequester::Staff(staff) => expect_staff(&next, *staff)?,
                DeliveryRequester::Client(_) => {}
            }
            if next.drop_off_driver.is_assigned() {
                return Err(invalid(&next, "a drop-off driver already holds the order"));
            }
            next.is_drop_off = true;
            next.status = OrderStatus::PostedDropoff;
            (
                "Delivery Requested",
                format!("{actor} posted the order for delivery"),
            )
        }

        Command::ReportEnRoute { driver_id } => {
            expect_holder(&next, next.drop_off_driver, *driver_id, "drop-off driver")?;
            let (status, description) = match next.status {
                OrderStatus::DropoffDriverEnRoute => {
                    (OrderStatus::DriverToCleaner, "heading to the cleaner")
                }
                OrderStatus::PickedUpFromCleaner => {
                    (OrderStatus::ClothesToHome, "heading to the client")
                }
                _ => return Err(status_mismatch(&next)),
            };
            next.status = status;
            ("Driver En Route", format!("driver {driver_id} is {description}"))
        }

        Command::CleanerPickup { driver } => {
            match next.status {
                OrderStatus::Ready => {
                    if !driver.background_checked {
                        return Err(invalid(&next, "driver has not passed the background check"));
                    }
                    if next.drop_off_driver.id().is_some_and(|holder| holder != driver.id) {
                        return Err(invalid(&next, "order is held by another driver"));
                    }
                    next.drop_off_driver = Assignee::AssignedTo(driver.id);
                }
                OrderStatus::DropoffDriverEnRoute | OrderStatus::DriverToCleaner => {
                    expect_holder(&next, next.drop_off_driver, driver.id, "drop-off driver")?;
                }
                _ => return Err(status_mismatch(&next)),
            }

            set_once(&mut next.timestamps.cleaner_pickup_time, now, "cleaner pickup time")?;
            next.is_drop_off = true;
            next.status = OrderStatus::PickedUpFromCleaner;
            if let Some(cleaner_id) = current.cleaner.id() {
                effects.push(RegistryEffect::RemoveFromCleaner {
                    cleaner_id,
                    order_id: next.id,
                });
            }
            effects.push(RegistryEffect::AddToDriver {
                driver_id: driver.id,
                order_id: next.id,
            });
            (
                "Picked Up From Cleaner",
                format!("driver {} collected the cleaned clothes", driver.id),
            )
        }

        Command::ClientDropoff { driver_id } => {
            expect_status(
                &next,
                &[OrderStatus::PickedUpFromCleaner, OrderStatus::ClothesToHome],
            )?;
            expect_holder(&next, next.drop_off_driver, *driver_id, "drop-off driver")?;
            set_once(&mut next.timestamps.client_dropoff_time, now, "client drop-off time")?;
            close(&mut next, OrderStatus::Complete, now)?;
            effects.push(RegistryEffect::RemoveFromDriver {
                driver_id: *driver_id,
                order_id: next.id,
            });
            if let Some(unit_id) = next.unit {
                effects.push(RegistryEffect::ClearUnit {
                    unit_id,
                    order_id: next.id,
                });
            }
            (
                "Order Complete",
                format!("driver {driver_id} returned the clothes to the client"),
            )
        }

        Command::Cancel { actor } => {
            cancel(&mut next, *actor, now, &mut effects)?;
            ("Order Cancelled", format!("{actor} cancelled the order"))
        }

        Command::MarkPaid => {
            if next.order_paid_for {
                return Err(invalid(&next, "order is already paid for"));
            }
            if next.order_total_cents == 0 {
                return Err(invalid(&next, "order has not been priced"));
            }
            next.order_paid_for = true;
            (
                "Payment Received",
                format!("billing provider confirmed {}", format_cents(next.order_total_cents)),
            )
        }
    };

    next.event_log.append(now, event, details, actor);
    Ok(Transition {
        order: next,
        effects,
    })
}

fn claim(order: &mut Order, driver: DriverCredentials, role: DriverRole) -> Result<(), AppError> {
    let (posted, claimed, slot) = match role {
        DriverRole::Pickup => (
            OrderStatus::PostedPickup,
            OrderStatus::PickupDriverEnRoute,
            order.pick_up_driver,
        ),
        DriverRole::Dropoff => (
            OrderStatus::PostedDropoff,
            OrderStatus::DropoffDriverEnRoute,
            order.drop_off_driver,
        ),
    };

    if order.status != posted {
        // The first writer already moved the order on; tell the loser apart
        // from a plain out-of-order request.
        if order.status == claimed {
            return match slot.id() {
                Some(holder) if holder == driver.id => {
                    Err(invalid(order, "driver already claimed this order"))
                }
                _ => Err(AppError::ConcurrentClaimLost(order.id)),
            };
        }
        return Err(invalid(order, &format!("order cannot be claimed for {role}")));
    }

    if !driver.background_checked {
        return Err(invalid(order, "driver has not passed the background check"));
    }
    if slot.is_assigned() {
        return Err(AppError::ConcurrentClaimLost(order.id));
    }

    match role {
        DriverRole::Pickup => order.pick_up_driver = Assignee::AssignedTo(driver.id),
        DriverRole::Dropoff => order.drop_off_driver = Assignee::AssignedTo(driver.id),
    }
    order.status = claimed;
    Ok(())
}

fn cancel(
    order: &mut Order,
    actor: ActorRef,
    now: DateTime<Utc>,
    effects: &mut Vec<RegistryEffect>,
) -> Result<(), AppError> {
    if order.order_paid_for {
        return Err(invalid(order, "paid orders can no longer be cancelled"));
    }

    // A posted return leg already has the clothes at the cleaner, so only
    // the pickup side qualifies until the client hands the clothes over.
    let allowed_status = match order.status {
        OrderStatus::PostedPickup | OrderStatus::PickupDriverEnRoute => {
            order.timestamps.client_pickup_time.is_none()
        }
        OrderStatus::ClothesToCleaner => order.is_unit_originated(),
        _ => false,
    };
    if !allowed_status {
        return Err(invalid(
            order,
            "clothes have already been picked up and can no longer be cancelled",
        ));
    }

    let authorized = match actor.kind {
        ActorKind::Client => actor.id == order.client_id,
        ActorKind::Driver => {
            order.active_driver() == Some(actor.id)
                || matches!(order.origin, OrderOrigin::Unit { driver_id, .. } if driver_id == actor.id)
        }
        ActorKind::Management => order.unit.is_some(),
        ActorKind::System => true,
        ActorKind::CleanerStaff => false,
    };
    if !authorized {
        return Err(invalid(order, &format!("{} may not cancel this order", actor.kind)));
    }

    if let Some(driver_id) = order.active_driver() {
        effects.push(RegistryEffect::RemoveFromDriver {
            driver_id,
            order_id: order.id,
        });
    }
    if let Some(unit_id) = order.unit {
        effects.push(RegistryEffect::ClearUnit {
            unit_id,
            order_id: order.id,
        });
    }

    order.pick_up_driver = Assignee::Unassigned;
    order.drop_off_driver = Assignee::Unassigned;
    close(order, OrderStatus::Cancelled, now)
}

fn close(order: &mut Order, status: OrderStatus, now: DateTime<Utc>) -> Result<(), AppError> {
    set_once(&mut order.timestamps.closed_time, now, "closed time")?;
    order.status = status;
    order.order_closed = true;
    Ok(())
}

fn expect_status(order: &Order, allowed: &[OrderStatus]) -> Result<(), AppError> {
    if allowed.contains(&order.status) {
        Ok(())
    } else {
        Err(status_mismatch(order))
    }
}

fn expect_holder(order: &Order, slot: Assignee, driver_id: Uuid, role: &str) -> Result<(), AppError> {
    match slot.id() {
        Some(holder) if holder == driver_id => Ok(()),
        Some(_) => Err(invalid(order, &format!("{role} is a different driver"))),
        None => Err(invalid(order, &format!("order has no {role}"))),
    }
}

fn expect_staff(order: &Order, staff: StaffCredentials) -> Result<(), AppError> {
    if order.cleaner.is(staff.cleaner_id) {
        Ok(())
    } else {
        Err(invalid(order, "staff does not work at the order's cleaner"))
    }
}

fn set_once(
    slot: &mut Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    name: &str,
) -> Result<(), AppError> {
    if slot.is_some() {
        return Err(AppError::InvalidTransition(format!("{name} is already recorded")));
    }
    *slot = Some(now);
    Ok(())
}

fn status_mismatch(order: &Order) -> AppError {
    invalid(order, "operation is not allowed in this status")
}

fn invalid(order: &Order, reason: &str) -> AppError {
    AppError::InvalidTransition(format!("order {} ({}): {reason}", order.id, order.status))
}

fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
