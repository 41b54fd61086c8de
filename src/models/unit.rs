use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::Assignee;

/// A unit is either idle, waiting in the pickup queue, or holding one
/// in-flight order. Queueing and holding an order cannot coexist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Vacant,
    Queued { position: u64, since: DateTime<Utc> },
    Occupied { order_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: Uuid,
    pub building: String,
    pub unit_number: String,
    pub client: Assignee,
    pub is_active: bool,
    pub occupancy: Occupancy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub fn active_order(&self) -> Option<Uuid> {
        match self.occupancy {
            Occupancy::Occupied { order_id } => Some(order_id),
            _ => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.occupancy, Occupancy::Queued { .. })
    }
}
