use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Client,
    Driver,
    CleanerStaff,
    Management,
    System,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActorKind::Client => "client",
            ActorKind::Driver => "driver",
            ActorKind::CleanerStaff => "cleaner_staff",
            ActorKind::Management => "management",
            ActorKind::System => "system",
        };
        f.write_str(label)
    }
}

/// Identity of whoever performed a transition, as recorded in the event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActorRef {
    pub kind: ActorKind,
    pub id: Uuid,
}

impl ActorRef {
    pub fn client(id: Uuid) -> Self {
        Self {
            kind: ActorKind::Client,
            id,
        }
    }

    pub fn driver(id: Uuid) -> Self {
        Self {
            kind: ActorKind::Driver,
            id,
        }
    }

    pub fn cleaner_staff(id: Uuid) -> Self {
        Self {
            kind: ActorKind::CleanerStaff,
            id,
        }
    }

    pub fn management(id: Uuid) -> Self {
        Self {
            kind: ActorKind::Management,
            id,
        }
    }

    /// Billing callbacks and the reconciliation sweep act as the nil system actor.
    pub fn system() -> Self {
        Self {
            kind: ActorKind::System,
            id: Uuid::nil(),
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub background_checked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cleaner {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// An employee of exactly one cleaner; staff may only act on that cleaner's orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanerStaff {
    pub id: Uuid,
    pub cleaner_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
