use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::ActorRef;
use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEntry {
    pub time: DateTime<Utc>,
    pub event: String,
    pub details: String,
    pub actor: ActorRef,
}

/// Append-only audit trail of an order. Entries cannot be edited or removed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<EventEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        time: DateTime<Utc>,
        event: impl Into<String>,
        details: impl Into<String>,
        actor: ActorRef,
    ) {
        self.entries.push(EventEntry {
            time,
            event: event.into(),
            details: details.into(),
            actor,
        });
    }

    pub fn entries(&self) -> &[EventEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&EventEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payload pushed to live subscribers after every committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub entry: EventEntry,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::EventLog;
    use crate::models::actor::ActorRef;

    #[test]
    fn entries_keep_append_order_and_serialize_as_a_list() {
        let driver = ActorRef::driver(Uuid::from_u128(7));
        let mut log = EventLog::new();
        log.append(Utc::now(), "Order Posted", "client posted a pickup request", ActorRef::system());
        log.append(Utc::now(), "Order Claimed", "picked up by driver", driver);

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].event, "Order Posted");
        assert_eq!(log.last().map(|entry| entry.actor), Some(driver));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["details"], "picked up by driver");
    }
}
