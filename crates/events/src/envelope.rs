use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clinicflow_core::UserId;

use crate::event::Event;

/// Envelope for a committed event, carrying delivery metadata.
///
/// - `subject_id` is the id of the row the event is about (visit, invoice, ...).
/// - `actor` is the authenticated user the operation ran for, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    subject_id: Uuid,
    actor: Option<UserId>,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    pub fn wrap(subject_id: Uuid, actor: Option<UserId>, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: payload.event_type().to_string(),
            subject_id,
            actor,
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_type_and_time_from_payload() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let subject = Uuid::now_v7();
        let env = EventEnvelope::wrap(subject, None, Pinged { at });
        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.occurred_at(), at);
        assert_eq!(env.subject_id(), subject);
    }
}
