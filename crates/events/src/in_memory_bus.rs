//! In-process envelope bus.
//!
//! Subscribers either take every committed event or only the streams they
//! name, where a stream is the part of the event type before the first dot
//! (`"invoice.paid"` belongs to `"invoice"`).

use std::sync::{Mutex, mpsc};

use thiserror::Error;
use tracing::debug;

use crate::bus::{EventBus, Subscription};
use crate::envelope::EventEnvelope;
use crate::event::Event;

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Subscriber<E> {
    /// `None` receives every stream.
    streams: Option<Vec<String>>,
    sender: mpsc::Sender<EventEnvelope<E>>,
}

impl<E> Subscriber<E> {
    fn wants(&self, event_type: &str) -> bool {
        let stream = event_type.split('.').next().unwrap_or(event_type);
        match &self.streams {
            None => true,
            Some(streams) => streams.iter().any(|s| s == stream),
        }
    }
}

/// Fan-out of committed clinic envelopes to in-process subscribers.
///
/// Publishing never blocks on a slow subscriber; a subscriber whose receiving
/// side is gone is pruned on the next delivery attempt.
#[derive(Debug)]
pub struct InMemoryEventBus<E> {
    subscribers: Mutex<Vec<Subscriber<E>>>,
}

impl<E> Default for InMemoryEventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Event> InMemoryEventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the named streams only, e.g. `["invoice", "stock"]`.
    pub fn subscribe_to<S: AsRef<str>>(&self, streams: &[S]) -> Subscription<EventEnvelope<E>> {
        let streams = streams.iter().map(|s| s.as_ref().to_string()).collect();
        self.attach(Some(streams))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    fn attach(&self, streams: Option<Vec<String>>) -> Subscription<EventEnvelope<E>> {
        let (sender, receiver) = mpsc::channel();
        // A poisoned bus still hands out a subscription; it just stays silent.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { streams, sender });
        }
        Subscription::new(receiver)
    }
}

impl<E: Event> EventBus<EventEnvelope<E>> for InMemoryEventBus<E> {
    type Error = InMemoryBusError;

    fn publish(&self, envelope: EventEnvelope<E>) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let before = subs.len();
        subs.retain(|sub| !sub.wants(envelope.event_type()) || sub.sender.send(envelope.clone()).is_ok());
        if subs.len() < before {
            debug!(
                event_type = envelope.event_type(),
                dropped = before - subs.len(),
                "pruned closed subscribers"
            );
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<E>> {
        self.attach(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    enum Ward {
        Admitted,
        Billed,
    }

    impl Event for Ward {
        fn event_type(&self) -> &'static str {
            match self {
                Ward::Admitted => "visit.registered",
                Ward::Billed => "invoice.created",
            }
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    fn envelope(event: Ward) -> EventEnvelope<Ward> {
        EventEnvelope::wrap(Uuid::now_v7(), None, event)
    }

    #[test]
    fn every_subscriber_receives_published_envelopes() {
        let bus = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(envelope(Ward::Admitted)).unwrap();

        assert_eq!(a.try_recv().unwrap().payload(), &Ward::Admitted);
        assert_eq!(b.try_recv().unwrap().payload(), &Ward::Admitted);
    }

    #[test]
    fn stream_subscribers_only_see_their_streams() {
        let bus = InMemoryEventBus::new();
        let billing = bus.subscribe_to(&["invoice"]);
        let all = bus.subscribe();

        bus.publish(envelope(Ward::Admitted)).unwrap();
        bus.publish(envelope(Ward::Billed)).unwrap();

        let seen: Vec<_> = billing.drain().into_iter().map(|e| e.into_payload()).collect();
        assert_eq!(seen, vec![Ward::Billed]);
        assert_eq!(all.drain().len(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_delivery() {
        let bus = InMemoryEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        let idle = bus.subscribe_to(&["stock"]);
        drop(idle);

        bus.publish(envelope(Ward::Admitted)).unwrap();

        assert_eq!(kept.drain().len(), 1);
        // The stock subscriber was never offered a visit event, so it lingers.
        assert_eq!(bus.subscriber_count(), 2);
    }
}
