//! Domain events and their distribution.
//!
//! Workflows emit events describing what happened; once a transaction commits,
//! the events are wrapped in an [`EventEnvelope`] and published on an
//! [`EventBus`]. Subscribers (notification dispatch, audit feeds) are
//! best-effort: a failed publish never rolls back the operation that produced it.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
