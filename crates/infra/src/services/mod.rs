//! Application services: every public operation of the clinic.
//!
//! Each operation is one [`Database::transaction`]. The transaction reads the
//! rows it needs, lets the aggregates decide, stages the evolved rows and the
//! resulting events, and commits atomically. Events are published only after
//! commit; a failed publish is logged and does not undo the operation.

mod clinical;
mod invoices;
mod ledger;
mod requisitions;
mod stock;
mod transfer;
mod usage;
mod visits;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use clinicflow_core::{Clock, UserId};
use clinicflow_events::{EventBus, EventEnvelope};

use crate::config::WorkflowConfig;
use crate::error::ServiceResult;
use crate::events::ClinicEvent;
use crate::store::{Database, PendingEvent, Tables, Transaction};

pub use clinical::ClinicalTable;
pub use invoices::{BillingSource, NewInvoice};
pub use requisitions::RequisitionLine;
pub use stock::TheaterRestock;
pub use visits::NewVisit;

/// Envelope type carried by the clinic bus.
pub type ClinicEnvelope = EventEnvelope<ClinicEvent>;

pub struct ClinicServices<B> {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    bus: B,
    config: WorkflowConfig,
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, bus: B, config: WorkflowConfig) -> Self {
        Self {
            db,
            clock,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `op` in a transaction, then publish what it recorded.
    fn execute<T>(
        &self,
        actor: Option<UserId>,
        op: impl FnMut(&mut Transaction<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let (value, events) = self.db.transaction(self.config.commit_attempts, op)?;
        self.publish(actor, events);
        Ok(value)
    }

    fn publish(&self, actor: Option<UserId>, events: Vec<PendingEvent>) {
        for pending in events {
            let envelope = EventEnvelope::wrap(pending.subject, actor, pending.event);
            let event_type = envelope.event_type().to_string();
            if let Err(err) = self.bus.publish(envelope) {
                warn!(event_type, ?err, "failed to publish event");
            }
        }
    }

    fn view<T>(&self, f: impl FnOnce(&Tables) -> T) -> ServiceResult<T> {
        Ok(self.db.view(f)?)
    }
}
