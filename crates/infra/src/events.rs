//! The single event type published on the clinic bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{ClinicalRecordId, UserId, VisitSessionId};
use clinicflow_events::Event;
use clinicflow_inventory::StockEvent;
use clinicflow_invoicing::InvoiceEvent;
use clinicflow_requisitions::RequisitionEvent;
use clinicflow_visits::{ClinicalRecordKind, VisitEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stream", content = "event", rename_all = "snake_case")]
pub enum ClinicEvent {
    Stock(StockEvent),
    Requisition(RequisitionEvent),
    Invoice(InvoiceEvent),
    Visit(VisitEvent),
    ClinicalRecordCreated {
        record_id: ClinicalRecordId,
        visit_session_id: VisitSessionId,
        kind: ClinicalRecordKind,
        recorded_by: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for ClinicEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClinicEvent::Stock(e) => e.event_type(),
            ClinicEvent::Requisition(e) => e.event_type(),
            ClinicEvent::Invoice(e) => e.event_type(),
            ClinicEvent::Visit(e) => e.event_type(),
            ClinicEvent::ClinicalRecordCreated { .. } => "clinical.record_created",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClinicEvent::Stock(e) => e.occurred_at(),
            ClinicEvent::Requisition(e) => e.occurred_at(),
            ClinicEvent::Invoice(e) => e.occurred_at(),
            ClinicEvent::Visit(e) => e.occurred_at(),
            ClinicEvent::ClinicalRecordCreated { occurred_at, .. } => *occurred_at,
        }
    }
}

impl From<StockEvent> for ClinicEvent {
    fn from(value: StockEvent) -> Self {
        ClinicEvent::Stock(value)
    }
}

impl From<RequisitionEvent> for ClinicEvent {
    fn from(value: RequisitionEvent) -> Self {
        ClinicEvent::Requisition(value)
    }
}

impl From<InvoiceEvent> for ClinicEvent {
    fn from(value: InvoiceEvent) -> Self {
        ClinicEvent::Invoice(value)
    }
}

impl From<VisitEvent> for ClinicEvent {
    fn from(value: VisitEvent) -> Self {
        ClinicEvent::Visit(value)
    }
}
