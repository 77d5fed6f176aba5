use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    Aggregate, AggregateRoot, DomainError, InvoiceId, Money, PatientId, UserId, VisitSessionId,
};
use clinicflow_events::Event;

use crate::pricing::{InvoiceItem, InvoiceTotals};
use crate::purpose::{InvoicePurpose, InvoiceStatus, PaymentMethod, PaymentStatus};

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    invoice_number: String,
    purpose: InvoicePurpose,
    patient_id: Option<PatientId>,
    visit_session_id: Option<VisitSessionId>,
    created_by: Option<UserId>,
    invoice_date: Option<DateTime<Utc>>,
    due_date: Option<NaiveDate>,
    items: Vec<InvoiceItem>,
    totals: InvoiceTotals,
    amount_paid: Money,
    status: InvoiceStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    payment_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    stock_debited: bool,
    notes: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            invoice_number: String::new(),
            purpose: InvoicePurpose::GeneralInvoice,
            patient_id: None,
            visit_session_id: None,
            created_by: None,
            invoice_date: None,
            due_date: None,
            items: Vec::new(),
            totals: InvoiceTotals::default(),
            amount_paid: Money::ZERO,
            status: InvoiceStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            payment_reference: None,
            paid_at: None,
            stock_debited: false,
            notes: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn purpose(&self) -> InvoicePurpose {
        self.purpose
    }

    pub fn patient_id(&self) -> Option<PatientId> {
        self.patient_id
    }

    pub fn visit_session_id(&self) -> Option<VisitSessionId> {
        self.visit_session_id
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn invoice_date(&self) -> Option<DateTime<Utc>> {
        self.invoice_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn total_amount(&self) -> Money {
        self.totals.total
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    /// `total − amount_paid`, floored at zero.
    pub fn balance_due(&self) -> Money {
        self.totals.total.saturating_sub(self.amount_paid)
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    pub fn stock_debited(&self) -> bool {
        self.stock_debited
    }

    /// Paid dispensary sale whose stock has not been taken yet.
    pub fn needs_stock_debit(&self) -> bool {
        self.is_paid() && !self.stock_debited && self.purpose.debits_stock_on_payment()
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice. Items arrive already priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub purpose: InvoicePurpose,
    pub patient_id: PatientId,
    pub visit_session_id: Option<VisitSessionId>,
    pub created_by: Option<UserId>,
    pub due_date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetInvoiceStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInvoiceStatus {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkStockDebited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkStockDebited {
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Create(CreateInvoice),
    RecordPayment(RecordPayment),
    SetStatus(SetInvoiceStatus),
    MarkStockDebited(MarkStockDebited),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvoiceEvent {
    Created {
        invoice_id: InvoiceId,
        invoice_number: String,
        purpose: InvoicePurpose,
        patient_id: PatientId,
        visit_session_id: Option<VisitSessionId>,
        created_by: Option<UserId>,
        due_date: NaiveDate,
        items: Vec<InvoiceItem>,
        totals: InvoiceTotals,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    PaymentRecorded {
        invoice_id: InvoiceId,
        amount: Money,
        amount_paid: Money,
        method: PaymentMethod,
        reference: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    /// Emitted once, on the transition into PAID.
    Paid {
        invoice_id: InvoiceId,
        visit_session_id: Option<VisitSessionId>,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        invoice_id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
        method: Option<PaymentMethod>,
        reference: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    StockDebited {
        invoice_id: InvoiceId,
        occurred_at: DateTime<Utc>,
    },
}

impl InvoiceEvent {
    pub fn is_paid_transition(&self) -> bool {
        matches!(self, InvoiceEvent::Paid { .. })
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Created { .. } => "invoice.created",
            InvoiceEvent::PaymentRecorded { .. } => "invoice.payment_recorded",
            InvoiceEvent::Paid { .. } => "invoice.paid",
            InvoiceEvent::StatusChanged { .. } => "invoice.status_changed",
            InvoiceEvent::StockDebited { .. } => "invoice.stock_debited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Created { occurred_at, .. }
            | InvoiceEvent::PaymentRecorded { occurred_at, .. }
            | InvoiceEvent::Paid { occurred_at, .. }
            | InvoiceEvent::StatusChanged { occurred_at, .. }
            | InvoiceEvent::StockDebited { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Created {
                invoice_id,
                invoice_number,
                purpose,
                patient_id,
                visit_session_id,
                created_by,
                due_date,
                items,
                totals,
                notes,
                occurred_at,
            } => {
                self.id = *invoice_id;
                self.invoice_number = invoice_number.clone();
                self.purpose = *purpose;
                self.patient_id = Some(*patient_id);
                self.visit_session_id = *visit_session_id;
                self.created_by = *created_by;
                self.invoice_date = Some(*occurred_at);
                self.due_date = Some(*due_date);
                self.items = items.clone();
                self.totals = *totals;
                self.notes = notes.clone();
                self.status = InvoiceStatus::Pending;
                self.payment_status = PaymentStatus::Pending;
                self.updated_at = Some(*occurred_at);
                self.created = true;
            }
            InvoiceEvent::PaymentRecorded {
                amount_paid,
                method,
                reference,
                occurred_at,
                ..
            } => {
                self.amount_paid = *amount_paid;
                self.payment_method = Some(*method);
                if reference.is_some() {
                    self.payment_reference = reference.clone();
                }
                self.payment_status = if self.balance_due().is_zero() {
                    PaymentStatus::Paid
                } else if self.amount_paid.is_zero() {
                    PaymentStatus::Pending
                } else {
                    PaymentStatus::Partial
                };
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::Paid { occurred_at, .. } => {
                self.amount_paid = self.totals.total;
                self.status = InvoiceStatus::Paid;
                self.payment_status = PaymentStatus::Paid;
                self.paid_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::StatusChanged {
                to,
                method,
                reference,
                occurred_at,
                ..
            } => {
                self.status = *to;
                if method.is_some() {
                    self.payment_method = *method;
                }
                if reference.is_some() {
                    self.payment_reference = reference.clone();
                }
                match to {
                    InvoiceStatus::Refunded => self.payment_status = PaymentStatus::Refunded,
                    InvoiceStatus::Overdue if !self.is_paid() => {
                        self.payment_status = PaymentStatus::Overdue
                    }
                    _ => {}
                }
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::StockDebited { occurred_at, .. } => {
                self.stock_debited = true;
                self.updated_at = Some(*occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            InvoiceCommand::MarkStockDebited(cmd) => self.handle_mark_stock_debited(cmd),
        }
    }
}

impl Invoice {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("invoice {}", self.id)));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, id: InvoiceId) -> Result<(), DomainError> {
        if self.id != id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number is required"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("invoice must have at least one item"));
        }
        let totals = InvoiceTotals::of(&cmd.items)?;

        Ok(vec![InvoiceEvent::Created {
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            purpose: cmd.purpose,
            patient_id: cmd.patient_id,
            visit_session_id: cmd.visit_session_id,
            created_by: cmd.created_by,
            due_date: cmd.due_date,
            items: cmd.items.clone(),
            totals,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_record_payment(&self, cmd: &RecordPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        if self.status.is_closed() || self.is_paid() {
            return Err(DomainError::conflict(format!(
                "invoice {} is {:?} and cannot accept payments",
                self.invoice_number, self.status
            )));
        }
        if cmd.amount.is_zero() {
            return Err(DomainError::validation("payment amount must be greater than zero"));
        }
        let balance = self.balance_due();
        if cmd.amount > balance {
            return Err(DomainError::validation(format!(
                "Payment amount {} exceeds balance due {} on invoice {}",
                cmd.amount, balance, self.invoice_number
            )));
        }

        let amount_paid = self.amount_paid.checked_add(cmd.amount)?;
        let mut events = vec![InvoiceEvent::PaymentRecorded {
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            amount_paid,
            method: cmd.method,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        }];
        if cmd.amount == balance {
            events.push(InvoiceEvent::Paid {
                invoice_id: cmd.invoice_id,
                visit_session_id: self.visit_session_id,
                occurred_at: cmd.occurred_at,
            });
        }
        Ok(events)
    }

    fn handle_set_status(&self, cmd: &SetInvoiceStatus) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if cmd.status == self.status {
            // Re-marking is a no-op; the PAID side effects already fired.
            return Ok(Vec::new());
        }
        match self.status {
            InvoiceStatus::Cancelled | InvoiceStatus::Refunded => {
                return Err(DomainError::conflict(format!(
                    "invoice {} is {:?}; its status can no longer change",
                    self.invoice_number, self.status
                )));
            }
            InvoiceStatus::Paid if cmd.status != InvoiceStatus::Refunded => {
                return Err(DomainError::conflict(format!(
                    "invoice {} is paid; only a refund can follow",
                    self.invoice_number
                )));
            }
            _ => {}
        }

        let mut events = vec![InvoiceEvent::StatusChanged {
            invoice_id: cmd.invoice_id,
            from: self.status,
            to: cmd.status,
            method: cmd.method,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        }];
        if cmd.status == InvoiceStatus::Paid {
            events.push(InvoiceEvent::Paid {
                invoice_id: cmd.invoice_id,
                visit_session_id: self.visit_session_id,
                occurred_at: cmd.occurred_at,
            });
        }
        Ok(events)
    }

    fn handle_mark_stock_debited(
        &self,
        cmd: &MarkStockDebited,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        if self.stock_debited {
            return Err(DomainError::conflict(format!(
                "stock for invoice {} was already debited",
                self.invoice_number
            )));
        }
        if !self.is_paid() {
            return Err(DomainError::invariant("stock can only be debited for paid invoices"));
        }
        Ok(vec![InvoiceEvent::StockDebited {
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        }])
    }
}
