use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, InvoiceId, Money, PatientId,
    VisitSessionId,
};
use clinicflow_events::Event;
use clinicflow_invoicing::PaymentMethod;

use crate::clinical::ClinicalRecordKind;
use crate::stage::{EmergencyLevel, VisitPurpose, VisitStage, VisitStatus};

/// Aggregate root: VisitSession.
///
/// `stage` only moves forward. Cancel and no-show change the status to a
/// terminal value and freeze the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSession {
    id: VisitSessionId,
    patient_id: Option<PatientId>,
    purpose: VisitPurpose,
    stage: VisitStage,
    status: VisitStatus,
    consultation_fee: Money,
    fee_paid: bool,
    payment_method: Option<PaymentMethod>,
    payment_reference: Option<String>,
    invoice_id: Option<InvoiceId>,
    emergency_level: EmergencyLevel,
    chief_complaint: Option<String>,
    notes: Option<String>,
    visit_date: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl VisitSession {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: VisitSessionId) -> Self {
        Self {
            id,
            patient_id: None,
            purpose: VisitPurpose::NewConsultation,
            stage: VisitStage::Reception,
            status: VisitStatus::Registered,
            consultation_fee: Money::ZERO,
            fee_paid: false,
            payment_method: None,
            payment_reference: None,
            invoice_id: None,
            emergency_level: EmergencyLevel::None,
            chief_complaint: None,
            notes: None,
            visit_date: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VisitSessionId {
        self.id
    }

    pub fn patient_id(&self) -> Option<PatientId> {
        self.patient_id
    }

    pub fn purpose(&self) -> VisitPurpose {
        self.purpose
    }

    pub fn stage(&self) -> VisitStage {
        self.stage
    }

    pub fn status(&self) -> VisitStatus {
        self.status
    }

    pub fn consultation_fee(&self) -> Money {
        self.consultation_fee
    }

    pub fn fee_paid(&self) -> bool {
        self.fee_paid
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn emergency_level(&self) -> EmergencyLevel {
        self.emergency_level
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency_level != EmergencyLevel::None || self.purpose == VisitPurpose::Emergency
    }

    pub fn chief_complaint(&self) -> Option<&str> {
        self.chief_complaint.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn visit_date(&self) -> Option<DateTime<Utc>> {
        self.visit_date
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A fee is owed and no invoice carries it yet.
    pub fn awaits_consultation_invoice(&self) -> bool {
        !self.consultation_fee.is_zero() && self.invoice_id.is_none() && !self.is_terminal()
    }

    /// Whether work past the cashier may start.
    ///
    /// `linked_invoice_paid` is `None` when no invoice is linked.
    pub fn ensure_payment_cleared(&self, linked_invoice_paid: Option<bool>) -> DomainResult<()> {
        if self.status == VisitStatus::Free {
            return Ok(());
        }
        if !self.fee_paid {
            return Err(DomainError::payment_required(format!(
                "Cannot proceed to triage: Consultation fee not paid. Current status: {}",
                self.status.as_str()
            )));
        }
        if linked_invoice_paid == Some(false) {
            return Err(DomainError::payment_required(
                "Cannot proceed to triage: Invoice payment pending. Please complete payment first.",
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for VisitSession {
    type Id = VisitSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterVisit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVisit {
    pub session_id: VisitSessionId,
    pub patient_id: PatientId,
    pub purpose: VisitPurpose,
    pub consultation_fee: Option<Money>,
    pub fee_already_paid: bool,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub emergency_level: EmergencyLevel,
    pub chief_complaint: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceStage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStage {
    pub session_id: VisitSessionId,
    /// Payment state of the linked invoice, if one is linked.
    pub linked_invoice_paid: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordVisitPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVisitPayment {
    pub session_id: VisitSessionId,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInvoice {
    pub session_id: VisitSessionId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkInvoice {
    pub session_id: VisitSessionId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteClinicalStage. Issued when a one-per-visit record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteClinicalStage {
    pub session_id: VisitSessionId,
    pub kind: ClinicalRecordKind,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVisitStatus {
    pub session_id: VisitSessionId,
    pub status: VisitStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelVisit {
    pub session_id: VisitSessionId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkNoShow {
    pub session_id: VisitSessionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteVisit {
    pub session_id: VisitSessionId,
    pub linked_invoice_paid: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitCommand {
    Register(RegisterVisit),
    AdvanceStage(AdvanceStage),
    RecordPayment(RecordVisitPayment),
    LinkInvoice(LinkInvoice),
    UnlinkInvoice(UnlinkInvoice),
    CompleteClinicalStage(CompleteClinicalStage),
    SetStatus(SetVisitStatus),
    Cancel(CancelVisit),
    MarkNoShow(MarkNoShow),
    Complete(CompleteVisit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisitEvent {
    Registered {
        session_id: VisitSessionId,
        patient_id: PatientId,
        purpose: VisitPurpose,
        stage: VisitStage,
        status: VisitStatus,
        consultation_fee: Money,
        fee_paid: bool,
        payment_method: Option<PaymentMethod>,
        payment_reference: Option<String>,
        emergency_level: EmergencyLevel,
        chief_complaint: Option<String>,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    StageAdvanced {
        session_id: VisitSessionId,
        from: VisitStage,
        to: VisitStage,
        status: VisitStatus,
        occurred_at: DateTime<Utc>,
    },
    PaymentRecorded {
        session_id: VisitSessionId,
        method: PaymentMethod,
        reference: Option<String>,
        stage: VisitStage,
        status: VisitStatus,
        occurred_at: DateTime<Utc>,
    },
    InvoiceLinked {
        session_id: VisitSessionId,
        invoice_id: InvoiceId,
        occurred_at: DateTime<Utc>,
    },
    InvoiceUnlinked {
        session_id: VisitSessionId,
        invoice_id: InvoiceId,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        session_id: VisitSessionId,
        from: VisitStatus,
        to: VisitStatus,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        session_id: VisitSessionId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    MarkedNoShow {
        session_id: VisitSessionId,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        session_id: VisitSessionId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for VisitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VisitEvent::Registered { .. } => "visit.registered",
            VisitEvent::StageAdvanced { .. } => "visit.stage_advanced",
            VisitEvent::PaymentRecorded { .. } => "visit.payment_recorded",
            VisitEvent::InvoiceLinked { .. } => "visit.invoice_linked",
            VisitEvent::InvoiceUnlinked { .. } => "visit.invoice_unlinked",
            VisitEvent::StatusChanged { .. } => "visit.status_changed",
            VisitEvent::Cancelled { .. } => "visit.cancelled",
            VisitEvent::MarkedNoShow { .. } => "visit.no_show",
            VisitEvent::Completed { .. } => "visit.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VisitEvent::Registered { occurred_at, .. }
            | VisitEvent::StageAdvanced { occurred_at, .. }
            | VisitEvent::PaymentRecorded { occurred_at, .. }
            | VisitEvent::InvoiceLinked { occurred_at, .. }
            | VisitEvent::InvoiceUnlinked { occurred_at, .. }
            | VisitEvent::StatusChanged { occurred_at, .. }
            | VisitEvent::Cancelled { occurred_at, .. }
            | VisitEvent::MarkedNoShow { occurred_at, .. }
            | VisitEvent::Completed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for VisitSession {
    type Command = VisitCommand;
    type Event = VisitEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VisitEvent::Registered {
                session_id,
                patient_id,
                purpose,
                stage,
                status,
                consultation_fee,
                fee_paid,
                payment_method,
                payment_reference,
                emergency_level,
                chief_complaint,
                notes,
                occurred_at,
            } => {
                self.id = *session_id;
                self.patient_id = Some(*patient_id);
                self.purpose = *purpose;
                self.stage = *stage;
                self.status = *status;
                self.consultation_fee = *consultation_fee;
                self.fee_paid = *fee_paid;
                self.payment_method = *payment_method;
                self.payment_reference = payment_reference.clone();
                self.emergency_level = *emergency_level;
                self.chief_complaint = chief_complaint.clone();
                self.notes = notes.clone();
                self.visit_date = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
                self.created = true;
            }
            VisitEvent::StageAdvanced {
                to,
                status,
                occurred_at,
                ..
            } => {
                self.stage = *to;
                self.status = *status;
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::PaymentRecorded {
                method,
                reference,
                stage,
                status,
                occurred_at,
                ..
            } => {
                self.fee_paid = true;
                self.payment_method = Some(*method);
                if reference.is_some() {
                    self.payment_reference = reference.clone();
                }
                self.stage = *stage;
                self.status = *status;
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::InvoiceLinked {
                invoice_id,
                occurred_at,
                ..
            } => {
                self.invoice_id = Some(*invoice_id);
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::InvoiceUnlinked { occurred_at, .. } => {
                self.invoice_id = None;
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::StatusChanged { to, occurred_at, .. } => {
                self.status = *to;
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::Cancelled {
                reason, occurred_at, ..
            } => {
                self.status = VisitStatus::Cancelled;
                if let Some(reason) = reason {
                    let line = format!("Cancelled: {reason}");
                    self.notes = Some(match self.notes.take() {
                        Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
                        _ => line,
                    });
                }
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::MarkedNoShow { occurred_at, .. } => {
                self.status = VisitStatus::NoShow;
                self.updated_at = Some(*occurred_at);
            }
            VisitEvent::Completed { occurred_at, .. } => {
                self.stage = VisitStage::Completed;
                self.status = VisitStatus::Completed;
                self.updated_at = Some(*occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VisitCommand::Register(cmd) => self.handle_register(cmd),
            VisitCommand::AdvanceStage(cmd) => self.handle_advance(cmd),
            VisitCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            VisitCommand::LinkInvoice(cmd) => self.handle_link_invoice(cmd),
            VisitCommand::UnlinkInvoice(cmd) => self.handle_unlink_invoice(cmd),
            VisitCommand::CompleteClinicalStage(cmd) => self.handle_clinical_stage(cmd),
            VisitCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            VisitCommand::Cancel(cmd) => self.handle_cancel(cmd),
            VisitCommand::MarkNoShow(cmd) => self.handle_no_show(cmd),
            VisitCommand::Complete(cmd) => self.handle_complete(cmd),
        }
    }
}

impl VisitSession {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("visit session {}", self.id)));
        }
        Ok(())
    }

    fn ensure_session_id(&self, id: VisitSessionId) -> Result<(), DomainError> {
        if self.id != id {
            return Err(DomainError::invariant("session_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, id: VisitSessionId) -> Result<(), DomainError> {
        self.ensure_created()?;
        self.ensure_session_id(id)?;
        if self.is_terminal() {
            return Err(DomainError::conflict(format!(
                "visit session {} is {} and accepts no further changes",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterVisit) -> Result<Vec<VisitEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("visit session already exists"));
        }
        self.ensure_session_id(cmd.session_id)?;

        let fee = cmd.consultation_fee.unwrap_or(Money::ZERO);
        let (stage, status, fee_paid) = if fee.is_zero() {
            (VisitStage::Triage, VisitStatus::Free, false)
        } else if cmd.fee_already_paid {
            (VisitStage::Triage, VisitStatus::PaymentCompleted, true)
        } else {
            (VisitStage::Cashier, VisitStatus::PaymentPending, false)
        };

        Ok(vec![VisitEvent::Registered {
            session_id: cmd.session_id,
            patient_id: cmd.patient_id,
            purpose: cmd.purpose,
            stage,
            status,
            consultation_fee: fee,
            fee_paid,
            payment_method: cmd.payment_method.filter(|_| fee_paid),
            payment_reference: cmd.payment_reference.clone().filter(|_| fee_paid),
            emergency_level: cmd.emergency_level,
            chief_complaint: cmd.chief_complaint.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_advance(&self, cmd: &AdvanceStage) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        if self.stage == VisitStage::Completed {
            return Ok(Vec::new());
        }

        let next = self.stage.successor();
        if next == VisitStage::Triage {
            self.ensure_payment_cleared(cmd.linked_invoice_paid)?;
        }
        let status = next.entry_status(self.status).unwrap_or(self.status);

        Ok(vec![VisitEvent::StageAdvanced {
            session_id: cmd.session_id,
            from: self.stage,
            to: next,
            status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_record_payment(&self, cmd: &RecordVisitPayment) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        if self.fee_paid {
            return Err(DomainError::conflict(format!(
                "consultation fee for visit session {} is already paid",
                self.id
            )));
        }

        // Payment jumps straight to triage, never backwards.
        let (stage, status) = if self.stage <= VisitStage::Triage {
            (VisitStage::Triage, VisitStatus::PaymentCompleted)
        } else {
            (self.stage, self.status)
        };

        Ok(vec![VisitEvent::PaymentRecorded {
            session_id: cmd.session_id,
            method: cmd.method,
            reference: cmd.reference.clone(),
            stage,
            status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_link_invoice(&self, cmd: &LinkInvoice) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        match self.invoice_id {
            Some(existing) if existing == cmd.invoice_id => Ok(Vec::new()),
            Some(existing) => Err(DomainError::conflict(format!(
                "visit session {} is already linked to invoice {existing}",
                self.id
            ))),
            None => Ok(vec![VisitEvent::InvoiceLinked {
                session_id: cmd.session_id,
                invoice_id: cmd.invoice_id,
                occurred_at: cmd.occurred_at,
            }]),
        }
    }

    fn handle_unlink_invoice(&self, cmd: &UnlinkInvoice) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_session_id(cmd.session_id)?;
        if self.invoice_id != Some(cmd.invoice_id) {
            return Ok(Vec::new());
        }
        Ok(vec![VisitEvent::InvoiceUnlinked {
            session_id: cmd.session_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_clinical_stage(&self, cmd: &CompleteClinicalStage) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        let required = cmd.kind.required_stage();
        if self.stage < required {
            return Err(DomainError::validation(format!(
                "{} cannot be recorded yet: visit session {} is at stage {:?}",
                cmd.kind.label(),
                self.id,
                self.stage
            )));
        }
        if self.stage > required {
            return Err(DomainError::conflict(format!(
                "{} stage has already passed for visit session {}",
                cmd.kind.label(),
                self.id
            )));
        }

        let next = self.stage.successor();
        let status = next.entry_status(self.status).unwrap_or(self.status);
        Ok(vec![VisitEvent::StageAdvanced {
            session_id: cmd.session_id,
            from: self.stage,
            to: next,
            status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_set_status(&self, cmd: &SetVisitStatus) -> Result<Vec<VisitEvent>, DomainError> {
        if cmd.status.is_terminal() {
            return Err(DomainError::validation(
                "use the cancel or no-show operations to end a visit",
            ));
        }
        self.ensure_open(cmd.session_id)?;
        if cmd.status == self.status {
            return Ok(Vec::new());
        }
        Ok(vec![VisitEvent::StatusChanged {
            session_id: cmd.session_id,
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_cancel(&self, cmd: &CancelVisit) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        if self.stage == VisitStage::Completed {
            return Err(DomainError::conflict(format!(
                "visit session {} is already completed",
                self.id
            )));
        }
        Ok(vec![VisitEvent::Cancelled {
            session_id: cmd.session_id,
            reason: cmd
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_no_show(&self, cmd: &MarkNoShow) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        if self.stage == VisitStage::Completed {
            return Err(DomainError::conflict(format!(
                "visit session {} is already completed",
                self.id
            )));
        }
        Ok(vec![VisitEvent::MarkedNoShow {
            session_id: cmd.session_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_complete(&self, cmd: &CompleteVisit) -> Result<Vec<VisitEvent>, DomainError> {
        self.ensure_open(cmd.session_id)?;
        if self.stage == VisitStage::Completed {
            return Ok(Vec::new());
        }
        if self.stage < VisitStage::Triage {
            self.ensure_payment_cleared(cmd.linked_invoice_paid)?;
        }
        Ok(vec![VisitEvent::Completed {
            session_id: cmd.session_id,
            occurred_at: cmd.occurred_at,
        }])
    }
}
