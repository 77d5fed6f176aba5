//! Visit workflow: registration with the consultation invoice, payment,
//! stage progression and terminal transitions.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use clinicflow_core::{Aggregate, DomainError, Money, PatientId, UserId, VisitSessionId};
use clinicflow_events::EventBus;
use clinicflow_invoicing::{Invoice, InvoicePurpose, ItemType, NewInvoiceItem, PaymentMethod};
use clinicflow_visits::{
    AdvanceStage, CancelVisit, CompleteVisit, EmergencyLevel, LinkInvoice, MarkNoShow,
    RecordVisitPayment, RegisterVisit, SetVisitStatus, VisitCommand, VisitEvent, VisitPurpose,
    VisitSession, VisitStatus,
};

use super::invoices::{self, InvoiceDraft};
use super::{ClinicEnvelope, ClinicServices};
use crate::error::ServiceResult;
use crate::store::Transaction;

/// Registration request for a new visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVisit {
    pub patient_id: PatientId,
    pub purpose: VisitPurpose,
    #[serde(default)]
    pub consultation_fee: Option<Money>,
    #[serde(default)]
    pub fee_already_paid: bool,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub emergency_level: EmergencyLevel,
    #[serde(default)]
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub(crate) fn load_visit(tx: &mut Transaction<'_>, id: VisitSessionId) -> ServiceResult<VisitSession> {
    tx.visits()
        .get(&id)?
        .ok_or_else(|| DomainError::not_found(format!("visit session {id}")).into())
}

pub(crate) fn save_visit(
    tx: &mut Transaction<'_>,
    session: &VisitSession,
    events: Vec<VisitEvent>,
) -> ServiceResult<()> {
    tx.visits().put(session.id_typed(), session.clone())?;
    for event in events {
        tx.record(session.id_typed(), event);
    }
    Ok(())
}

/// Paid state of the session's linked invoice, if it still exists.
fn linked_invoice_paid(tx: &mut Transaction<'_>, session: &VisitSession) -> ServiceResult<Option<bool>> {
    let Some(invoice_id) = session.invoice_id() else {
        return Ok(None);
    };
    Ok(tx.invoices().get(&invoice_id)?.map(|invoice| invoice.is_paid()))
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    /// Register a visit. A consultation fee produces a consultation invoice
    /// linked to the session; failing to create it leaves the visit in place
    /// for a later [`retry_consultation_invoice`](Self::retry_consultation_invoice).
    #[instrument(skip_all, fields(patient_id = %input.patient_id, actor = %actor), err)]
    pub fn create_visit(&self, actor: UserId, input: NewVisit) -> ServiceResult<VisitSession> {
        let now = self.now();
        let session = self.execute(Some(actor), |tx| {
            let session_id = VisitSessionId::new();
            let mut session = VisitSession::empty(session_id);
            let events = session.execute(&VisitCommand::Register(RegisterVisit {
                session_id,
                patient_id: input.patient_id,
                purpose: input.purpose,
                consultation_fee: input.consultation_fee,
                fee_already_paid: input.fee_already_paid,
                payment_method: input.payment_method,
                payment_reference: input.payment_reference.clone(),
                emergency_level: input.emergency_level,
                chief_complaint: input.chief_complaint.clone(),
                notes: input.notes.clone(),
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })?;
        info!(
            visit_session_id = %session.id_typed(),
            stage = ?session.stage(),
            status = session.status().as_str(),
            "visit registered"
        );

        if !session.awaits_consultation_invoice() {
            return Ok(session);
        }
        match self.retry_consultation_invoice(session.id_typed(), actor) {
            Ok(_) => self.visit(session.id_typed()),
            Err(err) => {
                warn!(
                    visit_session_id = %session.id_typed(),
                    error = %err,
                    "consultation invoice could not be created; visit kept without invoice"
                );
                Ok(session)
            }
        }
    }

    /// Create and link the consultation invoice of a visit that has none.
    ///
    /// When the fee was already collected the invoice is marked paid at once.
    #[instrument(skip_all, fields(visit_session_id = %session_id), err)]
    pub fn retry_consultation_invoice(&self, session_id: VisitSessionId, actor: UserId) -> ServiceResult<Invoice> {
        let now = self.now();
        let invoice = self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            if !session.awaits_consultation_invoice() {
                return Err(DomainError::conflict(format!(
                    "visit session {session_id} does not need a consultation invoice"
                ))
                .into());
            }
            let patient_id = session
                .patient_id()
                .ok_or_else(|| DomainError::invariant(format!("visit session {session_id} has no patient")))?;

            let invoice = invoices::insert_invoice(
                tx,
                InvoiceDraft {
                    purpose: InvoicePurpose::ConsultationInvoice,
                    patient_id,
                    visit_session_id: Some(session_id),
                    created_by: Some(actor),
                    due_date: now.date_naive(),
                    items: vec![NewInvoiceItem::simple(
                        "Consultation Fee",
                        ItemType::Consultation,
                        1,
                        session.consultation_fee(),
                    )],
                    notes: Some(format!("Consultation fee for visit {session_id}")),
                },
                self.config.invoice_guard_window,
                now,
            )?;

            let events = session.execute(&VisitCommand::LinkInvoice(LinkInvoice {
                session_id,
                invoice_id: invoice.id_typed(),
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;

            if session.fee_paid() {
                return invoices::mark_invoice_paid(
                    tx,
                    invoice.id_typed(),
                    session.payment_method(),
                    session.payment_reference().map(str::to_string),
                    now,
                );
            }
            Ok(invoice)
        })?;
        info!(
            visit_session_id = %session_id,
            invoice = invoice.invoice_number(),
            "consultation invoice linked"
        );
        Ok(invoice)
    }

    /// Move the session one stage forward; entering triage requires payment.
    #[instrument(skip_all, fields(visit_session_id = %session_id), err)]
    pub fn advance_stage(&self, session_id: VisitSessionId, actor: UserId) -> ServiceResult<VisitSession> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let linked_invoice_paid = linked_invoice_paid(tx, &session)?;
            let events = session.execute(&VisitCommand::AdvanceStage(AdvanceStage {
                session_id,
                linked_invoice_paid,
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })
    }

    /// Take the consultation fee at the cashier and settle the linked invoice.
    #[instrument(skip_all, fields(visit_session_id = %session_id, ?method), err)]
    pub fn record_visit_payment(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> ServiceResult<VisitSession> {
        let now = self.now();
        let session = self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let events = session.execute(&VisitCommand::RecordPayment(RecordVisitPayment {
                session_id,
                method,
                reference: reference.clone(),
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            if let Some(invoice_id) = session.invoice_id() {
                if tx.invoices().get(&invoice_id)?.is_some() {
                    invoices::mark_invoice_paid(tx, invoice_id, Some(method), reference.clone(), now)?;
                }
            }
            Ok(session)
        })?;
        info!(visit_session_id = %session_id, ?method, "consultation fee paid");
        Ok(session)
    }

    pub fn set_visit_status(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        status: VisitStatus,
    ) -> ServiceResult<VisitSession> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let events = session.execute(&VisitCommand::SetStatus(SetVisitStatus {
                session_id,
                status,
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })
    }

    pub fn cancel_visit(
        &self,
        session_id: VisitSessionId,
        actor: UserId,
        reason: Option<String>,
    ) -> ServiceResult<VisitSession> {
        let now = self.now();
        let session = self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let events = session.execute(&VisitCommand::Cancel(CancelVisit {
                session_id,
                reason: reason.clone(),
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })?;
        info!(visit_session_id = %session_id, "visit cancelled");
        Ok(session)
    }

    pub fn mark_no_show(&self, session_id: VisitSessionId, actor: UserId) -> ServiceResult<VisitSession> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let events = session.execute(&VisitCommand::MarkNoShow(MarkNoShow {
                session_id,
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })
    }

    pub fn complete_visit(&self, session_id: VisitSessionId, actor: UserId) -> ServiceResult<VisitSession> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut session = load_visit(tx, session_id)?;
            let linked_invoice_paid = linked_invoice_paid(tx, &session)?;
            let events = session.execute(&VisitCommand::Complete(CompleteVisit {
                session_id,
                linked_invoice_paid,
                occurred_at: now,
            }))?;
            save_visit(tx, &session, events)?;
            Ok(session)
        })
    }

    pub fn visit(&self, session_id: VisitSessionId) -> ServiceResult<VisitSession> {
        self.view(|t| t.visits.get(&session_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("visit session {session_id}")).into())
    }

    /// Visits of a patient, newest first.
    pub fn visits_by_patient(&self, patient_id: PatientId) -> ServiceResult<Vec<VisitSession>> {
        self.visits_where(|s| s.patient_id() == Some(patient_id))
    }

    pub fn visits_by_status(&self, status: VisitStatus) -> ServiceResult<Vec<VisitSession>> {
        self.visits_where(|s| s.status() == status)
    }

    /// Open visits that still wait for their consultation invoice.
    pub fn visits_missing_consultation_invoice(&self) -> ServiceResult<Vec<VisitSession>> {
        self.visits_where(VisitSession::awaits_consultation_invoice)
    }

    fn visits_where(&self, filter: impl Fn(&VisitSession) -> bool) -> ServiceResult<Vec<VisitSession>> {
        let mut found: Vec<VisitSession> = self.view(|t| t.visits.values().filter(|s| filter(s)).cloned().collect())?;
        found.sort_by(|a, b| b.visit_date().cmp(&a.visit_date()).then_with(|| b.id_typed().cmp(&a.id_typed())));
        Ok(found)
    }
}
