//! Invoice ledger: creation behind the duplicate guard, payments, status
//! changes, deletion with archive, and invoice generators for visit items.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use clinicflow_core::{
    Aggregate, DomainError, InventoryItemId, InvestigationId, InvoiceId, InvoiceItemId, Money,
    PatientId, PatientProcedureId, Percentage, Quantity, TreatmentId, UserId, VisitSessionId,
};
use clinicflow_events::EventBus;
use clinicflow_invoicing::{
    CreateInvoice, DeletedInvoice, Invoice, InvoiceCommand, InvoiceEvent, InvoiceItem,
    InvoicePurpose, InvoiceStatus, ItemType, MarkStockDebited, NewInvestigation, NewInvoiceItem,
    NewProcedure, NewTreatment, OpticsSelection, PatientInvestigation, PatientProcedure,
    PatientTreatment, PaymentMethod, RecordPayment, SetInvoiceStatus, ensure_guard_window_elapsed,
    invoice_number,
};
use clinicflow_visits::{RecordVisitPayment, UnlinkInvoice, VisitCommand};

use super::{ClinicEnvelope, ClinicServices, ledger, visits};
use crate::error::{ServiceError, ServiceResult};
use crate::store::Transaction;

/// Request to create an invoice from explicit lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub patient_id: PatientId,
    #[serde(default)]
    pub visit_session_id: Option<VisitSessionId>,
    /// Derived from the first line when absent.
    #[serde(default)]
    pub purpose: Option<InvoicePurpose>,
    pub items: Vec<NewInvoiceItem>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What a generated invoice bills for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BillingSource {
    Procedures,
    /// Unbilled investigations of the visit, optionally narrowed to `investigation_ids`.
    Investigations {
        #[serde(default)]
        investigation_ids: Option<Vec<InvestigationId>>,
    },
    Treatments,
    Optics { selections: Vec<OpticsSelection> },
}

impl BillingSource {
    pub fn purpose(&self) -> InvoicePurpose {
        match self {
            BillingSource::Procedures => InvoicePurpose::ProceduresInvoiceBill,
            BillingSource::Investigations { .. } => InvoicePurpose::InvestigationInvoiceBill,
            BillingSource::Treatments => InvoicePurpose::TreatmentInvoiceBill,
            BillingSource::Optics { .. } => InvoicePurpose::OpticsInvoiceBill,
        }
    }
}

/// Everything needed to insert an invoice except its identity and number.
pub(crate) struct InvoiceDraft {
    pub purpose: InvoicePurpose,
    pub patient_id: PatientId,
    pub visit_session_id: Option<VisitSessionId>,
    pub created_by: Option<UserId>,
    pub due_date: NaiveDate,
    pub items: Vec<NewInvoiceItem>,
    pub notes: Option<String>,
}

pub(crate) fn load_invoice(tx: &mut Transaction<'_>, id: InvoiceId) -> ServiceResult<Invoice> {
    tx.invoices()
        .get(&id)?
        .ok_or_else(|| DomainError::not_found(format!("invoice {id}")).into())
}

fn save_invoice(tx: &mut Transaction<'_>, invoice: &Invoice, events: Vec<InvoiceEvent>) -> ServiceResult<()> {
    tx.invoices().put(invoice.id_typed(), invoice.clone())?;
    for event in events {
        tx.record(invoice.id_typed(), event);
    }
    Ok(())
}

/// Price, number and insert a new invoice, enforcing the duplicate guard.
pub(crate) fn insert_invoice(
    tx: &mut Transaction<'_>,
    draft: InvoiceDraft,
    guard_window: Duration,
    at: DateTime<Utc>,
) -> ServiceResult<Invoice> {
    let guard_key = (draft.patient_id, draft.purpose);
    let last_created = tx.invoice_guards().get(&guard_key)?;
    ensure_guard_window_elapsed(draft.purpose, last_created, at, guard_window)?;

    let items = draft
        .items
        .into_iter()
        .map(|item| InvoiceItem::price(InvoiceItemId::new(), item))
        .collect::<Result<Vec<_>, _>>()?;

    let day = at.date_naive();
    let sequence = tx.invoice_counters().get(&day)?.unwrap_or(0) + 1;
    tx.invoice_counters().put(day, sequence)?;

    let invoice_id = InvoiceId::new();
    let mut invoice = Invoice::empty(invoice_id);
    let events = invoice.execute(&InvoiceCommand::Create(CreateInvoice {
        invoice_id,
        invoice_number: invoice_number(day, sequence),
        purpose: draft.purpose,
        patient_id: draft.patient_id,
        visit_session_id: draft.visit_session_id,
        created_by: draft.created_by,
        due_date: draft.due_date,
        items,
        notes: draft.notes,
        occurred_at: at,
    }))?;
    tx.invoice_guards().put(guard_key, at)?;
    save_invoice(tx, &invoice, events)?;
    Ok(invoice)
}

/// Side effects of an invoice having become PAID.
///
/// Dispensary lines are debited once, keyed on the persisted flag. A line
/// that cannot be debited is skipped and logged; the payment stands. The
/// linked visit is marked paid when it still waits for its fee.
fn settle_paid(tx: &mut Transaction<'_>, invoice: &mut Invoice, at: DateTime<Utc>) -> ServiceResult<()> {
    if invoice.needs_stock_debit() {
        let lines: Vec<(InventoryItemId, u32)> = invoice
            .items()
            .iter()
            .filter(|item| item.quantity > 0)
            .filter_map(|item| item.inventory_item_id.map(|id| (id, item.quantity)))
            .collect();
        for (item_id, quantity) in lines {
            match ledger::debit_dispensary(tx, item_id, Quantity::from_units(quantity), at) {
                Ok(_) => {}
                Err(ServiceError::Domain(err)) => {
                    warn!(
                        invoice = invoice.invoice_number(),
                        %item_id,
                        error = %err,
                        "skipping stock debit for paid invoice line"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        let events = invoice.execute(&InvoiceCommand::MarkStockDebited(MarkStockDebited {
            invoice_id: invoice.id_typed(),
            occurred_at: at,
        }))?;
        save_invoice(tx, invoice, events)?;
    }

    let Some(session_id) = invoice.visit_session_id() else {
        return Ok(());
    };
    let Some(mut session) = tx.visits().get(&session_id)? else {
        return Ok(());
    };
    if session.invoice_id() != Some(invoice.id_typed()) || session.fee_paid() || session.is_terminal() {
        return Ok(());
    }
    let events = session.execute(&VisitCommand::RecordPayment(RecordVisitPayment {
        session_id,
        method: invoice.payment_method().unwrap_or(PaymentMethod::Cash),
        reference: invoice.payment_reference().map(str::to_string),
        occurred_at: at,
    }))?;
    visits::save_visit(tx, &session, events)
}

/// Move an invoice to PAID unless it already is.
pub(crate) fn mark_invoice_paid(
    tx: &mut Transaction<'_>,
    invoice_id: InvoiceId,
    method: Option<PaymentMethod>,
    reference: Option<String>,
    at: DateTime<Utc>,
) -> ServiceResult<Invoice> {
    let mut invoice = load_invoice(tx, invoice_id)?;
    if invoice.is_paid() {
        return Ok(invoice);
    }
    let events = invoice.execute(&InvoiceCommand::SetStatus(SetInvoiceStatus {
        invoice_id,
        status: InvoiceStatus::Paid,
        method,
        reference,
        occurred_at: at,
    }))?;
    save_invoice(tx, &invoice, events)?;
    settle_paid(tx, &mut invoice, at)?;
    Ok(invoice)
}

/// Fail unless every dispensary line can currently be covered.
fn check_dispensary_lines(tx: &mut Transaction<'_>, items: &mut [NewInvoiceItem]) -> ServiceResult<()> {
    for item in items.iter_mut() {
        let Some(item_id) = item.inventory_item_id else {
            continue;
        };
        let stock = tx
            .inventory_items()
            .get(&item_id)?
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")))?;
        stock.ensure_available(Quantity::from_units(item.quantity))?;
        if item.sku.is_none() {
            item.sku = Some(stock.sku().to_string());
        }
    }
    Ok(())
}

fn visit_patient(tx: &mut Transaction<'_>, visit_id: VisitSessionId) -> ServiceResult<PatientId> {
    let session = visits::load_visit(tx, visit_id)?;
    session
        .patient_id()
        .ok_or_else(|| DomainError::invariant(format!("visit session {visit_id} has no patient")).into())
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    fn default_due_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + Duration::days(self.config.payment_due_days)).date_naive()
    }

    #[instrument(skip_all, fields(patient_id = %input.patient_id, actor = %actor), err)]
    pub fn create_invoice(&self, actor: UserId, input: NewInvoice) -> ServiceResult<Invoice> {
        if input.items.is_empty() {
            return Err(DomainError::validation("invoice must have at least one item").into());
        }
        let now = self.now();
        let purpose = input.purpose.unwrap_or_else(|| {
            let types: Vec<ItemType> = input.items.iter().map(|item| item.item_type).collect();
            InvoicePurpose::from_first_item(&types)
        });
        let invoice = self.execute(Some(actor), |tx| {
            if let Some(visit_id) = input.visit_session_id {
                if visit_patient(tx, visit_id)? != input.patient_id {
                    return Err(DomainError::validation(format!(
                        "visit session {visit_id} belongs to another patient"
                    ))
                    .into());
                }
            }
            let mut items = input.items.clone();
            check_dispensary_lines(tx, &mut items)?;
            insert_invoice(
                tx,
                InvoiceDraft {
                    purpose,
                    patient_id: input.patient_id,
                    visit_session_id: input.visit_session_id,
                    created_by: Some(actor),
                    due_date: input.due_date.unwrap_or_else(|| self.default_due_date(now)),
                    items,
                    notes: input.notes.clone(),
                },
                self.config.invoice_guard_window,
                now,
            )
        })?;
        info!(invoice = invoice.invoice_number(), %purpose, total = %invoice.total_amount(), "invoice created");
        Ok(invoice)
    }

    /// Record an amount against the balance; paying it off marks the invoice PAID.
    #[instrument(skip_all, fields(invoice_id = %invoice_id, amount = %amount), err)]
    pub fn record_invoice_payment(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        amount: Money,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> ServiceResult<Invoice> {
        let now = self.now();
        let invoice = self.execute(Some(actor), |tx| {
            let mut invoice = load_invoice(tx, invoice_id)?;
            let events = invoice.execute(&InvoiceCommand::RecordPayment(RecordPayment {
                invoice_id,
                amount,
                method,
                reference: reference.clone(),
                occurred_at: now,
            }))?;
            let became_paid = events.iter().any(InvoiceEvent::is_paid_transition);
            save_invoice(tx, &invoice, events)?;
            if became_paid {
                settle_paid(tx, &mut invoice, now)?;
            }
            Ok(invoice)
        })?;
        info!(
            invoice = invoice.invoice_number(),
            %amount,
            balance_due = %invoice.balance_due(),
            "invoice payment recorded"
        );
        Ok(invoice)
    }

    /// Set the status directly. PAID settles the full balance.
    #[instrument(skip_all, fields(invoice_id = %invoice_id, ?status), err)]
    pub fn set_invoice_status(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        status: InvoiceStatus,
        method: Option<PaymentMethod>,
        reference: Option<String>,
    ) -> ServiceResult<Invoice> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut invoice = load_invoice(tx, invoice_id)?;
            let events = invoice.execute(&InvoiceCommand::SetStatus(SetInvoiceStatus {
                invoice_id,
                status,
                method,
                reference: reference.clone(),
                occurred_at: now,
            }))?;
            let became_paid = events.iter().any(InvoiceEvent::is_paid_transition);
            save_invoice(tx, &invoice, events)?;
            if became_paid {
                settle_paid(tx, &mut invoice, now)?;
            }
            Ok(invoice)
        })
    }

    /// Archive and remove an invoice, unlinking it from its visit.
    #[instrument(skip_all, fields(invoice_id = %invoice_id, actor = %actor), err)]
    pub fn delete_invoice(&self, invoice_id: InvoiceId, actor: UserId) -> ServiceResult<DeletedInvoice> {
        let now = self.now();
        let archived = self.execute(Some(actor), |tx| {
            let invoice = load_invoice(tx, invoice_id)?;
            let archived = DeletedInvoice::archive(&invoice, actor, now)?;
            tx.deleted_invoices().put(invoice_id, archived.clone())?;
            tx.invoices().delete(&invoice_id)?;

            if let Some(session_id) = invoice.visit_session_id() {
                if let Some(mut session) = tx.visits().get(&session_id)? {
                    let events = session.execute(&VisitCommand::UnlinkInvoice(UnlinkInvoice {
                        session_id,
                        invoice_id,
                        occurred_at: now,
                    }))?;
                    if !events.is_empty() {
                        visits::save_visit(tx, &session, events)?;
                    }
                }
            }
            Ok(archived)
        })?;
        info!(invoice = %archived.invoice_number, "invoice deleted and archived");
        Ok(archived)
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        self.view(|t| t.invoices.get(&invoice_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("invoice {invoice_id}")).into())
    }

    /// Invoices of a patient, newest first.
    pub fn invoices_by_patient(&self, patient_id: PatientId) -> ServiceResult<Vec<Invoice>> {
        self.invoices_where(|invoice| invoice.patient_id() == Some(patient_id))
    }

    pub fn invoices_for_visit(&self, visit_id: VisitSessionId) -> ServiceResult<Vec<Invoice>> {
        self.invoices_where(|invoice| invoice.visit_session_id() == Some(visit_id))
    }

    fn invoices_where(&self, filter: impl Fn(&Invoice) -> bool) -> ServiceResult<Vec<Invoice>> {
        let mut found: Vec<Invoice> = self.view(|t| t.invoices.values().filter(|i| filter(i)).cloned().collect())?;
        found.sort_by(|a, b| {
            b.invoice_date()
                .cmp(&a.invoice_date())
                .then_with(|| b.invoice_number().cmp(a.invoice_number()))
        });
        Ok(found)
    }

    pub fn deleted_invoices(&self) -> ServiceResult<Vec<DeletedInvoice>> {
        let mut found: Vec<DeletedInvoice> = self.view(|t| t.deleted_invoices.values().cloned().collect())?;
        found.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(found)
    }

    pub fn add_procedure(
        &self,
        visit_id: VisitSessionId,
        actor: UserId,
        input: NewProcedure,
    ) -> ServiceResult<PatientProcedure> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let patient_id = visit_patient(tx, visit_id)?;
            let procedure =
                PatientProcedure::register(PatientProcedureId::new(), visit_id, patient_id, input.clone(), now)?;
            tx.procedures().put(procedure.id, procedure.clone())?;
            Ok(procedure)
        })
    }

    pub fn add_investigation(
        &self,
        visit_id: VisitSessionId,
        actor: UserId,
        input: NewInvestigation,
    ) -> ServiceResult<PatientInvestigation> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let patient_id = visit_patient(tx, visit_id)?;
            let investigation =
                PatientInvestigation::register(InvestigationId::new(), visit_id, patient_id, input.clone(), now)?;
            tx.investigations().put(investigation.id, investigation.clone())?;
            Ok(investigation)
        })
    }

    pub fn add_treatment(
        &self,
        visit_id: VisitSessionId,
        actor: UserId,
        input: NewTreatment,
    ) -> ServiceResult<PatientTreatment> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let patient_id = visit_patient(tx, visit_id)?;
            if let Some(item_id) = input.inventory_item_id {
                if tx.inventory_items().get(&item_id)?.is_none() {
                    return Err(DomainError::not_found(format!("inventory item {item_id}")).into());
                }
            }
            let treatment = PatientTreatment::register(TreatmentId::new(), visit_id, patient_id, input.clone(), now)?;
            tx.treatments().put(treatment.id, treatment.clone())?;
            Ok(treatment)
        })
    }

    pub fn procedures_for_visit(&self, visit_id: VisitSessionId) -> ServiceResult<Vec<PatientProcedure>> {
        let mut found: Vec<PatientProcedure> = self.view(|t| {
            t.procedures
                .values()
                .filter(|p| p.visit_session_id == visit_id)
                .cloned()
                .collect()
        })?;
        found.sort_by_key(|p| (p.created_at, p.id));
        Ok(found)
    }

    pub fn investigations_for_visit(&self, visit_id: VisitSessionId) -> ServiceResult<Vec<PatientInvestigation>> {
        let mut found: Vec<PatientInvestigation> = self.view(|t| {
            t.investigations
                .values()
                .filter(|i| i.visit_session_id == visit_id)
                .cloned()
                .collect()
        })?;
        found.sort_by_key(|i| (i.created_at, i.id));
        Ok(found)
    }

    pub fn treatments_for_visit(&self, visit_id: VisitSessionId) -> ServiceResult<Vec<PatientTreatment>> {
        let mut found: Vec<PatientTreatment> = self.view(|t| {
            t.treatments
                .values()
                .filter(|p| p.visit_session_id == visit_id)
                .cloned()
                .collect()
        })?;
        found.sort_by_key(|p| (p.created_at, p.id));
        Ok(found)
    }

    /// Bill the visit's recorded items of one kind as a new invoice.
    #[instrument(skip_all, fields(visit_session_id = %visit_id, source = ?source.purpose()), err)]
    pub fn generate_invoice(
        &self,
        visit_id: VisitSessionId,
        actor: UserId,
        source: BillingSource,
    ) -> ServiceResult<Invoice> {
        let now = self.now();
        let tax = Percentage::new(self.config.generated_invoice_tax)?;
        let purpose = source.purpose();
        let invoice = self.execute(Some(actor), |tx| {
            let patient_id = visit_patient(tx, visit_id)?;
            let mut items = match &source {
                BillingSource::Procedures => procedure_lines(tx, visit_id, tax)?,
                BillingSource::Investigations { investigation_ids } => {
                    investigation_lines(tx, visit_id, investigation_ids.as_deref(), tax, now)?
                }
                BillingSource::Treatments => treatment_lines(tx, visit_id, tax)?,
                BillingSource::Optics { selections } => optics_lines(tx, selections, tax)?,
            };
            check_dispensary_lines(tx, &mut items)?;
            insert_invoice(
                tx,
                InvoiceDraft {
                    purpose,
                    patient_id,
                    visit_session_id: Some(visit_id),
                    created_by: Some(actor),
                    due_date: self.default_due_date(now),
                    items,
                    notes: None,
                },
                self.config.invoice_guard_window,
                now,
            )
        })?;
        info!(
            invoice = invoice.invoice_number(),
            %purpose,
            visit_session_id = %visit_id,
            total = %invoice.total_amount(),
            "invoice generated"
        );
        Ok(invoice)
    }
}

fn procedure_lines(
    tx: &mut Transaction<'_>,
    visit_id: VisitSessionId,
    tax: Percentage,
) -> ServiceResult<Vec<NewInvoiceItem>> {
    let mut procedures = tx.procedures().scan(|_, p| p.visit_session_id == visit_id)?;
    if procedures.is_empty() {
        return Err(DomainError::validation(format!("No procedures found for visit session {visit_id}")).into());
    }
    procedures.sort_by_key(|p| (p.created_at, p.id));
    Ok(procedures.iter().map(|p| p.to_invoice_line(tax)).collect())
}

/// Lines for unbilled investigations; marks them billed in the same transaction.
fn investigation_lines(
    tx: &mut Transaction<'_>,
    visit_id: VisitSessionId,
    only: Option<&[InvestigationId]>,
    tax: Percentage,
    at: DateTime<Utc>,
) -> ServiceResult<Vec<NewInvoiceItem>> {
    let mut investigations = tx.investigations().scan(|_, i| i.visit_session_id == visit_id)?;
    if let Some(ids) = only {
        if let Some(missing) = ids.iter().find(|id| !investigations.iter().any(|i| i.id == **id)) {
            return Err(DomainError::not_found(format!(
                "investigation {missing} for visit session {visit_id}"
            ))
            .into());
        }
        investigations.retain(|i| ids.contains(&i.id));
    }
    investigations.retain(|i| !i.billed);
    if investigations.is_empty() {
        return Err(DomainError::validation(format!(
            "No unbilled investigations found for visit session {visit_id}"
        ))
        .into());
    }
    investigations.sort_by_key(|i| (i.created_at, i.id));

    let mut lines = Vec::with_capacity(investigations.len());
    for mut investigation in investigations {
        lines.push(investigation.to_invoice_line(tax));
        investigation.mark_billed(at)?;
        tx.investigations().put(investigation.id, investigation)?;
    }
    Ok(lines)
}

fn treatment_lines(
    tx: &mut Transaction<'_>,
    visit_id: VisitSessionId,
    tax: Percentage,
) -> ServiceResult<Vec<NewInvoiceItem>> {
    let mut treatments = tx.treatments().scan(|_, t| t.visit_session_id == visit_id)?;
    if treatments.is_empty() {
        return Err(DomainError::validation(format!("No treatments found for visit session {visit_id}")).into());
    }
    treatments.sort_by_key(|t| (t.created_at, t.id));
    Ok(treatments.iter().map(|t| t.to_invoice_line(tax)).collect())
}

fn optics_lines(
    tx: &mut Transaction<'_>,
    selections: &[OpticsSelection],
    tax: Percentage,
) -> ServiceResult<Vec<NewInvoiceItem>> {
    if selections.is_empty() {
        return Err(DomainError::validation("select at least one optics item").into());
    }
    let mut lines = Vec::with_capacity(selections.len());
    for selection in selections {
        if selection.quantity == 0 {
            return Err(DomainError::validation("optics quantity must be greater than zero").into());
        }
        let item = tx
            .inventory_items()
            .get(&selection.inventory_item_id)?
            .ok_or_else(|| DomainError::not_found(format!("inventory item {}", selection.inventory_item_id)))?;
        let mut line = NewInvoiceItem::simple(item.name(), ItemType::Optics, selection.quantity, item.unit_price())
            .with_tax(tax);
        line.item_description = item.description().map(str::to_string);
        line.inventory_item_id = Some(item.id_typed());
        line.sku = Some(item.sku().to_string());
        line.notes = selection.notes.clone();
        lines.push(line);
    }
    Ok(lines)
}
