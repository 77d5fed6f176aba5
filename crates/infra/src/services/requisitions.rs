//! Requisition workflow: draft, submit, approve with transfer, reject.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use clinicflow_core::{
    Aggregate, ConsumableItemId, DomainError, Quantity, RequisitionId, RequisitionItemId,
    TheaterStoreId, UserId,
};
use clinicflow_events::EventBus;
use clinicflow_inventory::TheaterStoreTransfer;
use clinicflow_requisitions::{
    ApproveRequisition, CreateRequisition, PricedLine, RejectRequisition, RequisitionCommand,
    RequisitionDetails, RequisitionEvent, RequisitionStatus, SubmitRequisition,
    TheaterRequisition, UpdateRequisition, requisition_number,
};

use super::{ClinicEnvelope, ClinicServices, transfer};
use crate::error::ServiceResult;
use crate::store::Transaction;

/// A requested consumable, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionLine {
    pub consumable_item_id: ConsumableItemId,
    pub quantity: Quantity,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Price lines against current general-store stock.
fn price_lines(tx: &mut Transaction<'_>, lines: &[RequisitionLine]) -> ServiceResult<Vec<PricedLine>> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let item = tx
            .consumables()
            .get(&line.consumable_item_id)?
            .ok_or_else(|| DomainError::not_found(format!("consumable item {}", line.consumable_item_id)))?;
        if !item.is_active() {
            return Err(DomainError::validation(format!("consumable item {} is not active", item.name())).into());
        }
        priced.push(PricedLine {
            item_id: RequisitionItemId::new(),
            consumable_item_id: item.id_typed(),
            item_name: item.name().to_string(),
            quantity_requested: line.quantity,
            unit_cost: item.cost_per_unit(),
            available: item.current_stock(),
            notes: line.notes.clone(),
        });
    }
    Ok(priced)
}

fn load(tx: &mut Transaction<'_>, id: RequisitionId) -> ServiceResult<TheaterRequisition> {
    tx.requisitions()
        .get(&id)?
        .ok_or_else(|| DomainError::not_found(format!("requisition {id}")).into())
}

fn save(
    tx: &mut Transaction<'_>,
    requisition: &TheaterRequisition,
    events: Vec<RequisitionEvent>,
) -> ServiceResult<()> {
    tx.requisitions().put(requisition.id_typed(), requisition.clone())?;
    for event in events {
        tx.record(requisition.id_typed(), event);
    }
    Ok(())
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    pub fn create_requisition(
        &self,
        actor: UserId,
        details: RequisitionDetails,
        lines: Vec<RequisitionLine>,
    ) -> ServiceResult<TheaterRequisition> {
        let now = self.now();
        let requisition = self.execute(Some(actor), |tx| {
            let priced = price_lines(tx, &lines)?;
            let year = now.year();
            let sequence = tx.requisition_counters().get(&year)?.unwrap_or(0) + 1;
            tx.requisition_counters().put(year, sequence)?;

            let id = RequisitionId::new();
            let mut requisition = TheaterRequisition::empty(id);
            let events = requisition.execute(&RequisitionCommand::Create(CreateRequisition {
                requisition_id: id,
                number: requisition_number(year, sequence),
                requested_by: actor,
                details: details.clone(),
                lines: priced,
                occurred_at: now,
            }))?;
            save(tx, &requisition, events)?;
            Ok(requisition)
        })?;
        info!(requisition = requisition.number(), lines = requisition.items().len(), "requisition created");
        Ok(requisition)
    }

    /// Replace the details and lines of a draft requisition.
    pub fn update_requisition(
        &self,
        id: RequisitionId,
        actor: UserId,
        details: RequisitionDetails,
        lines: Vec<RequisitionLine>,
    ) -> ServiceResult<TheaterRequisition> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut requisition = load(tx, id)?;
            let priced = price_lines(tx, &lines)?;
            let events = requisition.execute(&RequisitionCommand::Update(UpdateRequisition {
                requisition_id: id,
                actor,
                details: details.clone(),
                lines: priced,
                occurred_at: now,
            }))?;
            save(tx, &requisition, events)?;
            Ok(requisition)
        })
    }

    #[instrument(skip_all, fields(requisition_id = %id, actor = %actor), err)]
    pub fn submit_requisition(&self, id: RequisitionId, actor: UserId) -> ServiceResult<TheaterRequisition> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let mut requisition = load(tx, id)?;
            let events = requisition.execute(&RequisitionCommand::Submit(SubmitRequisition {
                requisition_id: id,
                actor,
                occurred_at: now,
            }))?;
            save(tx, &requisition, events)?;
            Ok(requisition)
        })
    }

    /// Approve a submitted requisition and move the approved stock in the same
    /// transaction. Lines missing from `approvals` are approved as requested.
    #[instrument(skip_all, fields(requisition_id = %id, approver = %approver), err)]
    pub fn approve_requisition(
        &self,
        id: RequisitionId,
        approver: UserId,
        approvals: Vec<(RequisitionItemId, Quantity)>,
        target_store: Option<TheaterStoreId>,
    ) -> ServiceResult<(TheaterRequisition, TheaterStoreTransfer)> {
        let now = self.now();
        let (requisition, transfer) = self.execute(Some(approver), |tx| {
            let mut requisition = load(tx, id)?;
            let events = requisition.execute(&RequisitionCommand::Approve(ApproveRequisition {
                requisition_id: id,
                approver,
                approved: approvals.clone(),
                occurred_at: now,
            }))?;
            let transfer =
                transfer::transfer_requisition(tx, &requisition, target_store, approver, &self.config, now)?;
            save(tx, &requisition, events)?;
            Ok((requisition, transfer))
        })?;
        info!(
            requisition = requisition.number(),
            transfer_id = %transfer.id_typed(),
            to_store = %transfer.to_store_id(),
            "requisition approved and stock transferred"
        );
        Ok((requisition, transfer))
    }

    #[instrument(skip_all, fields(requisition_id = %id, actor = %actor), err)]
    pub fn reject_requisition(
        &self,
        id: RequisitionId,
        actor: UserId,
        reason: impl Into<String>,
    ) -> ServiceResult<TheaterRequisition> {
        let now = self.now();
        let reason = reason.into();
        self.execute(Some(actor), |tx| {
            let mut requisition = load(tx, id)?;
            let events = requisition.execute(&RequisitionCommand::Reject(RejectRequisition {
                requisition_id: id,
                actor,
                reason: reason.clone(),
                occurred_at: now,
            }))?;
            save(tx, &requisition, events)?;
            Ok(requisition)
        })
    }

    /// Owners may delete requisitions that have not moved stock.
    pub fn delete_requisition(&self, id: RequisitionId, actor: UserId) -> ServiceResult<()> {
        self.execute(Some(actor), |tx| {
            let requisition = load(tx, id)?;
            requisition.ensure_deletable_by(actor)?;
            tx.requisitions().delete(&id)?;
            Ok(())
        })?;
        info!(requisition_id = %id, "requisition deleted");
        Ok(())
    }

    pub fn requisition(&self, id: RequisitionId) -> ServiceResult<TheaterRequisition> {
        self.view(|t| t.requisitions.get(&id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("requisition {id}")).into())
    }

    /// Requisitions raised by `user`, newest first.
    pub fn requisitions_by_requester(&self, user: UserId) -> ServiceResult<Vec<TheaterRequisition>> {
        self.requisitions_where(|r| r.requested_by() == Some(user))
    }

    pub fn requisitions_by_status(&self, status: RequisitionStatus) -> ServiceResult<Vec<TheaterRequisition>> {
        self.requisitions_where(|r| r.status() == status)
    }

    fn requisitions_where(
        &self,
        filter: impl Fn(&TheaterRequisition) -> bool,
    ) -> ServiceResult<Vec<TheaterRequisition>> {
        let mut found: Vec<TheaterRequisition> =
            self.view(|t| t.requisitions.values().filter(|r| filter(r)).cloned().collect())?;
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.number().cmp(a.number())));
        Ok(found)
    }
}
