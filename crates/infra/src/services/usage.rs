//! Consumption of stock against a patient procedure.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use clinicflow_core::{
    ConsumableItemId, DomainError, PatientProcedureId, TheaterStoreId, UsageId, UserId,
};
use clinicflow_events::EventBus;
use clinicflow_inventory::{LedgerRef, ProcedureUsage, StockEvent, StoreItemKey, UsageLine};

use super::{ClinicEnvelope, ClinicServices, ledger};
use crate::error::ServiceResult;
use crate::store::Transaction;

/// Pick the ledger row a usage line depletes and debit it.
///
/// A batch names one exact theater row. A store without a batch takes the
/// oldest row of the item holding enough stock. No store means the general
/// store.
fn deplete(
    tx: &mut Transaction<'_>,
    line: &UsageLine,
    at: DateTime<Utc>,
) -> ServiceResult<LedgerRef> {
    let Some(store_id) = line.theater_store_id else {
        ledger::debit_general(tx, line.consumable_item_id, line.quantity, at)?;
        return Ok(LedgerRef::General(line.consumable_item_id));
    };
    if tx.theater_stores().get(&store_id)?.is_none() {
        return Err(DomainError::not_found(format!("theater store {store_id}")).into());
    }

    let row_id = match &line.batch_number {
        Some(batch) => {
            let key = StoreItemKey {
                store_id,
                item_id: line.consumable_item_id,
                batch_number: batch.trim().to_string(),
            };
            tx.theater_item_keys().get(&key)?.ok_or_else(|| {
                DomainError::not_found(format!(
                    "no batch {} of item {} in theater store {store_id}",
                    key.batch_number, line.consumable_item_id
                ))
            })?
        }
        None => {
            let rows = ledger::theater_rows(tx, store_id, line.consumable_item_id)?;
            match rows.iter().find(|row| row.quantity_available() >= line.quantity) {
                Some(row) => row.id_typed(),
                None => {
                    let best = rows.iter().map(|row| row.quantity_available()).max().unwrap_or_default();
                    let name = tx
                        .consumables()
                        .get(&line.consumable_item_id)?
                        .map_or_else(|| line.consumable_item_id.to_string(), |item| item.name().to_string());
                    return Err(DomainError::insufficient_stock(format!(
                        "Insufficient stock in theater store for item: {name}. Available: {best}, Required: {}",
                        line.quantity
                    ))
                    .into());
                }
            }
        }
    };
    ledger::debit_theater_row(tx, row_id, line.quantity, at)?;
    Ok(LedgerRef::Theater(row_id))
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    /// Record consumables used during a procedure, all lines or none.
    #[instrument(skip_all, fields(procedure_id = %procedure_id, actor = %actor, lines = lines.len()), err)]
    pub fn record_usage(
        &self,
        procedure_id: PatientProcedureId,
        actor: UserId,
        lines: Vec<UsageLine>,
    ) -> ServiceResult<Vec<ProcedureUsage>> {
        if lines.is_empty() {
            return Err(DomainError::validation("at least one usage line is required").into());
        }
        let now = self.now();
        let usages = self.execute(Some(actor), |tx| {
            if tx.procedures().get(&procedure_id)?.is_none() {
                return Err(DomainError::not_found(format!("procedure {procedure_id}")).into());
            }
            let mut recorded = Vec::with_capacity(lines.len());
            for line in &lines {
                line.validate()?;
                let depleted = deplete(tx, line, now)?;
                let usage = ProcedureUsage::record(UsageId::new(), procedure_id, line.clone(), depleted, actor, now);
                tx.usages().put(usage.id_typed(), usage.clone())?;
                tx.record(
                    usage.id_typed(),
                    StockEvent::UsageRecorded {
                        usage_id: usage.id_typed(),
                        procedure_id,
                        ledger: depleted,
                        quantity: usage.quantity_used(),
                        occurred_at: now,
                    },
                );
                recorded.push(usage);
            }
            Ok(recorded)
        })?;
        info!(procedure_id = %procedure_id, lines = usages.len(), "procedure usage recorded");
        Ok(usages)
    }

    pub fn usage_by_procedure(&self, procedure_id: PatientProcedureId) -> ServiceResult<Vec<ProcedureUsage>> {
        self.usage_where(|u| u.procedure_id() == procedure_id)
    }

    pub fn usage_by_item(&self, item_id: ConsumableItemId) -> ServiceResult<Vec<ProcedureUsage>> {
        self.usage_where(|u| u.consumable_item_id() == item_id)
    }

    pub fn usage_by_store(&self, store_id: TheaterStoreId) -> ServiceResult<Vec<ProcedureUsage>> {
        self.usage_where(|u| u.theater_store_id() == Some(store_id))
    }

    fn usage_where(&self, filter: impl Fn(&ProcedureUsage) -> bool) -> ServiceResult<Vec<ProcedureUsage>> {
        let mut found: Vec<ProcedureUsage> =
            self.view(|t| t.usages.values().filter(|u| filter(u)).cloned().collect())?;
        found.sort_by_key(|u| (u.used_at(), u.id_typed()));
        Ok(found)
    }
}
