use core::str::FromStr;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    Aggregate, AggregateRoot, ConsumableItemId, DepartmentId, DomainError, DomainResult, Money,
    PatientProcedureId, Quantity, RequisitionId, RequisitionItemId, UserId,
};
use clinicflow_events::Event;

/// Requisition lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl FromStr for RequisitionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(RequisitionStatus::Draft),
            "SUBMITTED" => Ok(RequisitionStatus::Submitted),
            "APPROVED" => Ok(RequisitionStatus::Approved),
            "REJECTED" => Ok(RequisitionStatus::Rejected),
            other => Err(DomainError::validation(format!("unknown requisition status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Header fields editable while the requisition is a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionDetails {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub required_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub patient_procedure_id: Option<PatientProcedureId>,
}

/// A requested line, priced and checked against the general store at the time
/// the command is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub item_id: RequisitionItemId,
    pub consumable_item_id: ConsumableItemId,
    pub item_name: String,
    pub quantity_requested: Quantity,
    /// Snapshot of the consumable's cost per unit.
    pub unit_cost: Money,
    /// General-store stock observed when the line was priced.
    pub available: Quantity,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: RequisitionItemId,
    pub consumable_item_id: ConsumableItemId,
    pub item_name: String,
    pub quantity_requested: Quantity,
    pub quantity_approved: Option<Quantity>,
    pub unit_cost: Money,
    pub total_cost: Money,
    pub notes: Option<String>,
}

/// Aggregate root: TheaterRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterRequisition {
    id: RequisitionId,
    number: String,
    details: RequisitionDetails,
    status: RequisitionStatus,
    items: Vec<RequisitionItem>,
    requested_by: Option<UserId>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl TheaterRequisition {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: RequisitionId) -> Self {
        Self {
            id,
            number: String::new(),
            details: RequisitionDetails {
                title: String::new(),
                description: None,
                department_id: None,
                priority: Priority::default(),
                required_date: None,
                notes: None,
                patient_procedure_id: None,
            },
            status: RequisitionStatus::Draft,
            items: Vec::new(),
            requested_by: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RequisitionId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn details(&self) -> &RequisitionDetails {
        &self.details
    }

    pub fn status(&self) -> RequisitionStatus {
        self.status
    }

    pub fn items(&self) -> &[RequisitionItem] {
        &self.items
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Sum of line totals.
    pub fn total_cost(&self) -> DomainResult<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.total_cost))
    }

    /// Lines with an approved quantity greater than zero.
    pub fn approved_lines(&self) -> impl Iterator<Item = (&RequisitionItem, Quantity)> {
        self.items.iter().filter_map(|item| match item.quantity_approved {
            Some(q) if !q.is_zero() => Some((item, q)),
            _ => None,
        })
    }

    /// Owners may delete their requisition until it has triggered a transfer.
    pub fn ensure_deletable_by(&self, actor: UserId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("requisition {}", self.id)));
        }
        self.ensure_owner(actor, "delete")?;
        if self.status == RequisitionStatus::Approved {
            return Err(DomainError::conflict(
                "approved requisitions have already moved stock and cannot be deleted",
            ));
        }
        Ok(())
    }
}

impl AggregateRoot for TheaterRequisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequisition {
    pub requisition_id: RequisitionId,
    pub number: String,
    pub requested_by: UserId,
    pub details: RequisitionDetails,
    pub lines: Vec<PricedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRequisition (replaces header and lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequisition {
    pub requisition_id: RequisitionId,
    pub actor: UserId,
    pub details: RequisitionDetails,
    pub lines: Vec<PricedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequisition {
    pub requisition_id: RequisitionId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequisition.
///
/// Lines missing from `approved` are approved at their requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequisition {
    pub requisition_id: RequisitionId,
    pub approver: UserId,
    pub approved: Vec<(RequisitionItemId, Quantity)>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequisition {
    pub requisition_id: RequisitionId,
    pub actor: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisitionCommand {
    Create(CreateRequisition),
    Update(UpdateRequisition),
    Submit(SubmitRequisition),
    Approve(ApproveRequisition),
    Reject(RejectRequisition),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequisitionEvent {
    Created {
        requisition_id: RequisitionId,
        number: String,
        requested_by: UserId,
        details: RequisitionDetails,
        items: Vec<RequisitionItem>,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        requisition_id: RequisitionId,
        details: RequisitionDetails,
        items: Vec<RequisitionItem>,
        occurred_at: DateTime<Utc>,
    },
    Submitted {
        requisition_id: RequisitionId,
        occurred_at: DateTime<Utc>,
    },
    Approved {
        requisition_id: RequisitionId,
        approved_by: UserId,
        approved: Vec<(RequisitionItemId, Quantity)>,
        occurred_at: DateTime<Utc>,
    },
    Rejected {
        requisition_id: RequisitionId,
        rejected_by: UserId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for RequisitionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::Created { .. } => "requisition.created",
            RequisitionEvent::Updated { .. } => "requisition.updated",
            RequisitionEvent::Submitted { .. } => "requisition.submitted",
            RequisitionEvent::Approved { .. } => "requisition.approved",
            RequisitionEvent::Rejected { .. } => "requisition.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequisitionEvent::Created { occurred_at, .. }
            | RequisitionEvent::Updated { occurred_at, .. }
            | RequisitionEvent::Submitted { occurred_at, .. }
            | RequisitionEvent::Approved { occurred_at, .. }
            | RequisitionEvent::Rejected { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for TheaterRequisition {
    type Command = RequisitionCommand;
    type Event = RequisitionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequisitionEvent::Created {
                requisition_id,
                number,
                requested_by,
                details,
                items,
                occurred_at,
            } => {
                self.id = *requisition_id;
                self.number = number.clone();
                self.requested_by = Some(*requested_by);
                self.details = details.clone();
                self.items = items.clone();
                self.status = RequisitionStatus::Draft;
                self.created_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
                self.created = true;
            }
            RequisitionEvent::Updated {
                details,
                items,
                occurred_at,
                ..
            } => {
                self.details = details.clone();
                self.items = items.clone();
                self.updated_at = Some(*occurred_at);
            }
            RequisitionEvent::Submitted { occurred_at, .. } => {
                self.status = RequisitionStatus::Submitted;
                self.updated_at = Some(*occurred_at);
            }
            RequisitionEvent::Approved {
                approved_by,
                approved,
                occurred_at,
                ..
            } => {
                for (item_id, qty) in approved {
                    if let Some(item) = self.items.iter_mut().find(|i| i.id == *item_id) {
                        item.quantity_approved = Some(*qty);
                    }
                }
                self.status = RequisitionStatus::Approved;
                self.approved_by = Some(*approved_by);
                self.approved_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
            }
            RequisitionEvent::Rejected {
                reason, occurred_at, ..
            } => {
                self.status = RequisitionStatus::Rejected;
                self.rejection_reason = Some(reason.clone());
                self.updated_at = Some(*occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequisitionCommand::Create(cmd) => self.handle_create(cmd),
            RequisitionCommand::Update(cmd) => self.handle_update(cmd),
            RequisitionCommand::Submit(cmd) => self.handle_submit(cmd),
            RequisitionCommand::Approve(cmd) => self.handle_approve(cmd),
            RequisitionCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl TheaterRequisition {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("requisition {}", self.id)));
        }
        Ok(())
    }

    fn ensure_requisition_id(&self, id: RequisitionId) -> Result<(), DomainError> {
        if self.id != id {
            return Err(DomainError::invariant("requisition_id mismatch"));
        }
        Ok(())
    }

    fn ensure_owner(&self, actor: UserId, action: &str) -> Result<(), DomainError> {
        if self.requested_by != Some(actor) {
            return Err(DomainError::unauthorized(format!(
                "You can only {action} your own requisitions"
            )));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: RequisitionStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::conflict(format!(
                "cannot {action} a requisition in status {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("requisition already exists"));
        }
        self.ensure_requisition_id(cmd.requisition_id)?;
        let items = validate_lines(&cmd.details, &cmd.lines)?;

        Ok(vec![RequisitionEvent::Created {
            requisition_id: cmd.requisition_id,
            number: cmd.number.clone(),
            requested_by: cmd.requested_by,
            details: normalized(&cmd.details),
            items,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_update(&self, cmd: &UpdateRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_requisition_id(cmd.requisition_id)?;
        self.ensure_owner(cmd.actor, "update")?;
        self.ensure_status(RequisitionStatus::Draft, "update")?;
        let items = validate_lines(&cmd.details, &cmd.lines)?;

        Ok(vec![RequisitionEvent::Updated {
            requisition_id: cmd.requisition_id,
            details: normalized(&cmd.details),
            items,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_submit(&self, cmd: &SubmitRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_requisition_id(cmd.requisition_id)?;
        self.ensure_owner(cmd.actor, "submit")?;
        self.ensure_status(RequisitionStatus::Draft, "submit")?;

        Ok(vec![RequisitionEvent::Submitted {
            requisition_id: cmd.requisition_id,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_approve(&self, cmd: &ApproveRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_requisition_id(cmd.requisition_id)?;
        self.ensure_status(RequisitionStatus::Submitted, "approve")?;

        let mut seen = HashSet::new();
        for (item_id, _) in &cmd.approved {
            if !self.items.iter().any(|i| i.id == *item_id) {
                return Err(DomainError::validation(format!(
                    "requisition item {item_id} does not belong to requisition {}",
                    self.id
                )));
            }
            if !seen.insert(*item_id) {
                return Err(DomainError::validation(format!(
                    "requisition item {item_id} approved more than once"
                )));
            }
        }

        let approved: Vec<(RequisitionItemId, Quantity)> = self
            .items
            .iter()
            .map(|item| {
                let qty = cmd
                    .approved
                    .iter()
                    .find(|(id, _)| *id == item.id)
                    .map(|(_, q)| *q)
                    .unwrap_or(item.quantity_requested);
                (item.id, qty)
            })
            .collect();

        if approved.iter().all(|(_, q)| q.is_zero()) {
            return Err(DomainError::validation(
                "at least one item must be approved with a quantity greater than zero",
            ));
        }

        Ok(vec![RequisitionEvent::Approved {
            requisition_id: cmd.requisition_id,
            approved_by: cmd.approver,
            approved,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_reject(&self, cmd: &RejectRequisition) -> Result<Vec<RequisitionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_requisition_id(cmd.requisition_id)?;
        self.ensure_status(RequisitionStatus::Submitted, "reject")?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }

        Ok(vec![RequisitionEvent::Rejected {
            requisition_id: cmd.requisition_id,
            rejected_by: cmd.actor,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        }])
    }
}

fn normalized(details: &RequisitionDetails) -> RequisitionDetails {
    RequisitionDetails {
        title: details.title.trim().to_string(),
        ..details.clone()
    }
}

/// Title and line rules shared by create and update.
///
/// Requested quantities must stay strictly below the available general-store
/// stock so a reserve always remains.
fn validate_lines(
    details: &RequisitionDetails,
    lines: &[PricedLine],
) -> Result<Vec<RequisitionItem>, DomainError> {
    if details.title.trim().is_empty() {
        return Err(DomainError::validation("Title is required"));
    }
    if lines.is_empty() {
        return Err(DomainError::validation(
            "At least one item must be added to the requisition",
        ));
    }

    let mut seen = HashSet::new();
    for line in lines {
        if !seen.insert((line.consumable_item_id, line.quantity_requested)) {
            return Err(DomainError::conflict(
                "Duplicate item with same quantity detected. Consider merging instead of adding a duplicate.",
            ));
        }
    }

    lines
        .iter()
        .map(|line| {
            if line.quantity_requested.is_zero() {
                return Err(DomainError::validation(format!(
                    "Requested quantity must be greater than zero for item: {}",
                    line.item_name
                )));
            }
            if line.quantity_requested >= line.available {
                return Err(DomainError::validation(format!(
                    "Requested quantity ({}) must be less than available stock ({}) for item: {}",
                    line.quantity_requested, line.available, line.item_name
                )));
            }
            let total_cost = line.unit_cost.checked_mul_quantity(line.quantity_requested.value())?;
            Ok(RequisitionItem {
                id: line.item_id,
                consumable_item_id: line.consumable_item_id,
                item_name: line.item_name.clone(),
                quantity_requested: line.quantity_requested,
                quantity_approved: None,
                unit_cost: line.unit_cost,
                total_cost,
                notes: line.notes.clone(),
            })
        })
        .collect()
}
