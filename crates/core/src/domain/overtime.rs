use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::{DepartmentRef, FacilityRef, UserRef};
use crate::domain::user::{ApprovalStage, UserId, UserRole};
use crate::errors::{DomainError, WorkflowAction};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Requests carry an empty id until the store saves them for the first time.
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OvertimeStatus {
    PendingSupervisor,
    SupervisorApproved,
    PendingManager,
    PendingCustomer,
    Approved,
    Rejected,
    Cancelled,
}

impl OvertimeStatus {
    pub const ALL: [OvertimeStatus; 7] = [
        Self::PendingSupervisor,
        Self::SupervisorApproved,
        Self::PendingManager,
        Self::PendingCustomer,
        Self::Approved,
        Self::Rejected,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingSupervisor => "PENDING_SUPERVISOR",
            Self::SupervisorApproved => "SUPERVISOR_APPROVED",
            Self::PendingManager => "PENDING_MANAGER",
            Self::PendingCustomer => "PENDING_CUSTOMER",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: OvertimeStatus) -> bool {
        use OvertimeStatus::*;

        matches!(
            (self, next),
            (PendingSupervisor, SupervisorApproved)
                | (SupervisorApproved, PendingManager)
                | (SupervisorApproved, PendingCustomer)
                | (SupervisorApproved, Approved)
                | (PendingManager, PendingManager)
                | (PendingManager, PendingCustomer)
                | (PendingManager, Approved)
                | (PendingCustomer, PendingCustomer)
                | (PendingCustomer, PendingManager)
                | (PendingCustomer, Approved)
                | (
                    PendingSupervisor | SupervisorApproved | PendingManager | PendingCustomer,
                    Rejected | Cancelled
                )
        )
    }

    fn awaiting(stage: Option<ApprovalStage>) -> Self {
        match stage {
            Some(ApprovalStage::Supervisor) => Self::PendingSupervisor,
            Some(ApprovalStage::Manager) => Self::PendingManager,
            Some(ApprovalStage::Customer) => Self::PendingCustomer,
            None => Self::Approved,
        }
    }
}

impl fmt::Display for OvertimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// One approve/reject decision. Append-only; never edited after it is recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver: UserRef,
    pub role: UserRole,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn new(
        approver: UserRef,
        role: UserRole,
        action: ApprovalAction,
        comment: Option<String>,
    ) -> Self {
        Self { approver, role, action, comment, timestamp: Utc::now() }
    }
}

/// Everything the routing resolver decides once, when a request is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub worker: UserRef,
    pub department: DepartmentRef,
    pub facility: FacilityRef,
    pub supervisor: UserRef,
    pub manager: Option<UserRef>,
    pub customer: Option<UserRef>,
    pub requires_manager_approval: bool,
    pub requires_customer_approval: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeRequestDraft {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: String,
    pub plan: RoutingPlan,
}

/// Partial update; only the supplied fields change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeEdit {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub customer: Option<UserRef>,
}

impl OvertimeEdit {
    pub fn has_changes(&self) -> bool {
        self.start_time.is_some()
            || self.end_time.is_some()
            || self.reason.is_some()
            || self.customer.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeRequest {
    id: RequestId,
    version: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    reason: String,
    status: OvertimeStatus,
    worker: UserRef,
    department: DepartmentRef,
    facility: FacilityRef,
    supervisor: UserRef,
    requires_manager_approval: bool,
    requires_customer_approval: bool,
    manager: Option<UserRef>,
    customer: Option<UserRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approval_records: Vec<ApprovalRecord>,
}

impl OvertimeRequest {
    pub fn new(draft: OvertimeRequestDraft) -> Result<Self, DomainError> {
        validate_schedule(draft.start_time, draft.end_time)?;
        validate_reason(&draft.reason)?;

        let now = Utc::now();
        let plan = draft.plan;
        Ok(Self {
            id: RequestId::default(),
            version: 0,
            start_time: draft.start_time,
            end_time: draft.end_time,
            reason: draft.reason,
            status: OvertimeStatus::PendingSupervisor,
            worker: plan.worker,
            department: plan.department,
            facility: plan.facility,
            supervisor: plan.supervisor,
            requires_manager_approval: plan.requires_manager_approval,
            requires_customer_approval: plan.requires_customer_approval,
            manager: plan.manager,
            customer: plan.customer,
            created_at: now,
            updated_at: now,
            approval_records: Vec::new(),
        })
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Store version observed when this copy was loaded; 0 before the first save.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn status(&self) -> OvertimeStatus {
        self.status
    }

    pub fn worker(&self) -> &UserRef {
        &self.worker
    }

    pub fn department(&self) -> &DepartmentRef {
        &self.department
    }

    pub fn facility(&self) -> &FacilityRef {
        &self.facility
    }

    pub fn supervisor(&self) -> &UserRef {
        &self.supervisor
    }

    pub fn manager(&self) -> Option<&UserRef> {
        self.manager.as_ref()
    }

    pub fn customer(&self) -> Option<&UserRef> {
        self.customer.as_ref()
    }

    pub fn requires_manager_approval(&self) -> bool {
        self.requires_manager_approval
    }

    pub fn requires_customer_approval(&self) -> bool {
        self.requires_customer_approval
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn approval_records(&self) -> &[ApprovalRecord] {
        &self.approval_records
    }

    /// Store hook: stamp the identity assigned on first save.
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Store hook: record the version the persisted copy now carries.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Binds the facility manager the first time a manager acts on the request.
    pub fn set_manager(&mut self, manager: UserRef) -> Result<(), DomainError> {
        if let Some(existing) = &self.manager {
            if existing.id != manager.id {
                return Err(DomainError::Unauthorized(format!(
                    "request {} is already bound to manager {}",
                    self.id, existing.id
                )));
            }
        }

        self.manager = Some(manager);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn approve(
        &mut self,
        approver: UserRef,
        role: UserRole,
        comment: Option<String>,
    ) -> Result<(), DomainError> {
        let stage = self.validate_approver(&approver.id, role)?;
        let record = ApprovalRecord::new(approver, role, ApprovalAction::Approve, comment);

        match stage {
            ApprovalStage::Supervisor => {
                if self.status != OvertimeStatus::PendingSupervisor {
                    return Err(self.invalid_state(WorkflowAction::Approve));
                }
                self.transition(OvertimeStatus::SupervisorApproved, Some(record))?;
                let next = OvertimeStatus::awaiting(self.outstanding_stage(None));
                self.transition(next, None)
            }
            ApprovalStage::Manager | ApprovalStage::Customer => {
                let awaiting_later_stage = matches!(
                    self.status,
                    OvertimeStatus::SupervisorApproved
                        | OvertimeStatus::PendingManager
                        | OvertimeStatus::PendingCustomer
                );
                if !awaiting_later_stage
                    || !self.stage_required(stage)
                    || self.stage_satisfied(stage)
                {
                    return Err(self.invalid_state(WorkflowAction::Approve));
                }
                let next = OvertimeStatus::awaiting(self.outstanding_stage(Some(stage)));
                self.transition(next, Some(record))
            }
        }
    }

    pub fn reject(
        &mut self,
        approver: UserRef,
        role: UserRole,
        comment: Option<String>,
    ) -> Result<(), DomainError> {
        self.validate_approver(&approver.id, role)?;
        if self.status.is_terminal() {
            return Err(self.invalid_state(WorkflowAction::Reject));
        }

        let record = ApprovalRecord::new(approver, role, ApprovalAction::Reject, comment);
        self.transition(OvertimeStatus::Rejected, Some(record))
    }

    pub fn cancel(&mut self, actor_id: &UserId, role: UserRole) -> Result<(), DomainError> {
        if !self.can_be_cancelled_by(actor_id, role) {
            return Err(DomainError::Unauthorized(format!(
                "{role} {actor_id} may not cancel request {}",
                self.id
            )));
        }
        if self.status.is_terminal() {
            return Err(self.invalid_state(WorkflowAction::Cancel));
        }

        self.transition(OvertimeStatus::Cancelled, None)
    }

    /// Applies a partial edit atomically: on any violation nothing changes.
    pub fn edit(
        &mut self,
        edit: OvertimeEdit,
        editor_id: &UserId,
        role: UserRole,
    ) -> Result<(), DomainError> {
        self.ensure_editable_by(editor_id, role)?;

        let start_time = edit.start_time.unwrap_or(self.start_time);
        let end_time = edit.end_time.unwrap_or(self.end_time);
        validate_schedule(start_time, end_time)?;
        if let Some(reason) = &edit.reason {
            validate_reason(reason)?;
        }

        self.start_time = start_time;
        self.end_time = end_time;
        if let Some(reason) = edit.reason {
            self.reason = reason;
        }
        if let Some(customer) = edit.customer {
            self.customer = Some(customer);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ensure_editable_by(&self, user_id: &UserId, role: UserRole) -> Result<(), DomainError> {
        if !self.can_be_edited_by(user_id, role) {
            return Err(DomainError::Unauthorized(format!(
                "{role} {user_id} may not edit request {} while {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn can_be_edited_by(&self, user_id: &UserId, role: UserRole) -> bool {
        match role {
            UserRole::Worker => {
                *user_id == self.worker.id && self.status == OvertimeStatus::PendingSupervisor
            }
            UserRole::Supervisor => {
                *user_id == self.supervisor.id
                    && matches!(
                        self.status,
                        OvertimeStatus::PendingSupervisor | OvertimeStatus::SupervisorApproved
                    )
            }
            UserRole::Manager | UserRole::Customer | UserRole::SystemAdmin => false,
        }
    }

    pub fn can_be_cancelled_by(&self, user_id: &UserId, role: UserRole) -> bool {
        match role {
            UserRole::Worker => *user_id == self.worker.id,
            UserRole::Supervisor => *user_id == self.supervisor.id,
            UserRole::Manager => {
                self.manager.as_ref().is_some_and(|manager| manager.id == *user_id)
            }
            UserRole::Customer | UserRole::SystemAdmin => false,
        }
    }

    /// The stage that must sign off next, or `None` once nothing is outstanding
    /// or the request has reached a terminal status.
    pub fn next_required_stage(&self) -> Option<ApprovalStage> {
        if self.status.is_terminal() {
            return None;
        }
        self.outstanding_stage(None)
    }

    /// No approval may follow a rejection in the record sequence.
    pub fn approval_flow_is_consistent(&self) -> bool {
        self.approval_records.windows(2).all(|pair| {
            pair[0].action != ApprovalAction::Reject || pair[1].action == ApprovalAction::Reject
        })
    }

    /// Checks the actor against the identity on record for the role's stage.
    pub fn validate_approver(
        &self,
        approver_id: &UserId,
        role: UserRole,
    ) -> Result<ApprovalStage, DomainError> {
        let stage = role.approval_stage().ok_or(DomainError::InvalidApprover { role })?;
        let on_record = match stage {
            ApprovalStage::Supervisor => Some(&self.supervisor),
            ApprovalStage::Manager => self.manager.as_ref(),
            ApprovalStage::Customer => self.customer.as_ref(),
        };

        match on_record {
            Some(assigned) if assigned.id == *approver_id => Ok(stage),
            _ => Err(DomainError::Unauthorized(format!(
                "only the assigned {stage} may act on request {}",
                self.id
            ))),
        }
    }

    fn stage_required(&self, stage: ApprovalStage) -> bool {
        match stage {
            ApprovalStage::Supervisor => true,
            ApprovalStage::Manager => self.requires_manager_approval,
            ApprovalStage::Customer => self.requires_customer_approval,
        }
    }

    fn stage_satisfied(&self, stage: ApprovalStage) -> bool {
        self.approval_records.iter().any(|record| {
            record.action == ApprovalAction::Approve && record.role.approval_stage() == Some(stage)
        })
    }

    // Canonical precedence: supervisor, then manager, then customer.
    fn outstanding_stage(&self, just_satisfied: Option<ApprovalStage>) -> Option<ApprovalStage> {
        [ApprovalStage::Supervisor, ApprovalStage::Manager, ApprovalStage::Customer]
            .into_iter()
            .filter(|stage| Some(*stage) != just_satisfied)
            .find(|stage| self.stage_required(*stage) && !self.stage_satisfied(*stage))
    }

    /// The only path that changes `status`.
    fn transition(
        &mut self,
        next: OvertimeStatus,
        record: Option<ApprovalRecord>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition { from: self.status, to: next });
        }

        if let Some(record) = record {
            self.add_approval_record(record);
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn add_approval_record(&mut self, record: ApprovalRecord) {
        self.approval_records.push(record);
    }

    fn invalid_state(&self, action: WorkflowAction) -> DomainError {
        DomainError::InvalidState { status: self.status, action }
    }
}

pub fn validate_schedule(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<(), DomainError> {
    if start_time >= end_time {
        return Err(DomainError::InvalidArgument(
            "start time must be before end time".to_owned(),
        ));
    }
    Ok(())
}

fn validate_reason(reason: &str) -> Result<(), DomainError> {
    if reason.trim().is_empty() {
        return Err(DomainError::InvalidArgument("reason must not be empty".to_owned()));
    }
    Ok(())
}
