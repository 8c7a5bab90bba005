use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::{ApprovalRoutingResolver, RoutingInput};
use crate::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink, REQUEST_APPROVED,
    REQUEST_CANCELLED, REQUEST_CREATED, REQUEST_EDITED, REQUEST_REJECTED,
};
use crate::config::WorkflowConfig;
use crate::domain::organization::{DepartmentId, UserRef};
use crate::domain::overtime::{
    validate_schedule, OvertimeEdit, OvertimeRequest, OvertimeRequestDraft, RequestId,
};
use crate::domain::search::{
    Page, RequestSearchCriteria, SearchKey, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::domain::user::{UserId, UserRole, UserSummary};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{OrganizationDirectory, RequestStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Skips the past-start check on create and edit; for backfilling history.
    pub allow_past_start: bool,
    pub default_page_size: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { allow_past_start: false, default_page_size: DEFAULT_PAGE_SIZE }
    }
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            allow_past_start: config.allow_past_start,
            default_page_size: config.default_page_size,
        }
    }
}

/// The authenticated caller, as asserted by the controller layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        Self { id: UserId::new(id), name: name.into(), role }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOvertimeRequest {
    pub worker_id: UserId,
    pub department_id: Option<DepartmentId>,
    pub customer_id: Option<UserId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeEditInput {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub customer_id: Option<UserId>,
}

#[derive(Clone, Copy, Debug)]
enum Operation {
    Create,
    Approve,
    Reject,
    Edit,
    Cancel,
}

impl Operation {
    fn event_name(self) -> &'static str {
        match self {
            Self::Create => "workflow.request.created",
            Self::Approve => "workflow.request.approved",
            Self::Reject => "workflow.request.rejected",
            Self::Edit => "workflow.request.edited",
            Self::Cancel => "workflow.request.cancelled",
        }
    }

    fn audit_type(self) -> &'static str {
        match self {
            Self::Create => REQUEST_CREATED,
            Self::Approve => REQUEST_APPROVED,
            Self::Reject => REQUEST_REJECTED,
            Self::Edit => REQUEST_EDITED,
            Self::Cancel => REQUEST_CANCELLED,
        }
    }

    fn category(self) -> AuditCategory {
        match self {
            Self::Approve | Self::Reject => AuditCategory::Approval,
            Self::Create | Self::Edit | Self::Cancel => AuditCategory::Lifecycle,
        }
    }
}

/// Entry point for every overtime request operation.
///
/// Each call is one read-modify-write against the store; lost updates surface
/// as `ConcurrentModification` from the store's versioned save.
pub struct OvertimeWorkflowService<D, S> {
    directory: Arc<D>,
    store: Arc<S>,
    resolver: ApprovalRoutingResolver<D>,
    audit: Arc<dyn AuditSink>,
    settings: WorkflowSettings,
}

impl<D, S> OvertimeWorkflowService<D, S>
where
    D: OrganizationDirectory,
    S: RequestStore,
{
    pub fn new(directory: Arc<D>, store: Arc<S>, resolver: ApprovalRoutingResolver<D>) -> Self {
        Self {
            directory,
            store,
            resolver,
            audit: Arc::new(NoopAuditSink),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    /// Criteria for the given page using the configured default page size.
    pub fn page_criteria(&self, page: u32) -> Result<RequestSearchCriteria, ApplicationError> {
        let page_size = self.settings.default_page_size;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApplicationError::Configuration(format!(
                "default page size {page_size} is outside 1..={MAX_PAGE_SIZE}"
            )));
        }
        Ok(RequestSearchCriteria::new(page, page_size)?)
    }

    pub async fn create_request(
        &self,
        input: NewOvertimeRequest,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let actor_id = input.worker_id.clone();
        let result = self.create(input).await;
        self.observe(Operation::Create, None, &actor_id, UserRole::Worker, &result);
        result
    }

    pub async fn approve_request(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let result = self.decide(request_id, actor, comment, Operation::Approve).await;
        self.observe(Operation::Approve, Some(request_id), &actor.id, actor.role, &result);
        result
    }

    pub async fn reject_request(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let result = self.decide(request_id, actor, comment, Operation::Reject).await;
        self.observe(Operation::Reject, Some(request_id), &actor.id, actor.role, &result);
        result
    }

    pub async fn edit_request(
        &self,
        request_id: &RequestId,
        input: OvertimeEditInput,
        actor_id: &UserId,
        role: UserRole,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let result = self.edit(request_id, input, actor_id, role).await;
        self.observe(Operation::Edit, Some(request_id), actor_id, role, &result);
        result
    }

    pub async fn cancel_request(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        role: UserRole,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let result = self.cancel(request_id, actor_id, role).await;
        self.observe(Operation::Cancel, Some(request_id), actor_id, role, &result);
        result
    }

    pub async fn find_requests(
        &self,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, ApplicationError> {
        let page = match criteria.search_key()? {
            SearchKey::Worker(id) => self.store.find_by_worker_id(&id, criteria).await?,
            SearchKey::Department(id) => self.store.find_by_department_id(&id, criteria).await?,
            SearchKey::Facility(id) => self.store.find_by_facility_id(&id, criteria).await?,
            SearchKey::Customer(id) => self.store.find_by_customer_id(&id, criteria).await?,
            SearchKey::Status(status) => self.store.find_by_status(status, criteria).await?,
        };
        Ok(page)
    }

    async fn create(&self, input: NewOvertimeRequest) -> Result<OvertimeRequest, ApplicationError> {
        validate_schedule(input.start_time, input.end_time)?;
        self.ensure_not_in_past(input.start_time)?;

        let plan = self
            .resolver
            .resolve(&RoutingInput {
                worker_id: input.worker_id,
                department_id: input.department_id,
                customer_id: input.customer_id,
            })
            .await?;
        let request = OvertimeRequest::new(OvertimeRequestDraft {
            start_time: input.start_time,
            end_time: input.end_time,
            reason: input.reason,
            plan,
        })?;

        Ok(self.store.save(&request).await?)
    }

    async fn decide(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        comment: Option<String>,
        operation: Operation,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let mut request = self.load(request_id).await?;
        let known = self.load_actor(&actor.id).await?;
        self.bind_manager(&mut request, &actor.id, actor.role).await?;

        let name = if actor.name.trim().is_empty() { known.name } else { actor.name.clone() };
        let approver = UserRef::new(actor.id.clone(), name);
        match operation {
            Operation::Reject => request.reject(approver, actor.role, comment)?,
            _ => request.approve(approver, actor.role, comment)?,
        }

        Ok(self.store.save(&request).await?)
    }

    async fn edit(
        &self,
        request_id: &RequestId,
        input: OvertimeEditInput,
        actor_id: &UserId,
        role: UserRole,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let mut request = self.load(request_id).await?;
        self.load_actor(actor_id).await?;
        request.ensure_editable_by(actor_id, role)?;

        if let Some(start_time) = input.start_time {
            self.ensure_not_in_past(start_time)?;
        }
        let customer = match &input.customer_id {
            Some(customer_id) => Some(self.resolver.resolve_customer(customer_id).await?.to_ref()),
            None => None,
        };
        let edit = OvertimeEdit {
            start_time: input.start_time,
            end_time: input.end_time,
            reason: input.reason,
            customer,
        };
        if !edit.has_changes() {
            return Err(DomainError::InvalidArgument("edit carries no changes".to_owned()).into());
        }

        request.edit(edit, actor_id, role)?;
        Ok(self.store.save(&request).await?)
    }

    async fn cancel(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        role: UserRole,
    ) -> Result<OvertimeRequest, ApplicationError> {
        let mut request = self.load(request_id).await?;
        self.load_actor(actor_id).await?;
        self.bind_manager(&mut request, actor_id, role).await?;

        request.cancel(actor_id, role)?;
        Ok(self.store.save(&request).await?)
    }

    /// First phase of a manager action: bind the facility manager when the
    /// request has none on record. The aggregate method runs afterwards.
    async fn bind_manager(
        &self,
        request: &mut OvertimeRequest,
        actor_id: &UserId,
        role: UserRole,
    ) -> Result<(), ApplicationError> {
        if role != UserRole::Manager {
            return Ok(());
        }

        if let Some(manager) = self.resolver.resolve_manager_binding(request, actor_id).await? {
            request.set_manager(manager)?;
            info!(
                event_name = "workflow.manager.bound",
                request_id = %request.id(),
                actor_id = %actor_id,
                "facility manager bound to overtime request"
            );
        }
        Ok(())
    }

    async fn load(&self, request_id: &RequestId) -> Result<OvertimeRequest, ApplicationError> {
        self.store
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("overtime request", request_id))
    }

    async fn load_actor(&self, actor_id: &UserId) -> Result<UserSummary, ApplicationError> {
        self.directory
            .get_user(actor_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", actor_id))
    }

    fn ensure_not_in_past(&self, start_time: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.settings.allow_past_start && start_time < Utc::now() {
            return Err(DomainError::InvalidArgument(
                "start time must not be in the past".to_owned(),
            ));
        }
        Ok(())
    }

    fn observe(
        &self,
        operation: Operation,
        request_id: Option<&RequestId>,
        actor_id: &UserId,
        role: UserRole,
        result: &Result<OvertimeRequest, ApplicationError>,
    ) {
        match result {
            Ok(request) => {
                info!(
                    event_name = operation.event_name(),
                    request_id = %request.id(),
                    actor_id = %actor_id,
                    role = %role,
                    status = %request.status(),
                    "overtime request updated"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(request.id().clone()),
                        operation.audit_type(),
                        operation.category(),
                        actor_id.clone(),
                        role,
                        AuditOutcome::Success,
                    )
                    .with_metadata("status", request.status().as_str())
                    .with_metadata("version", request.version().to_string()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = operation.event_name(),
                    request_id = request_id.map(|id| id.as_str()).unwrap_or_default(),
                    actor_id = %actor_id,
                    role = %role,
                    error = %error,
                    "overtime request operation rejected"
                );
                self.audit.emit(
                    AuditEvent::new(
                        request_id.cloned(),
                        operation.audit_type(),
                        operation.category(),
                        actor_id.clone(),
                        role,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string())
                    .with_metadata("error_kind", format!("{:?}", error.kind())),
                );
            }
        }
    }
}
