pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use approvals::{ApprovalRoutingResolver, RoutingInput};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use domain::organization::{
    DepartmentId, DepartmentRef, FacilityId, FacilityRef, OrganizationSnapshot, UserRef,
};
pub use domain::overtime::{
    ApprovalAction, ApprovalRecord, OvertimeRequest, OvertimeStatus, RequestId, RoutingPlan,
};
pub use domain::search::{Page, RequestSearchCriteria};
pub use domain::user::{ApprovalStage, UserId, UserRole, UserSummary};
pub use errors::{
    ApplicationError, DirectoryError, DomainError, ErrorKind, InterfaceError, StoreError,
};
pub use ports::{OrganizationDirectory, RequestStore};
pub use workflow::{
    Actor, NewOvertimeRequest, OvertimeEditInput, OvertimeWorkflowService, WorkflowSettings,
};
