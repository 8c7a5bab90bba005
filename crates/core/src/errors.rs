use std::fmt;

use thiserror::Error;

use crate::domain::overtime::{OvertimeStatus, RequestId};
use crate::domain::user::UserRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkflowAction {
    Approve,
    Reject,
    Cancel,
}

impl WorkflowAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business-rule violations raised by the aggregate and value objects.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot {action} a request in status {status}")]
    InvalidState { status: OvertimeStatus, action: WorkflowAction },
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OvertimeStatus, to: OvertimeStatus },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("role {role} cannot act as an approver")]
    InvalidApprover { role: UserRole },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("missing organizational dependency: {0}")]
    DependencyNotFound(String),
    #[error("request {request_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification { request_id: RequestId, expected_version: u64 },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Flat classification a caller can branch on without matching nested variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DependencyNotFound,
    InvalidArgument,
    InvalidState,
    Unauthorized,
    InvalidApprover,
    ConcurrentModification,
    Infrastructure,
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::InvalidArgument(_)) => ErrorKind::InvalidArgument,
            Self::Domain(DomainError::InvalidState { .. })
            | Self::Domain(DomainError::InvalidTransition { .. }) => ErrorKind::InvalidState,
            Self::Domain(DomainError::Unauthorized(_)) => ErrorKind::Unauthorized,
            Self::Domain(DomainError::InvalidApprover { .. }) => ErrorKind::InvalidApprover,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DependencyNotFound(_) => ErrorKind::DependencyNotFound,
            Self::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Self::Persistence(_) | Self::Integration(_) | Self::Configuration(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

/// Errors reported by a `RequestStore` implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request {request_id} is at a newer version than {expected_version}")]
    ConcurrentModification { request_id: RequestId, expected_version: u64 },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Errors reported by an `OrganizationDirectory` implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("directory backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::ConcurrentModification { request_id, expected_version } => {
                Self::ConcurrentModification { request_id, expected_version }
            }
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

impl From<DirectoryError> for ApplicationError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            DirectoryError::Backend(message) => Self::Integration(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => {
                "The request changed while you were working on it. Reload and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value.kind() {
            ErrorKind::InvalidArgument | ErrorKind::InvalidState | ErrorKind::InvalidApprover => {
                Self::BadRequest { message, correlation_id }
            }
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::Unauthorized => Self::Forbidden { message, correlation_id },
            ErrorKind::ConcurrentModification => Self::Conflict { message, correlation_id },
            ErrorKind::DependencyNotFound => Self::Internal { message, correlation_id },
            ErrorKind::Infrastructure => match value {
                ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
                _ => Self::ServiceUnavailable { message, correlation_id },
            },
        }
    }
}
