use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::organization::{DepartmentId, FacilityId, UserRef};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Worker,
    Supervisor,
    Manager,
    Customer,
    SystemAdmin,
}

/// A gate in the approval chain. Each stage is owned by exactly one role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStage {
    Supervisor,
    Manager,
    Customer,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "WORKER",
            Self::Supervisor => "SUPERVISOR",
            Self::Manager => "MANAGER",
            Self::Customer => "CUSTOMER",
            Self::SystemAdmin => "SYSTEM_ADMIN",
        }
    }

    /// The stage this role signs off, if it takes part in approvals at all.
    pub fn approval_stage(self) -> Option<ApprovalStage> {
        match self {
            Self::Supervisor => Some(ApprovalStage::Supervisor),
            Self::Manager => Some(ApprovalStage::Manager),
            Self::Customer => Some(ApprovalStage::Customer),
            Self::Worker | Self::SystemAdmin => None,
        }
    }
}

impl ApprovalStage {
    pub fn role(self) -> UserRole {
        match self {
            Self::Supervisor => UserRole::Supervisor,
            Self::Manager => UserRole::Manager,
            Self::Customer => UserRole::Customer,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role().as_str())
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WORKER" => Ok(Self::Worker),
            "SUPERVISOR" => Ok(Self::Supervisor),
            "MANAGER" => Ok(Self::Manager),
            "CUSTOMER" => Ok(Self::Customer),
            "SYSTEM_ADMIN" => Ok(Self::SystemAdmin),
            other => Err(DomainError::InvalidArgument(format!("unknown user role `{other}`"))),
        }
    }
}

/// Directory view of a user, as far as the approval workflow cares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub department_id: Option<DepartmentId>,
    pub facility_id: Option<FacilityId>,
    pub has_approval_authority: bool,
    pub requires_approval: bool,
}

impl UserSummary {
    /// Supervisors without this authority need a facility manager to co-sign.
    pub fn can_approve_requests(&self) -> bool {
        self.has_approval_authority
    }

    /// Customers with this flag must sign off requests filed against them.
    pub fn requires_request_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn to_ref(&self) -> UserRef {
        UserRef::new(self.id.clone(), self.name.clone())
    }
}
