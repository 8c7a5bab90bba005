use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacilityId(pub String);

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An identity paired with the display name captured alongside it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef<I> {
    pub id: I,
    pub name: String,
}

impl<I> NamedRef<I> {
    pub fn new(id: I, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

pub type UserRef = NamedRef<UserId>;
pub type DepartmentRef = NamedRef<DepartmentId>;
pub type FacilityRef = NamedRef<FacilityId>;

/// Point-in-time view of where a user or department sits in the hierarchy.
///
/// Recomputed by the directory on every call; the workflow copies what it
/// needs into the request at creation and never holds on to the snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    pub facility: FacilityRef,
    pub department: Option<DepartmentRef>,
    pub supervisor: Option<UserRef>,
    pub manager: Option<UserRef>,
}
