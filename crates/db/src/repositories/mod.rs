use serde::{Deserialize, Serialize};
use thiserror::Error;

use overtime_core::domain::organization::{DepartmentId, FacilityId};
use overtime_core::domain::user::UserId;
use overtime_core::errors::{DirectoryError, StoreError};

pub mod memory;
pub mod organization;
pub mod overtime;

pub use memory::{InMemoryOrganizationDirectory, InMemoryRequestStore};
pub use organization::SqlOrganizationDirectory;
pub use overtime::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        StoreError::Backend(value.to_string())
    }
}

impl From<RepositoryError> for DirectoryError {
    fn from(value: RepositoryError) -> Self {
        DirectoryError::Backend(value.to_string())
    }
}

/// Stored shape of a facility; users are referenced by id only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub id: FacilityId,
    pub name: String,
    pub manager_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRecord {
    pub id: DepartmentId,
    pub name: String,
    pub facility_id: FacilityId,
    pub supervisor_id: Option<UserId>,
}
