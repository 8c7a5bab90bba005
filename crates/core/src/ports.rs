use async_trait::async_trait;

use crate::domain::organization::{DepartmentId, FacilityId, OrganizationSnapshot};
use crate::domain::overtime::{OvertimeRequest, OvertimeStatus, RequestId};
use crate::domain::search::{Page, RequestSearchCriteria};
use crate::domain::user::{UserId, UserSummary};
use crate::errors::{DirectoryError, StoreError};

/// Read-only view of the organization hierarchy.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<UserSummary>, DirectoryError>;

    /// Facility, supervisor and facility manager for a department.
    async fn get_department_hierarchy(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError>;

    /// Where a user sits: their facility and, for department members, the
    /// department and its supervisor.
    async fn get_user_organization_info(
        &self,
        user_id: &UserId,
    ) -> Result<OrganizationSnapshot, DirectoryError>;
}

/// Persistence for overtime requests.
///
/// `save` is a compare-and-swap on the request's version: a request carrying
/// version `n` only replaces a stored copy that is still at `n`. The returned
/// copy carries the assigned id and the new version.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn save(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<OvertimeRequest>, StoreError>;

    async fn find_by_worker_id(
        &self,
        worker_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError>;

    async fn find_by_department_id(
        &self,
        department_id: &DepartmentId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError>;

    async fn find_by_facility_id(
        &self,
        facility_id: &FacilityId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError>;

    async fn find_by_customer_id(
        &self,
        customer_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError>;

    async fn find_by_status(
        &self,
        status: OvertimeStatus,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError>;
}
