//! Lightweight collaborator fakes for unit tests inside this crate.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::organization::{
    DepartmentId, DepartmentRef, FacilityId, FacilityRef, OrganizationSnapshot, UserRef,
};
use crate::domain::overtime::{OvertimeRequest, OvertimeStatus, RequestId};
use crate::domain::search::{Page, RequestSearchCriteria};
use crate::domain::user::{UserId, UserRole, UserSummary};
use crate::errors::{DirectoryError, StoreError};
use crate::ports::{OrganizationDirectory, RequestStore};

pub const DEPARTMENT: &str = "d-1";
pub const FACILITY: &str = "f-1";

#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<UserId, UserSummary>,
    departments: HashMap<DepartmentId, OrganizationSnapshot>,
}

impl StaticDirectory {
    pub fn with_user(mut self, id: &str, role: UserRole, authority: bool, requires: bool) -> Self {
        self.users.insert(
            UserId::new(id),
            UserSummary {
                id: UserId::new(id),
                name: format!("{id} name"),
                role,
                department_id: Some(DepartmentId(DEPARTMENT.to_owned())),
                facility_id: Some(FacilityId(FACILITY.to_owned())),
                has_approval_authority: authority,
                requires_approval: requires,
            },
        );
        self
    }

    pub fn with_department(mut self, supervisor: Option<&str>, manager: Option<&str>) -> Self {
        self.departments.insert(
            DepartmentId(DEPARTMENT.to_owned()),
            OrganizationSnapshot {
                facility: FacilityRef::new(FacilityId(FACILITY.to_owned()), "Plant"),
                department: Some(DepartmentRef::new(
                    DepartmentId(DEPARTMENT.to_owned()),
                    "Assembly",
                )),
                supervisor: supervisor.map(named),
                manager: manager.map(named),
            },
        );
        self
    }

    /// Worker `w-1`, supervisor `s-1`, manager `m-1`, strict customer `c-1`,
    /// lenient customer `c-2`, all in department `d-1`.
    pub fn standard(supervisor_authority: bool) -> Self {
        Self::default()
            .with_user("w-1", UserRole::Worker, false, false)
            .with_user("s-1", UserRole::Supervisor, supervisor_authority, false)
            .with_user("m-1", UserRole::Manager, true, false)
            .with_user("m-2", UserRole::Manager, true, false)
            .with_user("c-1", UserRole::Customer, false, true)
            .with_user("c-2", UserRole::Customer, false, false)
            .with_department(Some("s-1"), Some("m-1"))
    }
}

#[async_trait]
impl OrganizationDirectory for StaticDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<UserSummary>, DirectoryError> {
        Ok(self.users.get(id).cloned())
    }

    async fn get_department_hierarchy(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        self.departments.get(department_id).cloned().ok_or_else(|| DirectoryError::NotFound {
            entity: "department",
            id: department_id.to_string(),
        })
    }

    async fn get_user_organization_info(
        &self,
        user_id: &UserId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let department_id = self
            .users
            .get(user_id)
            .and_then(|user| user.department_id.clone())
            .ok_or_else(|| DirectoryError::NotFound { entity: "user", id: user_id.to_string() })?;
        self.get_department_hierarchy(&department_id).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<HashMap<RequestId, OvertimeRequest>>,
}

impl MemoryStore {
    async fn query<F>(&self, criteria: &RequestSearchCriteria, key: F) -> Page<OvertimeRequest>
    where
        F: Fn(&OvertimeRequest) -> bool,
    {
        let requests = self.requests.read().await;
        let mut matched: Vec<OvertimeRequest> = requests
            .values()
            .filter(|request| key(request) && criteria.admits(request))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id().cmp(b.id()));
        criteria.paginate(matched)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn save(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let mut requests = self.requests.write().await;
        let id = if request.id().is_assigned() {
            let stored = requests.get(request.id()).map(OvertimeRequest::version);
            if stored != Some(request.version()) {
                return Err(StoreError::ConcurrentModification {
                    request_id: request.id().clone(),
                    expected_version: request.version(),
                });
            }
            request.id().clone()
        } else {
            RequestId::new(format!("OT-{:06}", requests.len() + 1))
        };

        let saved = request.clone().with_id(id.clone()).with_version(request.version() + 1);
        requests.insert(id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<OvertimeRequest>, StoreError> {
        Ok(self.requests.read().await.get(id).cloned())
    }

    async fn find_by_worker_id(
        &self,
        worker_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query(criteria, |request| request.worker().id == *worker_id).await)
    }

    async fn find_by_department_id(
        &self,
        department_id: &DepartmentId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query(criteria, |request| request.department().id == *department_id).await)
    }

    async fn find_by_facility_id(
        &self,
        facility_id: &FacilityId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query(criteria, |request| request.facility().id == *facility_id).await)
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self
            .query(criteria, |request| {
                request.customer().is_some_and(|customer| customer.id == *customer_id)
            })
            .await)
    }

    async fn find_by_status(
        &self,
        status: OvertimeStatus,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query(criteria, |request| request.status() == status).await)
    }
}

fn named(id: &str) -> UserRef {
    UserRef::new(UserId::new(id), format!("{id} name"))
}
