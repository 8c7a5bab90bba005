use std::collections::HashMap;

use tokio::sync::RwLock;

use overtime_core::domain::organization::{
    DepartmentId, DepartmentRef, FacilityId, FacilityRef, OrganizationSnapshot, UserRef,
};
use overtime_core::domain::overtime::{OvertimeRequest, OvertimeStatus, RequestId};
use overtime_core::domain::search::{Page, RequestSearchCriteria};
use overtime_core::domain::user::{UserId, UserSummary};
use overtime_core::errors::{DirectoryError, StoreError};
use overtime_core::ports::{OrganizationDirectory, RequestStore};

use super::{DepartmentRecord, FacilityRecord};

#[derive(Default)]
struct RequestTable {
    requests: HashMap<RequestId, OvertimeRequest>,
    sequence: u64,
}

/// Versioned request store held in process memory. Ids are sequential
/// (`OT-000001`, `OT-000002`, ...).
#[derive(Default)]
pub struct InMemoryRequestStore {
    table: RwLock<RequestTable>,
}

impl InMemoryRequestStore {
    async fn query<F>(&self, criteria: &RequestSearchCriteria, key: F) -> Page<OvertimeRequest>
    where
        F: Fn(&OvertimeRequest) -> bool + Send,
    {
        let table = self.table.read().await;
        let mut matched: Vec<OvertimeRequest> = table
            .requests
            .values()
            .filter(|request| key(request) && criteria.admits(request))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id()))
        });
        criteria.paginate(matched)
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn save(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let mut table = self.table.write().await;

        let id = if request.id().is_assigned() {
            let stored_version = table.requests.get(request.id()).map(OvertimeRequest::version);
            if stored_version != Some(request.version()) {
                return Err(StoreError::ConcurrentModification {
                    request_id: request.id().clone(),
                    expected_version: request.version(),
                });
            }
            request.id().clone()
        } else {
            table.sequence += 1;
            RequestId::new(format!("OT-{:06}", table.sequence))
        };

        let saved = request.clone().with_id(id.clone()).with_version(request.version() + 1);
        table.requests.insert(id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<OvertimeRequest>, StoreError> {
        let table = self.table.read().await;
        Ok(table.requests.get(id).cloned())
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

#[derive(Default)]
struct OrganizationTables {
    facilities: HashMap<FacilityId, FacilityRecord>,
    departments: HashMap<DepartmentId, DepartmentRecord>,
    users: HashMap<UserId, UserSummary>,
}

impl OrganizationTables {
    fn user_ref(&self, id: &UserId) -> UserRef {
        let name = self.users.get(id).map_or_else(|| id.to_string(), |user| user.name.clone());
        UserRef::new(id.clone(), name)
    }

    fn facility_snapshot(
        &self,
        facility_id: &FacilityId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let facility = self.facilities.get(facility_id).ok_or_else(|| DirectoryError::NotFound {
            entity: "facility",
            id: facility_id.to_string(),
        })?;
        Ok(OrganizationSnapshot {
            facility: FacilityRef::new(facility.id.clone(), facility.name.clone()),
            department: None,
            supervisor: None,
            manager: facility.manager_id.as_ref().map(|id| self.user_ref(id)),
        })
    }

    fn department_snapshot(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let department =
            self.departments.get(department_id).ok_or_else(|| DirectoryError::NotFound {
                entity: "department",
                id: department_id.to_string(),
            })?;
        let mut snapshot = self.facility_snapshot(&department.facility_id)?;
        snapshot.department =
            Some(DepartmentRef::new(department.id.clone(), department.name.clone()));
        snapshot.supervisor = department.supervisor_id.as_ref().map(|id| self.user_ref(id));
        Ok(snapshot)
    }
}

/// Organization directory held in process memory, for tests and demos.
#[derive(Default)]
pub struct InMemoryOrganizationDirectory {
    tables: RwLock<OrganizationTables>,
}

impl InMemoryOrganizationDirectory {
    pub async fn upsert_facility(&self, facility: FacilityRecord) {
        let mut tables = self.tables.write().await;
        tables.facilities.insert(facility.id.clone(), facility);
    }

    pub async fn upsert_department(&self, department: DepartmentRecord) {
        let mut tables = self.tables.write().await;
        tables.departments.insert(department.id.clone(), department);
    }

    pub async fn upsert_user(&self, user: UserSummary) {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id.clone(), user);
    }
}

#[async_trait::async_trait]
impl OrganizationDirectory for InMemoryOrganizationDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<UserSummary>, DirectoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(id).cloned())
    }

    async fn get_department_hierarchy(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        self.tables.read().await.department_snapshot(department_id)
    }

    async fn get_user_organization_info(
        &self,
        user_id: &UserId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let tables = self.tables.read().await;
        let user = tables.users.get(user_id).ok_or_else(|| DirectoryError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;

        match (&user.department_id, &user.facility_id) {
            (Some(department_id), _) => tables.department_snapshot(department_id),
            (None, Some(facility_id)) => tables.facility_snapshot(facility_id),
            (None, None) => Err(DirectoryError::NotFound {
                entity: "organization membership",
                id: user_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use overtime_core::domain::organization::{
        DepartmentId, DepartmentRef, FacilityId, FacilityRef, UserRef,
    };
    use overtime_core::domain::overtime::{
        OvertimeRequest, OvertimeRequestDraft, OvertimeStatus, RequestId, RoutingPlan,
    };
    use overtime_core::domain::search::RequestSearchCriteria;
    use overtime_core::domain::user::{UserId, UserRole, UserSummary};
    use overtime_core::errors::{DirectoryError, StoreError};
    use overtime_core::ports::{OrganizationDirectory, RequestStore};

    use crate::repositories::{
        DepartmentRecord, FacilityRecord, InMemoryOrganizationDirectory, InMemoryRequestStore,
    };

    fn draft(worker: &str, hours_ahead: i64) -> OvertimeRequest {
        let start = Utc::now() + Duration::hours(hours_ahead);
        OvertimeRequest::new(OvertimeRequestDraft {
            start_time: start,
            end_time: start + Duration::hours(2),
            reason: "backlog".to_owned(),
            plan: RoutingPlan {
                worker: UserRef::new(UserId::new(worker), worker),
                department: DepartmentRef::new(DepartmentId("dep-1".to_owned()), "Assembly"),
                facility: FacilityRef::new(FacilityId("fac-1".to_owned()), "North"),
                supervisor: UserRef::new(UserId::new("sup-1"), "Sam"),
                manager: None,
                customer: None,
                requires_manager_approval: false,
                requires_customer_approval: false,
            },
        })
        .expect("draft")
    }

    #[tokio::test]
    async fn in_memory_store_assigns_sequential_ids_and_versions() {
        let store = InMemoryRequestStore::default();

        let first = store.save(&draft("w-1", 24)).await.expect("save first");
        let second = store.save(&draft("w-1", 48)).await.expect("save second");
        let updated = store.save(&first).await.expect("update first");

        assert_eq!(first.id(), &RequestId::new("OT-000001"));
        assert_eq!(second.id(), &RequestId::new("OT-000002"));
        assert_eq!(updated.version(), 2);
        assert_eq!(store.find_by_id(first.id()).await.expect("find"), Some(updated));
    }

    #[tokio::test]
    async fn in_memory_store_rejects_stale_versions() {
        let store = InMemoryRequestStore::default();
        let saved = store.save(&draft("w-1", 24)).await.expect("save");
        store.save(&saved).await.expect("advance version");

        let error = store.save(&saved).await.expect_err("stale write");

        assert_eq!(
            error,
            StoreError::ConcurrentModification {
                request_id: saved.id().clone(),
                expected_version: 1
            }
        );
    }

    #[tokio::test]
    async fn in_memory_queries_filter_order_and_paginate() {
        let store = InMemoryRequestStore::default();
        for hours in [24, 48, 72] {
            store.save(&draft("w-1", hours)).await.expect("save");
        }
        store.save(&draft("w-2", 24)).await.expect("save other worker");

        let criteria = RequestSearchCriteria::new(2, 2).expect("criteria");
        let page = store.find_by_worker_id(&UserId::new("w-1"), &criteria).await.expect("query");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id(), &RequestId::new("OT-000003"));

        let windowed = RequestSearchCriteria::default()
            .with_date_range(None, Some(Utc::now() + Duration::hours(60)))
            .expect("range");
        let page =
            store.find_by_worker_id(&UserId::new("w-1"), &windowed).await.expect("windowed");
        assert_eq!(page.total, 2);

        let approved = RequestSearchCriteria::default().with_status(OvertimeStatus::Approved);
        let page = store
            .find_by_facility_id(&FacilityId("fac-1".to_owned()), &approved)
            .await
            .expect("status filter");
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn in_memory_directory_composes_hierarchy() {
        let directory = InMemoryOrganizationDirectory::default();
        directory
            .upsert_facility(FacilityRecord {
                id: FacilityId("fac-1".to_owned()),
                name: "North".to_owned(),
                manager_id: Some(UserId::new("mgr-1")),
            })
            .await;
        directory
            .upsert_department(DepartmentRecord {
                id: DepartmentId("dep-1".to_owned()),
                name: "Assembly".to_owned(),
                facility_id: FacilityId("fac-1".to_owned()),
                supervisor_id: Some(UserId::new("sup-1")),
            })
            .await;
        directory
            .upsert_user(UserSummary {
                id: UserId::new("sup-1"),
                name: "Sam".to_owned(),
                role: UserRole::Supervisor,
                department_id: Some(DepartmentId("dep-1".to_owned())),
                facility_id: Some(FacilityId("fac-1".to_owned())),
                has_approval_authority: false,
                requires_approval: false,
            })
            .await;

        let snapshot = directory
            .get_department_hierarchy(&DepartmentId("dep-1".to_owned()))
            .await
            .expect("hierarchy");
        assert_eq!(snapshot.supervisor.map(|sup| sup.name), Some("Sam".to_owned()));
        assert_eq!(snapshot.manager.map(|mgr| mgr.id), Some(UserId::new("mgr-1")));

        let info = directory.get_user_organization_info(&UserId::new("sup-1")).await.expect("info");
        assert_eq!(info.department.map(|dep| dep.name), Some("Assembly".to_owned()));

        let missing = directory.get_department_hierarchy(&DepartmentId("dep-9".to_owned())).await;
        assert!(matches!(missing, Err(DirectoryError::NotFound { entity: "department", .. })));
    }
}
