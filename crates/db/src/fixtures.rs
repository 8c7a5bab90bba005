use sqlx::Executor;

use overtime_core::domain::organization::{DepartmentId, FacilityId};
use overtime_core::domain::user::{UserId, UserRole, UserSummary};

use crate::connection::DbPool;
use crate::repositories::{
    DepartmentRecord, FacilityRecord, InMemoryOrganizationDirectory, RepositoryError,
};

pub const FACILITY_NORTH: &str = "fac-north";
pub const DEPARTMENT_ASSEMBLY: &str = "dep-assembly";
pub const DEPARTMENT_PACKAGING: &str = "dep-packaging";

pub const MANAGER: &str = "usr-mgr-1";
/// Supervises assembly without approval authority, so assembly requests need the manager.
pub const SUPERVISOR_ASSEMBLY: &str = "usr-sup-1";
pub const SUPERVISOR_PACKAGING: &str = "usr-sup-2";
pub const WORKER_ASSEMBLY: &str = "usr-wrk-1";
pub const WORKER_PACKAGING: &str = "usr-wrk-2";
/// Requires sign-off on requests filed against it.
pub const CUSTOMER_GATED: &str = "usr-cus-1";
pub const CUSTOMER_OPEN: &str = "usr-cus-2";

const SEED_FACILITIES: &[(&str, &str, &str)] = &[(FACILITY_NORTH, "North Plant", MANAGER)];

const SEED_DEPARTMENTS: &[(&str, &str, &str)] = &[
    (DEPARTMENT_ASSEMBLY, "Assembly", SUPERVISOR_ASSEMBLY),
    (DEPARTMENT_PACKAGING, "Packaging", SUPERVISOR_PACKAGING),
];

const SEED_USERS: &[SeedUser] = &[
    SeedUser::new(MANAGER, "Morgan Reyes", UserRole::Manager, None).authority(),
    SeedUser::new(
        SUPERVISOR_ASSEMBLY,
        "Sam Okafor",
        UserRole::Supervisor,
        Some(DEPARTMENT_ASSEMBLY),
    ),
    SeedUser::new(
        SUPERVISOR_PACKAGING,
        "Priya Natarajan",
        UserRole::Supervisor,
        Some(DEPARTMENT_PACKAGING),
    )
    .authority(),
    SeedUser::new(WORKER_ASSEMBLY, "Wes Lindqvist", UserRole::Worker, Some(DEPARTMENT_ASSEMBLY)),
    SeedUser::new(WORKER_PACKAGING, "Dana Kowalski", UserRole::Worker, Some(DEPARTMENT_PACKAGING)),
    SeedUser::new(CUSTOMER_GATED, "Acme Foods", UserRole::Customer, None).gated(),
    SeedUser::new(CUSTOMER_OPEN, "Beacon Retail", UserRole::Customer, None),
];

#[derive(Debug, Clone, Copy)]
struct SeedUser {
    id: &'static str,
    name: &'static str,
    role: UserRole,
    department_id: Option<&'static str>,
    has_approval_authority: bool,
    requires_approval: bool,
}

impl SeedUser {
    const fn new(
        id: &'static str,
        name: &'static str,
        role: UserRole,
        department_id: Option<&'static str>,
    ) -> Self {
        Self {
            id,
            name,
            role,
            department_id,
            has_approval_authority: false,
            requires_approval: false,
        }
    }

    const fn authority(self) -> Self {
        Self { has_approval_authority: true, ..self }
    }

    const fn gated(self) -> Self {
        Self { requires_approval: true, ..self }
    }

    fn summary(&self) -> UserSummary {
        UserSummary {
            id: UserId::new(self.id),
            name: self.name.to_owned(),
            role: self.role,
            department_id: self.department_id.map(|id| DepartmentId(id.to_owned())),
            facility_id: Some(FacilityId(FACILITY_NORTH.to_owned())),
            has_approval_authority: self.has_approval_authority,
            requires_approval: self.requires_approval,
        }
    }
}

/// Demo organization: one facility, two departments with opposite supervisor
/// authority, two workers and two customers (one gated, one not).
pub struct OrganizationSeedDataset;

impl OrganizationSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/org_seed_data.sql");

    /// Loads the dataset; safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            facilities: SEED_FACILITIES.len(),
            departments: SEED_DEPARTMENTS.len(),
            users: SEED_USERS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (id, _, manager_id) in SEED_FACILITIES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM facility WHERE id = ?1 AND manager_id = ?2)",
            )
            .bind(*id)
            .bind(*manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((*id, present == 1));
        }

        for (id, _, supervisor_id) in SEED_DEPARTMENTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM department
                    WHERE id = ?1 AND facility_id = ?2 AND supervisor_id = ?3
                 )",
            )
            .bind(*id)
            .bind(FACILITY_NORTH)
            .bind(*supervisor_id)
            .fetch_one(pool)
            .await?;
            checks.push((*id, present == 1));
        }

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM org_user
                  WHERE id = ?1 AND role = ?2
                    AND has_approval_authority = ?3 AND requires_approval = ?4)",
            )
            .bind(user.id)
            .bind(user.role.as_str())
            .bind(i64::from(user.has_approval_authority))
            .bind(i64::from(user.requires_approval))
            .fetch_one(pool)
            .await?;
            checks.push((user.id, present == 1));
        }

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// The same organization, held in memory.
    pub async fn in_memory() -> InMemoryOrganizationDirectory {
        let directory = InMemoryOrganizationDirectory::default();

        for (id, name, manager_id) in SEED_FACILITIES {
            directory
                .upsert_facility(FacilityRecord {
                    id: FacilityId((*id).to_owned()),
                    name: (*name).to_owned(),
                    manager_id: Some(UserId::new(*manager_id)),
                })
                .await;
        }
        for (id, name, supervisor_id) in SEED_DEPARTMENTS {
            directory
                .upsert_department(DepartmentRecord {
                    id: DepartmentId((*id).to_owned()),
                    name: (*name).to_owned(),
                    facility_id: FacilityId(FACILITY_NORTH.to_owned()),
                    supervisor_id: Some(UserId::new(*supervisor_id)),
                })
                .await;
        }
        for user in SEED_USERS {
            directory.upsert_user(user.summary()).await;
        }

        directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub facilities: usize,
    pub departments: usize,
    pub users: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use overtime_core::ports::OrganizationDirectory;

    use super::*;
    use crate::{connect, migrations, SqlOrganizationDirectory};

    #[test]
    fn sql_fixture_mentions_every_seed_row() {
        for user in SEED_USERS {
            assert!(OrganizationSeedDataset::SQL.contains(user.id), "missing {}", user.id);
        }
        for (id, _, _) in SEED_DEPARTMENTS.iter().chain(SEED_FACILITIES) {
            assert!(OrganizationSeedDataset::SQL.contains(id), "missing {id}");
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifiable() {
        let pool = connect("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let first = OrganizationSeedDataset::load(&pool).await.expect("load");
        let first_verification = OrganizationSeedDataset::verify(&pool).await.expect("verify");
        let second = OrganizationSeedDataset::load(&pool).await.expect("reload");
        let second_verification = OrganizationSeedDataset::verify(&pool).await.expect("re-verify");

        assert_eq!(first, second);
        assert_eq!(first.users, 7);
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn sql_and_memory_directories_agree() {
        let pool = connect("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        OrganizationSeedDataset::load(&pool).await.expect("load");

        let sql = SqlOrganizationDirectory::new(pool);
        let memory = OrganizationSeedDataset::in_memory().await;

        for user in SEED_USERS {
            let id = UserId::new(user.id);
            assert_eq!(
                sql.get_user(&id).await.expect("sql user"),
                memory.get_user(&id).await.expect("memory user"),
            );
            assert_eq!(
                sql.get_user_organization_info(&id).await.expect("sql info"),
                memory.get_user_organization_info(&id).await.expect("memory info"),
            );
        }
    }
}
