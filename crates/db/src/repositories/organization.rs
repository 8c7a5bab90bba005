use sqlx::Row;

use overtime_core::domain::organization::{
    DepartmentId, DepartmentRef, FacilityId, FacilityRef, OrganizationSnapshot, UserRef,
};
use overtime_core::domain::user::{UserId, UserRole, UserSummary};
use overtime_core::errors::DirectoryError;
use overtime_core::ports::OrganizationDirectory;

use super::{DepartmentRecord, FacilityRecord, RepositoryError};
use crate::DbPool;

const FACILITY_SNAPSHOT_SQL: &str = "
    SELECT f.id AS facility_id, f.name AS facility_name,
           f.manager_id, m.name AS manager_name
    FROM facility f
    LEFT JOIN org_user m ON m.id = f.manager_id
    WHERE f.id = ?";

const DEPARTMENT_SNAPSHOT_SQL: &str = "
    SELECT d.id AS department_id, d.name AS department_name,
           f.id AS facility_id, f.name AS facility_name,
           d.supervisor_id, s.name AS supervisor_name,
           f.manager_id, m.name AS manager_name
    FROM department d
    JOIN facility f ON f.id = d.facility_id
    LEFT JOIN org_user s ON s.id = d.supervisor_id
    LEFT JOIN org_user m ON m.id = f.manager_id
    WHERE d.id = ?";

/// Directory backed by the `facility`, `department` and `org_user` tables.
pub struct SqlOrganizationDirectory {
    pool: DbPool,
}

impl SqlOrganizationDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_facility(&self, facility: &FacilityRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO facility (id, name, manager_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, manager_id = excluded.manager_id",
        )
        .bind(&facility.id.0)
        .bind(&facility.name)
        .bind(facility.manager_id.as_ref().map(UserId::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_department(
        &self,
        department: &DepartmentRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO department (id, name, facility_id, supervisor_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 facility_id = excluded.facility_id,
                 supervisor_id = excluded.supervisor_id",
        )
        .bind(&department.id.0)
        .bind(&department.name)
        .bind(&department.facility_id.0)
        .bind(department.supervisor_id.as_ref().map(UserId::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_user(&self, user: &UserSummary) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO org_user (id, name, role, department_id, facility_id,
                                   has_approval_authority, requires_approval)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role,
                 department_id = excluded.department_id,
                 facility_id = excluded.facility_id,
                 has_approval_authority = excluded.has_approval_authority,
                 requires_approval = excluded.requires_approval",
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.department_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.facility_id.as_ref().map(|id| id.0.as_str()))
        .bind(i64::from(user.has_approval_authority))
        .bind(i64::from(user.requires_approval))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn department_snapshot(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let row = sqlx::query(DEPARTMENT_SNAPSHOT_SQL)
            .bind(&department_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| DirectoryError::NotFound {
                entity: "department",
                id: department_id.to_string(),
            })?;

        let mut snapshot = facility_columns(&row)?;
        let id: String = decode(&row, "department_id")?;
        let name: String = decode(&row, "department_name")?;
        snapshot.department = Some(DepartmentRef::new(DepartmentId(id), name));
        snapshot.supervisor = user_ref(&row, "supervisor_id", "supervisor_name")?;
        Ok(snapshot)
    }

    async fn facility_snapshot(
        &self,
        facility_id: &FacilityId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let row = sqlx::query(FACILITY_SNAPSHOT_SQL)
            .bind(&facility_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| DirectoryError::NotFound {
                entity: "facility",
                id: facility_id.to_string(),
            })?;

        Ok(facility_columns(&row)?)
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn facility_columns(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<OrganizationSnapshot, RepositoryError> {
    let id: String = decode(row, "facility_id")?;
    let name: String = decode(row, "facility_name")?;
    Ok(OrganizationSnapshot {
        facility: FacilityRef::new(FacilityId(id), name),
        department: None,
        supervisor: None,
        manager: user_ref(row, "manager_id", "manager_name")?,
    })
}

// A dangling user id still yields a reference, named by its id.
fn user_ref(
    row: &sqlx::sqlite::SqliteRow,
    id_column: &str,
    name_column: &str,
) -> Result<Option<UserRef>, RepositoryError> {
    let id: Option<String> = decode(row, id_column)?;
    let name: Option<String> = decode(row, name_column)?;
    Ok(id.map(|id| {
        let name = name.unwrap_or_else(|| id.clone());
        UserRef::new(UserId::new(id), name)
    }))
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<UserSummary, RepositoryError> {
    let role: String = decode(row, "role")?;
    let role = role.parse::<UserRole>().map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department_id: Option<String> = decode(row, "department_id")?;
    let facility_id: Option<String> = decode(row, "facility_id")?;
    let has_approval_authority: i64 = decode(row, "has_approval_authority")?;
    let requires_approval: i64 = decode(row, "requires_approval")?;

    Ok(UserSummary {
        id: UserId::new(decode::<String>(row, "id")?),
        name: decode(row, "name")?,
        role,
        department_id: department_id.map(DepartmentId),
        facility_id: facility_id.map(FacilityId),
        has_approval_authority: has_approval_authority != 0,
        requires_approval: requires_approval != 0,
    })
}

#[async_trait::async_trait]
impl OrganizationDirectory for SqlOrganizationDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<UserSummary>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, name, role, department_id, facility_id,
                    has_approval_authority, requires_approval
             FROM org_user WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn get_department_hierarchy(
        &self,
        department_id: &DepartmentId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        self.department_snapshot(department_id).await
    }

    async fn get_user_organization_info(
        &self,
        user_id: &UserId,
    ) -> Result<OrganizationSnapshot, DirectoryError> {
        let user = self.get_user(user_id).await?.ok_or_else(|| DirectoryError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;

        match (&user.department_id, &user.facility_id) {
            (Some(department_id), _) => self.department_snapshot(department_id).await,
            (None, Some(facility_id)) => self.facility_snapshot(facility_id).await,
            (None, None) => Err(DirectoryError::NotFound {
                entity: "organization membership",
                id: user_id.to_string(),
            }),
        }
    }
}
