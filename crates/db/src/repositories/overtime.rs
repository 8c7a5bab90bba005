use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use overtime_core::domain::organization::{DepartmentId, FacilityId};
use overtime_core::domain::overtime::{OvertimeRequest, OvertimeStatus, RequestId};
use overtime_core::domain::search::{Page, RequestSearchCriteria};
use overtime_core::domain::user::UserId;
use overtime_core::errors::StoreError;
use overtime_core::ports::RequestStore;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, RepositoryError> {
        let id = RequestId::new(format!("OT-{}", Uuid::new_v4()));
        let saved = request.clone().with_id(id).with_version(1);
        let columns = RequestColumns::from_request(&saved)?;

        sqlx::query(
            "INSERT INTO overtime_request (id, worker_id, department_id, facility_id, customer_id,
                                           status, start_time, end_time, created_at, updated_at,
                                           version, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(saved.id().as_str())
        .bind(saved.worker().id.as_str())
        .bind(&saved.department().id.0)
        .bind(&saved.facility().id.0)
        .bind(saved.customer().map(|customer| customer.id.as_str()))
        .bind(saved.status().as_str())
        .bind(&columns.start_time)
        .bind(&columns.end_time)
        .bind(&columns.created_at)
        .bind(&columns.updated_at)
        .bind(columns.version)
        .bind(&columns.payload)
        .execute(&self.pool)
        .await?;

        Ok(saved)
    }

    /// Returns `None` when the stored row is no longer at `request.version()`.
    async fn update(
        &self,
        request: &OvertimeRequest,
    ) -> Result<Option<OvertimeRequest>, RepositoryError> {
        let expected = version_column(request.version())?;
        let saved = request.clone().with_version(request.version() + 1);
        let columns = RequestColumns::from_request(&saved)?;

        let result = sqlx::query(
            "UPDATE overtime_request SET
                 customer_id = ?,
                 status = ?,
                 start_time = ?,
                 end_time = ?,
                 updated_at = ?,
                 version = ?,
                 payload = ?
             WHERE id = ? AND version = ?",
        )
        .bind(saved.customer().map(|customer| customer.id.as_str()))
        .bind(saved.status().as_str())
        .bind(&columns.start_time)
        .bind(&columns.end_time)
        .bind(&columns.updated_at)
        .bind(columns.version)
        .bind(&columns.payload)
        .bind(saved.id().as_str())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() == 1).then_some(saved))
    }

    async fn query_page(
        &self,
        key: KeyColumn,
        value: &str,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, RepositoryError> {
        let filter = format!(
            "WHERE {column} = ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR start_time >= ?3)
               AND (?4 IS NULL OR end_time <= ?4)",
            column = key.column()
        );
        let status = criteria.status().map(OvertimeStatus::as_str);
        let start = criteria.start_date().map(timestamp);
        let end = criteria.end_date().map(timestamp);

        let count_sql = format!("SELECT COUNT(1) FROM overtime_request {filter}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(value)
            .bind(status)
            .bind(&start)
            .bind(&end)
            .fetch_one(&self.pool)
            .await?;

        let limit = i64::from(criteria.page_size());
        let offset = i64::try_from(criteria.offset())
            .map_err(|_| RepositoryError::Decode("page offset out of range".to_owned()))?;
        let rows = sqlx::query(&format!(
            "SELECT id, version, payload FROM overtime_request {filter}
             ORDER BY created_at ASC, id ASC
             LIMIT ?5 OFFSET ?6"
        ))
        .bind(value)
        .bind(status)
        .bind(&start)
        .bind(&end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()?;
        let total = u64::try_from(total)
            .map_err(|_| RepositoryError::Decode(format!("negative row count {total}")))?;
        Ok(Page { items, total })
    }
}

#[derive(Clone, Copy)]
enum KeyColumn {
    Worker,
    Department,
    Facility,
    Customer,
    Status,
}

impl KeyColumn {
    fn column(self) -> &'static str {
        match self {
            Self::Worker => "worker_id",
            Self::Department => "department_id",
            Self::Facility => "facility_id",
            Self::Customer => "customer_id",
            Self::Status => "status",
        }
    }
}

struct RequestColumns {
    start_time: String,
    end_time: String,
    created_at: String,
    updated_at: String,
    version: i64,
    payload: String,
}

impl RequestColumns {
    fn from_request(request: &OvertimeRequest) -> Result<Self, RepositoryError> {
        Ok(Self {
            start_time: timestamp(request.start_time()),
            end_time: timestamp(request.end_time()),
            created_at: timestamp(request.created_at()),
            updated_at: timestamp(request.updated_at()),
            version: version_column(request.version())?,
            payload: serde_json::to_string(request)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        })
    }
}

// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn version_column(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("version {version} overflows")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<OvertimeRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let payload: String =
        row.try_get("payload").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let request: OvertimeRequest =
        serde_json::from_str(&payload).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version = u64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("negative version {version} for {id}")))?;

    Ok(request.with_id(RequestId::new(id)).with_version(version))
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn save(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        if !request.id().is_assigned() {
            return Ok(self.insert(request).await?);
        }

        match self.update(request).await? {
            Some(saved) => Ok(saved),
            None => Err(StoreError::ConcurrentModification {
                request_id: request.id().clone(),
                expected_version: request.version(),
            }),
        }
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<OvertimeRequest>, StoreError> {
        let row = sqlx::query("SELECT id, version, payload FROM overtime_request WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_worker_id(
        &self,
        worker_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query_page(KeyColumn::Worker, worker_id.as_str(), criteria).await?)
    }

    async fn find_by_department_id(
        &self,
        department_id: &DepartmentId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query_page(KeyColumn::Department, &department_id.0, criteria).await?)
    }

    async fn find_by_facility_id(
        &self,
        facility_id: &FacilityId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query_page(KeyColumn::Facility, &facility_id.0, criteria).await?)
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &UserId,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query_page(KeyColumn::Customer, customer_id.as_str(), criteria).await?)
    }

    async fn find_by_status(
        &self,
        status: OvertimeStatus,
        criteria: &RequestSearchCriteria,
    ) -> Result<Page<OvertimeRequest>, StoreError> {
        Ok(self.query_page(KeyColumn::Status, status.as_str(), criteria).await?)
    }
}
