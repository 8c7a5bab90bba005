use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    const TABLES: [&str; 4] = ["facility", "department", "org_user", "overtime_request"];

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("apply migrations");
        pool
    }

    /// Names of schema objects of `kind`, skipping sqlite and sqlx bookkeeping.
    async fn object_names(pool: &DbPool, kind: &str) -> Vec<String> {
        sqlx::query(
            "SELECT name FROM sqlite_master
             WHERE type = ?1 AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'
             ORDER BY name",
        )
        .bind(kind)
        .fetch_all(pool)
        .await
        .expect("read sqlite_master")
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
    }

    #[tokio::test]
    async fn baseline_creates_organization_and_request_tables() {
        let pool = migrated_pool().await;

        let mut expected = TABLES.map(str::to_owned).to_vec();
        expected.sort();
        assert_eq!(object_names(&pool, "table").await, expected);

        let indexes = object_names(&pool, "index").await;
        assert_eq!(indexes.len(), 8);
        assert!(indexes.iter().any(|name| name == "idx_overtime_request_status"));
    }

    #[tokio::test]
    async fn applying_twice_is_a_no_op() {
        let pool = migrated_pool().await;
        let before = object_names(&pool, "index").await;

        run_pending(&pool).await.expect("second run");

        assert_eq!(object_names(&pool, "index").await, before);
    }

    #[tokio::test]
    async fn undo_drops_everything_and_reapply_restores_it() {
        let pool = migrated_pool().await;
        let tables = object_names(&pool, "table").await;

        MIGRATOR.undo(&pool, 0).await.expect("undo");
        assert!(object_names(&pool, "table").await.is_empty());
        assert!(object_names(&pool, "index").await.is_empty());

        run_pending(&pool).await.expect("reapply");
        assert_eq!(object_names(&pool, "table").await, tables);
    }

    #[tokio::test]
    async fn org_user_role_is_constrained() {
        let pool = migrated_pool().await;

        let inserted =
            sqlx::query("INSERT INTO org_user (id, name, role) VALUES ('usr-x', 'X', 'AUDITOR')")
                .execute(&pool)
                .await;

        assert!(inserted.is_err(), "unknown role should violate the CHECK constraint");
    }
}
