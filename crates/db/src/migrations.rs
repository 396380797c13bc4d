use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of successfully applied migrations; zero on a database never migrated.
pub async fn applied_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let (history,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if history == 0 {
        return Ok(0);
    }

    let (applied,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(usize::try_from(applied).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{applied_count, run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "refund_request",
        "refund_activity",
        "idx_refund_request_owner_id",
        "idx_refund_request_status",
        "idx_refund_request_created_at",
        "idx_refund_activity_request_id",
        "refund_activity_no_update",
        "refund_activity_no_delete",
    ];

    #[tokio::test]
    async fn migrations_create_managed_schema_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ?")
                .bind(object)
                .fetch_one(&pool)
                .await
                .expect("query sqlite_master")
                .get::<i64, _>("count");
            assert_eq!(count, 1, "expected schema object `{object}`");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn applied_count_tracks_migration_history() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(applied_count(&pool).await.expect("count before"), 0);

        run_pending(&pool).await.expect("run migrations");
        assert_eq!(applied_count(&pool).await.expect("count after"), MIGRATOR.iter().count());
        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run is a no-op");
        pool.close().await;
    }

    #[tokio::test]
    async fn status_column_rejects_out_of_vocabulary_values() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let result = sqlx::query(
            "INSERT INTO refund_request (
                id, folio, owner_id, status, refund_type, tax_year, tax_period,
                requested_amount, created_at, updated_at
             ) VALUES ('r-1', 'F-1', 'u-1', 'pendiente', 'otros', 2024, 'anual', '10',
                '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "free-text statuses must be rejected by the schema");
        pool.close().await;
    }

    #[tokio::test]
    async fn activity_type_column_rejects_out_of_vocabulary_values() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO refund_request (
                id, folio, owner_id, status, refund_type, tax_year, tax_period,
                requested_amount, created_at, updated_at
             ) VALUES ('r-1', 'F-1', 'u-1', 'borrador', 'otros', 2024, 'anual', '10',
                '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert request");

        let insert_activity = |activity_id: &'static str, activity_type: &'static str| {
            sqlx::query(
                "INSERT INTO refund_activity (
                    id, refund_request_id, activity_type, description, actor, occurred_at
                 ) VALUES (?, 'r-1', ?, 'entry', 'u-1', '2025-01-01T00:00:00Z')",
            )
            .bind(activity_id)
            .bind(activity_type)
            .execute(&pool)
        };

        insert_activity("a-1", "status_change").await.expect("known activity type");
        let result = insert_activity("a-2", "deleted").await;

        assert!(result.is_err(), "unknown activity types must be rejected by the schema");
        pool.close().await;
    }
}
