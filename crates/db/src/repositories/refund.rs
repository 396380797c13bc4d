use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use devolucion_core::dashboard::RefundFilter;
use devolucion_core::domain::activity::{ActivityEntry, ActivityId, ActivityType};
use devolucion_core::domain::refund::{
    Folio, RefundRequest, RefundRequestId, RefundStatus, RefundType,
};
use devolucion_core::lifecycle::TransitionOutcome;

use super::{RefundRepository, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    folio,
    owner_id,
    status,
    refund_type,
    tax_year,
    tax_period,
    requested_amount,
    approved_amount,
    description,
    submission_date,
    completion_date,
    estimated_completion_date,
    documents_count,
    created_at,
    updated_at";

pub struct SqlRefundRepository {
    pool: DbPool,
}

impl SqlRefundRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RefundRepository for SqlRefundRepository {
    async fn find_by_id(
        &self,
        id: &RefundRequestId,
    ) -> Result<Option<RefundRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM refund_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(request_from_row).transpose()
    }

    async fn find_by_folio(&self, folio: &Folio) -> Result<Option<RefundRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM refund_request WHERE folio = ?"))
                .bind(&folio.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(request_from_row).transpose()
    }

    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>, RepositoryError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {REQUEST_COLUMNS} FROM refund_request WHERE 1 = 1"));

        if let Some(owner_id) = &filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(refund_type) = filter.refund_type {
            query.push(" AND refund_type = ").push_bind(refund_type.as_str());
        }
        if let Some(tax_year) = filter.tax_year {
            query.push(" AND tax_year = ").push_bind(i64::from(tax_year));
        }
        query.push(" ORDER BY created_at DESC, folio ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let requests = rows.into_iter().map(request_from_row).collect::<Result<Vec<_>, _>>()?;

        // Free-text search shares its matching rules with the in-memory store.
        Ok(requests.into_iter().filter(|request| filter.matches(request)).collect())
    }

    async fn list_activity(
        &self,
        id: &RefundRequestId,
    ) -> Result<Vec<ActivityEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                refund_request_id,
                activity_type,
                description,
                actor,
                metadata_json,
                occurred_at
             FROM refund_activity
             WHERE refund_request_id = ?
             ORDER BY seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(activity_from_row).collect()
    }

    async fn create(
        &self,
        request: &RefundRequest,
        activity: &ActivityEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO refund_request (
                id,
                folio,
                owner_id,
                status,
                refund_type,
                tax_year,
                tax_period,
                requested_amount,
                approved_amount,
                description,
                submission_date,
                completion_date,
                estimated_completion_date,
                documents_count,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.folio.0)
        .bind(&request.owner_id)
        .bind(request.status.as_str())
        .bind(request.refund_type.as_str())
        .bind(i64::from(request.tax_year))
        .bind(&request.tax_period)
        .bind(request.requested_amount.to_string())
        .bind(request.approved_amount.to_string())
        .bind(request.description.as_deref())
        .bind(request.submission_date.map(encode_timestamp))
        .bind(request.completion_date.map(encode_timestamp))
        .bind(request.estimated_completion_date.map(encode_timestamp))
        .bind(i64::from(request.documents_count))
        .bind(encode_timestamp(request.created_at))
        .bind(encode_timestamp(request.updated_at))
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            if is_folio_conflict(&error) {
                return Err(RepositoryError::DuplicateFolio(request.folio.0.clone()));
            }
            return Err(error.into());
        }

        insert_activity(&mut tx, activity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_transition(&self, outcome: &TransitionOutcome) -> Result<(), RepositoryError> {
        let request = &outcome.request;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE refund_request
             SET status = ?,
                 approved_amount = ?,
                 submission_date = ?,
                 completion_date = ?,
                 estimated_completion_date = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(request.status.as_str())
        .bind(request.approved_amount.to_string())
        .bind(request.submission_date.map(encode_timestamp))
        .bind(request.completion_date.map(encode_timestamp))
        .bind(request.estimated_completion_date.map(encode_timestamp))
        .bind(encode_timestamp(request.updated_at))
        .bind(&request.id.0)
        .bind(outcome.from.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::ConcurrentModification {
                id: request.id.clone(),
                expected: outcome.from,
            });
        }

        insert_activity(&mut tx, &outcome.activity).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_activity(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    activity: &ActivityEntry,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&activity.metadata)
        .map_err(|error| RepositoryError::Decode(format!("activity metadata: {error}")))?;

    sqlx::query(
        "INSERT INTO refund_activity (
            id,
            refund_request_id,
            activity_type,
            description,
            actor,
            metadata_json,
            occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&activity.id.0)
    .bind(&activity.refund_request_id.0)
    .bind(activity.activity_type.as_str())
    .bind(&activity.description)
    .bind(&activity.actor)
    .bind(metadata_json)
    .bind(encode_timestamp(activity.timestamp))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn is_folio_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(database_error) => {
            database_error.is_unique_violation()
                && database_error.message().contains("refund_request.folio")
        }
        _ => false,
    }
}

fn request_from_row(row: SqliteRow) -> Result<RefundRequest, RepositoryError> {
    let status = RefundStatus::parse(&row.try_get::<String, _>("status")?)?;
    let refund_type = RefundType::parse(&row.try_get::<String, _>("refund_type")?)?;

    Ok(RefundRequest {
        id: RefundRequestId(row.try_get("id")?),
        folio: Folio(row.try_get("folio")?),
        owner_id: row.try_get("owner_id")?,
        status,
        refund_type,
        tax_year: parse_i32("tax_year", row.try_get("tax_year")?)?,
        tax_period: row.try_get("tax_period")?,
        requested_amount: parse_decimal("requested_amount", row.try_get("requested_amount")?)?,
        approved_amount: parse_decimal("approved_amount", row.try_get("approved_amount")?)?,
        description: row.try_get("description")?,
        submission_date: parse_optional_timestamp(
            "submission_date",
            row.try_get("submission_date")?,
        )?,
        completion_date: parse_optional_timestamp(
            "completion_date",
            row.try_get("completion_date")?,
        )?,
        estimated_completion_date: parse_optional_timestamp(
            "estimated_completion_date",
            row.try_get("estimated_completion_date")?,
        )?,
        documents_count: parse_u32("documents_count", row.try_get("documents_count")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn activity_from_row(row: SqliteRow) -> Result<ActivityEntry, RepositoryError> {
    let activity_type_raw = row.try_get::<String, _>("activity_type")?;
    let activity_type = ActivityType::parse(&activity_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown activity type `{activity_type_raw}`"))
    })?;

    let metadata_raw = row.try_get::<String, _>("metadata_json")?;
    let metadata = serde_json::from_str::<BTreeMap<String, String>>(&metadata_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid metadata_json: {error}")))?;

    Ok(ActivityEntry {
        id: ActivityId(row.try_get("id")?),
        refund_request_id: RefundRequestId(row.try_get("refund_request_id")?),
        activity_type,
        description: row.try_get("description")?,
        actor: row.try_get("actor")?,
        metadata,
        timestamp: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_i32(column: &str, value: i64) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected i32): {value}"))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use devolucion_core::dashboard::RefundFilter;
    use devolucion_core::domain::activity::ActivityType;
    use devolucion_core::domain::refund::{
        Folio, NewRefundRequest, RefundRequest, RefundStatus, RefundType,
    };
    use devolucion_core::errors::{ApplicationError, InterfaceError};
    use devolucion_core::lifecycle::{
        apply_transition, LifecyclePolicy, Transition, TransitionOutcome,
    };

    use super::SqlRefundRepository;
    use crate::migrations;
    use crate::repositories::{RefundRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, hour, 0, 0).single().expect("valid timestamp")
    }

    fn draft(folio: &str, owner: &str) -> (RefundRequest, devolucion_core::ActivityEntry) {
        RefundRequest::create(
            NewRefundRequest {
                owner_id: owner.to_owned(),
                refund_type: RefundType::Arrendamiento,
                tax_year: 2024,
                tax_period: "anual".to_owned(),
                requested_amount: Decimal::new(1_234_567, 2),
                description: Some("Saldo a favor por arrendamiento".to_owned()),
            },
            Folio(folio.to_owned()),
            at(8),
        )
        .expect("valid draft")
    }

    fn step(request: &RefundRequest, to: RefundStatus, hour: u32) -> TransitionOutcome {
        let transition = Transition::to(to, "reviewer");
        apply_transition(request, transition, &LifecyclePolicy::default(), at(hour))
            .expect("valid transition")
    }

    #[tokio::test]
    async fn sql_refund_repo_round_trip_with_timeline() {
        let pool = setup_pool().await;
        let repo = SqlRefundRepository::new(pool.clone());
        let (request, created) = draft("DEV-2024-000001", "u-1");

        repo.create(&request, &created).await.expect("create request");
        assert_eq!(repo.find_by_id(&request.id).await.expect("find by id"), Some(request.clone()));

        let submitted = step(&request, RefundStatus::Enviado, 9);
        repo.commit_transition(&submitted).await.expect("commit submission");

        let stored = repo
            .find_by_folio(&request.folio)
            .await
            .expect("find by folio")
            .expect("request exists");
        assert_eq!(stored, submitted.request);
        assert_eq!(stored.submission_date, Some(at(9)));
        assert_eq!(stored.estimated_completion_date, Some(at(9) + Duration::days(40)));

        let timeline = repo.list_activity(&request.id).await.expect("list activity");
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0], created);
        assert_eq!(timeline[1], submitted.activity);
        assert_eq!(timeline[1].activity_type, ActivityType::StatusChange);
        assert!(timeline[1].timestamp >= timeline[0].timestamp);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_transition_fails_with_concurrent_modification() {
        let pool = setup_pool().await;
        let repo = SqlRefundRepository::new(pool.clone());
        let (request, created) = draft("DEV-2024-000002", "u-1");
        repo.create(&request, &created).await.expect("create request");

        let submitted = step(&request, RefundStatus::Enviado, 9);
        repo.commit_transition(&submitted).await.expect("submit");
        let reviewing = step(&submitted.request, RefundStatus::EnProceso, 10);
        repo.commit_transition(&reviewing).await.expect("review");

        // Two writers both read `en_proceso`.
        let approve = step(&reviewing.request, RefundStatus::Aprobado, 11);
        let reject = step(&reviewing.request, RefundStatus::Rechazado, 11);

        repo.commit_transition(&approve).await.expect("first writer commits");
        let error = repo.commit_transition(&reject).await.expect_err("second writer is stale");
        assert!(matches!(
            error,
            RepositoryError::ConcurrentModification { expected: RefundStatus::EnProceso, .. }
        ));

        let stored = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, RefundStatus::Aprobado);
        assert!(stored.completion_date.is_none());
        assert_eq!(repo.list_activity(&request.id).await.expect("timeline").len(), 4);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_folio_is_reported_and_nothing_is_written() {
        let pool = setup_pool().await;
        let repo = SqlRefundRepository::new(pool.clone());
        let (first, first_activity) = draft("DEV-2024-000003", "u-1");
        let (second, second_activity) = draft("DEV-2024-000003", "u-2");

        repo.create(&first, &first_activity).await.expect("create first");
        let error = repo.create(&second, &second_activity).await.expect_err("duplicate folio");

        assert!(matches!(
            error,
            RepositoryError::DuplicateFolio(ref folio) if folio == "DEV-2024-000003"
        ));
        assert!(repo.find_by_id(&second.id).await.expect("find").is_none());
        assert!(repo.list_activity(&second.id).await.expect("timeline").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn list_applies_structured_filters_and_search() {
        let pool = setup_pool().await;
        let repo = SqlRefundRepository::new(pool.clone());

        for (folio, owner) in
            [("DEV-2024-000010", "u-1"), ("DEV-2024-000011", "u-1"), ("DEV-2024-000012", "u-2")]
        {
            let (request, activity) = draft(folio, owner);
            repo.create(&request, &activity).await.expect("create");
        }

        let owned = repo
            .list(&RefundFilter { owner_id: Some("u-1".to_owned()), ..RefundFilter::default() })
            .await
            .expect("list by owner");
        assert_eq!(owned.len(), 2);

        let searched = repo
            .list(&RefundFilter { search: Some("000012".to_owned()), ..RefundFilter::default() })
            .await
            .expect("search by folio");
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].owner_id, "u-2");

        let none = repo
            .list(&RefundFilter { status: Some(RefundStatus::Aprobado), ..RefundFilter::default() })
            .await
            .expect("list by status");
        assert!(none.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn out_of_vocabulary_status_surfaces_as_invalid_data() {
        let pool = setup_pool().await;
        let repo = SqlRefundRepository::new(pool.clone());
        let (request, activity) = draft("DEV-2024-000020", "u-1");
        repo.create(&request, &activity).await.expect("create");

        // Simulate upstream corruption past the CHECK constraint.
        sqlx::query("PRAGMA ignore_check_constraints = ON").execute(&pool).await.expect("pragma");
        sqlx::query("UPDATE refund_request SET status = 'pendiente' WHERE id = ?")
            .bind(&request.id.0)
            .execute(&pool)
            .await
            .expect("corrupt status");

        let error = repo.find_by_id(&request.id).await.expect_err("corrupt status must not decode");
        assert!(matches!(error, RepositoryError::InvalidData(_)));

        let error = ApplicationError::from(error);
        let corrupt = match &error {
            ApplicationError::Persistence(message) => message.contains("pendiente"),
            _ => false,
        };
        assert!(
            corrupt,
            "corrupt rows are a storage failure, not caller input: {error:?}"
        );
        assert!(matches!(
            error.into_interface("corr-1".to_owned()),
            InterfaceError::ServiceUnavailable { .. }
        ));

        pool.close().await;
    }
}
