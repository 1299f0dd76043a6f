//! Graduate repository for database operations.
//!
//! Change notifications for this table are emitted by database triggers, so
//! the repository itself never publishes to the change feed.

use chrono::{DateTime, Utc};
use domain::models::{Graduate, NewGraduate};
use domain::services::{MarkPresentResult, RosterError, RosterOrder, RosterStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::GraduateEntity;
use crate::metrics::QueryTimer;

const GRADUATE_COLUMNS: &str =
    "id, student_id, fullname, faculty, degree, status, check_in_at, created_at";

/// Maps a database error onto the roster error taxonomy.
pub(crate) fn roster_error(e: sqlx::Error) -> RosterError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            tracing::error!(error = %e, "Roster database unavailable");
            RosterError::Unavailable
        }
        other => {
            tracing::error!(error = %other, "Roster query failed");
            RosterError::Storage(other.to_string())
        }
    }
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Repository for roster database operations.
#[derive(Clone)]
pub struct GraduateRepository {
    pool: PgPool,
}

impl GraduateRepository {
    /// Creates a new GraduateRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl RosterStore for GraduateRepository {
    async fn list(&self, order: RosterOrder) -> Result<Vec<Graduate>, RosterError> {
        let order_by = match order {
            RosterOrder::Insertion => "seq",
            RosterOrder::StudentId => "student_id, seq",
        };
        let query = format!(
            "SELECT {} FROM graduates ORDER BY {}",
            GRADUATE_COLUMNS, order_by
        );

        let timer = QueryTimer::new("list_graduates");
        let result = sqlx::query_as::<_, GraduateEntity>(&query)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        Ok(result
            .map_err(roster_error)?
            .into_iter()
            .map(Graduate::from)
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Graduate>, RosterError> {
        let timer = QueryTimer::new("find_graduate_by_id");
        let result = sqlx::query_as::<_, GraduateEntity>(&format!(
            "SELECT {} FROM graduates WHERE id = $1",
            GRADUATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(roster_error)?.map(Graduate::from))
    }

    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<Graduate>, RosterError> {
        let timer = QueryTimer::new("find_graduate_by_student_id");
        let result = sqlx::query_as::<_, GraduateEntity>(&format!(
            "SELECT {} FROM graduates WHERE student_id = $1 ORDER BY seq LIMIT 1",
            GRADUATE_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(roster_error)?.map(Graduate::from))
    }

    async fn search(&self, query: &str) -> Result<Option<Graduate>, RosterError> {
        let pattern = format!("%{}%", escape_like(query));

        let timer = QueryTimer::new("search_graduates");
        let result = sqlx::query_as::<_, GraduateEntity>(&format!(
            r#"
            SELECT {}
            FROM graduates
            WHERE student_id = $1 OR fullname ILIKE $2
            ORDER BY seq
            LIMIT 1
            "#,
            GRADUATE_COLUMNS
        ))
        .bind(query)
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(roster_error)?.map(Graduate::from))
    }

    async fn insert_many(&self, rows: Vec<NewGraduate>) -> Result<Vec<Graduate>, RosterError> {
        let timer = QueryTimer::new("insert_graduates_batch");
        let mut tx = self.pool.begin().await.map_err(roster_error)?;
        let mut inserted = Vec::with_capacity(rows.len());

        let statement = format!(
            r#"
            INSERT INTO graduates (student_id, fullname, faculty, degree)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            GRADUATE_COLUMNS
        );

        for row in &rows {
            let entity = sqlx::query_as::<_, GraduateEntity>(&statement)
                .bind(&row.student_id)
                .bind(&row.fullname)
                .bind(&row.faculty)
                .bind(&row.degree)
                .fetch_one(&mut *tx)
                .await
                .map_err(roster_error)?;
            inserted.push(Graduate::from(entity));
        }

        tx.commit().await.map_err(roster_error)?;
        timer.record();

        tracing::info!(count = inserted.len(), "Imported roster batch");
        Ok(inserted)
    }

    async fn mark_present(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<MarkPresentResult, RosterError> {
        let timer = QueryTimer::new("mark_graduate_present");
        let result = sqlx::query_as::<_, GraduateEntity>(&format!(
            r#"
            UPDATE graduates
            SET status = 'present', check_in_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            GRADUATE_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        if let Some(entity) = result.map_err(roster_error)? {
            return Ok(MarkPresentResult::CheckedIn(entity.into()));
        }

        // Lost the race or never pending; report what is stored now.
        Ok(match self.find_by_id(id).await? {
            Some(current) => MarkPresentResult::AlreadyPresent(current),
            None => MarkPresentResult::NotFound,
        })
    }

    async fn delete_all(&self) -> Result<u64, RosterError> {
        let timer = QueryTimer::new("delete_all_graduates");
        let result = sqlx::query("DELETE FROM graduates")
            .execute(&self.pool)
            .await;
        timer.record();

        let removed = result.map_err(roster_error)?.rows_affected();
        tracing::warn!(removed, "Roster cleared");
        Ok(removed)
    }

    async fn count(&self) -> Result<i64, RosterError> {
        let timer = QueryTimer::new("count_graduates");
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM graduates")
            .fetch_one(&self.pool)
            .await;
        timer.record();

        result.map_err(roster_error)
    }
}
