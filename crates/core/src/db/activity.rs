use chrono::NaiveDate;
use shared::SubjectKind;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::ActivityLog;
use crate::error::AppResult;
use crate::pagination::{PaginatedResult, Pagination};
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "activity_logs.id, activity_logs.organization_id, activity_logs.actor_user_id, \
                       activity_logs.actor_type, activity_logs.subject_type, activity_logs.subject_id, \
                       activity_logs.event, activity_logs.description, activity_logs.created_at";

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub event: Option<String>,
    pub subject_type: Option<SubjectKind>,
    /// Inclusive calendar dates (UTC)
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: &Scope, filter: &ActivityFilter) {
    qb.push(" WHERE 1 = 1");
    scope.push_filter(qb, ScopedTable::ActivityLogs);
    if let Some(event) = filter.event.as_deref().filter(|e| !e.is_empty()) {
        qb.push(" AND activity_logs.event = ");
        qb.push_bind(event.to_string());
    }
    if let Some(kind) = filter.subject_type {
        qb.push(" AND activity_logs.subject_type = ");
        qb.push_bind(kind);
    }
    // Stored timestamps are RFC 3339, so the first ten characters are the date
    if let Some(from) = filter.from {
        qb.push(" AND substr(activity_logs.created_at, 1, 10) >= ");
        qb.push_bind(from.format("%Y-%m-%d").to_string());
    }
    if let Some(to) = filter.to {
        qb.push(" AND substr(activity_logs.created_at, 1, 10) <= ");
        qb.push_bind(to.format("%Y-%m-%d").to_string());
    }
}

/// Append one entry. There is no update or delete counterpart.
pub async fn insert(conn: &mut SqliteConnection, entry: &ActivityLog) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO activity_logs (id, organization_id, actor_user_id, actor_type, subject_type, subject_id, event,
                                    description, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id)
    .bind(entry.organization_id)
    .bind(entry.actor_user_id)
    .bind(entry.actor_type)
    .bind(entry.subject_type)
    .bind(entry.subject_id)
    .bind(&entry.event)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Newest first
pub async fn list(
    conn: &mut SqliteConnection,
    scope: &Scope,
    filter: &ActivityFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<ActivityLog>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM activity_logs");
    push_conditions(&mut count, scope, filter);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM activity_logs", COLUMNS));
    push_conditions(&mut qb, scope, filter);
    qb.push(" ORDER BY activity_logs.created_at DESC, activity_logs.rowid DESC LIMIT ");
    qb.push_bind(page.sql_limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.sql_offset());
    let items = qb.build_query_as::<ActivityLog>().fetch_all(&mut *conn).await?;

    Ok(PaginatedResult::new(items, total, page))
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<ActivityLog>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM activity_logs WHERE activity_logs.id = ",
        COLUMNS
    ));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::ActivityLogs);
    Ok(qb.build_query_as::<ActivityLog>().fetch_optional(&mut *conn).await?)
}

/// Entries about one subject, newest first
pub async fn for_subject(
    conn: &mut SqliteConnection,
    scope: &Scope,
    kind: SubjectKind,
    subject_id: Uuid,
) -> AppResult<Vec<ActivityLog>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM activity_logs WHERE activity_logs.subject_type = ",
        COLUMNS
    ));
    qb.push_bind(kind);
    qb.push(" AND activity_logs.subject_id = ");
    qb.push_bind(subject_id);
    scope.push_filter(&mut qb, ScopedTable::ActivityLogs);
    qb.push(" ORDER BY activity_logs.created_at DESC, activity_logs.rowid DESC");
    Ok(qb.build_query_as::<ActivityLog>().fetch_all(&mut *conn).await?)
}

/// Distinct values of one column, sorted, for filter dropdowns
async fn distinct(conn: &mut SqliteConnection, scope: &Scope, column: &'static str) -> AppResult<Vec<String>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT DISTINCT activity_logs.{} FROM activity_logs WHERE 1 = 1",
        column
    ));
    scope.push_filter(&mut qb, ScopedTable::ActivityLogs);
    qb.push(format!(" ORDER BY activity_logs.{}", column));
    Ok(qb.build_query_scalar::<String>().fetch_all(&mut *conn).await?)
}

pub async fn distinct_events(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<String>> {
    distinct(conn, scope, "event").await
}

pub async fn distinct_subject_types(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<String>> {
    distinct(conn, scope, "subject_type").await
}
