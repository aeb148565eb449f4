use chrono::{DateTime, NaiveDate, Utc};
use shared::TaskStatus;
use sqlx::{QueryBuilder, SqliteConnection};
use uuid::Uuid;

use super::Task;
use crate::error::AppResult;
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "tasks.id, tasks.organization_id, tasks.project_id, tasks.assigned_to_user_id, tasks.title, \
                       tasks.description, tasks.status, tasks.due_date, tasks.created_at, tasks.updated_at, \
                       tasks.deleted_at";

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assigned_to_user_id: Option<Uuid>,
}

/// Live tasks of one project, undated last
pub async fn list_for_project(
    conn: &mut SqliteConnection,
    scope: &Scope,
    project_id: Uuid,
    filter: &TaskFilter,
) -> AppResult<Vec<Task>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM tasks WHERE tasks.deleted_at IS NULL AND tasks.project_id = ",
        COLUMNS
    ));
    qb.push_bind(project_id);
    scope.push_filter(&mut qb, ScopedTable::Tasks);
    if let Some(status) = filter.status {
        qb.push(" AND tasks.status = ");
        qb.push_bind(status);
    }
    if let Some(user_id) = filter.assigned_to_user_id {
        qb.push(" AND tasks.assigned_to_user_id = ");
        qb.push_bind(user_id);
    }
    qb.push(" ORDER BY tasks.due_date IS NULL, tasks.due_date, tasks.created_at, tasks.rowid");
    Ok(qb.build_query_as::<Task>().fetch_all(&mut *conn).await?)
}

/// Live, unfinished tasks due within `from..=to`
pub async fn count_due_between(
    conn: &mut SqliteConnection,
    scope: &Scope,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<i64> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(*) FROM tasks WHERE tasks.deleted_at IS NULL AND tasks.due_date IS NOT NULL \
         AND tasks.due_date BETWEEN ",
    );
    qb.push_bind(from);
    qb.push(" AND ");
    qb.push_bind(to);
    qb.push(" AND tasks.status <> ");
    qb.push_bind(TaskStatus::Done);
    scope.push_filter(&mut qb, ScopedTable::Tasks);
    Ok(qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?)
}

/// A live (not soft-deleted) task
pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<Task>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM tasks WHERE tasks.deleted_at IS NULL AND tasks.id = ",
        COLUMNS
    ));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::Tasks);
    Ok(qb.build_query_as::<Task>().fetch_optional(&mut *conn).await?)
}

pub async fn insert(conn: &mut SqliteConnection, task: &Task) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO tasks (id, organization_id, project_id, assigned_to_user_id, title, description, status,
                            due_date, created_at, updated_at, deleted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(task.id)
    .bind(task.organization_id)
    .bind(task.project_id)
    .bind(task.assigned_to_user_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status)
    .bind(task.due_date)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update(conn: &mut SqliteConnection, task: &Task) -> AppResult<()> {
    sqlx::query(
        "UPDATE tasks SET assigned_to_user_id = ?, title = ?, description = ?, status = ?, due_date = ?,
                          updated_at = ?
         WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(task.assigned_to_user_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status)
    .bind(task.due_date)
    .bind(Utc::now())
    .bind(task.id)
    .bind(task.organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn soft_delete(conn: &mut SqliteConnection, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
    sqlx::query("UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
