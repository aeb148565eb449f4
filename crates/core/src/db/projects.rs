use chrono::Utc;
use shared::ProjectStatus;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::Project;
use crate::error::AppResult;
use crate::pagination::{PaginatedResult, Pagination};
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "projects.id, projects.organization_id, projects.client_id, projects.created_by_user_id, \
                       projects.title, projects.description, projects.status, projects.priority, \
                       projects.due_date, projects.created_at, projects.updated_at";

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub client_id: Option<Uuid>,
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: &Scope, filter: &ProjectFilter) {
    qb.push(" WHERE 1 = 1");
    scope.push_filter(qb, ScopedTable::Projects);
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND projects.title LIKE ");
        qb.push_bind(format!("%{}%", search));
    }
    if let Some(status) = filter.status {
        qb.push(" AND projects.status = ");
        qb.push_bind(status);
    }
    if let Some(client_id) = filter.client_id {
        qb.push(" AND projects.client_id = ");
        qb.push_bind(client_id);
    }
}

/// Ordered by due date (undated last), then title
pub async fn list(
    conn: &mut SqliteConnection,
    scope: &Scope,
    filter: &ProjectFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Project>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM projects");
    push_conditions(&mut count, scope, filter);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM projects", COLUMNS));
    push_conditions(&mut qb, scope, filter);
    qb.push(" ORDER BY projects.due_date IS NULL, projects.due_date, projects.title, projects.rowid LIMIT ");
    qb.push_bind(page.sql_limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.sql_offset());
    let items = qb.build_query_as::<Project>().fetch_all(&mut *conn).await?;

    Ok(PaginatedResult::new(items, total, page))
}

pub async fn count(conn: &mut SqliteConnection, scope: &Scope, filter: &ProjectFilter) -> AppResult<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM projects");
    push_conditions(&mut qb, scope, filter);
    Ok(qb.build_query_scalar().fetch_one(&mut *conn).await?)
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<Project>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM projects WHERE projects.id = ", COLUMNS));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::Projects);
    Ok(qb.build_query_as::<Project>().fetch_optional(&mut *conn).await?)
}

pub async fn insert(conn: &mut SqliteConnection, project: &Project) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO projects (id, organization_id, client_id, created_by_user_id, title, description, status,
                               priority, due_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project.id)
    .bind(project.organization_id)
    .bind(project.client_id)
    .bind(project.created_by_user_id)
    .bind(&project.title)
    .bind(&project.description)
    .bind(project.status)
    .bind(project.priority)
    .bind(project.due_date)
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update(conn: &mut SqliteConnection, project: &Project) -> AppResult<()> {
    sqlx::query(
        "UPDATE projects SET client_id = ?, title = ?, description = ?, status = ?, priority = ?, due_date = ?,
                             updated_at = ?
         WHERE id = ? AND organization_id = ?",
    )
    .bind(project.client_id)
    .bind(&project.title)
    .bind(&project.description)
    .bind(project.status)
    .bind(project.priority)
    .bind(project.due_date)
    .bind(Utc::now())
    .bind(project.id)
    .bind(project.organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

const ASSIGNED_STAFF: &str = "SELECT pu.user_id FROM project_user pu
     JOIN users u ON u.id = pu.user_id AND u.organization_id = pu.organization_id
     WHERE pu.project_id = ? AND u.role IN ('Owner', 'Staff')";

/// Owner/Staff members assigned to the project
pub async fn staff_ids(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(&format!("{} ORDER BY pu.created_at, pu.rowid", ASSIGNED_STAFF))
        .bind(project_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

/// Assigned Owner/Staff members that are still active
pub async fn active_staff_ids(conn: &mut SqliteConnection, project_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(&format!(
        "{} AND u.is_active = 1 ORDER BY pu.created_at, pu.rowid",
        ASSIGNED_STAFF
    ))
    .bind(project_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Drop every project assignment of a member
pub async fn unassign_member(conn: &mut SqliteConnection, organization_id: Uuid, user_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM project_user WHERE organization_id = ? AND user_id = ?")
        .bind(organization_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn replace_staff(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    project_id: Uuid,
    user_ids: &[Uuid],
) -> AppResult<()> {
    sqlx::query("DELETE FROM project_user WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *conn)
        .await?;

    let now = Utc::now();
    for user_id in user_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO project_user (project_id, user_id, organization_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .bind(organization_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
