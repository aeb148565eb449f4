use sqlx::{QueryBuilder, SqliteConnection};
use uuid::Uuid;

use super::Comment;
use crate::error::AppResult;
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "comments.id, comments.organization_id, comments.project_id, comments.user_id, \
                       comments.author_type, comments.body, comments.created_at, comments.updated_at";

/// Oldest first, the way a thread reads
pub async fn list_for_project(
    conn: &mut SqliteConnection,
    scope: &Scope,
    project_id: Uuid,
) -> AppResult<Vec<Comment>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM comments WHERE comments.project_id = ", COLUMNS));
    qb.push_bind(project_id);
    scope.push_filter(&mut qb, ScopedTable::Comments);
    qb.push(" ORDER BY comments.created_at, comments.rowid");
    Ok(qb.build_query_as::<Comment>().fetch_all(&mut *conn).await?)
}

pub async fn recent(conn: &mut SqliteConnection, scope: &Scope, limit: i64) -> AppResult<Vec<Comment>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM comments WHERE 1 = 1", COLUMNS));
    scope.push_filter(&mut qb, ScopedTable::Comments);
    qb.push(" ORDER BY comments.created_at DESC, comments.rowid DESC LIMIT ");
    qb.push_bind(limit);
    Ok(qb.build_query_as::<Comment>().fetch_all(&mut *conn).await?)
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<Comment>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM comments WHERE comments.id = ", COLUMNS));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::Comments);
    Ok(qb.build_query_as::<Comment>().fetch_optional(&mut *conn).await?)
}

pub async fn insert(conn: &mut SqliteConnection, comment: &Comment) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO comments (id, organization_id, project_id, user_id, author_type, body, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(comment.id)
    .bind(comment.organization_id)
    .bind(comment.project_id)
    .bind(comment.user_id)
    .bind(comment.author_type)
    .bind(&comment.body)
    .bind(comment.created_at)
    .bind(comment.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
