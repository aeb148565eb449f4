use sqlx::{QueryBuilder, SqliteConnection};
use uuid::Uuid;

use super::ProjectFile;
use crate::error::AppResult;
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "project_files.id, project_files.organization_id, project_files.project_id, \
                       project_files.uploaded_by_user_id, project_files.uploader_type, project_files.file_type, \
                       project_files.original_name, project_files.storage_path, project_files.mime_type, \
                       project_files.size_bytes, project_files.created_at";

/// Newest first
pub async fn list_for_project(
    conn: &mut SqliteConnection,
    scope: &Scope,
    project_id: Uuid,
) -> AppResult<Vec<ProjectFile>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM project_files WHERE project_files.project_id = ",
        COLUMNS
    ));
    qb.push_bind(project_id);
    scope.push_filter(&mut qb, ScopedTable::ProjectFiles);
    qb.push(" ORDER BY project_files.created_at DESC, project_files.rowid DESC");
    Ok(qb.build_query_as::<ProjectFile>().fetch_all(&mut *conn).await?)
}

pub async fn recent(conn: &mut SqliteConnection, scope: &Scope, limit: i64) -> AppResult<Vec<ProjectFile>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM project_files WHERE 1 = 1", COLUMNS));
    scope.push_filter(&mut qb, ScopedTable::ProjectFiles);
    qb.push(" ORDER BY project_files.created_at DESC, project_files.rowid DESC LIMIT ");
    qb.push_bind(limit);
    Ok(qb.build_query_as::<ProjectFile>().fetch_all(&mut *conn).await?)
}

/// Storage keys of every file on a project, for cleanup before the rows cascade away
pub async fn storage_paths_for_project(
    conn: &mut SqliteConnection,
    scope: &Scope,
    project_id: Uuid,
) -> AppResult<Vec<String>> {
    let mut qb = QueryBuilder::new(
        "SELECT project_files.storage_path FROM project_files WHERE project_files.project_id = ",
    );
    qb.push_bind(project_id);
    scope.push_filter(&mut qb, ScopedTable::ProjectFiles);
    Ok(qb.build_query_scalar::<String>().fetch_all(&mut *conn).await?)
}

/// Storage keys of every file under any project of a client
pub async fn storage_paths_for_client(
    conn: &mut SqliteConnection,
    scope: &Scope,
    client_id: Uuid,
) -> AppResult<Vec<String>> {
    let mut qb = QueryBuilder::new(
        "SELECT project_files.storage_path FROM project_files \
         WHERE project_files.project_id IN (SELECT owned.id FROM projects owned WHERE owned.client_id = ",
    );
    qb.push_bind(client_id);
    qb.push(")");
    scope.push_filter(&mut qb, ScopedTable::ProjectFiles);
    Ok(qb.build_query_scalar::<String>().fetch_all(&mut *conn).await?)
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<ProjectFile>> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM project_files WHERE project_files.id = ",
        COLUMNS
    ));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::ProjectFiles);
    Ok(qb.build_query_as::<ProjectFile>().fetch_optional(&mut *conn).await?)
}

pub async fn insert(conn: &mut SqliteConnection, file: &ProjectFile) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO project_files (id, organization_id, project_id, uploaded_by_user_id, uploader_type, file_type,
                                    original_name, storage_path, mime_type, size_bytes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(file.id)
    .bind(file.organization_id)
    .bind(file.project_id)
    .bind(file.uploaded_by_user_id)
    .bind(file.uploader_type)
    .bind(file.file_type)
    .bind(&file.original_name)
    .bind(&file.storage_path)
    .bind(&file.mime_type)
    .bind(file.size_bytes)
    .bind(file.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM project_files WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
