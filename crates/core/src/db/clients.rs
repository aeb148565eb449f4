use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::Client;
use crate::error::AppResult;
use crate::identity::SystemContext;
use crate::pagination::{PaginatedResult, Pagination};
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "clients.id, clients.organization_id, clients.user_id, clients.name, clients.email, \
                       clients.phone, clients.notes, clients.created_at, clients.updated_at";

#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    /// Matches name or email
    pub search: Option<String>,
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: &Scope, filter: &ClientFilter) {
    qb.push(" WHERE 1 = 1");
    scope.push_filter(qb, ScopedTable::Clients);
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (clients.name LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR clients.email LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

pub async fn list(
    conn: &mut SqliteConnection,
    scope: &Scope,
    filter: &ClientFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Client>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM clients");
    push_conditions(&mut count, scope, filter);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM clients", COLUMNS));
    push_conditions(&mut qb, scope, filter);
    qb.push(" ORDER BY clients.name, clients.rowid LIMIT ");
    qb.push_bind(page.sql_limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.sql_offset());
    let items = qb.build_query_as::<Client>().fetch_all(&mut *conn).await?;

    Ok(PaginatedResult::new(items, total, page))
}

/// Every client visible in scope, for pickers
pub async fn list_all(conn: &mut SqliteConnection, scope: &Scope) -> AppResult<Vec<Client>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM clients", COLUMNS));
    push_conditions(&mut qb, scope, &ClientFilter::default());
    qb.push(" ORDER BY clients.name, clients.rowid");
    Ok(qb.build_query_as::<Client>().fetch_all(&mut *conn).await?)
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<Client>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM clients WHERE clients.id = ", COLUMNS));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::Clients);
    Ok(qb.build_query_as::<Client>().fetch_optional(&mut *conn).await?)
}

/// Client record a portal user is linked to inside their organization
pub async fn linked_client_id(
    conn: &mut SqliteConnection,
    _ctx: &SystemContext,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM clients WHERE organization_id = ? AND user_id = ? ORDER BY rowid LIMIT 1",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn email_taken(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM clients WHERE organization_id = ? AND email = ? AND (? IS NULL OR id <> ?))",
    )
    .bind(organization_id)
    .bind(email)
    .bind(except)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

pub async fn user_is_linked(conn: &mut SqliteConnection, user_id: Uuid) -> AppResult<bool> {
    let linked: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM clients WHERE user_id = ?)")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(linked)
}

pub async fn insert(conn: &mut SqliteConnection, client: &Client) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO clients (id, organization_id, user_id, name, email, phone, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(client.id)
    .bind(client.organization_id)
    .bind(client.user_id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(&client.notes)
    .bind(client.created_at)
    .bind(client.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Update the editable columns. `organization_id` is never written.
pub async fn update(conn: &mut SqliteConnection, client: &Client) -> AppResult<()> {
    sqlx::query(
        "UPDATE clients SET name = ?, email = ?, phone = ?, notes = ?, updated_at = ?
         WHERE id = ? AND organization_id = ?",
    )
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(&client.notes)
    .bind(Utc::now())
    .bind(client.id)
    .bind(client.organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Link a portal user. Guarded on the client having no link yet.
pub async fn link_user(conn: &mut SqliteConnection, client_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE clients SET user_id = ?, updated_at = ? WHERE id = ? AND user_id IS NULL",
    )
    .bind(user_id)
    .bind(Utc::now())
    .bind(client_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
