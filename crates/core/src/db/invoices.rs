use chrono::{NaiveDate, Utc};
use shared::InvoiceStatus;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{Invoice, InvoiceItem};
use crate::error::AppResult;
use crate::identity::SystemContext;
use crate::pagination::{PaginatedResult, Pagination};
use crate::scope::{Scope, ScopedTable};

const COLUMNS: &str = "invoices.id, invoices.organization_id, invoices.client_id, invoices.project_id, \
                       invoices.created_by_user_id, invoices.number, invoices.status, invoices.issued_at, \
                       invoices.due_at, invoices.subtotal, invoices.total, invoices.notes, invoices.created_at, \
                       invoices.updated_at";

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    /// Matches the invoice number or the client's name
    pub search: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    /// Restrict to any of these statuses
    pub statuses: Vec<InvoiceStatus>,
}

fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, scope: &Scope, filter: &InvoiceFilter) {
    qb.push(" WHERE 1 = 1");
    scope.push_filter(qb, ScopedTable::Invoices);
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (invoices.number LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(
            " OR EXISTS (SELECT 1 FROM clients WHERE clients.id = invoices.client_id \
             AND clients.organization_id = invoices.organization_id AND clients.name LIKE ",
        );
        qb.push_bind(pattern);
        qb.push("))");
    }
    if let Some(status) = filter.status {
        qb.push(" AND invoices.status = ");
        qb.push_bind(status);
    }
    if !filter.statuses.is_empty() {
        qb.push(" AND invoices.status IN (");
        let mut statuses = qb.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(*status);
        }
        statuses.push_unseparated(")");
    }
    if let Some(client_id) = filter.client_id {
        qb.push(" AND invoices.client_id = ");
        qb.push_bind(client_id);
    }
}

/// Newest first
pub async fn list(
    conn: &mut SqliteConnection,
    scope: &Scope,
    filter: &InvoiceFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Invoice>> {
    let total = count(conn, scope, filter).await?;

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM invoices", COLUMNS));
    push_conditions(&mut qb, scope, filter);
    qb.push(" ORDER BY invoices.created_at DESC, invoices.rowid DESC LIMIT ");
    qb.push_bind(page.sql_limit());
    qb.push(" OFFSET ");
    qb.push_bind(page.sql_offset());
    let items = qb.build_query_as::<Invoice>().fetch_all(&mut *conn).await?;

    Ok(PaginatedResult::new(items, total, page))
}

pub async fn count(conn: &mut SqliteConnection, scope: &Scope, filter: &InvoiceFilter) -> AppResult<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM invoices");
    push_conditions(&mut qb, scope, filter);
    Ok(qb.build_query_scalar().fetch_one(&mut *conn).await?)
}

pub async fn find(conn: &mut SqliteConnection, scope: &Scope, id: Uuid) -> AppResult<Option<Invoice>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM invoices WHERE invoices.id = ", COLUMNS));
    qb.push_bind(id);
    scope.push_filter(&mut qb, ScopedTable::Invoices);
    Ok(qb.build_query_as::<Invoice>().fetch_optional(&mut *conn).await?)
}

/// Items of an invoice that was already loaded through a scope
pub async fn items(conn: &mut SqliteConnection, invoice: &Invoice) -> AppResult<Vec<InvoiceItem>> {
    let items = sqlx::query_as::<_, InvoiceItem>(
        "SELECT id, organization_id, invoice_id, description, quantity, unit_price, line_total, position, created_at
         FROM invoice_items WHERE invoice_id = ? AND organization_id = ? ORDER BY position, rowid",
    )
    .bind(invoice.id)
    .bind(invoice.organization_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO invoices (id, organization_id, client_id, project_id, created_by_user_id, number, status,
                               issued_at, due_at, subtotal, total, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice.id)
    .bind(invoice.organization_id)
    .bind(invoice.client_id)
    .bind(invoice.project_id)
    .bind(invoice.created_by_user_id)
    .bind(&invoice.number)
    .bind(invoice.status)
    .bind(invoice.issued_at)
    .bind(invoice.due_at)
    .bind(invoice.subtotal)
    .bind(invoice.total)
    .bind(&invoice.notes)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Replace the content of a Draft invoice. Returns false if it is no longer a Draft.
pub async fn update_draft(conn: &mut SqliteConnection, invoice: &Invoice) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE invoices SET client_id = ?, project_id = ?, issued_at = ?, due_at = ?, subtotal = ?, total = ?,
                             notes = ?, updated_at = ?
         WHERE id = ? AND organization_id = ? AND status = 'Draft'",
    )
    .bind(invoice.client_id)
    .bind(invoice.project_id)
    .bind(invoice.issued_at)
    .bind(invoice.due_at)
    .bind(invoice.subtotal)
    .bind(invoice.total)
    .bind(&invoice.notes)
    .bind(Utc::now())
    .bind(invoice.id)
    .bind(invoice.organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &InvoiceItem) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO invoice_items (id, organization_id, invoice_id, description, quantity, unit_price, line_total,
                                    position, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(item.id)
    .bind(item.organization_id)
    .bind(item.invoice_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.line_total)
    .bind(item.position)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_items(conn: &mut SqliteConnection, invoice_id: Uuid) -> AppResult<()> {
    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = ?")
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Move an invoice to `to` only if its current status is one of `from`.
///
/// Returns false when the guard did not match, in which case nothing changed.
pub async fn transition(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: &[InvoiceStatus],
    to: InvoiceStatus,
    issued_at: Option<NaiveDate>,
) -> AppResult<bool> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE invoices SET status = ");
    qb.push_bind(to);
    qb.push(", issued_at = COALESCE(issued_at, ");
    qb.push_bind(issued_at);
    qb.push("), updated_at = ");
    qb.push_bind(Utc::now());
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(" AND status IN (");
    let mut statuses = qb.separated(", ");
    for status in from {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(")");

    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Lexicographically last number in the organization starting with `prefix`
pub async fn last_number_with_prefix(
    conn: &mut SqliteConnection,
    _ctx: &SystemContext,
    organization_id: Uuid,
    prefix: &str,
) -> AppResult<Option<String>> {
    let number = sqlx::query_scalar::<_, String>(
        "SELECT number FROM invoices WHERE organization_id = ? AND substr(number, 1, ?) = ?
         ORDER BY number DESC LIMIT 1",
    )
    .bind(organization_id)
    .bind(prefix.chars().count() as i64)
    .bind(prefix)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(number)
}

pub async fn number_exists(
    conn: &mut SqliteConnection,
    _ctx: &SystemContext,
    organization_id: Uuid,
    number: &str,
) -> AppResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM invoices WHERE organization_id = ? AND number = ?)",
    )
    .bind(organization_id)
    .bind(number)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}
