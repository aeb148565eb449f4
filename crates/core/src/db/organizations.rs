use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::Organization;
use crate::error::AppResult;

const COLUMNS: &str = "id, name, brand_color, logo_path, invoice_prefix, invoice_due_days_default, \
                       billing_email, created_at, updated_at";

pub async fn insert(conn: &mut SqliteConnection, org: &Organization) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO organizations (id, name, brand_color, logo_path, invoice_prefix, invoice_due_days_default,
                                    billing_email, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(org.id)
    .bind(&org.name)
    .bind(&org.brand_color)
    .bind(&org.logo_path)
    .bind(&org.invoice_prefix)
    .bind(org.invoice_due_days_default)
    .bind(&org.billing_email)
    .bind(org.created_at)
    .bind(org.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Option<Organization>> {
    let org = sqlx::query_as::<_, Organization>(&format!(
        "SELECT {} FROM organizations WHERE id = ?",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(org)
}

/// Persist the editable settings columns
pub async fn update_settings(conn: &mut SqliteConnection, org: &Organization) -> AppResult<()> {
    sqlx::query(
        "UPDATE organizations
         SET name = ?, brand_color = ?, logo_path = ?, invoice_prefix = ?, invoice_due_days_default = ?,
             billing_email = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&org.name)
    .bind(&org.brand_color)
    .bind(&org.logo_path)
    .bind(&org.invoice_prefix)
    .bind(org.invoice_due_days_default)
    .bind(&org.billing_email)
    .bind(Utc::now())
    .bind(org.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
