use chrono::Utc;
use shared::Role;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::User;
use crate::error::AppResult;
use crate::identity::SystemContext;

const COLUMNS: &str =
    "id, organization_id, name, email, password_hash, role, is_active, created_at, updated_at";

pub async fn insert(conn: &mut SqliteConnection, user: &User) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO users (id, organization_id, name, email, password_hash, role, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(user.organization_id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Look a user up regardless of organization
pub async fn find(
    conn: &mut SqliteConnection,
    _ctx: &SystemContext,
    id: Uuid,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

pub async fn email_taken(conn: &mut SqliteConnection, email: &str) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
        .bind(email)
        .fetch_one(&mut *conn)
        .await?;
    Ok(taken)
}

/// A user inside one organization
pub async fn find_member(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    id: Uuid,
) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ? AND organization_id = ?",
        COLUMNS
    ))
    .bind(id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user)
}

pub async fn list_members(conn: &mut SqliteConnection, organization_id: Uuid) -> AppResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE organization_id = ? ORDER BY name, rowid",
        COLUMNS
    ))
    .bind(organization_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(users)
}

/// Ids among `candidates` that are Owner or Staff members of the organization
pub async fn staff_member_ids(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    candidates: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = sqlx::QueryBuilder::new(
        "SELECT id FROM users WHERE organization_id = ",
    );
    qb.push_bind(organization_id);
    qb.push(" AND role IN ('Owner', 'Staff') AND id IN (");
    let mut ids = qb.separated(", ");
    for id in candidates {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");

    let found = qb.build_query_scalar::<Uuid>().fetch_all(&mut *conn).await?;
    Ok(found)
}

pub async fn owner_ids(conn: &mut SqliteConnection, organization_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM users WHERE organization_id = ? AND role = 'Owner' AND is_active = 1",
    )
    .bind(organization_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Attach a user to an organization with a role. Guarded on the user having
/// no organization yet; returns false when the guard fails.
pub async fn attach_organization(
    conn: &mut SqliteConnection,
    id: Uuid,
    organization_id: Uuid,
    role: Role,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE users SET organization_id = ?, role = ?, updated_at = ? WHERE id = ? AND organization_id IS NULL",
    )
    .bind(organization_id)
    .bind(role)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Role and active flag of a non-Owner member. Owners are never touched here.
pub async fn update_membership(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    id: Uuid,
    role: Role,
    is_active: bool,
) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE users SET role = ?, is_active = ?, updated_at = ?
         WHERE id = ? AND organization_id = ? AND (role IS NULL OR role <> 'Owner')",
    )
    .bind(role)
    .bind(is_active)
    .bind(Utc::now())
    .bind(id)
    .bind(organization_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
