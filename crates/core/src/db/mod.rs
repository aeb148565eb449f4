use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Sqlite, SqlitePool, Transaction};
use std::path::Path;

mod models;

pub mod activity;
pub mod clients;
pub mod comments;
pub mod files;
pub mod invoices;
pub mod organizations;
pub mod projects;
pub mod tasks;
pub mod users;

pub use models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

// Ids are stored as 16-byte BLOBs (sqlx's SQLite encoding for Uuid).
// Timestamps are always bound from Rust so every row uses the same format.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        brand_color TEXT,
        logo_path TEXT,
        invoice_prefix TEXT NOT NULL DEFAULT 'INV',
        invoice_due_days_default INTEGER NOT NULL DEFAULT 14,
        billing_email TEXT,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        organization_id BLOB REFERENCES organizations(id),
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        notes TEXT,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        UNIQUE (organization_id, email)
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS clients_user_id_unique ON clients(user_id) WHERE user_id IS NOT NULL",
    r#"
    CREATE TRIGGER IF NOT EXISTS clients_organization_immutable
    BEFORE UPDATE OF organization_id ON clients
    WHEN NEW.organization_id IS NOT OLD.organization_id
    BEGIN
        SELECT RAISE(ABORT, 'clients.organization_id is immutable');
    END
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        client_id BLOB NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        created_by_user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        priority TEXT NOT NULL,
        due_date DATE,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS projects_organization_status ON projects(organization_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS project_user (
        project_id BLOB NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        created_at DATETIME NOT NULL,
        PRIMARY KEY (project_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        project_id BLOB NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        assigned_to_user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        due_date DATE,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        deleted_at DATETIME
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tasks_project ON tasks(organization_id, project_id)",
    r#"
    CREATE TABLE IF NOT EXISTS project_files (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        project_id BLOB NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        uploaded_by_user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        uploader_type TEXT NOT NULL,
        file_type TEXT NOT NULL,
        original_name TEXT NOT NULL,
        storage_path TEXT NOT NULL,
        mime_type TEXT,
        size_bytes INTEGER NOT NULL,
        created_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        project_id BLOB NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        author_type TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        client_id BLOB NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
        project_id BLOB REFERENCES projects(id) ON DELETE SET NULL,
        created_by_user_id BLOB REFERENCES users(id) ON DELETE SET NULL,
        number TEXT NOT NULL,
        status TEXT NOT NULL,
        issued_at DATE,
        due_at DATE,
        subtotal INTEGER NOT NULL DEFAULT 0,
        total INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        UNIQUE (organization_id, number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_items (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        invoice_id BLOB NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        description TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price INTEGER NOT NULL,
        line_total INTEGER NOT NULL,
        position INTEGER NOT NULL,
        created_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_logs (
        id BLOB PRIMARY KEY,
        organization_id BLOB NOT NULL REFERENCES organizations(id),
        actor_user_id BLOB,
        actor_type TEXT NOT NULL,
        subject_type TEXT NOT NULL,
        subject_id BLOB NOT NULL,
        event TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS activity_logs_organization ON activity_logs(organization_id, created_at)",
    r#"
    CREATE TRIGGER IF NOT EXISTS activity_logs_no_update
    BEFORE UPDATE ON activity_logs
    BEGIN
        SELECT RAISE(ABORT, 'activity_logs are append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS activity_logs_no_delete
    BEFORE DELETE ON activity_logs
    BEGIN
        SELECT RAISE(ABORT, 'activity_logs are append-only');
    END
    "#,
];

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        tracing::info!(path, "Database pool opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed");
        Ok(())
    }
}
