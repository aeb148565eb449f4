use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{InvoiceStatus, ProjectStatus};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::{self, invoices::InvoiceFilter, projects::ProjectFilter};
use crate::error::AppResult;
use crate::identity::Actor;
use crate::scope::Scope;
use crate::state::AppState;

const RECENT_UPDATES: usize = 10;
const MESSAGE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Comment,
    File,
}

/// One line of the "recent updates" feed
#[derive(Debug, Clone, Serialize)]
pub struct PortalUpdate {
    pub kind: UpdateKind,
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_title: Option<String>,
    pub title: &'static str,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalDashboard {
    pub active_projects: i64,
    pub outstanding_invoices: i64,
    pub updates: Vec<PortalUpdate>,
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

async fn project_titles(
    conn: &mut SqliteConnection,
    scope: &Scope,
    ids: impl IntoIterator<Item = Uuid>,
) -> AppResult<HashMap<Uuid, String>> {
    let mut titles = HashMap::new();
    for id in ids {
        if titles.contains_key(&id) {
            continue;
        }
        if let Some(project) = db::projects::find(conn, scope, id).await? {
            titles.insert(id, project.title);
        }
    }
    Ok(titles)
}

/// Counts and the latest comments and files across the client's projects
pub async fn dashboard(state: &AppState, actor: &Actor) -> AppResult<PortalDashboard> {
    actor.require_client()?;
    let scope = actor.scope();
    let mut conn = state.db.pool().acquire().await?;

    let active_projects = db::projects::count(
        &mut conn,
        &scope,
        &ProjectFilter {
            status: Some(ProjectStatus::Active),
            ..Default::default()
        },
    )
    .await?;
    let outstanding_invoices = db::invoices::count(
        &mut conn,
        &scope,
        &InvoiceFilter {
            statuses: vec![InvoiceStatus::Sent, InvoiceStatus::Overdue],
            ..Default::default()
        },
    )
    .await?;

    let limit = RECENT_UPDATES as i64;
    let comments = db::comments::recent(&mut conn, &scope, limit).await?;
    let files = db::files::recent(&mut conn, &scope, limit).await?;
    let project_ids: Vec<Uuid> = comments
        .iter()
        .map(|c| c.project_id)
        .chain(files.iter().map(|f| f.project_id))
        .collect();
    let titles = project_titles(&mut conn, &scope, project_ids).await?;

    let mut updates: Vec<PortalUpdate> = comments
        .into_iter()
        .map(|c| PortalUpdate {
            kind: UpdateKind::Comment,
            id: c.id,
            project_id: c.project_id,
            project_title: titles.get(&c.project_id).cloned(),
            title: "New comment",
            message: truncate(&c.body, MESSAGE_CHARS),
            created_at: c.created_at,
        })
        .chain(files.into_iter().map(|f| PortalUpdate {
            kind: UpdateKind::File,
            id: f.id,
            project_id: f.project_id,
            project_title: titles.get(&f.project_id).cloned(),
            title: "New file",
            message: format!("{} ({})", f.original_name, f.file_type),
            created_at: f.created_at,
        }))
        .collect();
    updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    updates.truncate(RECENT_UPDATES);

    Ok(PortalDashboard {
        active_projects,
        outstanding_invoices,
        updates,
    })
}
