use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use shared::{InvoiceStatus, ProjectStatus};
use uuid::Uuid;

use crate::db::{self, activity::ActivityFilter, invoices::InvoiceFilter, projects::ProjectFilter, ActivityLog};
use crate::error::AppResult;
use crate::identity::Actor;
use crate::pagination::Pagination;
use crate::state::AppState;

const RECENT_ACTIVITY: u64 = 10;
const DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub active_projects: i64,
    pub waiting_on_client: i64,
    /// Unfinished tasks due between today and a week from now
    pub tasks_due_soon: i64,
    pub draft_invoices: i64,
    pub sent_invoices: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    #[serde(flatten)]
    pub entry: ActivityLog,
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffDashboard {
    pub stats: DashboardStats,
    pub recent_activity: Vec<RecentActivity>,
}

/// Workload counts and the latest audit entries of the actor's organization
pub async fn staff(state: &AppState, actor: &Actor) -> AppResult<StaffDashboard> {
    let organization_id = actor.require_staff()?;
    let scope = actor.scope();
    let mut conn = state.db.pool().acquire().await?;

    let projects_in = |status| ProjectFilter {
        status: Some(status),
        ..Default::default()
    };
    let invoices_in = |statuses: &[InvoiceStatus]| InvoiceFilter {
        statuses: statuses.to_vec(),
        ..Default::default()
    };

    let today = Utc::now().date_naive();
    let stats = DashboardStats {
        active_projects: db::projects::count(&mut conn, &scope, &projects_in(ProjectStatus::Active)).await?,
        waiting_on_client: db::projects::count(&mut conn, &scope, &projects_in(ProjectStatus::WaitingOnClient)).await?,
        tasks_due_soon: db::tasks::count_due_between(&mut conn, &scope, today, today + Duration::days(DUE_SOON_DAYS))
            .await?,
        draft_invoices: db::invoices::count(&mut conn, &scope, &invoices_in(&[InvoiceStatus::Draft])).await?,
        sent_invoices: db::invoices::count(
            &mut conn,
            &scope,
            &invoices_in(&[InvoiceStatus::Sent, InvoiceStatus::Overdue]),
        )
        .await?,
    };

    let recent = db::activity::list(
        &mut conn,
        &scope,
        &ActivityFilter::default(),
        Pagination::page(1, RECENT_ACTIVITY),
    )
    .await?;

    let mut names: HashMap<Uuid, Option<String>> = HashMap::new();
    let mut recent_activity = Vec::with_capacity(recent.items.len());
    for entry in recent.items {
        let actor_name = match entry.actor_user_id {
            Some(id) => {
                if !names.contains_key(&id) {
                    let member = db::users::find_member(&mut conn, organization_id, id).await?;
                    names.insert(id, member.map(|m| m.name));
                }
                names.get(&id).cloned().flatten()
            }
            None => None,
        };
        recent_activity.push(RecentActivity { entry, actor_name });
    }

    Ok(StaffDashboard { stats, recent_activity })
}
