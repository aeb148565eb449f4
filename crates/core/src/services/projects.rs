use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{ProjectPriority, ProjectStatus};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::Changes;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, projects::ProjectFilter, Project};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::pagination::{PaginatedResult, Pagination};
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInput {
    pub client_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Owner/Staff members assigned to the project
    #[serde(default)]
    pub staff_ids: Vec<Uuid>,
}

/// Quick edit from the project header
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMetaInput {
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub staff_ids: Vec<Uuid>,
    pub can_manage: bool,
}

/// Load a project the actor may view, or not-found
pub(crate) async fn load(conn: &mut SqliteConnection, actor: &Actor, id: Uuid) -> AppResult<Project> {
    let project = db::projects::find(conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("project"))?;
    authorize(policy::project::view(actor, &project), "project")?;
    Ok(project)
}

pub async fn list(
    state: &AppState,
    actor: &Actor,
    filter: &ProjectFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Project>> {
    actor.require_organization()?;
    if !policy::project::view_any(actor) {
        return Err(AppError::forbidden("projects"));
    }
    let mut conn = state.db.pool().acquire().await?;
    db::projects::list(&mut conn, &actor.scope(), filter, page).await
}

pub async fn get(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<ProjectView> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let project = load(&mut conn, actor, id).await?;
    let staff_ids = db::projects::staff_ids(&mut conn, project.id).await?;
    Ok(ProjectView {
        can_manage: policy::project::update(actor, &project),
        project,
        staff_ids,
    })
}

struct ValidProject {
    title: String,
    description: Option<String>,
    staff_ids: Vec<Uuid>,
}

async fn validate_input(
    conn: &mut SqliteConnection,
    actor: &Actor,
    organization_id: Uuid,
    input: &ProjectInput,
) -> AppResult<ValidProject> {
    let mut errors = ValidationErrors::new();
    let title = validate::required(&mut errors, "title", &input.title, 255);
    let description = validate::optional(&mut errors, "description", input.description.as_deref(), 10_000);

    if db::clients::find(conn, &actor.scope(), input.client_id).await?.is_none() {
        errors.add("client_id", "The selected client is invalid.");
    }

    let mut staff_ids = input.staff_ids.clone();
    staff_ids.sort();
    staff_ids.dedup();
    let valid = db::users::staff_member_ids(conn, organization_id, &staff_ids).await?;
    if valid.len() != staff_ids.len() {
        errors.add("staff_ids", "Assigned staff must be Owner or Staff members of this organization.");
    }
    errors.into_result()?;

    Ok(ValidProject {
        title,
        description,
        staff_ids,
    })
}

pub async fn create(state: &AppState, actor: &Actor, input: ProjectInput) -> AppResult<ProjectView> {
    let organization_id = actor.require_staff()?;
    if !policy::project::create(actor) {
        return Err(AppError::forbidden("projects"));
    }

    let mut tx = state.db.begin().await?;
    let valid = validate_input(&mut tx, actor, organization_id, &input).await?;

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        organization_id,
        client_id: input.client_id,
        created_by_user_id: Some(actor.user_id()),
        title: valid.title,
        description: valid.description,
        status: input.status,
        priority: input.priority,
        due_date: input.due_date,
        created_at: now,
        updated_at: now,
    };
    db::projects::insert(&mut tx, &project).await?;
    db::projects::replace_staff(&mut tx, organization_id, project.id, &valid.staff_ids).await?;
    tx.commit().await?;

    Activity::new(organization_id, &project, ActivityEvent::ProjectCreated)
        .by(actor)
        .with(json!({ "title": project.title, "status": project.status }))
        .record_best_effort(&state.db)
        .await;

    Ok(ProjectView {
        project,
        staff_ids: valid.staff_ids,
        can_manage: true,
    })
}

/// Status changes are logged as `project.status_changed`, anything else as `project.updated`
async fn record_update(state: &AppState, actor: &Actor, before: &Project, after: &Project, staff_changed: bool) {
    let mut changes = Changes::default();
    changes.track("title", &before.title, &after.title);
    changes.track("description", &before.description, &after.description);
    changes.track("client_id", &before.client_id, &after.client_id);
    changes.track("priority", &before.priority, &after.priority);
    changes.track("due_date", &before.due_date, &after.due_date);

    let activity = if before.status != after.status {
        let mut details = json!({ "from": before.status, "to": after.status });
        if !changes.is_empty() {
            details["changes"] = changes.into_value();
        }
        Activity::new(after.organization_id, after, ActivityEvent::ProjectStatusChanged).with(details)
    } else {
        let mut details = changes.into_value();
        if staff_changed {
            details["staff"] = json!(true);
        }
        Activity::new(after.organization_id, after, ActivityEvent::ProjectUpdated).with(details)
    };
    activity.by(actor).record_best_effort(&state.db).await;
}

pub async fn update(state: &AppState, actor: &Actor, id: Uuid, input: ProjectInput) -> AppResult<ProjectView> {
    actor.require_staff()?;

    let mut tx = state.db.begin().await?;
    let before = load(&mut tx, actor, id).await?;
    authorize(policy::project::update(actor, &before), "project")?;
    let valid = validate_input(&mut tx, actor, before.organization_id, &input).await?;

    let after = Project {
        client_id: input.client_id,
        title: valid.title,
        description: valid.description,
        status: input.status,
        priority: input.priority,
        due_date: input.due_date,
        ..before.clone()
    };
    let staff_before = db::projects::staff_ids(&mut tx, before.id).await?;
    db::projects::update(&mut tx, &after).await?;
    db::projects::replace_staff(&mut tx, after.organization_id, after.id, &valid.staff_ids).await?;
    tx.commit().await?;

    let mut sorted_before = staff_before;
    sorted_before.sort();
    record_update(state, actor, &before, &after, sorted_before != valid.staff_ids).await;

    Ok(ProjectView {
        project: after,
        staff_ids: valid.staff_ids,
        can_manage: true,
    })
}

pub async fn update_meta(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    input: ProjectMetaInput,
) -> AppResult<Project> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let before = load(&mut conn, actor, id).await?;
    authorize(policy::project::update(actor, &before), "project")?;

    let after = Project {
        status: input.status,
        priority: input.priority,
        due_date: input.due_date,
        ..before.clone()
    };
    db::projects::update(&mut conn, &after).await?;
    drop(conn);

    record_update(state, actor, &before, &after, false).await;
    Ok(after)
}

pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_staff()?;

    let scope = actor.scope();
    let mut tx = state.db.begin().await?;
    let project = load(&mut tx, actor, id).await?;
    authorize(policy::project::delete(actor, &project), "project")?;
    let keys = db::files::storage_paths_for_project(&mut tx, &scope, project.id).await?;
    db::projects::delete(&mut tx, project.id).await?;
    tx.commit().await?;

    for key in &keys {
        state.storage.delete_best_effort(key).await;
    }

    Activity::new(project.organization_id, &project, ActivityEvent::ProjectDeleted)
        .by(actor)
        .with(json!({ "title": project.title }))
        .record_best_effort(&state.db)
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn input(client_id: Uuid, title: &str) -> ProjectInput {
        ProjectInput {
            client_id,
            title: title.into(),
            description: None,
            status: ProjectStatus::Draft,
            priority: ProjectPriority::Medium,
            due_date: None,
            staff_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_staff() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let staff = fx.staff(org).await;
        let client = fx.client(&owner, "Globex").await;

        let view = create(
            &fx.state,
            &owner,
            ProjectInput {
                staff_ids: vec![staff.user_id(), staff.user_id()],
                ..input(client.id, "Website")
            },
        )
        .await
        .unwrap();
        assert_eq!(view.staff_ids, vec![staff.user_id()]);
        assert_eq!(get(&fx.state, &staff, view.project.id).await.unwrap().staff_ids, vec![staff.user_id()]);
        assert_eq!(fx.events(org).await, vec!["project.created"]);
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_client_and_portal_staff() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let other_org = fx.organization("Initech").await;
        let owner = fx.owner(org).await;
        let other_owner = fx.owner(other_org).await;
        let foreign_client = fx.client(&other_owner, "Umbrella").await;
        let client = fx.client(&owner, "Globex").await;
        let portal = fx.portal_user(org, Some(client.id)).await;

        let err = create(&fx.state, &owner, input(foreign_client.id, "Website")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("client_id")));

        let err = create(
            &fx.state,
            &owner,
            ProjectInput {
                staff_ids: vec![portal.user_id()],
                ..input(client.id, "Website")
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("staff_ids")));
    }

    #[tokio::test]
    async fn test_status_change_is_logged_separately() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;
        let project = fx.project(&owner, client.id, "Website").await;

        update_meta(
            &fx.state,
            &owner,
            project.id,
            ProjectMetaInput {
                status: ProjectStatus::Delivered,
                priority: project.priority,
                due_date: None,
            },
        )
        .await
        .unwrap();

        update(
            &fx.state,
            &owner,
            project.id,
            ProjectInput {
                status: ProjectStatus::Delivered,
                ..input(client.id, "Website v2")
            },
        )
        .await
        .unwrap();

        assert_eq!(fx.events(org).await, vec!["project.status_changed", "project.updated"]);
    }

    #[tokio::test]
    async fn test_list_orders_by_due_date_then_title() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;

        let due = |d: u32| NaiveDate::from_ymd_opt(2026, 11, d);
        for (title, due_date) in [("Undated", None), ("Later", due(20)), ("Sooner", due(5)), ("Also soon", due(5))] {
            create(&fx.state, &owner, ProjectInput { due_date, ..input(client.id, title) })
                .await
                .unwrap();
        }

        let page = list(&fx.state, &owner, &ProjectFilter::default(), Pagination::default())
            .await
            .unwrap();
        let titles: Vec<&str> = page.items.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Also soon", "Sooner", "Later", "Undated"]);
    }

    #[tokio::test]
    async fn test_client_cannot_manage_projects() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;
        let portal = fx.portal_user(org, Some(client.id)).await;
        let project = fx.project(&owner, client.id, "Website").await;

        assert!(!get(&fx.state, &portal, project.id).await.unwrap().can_manage);
        assert!(matches!(
            create(&fx.state, &portal, input(client.id, "Nope")).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(delete(&fx.state, &portal, project.id).await, Err(AppError::Forbidden(_))));
    }
}
