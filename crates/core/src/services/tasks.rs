use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use shared::TaskStatus;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{projects, Changes};
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, tasks::TaskFilter, Project, Task};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_to_user_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// A task together with the project it was loaded through
async fn load(conn: &mut SqliteConnection, actor: &Actor, id: Uuid) -> AppResult<(Task, Project)> {
    let task = db::tasks::find(conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("task"))?;
    let project = db::projects::find(conn, &actor.scope(), task.project_id)
        .await?
        .ok_or_else(|| AppError::not_found("task"))?;
    authorize(policy::task::view(actor, &task, &project), "task")?;
    Ok((task, project))
}

/// Live tasks of a project. Portal clients see the tasks of their own projects.
pub async fn list(
    state: &AppState,
    actor: &Actor,
    project_id: Uuid,
    filter: &TaskFilter,
) -> AppResult<Vec<Task>> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    db::tasks::list_for_project(&mut conn, &actor.scope(), project.id, filter).await
}

pub async fn get(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<Task> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let (task, _) = load(&mut conn, actor, id).await?;
    Ok(task)
}

struct ValidTask {
    title: String,
    description: Option<String>,
}

async fn validate_input(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    input: &TaskInput,
) -> AppResult<ValidTask> {
    let mut errors = ValidationErrors::new();
    let title = validate::required(&mut errors, "title", &input.title, 255);
    let description = validate::optional(&mut errors, "description", input.description.as_deref(), 10_000);

    if let Some(assignee) = input.assigned_to_user_id {
        if db::users::staff_member_ids(conn, organization_id, &[assignee]).await?.is_empty() {
            errors.add("assigned_to_user_id", "Tasks can only be assigned to Owner or Staff members.");
        }
    }
    errors.into_result()?;

    Ok(ValidTask { title, description })
}

pub async fn create(state: &AppState, actor: &Actor, project_id: Uuid, input: TaskInput) -> AppResult<Task> {
    let organization_id = actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    authorize(policy::task::create(actor, &project), "project")?;
    let valid = validate_input(&mut conn, organization_id, &input).await?;

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        organization_id,
        project_id: project.id,
        assigned_to_user_id: input.assigned_to_user_id,
        title: valid.title,
        description: valid.description,
        status: input.status,
        due_date: input.due_date,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    db::tasks::insert(&mut conn, &task).await?;
    drop(conn);

    Activity::new(organization_id, &task, ActivityEvent::TaskCreated)
        .by(actor)
        .with(json!({ "title": task.title, "project_id": project.id, "status": task.status }))
        .record_best_effort(&state.db)
        .await;

    Ok(task)
}

async fn record_update(state: &AppState, actor: &Actor, before: &Task, after: &Task) {
    let mut changes = Changes::default();
    changes.track("title", &before.title, &after.title);
    changes.track("description", &before.description, &after.description);
    changes.track("assigned_to_user_id", &before.assigned_to_user_id, &after.assigned_to_user_id);
    changes.track("due_date", &before.due_date, &after.due_date);

    let activity = if before.status != after.status {
        let mut details = json!({ "from": before.status, "to": after.status });
        if !changes.is_empty() {
            details["changes"] = changes.into_value();
        }
        Activity::new(after.organization_id, after, ActivityEvent::TaskStatusChanged).with(details)
    } else {
        Activity::new(after.organization_id, after, ActivityEvent::TaskUpdated).with(changes.into_value())
    };
    activity.by(actor).record_best_effort(&state.db).await;
}

pub async fn update(state: &AppState, actor: &Actor, id: Uuid, input: TaskInput) -> AppResult<Task> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let (before, _) = load(&mut conn, actor, id).await?;
    authorize(policy::task::update(actor, &before), "task")?;
    let valid = validate_input(&mut conn, before.organization_id, &input).await?;

    let after = Task {
        title: valid.title,
        description: valid.description,
        status: input.status,
        assigned_to_user_id: input.assigned_to_user_id,
        due_date: input.due_date,
        ..before.clone()
    };
    db::tasks::update(&mut conn, &after).await?;
    drop(conn);

    record_update(state, actor, &before, &after).await;
    Ok(after)
}

/// Board drag-and-drop: change only the status
pub async fn update_status(state: &AppState, actor: &Actor, id: Uuid, status: TaskStatus) -> AppResult<Task> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let (before, _) = load(&mut conn, actor, id).await?;
    authorize(policy::task::update(actor, &before), "task")?;
    if before.status == status {
        return Ok(before);
    }

    let after = Task {
        status,
        ..before.clone()
    };
    db::tasks::update(&mut conn, &after).await?;
    drop(conn);

    record_update(state, actor, &before, &after).await;
    Ok(after)
}

/// Soft delete. The row stays for the audit trail but disappears from every read.
pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let (task, _) = load(&mut conn, actor, id).await?;
    authorize(policy::task::delete(actor, &task), "task")?;
    db::tasks::soft_delete(&mut conn, task.id, Utc::now()).await?;
    drop(conn);

    Activity::new(task.organization_id, &task, ActivityEvent::TaskDeleted)
        .by(actor)
        .with(json!({ "title": task.title }))
        .record_best_effort(&state.db)
        .await;
    Ok(())
}
