use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::Notification;
use uuid::Uuid;

use super::projects;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, Comment};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::notify;
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::validate;

const MAX_BODY_CHARS: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub body: String,
}

pub async fn list(state: &AppState, actor: &Actor, project_id: Uuid) -> AppResult<Vec<Comment>> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    db::comments::list_for_project(&mut conn, &actor.scope(), project.id).await
}

/// Post to a project thread. Client comments notify owners and project staff.
pub async fn post(state: &AppState, actor: &Actor, project_id: Uuid, input: CommentInput) -> AppResult<Comment> {
    let organization_id = actor.require_organization()?;

    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    authorize(policy::comment::create(actor, &project), "project")?;

    let mut errors = ValidationErrors::new();
    let body = validate::required(&mut errors, "body", &input.body, MAX_BODY_CHARS);
    errors.into_result()?;

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4(),
        organization_id,
        project_id: project.id,
        user_id: Some(actor.user_id()),
        author_type: actor.kind(),
        body,
        created_at: now,
        updated_at: now,
    };
    db::comments::insert(&mut conn, &comment).await?;

    let recipients = if actor.is_client() {
        notify::staff_recipients_best_effort(&mut conn, organization_id, project.id, actor.user_id()).await
    } else {
        Vec::new()
    };
    drop(conn);

    Activity::new(organization_id, &comment, ActivityEvent::CommentPosted)
        .by(actor)
        .with(json!({ "project_id": project.id, "author_type": comment.author_type }))
        .record_best_effort(&state.db)
        .await;

    if !recipients.is_empty() {
        state.notifier.notify(
            &recipients,
            &Notification::project_commented(project.id, project.title.as_str(), comment.id, &comment.body),
        );
    }

    Ok(comment)
}

pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let comment = db::comments::find(&mut conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("comment"))?;
    authorize(policy::comment::delete(actor, &comment), "comment")?;
    db::comments::delete(&mut conn, comment.id).await?;
    drop(conn);

    Activity::new(comment.organization_id, &comment, ActivityEvent::CommentDeleted)
        .by(actor)
        .with(json!({ "project_id": comment.project_id }))
        .record_best_effort(&state.db)
        .await;
    Ok(())
}
