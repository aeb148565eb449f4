use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::{FileType, Notification};
use uuid::Uuid;

use super::projects;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, ProjectFile};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::notify;
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::storage::FileStorage;
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct UploadInput {
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub file_type: FileType,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

pub async fn list(state: &AppState, actor: &Actor, project_id: Uuid) -> AppResult<Vec<ProjectFile>> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    db::files::list_for_project(&mut conn, &actor.scope(), project.id).await
}

pub async fn upload(
    state: &AppState,
    actor: &Actor,
    project_id: Uuid,
    input: UploadInput,
) -> AppResult<ProjectFile> {
    let organization_id = actor.require_organization()?;

    let mut conn = state.db.pool().acquire().await?;
    let project = projects::load(&mut conn, actor, project_id).await?;
    authorize(policy::file::create(actor, &project), "project")?;
    drop(conn);

    let uploads = &state.config.uploads;
    let mut errors = ValidationErrors::new();
    if !FileType::allowed_for(actor.role()).contains(&input.file_type) {
        errors.add("file_type", "The selected file type is invalid.");
    }
    let original_name = validate::required(&mut errors, "file_name", &input.file_name, 255);
    let extension = validate::upload(
        &mut errors,
        "file",
        &original_name,
        input.bytes.len(),
        uploads.max_file_bytes,
        &uploads.allowed_extensions,
    );
    let mime_type = validate::optional(&mut errors, "mime_type", input.mime_type.as_deref(), 255);
    errors.into_result()?;
    let extension = extension.ok_or_else(|| AppError::Internal("upload extension missing".into()))?;

    let key = FileStorage::project_file_key(organization_id, project.id, &extension);
    state.storage.put(&key, &input.bytes).await?;

    let file = ProjectFile {
        id: Uuid::new_v4(),
        organization_id,
        project_id: project.id,
        uploaded_by_user_id: Some(actor.user_id()),
        uploader_type: actor.kind(),
        file_type: input.file_type,
        original_name,
        storage_path: key,
        mime_type,
        size_bytes: input.bytes.len() as i64,
        created_at: Utc::now(),
    };
    let mut conn = state.db.pool().acquire().await?;
    if let Err(e) = db::files::insert(&mut conn, &file).await {
        state.storage.delete_best_effort(&file.storage_path).await;
        return Err(e);
    }

    let recipients = if actor.is_client() && file.file_type == FileType::ClientUpload {
        notify::staff_recipients_best_effort(&mut conn, organization_id, project.id, actor.user_id()).await
    } else {
        Vec::new()
    };
    drop(conn);

    Activity::new(organization_id, &file, ActivityEvent::FileUploaded)
        .by(actor)
        .with(json!({
            "name": file.original_name,
            "project_id": project.id,
            "file_type": file.file_type,
            "size_bytes": file.size_bytes,
        }))
        .record_best_effort(&state.db)
        .await;

    if !recipients.is_empty() {
        state.notifier.notify(
            &recipients,
            &Notification::ClientUploadedFile {
                project_id: project.id,
                project_title: project.title.clone(),
                file_id: file.id,
                file_name: file.original_name.clone(),
            },
        );
    }

    Ok(file)
}

/// A file record with its stored bytes. Missing bytes read as not-found.
pub async fn download(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<(ProjectFile, Vec<u8>)> {
    actor.require_organization()?;

    let mut conn = state.db.pool().acquire().await?;
    let file = db::files::find(&mut conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("file"))?;
    let project = projects::load(&mut conn, actor, file.project_id).await?;
    authorize(policy::file::view(actor, &file, &project), "file")?;
    drop(conn);

    match state.storage.read(&file.storage_path).await? {
        Some(bytes) => Ok((file, bytes)),
        None => {
            tracing::warn!(file_id = %file.id, path = %file.storage_path, "Stored file is missing");
            Err(AppError::not_found("file"))
        }
    }
}

pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let file = db::files::find(&mut conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("file"))?;
    authorize(policy::file::delete(actor, &file), "file")?;
    db::files::delete(&mut conn, file.id).await?;
    drop(conn);

    state.storage.delete_best_effort(&file.storage_path).await;

    Activity::new(file.organization_id, &file, ActivityEvent::FileDeleted)
        .by(actor)
        .with(json!({ "name": file.original_name, "project_id": file.project_id }))
        .record_best_effort(&state.db)
        .await;
    Ok(())
}
