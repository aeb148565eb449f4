use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::Role;
use uuid::Uuid;

use super::Changes;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, Organization};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::{Actor, SystemContext};
use crate::numbering::normalize_prefix;
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::storage::FileStorage;
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsInput {
    pub name: String,
    #[serde(default)]
    pub brand_color: Option<String>,
    #[serde(default)]
    pub invoice_prefix: Option<String>,
    pub invoice_due_days_default: i64,
    #[serde(default)]
    pub billing_email: Option<String>,
}

/// Create the caller's organization and make them its Owner.
///
/// Runs as a system operation: the user has no organization (and therefore
/// no scope) until it completes.
pub async fn onboard(state: &AppState, user_id: Uuid, name: &str) -> AppResult<(Organization, Actor)> {
    let mut errors = ValidationErrors::new();
    let name = validate::required(&mut errors, "name", name, 255);
    errors.into_result()?;

    let ctx = SystemContext::new("onboarding");
    let now = Utc::now();
    let invoicing = &state.config.invoicing;
    let organization = Organization {
        id: Uuid::new_v4(),
        name,
        brand_color: None,
        logo_path: None,
        invoice_prefix: normalize_prefix(None, &invoicing.default_prefix),
        invoice_due_days_default: i64::from(invoicing.default_due_days),
        billing_email: None,
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.db.begin().await?;
    let user = db::users::find(&mut tx, &ctx, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("unknown user".into()))?;
    if user.organization_id.is_some() {
        return Err(AppError::forbidden("already a member of an organization"));
    }

    db::organizations::insert(&mut tx, &organization).await?;
    if !db::users::attach_organization(&mut tx, user_id, organization.id, Role::Owner).await? {
        return Err(AppError::forbidden("already a member of an organization"));
    }
    tx.commit().await?;

    tracing::info!(organization_id = %organization.id, user_id = %user_id, "Organization onboarded");

    let actor = Actor::resolve(&state.db, user_id).await?;
    Activity::new(organization.id, &organization, ActivityEvent::OrganizationCreated)
        .by(&actor)
        .with(json!({ "name": organization.name }))
        .record_best_effort(&state.db)
        .await;

    Ok((organization, actor))
}

async fn load(state: &AppState, actor: &Actor) -> AppResult<Organization> {
    let organization_id = actor.require_owner()?;
    let mut conn = state.db.pool().acquire().await?;
    let organization = db::organizations::find(&mut conn, organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization"))?;
    authorize(policy::organization::update(actor, &organization), "organization")?;
    Ok(organization)
}

/// Current settings, for the Owner's settings page
pub async fn settings(state: &AppState, actor: &Actor) -> AppResult<Organization> {
    load(state, actor).await
}

/// The actor's organization, visible to every member
pub async fn current(state: &AppState, actor: &Actor) -> AppResult<Organization> {
    let organization_id = actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let organization = db::organizations::find(&mut conn, organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization"))?;
    authorize(policy::organization::view(actor, &organization), "organization")?;
    Ok(organization)
}

pub async fn update_settings(
    state: &AppState,
    actor: &Actor,
    input: SettingsInput,
) -> AppResult<Organization> {
    let before = load(state, actor).await?;

    let mut errors = ValidationErrors::new();
    let name = validate::required(&mut errors, "name", &input.name, 255);

    let brand_color = validate::optional(&mut errors, "brand_color", input.brand_color.as_deref(), 7);
    if let Some(color) = brand_color.as_deref() {
        if !validate::is_brand_color(color) {
            errors.add("brand_color", "The brand color must be a hex colour like #1f2937.");
        }
    }

    let invoice_prefix = normalize_prefix(input.invoice_prefix.as_deref(), "INV");
    if invoice_prefix.chars().count() > 10 {
        errors.add("invoice_prefix", "The invoice prefix must not exceed 10 characters.");
    } else if !validate::is_invoice_prefix(&invoice_prefix) {
        errors.add("invoice_prefix", "The invoice prefix may only contain A-Z and 0-9.");
    }

    validate::range(&mut errors, "invoice_due_days_default", input.invoice_due_days_default, 1, 365);
    let billing_email =
        validate::optional_email(&mut errors, "billing_email", input.billing_email.as_deref(), 255);
    errors.into_result()?;

    let after = Organization {
        name,
        brand_color,
        invoice_prefix,
        invoice_due_days_default: input.invoice_due_days_default,
        billing_email,
        ..before.clone()
    };

    let mut conn = state.db.pool().acquire().await?;
    db::organizations::update_settings(&mut conn, &after).await?;
    drop(conn);

    let mut changes = Changes::default();
    changes.track("name", &before.name, &after.name);
    changes.track("brand_color", &before.brand_color, &after.brand_color);
    changes.track("invoice_prefix", &before.invoice_prefix, &after.invoice_prefix);
    changes.track(
        "invoice_due_days_default",
        &before.invoice_due_days_default,
        &after.invoice_due_days_default,
    );
    changes.track("billing_email", &before.billing_email, &after.billing_email);
    if !changes.is_empty() {
        Activity::new(after.id, &after, ActivityEvent::OrganizationUpdated)
            .by(actor)
            .with(changes.into_value())
            .record_best_effort(&state.db)
            .await;
    }

    Ok(after)
}

/// Replace the organization logo. The previous image is removed best-effort.
pub async fn upload_logo(
    state: &AppState,
    actor: &Actor,
    file_name: &str,
    bytes: &[u8],
) -> AppResult<Organization> {
    let before = load(state, actor).await?;

    let uploads = &state.config.uploads;
    let mut errors = ValidationErrors::new();
    let extension = validate::upload(
        &mut errors,
        "logo",
        file_name,
        bytes.len(),
        uploads.max_logo_bytes,
        &uploads.logo_extensions,
    );
    errors.into_result()?;
    let extension = extension.ok_or_else(|| AppError::Internal("logo extension missing".into()))?;

    let key = FileStorage::logo_key(before.id, &extension);
    state.storage.put(&key, bytes).await?;

    let after = Organization {
        logo_path: Some(key.clone()),
        ..before.clone()
    };
    let mut conn = state.db.pool().acquire().await?;
    if let Err(e) = db::organizations::update_settings(&mut conn, &after).await {
        state.storage.delete_best_effort(&key).await;
        return Err(e);
    }
    drop(conn);

    if let Some(old) = before.logo_path.as_deref() {
        state.storage.delete_best_effort(old).await;
    }

    Activity::new(after.id, &after, ActivityEvent::OrganizationUpdated)
        .by(actor)
        .with(json!({ "logo": { "from": before.logo_path, "to": after.logo_path } }))
        .record_best_effort(&state.db)
        .await;

    Ok(after)
}
