use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use shared::Role;
use uuid::Uuid;

use super::Changes;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, clients::ClientFilter, Client};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::pagination::{PaginatedResult, Pagination};
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

struct ValidClient {
    name: String,
    email: String,
    phone: Option<String>,
    notes: Option<String>,
}

async fn validate_input(
    state: &AppState,
    organization_id: Uuid,
    input: &ClientInput,
    except: Option<Uuid>,
) -> AppResult<ValidClient> {
    let mut errors = ValidationErrors::new();
    let name = validate::required(&mut errors, "name", &input.name, 255);
    let email = validate::email(&mut errors, "email", &input.email, 255);
    let phone = validate::optional(&mut errors, "phone", input.phone.as_deref(), 50);
    let notes = validate::optional(&mut errors, "notes", input.notes.as_deref(), 5000);

    if !errors.has("email") {
        let mut conn = state.db.pool().acquire().await?;
        if db::clients::email_taken(&mut conn, organization_id, &email, except).await? {
            errors.add("email", "The email has already been taken.");
        }
    }
    errors.into_result()?;

    Ok(ValidClient {
        name,
        email,
        phone,
        notes,
    })
}

pub async fn list(
    state: &AppState,
    actor: &Actor,
    filter: &ClientFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Client>> {
    actor.require_staff()?;
    if !policy::client::view_any(actor) {
        return Err(AppError::forbidden("clients"));
    }
    let mut conn = state.db.pool().acquire().await?;
    db::clients::list(&mut conn, &actor.scope(), filter, page).await
}

pub async fn get(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<Client> {
    actor.require_staff()?;
    let mut conn = state.db.pool().acquire().await?;
    let client = db::clients::find(&mut conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("client"))?;
    authorize(policy::client::view(actor, &client), "client")?;
    Ok(client)
}

pub async fn create(state: &AppState, actor: &Actor, input: ClientInput) -> AppResult<Client> {
    let organization_id = actor.require_staff()?;
    if !policy::client::create(actor) {
        return Err(AppError::forbidden("clients"));
    }
    let valid = validate_input(state, organization_id, &input, None).await?;

    let now = Utc::now();
    let client = Client {
        id: Uuid::new_v4(),
        organization_id,
        user_id: None,
        name: valid.name,
        email: valid.email,
        phone: valid.phone,
        notes: valid.notes,
        created_at: now,
        updated_at: now,
    };
    let mut conn = state.db.pool().acquire().await?;
    db::clients::insert(&mut conn, &client).await?;
    drop(conn);

    Activity::new(organization_id, &client, ActivityEvent::ClientCreated)
        .by(actor)
        .with(json!({ "name": client.name }))
        .record_best_effort(&state.db)
        .await;

    Ok(client)
}

pub async fn update(state: &AppState, actor: &Actor, id: Uuid, input: ClientInput) -> AppResult<Client> {
    let before = get(state, actor, id).await?;
    authorize(policy::client::update(actor, &before), "client")?;
    let valid = validate_input(state, before.organization_id, &input, Some(before.id)).await?;

    let after = Client {
        name: valid.name,
        email: valid.email,
        phone: valid.phone,
        notes: valid.notes,
        ..before.clone()
    };
    let mut conn = state.db.pool().acquire().await?;
    db::clients::update(&mut conn, &after).await?;
    drop(conn);

    let mut changes = Changes::default();
    changes.track("name", &before.name, &after.name);
    changes.track("email", &before.email, &after.email);
    changes.track("phone", &before.phone, &after.phone);
    changes.track("notes", &before.notes, &after.notes);
    Activity::new(after.organization_id, &after, ActivityEvent::ClientUpdated)
        .by(actor)
        .with(changes.into_value())
        .record_best_effort(&state.db)
        .await;

    Ok(after)
}

/// Delete a client and everything hanging off it. Stored file bytes of its
/// projects are removed best-effort once the rows are gone.
pub async fn delete(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<()> {
    let client = get(state, actor, id).await?;
    authorize(policy::client::delete(actor, &client), "client")?;

    let scope = actor.scope();
    let mut tx = state.db.begin().await?;
    let keys = db::files::storage_paths_for_client(&mut tx, &scope, client.id).await?;
    db::clients::delete(&mut tx, client.id).await?;
    tx.commit().await?;

    for key in &keys {
        state.storage.delete_best_effort(key).await;
    }

    Activity::new(client.organization_id, &client, ActivityEvent::ClientDeleted)
        .by(actor)
        .with(json!({ "name": client.name, "files_removed": keys.len() }))
        .record_best_effort(&state.db)
        .await;

    Ok(())
}

/// Attach a Client-role member of the organization as this client's portal login
pub async fn link_portal_user(
    state: &AppState,
    actor: &Actor,
    client_id: Uuid,
    user_id: Uuid,
) -> AppResult<Client> {
    let client = get(state, actor, client_id).await?;
    authorize(policy::client::link_portal_user(actor, &client), "client")?;

    let mut errors = ValidationErrors::new();
    let mut conn = state.db.pool().acquire().await?;
    let user = db::users::find_member(&mut conn, client.organization_id, user_id).await?;
    match &user {
        Some(user) if user.role == Some(Role::Client) => {
            if db::clients::user_is_linked(&mut conn, user.id).await? {
                errors.add("user_id", "The user is already linked to a client.");
            }
        }
        _ => errors.add("user_id", "The selected user is not a client member of this organization."),
    }
    if client.user_id.is_some() {
        errors.add("user_id", "The client already has a portal user.");
    }
    errors.into_result()?;

    if !db::clients::link_user(&mut conn, client.id, user_id).await? {
        let mut errors = ValidationErrors::new();
        errors.add("user_id", "The client already has a portal user.");
        return Err(AppError::Validation(errors));
    }
    drop(conn);

    Activity::new(client.organization_id, &client, ActivityEvent::ClientPortalLinked)
        .by(actor)
        .with(json!({ "user_id": user_id }))
        .record_best_effort(&state.db)
        .await;

    Ok(Client {
        user_id: Some(user_id),
        ..client
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn input(name: &str, email: &str) -> ClientInput {
        ClientInput {
            name: name.into(),
            email: email.into(),
            phone: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let staff = fx.staff(org).await;

        let created = create(&fx.state, &staff, input("Globex", "OPS@globex.test")).await.unwrap();
        assert_eq!(created.email, "ops@globex.test");
        create(&fx.state, &staff, input("Initech", "hello@initech.test")).await.unwrap();

        let found = list(
            &fx.state,
            &staff,
            &ClientFilter { search: Some("glob".into()) },
            Pagination::default(),
        )
        .await
        .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].id, created.id);
        assert_eq!(fx.events(org).await, vec!["client.created", "client.created"]);
    }

    #[tokio::test]
    async fn test_email_unique_per_organization() {
        let fx = Fixture::new().await;
        let org_a = fx.organization("Acme").await;
        let org_b = fx.organization("Initech").await;
        let staff_a = fx.staff(org_a).await;
        let staff_b = fx.staff(org_b).await;

        create(&fx.state, &staff_a, input("Globex", "ops@globex.test")).await.unwrap();
        let dup = create(&fx.state, &staff_a, input("Globex 2", "ops@globex.test")).await;
        assert!(matches!(dup, Err(AppError::Validation(ref e)) if e.has("email")));

        // Another tenant may reuse the address
        create(&fx.state, &staff_b, input("Globex", "ops@globex.test")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_keeps_own_email() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;

        let updated = update(
            &fx.state,
            &owner,
            client.id,
            ClientInput {
                phone: Some("555-0100".into()),
                ..input("Globex Corp", &client.email)
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Globex Corp");
        assert_eq!(updated.organization_id, org);
    }

    #[tokio::test]
    async fn test_portal_users_cannot_reach_clients() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;
        let portal = fx.portal_user(org, Some(client.id)).await;

        assert!(matches!(
            list(&fx.state, &portal, &ClientFilter::default(), Pagination::default()).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(get(&fx.state, &portal, client.id).await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_link_portal_user() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let staff = fx.staff(org).await;
        let client = fx.client(&owner, "Globex").await;
        let other = fx.client(&owner, "Initech").await;
        let portal = fx.portal_user(org, None).await;

        // Staff members cannot be portal logins
        let err = link_portal_user(&fx.state, &owner, client.id, staff.user_id()).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let linked = link_portal_user(&fx.state, &owner, client.id, portal.user_id()).await.unwrap();
        assert_eq!(linked.user_id, Some(portal.user_id()));

        let again = link_portal_user(&fx.state, &owner, other.id, portal.user_id()).await;
        assert!(matches!(again, Err(AppError::Validation(_))));

        let actor = Actor::resolve(&fx.state.db, portal.user_id()).await.unwrap();
        assert_eq!(actor.client_id(), Some(client.id));
    }

    #[tokio::test]
    async fn test_delete_removes_project_files() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = fx.client(&owner, "Globex").await;
        let project = fx.project(&owner, client.id, "Website").await;
        let file = fx.file(&owner, project.id, "brief.pdf").await;
        assert!(fx.state.storage.exists(&file.storage_path).await);

        delete(&fx.state, &owner, client.id).await.unwrap();
        assert!(!fx.state.storage.exists(&file.storage_path).await);
        assert!(matches!(get(&fx.state, &owner, client.id).await, Err(AppError::NotFound { .. })));
        assert_eq!(fx.events(org).await.last().map(String::as_str), Some("client.deleted"));
    }
}
