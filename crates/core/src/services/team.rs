use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use shared::Role;
use uuid::Uuid;

use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, User};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::identity::Actor;
use crate::policy::{self, authorize};
use crate::state::AppState;
use crate::validate;

const MIN_PASSWORD_CHARS: usize = 8;
const GENERATED_PASSWORD_CHARS: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct MemberInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Store a random password; the member sets their own through a reset link
    #[serde(default)]
    pub set_password_later: bool,
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(GENERATED_PASSWORD_CHARS)
        .map(char::from)
        .collect()
}

/// Members of the actor's organization, by name
pub async fn list(state: &AppState, actor: &Actor) -> AppResult<Vec<User>> {
    let organization_id = actor.require_owner()?;
    if !policy::member::view_any(actor) {
        return Err(AppError::forbidden("team"));
    }
    let mut conn = state.db.pool().acquire().await?;
    db::users::list_members(&mut conn, organization_id).await
}

/// Add a Staff member. Emails are unique across the whole application.
pub async fn add(state: &AppState, actor: &Actor, input: MemberInput) -> AppResult<User> {
    let organization_id = actor.require_owner()?;
    if !policy::member::create(actor) {
        return Err(AppError::forbidden("team"));
    }

    let mut errors = ValidationErrors::new();
    let name = validate::required(&mut errors, "name", &input.name, 255);
    let email = validate::email(&mut errors, "email", &input.email, 255);
    let password = if input.set_password_later {
        random_password()
    } else {
        let password = input.password.clone().unwrap_or_default();
        if password.chars().count() < MIN_PASSWORD_CHARS {
            errors.add(
                "password",
                format!("The password must be at least {} characters.", MIN_PASSWORD_CHARS),
            );
        }
        password
    };

    let mut conn = state.db.pool().acquire().await?;
    if !errors.has("email") && db::users::email_taken(&mut conn, &email).await? {
        errors.add("email", "The email has already been taken.");
    }
    errors.into_result()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        organization_id: Some(organization_id),
        name,
        email,
        password_hash: hash_password(&password)?,
        role: Some(Role::Staff),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db::users::insert(&mut conn, &user).await?;
    drop(conn);

    Activity::new(organization_id, &user, ActivityEvent::MemberAdded)
        .by(actor)
        .with(json!({ "name": user.name, "email": user.email, "role": user.role }))
        .record_best_effort(&state.db)
        .await;

    Ok(user)
}

/// A member the Owner may manage. Other Owners read as not-found.
async fn load_managed(state: &AppState, actor: &Actor, organization_id: Uuid, id: Uuid) -> AppResult<User> {
    let mut conn = state.db.pool().acquire().await?;
    let member = db::users::find_member(&mut conn, organization_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("member"))?;
    authorize(policy::member::update(actor, &member), "member")?;
    Ok(member)
}

pub async fn update_role(state: &AppState, actor: &Actor, id: Uuid, role: Role) -> AppResult<User> {
    let organization_id = actor.require_owner()?;
    let before = load_managed(state, actor, organization_id, id).await?;

    if !Role::assignable().contains(&role) {
        let mut errors = ValidationErrors::new();
        errors.add("role", "The selected role is invalid.");
        return Err(AppError::Validation(errors));
    }

    let mut tx = state.db.begin().await?;
    if !db::users::update_membership(&mut tx, organization_id, before.id, role, before.is_active).await? {
        return Err(AppError::not_found("member"));
    }
    // Client logins cannot hold staff assignments
    if !role.is_staff() {
        let removed = db::projects::unassign_member(&mut tx, organization_id, before.id).await?;
        if removed > 0 {
            tracing::info!(organization_id = %organization_id, user_id = %before.id, removed, "Removed project assignments of demoted member");
        }
    }
    tx.commit().await?;

    if before.role != Some(role) {
        Activity::new(organization_id, &before, ActivityEvent::MemberRoleChanged)
            .by(actor)
            .with(json!({ "from": before.role, "to": role }))
            .record_best_effort(&state.db)
            .await;
    }

    Ok(User {
        role: Some(role),
        ..before
    })
}

/// Deactivated members can no longer resolve as actors
pub async fn set_active(state: &AppState, actor: &Actor, id: Uuid, is_active: bool) -> AppResult<User> {
    let organization_id = actor.require_owner()?;
    let before = load_managed(state, actor, organization_id, id).await?;
    let role = before
        .role
        .ok_or_else(|| AppError::Internal("member without a role".into()))?;

    let mut conn = state.db.pool().acquire().await?;
    if !db::users::update_membership(&mut conn, organization_id, before.id, role, is_active).await? {
        return Err(AppError::not_found("member"));
    }
    drop(conn);

    if before.is_active != is_active {
        tracing::info!(organization_id = %organization_id, user_id = %before.id, is_active, "Member activation changed");
        Activity::new(organization_id, &before, ActivityEvent::MemberActivationChanged)
            .by(actor)
            .with(json!({ "from": before.is_active, "to": is_active }))
            .record_best_effort(&state.db)
            .await;
    }

    Ok(User { is_active, ..before })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use argon2::{PasswordHash, PasswordVerifier};

    fn input(email: &str) -> MemberInput {
        MemberInput {
            name: "Sam".into(),
            email: email.into(),
            password: Some("correct horse".into()),
            set_password_later: false,
        }
    }

    #[tokio::test]
    async fn test_add_staff_member() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;

        let member = add(&fx.state, &owner, input(" Sam@Acme.test ")).await.unwrap();
        assert_eq!(member.email, "sam@acme.test");
        assert_eq!(member.role, Some(Role::Staff));
        let hash = PasswordHash::new(&member.password_hash).unwrap();
        assert!(Argon2::default().verify_password(b"correct horse", &hash).is_ok());

        let actor = Actor::resolve(&fx.state.db, member.id).await.unwrap();
        assert!(actor.is_staff());
        assert_eq!(fx.events(org).await, vec!["member.added"]);
    }

    #[tokio::test]
    async fn test_add_validates_email_and_password() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let other = fx.organization("Initech").await;
        let owner = fx.owner(org).await;
        let other_owner = fx.owner(other).await;

        add(&fx.state, &owner, input("sam@acme.test")).await.unwrap();
        // Unique across organizations
        let dup = add(&fx.state, &other_owner, input("sam@acme.test")).await;
        assert!(matches!(dup, Err(AppError::Validation(ref e)) if e.has("email")));

        let short = MemberInput {
            password: Some("short".into()),
            ..input("pat@acme.test")
        };
        let err = add(&fx.state, &owner, short).await;
        assert!(matches!(err, Err(AppError::Validation(ref e)) if e.has("password")));

        let later = MemberInput {
            password: None,
            set_password_later: true,
            ..input("pat@acme.test")
        };
        add(&fx.state, &owner, later).await.unwrap();
    }

    #[tokio::test]
    async fn test_staff_cannot_manage_team() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let staff = fx.staff(org).await;
        assert!(matches!(list(&fx.state, &staff).await, Err(AppError::Forbidden(_))));
        assert!(matches!(
            add(&fx.state, &staff, input("x@acme.test")).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_demotion_drops_project_assignments() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let staff = fx.staff(org).await;
        let kept = fx.staff(org).await;
        let client = fx.client(&owner, "Globex").await;
        let project = fx.project(&owner, client.id, "Website").await;
        fx.assign(project.id, &[staff.user_id(), kept.user_id()]).await;

        update_role(&fx.state, &owner, staff.user_id(), Role::Client).await.unwrap();

        let remaining: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM project_user WHERE project_id = ?")
            .bind(project.id)
            .fetch_all(fx.state.db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, vec![kept.user_id()]);
    }

    #[tokio::test]
    async fn test_role_change_and_deactivation() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let staff = fx.staff(org).await;

        let changed = update_role(&fx.state, &owner, staff.user_id(), Role::Client).await.unwrap();
        assert_eq!(changed.role, Some(Role::Client));
        let err = update_role(&fx.state, &owner, staff.user_id(), Role::Owner).await;
        assert!(matches!(err, Err(AppError::Validation(ref e)) if e.has("role")));

        set_active(&fx.state, &owner, staff.user_id(), false).await.unwrap();
        assert!(matches!(
            Actor::resolve(&fx.state.db, staff.user_id()).await,
            Err(AppError::Unauthenticated(_))
        ));

        assert_eq!(
            fx.events(org).await,
            vec!["member.role_changed", "member.activation_changed"]
        );
    }

    #[tokio::test]
    async fn test_members_of_other_organizations_are_not_found() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let other = fx.organization("Initech").await;
        let owner = fx.owner(org).await;
        let foreign = fx.staff(other).await;

        let err = set_active(&fx.state, &owner, foreign.user_id(), false).await;
        assert!(matches!(err, Err(AppError::NotFound { .. })));
    }
}
