//! The resolved caller and the system escape hatch.

use shared::{ActorKind, Role};
use uuid::Uuid;

use crate::db::{self, Database};
use crate::error::{AppError, AppResult};
use crate::scope::Scope;

/// An authenticated user, resolved once per request and passed explicitly to
/// every scoped read and policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    user_id: Uuid,
    organization_id: Option<Uuid>,
    role: Role,
    /// Client record linked through `clients.user_id`; Client role only
    client_id: Option<Uuid>,
}

impl Actor {
    /// Load the user behind an authenticated session.
    ///
    /// Missing or deactivated users are unauthenticated. Users that have not
    /// been given a role yet (before onboarding) are forbidden everywhere.
    pub async fn resolve(db: &Database, user_id: Uuid) -> AppResult<Self> {
        let ctx = SystemContext::new("actor resolution");
        let mut conn = db.pool().acquire().await?;

        let user = db::users::find(&mut conn, &ctx, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("unknown user".into()))?;

        if !user.is_active {
            tracing::debug!(user_id = %user.id, "Inactive user rejected");
            return Err(AppError::Unauthenticated("account is deactivated".into()));
        }

        let role = user
            .role
            .ok_or_else(|| AppError::forbidden("account has no role yet"))?;

        let client_id = match (role, user.organization_id) {
            (Role::Client, Some(organization_id)) => {
                db::clients::linked_client_id(&mut conn, &ctx, organization_id, user.id).await?
            }
            _ => None,
        };

        Ok(Self {
            user_id: user.id,
            organization_id: user.organization_id,
            role,
            client_id,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    pub fn kind(&self) -> ActorKind {
        ActorKind::of_role(Some(self.role))
    }

    pub fn scope(&self) -> Scope {
        Scope::for_actor(self)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    /// True when the actor is a member of `organization_id`
    pub fn belongs_to(&self, organization_id: Uuid) -> bool {
        self.organization_id == Some(organization_id)
    }

    /// Whether `client_id` is the actor's own linked client record
    pub fn is_linked_to(&self, client_id: Uuid) -> bool {
        self.is_client() && self.client_id == Some(client_id)
    }

    pub fn require_organization(&self) -> AppResult<Uuid> {
        self.organization_id.ok_or_else(|| {
            tracing::debug!(user_id = %self.user_id, "Actor has no organization");
            AppError::forbidden("complete onboarding first")
        })
    }

    /// Owner or Staff area
    pub fn require_staff(&self) -> AppResult<Uuid> {
        self.require_role(self.is_staff(), "staff area")
    }

    /// Owner-only area (team, settings, activity)
    pub fn require_owner(&self) -> AppResult<Uuid> {
        self.require_role(self.is_owner(), "owner area")
    }

    /// Client portal
    pub fn require_client(&self) -> AppResult<Uuid> {
        self.require_role(self.is_client(), "client portal")
    }

    fn require_role(&self, allowed: bool, area: &'static str) -> AppResult<Uuid> {
        let organization_id = self.require_organization()?;
        if !allowed {
            tracing::debug!(user_id = %self.user_id, role = %self.role, area, "Route access denied");
            return Err(AppError::forbidden(area));
        }
        Ok(organization_id)
    }

    #[cfg(test)]
    pub(crate) fn fixture(organization_id: Option<Uuid>, role: Role, client_id: Option<Uuid>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            organization_id,
            role,
            client_id,
        }
    }
}

/// Classify who performed an action, `None` being the system itself
pub fn actor_kind(actor: Option<&Actor>) -> ActorKind {
    ActorKind::of_role(actor.map(Actor::role))
}

/// Permission to read or write across tenants.
///
/// Only code inside this crate can build one, and each construction names
/// its reason so unscoped access stays greppable.
#[derive(Debug)]
pub struct SystemContext {
    reason: &'static str,
}

impl SystemContext {
    pub(crate) fn new(reason: &'static str) -> Self {
        tracing::trace!(reason, "System context opened");
        Self { reason }
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }
}
