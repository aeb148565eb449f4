use shared::Role;

use crate::db::User;
use crate::identity::Actor;

pub fn view_any(actor: &Actor) -> bool {
    actor.is_owner() && actor.organization_id().is_some()
}

pub fn create(actor: &Actor) -> bool {
    view_any(actor)
}

/// Owners manage other members of their organization, but never another Owner
pub fn update(actor: &Actor, member: &User) -> bool {
    let same_org = member
        .organization_id
        .map(|org| actor.belongs_to(org))
        .unwrap_or(false);
    actor.is_owner() && same_org && member.role != Some(Role::Owner)
}
