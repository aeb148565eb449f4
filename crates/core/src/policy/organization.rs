use crate::db::Organization;
use crate::identity::Actor;

pub fn view(actor: &Actor, organization: &Organization) -> bool {
    actor.belongs_to(organization.id)
}

pub fn update(actor: &Actor, organization: &Organization) -> bool {
    actor.is_owner() && actor.belongs_to(organization.id)
}
