use super::project;
use crate::db::{Comment, Project};
use crate::identity::Actor;

pub fn view(actor: &Actor, comment: &Comment, parent: &Project) -> bool {
    comment.project_id == parent.id
        && actor.belongs_to(comment.organization_id)
        && project::view(actor, parent)
}

pub fn create(actor: &Actor, parent: &Project) -> bool {
    actor.belongs_to(parent.organization_id)
        && (actor.is_staff() || (actor.is_client() && project::view(actor, parent)))
}

pub fn delete(actor: &Actor, comment: &Comment) -> bool {
    actor.is_staff() && actor.belongs_to(comment.organization_id)
}
