use crate::db::Project;
use crate::identity::Actor;

/// Staff list the organization's projects; clients list their own in the portal
pub fn view_any(actor: &Actor) -> bool {
    actor.organization_id().is_some() && (actor.is_staff() || actor.is_client())
}

pub fn view(actor: &Actor, project: &Project) -> bool {
    if !actor.belongs_to(project.organization_id) {
        return false;
    }
    actor.is_staff() || actor.is_linked_to(project.client_id)
}

pub fn create(actor: &Actor) -> bool {
    actor.is_staff()
}

pub fn update(actor: &Actor, project: &Project) -> bool {
    actor.is_staff() && actor.belongs_to(project.organization_id)
}

pub fn delete(actor: &Actor, project: &Project) -> bool {
    update(actor, project)
}
