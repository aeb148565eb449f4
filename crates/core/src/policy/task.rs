use super::project;
use crate::db::{Project, Task};
use crate::identity::Actor;

pub fn view(actor: &Actor, task: &Task, parent: &Project) -> bool {
    task.project_id == parent.id
        && actor.belongs_to(task.organization_id)
        && project::view(actor, parent)
}

pub fn create(actor: &Actor, parent: &Project) -> bool {
    actor.is_staff() && actor.belongs_to(parent.organization_id)
}

pub fn update(actor: &Actor, task: &Task) -> bool {
    actor.is_staff() && actor.belongs_to(task.organization_id)
}

pub fn delete(actor: &Actor, task: &Task) -> bool {
    update(actor, task)
}
