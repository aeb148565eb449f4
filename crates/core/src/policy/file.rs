use super::project;
use crate::db::{Project, ProjectFile};
use crate::identity::Actor;

pub fn view(actor: &Actor, file: &ProjectFile, parent: &Project) -> bool {
    file.project_id == parent.id
        && actor.belongs_to(file.organization_id)
        && project::view(actor, parent)
}

/// Staff upload anywhere in their organization; clients only to projects they can see
pub fn create(actor: &Actor, parent: &Project) -> bool {
    actor.belongs_to(parent.organization_id)
        && (actor.is_staff() || (actor.is_client() && project::view(actor, parent)))
}

pub fn delete(actor: &Actor, file: &ProjectFile) -> bool {
    actor.is_staff() && actor.belongs_to(file.organization_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures;
    use chrono::Utc;
    use shared::{ActorKind, FileType, Role};
    use uuid::Uuid;

    fn file(parent: &Project) -> ProjectFile {
        ProjectFile {
            id: Uuid::new_v4(),
            organization_id: parent.organization_id,
            project_id: parent.id,
            uploaded_by_user_id: None,
            uploader_type: ActorKind::Client,
            file_type: FileType::ClientUpload,
            original_name: "brief.pdf".into(),
            storage_path: "project-files/x/y/z.pdf".into(),
            mime_type: Some("application/pdf".into()),
            size_bytes: 10,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_uploads_to_own_project_but_cannot_delete() {
        let org = Uuid::new_v4();
        let client_id = Uuid::new_v4();
        let own = fixtures::project(org, client_id);
        let actor = Actor::fixture(Some(org), Role::Client, Some(client_id));

        assert!(create(&actor, &own));
        assert!(view(&actor, &file(&own), &own));
        assert!(!delete(&actor, &file(&own)));
    }

    #[test]
    fn test_client_cannot_touch_other_clients_project() {
        let org = Uuid::new_v4();
        let other = fixtures::project(org, Uuid::new_v4());
        let actor = Actor::fixture(Some(org), Role::Client, Some(Uuid::new_v4()));
        assert!(!create(&actor, &other));
        assert!(!view(&actor, &file(&other), &other));
    }

    #[test]
    fn test_staff_delete_within_organization() {
        let org = Uuid::new_v4();
        let parent = fixtures::project(org, Uuid::new_v4());
        assert!(delete(&Actor::fixture(Some(org), Role::Staff, None), &file(&parent)));
        assert!(!delete(
            &Actor::fixture(Some(Uuid::new_v4()), Role::Owner, None),
            &file(&parent)
        ));
    }
}
