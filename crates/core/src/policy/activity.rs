use crate::db::ActivityLog;
use crate::identity::Actor;

pub fn view_any(actor: &Actor) -> bool {
    actor.is_owner() && actor.organization_id().is_some()
}

pub fn view(actor: &Actor, entry: &ActivityLog) -> bool {
    actor.is_owner() && actor.belongs_to(entry.organization_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::{ActorKind, Role, SubjectKind};
    use sqlx::types::Json;
    use uuid::Uuid;

    fn entry(organization_id: Uuid) -> ActivityLog {
        ActivityLog {
            id: Uuid::new_v4(),
            organization_id,
            actor_user_id: None,
            actor_type: ActorKind::System,
            subject_type: SubjectKind::Client,
            subject_id: Uuid::new_v4(),
            event: "client.created".into(),
            description: Json(serde_json::json!({})),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_owners_read_the_trail() {
        let org = Uuid::new_v4();
        let owner = Actor::fixture(Some(org), Role::Owner, None);
        let staff = Actor::fixture(Some(org), Role::Staff, None);
        assert!(view_any(&owner));
        assert!(view(&owner, &entry(org)));
        assert!(!view_any(&staff));
        assert!(!view(&staff, &entry(org)));
    }

    #[test]
    fn test_foreign_entries_are_hidden() {
        let owner = Actor::fixture(Some(Uuid::new_v4()), Role::Owner, None);
        assert!(!view(&owner, &entry(Uuid::new_v4())));

        let unaffiliated = Actor::fixture(None, Role::Owner, None);
        assert!(!view_any(&unaffiliated));
    }
}
