use crate::db::Client;
use crate::identity::Actor;

pub fn view_any(actor: &Actor) -> bool {
    actor.is_staff() && actor.organization_id().is_some()
}

pub fn view(actor: &Actor, client: &Client) -> bool {
    actor.is_staff() && actor.belongs_to(client.organization_id)
}

pub fn create(actor: &Actor) -> bool {
    actor.is_staff()
}

pub fn update(actor: &Actor, client: &Client) -> bool {
    view(actor, client)
}

pub fn delete(actor: &Actor, client: &Client) -> bool {
    view(actor, client)
}

/// Attaching a portal login is an edit of the client record
pub fn link_portal_user(actor: &Actor, client: &Client) -> bool {
    update(actor, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared::Role;
    use uuid::Uuid;

    fn client(organization_id: Uuid) -> Client {
        Client {
            id: Uuid::new_v4(),
            organization_id,
            user_id: None,
            name: "Globex".into(),
            email: "ops@globex.test".into(),
            phone: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_staff_manage_clients_of_their_organization() {
        let org = Uuid::new_v4();
        let record = client(org);
        for role in [Role::Owner, Role::Staff] {
            let actor = Actor::fixture(Some(org), role, None);
            assert!(view(&actor, &record));
            assert!(update(&actor, &record));
            assert!(delete(&actor, &record));
            assert!(create(&actor));
        }
    }

    #[test]
    fn test_other_organization_is_denied() {
        let actor = Actor::fixture(Some(Uuid::new_v4()), Role::Owner, None);
        let record = client(Uuid::new_v4());
        assert!(!view(&actor, &record));
        assert!(!link_portal_user(&actor, &record));
    }

    #[test]
    fn test_portal_users_never_see_client_records() {
        let org = Uuid::new_v4();
        let record = client(org);
        let actor = Actor::fixture(Some(org), Role::Client, Some(record.id));
        assert!(!view_any(&actor));
        assert!(!view(&actor, &record));
        assert!(!create(&actor));
    }
}
