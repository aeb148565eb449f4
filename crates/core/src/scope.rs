//! Tenant scope filter.
//!
//! Every read of a tenant-owned table goes through [`Scope::push_filter`].
//! A scope can only be obtained from a resolved [`Actor`] or from a
//! [`SystemContext`], so request code cannot produce an unscoped query by
//! accident.

use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::identity::{Actor, SystemContext};
use shared::Role;

/// Tables carrying `organization_id` that reads must be scoped on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopedTable {
    Clients,
    Projects,
    Tasks,
    ProjectFiles,
    Comments,
    Invoices,
    ActivityLogs,
}

impl ScopedTable {
    pub fn name(&self) -> &'static str {
        match self {
            ScopedTable::Clients => "clients",
            ScopedTable::Projects => "projects",
            ScopedTable::Tasks => "tasks",
            ScopedTable::ProjectFiles => "project_files",
            ScopedTable::Comments => "comments",
            ScopedTable::Invoices => "invoices",
            ScopedTable::ActivityLogs => "activity_logs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    /// Explicit escape hatch; filters nothing
    System,
    /// Owner and Staff: the whole organization
    Organization(Uuid),
    /// Client role: the organization, narrowed to the linked client record
    Portal {
        organization_id: Uuid,
        client_id: Option<Uuid>,
    },
    /// Authenticated but not attached to any organization yet
    Unaffiliated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope(ScopeKind);

impl Scope {
    pub fn for_actor(actor: &Actor) -> Self {
        let kind = match (actor.organization_id(), actor.role()) {
            (None, _) => ScopeKind::Unaffiliated,
            (Some(organization_id), Role::Client) => ScopeKind::Portal {
                organization_id,
                client_id: actor.client_id(),
            },
            (Some(organization_id), _) => ScopeKind::Organization(organization_id),
        };
        Scope(kind)
    }

    pub fn system(_ctx: &SystemContext) -> Self {
        Scope(ScopeKind::System)
    }

    /// Organization the scope is pinned to, if any
    pub fn organization_id(&self) -> Option<Uuid> {
        match self.0 {
            ScopeKind::Organization(id) => Some(id),
            ScopeKind::Portal { organization_id, .. } => Some(organization_id),
            ScopeKind::System | ScopeKind::Unaffiliated => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self.0, ScopeKind::System)
    }

    /// Append ` AND ...` conditions restricting `table` to this scope.
    ///
    /// The builder must already contain a `WHERE` clause and must reference
    /// `table` by its unaliased name.
    pub fn push_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>, table: ScopedTable) {
        let name = table.name();
        match self.0 {
            ScopeKind::System => {}
            ScopeKind::Unaffiliated => {
                qb.push(" AND 1 = 0");
            }
            ScopeKind::Organization(organization_id) => {
                qb.push(format!(" AND {}.organization_id = ", name));
                qb.push_bind(organization_id);
            }
            ScopeKind::Portal {
                organization_id,
                client_id,
            } => {
                qb.push(format!(" AND {}.organization_id = ", name));
                qb.push_bind(organization_id);

                match table {
                    ScopedTable::Projects | ScopedTable::Invoices => match client_id {
                        Some(client_id) => {
                            qb.push(format!(" AND {}.client_id = ", name));
                            qb.push_bind(client_id);
                        }
                        // No linked client record: fail closed
                        None => {
                            qb.push(" AND 1 = 0");
                        }
                    },
                    ScopedTable::Tasks | ScopedTable::ProjectFiles | ScopedTable::Comments => {
                        match client_id {
                            Some(client_id) => {
                                qb.push(format!(
                                    " AND {}.project_id IN (SELECT visible.id FROM projects visible \
                                     WHERE visible.organization_id = ",
                                    name
                                ));
                                qb.push_bind(organization_id);
                                qb.push(" AND visible.client_id = ");
                                qb.push_bind(client_id);
                                qb.push(")");
                            }
                            None => {
                                qb.push(" AND 1 = 0");
                            }
                        }
                    }
                    ScopedTable::Clients | ScopedTable::ActivityLogs => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(scope: Scope, table: ScopedTable) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {} WHERE 1 = 1", table.name()));
        scope.push_filter(&mut qb, table);
        qb.sql().to_string()
    }

    #[test]
    fn test_staff_scope_filters_on_organization_only() {
        let actor = Actor::fixture(Some(Uuid::new_v4()), Role::Staff, None);
        let sql = sql_for(Scope::for_actor(&actor), ScopedTable::Projects);
        assert!(sql.ends_with("AND projects.organization_id = ?"));
        assert!(!sql.contains("client_id"));
    }

    #[test]
    fn test_portal_scope_narrows_projects_and_invoices() {
        let actor = Actor::fixture(Some(Uuid::new_v4()), Role::Client, Some(Uuid::new_v4()));
        let scope = Scope::for_actor(&actor);
        assert!(sql_for(scope, ScopedTable::Projects).contains("projects.client_id = ?"));
        assert!(sql_for(scope, ScopedTable::Invoices).contains("invoices.client_id = ?"));
        assert!(sql_for(scope, ScopedTable::Comments).contains("comments.project_id IN (SELECT visible.id"));
        assert!(!sql_for(scope, ScopedTable::Clients).contains("client_id"));
    }

    #[test]
    fn test_unlinked_portal_scope_fails_closed() {
        let actor = Actor::fixture(Some(Uuid::new_v4()), Role::Client, None);
        let scope = Scope::for_actor(&actor);
        for table in [
            ScopedTable::Projects,
            ScopedTable::Invoices,
            ScopedTable::Tasks,
            ScopedTable::ProjectFiles,
            ScopedTable::Comments,
        ] {
            assert!(sql_for(scope, table).ends_with("AND 1 = 0"), "{:?}", table);
        }
    }

    #[test]
    fn test_actor_without_organization_matches_nothing() {
        let actor = Actor::fixture(None, Role::Owner, None);
        let scope = Scope::for_actor(&actor);
        assert_eq!(scope.organization_id(), None);
        assert!(!scope.is_system());
        assert!(sql_for(scope, ScopedTable::Clients).ends_with("AND 1 = 0"));
    }

    #[test]
    fn test_system_scope_adds_nothing() {
        let scope = Scope::system(&SystemContext::new("test"));
        assert!(scope.is_system());
        assert_eq!(
            sql_for(scope, ScopedTable::Invoices),
            "SELECT * FROM invoices WHERE 1 = 1"
        );
    }
}
