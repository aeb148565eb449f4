//! Append-only audit trail.
//!
//! Entries are written after the primary change has committed. A failure to
//! record one is logged and swallowed: the change itself stands.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use shared::{ActorKind, SubjectKind};
use sqlx::{types::Json, SqliteConnection};
use uuid::Uuid;

use crate::db::{
    self, ActivityLog, Client, Comment, Database, Invoice, Organization, Project, ProjectFile, Task,
    User,
};
use crate::error::AppResult;
use crate::identity::{actor_kind, Actor, SystemContext};
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityEvent {
    OrganizationCreated,
    OrganizationUpdated,
    MemberAdded,
    MemberRoleChanged,
    MemberActivationChanged,
    ClientCreated,
    ClientUpdated,
    ClientDeleted,
    ClientPortalLinked,
    ProjectCreated,
    ProjectUpdated,
    ProjectStatusChanged,
    ProjectDeleted,
    TaskCreated,
    TaskUpdated,
    TaskStatusChanged,
    TaskDeleted,
    FileUploaded,
    FileDeleted,
    CommentPosted,
    CommentDeleted,
    InvoiceCreated,
    InvoiceUpdated,
    InvoiceMarkedSent,
    InvoiceMarkedPaid,
    InvoiceVoided,
}

impl ActivityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityEvent::OrganizationCreated => "organization.created",
            ActivityEvent::OrganizationUpdated => "organization.updated",
            ActivityEvent::MemberAdded => "member.added",
            ActivityEvent::MemberRoleChanged => "member.role_changed",
            ActivityEvent::MemberActivationChanged => "member.activation_changed",
            ActivityEvent::ClientCreated => "client.created",
            ActivityEvent::ClientUpdated => "client.updated",
            ActivityEvent::ClientDeleted => "client.deleted",
            ActivityEvent::ClientPortalLinked => "client.portal_linked",
            ActivityEvent::ProjectCreated => "project.created",
            ActivityEvent::ProjectUpdated => "project.updated",
            ActivityEvent::ProjectStatusChanged => "project.status_changed",
            ActivityEvent::ProjectDeleted => "project.deleted",
            ActivityEvent::TaskCreated => "task.created",
            ActivityEvent::TaskUpdated => "task.updated",
            ActivityEvent::TaskStatusChanged => "task.status_changed",
            ActivityEvent::TaskDeleted => "task.deleted",
            ActivityEvent::FileUploaded => "file.uploaded",
            ActivityEvent::FileDeleted => "file.deleted",
            ActivityEvent::CommentPosted => "comment.posted",
            ActivityEvent::CommentDeleted => "comment.deleted",
            ActivityEvent::InvoiceCreated => "invoice.created",
            ActivityEvent::InvoiceUpdated => "invoice.updated",
            ActivityEvent::InvoiceMarkedSent => "invoice.marked_sent",
            ActivityEvent::InvoiceMarkedPaid => "invoice.marked_paid",
            ActivityEvent::InvoiceVoided => "invoice.voided",
        }
    }
}

impl std::fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic pointer from an activity entry to the record it is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: Uuid,
}

impl Subject {
    pub fn new(kind: SubjectKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

macro_rules! subject_from {
    ($($model:ty => $kind:ident),+ $(,)?) => {
        $(
            impl From<&$model> for Subject {
                fn from(record: &$model) -> Self {
                    Subject::new(SubjectKind::$kind, record.id)
                }
            }
        )+
    };
}

subject_from! {
    Organization => Organization,
    User => User,
    Client => Client,
    Project => Project,
    Task => Task,
    ProjectFile => ProjectFile,
    Comment => Comment,
    Invoice => Invoice,
}

/// One pending audit entry
#[derive(Debug, Clone)]
pub struct Activity {
    organization_id: Uuid,
    subject: Subject,
    event: ActivityEvent,
    actor_user_id: Option<Uuid>,
    actor_type: ActorKind,
    description: Value,
}

impl Activity {
    /// An entry attributed to the system until [`Activity::by`] names an actor
    pub fn new(organization_id: Uuid, subject: impl Into<Subject>, event: ActivityEvent) -> Self {
        Self {
            organization_id,
            subject: subject.into(),
            event,
            actor_user_id: None,
            actor_type: actor_kind(None),
            description: Value::Object(Default::default()),
        }
    }

    pub fn by(mut self, actor: &Actor) -> Self {
        self.actor_user_id = Some(actor.user_id());
        self.actor_type = actor_kind(Some(actor));
        self
    }

    /// Structured details (before/after values, names, numbers)
    pub fn with(mut self, description: Value) -> Self {
        self.description = description;
        self
    }

    fn into_entry(self) -> ActivityLog {
        ActivityLog {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            actor_user_id: self.actor_user_id,
            actor_type: self.actor_type,
            subject_type: self.subject.kind,
            subject_id: self.subject.id,
            event: self.event.as_str().to_string(),
            description: Json(self.description),
            created_at: Utc::now(),
        }
    }

    /// Write the entry on the given connection, failing with the write
    pub async fn record(self, conn: &mut SqliteConnection) -> AppResult<ActivityLog> {
        let entry = self.into_entry();
        db::activity::insert(conn, &entry).await?;
        Ok(entry)
    }

    /// Write the entry on its own connection. Failures are logged, never returned.
    pub async fn record_best_effort(self, db: &Database) -> Option<ActivityLog> {
        let organization_id = self.organization_id;
        let event = self.event;

        let result: AppResult<ActivityLog> = async {
            let mut conn = db.pool().acquire().await?;
            self.record(&mut conn).await
        }
        .await;

        match result {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    organization_id = %organization_id,
                    event = %event,
                    error = %e,
                    "Failed to record activity"
                );
                None
            }
        }
    }
}

/// A subject resolved through the registry
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum SubjectRecord {
    Organization(Organization),
    User(User),
    Client(Client),
    Project(Project),
    Task(Task),
    ProjectFile(ProjectFile),
    Comment(Comment),
    Invoice(Invoice),
}

impl SubjectRecord {
    /// Short human label for activity listings
    pub fn label(&self) -> String {
        match self {
            SubjectRecord::Organization(o) => o.name.clone(),
            SubjectRecord::User(u) => u.name.clone(),
            SubjectRecord::Client(c) => c.name.clone(),
            SubjectRecord::Project(p) => p.title.clone(),
            SubjectRecord::Task(t) => t.title.clone(),
            SubjectRecord::ProjectFile(f) => f.original_name.clone(),
            SubjectRecord::Comment(c) => c.body.chars().take(50).collect(),
            SubjectRecord::Invoice(i) => i.number.clone(),
        }
    }
}

/// Look up the record an entry points at, through the caller's scope.
///
/// Returns `None` for subjects that were deleted or are out of scope.
pub async fn resolve_subject(
    conn: &mut SqliteConnection,
    scope: &Scope,
    subject: Subject,
) -> AppResult<Option<SubjectRecord>> {
    let id = subject.id;
    let record = match subject.kind {
        SubjectKind::Organization => {
            let in_scope = scope.is_system() || scope.organization_id() == Some(id);
            if !in_scope {
                return Ok(None);
            }
            db::organizations::find(conn, id)
                .await?
                .map(SubjectRecord::Organization)
        }
        SubjectKind::User => {
            let user = match scope.organization_id() {
                Some(org) => db::users::find_member(conn, org, id).await?,
                None if scope.is_system() => {
                    let ctx = SystemContext::new("activity subject resolution");
                    db::users::find(conn, &ctx, id).await?
                }
                None => None,
            };
            user.map(SubjectRecord::User)
        }
        SubjectKind::Client => db::clients::find(conn, scope, id).await?.map(SubjectRecord::Client),
        SubjectKind::Project => db::projects::find(conn, scope, id).await?.map(SubjectRecord::Project),
        SubjectKind::Task => db::tasks::find(conn, scope, id).await?.map(SubjectRecord::Task),
        SubjectKind::ProjectFile => db::files::find(conn, scope, id)
            .await?
            .map(SubjectRecord::ProjectFile),
        SubjectKind::Comment => db::comments::find(conn, scope, id).await?.map(SubjectRecord::Comment),
        SubjectKind::Invoice => db::invoices::find(conn, scope, id).await?.map(SubjectRecord::Invoice),
    };
    Ok(record)
}
