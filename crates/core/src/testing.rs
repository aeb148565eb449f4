//! Shared test fixture: a throwaway database and storage root per test, plus
//! shortcuts that insert rows directly without going through services (so
//! they leave no activity entries behind).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use shared::{ActorKind, FileType, Notification, ProjectPriority, ProjectStatus, Role};
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::{Config, DatabaseConfig, StorageConfig};
use crate::db::{self, Client, Database, Invoice, Organization, Project, ProjectFile, User};
use crate::identity::{Actor, SystemContext};
use crate::notify::Notifier;
use crate::scope::Scope;
use crate::state::AppState;
use crate::storage::FileStorage;

/// Keeps every notification instead of delivering it
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<Uuid>, Notification)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, recipients: &[Uuid], notification: &Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipients.to_vec(), notification.clone()));
        }
    }
}

pub(crate) struct Fixture {
    pub state: AppState,
    notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: DatabaseConfig {
                path: dir.path().join("agency.db").to_string_lossy().into_owned(),
            },
            storage: StorageConfig {
                path: dir.path().join("storage").to_string_lossy().into_owned(),
            },
            ..Config::default()
        };

        let db = Database::new(&config.database.path).await.unwrap();
        db.run_migrations().await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(db, config).with_notifier(notifier.clone());
        Self {
            state,
            notifier,
            _dir: dir,
        }
    }

    /// Notifications handed to the notifier so far
    pub fn notifications(&self) -> Vec<(Vec<Uuid>, Notification)> {
        self.notifier.sent.lock().unwrap().clone()
    }

    pub async fn organization(&self, name: &str) -> Uuid {
        let now = Utc::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            brand_color: None,
            logo_path: None,
            invoice_prefix: "INV".to_string(),
            invoice_due_days_default: 14,
            billing_email: None,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::organizations::insert(&mut conn, &organization).await.unwrap();
        organization.id
    }

    async fn insert_user(&self, organization_id: Option<Uuid>, role: Option<Role>, email: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            organization_id,
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::users::insert(&mut conn, &user).await.unwrap();
        user.id
    }

    async fn member(&self, organization_id: Uuid, role: Role) -> Actor {
        let email = format!("{}-{}@agency.test", role.as_str().to_lowercase(), Uuid::new_v4().simple());
        let id = self.insert_user(Some(organization_id), Some(role), &email).await;
        Actor::resolve(&self.state.db, id).await.unwrap()
    }

    pub async fn owner(&self, organization_id: Uuid) -> Actor {
        self.member(organization_id, Role::Owner).await
    }

    pub async fn staff(&self, organization_id: Uuid) -> Actor {
        self.member(organization_id, Role::Staff).await
    }

    /// A Client-role login, linked to the given client record when one is passed
    pub async fn portal_user(&self, organization_id: Uuid, client_id: Option<Uuid>) -> Actor {
        let email = format!("portal-{}@agency.test", Uuid::new_v4().simple());
        let id = self.insert_user(Some(organization_id), Some(Role::Client), &email).await;
        if let Some(client_id) = client_id {
            let mut conn = self.state.db.pool().acquire().await.unwrap();
            assert!(db::clients::link_user(&mut conn, client_id, id).await.unwrap());
        }
        Actor::resolve(&self.state.db, id).await.unwrap()
    }

    /// A signed-up user that has not onboarded into any organization
    pub async fn registered_user(&self, email: &str) -> Uuid {
        self.insert_user(None, None, email).await
    }

    pub async fn deactivate(&self, user_id: Uuid) {
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(user_id)
            .execute(self.state.db.pool())
            .await
            .unwrap();
    }

    pub async fn client(&self, owner: &Actor, name: &str) -> Client {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            organization_id: owner.organization_id().unwrap(),
            user_id: None,
            name: name.to_string(),
            email: format!("{}-{}@client.test", name.to_lowercase().replace(' ', "-"), Uuid::new_v4().simple()),
            phone: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::clients::insert(&mut conn, &client).await.unwrap();
        client
    }

    pub async fn project(&self, owner: &Actor, client_id: Uuid, title: &str) -> Project {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            organization_id: owner.organization_id().unwrap(),
            client_id,
            created_by_user_id: Some(owner.user_id()),
            title: title.to_string(),
            description: None,
            status: ProjectStatus::Draft,
            priority: ProjectPriority::Medium,
            due_date: None,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::projects::insert(&mut conn, &project).await.unwrap();
        project
    }

    /// A Deliverable with its bytes in storage
    pub async fn file(&self, owner: &Actor, project_id: Uuid, name: &str) -> ProjectFile {
        let organization_id = owner.organization_id().unwrap();
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin");
        let key = FileStorage::project_file_key(organization_id, project_id, extension);
        let bytes = format!("contents of {}", name).into_bytes();
        self.state.storage.put(&key, &bytes).await.unwrap();

        let file = ProjectFile {
            id: Uuid::new_v4(),
            organization_id,
            project_id,
            uploaded_by_user_id: Some(owner.user_id()),
            uploader_type: ActorKind::Staff,
            file_type: FileType::Deliverable,
            original_name: name.to_string(),
            storage_path: key,
            mime_type: None,
            size_bytes: bytes.len() as i64,
            created_at: Utc::now(),
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::files::insert(&mut conn, &file).await.unwrap();
        file
    }

    /// Replace the staff assigned to a project
    pub async fn assign(&self, project_id: Uuid, user_ids: &[Uuid]) {
        let ctx = SystemContext::new("test fixture");
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        let project = db::projects::find(&mut conn, &Scope::system(&ctx), project_id)
            .await
            .unwrap()
            .unwrap();
        db::projects::replace_staff(&mut conn, project.organization_id, project_id, user_ids)
            .await
            .unwrap();
    }

    /// An invoice row carrying exactly this number, on a throwaway client
    pub async fn raw_invoice_number(&self, organization_id: Uuid, number: &str) {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            organization_id,
            user_id: None,
            name: "Numbering".to_string(),
            email: format!("numbering-{}@client.test", Uuid::new_v4().simple()),
            phone: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let invoice = Invoice {
            id: Uuid::new_v4(),
            organization_id,
            client_id: client.id,
            project_id: None,
            created_by_user_id: None,
            number: number.to_string(),
            status: shared::InvoiceStatus::Draft,
            issued_at: None,
            due_at: None,
            subtotal: 0,
            total: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let mut conn = self.state.db.pool().acquire().await.unwrap();
        db::clients::insert(&mut conn, &client).await.unwrap();
        db::invoices::insert(&mut conn, &invoice).await.unwrap();
    }

    /// Event names recorded for an organization, oldest first
    pub async fn events(&self, organization_id: Uuid) -> Vec<String> {
        sqlx::query_scalar("SELECT event FROM activity_logs WHERE organization_id = ? ORDER BY rowid")
            .bind(organization_id)
            .fetch_all(self.state.db.pool())
            .await
            .unwrap()
    }
}
