//! End-to-end flows across services: tenancy, the portal boundary, invoice
//! lifecycle and audit behavior.

use shared::{ActorKind, FileType, InvoiceStatus, ProjectPriority, ProjectStatus, Role, TaskStatus};

use crate::db::{clients::ClientFilter, invoices::InvoiceFilter, projects::ProjectFilter, tasks::TaskFilter};
use crate::error::AppError;
use crate::identity::Actor;
use crate::pagination::Pagination;
use crate::services::{
    clients::{self, ClientInput},
    comments::{self, CommentInput},
    files::{self, UploadInput},
    invoices::{self, InvoiceInput, InvoiceItemInput},
    projects,
    tasks::{self, TaskInput},
    team,
};
use crate::testing::Fixture;

fn invoice_input(client_id: uuid::Uuid, items: &[(&str, i64, i64)]) -> InvoiceInput {
    InvoiceInput {
        client_id,
        project_id: None,
        due_at: None,
        notes: None,
        items: items
            .iter()
            .map(|(description, quantity, unit_price)| InvoiceItemInput {
                description: description.to_string(),
                quantity: *quantity,
                unit_price: *unit_price,
            })
            .collect(),
    }
}

fn task_input(title: &str) -> TaskInput {
    TaskInput {
        title: title.into(),
        description: None,
        status: TaskStatus::Todo,
        assigned_to_user_id: None,
        due_date: None,
    }
}

fn is_not_found<T>(result: &Result<T, AppError>) -> bool {
    matches!(result, Err(AppError::NotFound { .. }))
}

#[tokio::test]
async fn test_organizations_never_see_each_other() {
    let fx = Fixture::new().await;
    let acme = fx.organization("Acme").await;
    let initech = fx.organization("Initech").await;
    let acme_owner = fx.owner(acme).await;
    let initech_owner = fx.owner(initech).await;

    let client = fx.client(&acme_owner, "Globex").await;
    let project = fx.project(&acme_owner, client.id, "Website").await;
    let invoice = invoices::create(&fx.state, &acme_owner, invoice_input(client.id, &[("Design", 1, 500)]))
        .await
        .unwrap();

    let page = Pagination::default();
    assert_eq!(
        clients::list(&fx.state, &initech_owner, &ClientFilter::default(), page).await.unwrap().total,
        0
    );
    assert_eq!(
        projects::list(&fx.state, &initech_owner, &ProjectFilter::default(), page).await.unwrap().total,
        0
    );
    assert_eq!(
        invoices::list(&fx.state, &initech_owner, &InvoiceFilter::default(), page).await.unwrap().total,
        0
    );

    assert!(is_not_found(&clients::get(&fx.state, &initech_owner, client.id).await));
    assert!(is_not_found(&projects::get(&fx.state, &initech_owner, project.id).await));
    assert!(is_not_found(&invoices::get(&fx.state, &initech_owner, invoice.invoice.id).await));
    assert!(is_not_found(&invoices::void(&fx.state, &initech_owner, invoice.invoice.id).await));

    // Nothing the other tenant tried reached the trail
    assert!(fx.events(initech).await.is_empty());
}

#[tokio::test]
async fn test_unlinked_portal_user_sees_nothing() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;
    let client = fx.client(&owner, "Globex").await;
    fx.project(&owner, client.id, "Website").await;
    invoices::create(&fx.state, &owner, invoice_input(client.id, &[("Design", 1, 500)]))
        .await
        .unwrap();

    let unlinked = fx.portal_user(org, None).await;
    let page = Pagination::default();
    let projects = projects::list(&fx.state, &unlinked, &ProjectFilter::default(), page).await.unwrap();
    let invoices = invoices::list(&fx.state, &unlinked, &InvoiceFilter::default(), page).await.unwrap();
    assert_eq!(projects.total, 0);
    assert!(projects.items.is_empty());
    assert_eq!(invoices.total, 0);
}

#[tokio::test]
async fn test_portal_clients_stay_inside_their_projects() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;
    let globex = fx.client(&owner, "Globex").await;
    let initech = fx.client(&owner, "Initech").await;
    let theirs = fx.project(&owner, initech.id, "Intranet").await;
    let outsider = fx.portal_user(org, Some(globex.id)).await;

    assert!(is_not_found(&projects::get(&fx.state, &outsider, theirs.id).await));
    assert!(is_not_found(
        &comments::post(&fx.state, &outsider, theirs.id, CommentInput { body: "Hello".into() }).await
    ));
    let upload = UploadInput {
        file_name: "notes.pdf".into(),
        mime_type: Some("application/pdf".into()),
        file_type: FileType::ClientUpload,
        bytes: b"%PDF-1.4".to_vec(),
    };
    assert!(is_not_found(&files::upload(&fx.state, &outsider, theirs.id, upload).await));
    assert!(is_not_found(&tasks::list(&fx.state, &outsider, theirs.id, &TaskFilter::default()).await));

    let unchanged = projects::get(&fx.state, &owner, theirs.id).await.unwrap();
    assert_eq!(unchanged.project.title, "Intranet");
    assert!(fx.notifications().is_empty());
}

#[tokio::test]
async fn test_invoice_lifecycle() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;
    let client = fx.client(&owner, "Globex").await;

    let created = invoices::create(
        &fx.state,
        &owner,
        invoice_input(client.id, &[("Design", 2, 500), ("Hosting", 1, 200)]),
    )
    .await
    .unwrap();
    let id = created.invoice.id;
    assert_eq!(created.invoice.number, "INV-00001");
    assert_eq!(created.invoice.status, InvoiceStatus::Draft);
    assert_eq!(created.invoice.subtotal, 1200);
    assert_eq!(created.invoice.total, 1200);
    assert!(created.invoice.due_at.is_some());
    let line_totals: Vec<i64> = invoices::get(&fx.state, &owner, id)
        .await
        .unwrap()
        .items
        .iter()
        .map(|i| i.line_total)
        .collect();
    assert_eq!(line_totals, vec![1000, 200]);

    // Draft cannot be paid; the row is untouched
    assert!(is_not_found(&invoices::mark_paid(&fx.state, &owner, id).await));
    assert_eq!(invoices::get(&fx.state, &owner, id).await.unwrap().invoice.status, InvoiceStatus::Draft);

    let sent = invoices::mark_sent(&fx.state, &owner, id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert!(sent.issued_at.is_some());
    // Content is frozen once sent
    assert!(is_not_found(
        &invoices::update(&fx.state, &owner, id, invoice_input(client.id, &[("Design", 1, 1)])).await
    ));

    let paid = invoices::mark_paid(&fx.state, &owner, id).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(is_not_found(&invoices::void(&fx.state, &owner, id).await));
    assert!(is_not_found(&invoices::mark_sent(&fx.state, &owner, id).await));

    let view = invoices::get(&fx.state, &owner, id).await.unwrap();
    assert_eq!(view.invoice.status, InvoiceStatus::Paid);
    assert_eq!(view.invoice.total, 1200);
    assert!(!view.can.void);

    assert_eq!(
        fx.events(org).await,
        vec!["invoice.created", "invoice.marked_sent", "invoice.marked_paid"]
    );
}

#[tokio::test]
async fn test_invoice_numbers_are_per_organization() {
    let fx = Fixture::new().await;
    let acme = fx.organization("Acme").await;
    let initech = fx.organization("Initech").await;
    let acme_owner = fx.owner(acme).await;
    let initech_owner = fx.owner(initech).await;
    let acme_client = fx.client(&acme_owner, "Globex").await;
    let initech_client = fx.client(&initech_owner, "Umbrella").await;

    let first = invoices::create(&fx.state, &acme_owner, invoice_input(acme_client.id, &[("A", 1, 1)]))
        .await
        .unwrap();
    let other = invoices::create(&fx.state, &initech_owner, invoice_input(initech_client.id, &[("B", 1, 1)]))
        .await
        .unwrap();
    let second = invoices::create(&fx.state, &acme_owner, invoice_input(acme_client.id, &[("C", 1, 1)]))
        .await
        .unwrap();

    assert_eq!(first.invoice.number, "INV-00001");
    assert_eq!(other.invoice.number, "INV-00001");
    assert_eq!(second.invoice.number, "INV-00002");
}

#[tokio::test]
async fn test_owners_cannot_be_managed_by_other_owners() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;
    let co_owner = fx.owner(org).await;

    assert!(is_not_found(&team::update_role(&fx.state, &owner, co_owner.user_id(), Role::Staff).await));
    assert!(is_not_found(&team::set_active(&fx.state, &owner, co_owner.user_id(), false).await));
    assert!(is_not_found(&team::set_active(&fx.state, &owner, owner.user_id(), false).await));

    let still_owner = Actor::resolve(&fx.state.db, co_owner.user_id()).await.unwrap();
    assert!(still_owner.is_owner());
    assert!(fx.events(org).await.is_empty());
}

#[tokio::test]
async fn test_tasks_are_staff_work_visible_to_the_client() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;
    let staff = fx.staff(org).await;
    let client = fx.client(&owner, "Globex").await;
    let project = fx.project(&owner, client.id, "Website").await;
    fx.assign(project.id, &[staff.user_id()]).await;
    let portal = fx.portal_user(org, Some(client.id)).await;

    let task = tasks::create(&fx.state, &staff, project.id, task_input("T")).await.unwrap();
    assert!(matches!(
        tasks::create(&fx.state, &portal, project.id, task_input("Mine")).await,
        Err(AppError::Forbidden(_))
    ));

    let visible = tasks::list(&fx.state, &portal, project.id, &TaskFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, task.id);
    assert_eq!(visible[0].title, "T");

    let trail = crate::services::activity::list(&fx.state, &owner, &Default::default(), 1).await.unwrap();
    assert_eq!(trail.total, 1);
    assert_eq!(trail.items[0].event, "task.created");
    assert_eq!(trail.items[0].actor_type, ActorKind::Staff);
    assert_eq!(trail.items[0].actor_user_id, Some(staff.user_id()));
}

#[tokio::test]
async fn test_activity_failure_does_not_fail_the_operation() {
    let fx = Fixture::new().await;
    let org = fx.organization("Acme").await;
    let owner = fx.owner(org).await;

    sqlx::query("DROP TABLE activity_logs")
        .execute(fx.state.db.pool())
        .await
        .unwrap();

    let client = clients::create(
        &fx.state,
        &owner,
        ClientInput {
            name: "Globex".into(),
            email: "ops@globex.test".into(),
            phone: None,
            notes: None,
        },
    )
    .await
    .unwrap();
    let project = projects::create(
        &fx.state,
        &owner,
        projects::ProjectInput {
            client_id: client.id,
            title: "Website".into(),
            description: None,
            status: ProjectStatus::Active,
            priority: ProjectPriority::High,
            due_date: None,
            staff_ids: vec![],
        },
    )
    .await
    .unwrap();

    assert_eq!(clients::get(&fx.state, &owner, client.id).await.unwrap().name, "Globex");
    assert_eq!(project.project.status, ProjectStatus::Active);
}
