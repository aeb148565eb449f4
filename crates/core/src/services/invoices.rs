use std::future::Future;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{InvoiceDocument, InvoiceLine, InvoiceParty, InvoiceStatus, Notification};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::Changes;
use crate::activity::{Activity, ActivityEvent};
use crate::db::{self, invoices::InvoiceFilter, Invoice, InvoiceItem};
use crate::error::{is_unique_violation, AppError, AppResult, ValidationErrors};
use crate::identity::{Actor, SystemContext};
use crate::numbering;
use crate::pagination::{PaginatedResult, Pagination};
use crate::policy::{self, authorize, invoice::InvoiceAbilities};
use crate::state::AppState;
use crate::validate;

const MAX_QUANTITY: i64 = 100_000;
const MAX_UNIT_PRICE: i64 = 1_000_000_000;

/// One submitted line. Any client-side `line_total` is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    pub quantity: i64,
    /// Minor currency units
    pub unit_price: i64,
}

/// Submitted invoice content. Subtotal and total are always recomputed.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceInput {
    pub client_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub due_at: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<InvoiceItemInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub can: InvoiceAbilities,
}

/// Validate line items and compute each line total
pub fn normalize_items(errors: &mut ValidationErrors, items: &[InvoiceItemInput]) -> Vec<NormalizedItem> {
    if items.is_empty() {
        errors.add("items", "At least one line item is required.");
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let description = validate::required(errors, &format!("items.{}.description", i), &item.description, 255);
            validate::range(errors, &format!("items.{}.quantity", i), item.quantity, 1, MAX_QUANTITY);
            validate::range(errors, &format!("items.{}.unit_price", i), item.unit_price, 0, MAX_UNIT_PRICE);
            NormalizedItem {
                description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.quantity.saturating_mul(item.unit_price),
            }
        })
        .collect()
}

/// `(subtotal, total)`. There are no taxes or discounts, so both are the line sum.
pub fn totals(items: &[NormalizedItem]) -> (i64, i64) {
    let subtotal = items.iter().map(|i| i.line_total).sum();
    (subtotal, subtotal)
}

/// Run `attempt` again while it fails on a unique-constraint violation.
///
/// Two creations can probe the same free number; the loser regenerates.
pub(crate) async fn retry_on_collision<T, F, Fut>(retries: u32, organization_id: Uuid, mut attempt: F) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for n in 0..=retries {
        match attempt(n).await {
            Err(AppError::Database(ref e)) if is_unique_violation(e) => {
                tracing::warn!(organization_id = %organization_id, attempt = n, "Invoice number collision, retrying");
            }
            other => return other,
        }
    }
    tracing::error!(organization_id = %organization_id, retries, "Invoice number collisions exhausted retries");
    Err(AppError::NumberingExhausted { organization_id })
}

async fn load(conn: &mut SqliteConnection, actor: &Actor, id: Uuid) -> AppResult<Invoice> {
    let invoice = db::invoices::find(conn, &actor.scope(), id)
        .await?
        .ok_or_else(|| AppError::not_found("invoice"))?;
    authorize(policy::invoice::view(actor, &invoice), "invoice")?;
    Ok(invoice)
}

/// Staff list every invoice of the organization; portal clients list their own
pub async fn list(
    state: &AppState,
    actor: &Actor,
    filter: &InvoiceFilter,
    page: Pagination,
) -> AppResult<PaginatedResult<Invoice>> {
    actor.require_organization()?;
    if !policy::invoice::view_any(actor) {
        return Err(AppError::forbidden("invoices"));
    }
    let mut conn = state.db.pool().acquire().await?;
    db::invoices::list(&mut conn, &actor.scope(), filter, page).await
}

pub async fn get(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<InvoiceView> {
    actor.require_organization()?;
    let mut conn = state.db.pool().acquire().await?;
    let invoice = load(&mut conn, actor, id).await?;
    let items = db::invoices::items(&mut conn, &invoice).await?;
    Ok(InvoiceView {
        can: policy::invoice::abilities(actor, &invoice),
        invoice,
        items,
    })
}

/// Frozen view handed to the PDF renderer
pub async fn document(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<InvoiceDocument> {
    actor.require_organization()?;
    let scope = actor.scope();
    let mut conn = state.db.pool().acquire().await?;
    let invoice = load(&mut conn, actor, id).await?;
    let items = db::invoices::items(&mut conn, &invoice).await?;

    let organization = db::organizations::find(&mut conn, invoice.organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("invoice"))?;
    let client = db::clients::find(&mut conn, &scope, invoice.client_id)
        .await?
        .ok_or_else(|| AppError::not_found("invoice"))?;
    let project_title = match invoice.project_id {
        Some(project_id) => db::projects::find(&mut conn, &scope, project_id).await?.map(|p| p.title),
        None => None,
    };

    Ok(InvoiceDocument {
        id: invoice.id,
        number: invoice.number,
        status: invoice.status,
        issued_at: invoice.issued_at,
        due_at: invoice.due_at,
        created_at: invoice.created_at,
        organization_name: organization.name,
        client: InvoiceParty {
            name: client.name,
            email: client.email,
            phone: client.phone,
        },
        project_title,
        items: items
            .into_iter()
            .map(|item| InvoiceLine {
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect(),
        subtotal: invoice.subtotal,
        total: invoice.total,
        notes: invoice.notes,
    })
}

struct ValidInvoice {
    notes: Option<String>,
    items: Vec<NormalizedItem>,
}

async fn validate_input(conn: &mut SqliteConnection, actor: &Actor, input: &InvoiceInput) -> AppResult<ValidInvoice> {
    let scope = actor.scope();
    let mut errors = ValidationErrors::new();

    let client = db::clients::find(conn, &scope, input.client_id).await?;
    if client.is_none() {
        errors.add("client_id", "The selected client is invalid.");
    }
    if let Some(project_id) = input.project_id {
        match db::projects::find(conn, &scope, project_id).await? {
            None => errors.add("project_id", "The selected project is invalid."),
            Some(project) if client.is_some() && project.client_id != input.client_id => {
                errors.add("project_id", "Selected project must belong to the chosen client.")
            }
            Some(_) => {}
        }
    }

    let notes = validate::optional(&mut errors, "notes", input.notes.as_deref(), 10_000);
    let items = normalize_items(&mut errors, &input.items);
    errors.into_result()?;

    Ok(ValidInvoice { notes, items })
}

async fn insert_items(conn: &mut SqliteConnection, invoice: &Invoice, items: &[NormalizedItem]) -> AppResult<()> {
    let now = Utc::now();
    for (position, item) in items.iter().enumerate() {
        let row = InvoiceItem {
            id: Uuid::new_v4(),
            organization_id: invoice.organization_id,
            invoice_id: invoice.id,
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
            position: position as i64,
            created_at: now,
        };
        db::invoices::insert_item(conn, &row).await?;
    }
    Ok(())
}

/// Number, invoice row and items in one transaction
async fn insert_numbered(
    state: &AppState,
    draft: &Invoice,
    prefix: &str,
    items: &[NormalizedItem],
) -> AppResult<Invoice> {
    let ctx = SystemContext::new("invoice numbering");
    let mut tx = state.db.begin().await?;
    let number = numbering::next_number(
        &mut tx,
        &ctx,
        draft.organization_id,
        prefix,
        state.config.invoicing.probe_window,
    )
    .await?;

    let invoice = Invoice {
        id: Uuid::new_v4(),
        number,
        ..draft.clone()
    };
    db::invoices::insert(&mut tx, &invoice).await?;
    insert_items(&mut tx, &invoice, items).await?;
    tx.commit().await?;
    Ok(invoice)
}

pub async fn create(state: &AppState, actor: &Actor, input: InvoiceInput) -> AppResult<InvoiceView> {
    let organization_id = actor.require_staff()?;
    if !policy::invoice::create(actor) {
        return Err(AppError::forbidden("invoices"));
    }

    let mut conn = state.db.pool().acquire().await?;
    let valid = validate_input(&mut conn, actor, &input).await?;
    let organization = db::organizations::find(&mut conn, organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization"))?;
    drop(conn);

    let today = Utc::now().date_naive();
    let due_at = input
        .due_at
        .unwrap_or_else(|| today + Duration::days(organization.invoice_due_days_default));
    let prefix = numbering::normalize_prefix(
        Some(organization.invoice_prefix.as_str()),
        &state.config.invoicing.default_prefix,
    );
    let (subtotal, total) = totals(&valid.items);

    let now = Utc::now();
    let draft = Invoice {
        id: Uuid::nil(),
        organization_id,
        client_id: input.client_id,
        project_id: input.project_id,
        created_by_user_id: Some(actor.user_id()),
        number: String::new(),
        status: InvoiceStatus::Draft,
        issued_at: None,
        due_at: Some(due_at),
        subtotal,
        total,
        notes: valid.notes,
        created_at: now,
        updated_at: now,
    };

    let (draft_ref, prefix_ref, items_ref) = (&draft, prefix.as_str(), valid.items.as_slice());
    let invoice = retry_on_collision(state.config.invoicing.collision_retries, organization_id, |_| async move {
        insert_numbered(state, draft_ref, prefix_ref, items_ref).await
    })
    .await?;

    Activity::new(organization_id, &invoice, ActivityEvent::InvoiceCreated)
        .by(actor)
        .with(json!({
            "number": invoice.number,
            "status": invoice.status,
            "client_id": invoice.client_id,
            "total": invoice.total,
        }))
        .record_best_effort(&state.db)
        .await;

    get(state, actor, invoice.id).await
}

/// Replace the content of a Draft. Items are rewritten and totals recomputed.
pub async fn update(state: &AppState, actor: &Actor, id: Uuid, input: InvoiceInput) -> AppResult<InvoiceView> {
    actor.require_staff()?;

    let mut tx = state.db.begin().await?;
    let before = load(&mut tx, actor, id).await?;
    authorize(policy::invoice::update(actor, &before), "invoice")?;
    let valid = validate_input(&mut tx, actor, &input).await?;
    let (subtotal, total) = totals(&valid.items);

    let after = Invoice {
        client_id: input.client_id,
        project_id: input.project_id,
        due_at: input.due_at,
        notes: valid.notes,
        subtotal,
        total,
        ..before.clone()
    };
    if !db::invoices::update_draft(&mut tx, &after).await? {
        return Err(AppError::not_found("invoice"));
    }
    db::invoices::delete_items(&mut tx, after.id).await?;
    insert_items(&mut tx, &after, &valid.items).await?;
    tx.commit().await?;

    let mut changes = Changes::default();
    changes.track("client_id", &before.client_id, &after.client_id);
    changes.track("project_id", &before.project_id, &after.project_id);
    changes.track("due_at", &before.due_at, &after.due_at);
    changes.track("notes", &before.notes, &after.notes);
    changes.track("total", &before.total, &after.total);
    let mut details = changes.into_value();
    details["number"] = json!(after.number);
    Activity::new(after.organization_id, &after, ActivityEvent::InvoiceUpdated)
        .by(actor)
        .with(details)
        .record_best_effort(&state.db)
        .await;

    get(state, actor, after.id).await
}

/// Guarded status change. A transition the policy refuses, or one that lost a
/// race to another writer, leaves the row untouched and reads as not-found.
async fn transition(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    to: InvoiceStatus,
    allowed: fn(&Actor, &Invoice) -> bool,
) -> AppResult<Invoice> {
    actor.require_staff()?;

    let mut conn = state.db.pool().acquire().await?;
    let before = load(&mut conn, actor, id).await?;
    authorize(allowed(actor, &before), "invoice")?;

    let issued_at = (to == InvoiceStatus::Sent).then(|| Utc::now().date_naive());
    if !db::invoices::transition(&mut conn, before.id, policy::invoice::sources_for(to), to, issued_at).await? {
        tracing::debug!(invoice_id = %before.id, from = %before.status, to = %to, "Invoice transition lost its guard");
        return Err(AppError::not_found("invoice"));
    }
    drop(conn);

    Ok(Invoice {
        status: to,
        issued_at: before.issued_at.or(issued_at),
        ..before
    })
}

/// The portal login linked to the invoice's client, if any
async fn portal_user_of(state: &AppState, actor: &Actor, invoice: &Invoice) -> Option<Uuid> {
    let lookup: AppResult<Option<Uuid>> = async {
        let mut conn = state.db.pool().acquire().await?;
        let client = db::clients::find(&mut conn, &actor.scope(), invoice.client_id).await?;
        Ok(client.and_then(|c| c.user_id))
    }
    .await;

    lookup.unwrap_or_else(|e| {
        tracing::warn!(invoice_id = %invoice.id, error = %e, "Could not resolve invoice recipient");
        None
    })
}

pub async fn mark_sent(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<Invoice> {
    let invoice = transition(state, actor, id, InvoiceStatus::Sent, policy::invoice::mark_sent).await?;

    Activity::new(invoice.organization_id, &invoice, ActivityEvent::InvoiceMarkedSent)
        .by(actor)
        .with(json!({ "number": invoice.number, "client_id": invoice.client_id }))
        .record_best_effort(&state.db)
        .await;

    if let Some(user_id) = portal_user_of(state, actor, &invoice).await {
        state.notifier.notify(
            &[user_id],
            &Notification::InvoiceSent {
                invoice_id: invoice.id,
                number: invoice.number.clone(),
            },
        );
    }

    Ok(invoice)
}

pub async fn mark_paid(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<Invoice> {
    let invoice = transition(state, actor, id, InvoiceStatus::Paid, policy::invoice::mark_paid).await?;

    Activity::new(invoice.organization_id, &invoice, ActivityEvent::InvoiceMarkedPaid)
        .by(actor)
        .with(json!({ "number": invoice.number, "total": invoice.total }))
        .record_best_effort(&state.db)
        .await;
    Ok(invoice)
}

pub async fn void(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<Invoice> {
    let invoice = transition(state, actor, id, InvoiceStatus::Void, policy::invoice::void).await?;

    Activity::new(invoice.organization_id, &invoice, ActivityEvent::InvoiceVoided)
        .by(actor)
        .with(json!({ "number": invoice.number }))
        .record_best_effort(&state.db)
        .await;
    Ok(invoice)
}
