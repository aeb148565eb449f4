//! Read-only view models handed to collaborators outside the core
//! (PDF rendering, notification delivery).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::InvoiceStatus;

// ============================================================================
// Invoice documents
// ============================================================================

/// Everything an invoice renderer needs, resolved and frozen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub id: Uuid,
    pub number: String,
    pub status: InvoiceStatus,
    pub issued_at: Option<NaiveDate>,
    pub due_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub organization_name: String,
    pub client: InvoiceParty,
    pub project_title: Option<String>,
    pub items: Vec<InvoiceLine>,
    /// Minor currency units
    pub subtotal: i64,
    /// Minor currency units
    pub total: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceParty {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
}

impl InvoiceDocument {
    /// Download file name used by renderers
    pub fn file_name(&self) -> String {
        format!("Invoice-{}.pdf", self.number)
    }
}

/// Render minor currency units as `major.minor` with two decimals
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// Notifications
// ============================================================================

/// Payloads the core emits after a state change; delivery happens elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An invoice was sent to the client's portal user
    InvoiceSent { invoice_id: Uuid, number: String },

    /// A client commented on a project
    ProjectCommented {
        project_id: Uuid,
        project_title: String,
        comment_id: Uuid,
        excerpt: String,
    },

    /// A client uploaded a file to a project
    ClientUploadedFile {
        project_id: Uuid,
        project_title: String,
        file_id: Uuid,
        file_name: String,
    },
}

const EXCERPT_CHARS: usize = 100;

impl Notification {
    pub fn project_commented(
        project_id: Uuid,
        project_title: impl Into<String>,
        comment_id: Uuid,
        body: &str,
    ) -> Self {
        Self::ProjectCommented {
            project_id,
            project_title: project_title.into(),
            comment_id,
            excerpt: excerpt(body, EXCERPT_CHARS),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Notification::InvoiceSent { .. } => "Invoice sent",
            Notification::ProjectCommented { .. } => "New project comment",
            Notification::ClientUploadedFile { .. } => "New client upload",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::InvoiceSent { number, .. } => format!("Invoice {} is ready.", number),
            Notification::ProjectCommented {
                project_title,
                excerpt,
                ..
            } => format!("New client comment on {}: {}", project_title, excerpt),
            Notification::ClientUploadedFile {
                project_title,
                file_name,
                ..
            } => format!("{} was uploaded to {}.", file_name, project_title),
        }
    }
}

fn excerpt(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let cut: String = body.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

// ============================================================================
// Tests
// ============================================================================
