use serde::Serialize;
use shared::InvoiceStatus;

use crate::db::Invoice;
use crate::identity::Actor;

/// Which state transitions the current actor may trigger on an invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceAbilities {
    pub update: bool,
    pub mark_sent: bool,
    pub mark_paid: bool,
    pub void: bool,
}

pub fn view_any(actor: &Actor) -> bool {
    actor.organization_id().is_some() && (actor.is_staff() || actor.is_client())
}

pub fn view(actor: &Actor, invoice: &Invoice) -> bool {
    if !actor.belongs_to(invoice.organization_id) {
        return false;
    }
    actor.is_staff() || actor.is_linked_to(invoice.client_id)
}

pub fn create(actor: &Actor) -> bool {
    actor.is_staff()
}

fn manage(actor: &Actor, invoice: &Invoice) -> bool {
    actor.is_staff() && actor.belongs_to(invoice.organization_id)
}

pub fn update(actor: &Actor, invoice: &Invoice) -> bool {
    manage(actor, invoice) && invoice.status.is_draft()
}

pub fn mark_sent(actor: &Actor, invoice: &Invoice) -> bool {
    manage(actor, invoice) && invoice.status.is_draft()
}

pub fn mark_paid(actor: &Actor, invoice: &Invoice) -> bool {
    manage(actor, invoice) && invoice.status.is_outstanding()
}

pub fn void(actor: &Actor, invoice: &Invoice) -> bool {
    manage(actor, invoice) && !invoice.status.is_final()
}

pub fn abilities(actor: &Actor, invoice: &Invoice) -> InvoiceAbilities {
    InvoiceAbilities {
        update: update(actor, invoice),
        mark_sent: mark_sent(actor, invoice),
        mark_paid: mark_paid(actor, invoice),
        void: void(actor, invoice),
    }
}

/// Statuses each transition may start from
pub(crate) fn sources_for(target: InvoiceStatus) -> &'static [InvoiceStatus] {
    match target {
        InvoiceStatus::Sent => &[InvoiceStatus::Draft],
        InvoiceStatus::Paid => &[InvoiceStatus::Sent, InvoiceStatus::Overdue],
        InvoiceStatus::Void => &[InvoiceStatus::Draft, InvoiceStatus::Sent, InvoiceStatus::Overdue],
        InvoiceStatus::Draft | InvoiceStatus::Overdue => &[],
    }
}
