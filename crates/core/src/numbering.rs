//! Per-organization invoice numbers of the form `PREFIX-00001`.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::identity::SystemContext;

const SEQUENCE_WIDTH: usize = 5;
const FALLBACK_PREFIX: &str = "INV";

/// Trimmed, upper-cased prefix, falling back when blank
pub fn normalize_prefix(raw: Option<&str>, fallback: &str) -> String {
    let prefix = raw.map(|p| p.trim().to_uppercase()).unwrap_or_default();
    if !prefix.is_empty() {
        return prefix;
    }
    let fallback = fallback.trim().to_uppercase();
    if fallback.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        fallback
    }
}

pub fn format_number(prefix: &str, sequence: u64) -> String {
    format!("{}-{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH)
}

/// Numeric suffix of `number` if it is exactly `{prefix}-{digits}`
pub fn parse_sequence(number: &str, prefix: &str) -> Option<u64> {
    let digits = number.strip_prefix(prefix)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Find the next free number for an organization.
///
/// Starts after the lexicographically last existing number with this prefix
/// and probes `probe_window` sequential candidates. The unique index on
/// `(organization_id, number)` remains the final arbiter under concurrency.
pub async fn next_number(
    conn: &mut SqliteConnection,
    ctx: &SystemContext,
    organization_id: Uuid,
    prefix: &str,
    probe_window: u32,
) -> AppResult<String> {
    let stem = format!("{}-", prefix);
    let last = db::invoices::last_number_with_prefix(conn, ctx, organization_id, &stem).await?;
    let start = last
        .as_deref()
        .and_then(|n| parse_sequence(n, prefix))
        .map(|n| n.saturating_add(1))
        .unwrap_or(1)
        .max(1);

    for offset in 0..u64::from(probe_window) {
        let candidate = format_number(prefix, start.saturating_add(offset));
        if !db::invoices::number_exists(conn, ctx, organization_id, &candidate).await? {
            return Ok(candidate);
        }
    }

    tracing::error!(
        organization_id = %organization_id,
        prefix,
        start,
        probe_window,
        "Invoice numbering exhausted its probe window"
    );
    Err(AppError::NumberingExhausted { organization_id })
}
