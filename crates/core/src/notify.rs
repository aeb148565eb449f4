use shared::Notification;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db;
use crate::error::AppResult;

/// Hands notifications to whatever delivers them (mail, database inbox).
///
/// Called after the triggering change has committed; implementations must
/// not fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipients: &[Uuid], notification: &Notification);
}

/// Default notifier: records a tracing event per notification
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipients: &[Uuid], notification: &Notification) {
        tracing::info!(
            recipients = recipients.len(),
            title = notification.title(),
            message = %notification.message(),
            "Notification queued"
        );
    }
}

/// Organization owners plus the project's assigned staff, deduplicated,
/// excluding whoever triggered the notification.
pub async fn staff_recipients(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    project_id: Uuid,
    exclude: Uuid,
) -> AppResult<Vec<Uuid>> {
    let mut recipients = db::users::owner_ids(conn, organization_id).await?;
    for id in db::projects::active_staff_ids(conn, project_id).await? {
        if !recipients.contains(&id) {
            recipients.push(id);
        }
    }
    recipients.retain(|id| *id != exclude);
    Ok(recipients)
}

/// [`staff_recipients`] for use after a commit: a failed lookup is logged and
/// yields nobody.
pub async fn staff_recipients_best_effort(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    project_id: Uuid,
    exclude: Uuid,
) -> Vec<Uuid> {
    staff_recipients(conn, organization_id, project_id, exclude)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(
                organization_id = %organization_id,
                project_id = %project_id,
                error = %e,
                "Could not resolve notification recipients"
            );
            Vec::new()
        })
}
