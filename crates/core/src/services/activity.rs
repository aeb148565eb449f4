use serde::Serialize;
use uuid::Uuid;

use crate::activity::{resolve_subject, Subject, SubjectRecord};
use crate::db::{self, activity::ActivityFilter, ActivityLog};
use crate::error::{AppError, AppResult};
use crate::identity::Actor;
use crate::pagination::{PaginatedResult, Pagination};
use crate::policy::{self, authorize};
use crate::state::AppState;

const PER_PAGE: u64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityDetail {
    #[serde(flatten)]
    pub entry: ActivityLog,
    /// None once the subject has been deleted
    pub subject: Option<SubjectRecord>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOptions {
    pub events: Vec<String>,
    pub subject_types: Vec<String>,
}

fn gate(actor: &Actor) -> AppResult<()> {
    actor.require_owner()?;
    if !policy::activity::view_any(actor) {
        return Err(AppError::forbidden("activity"));
    }
    Ok(())
}

/// One page of the organization's audit trail, newest first. Pages start at 1.
pub async fn list(
    state: &AppState,
    actor: &Actor,
    filter: &ActivityFilter,
    page: u64,
) -> AppResult<PaginatedResult<ActivityLog>> {
    gate(actor)?;
    let mut conn = state.db.pool().acquire().await?;
    db::activity::list(&mut conn, &actor.scope(), filter, Pagination::page(page, PER_PAGE)).await
}

pub async fn get(state: &AppState, actor: &Actor, id: Uuid) -> AppResult<ActivityDetail> {
    gate(actor)?;
    let scope = actor.scope();
    let mut conn = state.db.pool().acquire().await?;
    let entry = db::activity::find(&mut conn, &scope, id)
        .await?
        .ok_or_else(|| AppError::not_found("activity"))?;
    authorize(policy::activity::view(actor, &entry), "activity")?;

    let subject = resolve_subject(&mut conn, &scope, Subject::new(entry.subject_type, entry.subject_id)).await?;
    Ok(ActivityDetail { entry, subject })
}

/// Everything recorded about one record
pub async fn history(state: &AppState, actor: &Actor, subject: Subject) -> AppResult<Vec<ActivityLog>> {
    gate(actor)?;
    let mut conn = state.db.pool().acquire().await?;
    db::activity::for_subject(&mut conn, &actor.scope(), subject.kind, subject.id).await
}

pub async fn filter_options(state: &AppState, actor: &Actor) -> AppResult<FilterOptions> {
    gate(actor)?;
    let scope = actor.scope();
    let mut conn = state.db.pool().acquire().await?;
    Ok(FilterOptions {
        events: db::activity::distinct_events(&mut conn, &scope).await?,
        subject_types: db::activity::distinct_subject_types(&mut conn, &scope).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clients::{self, ClientInput};
    use crate::testing::Fixture;
    use chrono::Utc;
    use shared::SubjectKind;

    fn client_input(name: &str, email: &str) -> ClientInput {
        ClientInput {
            name: name.into(),
            email: email.into(),
            phone: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_owner_reads_own_trail_only() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let other = fx.organization("Initech").await;
        let owner = fx.owner(org).await;
        let other_owner = fx.owner(other).await;

        clients::create(&fx.state, &owner, client_input("Globex", "ops@globex.test")).await.unwrap();
        clients::create(&fx.state, &other_owner, client_input("Umbrella", "hi@umbrella.test")).await.unwrap();

        let page = list(&fx.state, &owner, &ActivityFilter::default(), 1).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].organization_id, org);

        let foreign = list(&fx.state, &other_owner, &ActivityFilter::default(), 1).await.unwrap();
        assert!(matches!(
            get(&fx.state, &owner, foreign.items[0].id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_filters_and_options() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;

        let client = clients::create(&fx.state, &owner, client_input("Globex", "ops@globex.test")).await.unwrap();
        clients::update(&fx.state, &owner, client.id, client_input("Globex Corp", "ops@globex.test"))
            .await
            .unwrap();

        let updated_only = ActivityFilter {
            event: Some("client.updated".into()),
            ..Default::default()
        };
        let page = list(&fx.state, &owner, &updated_only, 1).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].description.0["name"]["to"], "Globex Corp");

        let today = Utc::now().date_naive();
        let tomorrow = today.succ_opt().unwrap();
        let future = ActivityFilter {
            from: Some(tomorrow),
            ..Default::default()
        };
        assert_eq!(list(&fx.state, &owner, &future, 1).await.unwrap().total, 0);
        let today_only = ActivityFilter {
            from: Some(today),
            to: Some(today),
            subject_type: Some(SubjectKind::Client),
            ..Default::default()
        };
        assert_eq!(list(&fx.state, &owner, &today_only, 1).await.unwrap().total, 2);

        let options = filter_options(&fx.state, &owner).await.unwrap();
        assert_eq!(options.events, vec!["client.created", "client.updated"]);
        assert_eq!(options.subject_types, vec!["client"]);

        let trail = history(&fx.state, &owner, Subject::from(&client)).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event, "client.updated");
    }

    #[tokio::test]
    async fn test_detail_resolves_subject_until_deleted() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let owner = fx.owner(org).await;
        let client = clients::create(&fx.state, &owner, client_input("Globex", "ops@globex.test")).await.unwrap();

        let entry = list(&fx.state, &owner, &ActivityFilter::default(), 1).await.unwrap().items[0].clone();
        let detail = get(&fx.state, &owner, entry.id).await.unwrap();
        assert_eq!(detail.subject.map(|s| s.label()), Some("Globex".to_string()));

        clients::delete(&fx.state, &owner, client.id).await.unwrap();
        let detail = get(&fx.state, &owner, entry.id).await.unwrap();
        assert!(detail.subject.is_none());
    }

    #[tokio::test]
    async fn test_staff_cannot_read_activity() {
        let fx = Fixture::new().await;
        let org = fx.organization("Acme").await;
        let staff = fx.staff(org).await;
        assert!(matches!(
            list(&fx.state, &staff, &ActivityFilter::default(), 1).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(filter_options(&fx.state, &staff).await, Err(AppError::Forbidden(_))));
    }
}
