//! Per-entity authorization rules.
//!
//! Every rule is a pure function of the actor and the already-loaded target.
//! Scoping decides what is queryable at all; these decide what may be done
//! with an instance once it has been resolved.

pub mod activity;
pub mod client;
pub mod comment;
pub mod file;
pub mod invoice;
pub mod member;
pub mod organization;
pub mod project;
pub mod task;

use crate::error::{AppError, AppResult};

/// Turn an instance-level denial into not-found so a caller cannot tell a
/// forbidden record from a missing one.
pub fn authorize(allowed: bool, entity: &'static str) -> AppResult<()> {
    if allowed {
        Ok(())
    } else {
        tracing::debug!(entity, "Policy denied");
        Err(AppError::not_found(entity))
    }
}
