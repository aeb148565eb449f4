//! Multi-tenant core for a client-services agency: organizations, their
//! staff and clients, projects with tasks, files and comments, invoices,
//! and an audit trail of everything that changes.
//!
//! Every read goes through a [`Scope`] derived from the resolved [`Actor`];
//! the only unscoped path requires a [`identity::SystemContext`].

pub mod activity;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod notify;
pub mod numbering;
pub mod pagination;
pub mod policy;
pub mod scope;
pub mod services;
pub mod state;
pub mod storage;
pub mod validate;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod testing;

pub use config::Config;
pub use db::Database;
pub use error::{AppError, AppResult, ValidationErrors};
pub use identity::Actor;
pub use notify::{LogNotifier, Notifier};
pub use pagination::{PaginatedResult, Pagination};
pub use scope::Scope;
pub use state::AppState;
pub use storage::FileStorage;
