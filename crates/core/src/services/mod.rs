//! Use cases. Every function takes the shared state and the resolved actor,
//! and follows the same order: route gating, scoped load, policy, validation,
//! write, then best-effort activity and notifications.

pub mod activity;
pub mod clients;
pub mod comments;
pub mod dashboard;
pub mod files;
pub mod invoices;
pub mod organizations;
pub mod portal;
pub mod projects;
pub mod tasks;
pub mod team;

use serde::Serialize;
use serde_json::{Map, Value};

/// Field-level before/after values recorded on update events
#[derive(Debug, Default)]
pub(crate) struct Changes(Map<String, Value>);

impl Changes {
    pub(crate) fn track<T: PartialEq + Serialize>(&mut self, field: &str, before: &T, after: &T) {
        if before != after {
            self.0.insert(
                field.to_string(),
                serde_json::json!({ "from": before, "to": after }),
            );
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
