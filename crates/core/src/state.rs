use crate::{
    config::Config,
    db::Database,
    notify::{LogNotifier, Notifier},
    storage::FileStorage,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub storage: FileStorage,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let storage = FileStorage::new(&config.storage.path);
        Self {
            db,
            config,
            storage,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replace the notification collaborator
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
