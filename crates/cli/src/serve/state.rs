//! Application state: one engine over the in-memory store.

use std::sync::Arc;

use formflow_engine::delivery::{LogMailSender, MemoryNotificationWriter, UreqWebhookClient};
use formflow_engine::directory::MemoryUserDirectory;
use formflow_engine::translation::MapTranslations;
use formflow_engine::{Collaborators, FsBlobStore, SubmissionOrchestrator};
use formflow_storage::MemoryStorage;

use crate::config::Config;
use crate::forms::{load_dir, LoadError};

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) engine: SubmissionOrchestrator<MemoryStorage>,
}

impl AppState {
    /// Build the engine and preload `forms_dir`.
    pub(crate) async fn from_config(config: &Config) -> Result<AppState, LoadError> {
        let storage = Arc::new(MemoryStorage::new());
        if let Some(dir) = &config.forms_dir {
            let count = load_dir(storage.as_ref(), dir).await?;
            tracing::info!(count, dir = %dir.display(), "form versions loaded");
        }

        let translations: MapTranslations = config.translations.iter().cloned().collect();
        let collaborators = Collaborators {
            blobs: Arc::new(FsBlobStore::new(config.blob_root.clone())),
            mail: Arc::new(LogMailSender::new()),
            notifications: Arc::new(MemoryNotificationWriter::new()),
            webhooks: Arc::new(UreqWebhookClient::new()),
            users: Arc::new(MemoryUserDirectory::new(config.users.iter().cloned())),
            translations: Arc::new(translations),
        };
        Ok(AppState {
            engine: SubmissionOrchestrator::new(storage, collaborators, config.engine_settings()),
        })
    }
}
