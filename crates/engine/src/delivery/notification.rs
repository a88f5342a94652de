//! In-memory notification store.

use std::sync::Mutex;

use async_trait::async_trait;
use formflow_interchange::Id;

use super::{DeliveryError, NewNotification, NotificationWriter};

#[derive(Debug, Default)]
pub struct MemoryNotificationWriter {
    created: Mutex<Vec<NewNotification>>,
}

impl MemoryNotificationWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<NewNotification> {
        match self.created.lock() {
            Ok(created) => created.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn for_user(&self, user_id: Id) -> Vec<NewNotification> {
        self.all()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationWriter for MemoryNotificationWriter {
    async fn create(&self, notification: NewNotification) -> Result<(), DeliveryError> {
        tracing::debug!(user_id = notification.user_id, title = %notification.title, "notification created");
        self.created
            .lock()
            .map_err(|_| DeliveryError::Rejected {
                message: "notification store lock poisoned".to_string(),
            })?
            .push(notification);
        Ok(())
    }
}
