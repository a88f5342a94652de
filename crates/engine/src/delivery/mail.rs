//! Mail sender that records outgoing mail and writes it to the log.
//!
//! Hosts with a real SMTP relay implement [`MailSender`] themselves; this
//! one is what the server and the tests run with.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{DeliveryError, MailSender, OutgoingMail};

#[derive(Debug, Default)]
pub struct LogMailSender {
    outbox: Mutex<Vec<OutgoingMail>>,
}

impl LogMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self.outbox.lock() {
            Ok(outbox) => outbox.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, mail: OutgoingMail) -> Result<(), DeliveryError> {
        if mail.to.trim().is_empty() {
            return Err(DeliveryError::Rejected {
                message: "empty recipient address".to_string(),
            });
        }
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            attachments = mail.attachments.len(),
            cc = mail.cc.len(),
            bcc = mail.bcc.len(),
            "mail sent"
        );
        let mut outbox = self.outbox.lock().map_err(|_| DeliveryError::Rejected {
            message: "outbox lock poisoned".to_string(),
        })?;
        outbox.push(mail);
        Ok(())
    }
}
