//! Delivery sinks for transition actions: mail, in-app notifications and
//! outbound webhooks.
//!
//! Each sink is a `Send + Sync` trait object so hosts can plug in real
//! transports. The implementations shipped here are a tracing-backed mail
//! sender, an in-memory notification writer and a `ureq` webhook client.

pub mod mail;
pub mod notification;
#[cfg(feature = "webhook")]
pub mod webhook;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use formflow_interchange::Id;
use serde::Serialize;

pub use mail::LogMailSender;
pub use notification::MemoryNotificationWriter;
#[cfg(feature = "webhook")]
pub use webhook::UreqWebhookClient;

// ──────────────────────────────────────────────
// DeliveryError
// ──────────────────────────────────────────────

/// A sink could not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The request never produced a response (DNS, connect, timeout).
    Transport { message: String },
    /// The sink rejected the message before sending.
    Rejected { message: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Transport { message } => write!(f, "{}", message),
            DeliveryError::Rejected { message } => write!(f, "rejected: {}", message),
        }
    }
}

impl std::error::Error for DeliveryError {}

// ──────────────────────────────────────────────
// Mail
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Blob paths, attached as-is.
    pub attachments: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), DeliveryError>;
}

// ──────────────────────────────────────────────
// Notifications
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    pub user_id: Id,
    pub title: String,
    pub body: String,
    /// `info`, `warning`, ...; free-form.
    pub kind: String,
    pub icon: Option<String>,
    pub link: Option<String>,
}

#[async_trait]
pub trait NotificationWriter: Send + Sync {
    async fn create(&self, notification: NewNotification) -> Result<(), DeliveryError>;
}

// ──────────────────────────────────────────────
// Webhooks
// ──────────────────────────────────────────────

/// The closed set of webhook methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Case-insensitive; anything outside the set is `None`.
    pub fn parse(s: &str) -> Option<HttpMethod> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body; sent as query parameters for GET.
    pub payload: serde_json::Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    /// 2xx and 3xx count as delivered.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Any response, whatever its status, is `Ok`; `Err` means no response.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn request(&self, request: WebhookRequest) -> Result<WebhookResponse, DeliveryError>;
}
