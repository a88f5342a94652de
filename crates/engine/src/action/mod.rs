//! ActionExecutor: runs the actions bound to a transition.
//!
//! Actions are best-effort side effects. Each one reports an
//! [`ActionResult`]; a failing action never stops its siblings and never
//! surfaces as an error to the submission.

mod email;
mod notification;
mod props;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use formflow_interchange::Id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delivery::{DeliveryError, MailSender, NotificationWriter, WebhookClient};
use crate::directory::UserDirectory;
use crate::interpolate::Variables;
use crate::types::{Transition, TransitionAction};

// ──────────────────────────────────────────────
// ActionKind
// ──────────────────────────────────────────────

/// Handler an action type name dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    SendEmail,
    SendNotification,
    CallWebhook,
    /// No handler; reported as a failed action when run.
    Unknown(String),
}

impl ActionKind {
    /// Spaces are ignored and case does not matter: `"Send Email"`,
    /// `"SendEmail"` and `"send email"` are the same handler.
    pub fn from_name(name: &str) -> ActionKind {
        let key: String = name
            .chars()
            .filter(|c| *c != ' ')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "sendemail" => ActionKind::SendEmail,
            "sendnotification" => ActionKind::SendNotification,
            "callwebhook" => ActionKind::CallWebhook,
            _ => ActionKind::Unknown(name.to_string()),
        }
    }
}

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_name: String,
    pub success: bool,
    pub message: String,
}

/// What a handler reports when it ran to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reported {
    pub success: bool,
    pub message: String,
}

impl Reported {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Reported {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Reported {
            success: false,
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Executor
// ──────────────────────────────────────────────

#[derive(Clone)]
pub struct ActionExecutor {
    pub(crate) mail: Arc<dyn MailSender>,
    pub(crate) notifications: Arc<dyn NotificationWriter>,
    pub(crate) webhooks: Arc<dyn WebhookClient>,
    pub(crate) users: Arc<dyn UserDirectory>,
    /// Used when a webhook action has no `webhook_timeout`.
    pub(crate) default_webhook_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        mail: Arc<dyn MailSender>,
        notifications: Arc<dyn NotificationWriter>,
        webhooks: Arc<dyn WebhookClient>,
        users: Arc<dyn UserDirectory>,
        default_webhook_timeout: Duration,
    ) -> Self {
        ActionExecutor {
            mail,
            notifications,
            webhooks,
            users,
            default_webhook_timeout,
        }
    }

    /// Run every action of `transition` in binding order.
    pub async fn execute_transition_actions(
        &self,
        transition: &Transition,
        vars: &Variables,
        entry_id: Id,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(transition.actions.len());
        for action in &transition.actions {
            let reported = self.execute_action(action, vars).await;
            if reported.success {
                tracing::info!(
                    action = %action.name,
                    entry_id,
                    success = true,
                    "action executed"
                );
            } else {
                tracing::warn!(
                    action = %action.name,
                    entry_id,
                    success = false,
                    message = %reported.message,
                    "action executed"
                );
            }
            results.push(ActionResult {
                action_name: action.name.clone(),
                success: reported.success,
                message: reported.message,
            });
        }
        results
    }

    async fn execute_action(&self, action: &TransitionAction, vars: &Variables) -> Reported {
        let outcome = match &action.kind {
            ActionKind::SendEmail => email::send_email(self, &action.props, vars).await,
            ActionKind::SendNotification => {
                notification::send_notification(self, &action.props, vars).await
            }
            ActionKind::CallWebhook => Ok(webhook::call_webhook(self, &action.props, vars).await),
            ActionKind::Unknown(name) => {
                return Reported::failed(format!("Action handler not found: {}", name))
            }
        };
        outcome.unwrap_or_else(|e| Reported::failed(format!("Failed to execute action: {}", e)))
    }

    /// Union of every `receivers_*` list, first occurrence kept.
    pub(crate) async fn collect_recipients(
        &self,
        props: &Map<String, Value>,
    ) -> Result<Vec<String>, DeliveryError> {
        let mut recipients = props::string_list(props, "receivers_emails");

        let users = props::id_list(props, "receivers_users");
        if !users.is_empty() {
            recipients.extend(self.users.emails_for_users(&users).await?);
        }
        let roles = props::id_list(props, "receivers_roles");
        if !roles.is_empty() {
            recipients.extend(self.users.emails_for_roles(&roles).await?);
        }
        let permissions = props::id_list(props, "receivers_permissions");
        if !permissions.is_empty() {
            recipients.extend(self.users.emails_for_permissions(&permissions).await?);
        }

        let mut unique: Vec<String> = Vec::with_capacity(recipients.len());
        for address in recipients {
            let address = address.trim().to_string();
            if !address.is_empty() && !unique.contains(&address) {
                unique.push(address);
            }
        }
        Ok(unique)
    }
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("default_webhook_timeout", &self.default_webhook_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{LogMailSender, MemoryNotificationWriter, WebhookRequest, WebhookResponse};
    use crate::directory::{DirectoryUser, MemoryUserDirectory};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a fixed status and remembers every request.
    #[derive(Default)]
    pub(crate) struct StubWebhooks {
        pub status: Option<u16>,
        pub seen: Mutex<Vec<WebhookRequest>>,
    }

    #[async_trait]
    impl WebhookClient for StubWebhooks {
        async fn request(&self, request: WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
            self.seen.lock().unwrap().push(request);
            match self.status {
                Some(status) => Ok(WebhookResponse {
                    status,
                    body: "nope".into(),
                }),
                None => Err(DeliveryError::Transport {
                    message: "connection refused".into(),
                }),
            }
        }
    }

    struct Fixture {
        mail: Arc<LogMailSender>,
        notifications: Arc<MemoryNotificationWriter>,
        webhooks: Arc<StubWebhooks>,
        executor: ActionExecutor,
    }

    fn fixture(status: Option<u16>) -> Fixture {
        let mail = Arc::new(LogMailSender::new());
        let notifications = Arc::new(MemoryNotificationWriter::new());
        let webhooks = Arc::new(StubWebhooks {
            status,
            ..StubWebhooks::default()
        });
        let users = Arc::new(MemoryUserDirectory::new([
            DirectoryUser {
                id: 1,
                name: "Ada".into(),
                email: "ada@x.io".into(),
                roles: vec![7],
                permissions: vec![],
            },
            DirectoryUser {
                id: 2,
                name: "Bo".into(),
                email: "bo@x.io".into(),
                roles: vec![7],
                permissions: vec![3],
            },
        ]));
        let executor = ActionExecutor::new(
            mail.clone(),
            notifications.clone(),
            webhooks.clone(),
            users,
            Duration::from_secs(30),
        );
        Fixture {
            mail,
            notifications,
            webhooks,
            executor,
        }
    }

    fn transition(actions: Value) -> Transition {
        let form = crate::types::FormVersion::from_interchange(&json!({
            "id": 1, "form_id": 1, "form_name": "Leave",
            "stages": [{"id": 1, "name": "A", "is_initial": true}],
            "transitions": [{"id": 5, "from_stage_id": 1, "to_complete": true, "actions": actions}]
        }))
        .unwrap();
        form.get_transition(5).unwrap().clone()
    }

    fn vars() -> Variables {
        let mut v = Variables::default();
        v.insert("form_name", "Leave".into());
        v.insert("entry_link", "http://h/enduser/entries/p".into());
        v
    }

    #[test]
    fn kinds_ignore_spaces_and_case() {
        assert_eq!(ActionKind::from_name("Send Email"), ActionKind::SendEmail);
        assert_eq!(ActionKind::from_name("sendnotification"), ActionKind::SendNotification);
        assert_eq!(ActionKind::from_name("Call Webhook"), ActionKind::CallWebhook);
        assert_eq!(
            ActionKind::from_name("Print Label"),
            ActionKind::Unknown("Print Label".into())
        );
    }

    #[tokio::test]
    async fn email_goes_to_each_unique_recipient() {
        let fx = fixture(Some(200));
        let t = transition(json!([{"action_type": "Send Email", "action_props": {
            "email_subject": "New {{form_name}}",
            "email_content": "<a href=\"{{entry_link}}\">open</a>",
            "receivers_emails": ["ada@x.io", "ext@y.io"],
            "receivers_roles": [7],
            "cc_emails": ["boss@x.io"]
        }}]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        assert_eq!(
            results,
            vec![ActionResult {
                action_name: "Send Email".into(),
                success: true,
                message: "Email sent to 3 recipient(s)".into(),
            }]
        );
        let sent = fx.mail.sent();
        let to: Vec<_> = sent.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(to, vec!["ada@x.io", "ext@y.io", "bo@x.io"]);
        assert_eq!(sent[0].subject, "New Leave");
        assert_eq!(sent[0].html, "<a href=\"http://h/enduser/entries/p\">open</a>");
        assert_eq!(sent[0].cc, vec!["boss@x.io"]);
    }

    #[tokio::test]
    async fn empty_recipients_fail_without_stopping_siblings() {
        let fx = fixture(Some(204));
        let t = transition(json!([
            {"action_type": "Send Email", "action_props": {}},
            {"action_type": "Teleport", "action_props": {}},
            {"action_type": "Call Webhook", "action_props": {"webhook_url": "http://h/x"}}
        ]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.success, r.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (false, "No recipients specified or found"),
                (false, "Action handler not found: Teleport"),
                (true, "Webhook called successfully. Status: 204"),
            ]
        );
    }

    #[tokio::test]
    async fn notifications_need_local_users() {
        let fx = fixture(None);
        let t = transition(json!([
            {"action_type": "Send Notification", "action_props": {
                "notification_title": "{{form_name}} submitted",
                "notification_link": "{{entry_link}}",
                "receivers_permissions": [3]
            }},
            {"action_type": "Send Notification", "action_props": {
                "receivers_emails": ["ghost@x.io"]
            }}
        ]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        assert_eq!(results[0].message, "Notification sent to 1 user(s)");
        assert!(!results[1].success);
        assert_eq!(results[1].message, "No valid users found for notification");

        let created = fx.notifications.for_user(2);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].title, "Leave submitted");
        assert_eq!(created[0].kind, "info");
        assert_eq!(created[0].link.as_deref(), Some("http://h/enduser/entries/p"));
    }

    #[tokio::test]
    async fn webhook_outcomes() {
        let fx = fixture(Some(500));
        let t = transition(json!([
            {"action_type": "Call Webhook", "action_props": {
                "webhook_url": "http://h/x", "webhook_method": "PUT",
                "webhook_headers": {"X-Token": "t"},
                "webhook_payload": {"form": "{{form_name}}"},
                "webhook_timeout": 5
            }},
            {"action_type": "Call Webhook", "action_props": {}}
        ]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        assert_eq!(results[0].message, "Webhook failed. Status: 500, Body: nope");
        assert_eq!(results[1].message, "Webhook URL not specified");

        let seen = fx.webhooks.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, crate::delivery::HttpMethod::Put);
        assert_eq!(seen[0].payload, json!({"form": "Leave"}));
        assert_eq!(seen[0].headers["X-Token"], "t");
        assert_eq!(seen[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_webhook_is_reported() {
        let fx = fixture(None);
        let t = transition(json!([{"action_type": "Call Webhook", "action_props": {
            "webhook_url": "http://h/x", "webhook_method": "trace"
        }}]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        assert!(!results[0].success);
        assert_eq!(results[0].message, "Webhook error: connection refused");
        let seen = fx.webhooks.seen.lock().unwrap();
        assert_eq!(seen[0].method, crate::delivery::HttpMethod::Post);
        assert_eq!(seen[0].timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn out_of_range_webhook_timeout_uses_the_default() {
        let fx = fixture(Some(200));
        let t = transition(json!([
            {"action_type": "Call Webhook", "action_props": {
                "webhook_url": "http://h/x", "webhook_timeout": 1e300
            }},
            {"action_type": "Call Webhook", "action_props": {
                "webhook_url": "http://h/y", "webhook_timeout": "1e20"
            }}
        ]));
        let results = fx.executor.execute_transition_actions(&t, &vars(), 9).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success), "{:?}", results);
        let seen = fx.webhooks.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.timeout == Duration::from_secs(30)));
    }
}
