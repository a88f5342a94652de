use serde_json::{Map, Value};

use super::{props, ActionExecutor, Reported};
use crate::delivery::{DeliveryError, NewNotification};
use crate::interpolate::Variables;

/// One in-app notification per recipient that has a local user record.
pub(super) async fn send_notification(
    executor: &ActionExecutor,
    action_props: &Map<String, Value>,
    vars: &Variables,
) -> Result<Reported, DeliveryError> {
    let title = vars.apply(
        &props::string(action_props, "notification_title")
            .unwrap_or_else(|| "Notification".into()),
    );
    let body = vars.apply(&props::string(action_props, "notification_body").unwrap_or_default());
    let kind = props::string(action_props, "notification_type").unwrap_or_else(|| "info".into());
    let icon = props::string(action_props, "notification_icon");
    let link = vars.apply(&props::string(action_props, "notification_link").unwrap_or_default());
    let link = (!link.is_empty()).then_some(link);

    let recipients = executor.collect_recipients(action_props).await?;
    if recipients.is_empty() {
        return Ok(Reported::failed("No recipients specified or found"));
    }

    let users = executor.users.users_by_email(&recipients).await?;
    if users.is_empty() {
        return Ok(Reported::failed("No valid users found for notification"));
    }

    for user in &users {
        executor
            .notifications
            .create(NewNotification {
                user_id: user.id,
                title: title.clone(),
                body: body.clone(),
                kind: kind.clone(),
                icon: icon.clone(),
                link: link.clone(),
            })
            .await?;
    }
    Ok(Reported::ok(format!(
        "Notification sent to {} user(s)",
        users.len()
    )))
}
