use std::time::Duration;

use serde_json::{Map, Value};

use super::{props, ActionExecutor, Reported};
use crate::delivery::{HttpMethod, WebhookRequest};
use crate::interpolate::Variables;

/// Transport failures are reported here rather than propagated, so the
/// message carries the `Webhook error:` prefix.
pub(super) async fn call_webhook(
    executor: &ActionExecutor,
    action_props: &Map<String, Value>,
    vars: &Variables,
) -> Reported {
    let url = props::string(action_props, "webhook_url").unwrap_or_default();
    if url.trim().is_empty() {
        return Reported::failed("Webhook URL not specified");
    }
    let method = props::string(action_props, "webhook_method")
        .and_then(|m| HttpMethod::parse(&m))
        .unwrap_or(HttpMethod::Post);
    let payload = match action_props.get("webhook_payload") {
        Some(payload @ (Value::Object(_) | Value::Array(_))) => vars.apply_json(payload),
        _ => Value::Object(Map::new()),
    };
    let timeout = props::seconds(action_props, "webhook_timeout")
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(executor.default_webhook_timeout);

    let request = WebhookRequest {
        method,
        url: url.trim().to_string(),
        headers: props::string_map(action_props, "webhook_headers"),
        payload,
        timeout,
    };

    match executor.webhooks.request(request).await {
        Ok(response) if response.is_success() => Reported::ok(format!(
            "Webhook called successfully. Status: {}",
            response.status
        )),
        Ok(response) => Reported::failed(format!(
            "Webhook failed. Status: {}, Body: {}",
            response.status, response.body
        )),
        Err(e) => Reported::failed(format!("Webhook error: {}", e)),
    }
}
