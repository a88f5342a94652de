//! Webhook client backed by `ureq`.
//!
//! `ureq` is synchronous, so each call runs inside
//! `tokio::task::spawn_blocking`. Non-2xx statuses are returned as
//! responses rather than errors so the caller can report status and body.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use super::{DeliveryError, HttpMethod, WebhookClient, WebhookRequest, WebhookResponse};

#[derive(Debug, Clone, Copy, Default)]
pub struct UreqWebhookClient;

impl UreqWebhookClient {
    pub fn new() -> Self {
        UreqWebhookClient
    }
}

#[async_trait]
impl WebhookClient for UreqWebhookClient {
    async fn request(&self, request: WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
        tokio::task::spawn_blocking(move || call_blocking(request))
            .await
            .map_err(|e| DeliveryError::Transport {
                message: format!("task join error: {}", e),
            })?
    }
}

fn call_blocking(request: WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(request.timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let WebhookRequest {
        method,
        url,
        headers,
        payload,
        ..
    } = request;

    let result = match method {
        HttpMethod::Get => {
            let mut builder = with_headers(agent.get(&url), &headers);
            for (key, value) in query_pairs(&payload) {
                builder = builder.query(key, value);
            }
            builder.call()
        }
        HttpMethod::Post => with_headers(agent.post(&url), &headers).send_json(&payload),
        HttpMethod::Put => with_headers(agent.put(&url), &headers).send_json(&payload),
        HttpMethod::Patch => with_headers(agent.patch(&url), &headers).send_json(&payload),
        HttpMethod::Delete => with_headers(agent.delete(&url), &headers)
            .force_send_body()
            .send_json(&payload),
    };

    let response = result.map_err(|e| DeliveryError::Transport {
        message: e.to_string(),
    })?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .read_to_string()
        .map_err(|e| DeliveryError::Transport {
            message: format!("failed to read response body: {}", e),
        })?;
    Ok(WebhookResponse { status, body })
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &BTreeMap<String, String>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

/// Top-level payload keys as query parameters. Strings are sent bare,
/// anything else as its JSON text.
fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    let Some(map) = payload.as_object() else {
        return vec![];
    };
    map.iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn get_payload_becomes_query() {
        let pairs = query_pairs(&json!({"a": "x", "b": 2, "c": null}));
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
        assert!(query_pairs(&json!([1, 2])).is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = UreqWebhookClient::new();
        let err = client
            .request(WebhookRequest {
                method: HttpMethod::Post,
                url: "http://127.0.0.1:1/hook".into(),
                headers: BTreeMap::new(),
                payload: json!({}),
                timeout: Duration::from_secs(2),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
    }
}
