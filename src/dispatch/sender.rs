//! Outbound HTTP delivery of one notification to one webhook.
//!
//! Request format:
//!
//! - `POST {callback}` with the JSON-serialized payload as body
//! - `{trigger_header}`: trigger id
//! - `{notification_header}`: notification id
//! - `{timestamp_header}`: unix seconds
//! - `{attempt_header}`: 1-based attempt number
//! - `{signature_header}`: `sha256=hex(HMAC-SHA256(secret, "{timestamp}.{body}"))`
//!
//! Header names come from `SenderConfig`; defaults are the `X-Webhook-*`
//! family below.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DeliveryError, HookError, HookResult, ValidationError};
use crate::notification::Notification;
use crate::signature;
use crate::webhook::Webhook;

/// HTTP sender settings.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub request_timeout_ms: u64,
    pub user_agent: String,
    pub signature_header: String,
    pub timestamp_header: String,
    pub trigger_header: String,
    pub notification_header: String,
    pub attempt_header: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            user_agent: concat!("kyrohook/", env!("CARGO_PKG_VERSION")).to_string(),
            signature_header: "X-Webhook-Signature".to_string(),
            timestamp_header: "X-Webhook-Timestamp".to_string(),
            trigger_header: "X-Webhook-Trigger".to_string(),
            notification_header: "X-Webhook-Notification".to_string(),
            attempt_header: "X-Webhook-Attempt".to_string(),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "sender.request_timeout_ms must be non-zero".to_string(),
            });
        }
        for name in [
            &self.signature_header,
            &self.timestamp_header,
            &self.trigger_header,
            &self.notification_header,
            &self.attempt_header,
        ] {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| ValidationError::InvalidConfig {
                reason: format!("invalid header name '{name}'"),
            })?;
        }
        Ok(())
    }
}

/// Successful delivery details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status returned by the endpoint.
    pub status: u16,
}

/// Performs a single delivery attempt.
///
/// Implementations classify failures into `DeliveryError::Transient` or
/// `DeliveryError::Permanent`; retrying is the dispatcher's job.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(
        &self,
        webhook: &Webhook,
        notification: &Notification,
        attempt: u32,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Map a response status to a delivery outcome.
///
/// 2xx succeeds. 429 and 5xx are transient. Every other status is permanent,
/// including 408 and redirects. A client-side request timeout is still
/// transient; see `classify_request_error`.
pub fn classify_status(status: StatusCode) -> Result<DeliveryReceipt, DeliveryError> {
    let code = status.as_u16();
    if status.is_success() {
        return Ok(DeliveryReceipt { status: code });
    }

    let reason = format!("HTTP {code}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(DeliveryError::transient(reason, Some(code)))
    } else {
        Err(DeliveryError::permanent(reason, Some(code)))
    }
}

fn classify_request_error(err: &reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::transient(format!("request timeout: {err}"), None)
    } else if err.is_connect() {
        DeliveryError::transient(format!("connection failed: {err}"), None)
    } else if err.is_builder() {
        DeliveryError::permanent(format!("invalid request: {err}"), None)
    } else {
        DeliveryError::transient(format!("request error: {err}"), None)
    }
}

/// Parse and vet a callback URI. Only absolute http(s) URLs are deliverable.
pub fn parse_callback(callback: &str) -> Result<Url, DeliveryError> {
    let url = Url::parse(callback)
        .map_err(|e| DeliveryError::permanent(format!("malformed callback URI: {e}"), None))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DeliveryError::permanent(
            format!("unsupported callback scheme '{other}'"),
            None,
        )),
    }
}

/// reqwest-backed sender.
#[derive(Debug, Clone)]
pub struct HttpWebhookSender {
    client: Client,
    config: SenderConfig,
}

impl HttpWebhookSender {
    /// Build a sender with its own HTTP client.
    ///
    /// # Errors
    /// Returns `HookError::Validation` for bad config and `HookError::Internal`
    /// if the HTTP client cannot be built.
    pub fn new(config: SenderConfig) -> HookResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HookError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Build a sender around an existing client (shared pools, custom TLS).
    pub fn with_client(client: Client, config: SenderConfig) -> HookResult<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    fn headers(
        &self,
        notification: &Notification,
        secret: &str,
        body: &[u8],
        attempt: u32,
    ) -> Result<HeaderMap, DeliveryError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = signature::signature_header_value(secret, &timestamp, body);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let pairs = [
            (&self.config.trigger_header, notification.trigger_id().to_string()),
            (&self.config.notification_header, notification.id().to_string()),
            (&self.config.timestamp_header, timestamp),
            (&self.config.attempt_header, attempt.to_string()),
            (&self.config.signature_header, signature),
        ];
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DeliveryError::permanent(format!("invalid header name: {e}"), None))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| DeliveryError::permanent(format!("invalid header value: {e}"), None))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(
        &self,
        webhook: &Webhook,
        notification: &Notification,
        attempt: u32,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let (Some(secret), Some(callback)) = (webhook.secret.as_deref(), webhook.callback.as_deref())
        else {
            return Err(DeliveryError::permanent(
                "webhook credentials were not unprotected",
                None,
            ));
        };

        let url = parse_callback(callback)?;
        let body = serde_json::to_vec(notification.payload())
            .map_err(|e| DeliveryError::permanent(format!("failed to serialize payload: {e}"), None))?;
        let headers = self.headers(notification, secret, &body, attempt)?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        classify_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::OK), Ok(DeliveryReceipt { status: 200 }));
        assert_eq!(
            classify_status(StatusCode::NO_CONTENT),
            Ok(DeliveryReceipt { status: 204 })
        );

        for transient in [500u16, 502, 503, 504, 429] {
            let err = classify_status(StatusCode::from_u16(transient).unwrap()).unwrap_err();
            assert!(err.is_retryable(), "{transient} should be transient");
            assert_eq!(err.status(), Some(transient));
        }

        for permanent in [400u16, 401, 403, 404, 408, 410, 422, 301, 302] {
            let err = classify_status(StatusCode::from_u16(permanent).unwrap()).unwrap_err();
            assert!(!err.is_retryable(), "{permanent} should be permanent");
        }
    }

    #[test]
    fn callback_parsing() {
        assert!(parse_callback("https://example.com/hook").is_ok());
        assert!(parse_callback("http://127.0.0.1:8080/x?y=1").is_ok());

        let err = parse_callback("not a url").unwrap_err();
        assert!(!err.is_retryable());
        let err = parse_callback("ftp://example.com/file").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn config_validation() {
        assert!(SenderConfig::default().validate().is_ok());

        let bad_header = SenderConfig {
            signature_header: "bad header".to_string(),
            ..SenderConfig::default()
        };
        assert!(bad_header.validate().is_err());

        let zero_timeout = SenderConfig {
            request_timeout_ms: 0,
            ..SenderConfig::default()
        };
        assert!(HttpWebhookSender::new(zero_timeout).is_err());
    }

    #[tokio::test]
    async fn missing_credentials_is_permanent() {
        let sender = HttpWebhookSender::new(SenderConfig::default()).unwrap();
        let webhook = Webhook {
            id: crate::webhook::WebhookId::new(),
            is_paused: false,
            filters: Vec::new(),
            protected_secret: String::new(),
            protected_callback: String::new(),
            secret: None,
            callback: None,
        };
        let err = sender
            .send(&webhook, &Notification::new("t"), 1)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let sender = HttpWebhookSender::new(SenderConfig {
            request_timeout_ms: 2_000,
            ..SenderConfig::default()
        })
        .unwrap();
        let webhook = Webhook {
            id: crate::webhook::WebhookId::new(),
            is_paused: false,
            filters: Vec::new(),
            protected_secret: String::new(),
            protected_callback: String::new(),
            secret: Some("s".to_string()),
            // Port 9 (discard) on loopback is closed on any sane test host.
            callback: Some("http://127.0.0.1:9/hook".to_string()),
        };
        let err = sender
            .send(&webhook, &Notification::new("t"), 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
