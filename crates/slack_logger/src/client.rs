//! Webhook clients delivering [`WebhookPayload`]s.

use std::sync::Arc;
#[cfg(feature = "http-client")]
use std::time::Duration;

use parking_lot::Mutex;

use crate::{SlackLoggerError, WebhookPayload};

/// Body Slack answers with when it accepted a webhook message.
const ACCEPTED_BODY: &str = "ok";

/// Status code and body returned by the webhook endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body.
    pub body: String,
}

impl WebhookResponse {
    /// The response of an endpoint that accepted the message.
    pub fn accepted() -> Self {
        Self {
            status: 200,
            body: ACCEPTED_BODY.to_owned(),
        }
    }

    /// Returns `true` if the endpoint accepted the message.
    pub fn is_success(&self) -> bool {
        self.status == 200 && self.body == ACCEPTED_BODY
    }
}

/// Transport sending payloads to a chat webhook.
///
/// A single call is a single delivery attempt; implementations should not retry.
#[async_trait::async_trait]
pub trait WebhookClient: Send + Sync {
    /// Sends `payload` and returns the endpoint's response, whatever its status.
    async fn send(&self, payload: &WebhookPayload) -> Result<WebhookResponse, SlackLoggerError>;
}

/// Sends payloads to a Slack incoming webhook over HTTP.
#[cfg(feature = "http-client")]
#[derive(Clone, Debug)]
pub struct HttpWebhookClient {
    client: reqwest::Client,
    url: url::Url,
}

#[cfg(feature = "http-client")]
impl HttpWebhookClient {
    /// Creates a client posting to `webhook_url`, giving up on a request after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client cannot be built.
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self, SlackLoggerError> {
        let url = url::Url::parse(webhook_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Returns the webhook URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }
}

#[cfg(feature = "http-client")]
#[async_trait::async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn send(&self, payload: &WebhookPayload) -> Result<WebhookResponse, SlackLoggerError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(WebhookResponse { status, body })
    }
}

/// A client that keeps payloads in memory instead of sending them.
///
/// Every payload is serialized, logged at debug level and recorded; the client always answers
/// as if the message had been accepted. Clones share the recorded payloads.
#[derive(Clone, Debug, Default)]
pub struct DummyClient {
    sent: Arc<Mutex<Vec<String>>>,
}

impl DummyClient {
    /// Creates a client with no recorded payloads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the serialized payloads received so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Forgets all recorded payloads.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait::async_trait]
impl WebhookClient for DummyClient {
    async fn send(&self, payload: &WebhookPayload) -> Result<WebhookResponse, SlackLoggerError> {
        let serialized = payload.to_json()?;
        tracing::debug!(payload = %serialized, "Recorded webhook payload");
        self.sent.lock().push(serialized);
        Ok(WebhookResponse::accepted())
    }
}
