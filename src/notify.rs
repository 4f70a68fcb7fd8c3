// ABOUTME: Webhook notification of finished deployment cycles.
// ABOUTME: POSTs the JSON deployment record; failures are reported, never fatal.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Request;
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::state::DeploymentRecord;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid webhook url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to encode deployment record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("webhook returned HTTP {0}")]
    Status(u16),

    #[error("webhook timed out after {0:?}")]
    Timeout(Duration),
}

/// `notify` section of the project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotifySettings {
    #[serde(default)]
    pub webhook: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            webhook: None,
            timeout: default_timeout(),
        }
    }
}

/// Sends deployment records to a webhook.
#[derive(Clone)]
pub struct Notifier {
    url: hyper::Uri,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let uri = url
            .parse::<hyper::Uri>()
            .map_err(|e| NotifyError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if uri.scheme_str() != Some("http") {
            return Err(NotifyError::InvalidUrl {
                url: url.to_string(),
                reason: "only http:// webhooks are supported".to_string(),
            });
        }

        Ok(Self {
            url: uri,
            timeout,
            client: Client::builder(TokioExecutor::new()).build_http(),
        })
    }

    /// Build from settings; `None` when no webhook is configured.
    pub fn from_settings(settings: &NotifySettings) -> Result<Option<Self>, NotifyError> {
        settings
            .webhook
            .as_deref()
            .map(|url| Self::new(url, settings.timeout))
            .transpose()
    }

    pub async fn send(&self, record: &DeploymentRecord) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(record)?;
        let request = Request::post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, concat!("bascule/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))?
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        tracing::debug!(id = %record.id, "webhook notified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            Notifier::new("https://hooks.example.com/x", Duration::from_secs(1)),
            Err(NotifyError::InvalidUrl { .. })
        ));
        assert!(Notifier::new("http://127.0.0.1:9/hook", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn absent_webhook_builds_nothing() {
        let notifier = Notifier::from_settings(&NotifySettings::default()).unwrap();
        assert!(notifier.is_none());
    }
}
