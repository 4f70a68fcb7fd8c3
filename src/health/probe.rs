// ABOUTME: HTTP probing of health endpoints.
// ABOUTME: A GET with a hard timeout; 2xx and 3xx count as success.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What a single request observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Http(u16),
    Timeout,
    Error(String),
}

impl ProbeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeStatus::Http(code) if (200..400).contains(code))
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Http(code) => write!(f, "HTTP {}", code),
            ProbeStatus::Timeout => write!(f, "timed out"),
            ProbeStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Issues one GET against a URL.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> ProbeStatus;
}

/// `Probe` over plain HTTP/1.1 using the hyper client.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbe").finish_non_exhaustive()
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn get(&self, url: &str, timeout: Duration) -> ProbeStatus {
        let uri: hyper::Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => return ProbeStatus::Error(format!("invalid url {}: {}", url, e)),
        };

        let request = match Request::get(uri)
            .header(hyper::header::USER_AGENT, concat!("bascule/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
        {
            Ok(request) => request,
            Err(e) => return ProbeStatus::Error(e.to_string()),
        };

        match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => ProbeStatus::Http(response.status().as_u16()),
            Ok(Err(e)) => ProbeStatus::Error(e.to_string()),
            Err(_elapsed) => ProbeStatus::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_2xx_and_3xx() {
        assert!(ProbeStatus::Http(200).is_success());
        assert!(ProbeStatus::Http(204).is_success());
        assert!(ProbeStatus::Http(302).is_success());
        assert!(!ProbeStatus::Http(404).is_success());
        assert!(!ProbeStatus::Http(503).is_success());
        assert!(!ProbeStatus::Timeout.is_success());
        assert!(!ProbeStatus::Error("refused".into()).is_success());
    }

    #[tokio::test]
    async fn invalid_url_is_error() {
        let probe = HttpProbe::new();
        let status = probe.get("not a url", Duration::from_millis(100)).await;
        assert!(matches!(status, ProbeStatus::Error(_)));
    }
}
