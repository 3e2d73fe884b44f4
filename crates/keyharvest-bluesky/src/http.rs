//! XRPC transport over async reqwest with a blocking facade.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use serde::Serialize;

use crate::api::{SearchPage, Session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Shared tokio runtime driving every request.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Failed XRPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Non-success HTTP status.
    Status { status: u16, message: String },
    /// Connect, timeout or body transfer failure.
    Network(String),
    /// Response body did not match the expected shape.
    Decode(String),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Decode(message) => write!(f, "unexpected response: {message}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let status = e.status();
        let decode = e.is_decode();
        // Drop the URL so query strings never reach the logs
        let message = e.without_url().to_string();
        match status {
            Some(status) => Self::Status {
                status: status.as_u16(),
                message,
            },
            None if decode => Self::Decode(message),
            None => Self::Network(message),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate limit, server error or network failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 500..=599),
            Self::Network(_) => true,
            Self::Decode(_) => false,
        }
    }
}

/// The two XRPC calls the adapter needs.
///
/// Implemented over HTTP by [`HttpTransport`]; tests script it.
pub trait Transport {
    fn create_session(&self, identifier: &str, password: &str) -> Result<Session, HttpError>;

    fn search_posts(
        &self,
        access_token: &str,
        query: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<SearchPage, HttpError>;
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

/// XRPC over HTTPS against one PDS / entryway.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.base_url)
    }
}

impl Transport for HttpTransport {
    fn create_session(&self, identifier: &str, password: &str) -> Result<Session, HttpError> {
        let url = self.xrpc("com.atproto.server.createSession");
        let body = CreateSessionRequest {
            identifier,
            password,
        };
        let result: Result<Session, reqwest::Error> = SHARED_RUNTIME.handle().block_on(async {
            http_client()
                .post(&url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        });
        result.map_err(HttpError::from_reqwest)
    }

    fn search_posts(
        &self,
        access_token: &str,
        query: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<SearchPage, HttpError> {
        let url = self.xrpc("app.bsky.feed.searchPosts");
        let limit = limit.to_string();
        let mut params = vec![("q", query), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let result: Result<SearchPage, reqwest::Error> = SHARED_RUNTIME.handle().block_on(async {
            http_client()
                .get(&url)
                .bearer_auth(access_token)
                .query(&params)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        });
        result.map_err(HttpError::from_reqwest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> HttpError {
        HttpError::Status {
            status: code,
            message: "x".into(),
        }
    }

    #[test]
    fn rate_limit_and_server_errors_retry() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(HttpError::Network("reset".into()).is_retryable());
    }

    #[test]
    fn client_errors_do_not_retry() {
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!HttpError::Decode("missing field".into()).is_retryable());
    }

    #[test]
    fn status_accessor() {
        assert_eq!(status(401).status(), Some(401));
        assert_eq!(HttpError::Network("x".into()).status(), None);
        assert_eq!(status(429).to_string(), "HTTP 429: x");
    }

    #[test]
    fn xrpc_urls() {
        let transport = HttpTransport::new("https://bsky.social");
        assert_eq!(
            transport.xrpc("app.bsky.feed.searchPosts"),
            "https://bsky.social/xrpc/app.bsky.feed.searchPosts"
        );
    }
}
