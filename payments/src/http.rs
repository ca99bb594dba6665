//! Shared HTTP plumbing.
//!
//! [`HttpClient`] wraps a `reqwest::Client` with a base URL, a per-request
//! timeout, a `User-Agent`, and bounded exponential-backoff retries for
//! transient failures (HTTP 429, 5xx, timeouts, connection errors).
//!
//! Only `GET` requests are retried. A POST is never replayed here because
//! the backend may already have acted on it. When the retry budget runs out
//! on a bad status, the last response is handed back so that callers see
//! the real status code instead of a synthetic transport error.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use reqwest::{Method, Request, RequestBuilder, Response};
use thiserror::Error;
use tracing::{debug, warn};

/// Failures below the HTTP status layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within its deadline.
    #[error("request to {url} timed out")]
    Timeout {
        /// Target URL.
        url: String,
    },

    /// Connection, TLS or protocol failure.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Target URL.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The request could not be built (bad URL, bad header).
    #[error("invalid request: {0}")]
    Build(String),

    /// A response body could not be read or decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Source URL.
        url: String,
        /// Decoder error text.
        message: String,
    },
}

impl TransportError {
    fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// A base-URL-bound HTTP client with retry middleware.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_retries: usize,
}

impl HttpClient {
    /// Creates a client rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            max_retries,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Request builder with the timeout and `User-Agent` applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("academy-payments/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends a request, retrying transient failures of idempotent reads.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder
            .build()
            .map_err(|err| TransportError::Build(err.to_string()))?;

        if request.method() != Method::GET || self.max_retries == 0 {
            return self.execute_once(request).await;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries);

        let outcome = (|| async { self.attempt(&request).await })
            .retry(backoff)
            .when(Attempt::is_retryable)
            .notify(|attempt: &Attempt, delay: Duration| {
                warn!(url = %request.url(), ?delay, reason = %attempt.describe(), "retrying request");
            })
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(Attempt::BadStatus(response)) => Ok(response),
            Err(Attempt::Transient(err)) | Err(Attempt::Permanent(err)) => Err(err),
        }
    }

    /// Sends a request exactly once, whatever its method.
    pub async fn send_once(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder
            .build()
            .map_err(|err| TransportError::Build(err.to_string()))?;
        self.execute_once(request).await
    }

    async fn execute_once(&self, request: Request) -> Result<Response, TransportError> {
        let url = request.url().to_string();
        self.client
            .execute(request)
            .await
            .map_err(|err| TransportError::from_reqwest(&url, &err))
    }

    async fn attempt(&self, request: &Request) -> Result<Response, Attempt> {
        let url = request.url().to_string();
        let request = request.try_clone().ok_or_else(|| {
            Attempt::Permanent(TransportError::Build(
                "request body cannot be replayed".to_string(),
            ))
        })?;

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status == 429 || (500..600).contains(&status) {
                    debug!(%url, status, "transient status");
                    return Err(Attempt::BadStatus(response));
                }
                Ok(response)
            }
            Err(err) if err.is_timeout() || err.is_connect() => {
                Err(Attempt::Transient(TransportError::from_reqwest(&url, &err)))
            }
            Err(err) => Err(Attempt::Permanent(TransportError::from_reqwest(&url, &err))),
        }
    }
}

/// Reads the full body of a response.
pub async fn read_body(response: Response) -> Result<(u16, Bytes), TransportError> {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let body = response
        .bytes()
        .await
        .map_err(|err| TransportError::Decode {
            url,
            message: err.to_string(),
        })?;
    Ok((status, body))
}

#[derive(Debug)]
enum Attempt {
    BadStatus(Response),
    Transient(TransportError),
    Permanent(TransportError),
}

impl Attempt {
    fn is_retryable(&self) -> bool {
        !matches!(self, Attempt::Permanent(_))
    }

    fn describe(&self) -> String {
        match self {
            Attempt::BadStatus(response) => format!("status {}", response.status().as_u16()),
            Attempt::Transient(err) | Attempt::Permanent(err) => err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
