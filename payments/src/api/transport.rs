//! Request/response values and the transport seam under the gateway.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::GatewayError;
use crate::http::{read_body, HttpClient, TransportError};

/// HTTP verbs the academy API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// One backend call. The gateway may replay it once after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Verb.
    pub method: ApiMethod,
    /// Path below the API base URL, starting with `/`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body for `POST`.
    pub body: Option<Value>,
    retried: bool,
    transient_retry: bool,
}

impl ApiRequest {
    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: ApiMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
            transient_retry: true,
        }
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: ApiMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            retried: false,
            transient_retry: false,
        }
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sends the request once even when it is a `GET`. For reads with side
    /// effects, such as creating a payment.
    pub fn without_transient_retry(mut self) -> Self {
        self.transient_retry = false;
        self
    }

    /// Whether the HTTP layer may retry transient failures.
    pub fn allows_transient_retry(&self) -> bool {
        self.transient_retry
    }

    /// Flags the request as already replayed after a refresh.
    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Whether the request has been replayed once.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Status and raw body of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Raw body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Builds a response from parts.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_slice(&self.body).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    /// `Ok(self)` for 2xx, otherwise [`GatewayError::Status`].
    pub fn into_result(self) -> Result<Self, GatewayError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GatewayError::Status {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}

/// Dispatches one request with an optional bearer credential.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request`; any HTTP status is a successful dispatch.
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError>;
}

/// [`HttpTransport`] over [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: HttpClient,
}

impl ReqwestTransport {
    /// Transport rooted at the academy API base URL.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        let method = match request.method {
            ApiMethod::Get => Method::GET,
            ApiMethod::Post => Method::POST,
        };
        let mut builder = self.http.request(method, &request.path);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = if request.allows_transient_retry() {
            self.http.send(builder).await?
        } else {
            self.http.send_once(builder).await?
        };
        let (status, body) = read_body(response).await?;
        Ok(ApiResponse { status, body })
    }
}
