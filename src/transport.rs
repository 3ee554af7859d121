//! Outbound HTTP seam.
//!
//! Everything above this module talks to upstream through [`Transport`], so
//! flows can be exercised against stubs. Failures are classified into a
//! closed [`TransportErrorKind`] set at the point they occur; nothing
//! downstream inspects error text.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

/// Closed classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    ConnectionReset,
    ConnectionClosed,
    ConnectionRefused,
    /// Connection could not be established (name resolution, TCP or TLS).
    Connect,
    /// Deadline exceeded, including TLS handshake timeouts.
    Timeout,
    /// Upstream answered 503.
    ServiceUnavailable,
    /// Upstream answered 504.
    GatewayTimeout,
    /// Request could not be built (bad header value, bad URL).
    InvalidRequest,
    /// Response body could not be read.
    Body,
    Other,
}

impl TransportErrorKind {
    /// Whether a fresh attempt may succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionReset
                | Self::ConnectionClosed
                | Self::ConnectionRefused
                | Self::Connect
                | Self::Timeout
                | Self::ServiceUnavailable
                | Self::GatewayTimeout
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionReset => "connection reset",
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionRefused => "connection refused",
            Self::Connect => "connect failed",
            Self::Timeout => "timed out",
            Self::ServiceUnavailable => "service unavailable",
            Self::GatewayTimeout => "gateway timeout",
            Self::InvalidRequest => "invalid request",
            Self::Body => "body error",
            Self::Other => "transport error",
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Maps a 503/504 answer onto the retryable error kinds.
    pub(crate) fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::SERVICE_UNAVAILABLE => Some(Self::new(
                TransportErrorKind::ServiceUnavailable,
                "upstream returned 503",
            )),
            StatusCode::GATEWAY_TIMEOUT => Some(Self::new(
                TransportErrorKind::GatewayTimeout,
                "upstream returned 504",
            )),
            _ => None,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if let Some(kind) = classify_source_chain(&err) {
            kind
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_builder() {
            TransportErrorKind::InvalidRequest
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Walks the error's sources looking for an io or hyper error that pins
/// down the failure.
fn classify_source_chain(err: &(dyn std::error::Error + 'static)) -> Option<TransportErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            match io.kind() {
                ErrorKind::ConnectionReset => return Some(TransportErrorKind::ConnectionReset),
                ErrorKind::ConnectionRefused => return Some(TransportErrorKind::ConnectionRefused),
                ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                    return Some(TransportErrorKind::ConnectionClosed);
                }
                ErrorKind::TimedOut => return Some(TransportErrorKind::Timeout),
                _ => {}
            }
        }
        if let Some(h) = cause.downcast_ref::<hyper::Error>() {
            if h.is_timeout() {
                return Some(TransportErrorKind::Timeout);
            }
            if h.is_incomplete_message() || h.is_closed() || h.is_canceled() {
                return Some(TransportErrorKind::ConnectionClosed);
            }
        }
        source = cause.source();
    }
    None
}

fn header_value(value: &str, sensitive: bool) -> Result<HeaderValue, TransportError> {
    let mut v = HeaderValue::from_str(value).map_err(|_| {
        TransportError::new(TransportErrorKind::InvalidRequest, "header value is not visible ASCII")
    })?;
    v.set_sensitive(sensitive);
    Ok(v)
}

/// A fully described outbound call.
///
/// Owned and `Clone`, so every retry attempt sends a fresh copy.
/// Credential-bearing headers are marked sensitive and print as such.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl UpstreamRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::InvalidRequest`] if `value` is not a valid header value.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, TransportError> {
        self.headers.insert(name, header_value(value, false)?);
        Ok(self)
    }

    /// Set a header whose value must never be printed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::InvalidRequest`] if `value` is not a valid header value.
    pub fn sensitive_header(mut self, name: HeaderName, value: &str) -> Result<Self, TransportError> {
        self.headers.insert(name, header_value(value, true)?);
        Ok(self)
    }

    /// Attach `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::InvalidRequest`] if the token is not header-safe.
    pub fn bearer(self, token: &str) -> Result<Self, TransportError> {
        self.sensitive_header(header::AUTHORIZATION, &format!("Bearer {token}"))
    }

    /// Serialize `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::InvalidRequest`] if serialization fails.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, TransportError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| TransportError::new(TransportErrorKind::InvalidRequest, e.to_string()))?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(bytes);
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// A fully buffered upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl UpstreamResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Append a header; repeated names are kept (e.g. `Set-Cookie`).
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        let value = HeaderValue::from_str(value).expect("stub header value must be valid");
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The `Location` header, if present and readable.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] tagged with `operation`.
    pub fn json<T: DeserializeOwned>(&self, operation: &'static str) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode {
            operation,
            detail: e.to_string(),
        })
    }
}

/// Sends one request, no retries.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<UpstreamResponse, TransportError>> + Send;
}

/// Production transport over a shared `reqwest` connection pool.
///
/// Redirects are never followed and no cookie jar is kept: every request
/// carries its own credentials.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Configuration(format!("http client: {e}")))?;
        Ok(Self { http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The client must not follow redirects, or the cookie flow cannot see
    /// the authorize `Location` header.
    #[must_use]
    pub fn with_http_client(client: reqwest::Client) -> Self {
        Self { http: client }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let UpstreamRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        use TransportErrorKind::*;
        for kind in [
            ConnectionReset,
            ConnectionClosed,
            ConnectionRefused,
            Connect,
            Timeout,
            ServiceUnavailable,
            GatewayTimeout,
        ] {
            assert!(kind.is_retryable(), "{kind:?}");
        }
        for kind in [InvalidRequest, Body, Other] {
            assert!(!kind.is_retryable(), "{kind:?}");
        }
    }

    #[test]
    fn test_from_status_only_flags_503_and_504() {
        assert_eq!(
            TransportError::from_status(StatusCode::SERVICE_UNAVAILABLE).map(|e| e.kind()),
            Some(TransportErrorKind::ServiceUnavailable)
        );
        assert_eq!(
            TransportError::from_status(StatusCode::GATEWAY_TIMEOUT).map(|e| e.kind()),
            Some(TransportErrorKind::GatewayTimeout)
        );
        assert!(TransportError::from_status(StatusCode::BAD_REQUEST).is_none());
        assert!(TransportError::from_status(StatusCode::INTERNAL_SERVER_ERROR).is_none());
    }

    #[test]
    fn test_source_chain_classification() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(
            classify_source_chain(&err),
            Some(TransportErrorKind::ConnectionReset)
        );

        let err = Outer(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(classify_source_chain(&err), None);
    }

    #[test]
    fn test_bearer_header_is_redacted_in_debug() {
        let req = UpstreamRequest::new(Method::GET, "https://example.com/userinfo".parse().unwrap())
            .bearer("top-secret-token")
            .unwrap();
        assert!(req.headers().get(header::AUTHORIZATION).unwrap().is_sensitive());
        assert!(!format!("{req:?}").contains("top-secret-token"));
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let err = UpstreamRequest::new(Method::GET, "https://example.com".parse().unwrap())
            .header(header::COOKIE, "bad\nvalue")
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidRequest);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let req = UpstreamRequest::new(Method::PUT, "https://example.com".parse().unwrap())
            .json(&["puuid"])
            .unwrap();
        assert_eq!(req.body(), Some(&b"[\"puuid\"]"[..]));
        assert_eq!(
            req.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_response_json_decode_error_names_operation() {
        let resp = UpstreamResponse::new(StatusCode::OK, "not json");
        let err = resp.json::<serde_json::Value>("userinfo").unwrap_err();
        assert!(matches!(err, Error::Decode { operation: "userinfo", .. }));
    }
}
