//! Transport interface.
//!
//! The client hands a fully assembled [`HttpRequest`] to a [`Transport`] and
//! receives the status and headers together with a deferred body. Transports
//! never retry; [`HyperTransport`] is the default implementation.

mod hyper_client;
mod layers;

pub use hyper_client::HyperTransport;
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};

use crate::error::BoxError;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Request ready to be sent.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Body that is read only when awaited.
pub type DeferredBody = BoxFuture<'static, Result<Bytes, TransportError>>;

/// Status line, headers and deferred body of a response.
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: DeferredBody,
}

impl RawResponse {
    /// Response with an already available body.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            headers,
            body: async move { Ok(body) }.boxed(),
        }
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUri { url: String, reason: String },

    #[error("insecure scheme '{0}' rejected; HTTPS is required")]
    InsecureScheme(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("too many concurrent requests")]
    Overloaded,

    #[error("transport service closed")]
    ServiceClosed,

    #[error("TLS initialization failed: {0}")]
    Tls(#[source] BoxError),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

/// Executes one HTTP exchange.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>>;

    /// Whether the returned futures rely on background tasks of the tokio
    /// runtime the transport was built on (connection pools, buffer workers).
    fn runtime_bound(&self) -> bool {
        false
    }
}

impl<F, Fut> Transport for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send + 'static,
{
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        self(request).boxed()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_transport() {
        let transport = |request: HttpRequest| async move {
            Ok(RawResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                request.url.path().to_owned(),
            ))
        };
        let response = transport
            .execute(HttpRequest {
                method: Method::GET,
                url: Url::parse("https://example.com/echo").unwrap(),
                headers: HeaderMap::new(),
                body: None,
            })
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.await.unwrap(), Bytes::from_static(b"/echo"));
    }
}
