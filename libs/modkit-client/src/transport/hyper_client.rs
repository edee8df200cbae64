use super::{DefaultHeadersLayer, HttpRequest, RawResponse, Transport, TransportError};
use crate::config::ClientConfig;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::{Service, ServiceBuilder, ServiceExt};

type ServiceFuture = BoxFuture<'static, Result<Response<Incoming>, TransportError>>;

/// Buffered service at the top of the stack
type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Default transport: a pooled hyper client behind a tower middleware stack.
///
/// Cloning is cheap; clones share the connection pool and the buffer worker.
#[derive(Clone)]
pub struct HyperTransport {
    service: BufferedService,
    max_body_size: usize,
    allow_insecure_http: bool,
}

impl HyperTransport {
    /// Builds the transport from `config`. Must be called inside a tokio
    /// runtime: the buffer worker is spawned on it.
    ///
    /// # Errors
    /// Returns [`TransportError`] when there is no runtime, TLS cannot be
    /// initialized, a default header is invalid, or insecure HTTP is
    /// requested in a release build without the `allow-insecure-http`
    /// feature.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Transport(Box::new(e)))?;

        if config.allow_insecure_http {
            if !cfg!(any(debug_assertions, feature = "allow-insecure-http")) {
                return Err(TransportError::InsecureScheme("http".to_owned()));
            }
            tracing::warn!(
                target: "modkit_client::security",
                "insecure HTTP enabled; use only for testing with mock servers"
            );
        }

        let timeout = config.request_timeout;
        let https = build_https_connector(config.allow_insecure_http)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout only takes effect with a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let headers_layer = DefaultHeadersLayer::try_new(
            &config.user_agent,
            config
                .default_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?;

        // Request flow (outer to inner):
        //   Buffer -> LoadShed/Concurrency -> ErrorMapping -> Timeout ->
        //   DefaultHeaders -> hyper_client
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers_layer)
            .service(hyper_client);
        let service = service.map_err(move |e: tower::BoxError| map_tower_error(e, timeout));
        let mut boxed_service = service.boxed_clone();

        if let Some(limit) = config.max_concurrent_requests
            && limit < usize::MAX
        {
            let limited_service = ServiceBuilder::new()
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(limit))
                .service(boxed_service);
            boxed_service = limited_service.map_err(map_load_shed_error).boxed_clone();
        }

        let buffer_capacity = config.buffer_capacity.max(1);
        let service: BufferedService = Buffer::new(boxed_service, buffer_capacity);

        Ok(Self {
            service,
            max_body_size: config.max_body_size,
            allow_insecure_http: config.allow_insecure_http,
        })
    }

    fn check_scheme(&self, request: &HttpRequest) -> Result<http::Uri, TransportError> {
        match request.url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => return Err(TransportError::InsecureScheme("http".to_owned())),
            other => {
                return Err(TransportError::InvalidUri {
                    url: request.url.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }
        request
            .url
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::InvalidUri {
                url: request.url.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Transport for HyperTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let uri = self.check_scheme(&request);
        let mut service = self.service.clone();
        let limit = self.max_body_size;

        async move {
            let mut http_request = Request::builder()
                .method(request.method)
                .uri(uri?)
                .body(Full::new(request.body.unwrap_or_default()))?;
            *http_request.headers_mut() = request.headers;

            try_acquire_buffer_slot(&mut service).await?;
            let response = service.call(http_request).await.map_err(map_buffer_error)?;

            let (parts, body) = response.into_parts();
            Ok::<_, TransportError>(RawResponse {
                status: parts.status,
                headers: parts.headers,
                body: read_body_limited(body, limit).boxed(),
            })
        }
        .boxed()
    }

    fn runtime_bound(&self) -> bool {
        true
    }
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("max_body_size", &self.max_body_size)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .finish_non_exhaustive()
    }
}

/// Reads the body, failing once more than `limit` bytes arrived.
async fn read_body_limited(body: Incoming, limit: usize) -> Result<Bytes, TransportError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| TransportError::Transport(Box::new(e)))?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(TransportError::BodyTooLarge { limit });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

fn build_https_connector(
    allow_http: bool,
) -> Result<HttpsConnector<HttpConnector>, TransportError> {
    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    let builder = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(provider)
        .map_err(|e| TransportError::Tls(Box::new(e)))?;
    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}

/// Keeps typed errors boxed by tower middleware; timeouts carry the
/// configured duration.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> TransportError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return TransportError::Timeout(timeout);
    }
    match err.downcast::<TransportError>() {
        Ok(err) => *err,
        Err(other) => TransportError::Transport(other),
    }
}

fn map_load_shed_error(err: tower::BoxError) -> TransportError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        return TransportError::Overloaded;
    }
    match err.downcast::<TransportError>() {
        Ok(err) => *err,
        Err(other) => TransportError::Transport(other),
    }
}

fn map_buffer_error(err: tower::BoxError) -> TransportError {
    match err.downcast::<TransportError>() {
        Ok(err) => *err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            TransportError::ServiceClosed
        }
    }
}

/// Fails fast with [`TransportError::Overloaded`] when the buffer is full.
async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), TransportError> {
    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(TransportError::Overloaded),
    }
}
