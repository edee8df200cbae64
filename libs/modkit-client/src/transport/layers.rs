use super::TransportError;
use http::header::{HeaderName, USER_AGENT};
use http::{HeaderMap, HeaderValue, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that adds the user agent and the configured default headers
/// to every request. Headers the request already carries are never replaced.
#[derive(Clone)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// # Errors
    /// Returns [`TransportError::InvalidHeader`] for an invalid header value
    /// and [`TransportError::Transport`] for an invalid header name.
    pub fn try_new<'a>(
        user_agent: &str,
        defaults: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in defaults {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Transport(Box::new(e)))?;
            headers.append(name, HeaderValue::from_str(value)?);
        }
        Ok(Self {
            headers: Arc::new(headers),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for name in self.headers.keys() {
            if !req.headers().contains_key(name) {
                for value in self.headers.get_all(name) {
                    req.headers_mut().append(name.clone(), value.clone());
                }
            }
        }
        self.inner.call(req)
    }
}
