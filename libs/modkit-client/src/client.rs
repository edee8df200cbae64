//! Invocation dispatch.
//!
//! A [`Client`] owns an assembled contract, one adapter chain per endpoint
//! and the transport. [`Client::dispatch`] turns an operation name plus
//! [`Arguments`] into a request, executes it and runs the outcome through the
//! endpoint's chain.

use crate::adapter::{
    AdapterChain, AdapterRegistry, Adapted, FromAdapted, Invocation, ResponseAdapter, ResponseHead,
};
use crate::args::Arguments;
use crate::codec::{Codecs, FORM_URLENCODED};
use crate::config::ClientConfig;
use crate::contract::{Assembler, Contract, ContractDescription, Endpoint, ParamRole};
use crate::error::{ClientError, Failure};
use crate::outcome::{Executor, Outcome};
use crate::serializer::Fragment;
use crate::transport::{HttpRequest, HyperTransport, RawResponse, Transport};
use crate::types::{Declared, TypeDescriptor};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HeaderName};
use http::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Name of the built-in identity operation.
pub const DESCRIBE: &str = "describe";

struct ClientInner {
    contract: Contract,
    base_url: Url,
    transport: Arc<dyn Transport>,
    codecs: Codecs,
    chains: HashMap<Arc<str>, AdapterChain>,
    executor: Executor,
}

/// Client for one contract. Cloning is cheap.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

/// Builder for [`Client`].
pub struct ClientBuilder {
    description: Arc<ContractDescription>,
    config: ClientConfig,
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    codecs: Codecs,
    adapters: AdapterRegistry,
    executor: Option<Executor>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(description: Arc<ContractDescription>) -> Self {
        Self {
            description,
            config: ClientConfig::default(),
            base_url: None,
            transport: None,
            codecs: Codecs::defaults(),
            adapters: AdapterRegistry::with_defaults(),
            executor: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the configured base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Uses `transport` instead of the default [`HyperTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn codecs(mut self, codecs: Codecs) -> Self {
        self.codecs = codecs;
        self
    }

    /// Replaces the whole adapter registry.
    #[must_use]
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Adds `adapter` ahead of the built-in adapters.
    #[must_use]
    pub fn register_adapter(mut self, adapter: impl ResponseAdapter + 'static) -> Self {
        self.adapters = self.adapters.register_first(adapter);
        self
    }

    #[must_use]
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Assembles the contract and builds every endpoint's adapter chain.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] without a valid base URL,
    /// [`ClientError::Contract`] for an invalid contract, and
    /// [`ClientError::Transport`] when the default transport cannot be built
    /// (for example outside a tokio runtime).
    pub fn build(self) -> Result<Client, ClientError> {
        let raw_url = self
            .base_url
            .or_else(|| self.config.base_url.clone())
            .ok_or_else(|| ClientError::Config("base URL is required".to_owned()))?;
        let mut base_url = Url::parse(&raw_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{raw_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL '{raw_url}' cannot be a base"
            )));
        }

        let contract = Assembler::new()
            .with_root(base_url.path())
            .read(&self.description)?;
        base_url.set_path("");
        base_url.set_query(None);
        base_url.set_fragment(None);

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HyperTransport::new(&self.config).map_err(|e| ClientError::Transport(Box::new(e)))?,
            ),
        };

        let chains = contract
            .endpoints()
            .iter()
            .map(|endpoint| {
                let name: Arc<str> = endpoint.operation().name().into();
                (name, self.adapters.chain(endpoint))
            })
            .collect();

        Ok(Client(Arc::new(ClientInner {
            contract,
            base_url,
            transport,
            codecs: self.codecs,
            chains,
            executor: self.executor.unwrap_or_else(Executor::current),
        })))
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("contract", &self.description.name())
            .field("base_url", &self.base_url)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn builder(description: Arc<ContractDescription>) -> ClientBuilder {
        ClientBuilder::new(description)
    }

    #[must_use]
    pub fn contract(&self) -> &Contract {
        &self.0.contract
    }

    /// Scheme and authority requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.0.base_url
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.0.executor
    }

    /// Adapter chain built for `operation`.
    #[must_use]
    pub fn chain(&self, operation: &str) -> Option<&AdapterChain> {
        self.0.chains.get(operation)
    }

    /// Calls `operation` and converts the result into `R`.
    ///
    /// # Errors
    /// Returns [`ClientError::ReturnTypeMismatch`] when `R` and the
    /// operation's declared return type are unrelated, and otherwise whatever
    /// [`Client::dispatch`] or the conversion raise.
    pub fn call<R>(&self, operation: &str, arguments: Arguments) -> Result<R, ClientError>
    where
        R: Declared + FromAdapted,
    {
        if let Some(endpoint) = self.0.contract.endpoints().select(operation) {
            let requested = R::descriptor();
            let declared = endpoint.return_type();
            if !requested.is_assignable_from(declared) && !declared.is_assignable_from(&requested)
            {
                return Err(ClientError::ReturnTypeMismatch {
                    operation: operation.to_owned(),
                    declared: endpoint.return_type().to_string(),
                    requested: requested.to_string(),
                });
            }
        }
        self.dispatch(operation, arguments)?.into_typed()
    }

    /// Untyped entry point.
    ///
    /// Endpoints go over HTTP. Other names are served by the contract's
    /// default operations, then by the identity operation `describe`.
    ///
    /// Blocking shapes on a current-thread tokio runtime drive the exchange
    /// on the calling thread. That only works for transports that do not
    /// depend on the runtime's background tasks, so such calls over
    /// [`HyperTransport`] are rejected instead of hanging.
    ///
    /// # Errors
    /// Returns [`ClientError::UnknownOperation`],
    /// [`ClientError::ArgumentCount`],
    /// [`ClientError::BlockingOnCurrentThread`], or a failure raised by the
    /// declared shape (for example a plain value over a failed call).
    pub fn dispatch(&self, operation: &str, arguments: Arguments) -> Result<Adapted, ClientError> {
        if let Some(endpoint) = self.0.contract.endpoints().select(operation) {
            let chain = self
                .0
                .chains
                .get(operation)
                .ok_or_else(|| ClientError::UnknownOperation(operation.to_owned()))?;
            return self.invoke(endpoint, chain, arguments);
        }
        if let Some(default) = self.0.contract.default_operation(operation) {
            return default.invoke(self, arguments);
        }
        if operation == DESCRIBE {
            return Ok(Adapted::Value(Value::String(self.to_string())));
        }
        Err(ClientError::UnknownOperation(operation.to_owned()))
    }

    fn invoke(
        &self,
        endpoint: &Endpoint,
        chain: &AdapterChain,
        mut arguments: Arguments,
    ) -> Result<Adapted, ClientError> {
        let expected = endpoint.parameters().len();
        if arguments.len() != expected {
            return Err(ClientError::ArgumentCount {
                operation: endpoint.operation().to_string(),
                expected,
                actual: arguments.len(),
            });
        }
        if chain.is_blocking()
            && self.0.executor.is_current_thread()
            && self.0.transport.runtime_bound()
        {
            return Err(ClientError::BlockingOnCurrentThread {
                operation: endpoint.operation().to_string(),
            });
        }

        let request = match arguments.take_error() {
            Some(err) => Err(Failure::encode(err)),
            None => self.build_request(endpoint, &arguments),
        };
        let invocation = Invocation::new(
            arguments,
            self.0.executor.clone(),
            self.0.codecs.clone(),
        );
        let outcome = match request {
            Ok(request) => {
                tracing::debug!(
                    operation = %endpoint.operation(),
                    method = %request.method,
                    url = %request.url,
                    "dispatching request"
                );
                self.execute(request, chain.body_type().clone(), invocation.clone())
            }
            Err(failure) => Outcome::Failure(failure),
        };
        chain.apply(outcome, &invocation)
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        arguments: &Arguments,
    ) -> Result<HttpRequest, Failure> {
        let mut headers = HeaderMap::new();
        for (name, value) in endpoint.headers().pairs() {
            append_header(&mut headers, name, value)?;
        }
        let mut cookies: Vec<(String, String)> = endpoint
            .cookies()
            .pairs()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let mut query: Vec<(String, String)> = endpoint
            .query()
            .pairs()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let mut path_values = HashMap::new();
        let mut form = Vec::new();
        let mut body: Option<(Bytes, String)> = None;

        for param in endpoint.parameters() {
            if param.role() == ParamRole::Callback {
                continue;
            }
            let Some(value) = arguments.value(param.position()) else {
                continue;
            };

            let Some(serializer) = param.serializer() else {
                let declared = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
                let (bytes, media) = self
                    .0
                    .codecs
                    .write(declared, value, param.ty())
                    .map_err(Failure::encode)?;
                body = Some((bytes, media));
                continue;
            };

            let name = param.name().unwrap_or_default();
            match serializer
                .serialize(name, param.ty(), value)
                .map_err(Failure::encode)?
            {
                Fragment::Path { name, value } => {
                    path_values.insert(name, urlencoding::encode(&value).into_owned());
                }
                Fragment::Headers(pairs) => {
                    for (name, value) in pairs {
                        append_header(&mut headers, &name, &value)?;
                    }
                }
                Fragment::Cookies(pairs) => cookies.extend(pairs),
                Fragment::Query(pairs) => query.extend(pairs),
                Fragment::Form(pairs) => form.extend(pairs),
                Fragment::Raw {
                    content_type,
                    bytes,
                } => {
                    let media =
                        content_type.unwrap_or_else(|| "application/octet-stream".to_owned());
                    body = Some((bytes, media));
                }
            }
        }

        let path = endpoint
            .path()
            .expand(|name| path_values.get(name).map(String::as_str))
            .map_err(|e| Failure::encode_message(e.to_string()))?;
        let mut url = self.0.base_url.clone();
        url.set_path(&path);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(&query);
        }

        if !cookies.is_empty() {
            let joined = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            append_header(&mut headers, COOKIE.as_str(), &joined)?;
        }

        if !form.is_empty() {
            if body.is_some() {
                return Err(Failure::encode_message(
                    "form fields cannot be combined with a request body",
                ));
            }
            let encoded = serde_urlencoded::to_string(&form).map_err(Failure::encode)?;
            body = Some((Bytes::from(encoded), FORM_URLENCODED.to_owned()));
        }

        let body = match body {
            Some((bytes, media)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    append_header(&mut headers, CONTENT_TYPE.as_str(), &media)?;
                }
                Some(bytes)
            }
            None => None,
        };

        Ok(HttpRequest {
            method: endpoint.method().clone(),
            url,
            headers,
            body,
        })
    }

    /// Starts the exchange and returns its pending outcome. On a
    /// multi-thread tokio executor the exchange is spawned right away;
    /// elsewhere it runs when the outcome is awaited or joined.
    fn execute(
        &self,
        request: HttpRequest,
        body_type: TypeDescriptor,
        invocation: Invocation,
    ) -> Outcome<Value> {
        let pending = self.0.transport.execute(request);
        let codecs = self.0.codecs.clone();

        let exchange = async move {
            let RawResponse {
                status,
                headers,
                body,
            } = match pending.await {
                Ok(response) => response,
                Err(err) => return Outcome::Failure(Failure::transport(err)),
            };
            tracing::trace!(status = status.as_u16(), "response received");
            invocation.record_head(ResponseHead {
                status,
                headers: headers.clone(),
            });

            let bytes = match body.await {
                Ok(bytes) => bytes,
                Err(err) => {
                    return Outcome::Failure(Failure::transport(err).with_response(status, headers));
                }
            };
            if !status.is_success() {
                return Outcome::Failure(Failure::status(status, headers, bytes));
            }
            if bytes.is_empty() || body_type.is_unit() {
                return Outcome::Empty;
            }

            let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
            match codecs.read(content_type, &bytes, &body_type) {
                Ok(value) => Outcome::Success(value),
                Err(err) => {
                    Outcome::Failure(Failure::decode(err).with_response(status, headers.clone()))
                }
            }
        };

        let spawn_on = match &self.0.executor {
            Executor::Tokio(handle) if !self.0.executor.is_current_thread() => Some(handle),
            Executor::Tokio(_) | Executor::Inline | Executor::Custom(_) => None,
        };
        match spawn_on {
            Some(handle) => {
                let task = handle.spawn(exchange);
                Outcome::lazy(async move {
                    task.await
                        .unwrap_or_else(|e| Outcome::Failure(Failure::transport(e)))
                })
            }
            None => Outcome::lazy(exchange),
        }
    }
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Failure> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(Failure::encode)?;
    let value = HeaderValue::from_str(value).map_err(Failure::encode)?;
    headers.append(name, value);
    Ok(())
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} client for {} ({} operations)",
            self.0.contract.name(),
            self.0.base_url,
            self.0.contract.endpoints().len()
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("contract", &self.0.contract.name())
            .field("base_url", &self.0.base_url.as_str())
            .field("executor", &self.0.executor)
            .finish_non_exhaustive()
    }
}
