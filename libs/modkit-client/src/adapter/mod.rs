//! Response adapter chain.
//!
//! Adapters turn the outcome of an exchange into the shape an operation
//! declares. For a declared return type such as
//! `Eventual<Option<Vec<User>>>` the registry picks one adapter per wrapper,
//! outermost first, and composes them into a single [`AdaptFn`] once per
//! endpoint.

mod adapted;
mod builtin;

pub use adapted::{
    Adapted, Eventual, FromAdapted, Recoverable, RecoverableResponse, from_plain,
};
pub use builtin::{
    CallbackAdapter, EventualAdapter, OptionAdapter, PlainAdapter, RecoverableAdapter,
    ResultAdapter, StatusAdapter, VecAdapter,
};

use crate::args::Arguments;
use crate::codec::Codecs;
use crate::contract::Endpoint;
use crate::error::ClientError;
use crate::outcome::{Executor, Outcome};
use crate::types::TypeDescriptor;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

struct InvocationInner {
    arguments: Arguments,
    head: OnceLock<ResponseHead>,
    executor: Executor,
    codecs: Codecs,
}

/// Per-call context handed to adapters: the call arguments, the response
/// head once it arrived, the executor and the codecs.
#[derive(Clone)]
pub struct Invocation(Arc<InvocationInner>);

impl Invocation {
    #[must_use]
    pub fn new(arguments: Arguments, executor: Executor, codecs: Codecs) -> Self {
        Self(Arc::new(InvocationInner {
            arguments,
            head: OnceLock::new(),
            executor,
            codecs,
        }))
    }

    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.0.arguments
    }

    /// Response head; `None` until the response arrived or when the call
    /// failed before that.
    #[must_use]
    pub fn head(&self) -> Option<&ResponseHead> {
        self.0.head.get()
    }

    /// First write wins.
    pub(crate) fn record_head(&self, head: ResponseHead) {
        let _ = self.0.head.set(head);
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.0.executor
    }

    #[must_use]
    pub fn codecs(&self) -> &Codecs {
        &self.0.codecs
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("arguments", &self.0.arguments.len())
            .field("head", &self.0.head.get())
            .field("executor", &self.0.executor)
            .finish_non_exhaustive()
    }
}

/// Composed transformation from a raw outcome to the declared shape.
pub type AdaptFn =
    Arc<dyn Fn(Outcome<Value>, &Invocation) -> Result<Adapted, ClientError> + Send + Sync>;

/// Pluggable strategy for one wrapper shape.
pub trait ResponseAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this adapter handles the endpoint's (view) return type.
    fn test(&self, endpoint: &Endpoint) -> bool;

    /// Type left once this adapter's wrapper is stripped.
    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor;

    /// Wraps `downstream`, the already composed function for the inner type.
    fn compose(&self, endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn;

    /// Whether the wrapper describes the body itself (a collection) rather
    /// than the delivery of the body.
    fn shapes_body(&self) -> bool {
        false
    }

    /// Whether the composed function returns before the outcome settles.
    /// A chain whose outermost adapter does not return early blocks the
    /// caller until the response arrives.
    fn returns_early(&self) -> bool {
        false
    }
}

/// Ordered adapter registry; registration order is priority.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ResponseAdapter>>,
}

impl AdapterRegistry {
    /// Registry without adapters; every endpoint gets the plain terminal.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Built-in adapters in priority order.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(CallbackAdapter)
            .register(EventualAdapter)
            .register(RecoverableAdapter)
            .register(ResultAdapter)
            .register(StatusAdapter)
            .register(OptionAdapter)
            .register(VecAdapter)
    }

    /// Appends `adapter` with the lowest priority.
    #[must_use]
    pub fn register(mut self, adapter: impl ResponseAdapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Inserts `adapter` with the highest priority.
    #[must_use]
    pub fn register_first(mut self, adapter: impl ResponseAdapter + 'static) -> Self {
        self.adapters.insert(0, Arc::new(adapter));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Builds the chain for `endpoint`.
    #[must_use]
    pub fn chain(&self, endpoint: &Endpoint) -> AdapterChain {
        let mut selection = Selection::default();
        let function = self.select(endpoint, &mut selection);
        AdapterChain {
            function,
            layers: selection.layers,
            body_type: selection
                .body_type
                .unwrap_or_else(|| endpoint.return_type().clone()),
            blocking: selection.blocking.unwrap_or(true),
        }
    }

    /// Picks the first unused matching adapter, recurses on the stripped
    /// view, then composes outer-around-inner.
    fn select(&self, view: &Endpoint, selection: &mut Selection) -> AdaptFn {
        let picked = self
            .adapters
            .iter()
            .enumerate()
            .find(|(index, adapter)| !selection.used.contains(index) && adapter.test(view));

        let Some((index, adapter)) = picked else {
            selection.layers.push(PlainAdapter::NAME);
            if selection.body_type.is_none() {
                selection.body_type = Some(view.return_type().clone());
            }
            return PlainAdapter::terminal(view);
        };

        selection.used.push(index);
        selection.layers.push(adapter.name());
        if selection.blocking.is_none() {
            selection.blocking = Some(!adapter.returns_early());
        }
        if adapter.shapes_body() && selection.body_type.is_none() {
            selection.body_type = Some(view.return_type().clone());
        }
        let inner = view.with_return_type(adapter.adapted(view));
        let downstream = self.select(&inner, selection);
        adapter.compose(view, downstream)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.adapters.iter().map(|a| a.name()))
            .finish()
    }
}

/// State of one chain selection walk.
#[derive(Default)]
struct Selection {
    used: Vec<usize>,
    layers: Vec<&'static str>,
    body_type: Option<TypeDescriptor>,
    /// Set by the outermost adapter.
    blocking: Option<bool>,
}

/// Composed, per-endpoint adapter chain. Built once, read-only afterwards.
#[derive(Clone)]
pub struct AdapterChain {
    function: AdaptFn,
    layers: Vec<&'static str>,
    body_type: TypeDescriptor,
    blocking: bool,
}

impl AdapterChain {
    /// Adapter names, outermost first, ending with the terminal.
    #[must_use]
    pub fn layers(&self) -> &[&'static str] {
        &self.layers
    }

    /// Type the response body is decoded into.
    #[must_use]
    pub fn body_type(&self) -> &TypeDescriptor {
        &self.body_type
    }

    /// Whether applying the chain waits for the response on the calling
    /// thread.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// # Errors
    /// Returns whatever the composed adapters raise, e.g. the failure of a
    /// plain shape.
    pub fn apply(
        &self,
        outcome: Outcome<Value>,
        invocation: &Invocation,
    ) -> Result<Adapted, ClientError> {
        (self.function)(outcome, invocation)
    }
}

impl fmt::Debug for AdapterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterChain")
            .field("layers", &self.layers)
            .field("body_type", &self.body_type.to_string())
            .field("blocking", &self.blocking)
            .finish_non_exhaustive()
    }
}
