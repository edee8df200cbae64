use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed cause carried by a [`Failure`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Contract assembly errors.
///
/// These are raised while a [`ContractDescription`](crate::ContractDescription)
/// is read into a [`Contract`](crate::Contract) and are never recovered: a
/// contract with one invalid operation is not built at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContractError {
    /// Operation carries no HTTP-method marker
    #[error("operation '{operation}' has no HTTP method marker")]
    MissingHttpMethod { operation: String },

    /// Operation carries more than one HTTP-method marker
    #[error("operation '{operation}' has {count} HTTP method markers, expected exactly one")]
    MultipleHttpMethods { operation: String, count: usize },

    /// More than one parameter plays the body role
    #[error("operation '{operation}' declares more than one body parameter")]
    MultipleBodies { operation: String },

    /// Callback parameter does not have one of the supported callback shapes
    #[error(
        "operation '{operation}': parameter {position} of type '{ty}' is not a success, failure or success+failure callback"
    )]
    InvalidCallback {
        operation: String,
        position: usize,
        ty: String,
    },

    /// A parameter has more than one role marker
    #[error("operation '{operation}': parameter {position} has more than one role marker")]
    MultipleRoles { operation: String, position: usize },

    /// Contract extends more than one parent
    #[error("contract '{contract}' extends {count} parents; only one parent is supported")]
    MultipleParents { contract: String, count: usize },

    /// Contract extends a parent that itself extends a parent
    #[error(
        "contract '{contract}' extends '{parent}', which extends another contract; only single-level inheritance is supported"
    )]
    InheritanceTooDeep { contract: String, parent: String },

    /// A contract-level type variable could not be substituted
    #[error("operation '{operation}': type variable '{variable}' of '{declared_on}' cannot be resolved")]
    UnresolvedTypeVariable {
        operation: String,
        variable: String,
        declared_on: String,
    },

    /// Meta-marker nested inside another meta-marker
    #[error("meta-marker '{name}' contains another meta-marker; only one level is expanded")]
    NestedMetaMarker { name: String },

    /// Header marker with an invalid name or value
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Path, query, header or cookie parameter without a name
    #[error("operation '{operation}': {role} parameter {position} has no name")]
    MissingParameterName {
        operation: String,
        position: usize,
        role: String,
    },

    /// Two operations share one name in the same contract
    #[error("contract '{contract}' declares operation '{operation}' twice")]
    DuplicateOperation { contract: String, operation: String },

    /// Path template is malformed (unbalanced braces, empty variable)
    #[error("operation '{operation}': invalid path template '{template}'")]
    InvalidPathTemplate { operation: String, template: String },
}

/// Classification of per-call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FailureKind {
    /// The exchange itself failed (connection, timeout, body read)
    Transport,
    /// The server answered with a non-2xx status
    Status,
    /// A 2xx body could not be decoded into the target type
    Decode,
    /// Arguments could not be encoded into the request
    Encode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::Encode => "encode",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct FailureInner {
    kind: FailureKind,
    message: String,
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

/// Structured per-call failure.
///
/// Cloning is cheap (shared handle); [`Failure::ptr_eq`] tells whether two
/// handles point at the same failure, which is how recovery combinators
/// that do not match are observed to pass the original failure through.
#[derive(Debug, Clone)]
pub struct Failure(Arc<FailureInner>);

impl Failure {
    fn new(kind: FailureKind, message: String) -> Self {
        Self(Arc::new(FailureInner {
            kind,
            message,
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cause: None,
        }))
    }

    fn with_cause(kind: FailureKind, cause: BoxError) -> Self {
        Self(Arc::new(FailureInner {
            kind,
            message: cause.to_string(),
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cause: Some(Arc::from(cause)),
        }))
    }

    /// Failure of the exchange itself.
    pub fn transport(cause: impl Into<BoxError>) -> Self {
        Self::with_cause(FailureKind::Transport, cause.into())
    }

    /// Non-2xx answer. The body is kept raw and decoded only on request.
    #[must_use]
    pub fn status(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let message = status
            .canonical_reason()
            .map_or_else(|| status.as_str().to_owned(), ToOwned::to_owned);
        Self(Arc::new(FailureInner {
            kind: FailureKind::Status,
            message,
            status: Some(status),
            headers,
            body,
            cause: None,
        }))
    }

    /// Undecodable success body.
    pub fn decode(cause: impl Into<BoxError>) -> Self {
        Self::with_cause(FailureKind::Decode, cause.into())
    }

    /// Arguments that could not be turned into a request.
    pub fn encode(cause: impl Into<BoxError>) -> Self {
        Self::with_cause(FailureKind::Encode, cause.into())
    }

    /// Encode failure without an underlying error value.
    #[must_use]
    pub fn encode_message(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Encode, message.into())
    }

    /// Attaches the response status and headers to a failure raised after the
    /// response head arrived (e.g. a decode failure). A shared failure is
    /// copied first; other handles keep the original.
    #[must_use]
    pub fn with_response(self, status: StatusCode, headers: HeaderMap) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.0);
        inner.status = Some(status);
        inner.headers = headers;
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.0.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0.message
    }

    /// Response status, present for status failures and for decode failures
    /// of a received response.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.0.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.0.headers
    }

    /// Raw response body of a status failure (empty otherwise).
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.0.body
    }

    /// Decodes the error body as JSON into `T`.
    ///
    /// # Errors
    /// Returns a decode failure when the body is not valid JSON for `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, Failure> {
        serde_json::from_slice(&self.0.body).map_err(Failure::decode)
    }

    /// Whether both handles refer to the same failure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.status {
            Some(status) if self.0.kind == FailureKind::Status => {
                write!(f, "HTTP {}: {}", status.as_u16(), self.0.message)
            }
            _ => write!(f, "{} failure: {}", self.0.kind, self.0.message),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0
            .cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Errors returned by [`Client`](crate::Client).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Contract could not be assembled
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// Per-call failure raised by a shape that does not encode failures
    #[error(transparent)]
    Failure(#[from] Failure),

    /// No endpoint, default operation or identity operation has this name
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// Argument list length does not match the declared parameters
    #[error("operation '{operation}' expects {expected} arguments, got {actual}")]
    ArgumentCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    /// Typed call requested a return type the contract does not declare
    #[error("operation '{operation}' returns '{declared}', which does not accept '{requested}'")]
    ReturnTypeMismatch {
        operation: String,
        declared: String,
        requested: String,
    },

    /// Adapted value has a different shape than the requested Rust type
    #[error("expected {expected} value, got {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    /// A blocking return shape was called on a current-thread tokio runtime
    /// whose only thread also drives the transport
    #[error(
        "operation '{operation}' blocks until the response arrives, which cannot complete \
         on a current-thread tokio runtime; declare an Eventual return or use a \
         multi-thread runtime"
    )]
    BlockingOnCurrentThread { operation: String },

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Default transport could not be constructed
    #[error("transport setup failed: {0}")]
    Transport(#[source] BoxError),
}

impl ClientError {
    /// The structured failure, when this error carries one.
    #[must_use]
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_failure_preserves_source() {
        let failure = Failure::transport(TestError("connection refused"));

        assert_eq!(failure.kind(), FailureKind::Transport);
        let source = failure.source().unwrap();
        let downcast = source.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcast.0, "connection refused");
    }

    #[test]
    fn test_status_failure_keeps_response_parts() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "abc".parse().unwrap());
        let failure = Failure::status(
            StatusCode::NOT_FOUND,
            headers,
            Bytes::from_static(br#"{"code":"missing"}"#),
        );

        assert_eq!(failure.kind(), FailureKind::Status);
        assert_eq!(failure.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(failure.headers().get("x-trace").unwrap(), "abc");
        assert_eq!(failure.to_string(), "HTTP 404: Not Found");

        let body: serde_json::Value = failure.body_as().unwrap();
        assert_eq!(body["code"], "missing");
    }

    #[test]
    fn test_clone_shares_identity() {
        let failure = Failure::encode_message("bad argument");
        let copy = failure.clone();
        let other = Failure::encode_message("bad argument");

        assert!(failure.ptr_eq(&copy));
        assert!(!failure.ptr_eq(&other));
    }

    #[test]
    fn test_with_response_on_shared_failure() {
        let failure = Failure::decode(TestError("trailing characters"));
        let original = failure.clone();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        let enriched = failure.with_response(StatusCode::OK, headers);

        assert_eq!(enriched.status_code(), Some(StatusCode::OK));
        assert_eq!(enriched.headers()["content-type"], "application/json");
        assert_eq!(enriched.kind(), FailureKind::Decode);
        assert!(enriched.source().unwrap().is::<TestError>());
        assert!(!enriched.ptr_eq(&original));
        assert_eq!(original.status_code(), None);
        assert!(original.headers().is_empty());
    }

    #[test]
    fn test_client_error_exposes_failure() {
        let err = ClientError::from(Failure::decode(TestError("eof")));
        assert_eq!(err.as_failure().unwrap().kind(), FailureKind::Decode);
        assert!(ClientError::UnknownOperation("x".to_owned()).as_failure().is_none());
    }
}
