use super::ResponseHead;
use crate::codec::Codecs;
use crate::error::{ClientError, Failure, FailureKind};
use crate::outcome::{Outcome, Settled, StatusMatcher};
use crate::types::{Declared, TypeDescriptor, names};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::hash::BuildHasher;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Value produced by an adapter chain.
///
/// Each variant is the runtime form of one declared wrapper; [`FromAdapted`]
/// turns it back into the caller's Rust type.
pub enum Adapted {
    Unit,
    /// Decoded body; `Null` when the response had none
    Value(Value),
    Optional(Option<Box<Adapted>>),
    List(Vec<Adapted>),
    Result(Result<Box<Adapted>, Failure>),
    Status(StatusCode),
    Eventual(BoxFuture<'static, Result<Adapted, ClientError>>),
    Recoverable(RecoverableResponse),
}

impl Adapted {
    /// Short variant name used in shape errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Value(_) => "plain",
            Self::Optional(_) => "optional",
            Self::List(_) => "list",
            Self::Result(_) => "result",
            Self::Status(_) => "status",
            Self::Eventual(_) => "eventual",
            Self::Recoverable(_) => "recoverable",
        }
    }

    /// Converts into `T`.
    ///
    /// # Errors
    /// Returns [`ClientError::Shape`] when the value does not have `T`'s
    /// shape, or a decode failure when a plain value does not deserialize.
    pub fn into_typed<T: FromAdapted>(self) -> Result<T, ClientError> {
        T::from_adapted(self)
    }

    fn mismatch(self, expected: &'static str) -> ClientError {
        ClientError::Shape {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Debug for Adapted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("Unit"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Optional(value) => f.debug_tuple("Optional").field(value).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Result(result) => f.debug_tuple("Result").field(result).finish(),
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Eventual(_) => f.write_str("Eventual(..)"),
            Self::Recoverable(response) => f.debug_tuple("Recoverable").field(response).finish(),
        }
    }
}

/// Conversion from an adapted value into a Rust type.
pub trait FromAdapted: Sized {
    /// # Errors
    /// Returns [`ClientError::Shape`] or a decode failure.
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError>;
}

/// Deserializes a plain adapted value; used by [`declare_value!`](crate::declare_value).
///
/// # Errors
/// Returns a decode failure when the JSON does not fit `T`.
pub fn from_plain<T: DeserializeOwned>(adapted: Adapted) -> Result<T, ClientError> {
    let value = match adapted {
        Adapted::Value(value) => value,
        Adapted::Unit => Value::Null,
        other => return Err(other.mismatch("plain")),
    };
    serde_json::from_value(value).map_err(|e| Failure::decode(e).into())
}

/// Declares a plain (deserializable) type for typed calls.
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct User { id: String }
///
/// modkit_client::declare_value!(User);
/// modkit_client::declare_value!(Order => "orders.Order");
/// ```
#[macro_export]
macro_rules! declare_value {
    ($ty:ty) => {
        $crate::declare_value!($ty => stringify!($ty));
    };
    ($ty:ty => $name:expr) => {
        impl $crate::Declared for $ty {
            fn descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::class($name)
            }
        }

        impl $crate::FromAdapted for $ty {
            fn from_adapted(adapted: $crate::Adapted) -> ::std::result::Result<Self, $crate::ClientError> {
                $crate::adapter::from_plain(adapted)
            }
        }
    };
}

declare_value!(String);
declare_value!(bool);
declare_value!(i8);
declare_value!(i16);
declare_value!(i32);
declare_value!(i64);
declare_value!(u8);
declare_value!(u16);
declare_value!(u32);
declare_value!(u64);
declare_value!(f32);
declare_value!(f64);

impl FromAdapted for Value {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Value(value) => Ok(value),
            Adapted::Unit => Ok(Value::Null),
            other => Err(other.mismatch("plain")),
        }
    }
}

impl FromAdapted for () {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Unit | Adapted::Value(_) => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }
}

impl FromAdapted for StatusCode {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Status(status) => Ok(status),
            other => Err(other.mismatch("status")),
        }
    }
}

impl<T: FromAdapted> FromAdapted for Option<T> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Optional(None) | Adapted::Value(Value::Null) => Ok(None),
            Adapted::Optional(Some(inner)) => T::from_adapted(*inner).map(Some),
            value @ Adapted::Value(_) => T::from_adapted(value).map(Some),
            other => Err(other.mismatch("optional")),
        }
    }
}

impl<T: FromAdapted> FromAdapted for Vec<T> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::List(items) => items.into_iter().map(T::from_adapted).collect(),
            Adapted::Value(Value::Array(items)) => items
                .into_iter()
                .map(|item| T::from_adapted(Adapted::Value(item)))
                .collect(),
            Adapted::Value(Value::Null) => Ok(Vec::new()),
            other => Err(other.mismatch("list")),
        }
    }
}

impl<T: FromAdapted> FromAdapted for Result<T, Failure> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Result(Ok(inner)) => T::from_adapted(*inner).map(Ok),
            Adapted::Result(Err(failure)) => Ok(Err(failure)),
            other => Err(other.mismatch("result")),
        }
    }
}

impl<V: FromAdapted, S: BuildHasher + Default> FromAdapted for HashMap<String, V, S> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Value(Value::Object(entries)) => entries
                .into_iter()
                .map(|(k, v)| V::from_adapted(Adapted::Value(v)).map(|v| (k, v)))
                .collect(),
            Adapted::Value(Value::Null) => Ok(Self::default()),
            other => Err(other.mismatch("map")),
        }
    }
}

impl<V: FromAdapted> FromAdapted for BTreeMap<String, V> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Value(Value::Object(entries)) => entries
                .into_iter()
                .map(|(k, v)| V::from_adapted(Adapted::Value(v)).map(|v| (k, v)))
                .collect(),
            Adapted::Value(Value::Null) => Ok(Self::new()),
            other => Err(other.mismatch("map")),
        }
    }
}

/// Asynchronous result of a call.
#[must_use = "futures do nothing unless awaited"]
pub struct Eventual<T>(BoxFuture<'static, Result<T, ClientError>>);

impl<T> Eventual<T> {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        Self(future.boxed())
    }
}

impl<T> Future for Eventual<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_unpin(cx)
    }
}

impl<T: Declared> Declared for Eventual<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::EVENTUAL, [T::descriptor()])
    }
}

impl<T: FromAdapted + Send + 'static> FromAdapted for Eventual<T> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Eventual(pending) => Ok(Self::new(async move {
                pending.await.and_then(T::from_adapted)
            })),
            other => Err(other.mismatch("eventual")),
        }
    }
}

/// Untyped recoverable response produced by the recoverable adapter.
pub struct RecoverableResponse {
    pub(crate) outcome: Box<Outcome<Adapted>>,
    pub(crate) head: Option<ResponseHead>,
    pub(crate) codecs: Codecs,
}

impl fmt::Debug for RecoverableResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverableResponse")
            .field("outcome", &self.outcome)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Response whose failure can be inspected and recovered by the caller.
///
/// Unlike a plain value it never raises: status failures keep their status,
/// headers and raw body, and [`Recoverable::error_as`] decodes the error
/// body into any target type.
pub struct Recoverable<T> {
    outcome: Outcome<T>,
    head: Option<ResponseHead>,
    codecs: Codecs,
}

impl<T: Send + 'static> Recoverable<T> {
    /// Response status, or the failure's status when no response was read.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.head
            .as_ref()
            .map(|head| head.status)
            .or_else(|| self.failure().and_then(Failure::status_code))
    }

    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.head.as_ref().map(|head| &head.headers)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failure(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Decodes the error body with the client's codecs.
    ///
    /// Returns `None` when the response is not a failure.
    #[must_use]
    pub fn error_as<E: DeserializeOwned>(&self) -> Option<Result<E, Failure>> {
        let failure = self.failure()?;
        let content_type = failure
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let decoded = self
            .codecs
            .read(content_type, failure.body(), &TypeDescriptor::any())
            .map_err(Failure::decode)
            .and_then(|value| serde_json::from_value(value).map_err(Failure::decode));
        Some(decoded)
    }

    #[must_use]
    pub fn recover<F>(self, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.with_outcome(|o| o.recover(f))
    }

    #[must_use]
    pub fn recover_kind<F>(self, kind: FailureKind, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.with_outcome(|o| o.recover_kind(kind, f))
    }

    #[must_use]
    pub fn recover_status<F>(self, matcher: StatusMatcher, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.with_outcome(|o| o.recover_status(matcher, f))
    }

    pub fn map<U, F>(self, f: F) -> Recoverable<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Recoverable {
            outcome: self.outcome.map_value(f),
            head: self.head,
            codecs: self.codecs,
        }
    }

    #[must_use]
    pub fn into_outcome(self) -> Outcome<T> {
        self.outcome
    }

    /// # Errors
    /// Returns the failure when the response was not recovered.
    pub fn into_result(self) -> Result<Option<T>, Failure> {
        self.outcome.force()
    }

    fn with_outcome(self, f: impl FnOnce(Outcome<T>) -> Outcome<T>) -> Self {
        Self {
            outcome: f(self.outcome),
            head: self.head,
            codecs: self.codecs,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recoverable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recoverable")
            .field("outcome", &self.outcome)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

impl<T: Declared> Declared for Recoverable<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::RECOVERABLE, [T::descriptor()])
    }
}

/// Converts each settled value; conversion errors become decode failures.
fn convert_outcome<T: FromAdapted + Send + 'static>(outcome: Outcome<Adapted>) -> Outcome<T> {
    let converted = |adapted: Adapted| match T::from_adapted(adapted) {
        Ok(value) => Outcome::Success(value),
        Err(ClientError::Failure(failure)) => Outcome::Failure(failure),
        Err(other) => Outcome::Failure(Failure::decode(other)),
    };
    match outcome {
        Outcome::Success(adapted) => converted(adapted),
        Outcome::Failure(failure) => Outcome::Failure(failure),
        Outcome::Empty => Outcome::Empty,
        Outcome::Lazy(pending) => Outcome::lazy(async move {
            match pending.await.settled().await {
                Settled::Success(adapted) => converted(adapted),
                Settled::Failure(failure) => Outcome::Failure(failure),
                Settled::Empty => Outcome::Empty,
            }
        }),
    }
}

impl<T: FromAdapted + Send + 'static> FromAdapted for Recoverable<T> {
    fn from_adapted(adapted: Adapted) -> Result<Self, ClientError> {
        match adapted {
            Adapted::Recoverable(response) => Ok(Self {
                outcome: convert_outcome(*response.outcome),
                head: response.head,
                codecs: response.codecs,
            }),
            other => Err(other.mismatch("recoverable")),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: String,
    }

    declare_value!(User);

    #[test]
    fn test_declared_names_of_plain_types() {
        assert_eq!(User::descriptor(), TypeDescriptor::class("User"));
        assert_eq!(String::descriptor().to_string(), "String");
        assert_eq!(<Vec<i64>>::descriptor().to_string(), "Vec<i64>");
    }

    #[test]
    fn test_nested_conversion() {
        let adapted = Adapted::Optional(Some(Box::new(Adapted::List(vec![
            Adapted::Value(json!({"id": "a"})),
            Adapted::Value(json!({"id": "b"})),
        ]))));
        let users: Option<Vec<User>> = adapted.into_typed().unwrap();
        assert_eq!(
            users,
            Some(vec![User { id: "a".into() }, User { id: "b".into() }])
        );
    }

    #[test]
    fn test_lenient_plain_containers() {
        let ids: Vec<i64> = Adapted::Value(json!([1, 2])).into_typed().unwrap();
        assert_eq!(ids, [1, 2]);

        let none: Option<User> = Adapted::Value(Value::Null).into_typed().unwrap();
        assert!(none.is_none());

        let flags: HashMap<String, bool> = Adapted::Value(json!({"a": true})).into_typed().unwrap();
        assert!(flags["a"]);
    }

    #[test]
    fn test_shape_mismatch_and_decode_failure() {
        let err = Adapted::Status(StatusCode::OK)
            .into_typed::<Vec<User>>()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Shape {
                expected: "list",
                found: "status"
            }
        ));

        let err = Adapted::Value(json!({"name": 1}))
            .into_typed::<User>()
            .unwrap_err();
        assert_eq!(err.as_failure().unwrap().kind(), FailureKind::Decode);
    }

    #[test]
    fn test_result_keeps_failure_on_error_side() {
        let failure = Failure::status(StatusCode::CONFLICT, HeaderMap::new(), Bytes::new());
        let result: Result<User, Failure> = Adapted::Result(Err(failure.clone()))
            .into_typed()
            .unwrap();
        assert!(result.unwrap_err().ptr_eq(&failure));
    }

    #[tokio::test]
    async fn test_eventual_converts_when_awaited() {
        let adapted = Adapted::Eventual(async { Ok(Adapted::Value(json!("x"))) }.boxed());
        let eventual: Eventual<String> = adapted.into_typed().unwrap();
        assert_eq!(eventual.await.unwrap(), "x");
    }

    #[test]
    fn test_recoverable_error_body_and_recovery() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        let failure = Failure::status(
            StatusCode::NOT_FOUND,
            headers.clone(),
            Bytes::from_static(br#"{"id":"missing"}"#),
        );
        let response = RecoverableResponse {
            outcome: Box::new(Outcome::Failure(failure)),
            head: Some(ResponseHead {
                status: StatusCode::NOT_FOUND,
                headers,
            }),
            codecs: Codecs::defaults(),
        };

        let recoverable: Recoverable<User> = Adapted::Recoverable(response).into_typed().unwrap();
        assert_eq!(recoverable.status(), Some(StatusCode::NOT_FOUND));
        assert!(!recoverable.is_success());
        let body: User = recoverable.error_as().unwrap().unwrap();
        assert_eq!(body.id, "missing");

        let recovered = recoverable
            .recover_status(StatusMatcher::exact(StatusCode::NOT_FOUND), |_| {
                Outcome::Success(User { id: "fallback".into() })
            })
            .into_result()
            .unwrap();
        assert_eq!(recovered, Some(User { id: "fallback".into() }));
    }
}
