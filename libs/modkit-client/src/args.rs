//! Call arguments.

use crate::adapter::{Adapted, FromAdapted};
use crate::error::{ClientError, Failure};
use crate::types::{Declared, TypeDescriptor, names};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub type SuccessFn = Arc<dyn Fn(Adapted) + Send + Sync>;
pub type FailureFn = Arc<dyn Fn(Failure) + Send + Sync>;

/// Callback passed as an argument to an operation with callback parameters.
#[derive(Clone)]
pub enum CallbackArg {
    Success(SuccessFn),
    Failure(FailureFn),
    Both(SuccessFn, FailureFn),
}

fn typed_success<T, F>(f: F) -> SuccessFn
where
    T: FromAdapted,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |adapted: Adapted| match T::from_adapted(adapted) {
        Ok(value) => f(value),
        Err(err) => tracing::warn!(error = %err, "callback value conversion failed"),
    })
}

impl CallbackArg {
    /// Success-only callback receiving the converted value.
    pub fn on_success<T, F>(f: F) -> Self
    where
        T: FromAdapted,
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::Success(typed_success(f))
    }

    pub fn on_failure<F>(f: F) -> Self
    where
        F: Fn(Failure) + Send + Sync + 'static,
    {
        Self::Failure(Arc::new(f))
    }

    /// Two-sided callback. A value that cannot be converted into `T` is
    /// delivered to `failure` as a decode failure.
    pub fn both<T, S, F>(success: S, failure: F) -> Self
    where
        T: FromAdapted,
        S: Fn(T) + Send + Sync + 'static,
        F: Fn(Failure) + Send + Sync + 'static,
    {
        let failure: FailureFn = Arc::new(failure);
        let on_error = failure.clone();
        let success: SuccessFn = Arc::new(move |adapted| match T::from_adapted(adapted) {
            Ok(value) => success(value),
            Err(ClientError::Failure(f)) => on_error(f),
            Err(other) => on_error(Failure::decode(other)),
        });
        Self::Both(success, failure)
    }

    #[must_use]
    pub fn accepts_success(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Both(..))
    }

    #[must_use]
    pub fn accepts_failure(&self) -> bool {
        matches!(self, Self::Failure(_) | Self::Both(..))
    }

    pub(crate) fn succeed(&self, value: Adapted) {
        match self {
            Self::Success(f) | Self::Both(f, _) => f(value),
            Self::Failure(_) => {}
        }
    }

    pub(crate) fn fail(&self, failure: Failure) {
        match self {
            Self::Failure(f) | Self::Both(_, f) => f(failure),
            Self::Success(_) => {}
        }
    }
}

impl fmt::Debug for CallbackArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self {
            Self::Success(_) => "Success",
            Self::Failure(_) => "Failure",
            Self::Both(..) => "Both",
        };
        write!(f, "CallbackArg::{side}")
    }
}

/// One positional argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// No value; the parameter is omitted from the request
    Absent,
    Value(Value),
    Callback(CallbackArg),
}

/// Positional arguments of one call.
///
/// Values are converted to JSON when pushed; a conversion error is kept and
/// reported as an encode failure when the call is dispatched.
#[derive(Debug, Default)]
pub struct Arguments {
    values: Vec<Argument>,
    error: Option<serde_json::Error>,
}

impl Arguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a serializable value; `None`/null values are absent.
    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::Null) => self.values.push(Argument::Absent),
            Ok(value) => self.values.push(Argument::Value(value)),
            Err(err) => {
                self.values.push(Argument::Absent);
                self.error.get_or_insert(err);
            }
        }
        self
    }

    #[must_use]
    pub fn absent(self) -> Self {
        self.push(Argument::Absent)
    }

    #[must_use]
    pub fn callback(self, callback: CallbackArg) -> Self {
        self.push(Argument::Callback(callback))
    }

    #[must_use]
    pub fn push(mut self, argument: Argument) -> Self {
        self.values.push(argument);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Argument> {
        self.values.get(position)
    }

    /// The value at `position`; `None` when absent or a callback.
    #[must_use]
    pub fn value(&self, position: usize) -> Option<&Value> {
        match self.values.get(position)? {
            Argument::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn callback_at(&self, position: usize) -> Option<&CallbackArg> {
        match self.values.get(position)? {
            Argument::Callback(callback) => Some(callback),
            _ => None,
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<serde_json::Error> {
        self.error.take()
    }
}

/// Declared type of a single-argument success callback parameter.
pub struct SuccessCallback<T>(PhantomData<T>);

/// Declared type of a single-argument failure callback parameter.
pub struct FailureCallback;

/// Declared type of a two-argument (success and failure) callback parameter.
pub struct Callback<T>(PhantomData<T>);

impl<T: Declared> Declared for SuccessCallback<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::SUCCESS_CALLBACK, [T::descriptor()])
    }
}

impl Declared for FailureCallback {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(
            names::FAILURE_CALLBACK,
            [TypeDescriptor::class(names::FAILURE)],
        )
    }
}

impl<T: Declared> Declared for Callback<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(
            names::CALLBACK,
            [T::descriptor(), TypeDescriptor::class(names::FAILURE)],
        )
    }
}
