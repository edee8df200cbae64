//! Response outcome algebra.
//!
//! An [`Outcome`] is exactly one of success, failure, empty, or a pending
//! computation that will settle into one of the other three. Combinators on a
//! pending outcome return a new pending outcome; only [`Outcome::settled`],
//! [`Outcome::join`] and [`Outcome::subscribe`] drive it.

mod executor;

pub use executor::{Executor, SpawnFn};

use crate::error::{Failure, FailureKind};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use std::fmt;
use std::future::Future;

pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
    /// Completed without a body
    Empty,
    Lazy(BoxFuture<'static, Outcome<T>>),
}

/// Settled (non-pending) outcome.
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Success(T),
    Failure(Failure),
    Empty,
}

impl<T> Settled<T> {
    /// `Ok(None)` for an empty outcome.
    ///
    /// # Errors
    /// Returns the failure of a failed outcome.
    pub fn into_result(self) -> Result<Option<T>, Failure> {
        match self {
            Self::Success(value) => Ok(Some(value)),
            Self::Empty => Ok(None),
            Self::Failure(failure) => Err(failure),
        }
    }

    fn deliver(self, subscriber: &mut impl Subscriber<T>) {
        match self {
            Self::Success(value) => subscriber.on_success(Some(value)),
            Self::Empty => subscriber.on_success(None),
            Self::Failure(failure) => subscriber.on_failure(failure),
        }
        subscriber.on_done();
    }
}

impl<T> From<Settled<T>> for Outcome<T> {
    fn from(settled: Settled<T>) -> Self {
        match settled {
            Settled::Success(value) => Self::Success(value),
            Settled::Failure(failure) => Self::Failure(failure),
            Settled::Empty => Self::Empty,
        }
    }
}

/// Receiver of a settled outcome.
///
/// Exactly one of `on_success` / `on_failure` is called, then `on_done`,
/// whatever the variant. An empty outcome calls `on_success(None)`.
pub trait Subscriber<T>: Send {
    fn on_success(&mut self, value: Option<T>);

    fn on_failure(&mut self, failure: Failure);

    fn on_done(&mut self) {}
}

/// [`Subscriber`] built from two closures.
pub struct FnSubscriber<S, F> {
    success: S,
    failure: F,
}

impl<S, F> FnSubscriber<S, F> {
    pub fn new(success: S, failure: F) -> Self {
        Self { success, failure }
    }
}

impl<T, S, F> Subscriber<T> for FnSubscriber<S, F>
where
    S: FnMut(Option<T>) + Send,
    F: FnMut(Failure) + Send,
{
    fn on_success(&mut self, value: Option<T>) {
        (self.success)(value);
    }

    fn on_failure(&mut self, failure: Failure) {
        (self.failure)(failure);
    }
}

/// Matches response status codes for [`Outcome::recover_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMatcher {
    Exact(StatusCode),
    /// Inclusive range of numeric codes
    Range(u16, u16),
    AnyOf(Vec<StatusCode>),
}

impl StatusMatcher {
    #[must_use]
    pub fn exact(status: StatusCode) -> Self {
        Self::Exact(status)
    }

    #[must_use]
    pub fn range(low: u16, high: u16) -> Self {
        Self::Range(low, high)
    }

    /// 4xx
    #[must_use]
    pub fn client_error() -> Self {
        Self::Range(400, 499)
    }

    /// 5xx
    #[must_use]
    pub fn server_error() -> Self {
        Self::Range(500, 599)
    }

    #[must_use]
    pub fn matches(&self, status: StatusCode) -> bool {
        match self {
            Self::Exact(expected) => *expected == status,
            Self::Range(low, high) => (*low..=*high).contains(&status.as_u16()),
            Self::AnyOf(codes) => codes.contains(&status),
        }
    }
}

impl<T: Send + 'static> Outcome<T> {
    /// Wraps a pending computation.
    pub fn lazy<F>(future: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::Lazy(future.boxed())
    }

    /// `Success` for `Some`, `Empty` for `None`.
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Self::Success)
    }

    #[must_use]
    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    /// Transforms the value of a success, or the absent value of an empty
    /// outcome; `None` from `f` yields `Empty`. Failures pass through.
    ///
    /// An empty outcome may become a success here.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        U: Send + 'static,
        F: FnOnce(Option<T>) -> Option<U> + Send + 'static,
    {
        match self {
            Self::Success(value) => Outcome::from_option(f(Some(value))),
            Self::Empty => Outcome::from_option(f(None)),
            Self::Failure(failure) => Outcome::Failure(failure),
            Self::Lazy(pending) => Outcome::lazy(async move { pending.await.map(f) }),
        }
    }

    /// Transforms a success value; empty stays empty.
    pub fn map_value<U, F>(self, f: F) -> Outcome<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map(|value| value.map(f))
    }

    /// Replaces any failure with the outcome produced by `f`.
    pub fn recover<F>(self, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.recover_if(|_| true, f)
    }

    /// Replaces a failure accepted by `predicate`. A rejected failure is
    /// returned as is (the same handle).
    pub fn recover_if<P, F>(self, predicate: P, f: F) -> Self
    where
        P: FnOnce(&Failure) -> bool + Send + 'static,
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        match self {
            Self::Failure(failure) => {
                if predicate(&failure) {
                    f(failure)
                } else {
                    Self::Failure(failure)
                }
            }
            Self::Lazy(pending) => {
                Self::lazy(async move { pending.await.recover_if(predicate, f) })
            }
            settled => settled,
        }
    }

    pub fn recover_kind<F>(self, kind: FailureKind, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.recover_if(move |failure| failure.kind() == kind, f)
    }

    /// Recovers failures whose response status matches `matcher`. Failures
    /// without a status never match.
    pub fn recover_status<F>(self, matcher: StatusMatcher, f: F) -> Self
    where
        F: FnOnce(Failure) -> Outcome<T> + Send + 'static,
    {
        self.recover_if(
            move |failure| failure.status_code().is_some_and(|s| matcher.matches(s)),
            f,
        )
    }

    /// Observes a success (or the absent value of an empty outcome).
    pub fn on_success<F>(self, f: F) -> Self
    where
        F: FnOnce(Option<&T>) + Send + 'static,
    {
        match self {
            Self::Success(value) => {
                f(Some(&value));
                Self::Success(value)
            }
            Self::Empty => {
                f(None);
                Self::Empty
            }
            Self::Lazy(pending) => Self::lazy(async move { pending.await.on_success(f) }),
            Self::Failure(failure) => Self::Failure(failure),
        }
    }

    pub fn on_failure<F>(self, f: F) -> Self
    where
        F: FnOnce(&Failure) + Send + 'static,
    {
        match self {
            Self::Failure(failure) => {
                f(&failure);
                Self::Failure(failure)
            }
            Self::Lazy(pending) => Self::lazy(async move { pending.await.on_failure(f) }),
            settled => settled,
        }
    }

    fn try_settle(self) -> Result<Settled<T>, BoxFuture<'static, Outcome<T>>> {
        match self {
            Self::Success(value) => Ok(Settled::Success(value)),
            Self::Failure(failure) => Ok(Settled::Failure(failure)),
            Self::Empty => Ok(Settled::Empty),
            Self::Lazy(pending) => Err(pending),
        }
    }

    /// Awaits until the outcome is no longer pending.
    pub async fn settled(self) -> Settled<T> {
        let mut current = self;
        loop {
            match current.try_settle() {
                Ok(settled) => return settled,
                Err(pending) => current = pending.await,
            }
        }
    }

    /// Blocks the calling thread until the outcome settles.
    ///
    /// Must not be called from a thread that drives the runtime the pending
    /// work depends on (for example inside a current-thread tokio runtime).
    pub fn join(self) -> Settled<T> {
        match self.try_settle() {
            Ok(settled) => settled,
            Err(pending) => futures::executor::block_on(Self::Lazy(pending).settled()),
        }
    }

    /// Blocks and returns the value.
    ///
    /// # Errors
    /// Returns the structured failure of a failed outcome.
    pub fn force(self) -> Result<Option<T>, Failure> {
        self.join().into_result()
    }

    /// Delivers the settled outcome to `subscriber`, driving pending work on
    /// the ambient executor.
    pub fn subscribe<S>(self, subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        self.subscribe_on(&Executor::current(), subscriber);
    }

    /// Settled outcomes are delivered on the calling thread; pending ones on
    /// `executor`.
    pub fn subscribe_on<S>(self, executor: &Executor, mut subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        match self.try_settle() {
            Ok(settled) => settled.deliver(&mut subscriber),
            Err(pending) => executor.spawn(
                async move {
                    Outcome::Lazy(pending)
                        .settled()
                        .await
                        .deliver(&mut subscriber);
                }
                .boxed(),
            ),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => f.debug_tuple("Success").field(value).finish(),
            Self::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}
