//! Built-in adapters, one per declared wrapper.

use super::{AdaptFn, Adapted, Invocation, RecoverableResponse, ResponseAdapter};
use crate::args::CallbackArg;
use crate::contract::{Endpoint, ParamRole};
use crate::error::{ClientError, Failure};
use crate::outcome::{Outcome, Settled, Subscriber};
use crate::types::{TypeDescriptor, names};
use futures::FutureExt;
use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;

fn strip_first(endpoint: &Endpoint) -> TypeDescriptor {
    endpoint.return_type().argument_or_any(0)
}

/// Terminal of every chain: forces the outcome and yields the value, raising
/// the failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainAdapter;

impl PlainAdapter {
    pub const NAME: &'static str = "plain";

    /// Terminal function for `endpoint`'s (view) return type. Unit returns
    /// discard the body.
    #[must_use]
    pub fn terminal(endpoint: &Endpoint) -> AdaptFn {
        let unit = endpoint.return_type().is_unit();
        Arc::new(move |outcome, _| match outcome.join() {
            Settled::Failure(failure) => Err(failure.into()),
            Settled::Success(_) | Settled::Empty if unit => Ok(Adapted::Unit),
            Settled::Success(value) => Ok(Adapted::Value(value)),
            Settled::Empty => Ok(Adapted::Value(Value::Null)),
        })
    }
}

/// `Option<T>`: an absent value becomes `None`, failures are raised.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptionAdapter;

impl ResponseAdapter for OptionAdapter {
    fn name(&self) -> &'static str {
        "option"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(names::OPTION)
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        strip_first(endpoint)
    }

    fn compose(&self, _endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| match outcome.join() {
            Settled::Failure(failure) => Err(failure.into()),
            settled => {
                let inner = match downstream(settled.into(), invocation)? {
                    Adapted::Value(Value::Null) | Adapted::Unit => None,
                    other => Some(Box::new(other)),
                };
                Ok(Adapted::Optional(inner))
            }
        })
    }
}

/// `Vec<T>` and arrays: each element goes through the downstream function.
/// An empty response is an empty list.
#[derive(Debug, Default, Clone, Copy)]
pub struct VecAdapter;

impl ResponseAdapter for VecAdapter {
    fn name(&self) -> &'static str {
        "vec"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        let ty = endpoint.return_type();
        ty.is(names::VEC) || ty.as_array().is_some() || ty.as_generic_array().is_some()
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        let ty = endpoint.return_type();
        ty.when()
            .array(Clone::clone)
            .generic_array(Clone::clone)
            .otherwise(|t| t.argument_or_any(0))
    }

    fn compose(&self, _endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| match outcome.join() {
            Settled::Failure(failure) => Err(failure.into()),
            Settled::Empty | Settled::Success(Value::Null) => Ok(Adapted::List(Vec::new())),
            Settled::Success(Value::Array(items)) => items
                .into_iter()
                .map(|item| downstream(Outcome::Success(item), invocation))
                .collect::<Result<Vec<_>, _>>()
                .map(Adapted::List),
            Settled::Success(single) => {
                downstream(Outcome::Success(single), invocation).map(|a| Adapted::List(vec![a]))
            }
        })
    }

    fn shapes_body(&self) -> bool {
        true
    }
}

/// `Result<T, Failure>`: failures land on the error side instead of being
/// raised.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultAdapter;

impl ResponseAdapter for ResultAdapter {
    fn name(&self) -> &'static str {
        "result"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(names::RESULT)
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        strip_first(endpoint)
    }

    fn compose(&self, _endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| match outcome.join() {
            Settled::Failure(failure) => Ok(Adapted::Result(Err(failure))),
            settled => match downstream(settled.into(), invocation) {
                Ok(adapted) => Ok(Adapted::Result(Ok(Box::new(adapted)))),
                Err(ClientError::Failure(failure)) => Ok(Adapted::Result(Err(failure))),
                Err(other) => Err(other),
            },
        })
    }
}

/// `StatusCode`: the response status, without decoding the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusAdapter;

impl ResponseAdapter for StatusAdapter {
    fn name(&self) -> &'static str {
        "status"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(names::STATUS)
    }

    fn adapted(&self, _endpoint: &Endpoint) -> TypeDescriptor {
        TypeDescriptor::unit()
    }

    fn compose(&self, _endpoint: &Endpoint, _downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| {
            let settled = outcome.join();
            if let Some(head) = invocation.head() {
                return Ok(Adapted::Status(head.status));
            }
            // No response head: synthesized outcomes or pre-response failures.
            match settled {
                Settled::Failure(failure) => match failure.status_code() {
                    Some(status) => Ok(Adapted::Status(status)),
                    None => Err(failure.into()),
                },
                Settled::Success(_) => Ok(Adapted::Status(StatusCode::OK)),
                Settled::Empty => Ok(Adapted::Status(StatusCode::NO_CONTENT)),
            }
        })
    }
}

/// `Eventual<T>`: returns immediately; the downstream chain runs once the
/// outcome settles.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventualAdapter;

impl ResponseAdapter for EventualAdapter {
    fn name(&self) -> &'static str {
        "eventual"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(names::EVENTUAL)
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        strip_first(endpoint)
    }

    fn returns_early(&self) -> bool {
        true
    }

    fn compose(&self, _endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| {
            let downstream = downstream.clone();
            let invocation = invocation.clone();
            Ok(Adapted::Eventual(
                async move {
                    let settled = outcome.settled().await;
                    downstream(settled.into(), &invocation)
                }
                .boxed(),
            ))
        })
    }
}

/// `Recoverable<T>`: keeps the failure and the response head for the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoverableAdapter;

impl ResponseAdapter for RecoverableAdapter {
    fn name(&self) -> &'static str {
        "recoverable"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.return_type().is(names::RECOVERABLE)
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        strip_first(endpoint)
    }

    fn compose(&self, _endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        Arc::new(move |outcome, invocation| {
            let outcome = match outcome.join() {
                Settled::Failure(failure) => Outcome::Failure(failure),
                settled => match downstream(settled.into(), invocation) {
                    Ok(Adapted::Value(Value::Null)) => Outcome::Empty,
                    Ok(adapted) => Outcome::Success(adapted),
                    Err(ClientError::Failure(failure)) => Outcome::Failure(failure),
                    Err(other) => return Err(other),
                },
            };
            Ok(Adapted::Recoverable(RecoverableResponse {
                outcome: Box::new(outcome),
                head: invocation.head().cloned(),
                codecs: invocation.codecs().clone(),
            }))
        })
    }
}

/// Operations with callback parameters: the call returns at once and the
/// callbacks receive the settled result on the invocation's executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackAdapter;

impl ResponseAdapter for CallbackAdapter {
    fn name(&self) -> &'static str {
        "callback"
    }

    fn test(&self, endpoint: &Endpoint) -> bool {
        endpoint.callback_parameters().next().is_some()
    }

    fn adapted(&self, endpoint: &Endpoint) -> TypeDescriptor {
        endpoint
            .callback_parameters()
            .find_map(crate::contract::Parameter::callback_success_type)
            .unwrap_or_else(TypeDescriptor::unit)
    }

    fn returns_early(&self) -> bool {
        true
    }

    fn compose(&self, endpoint: &Endpoint, downstream: AdaptFn) -> AdaptFn {
        let positions: Arc<[usize]> = endpoint
            .parameters()
            .iter()
            .filter(|p| p.role() == ParamRole::Callback)
            .map(crate::contract::Parameter::position)
            .collect();
        Arc::new(move |outcome, invocation| {
            let callbacks = positions
                .iter()
                .filter_map(|&position| invocation.arguments().callback_at(position).cloned())
                .collect();
            let subscriber = CallbackSubscriber {
                callbacks,
                downstream: downstream.clone(),
                invocation: invocation.clone(),
            };
            outcome.subscribe_on(invocation.executor(), subscriber);
            Ok(Adapted::Unit)
        })
    }
}

struct CallbackSubscriber {
    callbacks: Vec<CallbackArg>,
    downstream: AdaptFn,
    invocation: Invocation,
}

impl CallbackSubscriber {
    fn fail(&self, failure: &Failure) {
        let mut delivered = false;
        for callback in self.callbacks.iter().filter(|c| c.accepts_failure()) {
            callback.fail(failure.clone());
            delivered = true;
        }
        if !delivered {
            tracing::warn!(error = %failure, "call failed with no failure callback registered");
        }
    }
}

impl Subscriber<Value> for CallbackSubscriber {
    fn on_success(&mut self, value: Option<Value>) {
        for callback in self.callbacks.iter().filter(|c| c.accepts_success()) {
            match (self.downstream)(Outcome::from_option(value.clone()), &self.invocation) {
                Ok(adapted) => callback.succeed(adapted),
                Err(err) => {
                    let failure = match err {
                        ClientError::Failure(failure) => failure,
                        other => Failure::decode(other),
                    };
                    self.fail(&failure);
                    return;
                }
            }
        }
    }

    fn on_failure(&mut self, failure: Failure) {
        self.fail(&failure);
    }
}
