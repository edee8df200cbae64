#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative typed HTTP client for `ModKit`
//!
//! A remote API is described once as a [`ContractDescription`]: a named set of
//! operations carrying HTTP markers (method, path, headers, cookies, query)
//! and typed parameters. The description is assembled into an immutable
//! [`Contract`], and a [`Client`] dispatches calls against it:
//! - Path, query, header, cookie and form parameters are serialized per role
//! - Bodies are encoded and decoded by content-type negotiated [`Codecs`]
//! - The declared return shape picks an adapter chain once per operation
//!   (`Option`, `Vec`, `Result`, `StatusCode`, [`Eventual`], [`Recoverable`],
//!   and callback arguments)
//! - The default transport is hyper with rustls (HTTPS only by default),
//!   connection pooling, timeouts and an optional concurrency limit
//!
//! # Example
//!
//! ```ignore
//! use modkit_client::{
//!     Arguments, Client, ContractDescription, Declared, Eventual, OperationDescription,
//!     ParameterDeclaration,
//! };
//!
//! #[derive(serde::Deserialize)]
//! struct User { id: String, name: String }
//! modkit_client::declare_value!(User);
//!
//! let users = ContractDescription::builder("Users")
//!     .path("/users")
//!     .header("accept", "application/json")
//!     .operation(
//!         OperationDescription::get("find", "/{id}")
//!             .param(ParameterDeclaration::path("id", String::descriptor()))
//!             .returns::<Eventual<Option<User>>>(),
//!     )
//!     .build();
//!
//! let client = Client::builder(users)
//!     .base_url("https://users.internal/api/v1")
//!     .build()?;
//!
//! let user: Option<User> = client
//!     .call::<Eventual<Option<User>>>("find", Arguments::new().arg("42"))?
//!     .await?;
//! ```

pub mod adapter;
pub mod args;
pub mod client;
pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod outcome;
pub mod serializer;
pub mod transport;
pub mod types;

pub use adapter::{
    AdapterChain, AdapterRegistry, Adapted, Eventual, FromAdapted, Invocation, Recoverable,
    ResponseAdapter, ResponseHead,
};
pub use args::{Argument, Arguments, Callback, CallbackArg, FailureCallback, SuccessCallback};
pub use client::{Client, ClientBuilder};
pub use codec::{Codec, CodecError, Codecs};
pub use config::{ClientConfig, DEFAULT_USER_AGENT};
pub use contract::{
    Contract, ContractDescription, Endpoint, Marker, MetaMarker, OperationDescription,
    ParamRole, ParameterDeclaration, RoleMarker,
};
pub use error::{ClientError, ContractError, Failure, FailureKind};
pub use outcome::{Executor, Outcome, Settled, StatusMatcher, Subscriber};
pub use serializer::{Fragment, ParameterSerializer, SerializerRef};
pub use transport::{HttpRequest, HyperTransport, RawResponse, Transport, TransportError};
pub use types::{Declared, TypeDescriptor};
