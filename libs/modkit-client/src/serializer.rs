//! Default parameter serializers.
//!
//! A serializer turns one argument into one request [`Fragment`]. Absent
//! arguments never reach a serializer; the dispatcher skips them.

use crate::contract::ParamRole;
use crate::types::{TypeDescriptor, names};
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

/// Shared handle to a serializer, stored on parameter descriptions.
pub type SerializerRef = Arc<dyn ParameterSerializer>;

/// Piece of an HTTP request produced from one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Value for the path template variable `name` (not yet percent-encoded)
    Path { name: String, value: String },
    Headers(Vec<(String, String)>),
    Cookies(Vec<(String, String)>),
    Query(Vec<(String, String)>),
    /// Fields of an `application/x-www-form-urlencoded` body
    Form(Vec<(String, String)>),
    /// Complete request body
    Raw {
        content_type: Option<String>,
        bytes: Bytes,
    },
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerializeError {
    #[error("parameter '{name}' of type '{ty}' cannot be serialized: {reason}")]
    Unsupported {
        name: String,
        ty: String,
        reason: &'static str,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerializeError {
    fn unsupported(name: &str, ty: &TypeDescriptor, reason: &'static str) -> Self {
        Self::Unsupported {
            name: name.to_owned(),
            ty: ty.to_string(),
            reason,
        }
    }
}

/// Turns a named, typed argument into a request fragment.
pub trait ParameterSerializer: Send + Sync + fmt::Debug {
    /// # Errors
    /// Returns [`SerializeError`] when the value has no representation in the
    /// fragment this serializer produces.
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PathSerializer;

#[derive(Debug, Default, Clone, Copy)]
pub struct QuerySerializer;

#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderSerializer;

#[derive(Debug, Default, Clone, Copy)]
pub struct CookieSerializer;

/// Serializes a body argument as form fields instead of going through the
/// content codecs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormSerializer;

static PATH: LazyLock<SerializerRef> = LazyLock::new(|| Arc::new(PathSerializer));
static QUERY: LazyLock<SerializerRef> = LazyLock::new(|| Arc::new(QuerySerializer));
static HEADER: LazyLock<SerializerRef> = LazyLock::new(|| Arc::new(HeaderSerializer));
static COOKIE: LazyLock<SerializerRef> = LazyLock::new(|| Arc::new(CookieSerializer));
static FORM: LazyLock<SerializerRef> = LazyLock::new(|| Arc::new(FormSerializer));

/// Shared default serializer for a parameter role.
///
/// Body and callback parameters have none: bodies go through the codecs and
/// callbacks are never sent.
#[must_use]
pub fn default_serializer(role: ParamRole) -> Option<SerializerRef> {
    match role {
        ParamRole::Path => Some(PATH.clone()),
        ParamRole::Query => Some(QUERY.clone()),
        ParamRole::Header => Some(HEADER.clone()),
        ParamRole::Cookie => Some(COOKIE.clone()),
        ParamRole::Body | ParamRole::Callback => None,
    }
}

/// Shared [`FormSerializer`] instance.
#[must_use]
pub fn form_serializer() -> SerializerRef {
    FORM.clone()
}

/// Renders a scalar JSON value as text. Strings are taken verbatim.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Clone, Copy)]
enum Layout {
    Sequence,
    Map,
    Single,
}

fn layout(ty: &TypeDescriptor, value: &Value) -> Layout {
    let declared = ty
        .when()
        .erasure(names::VEC, |_| Layout::Sequence)
        .erasure(names::MAP, |_| Layout::Map)
        .array(|_| Layout::Sequence)
        .generic_array(|_| Layout::Sequence)
        .finish();
    // Untyped declarations (Any, Json, variables) follow the runtime value.
    declared.unwrap_or(match value {
        Value::Array(_) => Layout::Sequence,
        Value::Object(_) => Layout::Map,
        _ => Layout::Single,
    })
}

/// Values of a sequence or single argument. Null elements are skipped.
fn values(name: &str, ty: &TypeDescriptor, value: &Value) -> Result<Vec<String>, SerializeError> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| {
                scalar(item).ok_or_else(|| {
                    SerializeError::unsupported(name, ty, "nested collections are not supported")
                })
            })
            .collect(),
        other => scalar(other)
            .map(|s| vec![s])
            .ok_or_else(|| SerializeError::unsupported(name, ty, "expected a scalar value")),
    }
}

/// Named pairs: maps flatten to their entries, everything else repeats `name`.
fn pairs(
    name: &str,
    ty: &TypeDescriptor,
    value: &Value,
) -> Result<Vec<(String, String)>, SerializeError> {
    match (layout(ty, value), value) {
        (Layout::Map, Value::Object(entries)) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, entry) in entries {
                for v in values(key, ty, entry)? {
                    out.push((key.clone(), v));
                }
            }
            Ok(out)
        }
        (Layout::Map, _) => Err(SerializeError::unsupported(name, ty, "expected an object")),
        (Layout::Sequence | Layout::Single, _) => Ok(values(name, ty, value)?
            .into_iter()
            .map(|v| (name.to_owned(), v))
            .collect()),
    }
}

impl ParameterSerializer for PathSerializer {
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError> {
        let value = match layout(ty, value) {
            Layout::Map => {
                return Err(SerializeError::unsupported(
                    name,
                    ty,
                    "maps cannot fill a path variable",
                ));
            }
            Layout::Sequence | Layout::Single => values(name, ty, value)?.join(","),
        };
        Ok(Fragment::Path {
            name: name.to_owned(),
            value,
        })
    }
}

impl ParameterSerializer for QuerySerializer {
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError> {
        pairs(name, ty, value).map(Fragment::Query)
    }
}

impl ParameterSerializer for HeaderSerializer {
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError> {
        pairs(name, ty, value).map(Fragment::Headers)
    }
}

impl ParameterSerializer for CookieSerializer {
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError> {
        pairs(name, ty, value).map(Fragment::Cookies)
    }
}

impl ParameterSerializer for FormSerializer {
    fn serialize(
        &self,
        name: &str,
        ty: &TypeDescriptor,
        value: &Value,
    ) -> Result<Fragment, SerializeError> {
        pairs(name, ty, value).map(Fragment::Form)
    }
}
