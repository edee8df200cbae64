//! Content codecs: bytes to values and back, negotiated by content type.

use crate::types::{TypeDescriptor, names};
use bytes::Bytes;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("no codec reads '{content_type}' into {target}")]
    NoReader {
        content_type: String,
        target: String,
    },

    #[error("no codec writes {source_type} as '{content_type}'")]
    NoWriter {
        content_type: String,
        source_type: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("form encoding error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Unsupported(String),
}

/// Media type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// One content type's reader and/or writer.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Content type written by this codec.
    fn media_type(&self) -> &'static str;

    /// `content_type` is `None` when the response carries no `Content-Type`.
    fn readable(&self, content_type: Option<&str>, target: &TypeDescriptor) -> bool;

    /// # Errors
    /// Returns a [`CodecError`] when the body does not parse.
    fn read(&self, body: &Bytes, target: &TypeDescriptor) -> Result<Value, CodecError>;

    fn writable(&self, content_type: Option<&str>, source: &TypeDescriptor) -> bool;

    /// # Errors
    /// Returns a [`CodecError`] when the value cannot be encoded.
    fn write(&self, value: &Value) -> Result<Bytes, CodecError>;
}

/// `text/*`, and bodies without a content type read into a string.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn media_type(&self) -> &'static str {
        TEXT_PLAIN
    }

    fn readable(&self, content_type: Option<&str>, target: &TypeDescriptor) -> bool {
        match content_type {
            Some(ct) => essence(ct).starts_with("text/"),
            None => target.is(names::STRING),
        }
    }

    fn read(&self, body: &Bytes, _target: &TypeDescriptor) -> Result<Value, CodecError> {
        Ok(Value::String(std::str::from_utf8(body)?.to_owned()))
    }

    fn writable(&self, content_type: Option<&str>, _source: &TypeDescriptor) -> bool {
        content_type.is_some_and(|ct| essence(ct).starts_with("text/"))
    }

    fn write(&self, value: &Value) -> Result<Bytes, CodecError> {
        match value {
            Value::String(s) => Ok(Bytes::from(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(CodecError::Unsupported(
                "text bodies must be scalars".to_owned(),
            )),
            other => Ok(Bytes::from(other.to_string())),
        }
    }
}

/// `application/json` and `+json` media types; default for untyped content.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    fn accepts(content_type: Option<&str>) -> bool {
        content_type.is_none_or(|ct| {
            let essence = essence(ct);
            essence == APPLICATION_JSON || essence.ends_with("+json")
        })
    }
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &'static str {
        APPLICATION_JSON
    }

    fn readable(&self, content_type: Option<&str>, _target: &TypeDescriptor) -> bool {
        Self::accepts(content_type)
    }

    fn read(&self, body: &Bytes, _target: &TypeDescriptor) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(body)?)
    }

    fn writable(&self, content_type: Option<&str>, _source: &TypeDescriptor) -> bool {
        Self::accepts(content_type)
    }

    fn write(&self, value: &Value) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}

/// Write-only `application/x-www-form-urlencoded` for flat objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormCodec;

impl Codec for FormCodec {
    fn media_type(&self) -> &'static str {
        FORM_URLENCODED
    }

    fn readable(&self, _content_type: Option<&str>, _target: &TypeDescriptor) -> bool {
        false
    }

    fn read(&self, _body: &Bytes, _target: &TypeDescriptor) -> Result<Value, CodecError> {
        Err(CodecError::Unsupported("form bodies are write-only".to_owned()))
    }

    fn writable(&self, content_type: Option<&str>, _source: &TypeDescriptor) -> bool {
        content_type.is_some_and(|ct| essence(ct) == FORM_URLENCODED)
    }

    fn write(&self, value: &Value) -> Result<Bytes, CodecError> {
        let Value::Object(fields) = value else {
            return Err(CodecError::Unsupported(
                "form bodies must be objects".to_owned(),
            ));
        };
        let pairs: Vec<(&str, String)> = fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.as_str(), v)
            })
            .collect();
        Ok(Bytes::from(serde_urlencoded::to_string(pairs)?))
    }
}

/// Ordered codec list; the first codec that accepts a content type wins.
#[derive(Clone)]
pub struct Codecs(Arc<[Arc<dyn Codec>]>);

impl Codecs {
    #[must_use]
    pub fn new(codecs: Vec<Arc<dyn Codec>>) -> Self {
        Self(codecs.into())
    }

    /// Text, JSON and form codecs, in that order.
    #[must_use]
    pub fn defaults() -> Self {
        Self::new(vec![
            Arc::new(TextCodec),
            Arc::new(JsonCodec),
            Arc::new(FormCodec),
        ])
    }

    /// # Errors
    /// Returns [`CodecError::NoReader`] when no codec accepts the content
    /// type, or the codec's own error.
    pub fn read(
        &self,
        content_type: Option<&str>,
        body: &Bytes,
        target: &TypeDescriptor,
    ) -> Result<Value, CodecError> {
        let codec = self
            .0
            .iter()
            .find(|c| c.readable(content_type, target))
            .ok_or_else(|| CodecError::NoReader {
                content_type: content_type.unwrap_or("<none>").to_owned(),
                target: target.to_string(),
            })?;
        codec.read(body, target)
    }

    /// Encodes `value` and returns the bytes with the content type to send.
    ///
    /// # Errors
    /// Returns [`CodecError::NoWriter`] when no codec accepts the content
    /// type, or the codec's own error.
    pub fn write(
        &self,
        content_type: Option<&str>,
        value: &Value,
        source: &TypeDescriptor,
    ) -> Result<(Bytes, String), CodecError> {
        let codec = self
            .0
            .iter()
            .find(|c| c.writable(content_type, source))
            .ok_or_else(|| CodecError::NoWriter {
                content_type: content_type.unwrap_or("<none>").to_owned(),
                source_type: source.to_string(),
            })?;
        let bytes = codec.write(value)?;
        let media = content_type.map_or_else(|| codec.media_type().to_owned(), str::to_owned);
        Ok((bytes, media))
    }
}

impl Default for Codecs {
    fn default() -> Self {
        Self::defaults()
    }
}

impl fmt::Debug for Codecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|c| c.media_type()))
            .finish()
    }
}
