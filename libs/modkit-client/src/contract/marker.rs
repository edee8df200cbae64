use crate::serializer::SerializerRef;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Declarative marker attached to a contract or an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// HTTP method and the operation's path (may carry a `?query` suffix)
    Method { method: Method, path: String },
    /// Path prefix contributed by a contract
    Path(String),
    Header { name: String, value: String },
    Cookie { name: String, value: String },
    Query { name: String, value: String },
    /// Bundle of markers expanded in place, one level deep
    Meta(MetaMarker),
}

impl Marker {
    #[must_use]
    pub fn method(method: Method, path: impl Into<String>) -> Self {
        Self::Method {
            method,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(prefix: impl Into<String>) -> Self {
        Self::Path(prefix.into())
    }

    #[must_use]
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn cookie(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cookie {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Query {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl From<MetaMarker> for Marker {
    fn from(meta: MetaMarker) -> Self {
        Self::Meta(meta)
    }
}

/// Named, reusable group of markers.
///
/// ```ignore
/// let json_api = MetaMarker::new("JsonApi", [
///     Marker::header("accept", "application/json"),
///     Marker::header("content-type", "application/json"),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMarker {
    name: Arc<str>,
    markers: Arc<[Marker]>,
}

impl MetaMarker {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, markers: impl IntoIterator<Item = Marker>) -> Self {
        Self {
            name: name.into(),
            markers: markers.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

/// Role a parameter plays in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    Callback,
}

impl fmt::Display for ParamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::Callback => "callback",
        };
        f.write_str(name)
    }
}

/// Parameter-role marker with optional custom name and serializer.
#[derive(Debug, Clone)]
pub struct RoleMarker {
    pub(crate) role: ParamRole,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) serializer: Option<SerializerRef>,
}

impl RoleMarker {
    #[must_use]
    pub fn new(role: ParamRole) -> Self {
        Self {
            role,
            name: None,
            serializer: None,
        }
    }

    /// Wire name overriding the parameter's own name.
    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: SerializerRef) -> Self {
        self.serializer = Some(serializer);
        self
    }

    #[must_use]
    pub fn role(&self) -> ParamRole {
        self.role
    }
}
