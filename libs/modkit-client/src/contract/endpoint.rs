use super::marker::ParamRole;
use super::path::PathTemplate;
use crate::serializer::SerializerRef;
use crate::types::{TypeDescriptor, names};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Contract and name of a declared operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    contract: Arc<str>,
    name: Arc<str>,
}

impl OperationId {
    pub(crate) fn new(contract: Arc<str>, name: Arc<str>) -> Self {
        Self { contract, name }
    }

    /// Contract that declares the operation (the parent for inherited ones).
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.contract, self.name)
    }
}

/// One name with all of its values, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    values: Vec<String>,
}

impl Field {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Ordered multimap used for headers, cookies and static query entries.
///
/// Appending an existing name adds a value to that entry instead of
/// replacing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.values.push(value),
            None => self.fields.push(Field {
                name,
                values: vec![value],
            }),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Flattened `(name, value)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|f| f.values.iter().map(|v| (f.name.as_str(), v.as_str())))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolved description of one declared parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub(crate) position: usize,
    pub(crate) role: ParamRole,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) ty: TypeDescriptor,
    pub(crate) serializer: Option<SerializerRef>,
}

impl Parameter {
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn role(&self) -> ParamRole {
        self.role
    }

    /// Wire name; always present for path, query, header and cookie roles.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    #[must_use]
    pub fn serializer(&self) -> Option<&SerializerRef> {
        self.serializer.as_ref()
    }

    /// Success type of a callback parameter: `T` of `SuccessCallback<T>` or
    /// `Callback<T, E>`.
    #[must_use]
    pub fn callback_success_type(&self) -> Option<TypeDescriptor> {
        if self.role != ParamRole::Callback {
            return None;
        }
        (self.ty.is(names::SUCCESS_CALLBACK) || self.ty.is(names::CALLBACK))
            .then(|| self.ty.argument_or_any(0))
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        let same_serializer = match (&self.serializer, &other.serializer) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.position == other.position
            && self.role == other.role
            && self.name == other.name
            && self.ty == other.ty
            && same_serializer
    }
}

/// Immutable, validated description of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub(crate) operation: OperationId,
    pub(crate) method: Method,
    pub(crate) path: PathTemplate,
    pub(crate) query: FieldSet,
    pub(crate) headers: FieldSet,
    pub(crate) cookies: FieldSet,
    pub(crate) parameters: Arc<[Parameter]>,
    pub(crate) return_type: TypeDescriptor,
}

impl Endpoint {
    #[must_use]
    pub fn operation(&self) -> &OperationId {
        &self.operation
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    /// Static query entries from markers and the operation path.
    #[must_use]
    pub fn query(&self) -> &FieldSet {
        &self.query
    }

    /// Header entries; names are lowercase.
    #[must_use]
    pub fn headers(&self) -> &FieldSet {
        &self.headers
    }

    #[must_use]
    pub fn cookies(&self) -> &FieldSet {
        &self.cookies
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    #[must_use]
    pub fn body_parameter(&self) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.role == ParamRole::Body)
    }

    pub fn callback_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.role == ParamRole::Callback)
    }

    /// Same endpoint with the return type replaced; used for the views the
    /// adapter chain recurses on.
    #[must_use]
    pub fn with_return_type(&self, return_type: TypeDescriptor) -> Self {
        Self {
            return_type,
            ..self.clone()
        }
    }

    /// Equality of everything except the operation reference.
    #[must_use]
    pub fn eq_ignoring_operation(&self, other: &Self) -> bool {
        self.method == other.method
            && self.path == other.path
            && self.query == other.query
            && self.headers == other.headers
            && self.cookies == other.cookies
            && self.parameters == other.parameters
            && self.return_type == other.return_type
    }
}

/// Endpoints of a contract, in declaration order, selectable by name.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    ordered: Vec<Arc<Endpoint>>,
    by_name: HashMap<Arc<str>, usize>,
}

impl Endpoints {
    pub(crate) fn push(&mut self, endpoint: Endpoint) {
        let name = endpoint.operation.name.clone();
        self.by_name.insert(name, self.ordered.len());
        self.ordered.push(Arc::new(endpoint));
    }

    #[must_use]
    pub fn select(&self, operation: &str) -> Option<&Arc<Endpoint>> {
        self.by_name.get(operation).map(|&i| &self.ordered[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.ordered.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
