//! Declarative contract descriptions and their assembled form.
//!
//! A [`ContractDescription`] is the ahead-of-time equivalent of an annotated
//! interface: a named set of operations plus markers. [`Contract::read`]
//! validates it and produces one immutable [`Endpoint`] per operation.

mod assembler;
mod endpoint;
mod marker;
mod path;

pub use assembler::Assembler;
pub use endpoint::{Endpoint, Endpoints, Field, FieldSet, OperationId, Parameter};
pub use marker::{Marker, MetaMarker, ParamRole, RoleMarker};
pub use path::PathTemplate;

use crate::adapter::Adapted;
use crate::args::Arguments;
use crate::client::Client;
use crate::error::{ClientError, ContractError};
use crate::serializer::{SerializerRef, form_serializer};
use crate::types::{Declared, GenericContext, Supertype, TypeDescriptor};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handler of a default (locally implemented) operation.
pub type DefaultHandler =
    Arc<dyn Fn(&Client, Arguments) -> Result<Adapted, ClientError> + Send + Sync>;

/// Operation implemented on the client side instead of over HTTP.
#[derive(Clone)]
pub struct DefaultOperation {
    name: Arc<str>,
    handler: DefaultHandler,
}

impl DefaultOperation {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    /// Whatever the handler returns.
    pub fn invoke(&self, client: &Client, arguments: Arguments) -> Result<Adapted, ClientError> {
        (self.handler)(client, arguments)
    }
}

impl fmt::Debug for DefaultOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultOperation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Declared parameter of an operation, before resolution.
#[derive(Debug, Clone)]
pub struct ParameterDeclaration {
    name: Option<Arc<str>>,
    ty: TypeDescriptor,
    roles: Vec<RoleMarker>,
}

impl ParameterDeclaration {
    /// Parameter without a role marker: a body, or a callback when its type
    /// is callback-shaped.
    #[must_use]
    pub fn new(ty: TypeDescriptor) -> Self {
        Self {
            name: None,
            ty,
            roles: Vec::new(),
        }
    }

    fn with_role(name: impl Into<Arc<str>>, role: ParamRole, ty: TypeDescriptor) -> Self {
        Self::new(ty).named(name).role(RoleMarker::new(role))
    }

    #[must_use]
    pub fn path(name: impl Into<Arc<str>>, ty: TypeDescriptor) -> Self {
        Self::with_role(name, ParamRole::Path, ty)
    }

    #[must_use]
    pub fn query(name: impl Into<Arc<str>>, ty: TypeDescriptor) -> Self {
        Self::with_role(name, ParamRole::Query, ty)
    }

    #[must_use]
    pub fn header(name: impl Into<Arc<str>>, ty: TypeDescriptor) -> Self {
        Self::with_role(name, ParamRole::Header, ty)
    }

    #[must_use]
    pub fn cookie(name: impl Into<Arc<str>>, ty: TypeDescriptor) -> Self {
        Self::with_role(name, ParamRole::Cookie, ty)
    }

    #[must_use]
    pub fn body(ty: TypeDescriptor) -> Self {
        Self::new(ty).role(RoleMarker::new(ParamRole::Body))
    }

    /// Body sent as form fields (`application/x-www-form-urlencoded`).
    #[must_use]
    pub fn form(ty: TypeDescriptor) -> Self {
        Self::new(ty).role(RoleMarker::new(ParamRole::Body).with_serializer(form_serializer()))
    }

    #[must_use]
    pub fn callback(ty: TypeDescriptor) -> Self {
        Self::new(ty).role(RoleMarker::new(ParamRole::Callback))
    }

    /// Typed shorthand for [`ParameterDeclaration::new`].
    #[must_use]
    pub fn of<T: Declared>() -> Self {
        Self::new(T::descriptor())
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a role marker. More than one is rejected at assembly.
    #[must_use]
    pub fn role(mut self, marker: RoleMarker) -> Self {
        self.roles.push(marker);
        self
    }

    /// Replaces the serializer of the last role marker.
    #[must_use]
    pub fn serializer(mut self, serializer: SerializerRef) -> Self {
        if let Some(marker) = self.roles.last_mut() {
            marker.serializer = Some(serializer);
        }
        self
    }
}

/// Declared operation: name, markers, parameters and return type.
#[derive(Debug, Clone)]
pub struct OperationDescription {
    name: Arc<str>,
    type_params: Vec<Arc<str>>,
    markers: Vec<Marker>,
    params: Vec<ParameterDeclaration>,
    returns: TypeDescriptor,
}

macro_rules! method_constructor {
    ($($fn_name:ident => $method:ident),* $(,)?) => {
        $(
            #[must_use]
            pub fn $fn_name(name: impl Into<Arc<str>>, path: impl Into<String>) -> Self {
                Self::new(name).marker(Marker::method(Method::$method, path))
            }
        )*
    };
}

impl OperationDescription {
    /// Operation without markers, returning `()`.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            markers: Vec::new(),
            params: Vec::new(),
            returns: TypeDescriptor::unit(),
        }
    }

    method_constructor! {
        get => GET,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        head => HEAD,
        options => OPTIONS,
    }

    #[must_use]
    pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
        self.markers.push(marker.into());
        self
    }

    #[must_use]
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::header(name, value))
    }

    #[must_use]
    pub fn cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::cookie(name, value))
    }

    #[must_use]
    pub fn query(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::query(name, value))
    }

    /// Declares an operation-level type parameter.
    #[must_use]
    pub fn type_param(mut self, name: impl Into<Arc<str>>) -> Self {
        self.type_params.push(name.into());
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParameterDeclaration) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn returns<R: Declared>(self) -> Self {
        self.returns_type(R::descriptor())
    }

    #[must_use]
    pub fn returns_type(mut self, ty: TypeDescriptor) -> Self {
        self.returns = ty;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_parameters(&self) -> &[Arc<str>] {
        &self.type_params
    }
}

/// Parent binding of a contract: the parent and the arguments for its type
/// parameters.
#[derive(Debug, Clone)]
pub struct ParentContract {
    contract: Arc<ContractDescription>,
    arguments: Vec<TypeDescriptor>,
}

impl ParentContract {
    #[must_use]
    pub fn contract(&self) -> &ContractDescription {
        &self.contract
    }

    #[must_use]
    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }
}

/// Ahead-of-time contract description.
///
/// ```ignore
/// let users = ContractDescription::builder("Users")
///     .path("/api")
///     .header("accept", "application/json")
///     .operation(
///         OperationDescription::get("find", "/users/{id}")
///             .param(ParameterDeclaration::path("id", String::descriptor()))
///             .returns::<Option<User>>(),
///     )
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ContractDescription {
    name: Arc<str>,
    type_params: Vec<Arc<str>>,
    parents: Vec<ParentContract>,
    markers: Vec<Marker>,
    operations: Vec<OperationDescription>,
    defaults: Vec<DefaultOperation>,
}

impl ContractDescription {
    #[must_use]
    pub fn builder(name: impl Into<Arc<str>>) -> ContractBuilder {
        ContractBuilder {
            description: Self {
                name: name.into(),
                type_params: Vec::new(),
                parents: Vec::new(),
                markers: Vec::new(),
                operations: Vec::new(),
                defaults: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parents(&self) -> &[ParentContract] {
        &self.parents
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationDescription] {
        &self.operations
    }

    #[must_use]
    pub fn default_operations(&self) -> &[DefaultOperation] {
        &self.defaults
    }

    /// Type variable declared by this contract.
    #[must_use]
    pub fn variable(&self, name: &str) -> TypeDescriptor {
        TypeDescriptor::contract_variable(self.name.clone(), name)
    }
}

impl GenericContext for ContractDescription {
    fn context_name(&self) -> &str {
        &self.name
    }

    fn type_parameters(&self) -> &[Arc<str>] {
        &self.type_params
    }

    fn supertypes(&self) -> Vec<Supertype<'_>> {
        self.parents
            .iter()
            .map(|p| Supertype {
                context: p.contract.as_ref(),
                arguments: &p.arguments,
            })
            .collect()
    }
}

pub struct ContractBuilder {
    description: ContractDescription,
}

impl ContractBuilder {
    #[must_use]
    pub fn type_param(mut self, name: impl Into<Arc<str>>) -> Self {
        self.description.type_params.push(name.into());
        self
    }

    /// Type variable of the contract being built.
    #[must_use]
    pub fn variable(&self, name: &str) -> TypeDescriptor {
        self.description.variable(name)
    }

    #[must_use]
    pub fn extends(
        mut self,
        parent: Arc<ContractDescription>,
        arguments: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        self.description.parents.push(ParentContract {
            contract: parent,
            arguments: arguments.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
        self.description.markers.push(marker.into());
        self
    }

    #[must_use]
    pub fn path(self, prefix: impl Into<String>) -> Self {
        self.marker(Marker::path(prefix))
    }

    #[must_use]
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::header(name, value))
    }

    #[must_use]
    pub fn cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::cookie(name, value))
    }

    #[must_use]
    pub fn query(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.marker(Marker::query(name, value))
    }

    #[must_use]
    pub fn operation(mut self, operation: OperationDescription) -> Self {
        self.description.operations.push(operation);
        self
    }

    /// Registers a client-side operation.
    #[must_use]
    pub fn default_operation<F>(mut self, name: impl Into<Arc<str>>, handler: F) -> Self
    where
        F: Fn(&Client, Arguments) -> Result<Adapted, ClientError> + Send + Sync + 'static,
    {
        self.description.defaults.push(DefaultOperation {
            name: name.into(),
            handler: Arc::new(handler),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<ContractDescription> {
        Arc::new(self.description)
    }
}

/// Assembled, immutable contract.
#[derive(Debug, Clone)]
pub struct Contract {
    name: Arc<str>,
    endpoints: Endpoints,
    defaults: HashMap<Arc<str>, DefaultOperation>,
}

impl Contract {
    /// Assembles `description` without a root path.
    ///
    /// # Errors
    /// Returns [`ContractError`] for the first invalid operation.
    pub fn read(description: &ContractDescription) -> Result<Self, ContractError> {
        Assembler::new().read(description)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn default_operation(&self, name: &str) -> Option<&DefaultOperation> {
        self.defaults.get(name)
    }
}
