//! Declared type shapes.
//!
//! A [`TypeDescriptor`] is the client's model of a declared parameter or
//! return type: a plain class, a parameterized type, an array, a wildcard or a
//! type variable. Contracts are described with descriptors ahead of time (see
//! [`Declared`] for the mapping from Rust types), and the contract assembler
//! resolves every descriptor against the implementing contract with
//! [`resolve`] so that no contract-level type variable survives into an
//! [`Endpoint`](crate::Endpoint).

mod declared;
mod resolve;

pub use declared::Declared;
pub use resolve::{GenericContext, ResolveError, Supertype, resolve};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Class names used by the built-in shapes.
pub mod names {
    /// Unconstrained top type
    pub const ANY: &str = "Any";
    pub const UNIT: &str = "()";
    pub const STRING: &str = "String";
    pub const JSON: &str = "Json";
    pub const OPTION: &str = "Option";
    pub const VEC: &str = "Vec";
    pub const MAP: &str = "Map";
    pub const RESULT: &str = "Result";
    pub const EVENTUAL: &str = "Eventual";
    pub const RECOVERABLE: &str = "Recoverable";
    pub const STATUS: &str = "StatusCode";
    pub const FAILURE: &str = "Failure";
    pub const SUCCESS_CALLBACK: &str = "SuccessCallback";
    pub const FAILURE_CALLBACK: &str = "FailureCallback";
    pub const CALLBACK: &str = "Callback";
}

struct ClassInfo {
    name: Arc<str>,
    supertypes: Vec<ClassRef>,
}

/// Raw (erased) type identity.
///
/// Two class references are equal when their names are equal; the optional
/// supertype list only feeds [`ClassRef::is_subclass_of`].
#[derive(Clone)]
pub struct ClassRef(Arc<ClassInfo>);

impl ClassRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_supertypes(name, [])
    }

    pub fn with_supertypes(
        name: impl Into<Arc<str>>,
        supertypes: impl IntoIterator<Item = ClassRef>,
    ) -> Self {
        Self(Arc::new(ClassInfo {
            name: name.into(),
            supertypes: supertypes.into_iter().collect(),
        }))
    }

    /// The unconstrained top type.
    #[must_use]
    pub fn any() -> Self {
        Self::new(names::ANY)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.name() == names::ANY
    }

    #[must_use]
    pub fn supertypes(&self) -> &[ClassRef] {
        &self.0.supertypes
    }

    /// Reflexive, transitive subclass check; every class is a subclass of
    /// [`ClassRef::any`].
    #[must_use]
    pub fn is_subclass_of(&self, other: &ClassRef) -> bool {
        self == other
            || other.is_any()
            || self.0.supertypes.iter().any(|s| s.is_subclass_of(other))
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for ClassRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Where a type variable is declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declaration {
    /// Type parameter of a contract
    Contract(Arc<str>),
    /// Type parameter of a single operation
    Operation {
        contract: Arc<str>,
        operation: Arc<str>,
    },
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contract(contract) => f.write_str(contract),
            Self::Operation {
                contract,
                operation,
            } => write!(f, "{contract}::{operation}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterizedType {
    raw: ClassRef,
    arguments: Vec<TypeDescriptor>,
}

impl ParameterizedType {
    #[must_use]
    pub fn raw(&self) -> &ClassRef {
        &self.raw
    }

    #[must_use]
    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WildcardType {
    upper: Vec<TypeDescriptor>,
    lower: Vec<TypeDescriptor>,
}

impl WildcardType {
    #[must_use]
    pub fn upper_bounds(&self) -> &[TypeDescriptor] {
        &self.upper
    }

    #[must_use]
    pub fn lower_bounds(&self) -> &[TypeDescriptor] {
        &self.lower
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVariable {
    name: Arc<str>,
    declared_on: Declaration,
    bounds: Vec<TypeDescriptor>,
}

impl TypeVariable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declared_on(&self) -> &Declaration {
        &self.declared_on
    }

    #[must_use]
    pub fn bounds(&self) -> &[TypeDescriptor] {
        &self.bounds
    }

    #[must_use]
    pub fn is_contract_level(&self) -> bool {
        matches!(self.declared_on, Declaration::Contract(_))
    }
}

/// A declared type shape.
///
/// Immutable and cheap to clone; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Plain class, e.g. `String`
    Class(ClassRef),
    /// Array whose component is itself a class or class array
    Array(Arc<TypeDescriptor>),
    /// Class applied to type arguments, e.g. `Vec<User>`
    Parameterized(Arc<ParameterizedType>),
    /// Array whose component is generic, e.g. `Vec<T>[]`
    GenericArray(Arc<TypeDescriptor>),
    /// `?`, `? extends A`, `? super B`
    Wildcard(Arc<WildcardType>),
    /// Type variable, optionally bounded
    Variable(Arc<TypeVariable>),
}

impl TypeDescriptor {
    pub fn class(name: impl Into<Arc<str>>) -> Self {
        Self::Class(ClassRef::new(name))
    }

    #[must_use]
    pub fn of(class: ClassRef) -> Self {
        Self::Class(class)
    }

    #[must_use]
    pub fn any() -> Self {
        Self::Class(ClassRef::any())
    }

    #[must_use]
    pub fn unit() -> Self {
        Self::class(names::UNIT)
    }

    pub fn parameterized(
        raw: impl Into<ClassRef>,
        arguments: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self::Parameterized(Arc::new(ParameterizedType {
            raw: raw.into(),
            arguments: arguments.into_iter().collect(),
        }))
    }

    /// Array of `component`; generic components produce a generic array.
    #[must_use]
    pub fn array_of(component: TypeDescriptor) -> Self {
        match component {
            Self::Class(_) | Self::Array(_) => Self::Array(Arc::new(component)),
            other => Self::GenericArray(Arc::new(other)),
        }
    }

    /// Unbounded wildcard `?`.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::wildcard_bounded(vec![Self::any()], Vec::new())
    }

    #[must_use]
    pub fn wildcard_extends(upper: TypeDescriptor) -> Self {
        Self::wildcard_bounded(vec![upper], Vec::new())
    }

    #[must_use]
    pub fn wildcard_super(lower: TypeDescriptor) -> Self {
        Self::wildcard_bounded(vec![Self::any()], vec![lower])
    }

    #[must_use]
    pub fn wildcard_bounded(upper: Vec<TypeDescriptor>, lower: Vec<TypeDescriptor>) -> Self {
        Self::Wildcard(Arc::new(WildcardType { upper, lower }))
    }

    /// Type parameter `name` of contract `contract`.
    pub fn contract_variable(contract: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self::variable(Declaration::Contract(contract.into()), name, Vec::new())
    }

    /// Type parameter `name` of a single operation.
    pub fn operation_variable(
        contract: impl Into<Arc<str>>,
        operation: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        bounds: Vec<TypeDescriptor>,
    ) -> Self {
        let declared_on = Declaration::Operation {
            contract: contract.into(),
            operation: operation.into(),
        };
        Self::variable(declared_on, name, bounds)
    }

    pub fn variable(
        declared_on: Declaration,
        name: impl Into<Arc<str>>,
        bounds: Vec<TypeDescriptor>,
    ) -> Self {
        Self::Variable(Arc::new(TypeVariable {
            name: name.into(),
            declared_on,
            bounds,
        }))
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Self::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Component type of a class array.
    #[must_use]
    pub fn as_array(&self) -> Option<&TypeDescriptor> {
        match self {
            Self::Array(component) => Some(component),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_parameterized(&self) -> Option<&ParameterizedType> {
        match self {
            Self::Parameterized(p) => Some(p),
            _ => None,
        }
    }

    /// Component type of a generic array.
    #[must_use]
    pub fn as_generic_array(&self) -> Option<&TypeDescriptor> {
        match self {
            Self::GenericArray(component) => Some(component),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_wildcard(&self) -> Option<&WildcardType> {
        match self {
            Self::Wildcard(w) => Some(w),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_type_variable(&self) -> Option<&TypeVariable> {
        match self {
            Self::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Conditional dispatch on the shape of this descriptor.
    ///
    /// ```ignore
    /// let label = ty
    ///     .when()
    ///     .parameterized(|p| format!("generic {}", p.raw().name()))
    ///     .class(|c| c.name().to_owned())
    ///     .otherwise(|t| t.to_string());
    /// ```
    #[must_use]
    pub fn when<R>(&self) -> ShapeMatch<'_, R> {
        ShapeMatch {
            ty: self,
            result: None,
        }
    }

    /// Erased class of a class or parameterized type, or of the first bound
    /// of a variable or wildcard.
    #[must_use]
    pub fn raw_class(&self) -> Option<&ClassRef> {
        match self {
            Self::Class(class) => Some(class),
            Self::Parameterized(p) => Some(&p.raw),
            Self::Wildcard(w) => w.upper.first().and_then(Self::raw_class),
            Self::Variable(v) => v.bounds.first().and_then(Self::raw_class),
            Self::Array(_) | Self::GenericArray(_) => None,
        }
    }

    /// Whether the erasure of this type is the class called `name`.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        matches!(self, Self::Class(_) | Self::Parameterized(_))
            && self.raw_class().is_some_and(|c| c.name() == name)
    }

    /// Erasure: type arguments dropped, variables and wildcards replaced by
    /// their first bound (or the top type).
    #[must_use]
    pub fn erasure(&self) -> TypeDescriptor {
        match self {
            Self::Class(_) => self.clone(),
            Self::Parameterized(p) => Self::Class(p.raw.clone()),
            Self::Array(component) | Self::GenericArray(component) => {
                Self::Array(Arc::new(component.erasure()))
            }
            Self::Wildcard(w) => w.upper.first().map_or_else(Self::any, Self::erasure),
            Self::Variable(v) => v.bounds.first().map_or_else(Self::any, Self::erasure),
        }
    }

    #[must_use]
    pub fn erasure_eq(&self, other: &TypeDescriptor) -> bool {
        self.erasure() == other.erasure()
    }

    /// Type arguments of a parameterized type (empty otherwise).
    #[must_use]
    pub fn type_arguments(&self) -> &[TypeDescriptor] {
        match self {
            Self::Parameterized(p) => &p.arguments,
            _ => &[],
        }
    }

    /// Argument at `index`, with wildcards narrowed to their upper bound and
    /// missing arguments (raw use of a generic wrapper) defaulted to the top
    /// type.
    #[must_use]
    pub fn argument_or_any(&self, index: usize) -> TypeDescriptor {
        match self.type_arguments().get(index) {
            Some(Self::Wildcard(w)) => w.upper.first().cloned().unwrap_or_else(Self::any),
            Some(arg) => arg.clone(),
            None => Self::any(),
        }
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.as_class().is_some_and(ClassRef::is_any)
    }

    #[must_use]
    pub fn is_unit(&self) -> bool {
        self.as_class().is_some_and(|c| c.name() == names::UNIT)
    }

    /// First contract-level type variable reachable from this descriptor.
    #[must_use]
    pub fn unresolved_variable(&self) -> Option<&TypeVariable> {
        match self {
            Self::Class(_) => None,
            Self::Array(component) | Self::GenericArray(component) => {
                component.unresolved_variable()
            }
            Self::Parameterized(p) => p.arguments.iter().find_map(Self::unresolved_variable),
            Self::Wildcard(w) => w
                .upper
                .iter()
                .chain(&w.lower)
                .find_map(Self::unresolved_variable),
            Self::Variable(v) if v.is_contract_level() => Some(v),
            Self::Variable(v) => v.bounds.iter().find_map(Self::unresolved_variable),
        }
    }

    /// Whether a value of type `other` can be used where `self` is expected.
    ///
    /// Type arguments are invariant unless the expected argument is a
    /// wildcard or a variable; classes follow their declared supertypes.
    #[must_use]
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        if self == other {
            return true;
        }
        match self {
            Self::Class(class) if class.is_any() => true,
            Self::Class(class) => other.raw_class().is_some_and(|o| o.is_subclass_of(class)),
            Self::Array(component) | Self::GenericArray(component) => match other {
                Self::Array(o) | Self::GenericArray(o) => component.is_assignable_from(o),
                Self::Variable(v) => v.bounds.iter().any(|b| self.is_assignable_from(b)),
                _ => false,
            },
            Self::Parameterized(p) => match other {
                Self::Parameterized(o) if o.raw == p.raw => {
                    p.arguments.len() == o.arguments.len()
                        && p.arguments
                            .iter()
                            .zip(&o.arguments)
                            .all(|(expected, actual)| expected.contains(actual))
                }
                Self::Parameterized(o) => o.raw.is_subclass_of(&p.raw),
                Self::Class(o) => o.is_subclass_of(&p.raw),
                Self::Variable(v) => v.bounds.iter().any(|b| self.is_assignable_from(b)),
                _ => false,
            },
            Self::Wildcard(w) => {
                w.upper.iter().all(|u| u.is_assignable_from(other))
                    && w.lower.iter().all(|l| other.is_assignable_from(l))
            }
            Self::Variable(v) => match other {
                Self::Variable(o) if o.name == v.name && o.declared_on == v.declared_on => true,
                _ => v.bounds.iter().all(|b| b.is_assignable_from(other)),
            },
        }
    }

    /// Type-argument containment.
    fn contains(&self, other: &TypeDescriptor) -> bool {
        match self {
            Self::Wildcard(_) | Self::Variable(_) => self.is_assignable_from(other),
            Self::Class(class) if class.is_any() => true,
            _ => self == other,
        }
    }
}

impl From<ClassRef> for TypeDescriptor {
    fn from(class: ClassRef) -> Self {
        Self::Class(class)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => f.write_str(class.name()),
            Self::Array(component) | Self::GenericArray(component) => write!(f, "{component}[]"),
            Self::Parameterized(p) => {
                write!(f, "{}<", p.raw.name())?;
                for (i, arg) in p.arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Self::Wildcard(w) => {
                f.write_str("?")?;
                let upper: Vec<_> = w.upper.iter().filter(|u| !u.is_any()).collect();
                if !upper.is_empty() {
                    f.write_str(" extends ")?;
                    write_bounds(f, upper.into_iter())?;
                }
                if !w.lower.is_empty() {
                    f.write_str(" super ")?;
                    write_bounds(f, w.lower.iter())?;
                }
                Ok(())
            }
            Self::Variable(v) => f.write_str(&v.name),
        }
    }
}

fn write_bounds<'a>(
    f: &mut fmt::Formatter<'_>,
    bounds: impl Iterator<Item = &'a TypeDescriptor>,
) -> fmt::Result {
    for (i, bound) in bounds.enumerate() {
        if i > 0 {
            f.write_str(" & ")?;
        }
        write!(f, "{bound}")?;
    }
    Ok(())
}

/// Builder-style conditional dispatch over a [`TypeDescriptor`].
///
/// The first matching arm wins; later arms are skipped.
#[must_use = "ShapeMatch does nothing until finished with otherwise() or finish()"]
pub struct ShapeMatch<'a, R> {
    ty: &'a TypeDescriptor,
    result: Option<R>,
}

impl<'a, R> ShapeMatch<'a, R> {
    fn arm<T>(mut self, narrowed: Option<T>, f: impl FnOnce(T) -> R) -> Self {
        if self.result.is_none()
            && let Some(value) = narrowed
        {
            self.result = Some(f(value));
        }
        self
    }

    pub fn class(self, f: impl FnOnce(&'a ClassRef) -> R) -> Self {
        let narrowed = self.ty.as_class();
        self.arm(narrowed, f)
    }

    pub fn array(self, f: impl FnOnce(&'a TypeDescriptor) -> R) -> Self {
        let narrowed = self.ty.as_array();
        self.arm(narrowed, f)
    }

    pub fn parameterized(self, f: impl FnOnce(&'a ParameterizedType) -> R) -> Self {
        let narrowed = self.ty.as_parameterized();
        self.arm(narrowed, f)
    }

    pub fn generic_array(self, f: impl FnOnce(&'a TypeDescriptor) -> R) -> Self {
        let narrowed = self.ty.as_generic_array();
        self.arm(narrowed, f)
    }

    pub fn wildcard(self, f: impl FnOnce(&'a WildcardType) -> R) -> Self {
        let narrowed = self.ty.as_wildcard();
        self.arm(narrowed, f)
    }

    pub fn variable(self, f: impl FnOnce(&'a TypeVariable) -> R) -> Self {
        let narrowed = self.ty.as_type_variable();
        self.arm(narrowed, f)
    }

    /// Matches class or parameterized types whose erasure is `name`.
    pub fn erasure(self, name: &str, f: impl FnOnce(&'a TypeDescriptor) -> R) -> Self {
        let narrowed = self.ty.is(name).then_some(self.ty);
        self.arm(narrowed, f)
    }

    pub fn otherwise(self, f: impl FnOnce(&'a TypeDescriptor) -> R) -> R {
        match self.result {
            Some(result) => result,
            None => f(self.ty),
        }
    }

    pub fn finish(self) -> Option<R> {
        self.result
    }
}
