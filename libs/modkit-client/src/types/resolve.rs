use super::{Declaration, ParameterizedType, TypeDescriptor, TypeVariable, WildcardType};
use std::sync::Arc;
use thiserror::Error;

/// Something that declares type parameters and may extend a parent.
///
/// Implemented by [`ContractDescription`](crate::ContractDescription); the
/// resolver only needs the declared parameter names and the parent binding.
pub trait GenericContext {
    fn context_name(&self) -> &str;

    fn type_parameters(&self) -> &[Arc<str>];

    /// Declared parents together with the type arguments the child binds.
    fn supertypes(&self) -> Vec<Supertype<'_>>;
}

/// Parent of a [`GenericContext`] as seen from the child.
pub struct Supertype<'a> {
    pub context: &'a dyn GenericContext,
    pub arguments: &'a [TypeDescriptor],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("'{context}' declares {count} parents")]
    MultipleParents { context: String, count: usize },
}

/// Resolves `declared` against the implementing `context`.
///
/// Contract-level variables are replaced by the argument the context binds
/// for them (walking the single parent chain); operation-level variables stay
/// variables with resolved bounds. A contract's own parameters cannot be
/// resolved from inside that contract and are returned unchanged; callers
/// detect them with [`TypeDescriptor::unresolved_variable`].
///
/// Unchanged sub-shapes are shared with `declared`, and resolving an already
/// resolved descriptor returns an equal descriptor.
///
/// # Errors
/// Returns [`ResolveError::MultipleParents`] when a context on the walked
/// chain extends more than one parent.
pub fn resolve(
    context: &dyn GenericContext,
    declared: &TypeDescriptor,
) -> Result<TypeDescriptor, ResolveError> {
    Ok(substitute(context, declared)?.unwrap_or_else(|| declared.clone()))
}

/// `Ok(None)` when nothing changed.
fn substitute(
    context: &dyn GenericContext,
    declared: &TypeDescriptor,
) -> Result<Option<TypeDescriptor>, ResolveError> {
    match declared {
        TypeDescriptor::Class(_) => Ok(None),
        TypeDescriptor::Array(component) => Ok(substitute(context, component)?
            .map(|c| TypeDescriptor::Array(Arc::new(c)))),
        TypeDescriptor::GenericArray(component) => {
            Ok(substitute(context, component)?.map(TypeDescriptor::array_of))
        }
        TypeDescriptor::Parameterized(p) => Ok(substitute_all(context, &p.arguments)?.map(
            |arguments| {
                TypeDescriptor::Parameterized(Arc::new(ParameterizedType {
                    raw: p.raw.clone(),
                    arguments,
                }))
            },
        )),
        TypeDescriptor::Wildcard(w) => {
            let upper = substitute_all(context, &w.upper)?;
            let lower = substitute_all(context, &w.lower)?;
            if upper.is_none() && lower.is_none() {
                return Ok(None);
            }
            Ok(Some(TypeDescriptor::Wildcard(Arc::new(WildcardType {
                upper: upper.unwrap_or_else(|| w.upper.clone()),
                lower: lower.unwrap_or_else(|| w.lower.clone()),
            }))))
        }
        TypeDescriptor::Variable(var) => substitute_variable(context, declared, var),
    }
}

fn substitute_all(
    context: &dyn GenericContext,
    items: &[TypeDescriptor],
) -> Result<Option<Vec<TypeDescriptor>>, ResolveError> {
    let mut changed: Option<Vec<TypeDescriptor>> = None;
    for (i, item) in items.iter().enumerate() {
        if let Some(new) = substitute(context, item)? {
            changed.get_or_insert_with(|| items.to_vec())[i] = new;
        }
    }
    Ok(changed)
}

fn substitute_variable(
    context: &dyn GenericContext,
    declared: &TypeDescriptor,
    var: &TypeVariable,
) -> Result<Option<TypeDescriptor>, ResolveError> {
    let owner = match &var.declared_on {
        Declaration::Operation { .. } => {
            return Ok(substitute_all(context, &var.bounds)?.map(|bounds| {
                TypeDescriptor::Variable(Arc::new(TypeVariable {
                    name: var.name.clone(),
                    declared_on: var.declared_on.clone(),
                    bounds,
                }))
            }));
        }
        Declaration::Contract(owner) => owner,
    };

    if **owner == *context.context_name() {
        return Ok(None);
    }
    let Some(parent) = single_parent(context)? else {
        return Ok(None);
    };

    if **owner == *parent.context.context_name() {
        let bound = parent
            .context
            .type_parameters()
            .iter()
            .position(|p| *p == var.name)
            .and_then(|index| parent.arguments.get(index));
        return match bound {
            Some(argument) => Ok(Some(resolve(context, argument)?)),
            None => Ok(None),
        };
    }

    // Declared further up: resolve in the parent's terms first, then map the
    // parent's own parameters through this context's binding.
    let in_parent = resolve(parent.context, declared)?;
    if in_parent == *declared {
        return Ok(None);
    }
    Ok(Some(resolve(context, &in_parent)?))
}

fn single_parent(context: &dyn GenericContext) -> Result<Option<Supertype<'_>>, ResolveError> {
    let mut parents = context.supertypes();
    match parents.len() {
        0 => Ok(None),
        1 => Ok(parents.pop()),
        count => Err(ResolveError::MultipleParents {
            context: context.context_name().to_owned(),
            count,
        }),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::types::names;

    struct Ctx {
        name: Arc<str>,
        params: Vec<Arc<str>>,
        parents: Vec<(Ctx, Vec<TypeDescriptor>)>,
    }

    impl Ctx {
        fn new(name: &str, params: &[&str]) -> Self {
            Self {
                name: name.into(),
                params: params.iter().map(|p| Arc::from(*p)).collect(),
                parents: Vec::new(),
            }
        }

        fn extends(mut self, parent: Ctx, args: Vec<TypeDescriptor>) -> Self {
            self.parents.push((parent, args));
            self
        }
    }

    impl GenericContext for Ctx {
        fn context_name(&self) -> &str {
            &self.name
        }

        fn type_parameters(&self) -> &[Arc<str>] {
            &self.params
        }

        fn supertypes(&self) -> Vec<Supertype<'_>> {
            self.parents
                .iter()
                .map(|(ctx, args)| Supertype {
                    context: ctx,
                    arguments: args,
                })
                .collect()
        }
    }

    fn var(owner: &str, name: &str) -> TypeDescriptor {
        TypeDescriptor::contract_variable(owner, name)
    }

    fn vec_of(t: TypeDescriptor) -> TypeDescriptor {
        TypeDescriptor::parameterized(names::VEC, [t])
    }

    #[test]
    fn test_parent_variable_substituted() {
        let repo = Ctx::new("Repo", &["K", "V"]);
        let users = Ctx::new("Users", &[]).extends(
            repo,
            vec![TypeDescriptor::class("String"), TypeDescriptor::class("User")],
        );

        let resolved = resolve(&users, &vec_of(var("Repo", "V"))).unwrap();
        assert_eq!(resolved, vec_of(TypeDescriptor::class("User")));

        let key = resolve(&users, &var("Repo", "K")).unwrap();
        assert_eq!(key, TypeDescriptor::class("String"));
    }

    #[test]
    fn test_variable_through_grandparent() {
        let base = Ctx::new("Base", &["T"]);
        let middle = Ctx::new("Middle", &["E"]).extends(base, vec![vec_of(var("Middle", "E"))]);
        let leaf = Ctx::new("Leaf", &[]).extends(middle, vec![TypeDescriptor::class("Order")]);

        let resolved = resolve(&leaf, &var("Base", "T")).unwrap();
        assert_eq!(resolved, vec_of(TypeDescriptor::class("Order")));
    }

    #[test]
    fn test_own_variable_left_unresolved() {
        let repo = Ctx::new("Repo", &["T"]);
        let declared = vec_of(var("Repo", "T"));
        let resolved = resolve(&repo, &declared).unwrap();
        assert_eq!(resolved, declared);
        assert!(resolved.unresolved_variable().is_some());
    }

    #[test]
    fn test_operation_variable_keeps_resolved_bounds() {
        let repo = Ctx::new("Repo", &["T"]);
        let users = Ctx::new("Users", &[]).extends(repo, vec![TypeDescriptor::class("User")]);

        let declared =
            TypeDescriptor::operation_variable("Repo", "find", "R", vec![var("Repo", "T")]);
        let resolved = resolve(&users, &declared).unwrap();
        let resolved = resolved.as_type_variable().unwrap();
        assert_eq!(resolved.name(), "R");
        assert_eq!(resolved.bounds(), &[TypeDescriptor::class("User")]);
    }

    #[test]
    fn test_wildcard_and_generic_array() {
        let repo = Ctx::new("Repo", &["T"]);
        let users = Ctx::new("Users", &[]).extends(repo, vec![TypeDescriptor::class("User")]);

        let wildcard = TypeDescriptor::wildcard_extends(var("Repo", "T"));
        assert_eq!(
            resolve(&users, &wildcard).unwrap(),
            TypeDescriptor::wildcard_extends(TypeDescriptor::class("User"))
        );

        let generic_array = TypeDescriptor::array_of(var("Repo", "T"));
        assert!(generic_array.as_generic_array().is_some());
        let resolved = resolve(&users, &generic_array).unwrap();
        assert_eq!(resolved.as_array(), Some(&TypeDescriptor::class("User")));
    }

    #[test]
    fn test_resolution_is_idempotent_and_shares_structure() {
        let repo = Ctx::new("Repo", &["T"]);
        let users = Ctx::new("Users", &[]).extends(repo, vec![TypeDescriptor::class("User")]);

        let declared = TypeDescriptor::parameterized(
            names::EVENTUAL,
            [TypeDescriptor::parameterized(
                names::OPTION,
                [vec_of(var("Repo", "T"))],
            )],
        );
        let once = resolve(&users, &declared).unwrap();
        let twice = resolve(&users, &once).unwrap();
        assert_eq!(once, twice);
        assert!(std::ptr::eq(
            once.as_parameterized().unwrap(),
            twice.as_parameterized().unwrap()
        ));

        let untouched = TypeDescriptor::parameterized(
            names::RESULT,
            [vec_of(TypeDescriptor::class("User")), var("Repo", "T")],
        );
        let resolved = resolve(&users, &untouched).unwrap();
        let (before, after) = (
            untouched.as_parameterized().unwrap().arguments(),
            resolved.as_parameterized().unwrap().arguments(),
        );
        assert!(std::ptr::eq(
            before[0].as_parameterized().unwrap(),
            after[0].as_parameterized().unwrap()
        ));
        assert_eq!(after[1], TypeDescriptor::class("User"));
    }

    #[test]
    fn test_multiple_parents_rejected() {
        let a = Ctx::new("A", &["T"]);
        let b = Ctx::new("B", &[]);
        let child = Ctx::new("Child", &[])
            .extends(a, vec![TypeDescriptor::class("User")])
            .extends(b, Vec::new());

        let err = resolve(&child, &var("A", "T")).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MultipleParents {
                context: "Child".to_owned(),
                count: 2
            }
        );
    }
}
