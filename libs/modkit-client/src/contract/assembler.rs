use super::endpoint::{Endpoint, Endpoints, FieldSet, OperationId, Parameter};
use super::marker::{Marker, ParamRole};
use super::path::{PathTemplate, join_paths};
use super::{Contract, ContractDescription, OperationDescription};
use crate::error::ContractError;
use crate::serializer::default_serializer;
use crate::types::{ResolveError, TypeDescriptor, names, resolve};
use http::{HeaderName, HeaderValue};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reads a [`ContractDescription`] into a validated [`Contract`].
///
/// Markers are collected per operation in three passes (parent contract, own
/// contract, operation) so headers, cookies and query entries keep
/// parent-before-child and contract-before-operation order.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    root: Option<String>,
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path prefix placed before every contract path.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// # Errors
    /// Returns the first [`ContractError`] found; no partial contract is built.
    pub fn read(&self, description: &ContractDescription) -> Result<Contract, ContractError> {
        let parent = single_parent(description)?;

        let mut own = HashSet::new();
        for operation in &description.operations {
            if !own.insert(operation.name.clone()) {
                return Err(ContractError::DuplicateOperation {
                    contract: description.name.to_string(),
                    operation: operation.name.to_string(),
                });
            }
        }

        let mut endpoints = Endpoints::default();
        let mut defaults = HashMap::new();
        if let Some(parent) = parent {
            for operation in parent
                .operations
                .iter()
                .filter(|op| !own.contains(&op.name))
            {
                endpoints.push(self.assemble(description, Some(parent), operation, &parent.name)?);
            }
            for default in &parent.defaults {
                if !own.contains(&default.name) {
                    defaults.insert(default.name.clone(), default.clone());
                }
            }
        }
        for operation in &description.operations {
            endpoints.push(self.assemble(description, parent, operation, &description.name)?);
        }
        for default in &description.defaults {
            defaults.insert(default.name.clone(), default.clone());
        }

        Ok(Contract {
            name: description.name.clone(),
            endpoints,
            defaults,
        })
    }

    fn assemble(
        &self,
        description: &ContractDescription,
        parent: Option<&ContractDescription>,
        operation: &OperationDescription,
        declared_by: &Arc<str>,
    ) -> Result<Endpoint, ContractError> {
        let mut markers = Vec::new();
        if let Some(parent) = parent {
            expand(&parent.markers, &mut markers)?;
        }
        expand(&description.markers, &mut markers)?;
        expand(&operation.markers, &mut markers)?;

        let mut methods = Vec::new();
        let mut prefixes = Vec::new();
        let mut operation_path = "";
        let mut query = FieldSet::default();
        let mut headers = FieldSet::default();
        let mut cookies = FieldSet::default();

        for marker in markers {
            match marker {
                Marker::Method { method, path } => {
                    methods.push(method.clone());
                    let path = path.as_str();
                    let (path, query_string) = path.split_once('?').unwrap_or((path, ""));
                    operation_path = path;
                    append_query_string(&mut query, query_string);
                }
                Marker::Path(prefix) => prefixes.push(prefix.as_str()),
                Marker::Header { name, value } => {
                    headers.append(header_name(name, value)?, value.clone());
                }
                Marker::Cookie { name, value } => cookies.append(name.clone(), value.clone()),
                Marker::Query { name, value } => query.append(name.clone(), value.clone()),
                // flattened by `expand`
                Marker::Meta(_) => {}
            }
        }

        let method = match methods.len() {
            0 => {
                return Err(ContractError::MissingHttpMethod {
                    operation: operation.name.to_string(),
                });
            }
            1 => methods.swap_remove(0),
            count => {
                return Err(ContractError::MultipleHttpMethods {
                    operation: operation.name.to_string(),
                    count,
                });
            }
        };

        let template = join_paths(
            self.root
                .as_deref()
                .into_iter()
                .chain(prefixes)
                .chain([operation_path]),
        );
        let path =
            PathTemplate::parse(&template).ok_or_else(|| ContractError::InvalidPathTemplate {
                operation: operation.name.to_string(),
                template: template.clone(),
            })?;

        Ok(Endpoint {
            operation: OperationId::new(declared_by.clone(), operation.name.clone()),
            method,
            path,
            query,
            headers,
            cookies,
            parameters: parameters(description, operation)?.into(),
            return_type: resolve_type(description, &operation.name, &operation.returns)?,
        })
    }
}

fn single_parent(
    description: &ContractDescription,
) -> Result<Option<&ContractDescription>, ContractError> {
    match description.parents.as_slice() {
        [] => Ok(None),
        [parent] => {
            let parent = parent.contract();
            if parent.parents.is_empty() {
                Ok(Some(parent))
            } else {
                Err(ContractError::InheritanceTooDeep {
                    contract: description.name.to_string(),
                    parent: parent.name.to_string(),
                })
            }
        }
        parents => Err(ContractError::MultipleParents {
            contract: description.name.to_string(),
            count: parents.len(),
        }),
    }
}

/// Flattens meta-markers one level deep.
fn expand<'a>(markers: &'a [Marker], out: &mut Vec<&'a Marker>) -> Result<(), ContractError> {
    for marker in markers {
        match marker {
            Marker::Meta(meta) => {
                for inner in meta.markers() {
                    if matches!(inner, Marker::Meta(_)) {
                        return Err(ContractError::NestedMetaMarker {
                            name: meta.name().to_owned(),
                        });
                    }
                    out.push(inner);
                }
            }
            other => out.push(other),
        }
    }
    Ok(())
}

fn append_query_string(query: &mut FieldSet, query_string: &str) {
    let decode = |raw: &str| urlencoding::decode(raw).map_or_else(|_| raw.to_owned(), Cow::into_owned);
    for pair in query_string.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        query.append(decode(name), decode(value));
    }
}

/// Validated, lowercase header name.
fn header_name(name: &str, value: &str) -> Result<String, ContractError> {
    let invalid = |reason: String| ContractError::InvalidHeader {
        name: name.to_owned(),
        reason,
    };
    let parsed = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok(parsed.as_str().to_owned())
}

fn parameters(
    description: &ContractDescription,
    operation: &OperationDescription,
) -> Result<Vec<Parameter>, ContractError> {
    let mut parameters = Vec::with_capacity(operation.params.len());
    let mut bodies = 0usize;

    for (position, declaration) in operation.params.iter().enumerate() {
        let ty = resolve_type(description, &operation.name, &declaration.ty)?;
        let (role, wire_name, serializer) = match declaration.roles.as_slice() {
            [] if is_callback_shaped(&ty) => (ParamRole::Callback, None, None),
            [] => (ParamRole::Body, None, None),
            [marker] => (marker.role, marker.name.clone(), marker.serializer.clone()),
            _ => {
                return Err(ContractError::MultipleRoles {
                    operation: operation.name.to_string(),
                    position,
                });
            }
        };

        match role {
            ParamRole::Body => bodies += 1,
            ParamRole::Callback if !is_valid_callback(&ty) => {
                return Err(ContractError::InvalidCallback {
                    operation: operation.name.to_string(),
                    position,
                    ty: ty.to_string(),
                });
            }
            _ => {}
        }

        let name = wire_name.or_else(|| declaration.name.clone());
        let needs_name = !matches!(role, ParamRole::Body | ParamRole::Callback);
        if needs_name && name.is_none() {
            return Err(ContractError::MissingParameterName {
                operation: operation.name.to_string(),
                position,
                role: role.to_string(),
            });
        }

        parameters.push(Parameter {
            position,
            role,
            name,
            ty,
            serializer: serializer.or_else(|| default_serializer(role)),
        });
    }

    if bodies > 1 {
        return Err(ContractError::MultipleBodies {
            operation: operation.name.to_string(),
        });
    }
    Ok(parameters)
}

fn is_callback_shaped(ty: &TypeDescriptor) -> bool {
    ty.is(names::SUCCESS_CALLBACK) || ty.is(names::FAILURE_CALLBACK) || ty.is(names::CALLBACK)
}

fn is_valid_callback(ty: &TypeDescriptor) -> bool {
    let arity = ty.type_arguments().len();
    ((ty.is(names::SUCCESS_CALLBACK) || ty.is(names::FAILURE_CALLBACK)) && arity == 1)
        || (ty.is(names::CALLBACK) && arity == 2)
}

fn resolve_type(
    description: &ContractDescription,
    operation: &str,
    declared: &TypeDescriptor,
) -> Result<TypeDescriptor, ContractError> {
    let resolved = resolve(description, declared).map_err(|e| match e {
        ResolveError::MultipleParents { context, count } => ContractError::MultipleParents {
            contract: context,
            count,
        },
    })?;
    if let Some(variable) = resolved.unresolved_variable() {
        return Err(ContractError::UnresolvedTypeVariable {
            operation: operation.to_owned(),
            variable: variable.name().to_owned(),
            declared_on: variable.declared_on().to_string(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::contract::{MetaMarker, OperationDescription, ParameterDeclaration, RoleMarker};
    use http::Method;

    fn string() -> TypeDescriptor {
        TypeDescriptor::class("String")
    }

    fn user() -> TypeDescriptor {
        TypeDescriptor::class("User")
    }

    fn callback(raw: &str, args: Vec<TypeDescriptor>) -> TypeDescriptor {
        TypeDescriptor::parameterized(raw, args)
    }

    fn read_one(
        description: &ContractDescription,
        operation: &str,
    ) -> Result<Arc<Endpoint>, ContractError> {
        let contract = Contract::read(description)?;
        Ok(contract.endpoints().select(operation).unwrap().clone())
    }

    #[test]
    fn test_path_joined_from_root_contract_and_operation() {
        let description = ContractDescription::builder("Users")
            .path("/v1/")
            .operation(
                OperationDescription::get("find", "//users/{id}?expand=roles&flag")
                    .param(ParameterDeclaration::path("id", string())),
            )
            .build();

        let contract = Assembler::new()
            .with_root("/api/")
            .read(&description)
            .unwrap();
        let endpoint = contract.endpoints().select("find").unwrap();

        assert_eq!(endpoint.method(), &Method::GET);
        assert_eq!(endpoint.path().as_str(), "/api/v1/users/{id}");
        assert_eq!(
            endpoint.query().pairs().collect::<Vec<_>>(),
            [("expand", "roles"), ("flag", "")]
        );
        assert_eq!(endpoint.parameters()[0].role(), ParamRole::Path);
        assert!(endpoint.parameters()[0].serializer().is_some());
    }

    #[test]
    fn test_markers_accumulate_parent_contract_operation() {
        let base = ContractDescription::builder("Base")
            .header("X-Tenant", "parent")
            .cookie("region", "eu")
            .build();
        let json = MetaMarker::new("Json", [Marker::header("accept", "application/json")]);
        let description = ContractDescription::builder("Orders")
            .extends(base, [])
            .header("x-tenant", "child")
            .marker(json)
            .query("v", "1")
            .operation(
                OperationDescription::get("list", "/orders?v=2")
                    .header("X-Tenant", "operation")
                    .cookie("region", "us"),
            )
            .build();

        let endpoint = read_one(&description, "list").unwrap();
        assert_eq!(
            endpoint.headers().get("x-tenant").unwrap(),
            ["parent", "child", "operation"]
        );
        assert_eq!(endpoint.headers().get("accept").unwrap(), ["application/json"]);
        assert_eq!(endpoint.cookies().get("region").unwrap(), ["eu", "us"]);
        assert_eq!(endpoint.query().get("v").unwrap(), ["1", "2"]);
    }

    #[test]
    fn test_method_marker_count_enforced() {
        let missing = ContractDescription::builder("C")
            .operation(OperationDescription::new("ping"))
            .build();
        assert!(matches!(
            Contract::read(&missing).unwrap_err(),
            ContractError::MissingHttpMethod { .. }
        ));

        let twice = ContractDescription::builder("C")
            .operation(
                OperationDescription::get("ping", "/ping").marker(Marker::method(Method::POST, "/ping")),
            )
            .build();
        assert_eq!(
            Contract::read(&twice).unwrap_err(),
            ContractError::MultipleHttpMethods {
                operation: "ping".to_owned(),
                count: 2
            }
        );
    }

    #[test]
    fn test_two_bodies_rejected_in_any_order() {
        for params in [
            vec![
                ParameterDeclaration::body(user()),
                ParameterDeclaration::header("x-id", string()),
                ParameterDeclaration::new(user()),
            ],
            vec![
                ParameterDeclaration::new(user()),
                ParameterDeclaration::body(user()),
            ],
        ] {
            let op = params
                .into_iter()
                .fold(OperationDescription::post("save", "/users"), OperationDescription::param);
            let description = ContractDescription::builder("C").operation(op).build();
            assert_eq!(
                Contract::read(&description).unwrap_err(),
                ContractError::MultipleBodies {
                    operation: "save".to_owned()
                }
            );
        }
    }

    #[test]
    fn test_callback_shapes() {
        let valid = ContractDescription::builder("C")
            .operation(
                OperationDescription::get("watch", "/events")
                    .param(ParameterDeclaration::new(callback(
                        names::CALLBACK,
                        vec![user(), TypeDescriptor::class(names::FAILURE)],
                    )))
                    .param(ParameterDeclaration::new(callback(
                        names::SUCCESS_CALLBACK,
                        vec![user()],
                    ))),
            )
            .build();
        let endpoint = read_one(&valid, "watch").unwrap();
        assert_eq!(endpoint.callback_parameters().count(), 2);
        assert!(endpoint.body_parameter().is_none());
        assert_eq!(endpoint.parameters()[0].callback_success_type(), Some(user()));

        let invalid = ContractDescription::builder("C")
            .operation(OperationDescription::get("watch", "/events").param(
                ParameterDeclaration::callback(callback(
                    names::SUCCESS_CALLBACK,
                    vec![user(), user()],
                )),
            ))
            .build();
        assert!(matches!(
            Contract::read(&invalid).unwrap_err(),
            ContractError::InvalidCallback { position: 0, .. }
        ));
    }

    #[test]
    fn test_inherited_operation_resolved_in_child() {
        let repo = ContractDescription::builder("Repo").type_param("T");
        let t = repo.variable("T");
        let repo = repo
            .path("/repo")
            .operation(
                OperationDescription::get("find", "/{id}")
                    .param(ParameterDeclaration::path("id", string()))
                    .returns_type(TypeDescriptor::parameterized(names::OPTION, [t])),
            )
            .operation(OperationDescription::delete("remove", "/{id}")
                .param(ParameterDeclaration::path("id", string())))
            .build();
        let users = ContractDescription::builder("Users")
            .extends(repo, [user()])
            .path("/users")
            .operation(
                OperationDescription::delete("remove", "/{id}/soft")
                    .param(ParameterDeclaration::path("id", string())),
            )
            .build();

        let contract = Contract::read(&users).unwrap();
        assert_eq!(contract.endpoints().len(), 2);

        let find = contract.endpoints().select("find").unwrap();
        assert_eq!(find.operation().contract(), "Repo");
        assert_eq!(find.path().as_str(), "/repo/users/{id}");
        assert_eq!(
            find.return_type(),
            &TypeDescriptor::parameterized(names::OPTION, [user()])
        );

        let remove = contract.endpoints().select("remove").unwrap();
        assert_eq!(remove.operation().contract(), "Users");
        assert_eq!(remove.path().as_str(), "/repo/users/{id}/soft");
    }

    #[test]
    fn test_own_type_variable_cannot_be_resolved() {
        let repo = ContractDescription::builder("Repo").type_param("T");
        let t = repo.variable("T");
        let repo = repo
            .operation(OperationDescription::get("all", "/").returns_type(t))
            .build();

        assert_eq!(
            Contract::read(&repo).unwrap_err(),
            ContractError::UnresolvedTypeVariable {
                operation: "all".to_owned(),
                variable: "T".to_owned(),
                declared_on: "Repo".to_owned(),
            }
        );
    }

    #[test]
    fn test_inheritance_limits() {
        let a = ContractDescription::builder("A").build();
        let b = ContractDescription::builder("B").build();
        let two = ContractDescription::builder("C")
            .extends(a.clone(), [])
            .extends(b, [])
            .build();
        assert!(matches!(
            Contract::read(&two).unwrap_err(),
            ContractError::MultipleParents { count: 2, .. }
        ));

        let middle = ContractDescription::builder("Middle").extends(a, []).build();
        let leaf = ContractDescription::builder("Leaf").extends(middle, []).build();
        assert!(matches!(
            Contract::read(&leaf).unwrap_err(),
            ContractError::InheritanceTooDeep { .. }
        ));
    }

    #[test]
    fn test_identical_markers_differ_only_by_operation() {
        let op = |name: &str| {
            OperationDescription::get(name, "/users/{id}")
                .header("accept", "application/json")
                .param(ParameterDeclaration::path("id", string()))
                .returns_type(user())
        };
        let description = ContractDescription::builder("Users")
            .operation(op("find"))
            .operation(op("lookup"))
            .build();
        let contract = Contract::read(&description).unwrap();
        let find = contract.endpoints().select("find").unwrap();
        let lookup = contract.endpoints().select("lookup").unwrap();

        assert_ne!(find, lookup);
        assert!(find.eq_ignoring_operation(lookup));
    }

    #[test]
    fn test_structural_errors() {
        let nested = MetaMarker::new("Outer", [Marker::Meta(MetaMarker::new("Inner", []))]);
        let description = ContractDescription::builder("C")
            .marker(nested)
            .operation(OperationDescription::get("a", "/a"))
            .build();
        assert_eq!(
            Contract::read(&description).unwrap_err(),
            ContractError::NestedMetaMarker {
                name: "Outer".to_owned()
            }
        );

        let unnamed = ContractDescription::builder("C")
            .operation(
                OperationDescription::get("a", "/a")
                    .param(ParameterDeclaration::new(string()).role(RoleMarker::new(ParamRole::Query))),
            )
            .build();
        assert!(matches!(
            Contract::read(&unnamed).unwrap_err(),
            ContractError::MissingParameterName { position: 0, .. }
        ));

        let duplicate = ContractDescription::builder("C")
            .operation(OperationDescription::get("a", "/a"))
            .operation(OperationDescription::get("a", "/b"))
            .build();
        assert!(matches!(
            Contract::read(&duplicate).unwrap_err(),
            ContractError::DuplicateOperation { .. }
        ));

        let bad_header = ContractDescription::builder("C")
            .header("bad header", "x")
            .operation(OperationDescription::get("a", "/a"))
            .build();
        assert!(matches!(
            Contract::read(&bad_header).unwrap_err(),
            ContractError::InvalidHeader { .. }
        ));

        let bad_path = ContractDescription::builder("C")
            .operation(OperationDescription::get("a", "/a/{id"))
            .build();
        assert!(matches!(
            Contract::read(&bad_path).unwrap_err(),
            ContractError::InvalidPathTemplate { .. }
        ));
    }

    #[test]
    fn test_custom_wire_name_wins() {
        let description = ContractDescription::builder("C")
            .operation(
                OperationDescription::get("search", "/search").param(
                    ParameterDeclaration::new(string())
                        .named("term")
                        .role(RoleMarker::new(ParamRole::Query).named("q")),
                ),
            )
            .build();
        let endpoint = read_one(&description, "search").unwrap();
        assert_eq!(endpoint.parameters()[0].name(), Some("q"));
    }
}
