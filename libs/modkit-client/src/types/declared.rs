use super::{TypeDescriptor, names};
use crate::error::Failure;
use http::StatusCode;
use std::collections::{BTreeMap, HashMap};

/// Static mapping from a Rust type to the [`TypeDescriptor`] a contract
/// declares for it.
///
/// Return shapes are picked from the caller's static type: `Option<Vec<User>>`
/// declares `Option<Vec<User>>`, and the adapter chain built for that
/// descriptor produces a value that converts back into the same Rust type.
/// User types opt in with [`declare_value!`](crate::declare_value).
pub trait Declared {
    fn descriptor() -> TypeDescriptor;
}

impl Declared for () {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::unit()
    }
}

impl Declared for serde_json::Value {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::class(names::JSON)
    }
}

impl Declared for StatusCode {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::class(names::STATUS)
    }
}

impl Declared for Failure {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::class(names::FAILURE)
    }
}

impl<T: Declared> Declared for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::OPTION, [T::descriptor()])
    }
}

impl<T: Declared> Declared for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::VEC, [T::descriptor()])
    }
}

impl<T: Declared> Declared for Result<T, Failure> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::RESULT, [T::descriptor(), Failure::descriptor()])
    }
}

impl<V: Declared, S> Declared for HashMap<String, V, S> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::MAP, [String::descriptor(), V::descriptor()])
    }
}

impl<V: Declared> Declared for BTreeMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::parameterized(names::MAP, [String::descriptor(), V::descriptor()])
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapter::Eventual;

    #[test]
    fn test_nested_shapes() {
        let ty = <Eventual<Option<Vec<String>>>>::descriptor();
        assert_eq!(ty.to_string(), "Eventual<Option<Vec<String>>>");

        let ty = <Result<i64, Failure>>::descriptor();
        assert_eq!(ty.to_string(), "Result<i64, Failure>");

        let ty = <HashMap<String, bool>>::descriptor();
        assert_eq!(ty.to_string(), "Map<String, bool>");
    }

    #[test]
    fn test_unit_and_json() {
        assert!(<()>::descriptor().is_unit());
        assert!(serde_json::Value::descriptor().is(names::JSON));
    }
}
