//! Type descriptor resolution
//!
//! Host values carry only a coarse [`HostType`]. The resolver maps those to
//! native descriptors through a fixed table, and builds compound descriptors
//! by substituting resolved leaves into caller-supplied shapes.

use std::collections::{BTreeMap, HashMap};

use opal_core::Type;

use crate::{HostError, HostResult, HostType, HostValue};

/// Resolved type parameters, keyed by parameter name
pub type Bindings = HashMap<String, Type>;

/// Either a host type marker or a descriptor written out in full
#[derive(Debug, Clone, PartialEq)]
pub enum TypeHint {
    Host(HostType),
    Descriptor(String),
}

impl From<HostType> for TypeHint {
    fn from(ty: HostType) -> Self {
        TypeHint::Host(ty)
    }
}

impl From<&str> for TypeHint {
    fn from(text: &str) -> Self {
        TypeHint::Descriptor(text.to_string())
    }
}

impl From<String> for TypeHint {
    fn from(text: String) -> Self {
        TypeHint::Descriptor(text)
    }
}

impl From<&Type> for TypeHint {
    fn from(ty: &Type) -> Self {
        TypeHint::Descriptor(ty.to_string())
    }
}

fn host_table(ty: HostType) -> Option<Type> {
    match ty {
        HostType::Bool => Some(Type::Bool),
        HostType::Int => Some(Type::I32),
        HostType::Float => Some(Type::F64),
        HostType::Str => Some(Type::String),
        HostType::List | HostType::Tuple => None,
    }
}

/// Canonical descriptor for a hint
pub fn standardize(hint: &TypeHint) -> HostResult<Type> {
    match hint {
        TypeHint::Host(ty) => host_table(*ty).ok_or_else(|| {
            HostError::UnsupportedType(format!(
                "host type {:?} has no native counterpart, pass a descriptor",
                ty
            ))
        }),
        TypeHint::Descriptor(text) => {
            Type::parse(text).map_err(|e| HostError::UnsupportedType(format!("{}: {}", text, e)))
        }
    }
}

/// Descriptor for the runtime type of `value`
pub fn infer(value: &HostValue) -> HostResult<Type> {
    match value {
        HostValue::List(items) => {
            let first = items.first().ok_or_else(|| {
                HostError::UnsupportedType("cannot infer the element type of an empty list".into())
            })?;
            Ok(Type::vec(infer(first)?))
        }
        HostValue::Tuple(items) => {
            let members = items.iter().map(infer).collect::<HostResult<_>>()?;
            Ok(Type::Tuple(members))
        }
        scalar => standardize(&TypeHint::Host(scalar.host_type())),
    }
}

/// Substitute `bindings` into a single shape such as `(T,T)`
pub fn template(shape: &str, bindings: &Bindings) -> HostResult<Type> {
    let parsed = Type::parse(shape).map_err(|e| HostError::UnsupportedType(e.to_string()))?;
    Ok(parsed.substitute(bindings))
}

/// Substitute `bindings` into an argument shape such as `<MI,L1Sensitivity<T>>`
pub fn template_args(shape: &str, bindings: &Bindings) -> HostResult<Vec<Type>> {
    let parsed = Type::parse_args(shape).map_err(|e| HostError::UnsupportedType(e.to_string()))?;
    Ok(parsed.iter().map(|ty| ty.substitute(bindings)).collect())
}

/// Optional type arguments supplied by the caller, keyed by parameter name
#[derive(Debug, Clone, Default)]
pub struct Hints {
    hints: BTreeMap<String, TypeHint>,
}

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, hint: impl Into<TypeHint>) -> Self {
        self.hints.insert(name.into(), hint.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeHint> {
        self.hints.get(name)
    }

    /// The hint for `name` if given, else `fallback`
    pub fn resolve(
        &self,
        name: &str,
        fallback: impl FnOnce() -> HostResult<Type>,
    ) -> HostResult<Type> {
        match self.hints.get(name) {
            Some(hint) => standardize(hint),
            None => fallback(),
        }
    }

    /// The hint for `name`, which has no default
    pub fn require(&self, name: &str) -> HostResult<Type> {
        self.resolve(name, || {
            Err(HostError::UnsupportedType(format!(
                "type argument {} must be given explicitly",
                name
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize() {
        assert_eq!(standardize(&HostType::Float.into()).unwrap(), Type::F64);
        assert_eq!(standardize(&"u32".into()).unwrap(), Type::U32);
        assert!(matches!(
            standardize(&HostType::List.into()),
            Err(HostError::UnsupportedType(_))
        ));
        assert!(matches!(
            standardize(&"Vec<".into()),
            Err(HostError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_infer() {
        assert_eq!(infer(&HostValue::Int(1)).unwrap(), Type::I32);
        assert_eq!(infer(&vec![1.0, 2.0].into()).unwrap(), Type::vec(Type::F64));
        assert_eq!(
            infer(&(1.0, 2).into()).unwrap(),
            Type::Tuple(vec![Type::F64, Type::I32])
        );
        assert!(infer(&HostValue::List(vec![])).is_err());
    }

    #[test]
    fn test_template() {
        let mut bindings = Bindings::new();
        bindings.insert("T".into(), Type::F64);
        bindings.insert("MI".into(), Type::named("SymmetricDistance"));

        assert_eq!(template("(T,T)", &bindings).unwrap().to_string(), "(f64,f64)");
        let args = template_args("<MI,L1Sensitivity<T>>", &bindings).unwrap();
        assert_eq!(Type::args_blob(&args), "<SymmetricDistance,L1Sensitivity<f64>>");
    }

    #[test]
    fn test_hints() {
        let hints = Hints::new().with("T", "f32");
        assert_eq!(hints.resolve("T", || Ok(Type::F64)).unwrap(), Type::F32);
        assert_eq!(hints.resolve("MI", || Ok(Type::U32)).unwrap(), Type::U32);
        assert!(hints.require("TIA").is_err());
    }
}
