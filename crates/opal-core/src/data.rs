//! Type-erased values that live on the native side of the boundary

use std::cmp::Ordering;
use std::fmt;

use crate::dist::SmdCurve;
use crate::{OpalError, OpalResult, Type};

/// Opaque native value. The closed set of variants mirrors the supported
/// descriptors; every value can report its own [`Type`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnyObject {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    VecBool(Vec<bool>),
    VecI32(Vec<i32>),
    VecI64(Vec<i64>),
    VecU32(Vec<u32>),
    VecU64(Vec<u64>),
    VecF32(Vec<f32>),
    VecF64(Vec<f64>),
    VecString(Vec<String>),
    Tuple(Vec<AnyObject>),
    Curve(SmdCurve),
}

impl AnyObject {
    /// Descriptor of this value
    pub fn type_(&self) -> Type {
        match self {
            AnyObject::Bool(_) => Type::Bool,
            AnyObject::I32(_) => Type::I32,
            AnyObject::I64(_) => Type::I64,
            AnyObject::U32(_) => Type::U32,
            AnyObject::U64(_) => Type::U64,
            AnyObject::F32(_) => Type::F32,
            AnyObject::F64(_) => Type::F64,
            AnyObject::String(_) => Type::String,
            AnyObject::VecBool(_) => Type::vec(Type::Bool),
            AnyObject::VecI32(_) => Type::vec(Type::I32),
            AnyObject::VecI64(_) => Type::vec(Type::I64),
            AnyObject::VecU32(_) => Type::vec(Type::U32),
            AnyObject::VecU64(_) => Type::vec(Type::U64),
            AnyObject::VecF32(_) => Type::vec(Type::F32),
            AnyObject::VecF64(_) => Type::vec(Type::F64),
            AnyObject::VecString(_) => Type::vec(Type::String),
            AnyObject::Tuple(items) => Type::Tuple(items.iter().map(AnyObject::type_).collect()),
            AnyObject::Curve(curve) => Type::generic("SMDCurve", vec![curve.carrier().clone()]),
        }
    }

    /// Widen a numeric scalar to `f64`
    pub fn to_f64(&self) -> OpalResult<f64> {
        Ok(match self {
            AnyObject::I32(v) => *v as f64,
            AnyObject::I64(v) => *v as f64,
            AnyObject::U32(v) => *v as f64,
            AnyObject::U64(v) => *v as f64,
            AnyObject::F32(v) => *v as f64,
            AnyObject::F64(v) => *v,
            other => {
                return Err(OpalError::FailedCast(format!(
                    "expected a numeric scalar, found {}",
                    other.type_()
                )))
            }
        })
    }

    /// Build a float distance of type `carrier` that is never smaller than `value`
    pub fn float_up(carrier: &Type, value: f64) -> OpalResult<AnyObject> {
        match carrier {
            Type::F64 => Ok(AnyObject::F64(value)),
            Type::F32 => Ok(AnyObject::F32(f32_up(value))),
            other => Err(OpalError::FailedCast(format!(
                "distances of type {} are not floating-point",
                other
            ))),
        }
    }

    pub fn as_u32(&self) -> OpalResult<u32> {
        match self {
            AnyObject::U32(v) => Ok(*v),
            other => Err(OpalError::FailedCast(format!(
                "expected u32, found {}",
                other.type_()
            ))),
        }
    }

    pub fn as_curve(&self) -> OpalResult<&SmdCurve> {
        match self {
            AnyObject::Curve(curve) => Ok(curve),
            other => Err(OpalError::FailedCast(format!(
                "expected a privacy curve, found {}",
                other.type_()
            ))),
        }
    }

    pub fn as_tuple(&self) -> OpalResult<&[AnyObject]> {
        match self {
            AnyObject::Tuple(items) => Ok(items),
            other => Err(OpalError::FailedCast(format!(
                "expected a tuple, found {}",
                other.type_()
            ))),
        }
    }

    /// Number of elements of a vector whose element type is `element`
    pub fn len_of(&self, element: &Type) -> OpalResult<usize> {
        let len = match (self, element) {
            (AnyObject::VecBool(v), Type::Bool) => v.len(),
            (AnyObject::VecI32(v), Type::I32) => v.len(),
            (AnyObject::VecI64(v), Type::I64) => v.len(),
            (AnyObject::VecU32(v), Type::U32) => v.len(),
            (AnyObject::VecU64(v), Type::U64) => v.len(),
            (AnyObject::VecF32(v), Type::F32) => v.len(),
            (AnyObject::VecF64(v), Type::F64) => v.len(),
            (AnyObject::VecString(v), Type::String) => v.len(),
            (other, _) => {
                return Err(OpalError::FailedCast(format!(
                    "expected Vec<{}>, found {}",
                    element,
                    other.type_()
                )))
            }
        };
        Ok(len)
    }

    /// Elements of a vector or tuple, cloned into scalar objects
    pub fn elements(&self) -> Option<Vec<AnyObject>> {
        fn wrap<T: Clone>(v: &[T], f: fn(T) -> AnyObject) -> Vec<AnyObject> {
            v.iter().cloned().map(f).collect()
        }
        Some(match self {
            AnyObject::VecBool(v) => wrap(v, AnyObject::Bool),
            AnyObject::VecI32(v) => wrap(v, AnyObject::I32),
            AnyObject::VecI64(v) => wrap(v, AnyObject::I64),
            AnyObject::VecU32(v) => wrap(v, AnyObject::U32),
            AnyObject::VecU64(v) => wrap(v, AnyObject::U64),
            AnyObject::VecF32(v) => wrap(v, AnyObject::F32),
            AnyObject::VecF64(v) => wrap(v, AnyObject::F64),
            AnyObject::VecString(v) => wrap(v, AnyObject::String),
            AnyObject::Tuple(items) => items.clone(),
            _ => return None,
        })
    }

    /// Order two scalars of the same type
    pub fn scalar_cmp(&self, other: &AnyObject) -> Option<Ordering> {
        match (self, other) {
            (AnyObject::Bool(a), AnyObject::Bool(b)) => a.partial_cmp(b),
            (AnyObject::I32(a), AnyObject::I32(b)) => a.partial_cmp(b),
            (AnyObject::I64(a), AnyObject::I64(b)) => a.partial_cmp(b),
            (AnyObject::U32(a), AnyObject::U32(b)) => a.partial_cmp(b),
            (AnyObject::U64(a), AnyObject::U64(b)) => a.partial_cmp(b),
            (AnyObject::F32(a), AnyObject::F32(b)) => a.partial_cmp(b),
            (AnyObject::F64(a), AnyObject::F64(b)) => a.partial_cmp(b),
            (AnyObject::String(a), AnyObject::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for AnyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyObject::Bool(v) => write!(f, "{}", v),
            AnyObject::I32(v) => write!(f, "{}", v),
            AnyObject::I64(v) => write!(f, "{}", v),
            AnyObject::U32(v) => write!(f, "{}", v),
            AnyObject::U64(v) => write!(f, "{}", v),
            AnyObject::F32(v) => write!(f, "{:?}", v),
            AnyObject::F64(v) => write!(f, "{:?}", v),
            AnyObject::String(v) => write!(f, "{:?}", v),
            AnyObject::Curve(curve) => write!(f, "{:?}", curve),
            other => match other.elements() {
                Some(items) => {
                    let inner: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                    if matches!(other, AnyObject::Tuple(_)) {
                        write!(f, "({})", inner.join(", "))
                    } else {
                        write!(f, "[{}]", inner.join(", "))
                    }
                }
                None => write!(f, "{:?}", other),
            },
        }
    }
}

/// Round `value` to an `f32` that is not below it
pub fn f32_up(value: f64) -> f32 {
    let rounded = value as f32;
    if (rounded as f64) >= value || rounded.is_nan() || rounded == f32::INFINITY {
        return rounded;
    }
    if rounded == 0.0 {
        return f32::from_bits(1);
    }
    let bits = rounded.to_bits();
    if rounded > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_of_values() {
        assert_eq!(AnyObject::F64(1.0).type_(), Type::F64);
        assert_eq!(AnyObject::VecI32(vec![1, 2]).type_().to_string(), "Vec<i32>");
        let pair = AnyObject::Tuple(vec![AnyObject::F64(1.0), AnyObject::U32(2)]);
        assert_eq!(pair.type_().to_string(), "(f64,u32)");
    }

    #[test]
    fn test_len_of_checks_element_type() {
        let v = AnyObject::VecF64(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.len_of(&Type::F64).unwrap(), 3);
        assert!(v.len_of(&Type::I32).is_err());
        assert!(AnyObject::F64(1.0).len_of(&Type::F64).is_err());
    }

    #[test]
    fn test_f32_up_never_rounds_down() {
        for value in [0.1_f64, 1.0 / 3.0, 0.494_034, 1e-40, 7.0] {
            assert!(f32_up(value) as f64 >= value, "{} rounded down", value);
        }
        assert_eq!(f32_up(0.5), 0.5);
    }

    #[test]
    fn test_display() {
        assert_eq!(AnyObject::F64(10.0).to_string(), "10.0");
        assert_eq!(AnyObject::VecU32(vec![1, 2]).to_string(), "[1, 2]");
    }
}
