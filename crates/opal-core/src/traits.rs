//! Carrier traits used to monomorphize kernels

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Sub};

use crate::{AnyObject, OpalError, OpalResult, Type};

/// A type that may appear as the element of a native vector
pub trait Element: 'static + Send + Sync {
    fn type_() -> Type;
}

/// A scalar carrier that converts to and from [`AnyObject`]
pub trait Primitive: Element + Copy + PartialOrd + fmt::Debug {
    fn into_object(self) -> AnyObject;
    fn from_object(obj: &AnyObject) -> OpalResult<Self>;
    fn vec_into_object(values: Vec<Self>) -> AnyObject;
    fn slice_of(obj: &AnyObject) -> OpalResult<&[Self]>;
}

/// Floating-point carriers
pub trait Float:
    Primitive
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Sum<Self>
{
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn is_finite(self) -> bool;
}

/// Integer carriers
pub trait Integer: Primitive {
    fn to_i128(self) -> i128;
    fn from_i128_saturating(value: i128) -> Self;
}

impl Element for String {
    fn type_() -> Type {
        Type::String
    }
}

macro_rules! impl_primitive {
    ($ty:ty, $desc:expr, $variant:ident, $vec:ident) => {
        impl Element for $ty {
            fn type_() -> Type {
                $desc
            }
        }

        impl Primitive for $ty {
            fn into_object(self) -> AnyObject {
                AnyObject::$variant(self)
            }

            fn from_object(obj: &AnyObject) -> OpalResult<Self> {
                match obj {
                    AnyObject::$variant(v) => Ok(*v),
                    other => Err(OpalError::FailedCast(format!(
                        "expected {}, found {}",
                        $desc,
                        other.type_()
                    ))),
                }
            }

            fn vec_into_object(values: Vec<Self>) -> AnyObject {
                AnyObject::$vec(values)
            }

            fn slice_of(obj: &AnyObject) -> OpalResult<&[Self]> {
                match obj {
                    AnyObject::$vec(v) => Ok(v.as_slice()),
                    other => Err(OpalError::FailedCast(format!(
                        "expected Vec<{}>, found {}",
                        $desc,
                        other.type_()
                    ))),
                }
            }
        }
    };
}

impl_primitive!(bool, Type::Bool, Bool, VecBool);
impl_primitive!(i32, Type::I32, I32, VecI32);
impl_primitive!(i64, Type::I64, I64, VecI64);
impl_primitive!(u32, Type::U32, U32, VecU32);
impl_primitive!(u64, Type::U64, U64, VecU64);
impl_primitive!(f32, Type::F32, F32, VecF32);
impl_primitive!(f64, Type::F64, F64, VecF64);

impl Float for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

impl Float for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl Integer for $ty {
            fn to_i128(self) -> i128 {
                self as i128
            }
            fn from_i128_saturating(value: i128) -> Self {
                value.clamp(<$ty>::MIN as i128, <$ty>::MAX as i128) as $ty
            }
        }
    )*};
}

impl_integer!(i32, i64, u32, u64);
