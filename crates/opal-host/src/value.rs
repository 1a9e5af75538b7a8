//! Dynamically-typed host values

use std::fmt;

/// Runtime type tag of a [`HostValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
}

/// A value as the host sees it, before any native type is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Homogeneous sequence
    List(Vec<HostValue>),
    /// Fixed-arity heterogeneous sequence
    Tuple(Vec<HostValue>),
}

impl HostValue {
    pub fn host_type(&self) -> HostType {
        match self {
            HostValue::Bool(_) => HostType::Bool,
            HostValue::Int(_) => HostType::Int,
            HostValue::Float(_) => HostType::Float,
            HostValue::Str(_) => HostType::Str,
            HostValue::List(_) => HostType::List,
            HostValue::Tuple(_) => HostType::Tuple,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(i) => write!(f, "{}", i),
            HostValue::Float(x) => write!(f, "{:?}", x),
            HostValue::Str(s) => write!(f, "{:?}", s),
            HostValue::List(items) | HostValue::Tuple(items) => {
                let (open, close) = match self {
                    HostValue::List(_) => ("[", "]"),
                    _ => ("(", ")"),
                };
                f.write_str(open)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(close)
            }
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {$(
        impl From<$ty> for HostValue {
            fn from(value: $ty) -> Self {
                HostValue::Int(value as i64)
            }
        }
    )*};
}

impl_from_int!(i32, i64, u32);

impl From<f32> for HostValue {
    fn from(value: f32) -> Self {
        HostValue::Float(value as f64)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Str(value)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(values: Vec<T>) -> Self {
        HostValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<HostValue>, B: Into<HostValue>> From<(A, B)> for HostValue {
    fn from((a, b): (A, B)) -> Self {
        HostValue::Tuple(vec![a.into(), b.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(HostValue::from(3_u32), HostValue::Int(3));
        assert_eq!(
            HostValue::from(vec![1.0, 2.0]),
            HostValue::List(vec![HostValue::Float(1.0), HostValue::Float(2.0)])
        );
        assert_eq!(
            HostValue::from((1.0, 1e-6)).host_type(),
            HostType::Tuple
        );
        assert_eq!(HostValue::Int(2).as_float(), Some(2.0));
        assert_eq!(HostValue::Float(2.0).as_int(), None);
    }

    #[test]
    fn test_display() {
        let value = HostValue::Tuple(vec![HostValue::Float(0.5), HostValue::from(vec!["a"])]);
        assert_eq!(value.to_string(), "(0.5, [\"a\"])");
    }
}
