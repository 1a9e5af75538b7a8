//! Domains: the sets of legal inputs and outputs

use std::cmp::Ordering;
use std::fmt;

use crate::{AnyObject, OpalError, OpalResult, Type};

/// Set of values an entity accepts or produces.
///
/// Two domains are equal only when their structure matches exactly,
/// including interval bounds and sizes.
#[derive(Clone, Debug, PartialEq)]
pub enum Domain {
    /// Every value of the carrier type
    All(Type),
    /// Scalars of `carrier` within `[lower, upper]`
    Interval {
        carrier: Type,
        lower: AnyObject,
        upper: AnyObject,
    },
    /// Vectors whose elements belong to the inner domain
    Vector(Box<Domain>),
    /// Collections of exactly `size` records
    Sized { inner: Box<Domain>, size: usize },
    /// Tuples, one domain per component
    Product(Vec<Domain>),
}

impl Domain {
    pub fn all(carrier: Type) -> Self {
        Domain::All(carrier)
    }

    /// Closed interval; bounds must have the carrier type and be ordered
    pub fn interval(lower: AnyObject, upper: AnyObject) -> OpalResult<Self> {
        let carrier = lower.type_();
        if upper.type_() != carrier || !carrier.is_numeric() {
            return Err(OpalError::InvalidArgument(format!(
                "interval bounds must share a numeric type, got {} and {}",
                carrier,
                upper.type_()
            )));
        }
        match lower.scalar_cmp(&upper) {
            Some(Ordering::Less) | Some(Ordering::Equal) => Ok(Domain::Interval {
                carrier,
                lower,
                upper,
            }),
            _ => Err(OpalError::InvalidArgument(format!(
                "lower bound {} may not exceed upper bound {}",
                lower, upper
            ))),
        }
    }

    pub fn vector(inner: Domain) -> Self {
        Domain::Vector(Box::new(inner))
    }

    pub fn sized(inner: Domain, size: usize) -> Self {
        Domain::Sized {
            inner: Box::new(inner),
            size,
        }
    }

    /// Type of the values in this domain
    pub fn carrier(&self) -> Type {
        match self {
            Domain::All(carrier) | Domain::Interval { carrier, .. } => carrier.clone(),
            Domain::Vector(inner) => Type::vec(inner.carrier()),
            Domain::Sized { inner, .. } => inner.carrier(),
            Domain::Product(parts) => Type::Tuple(parts.iter().map(Domain::carrier).collect()),
        }
    }

    /// Descriptor naming the shape of this domain, without bounds or sizes.
    /// `IntervalDomain<f64>` for an interval of `f64`.
    pub fn descriptor(&self) -> Type {
        match self {
            Domain::All(carrier) => Type::generic("AllDomain", vec![carrier.clone()]),
            Domain::Interval { carrier, .. } => {
                Type::generic("IntervalDomain", vec![carrier.clone()])
            }
            Domain::Vector(inner) => Type::generic("VectorDomain", vec![inner.descriptor()]),
            Domain::Sized { inner, .. } => Type::generic("SizedDomain", vec![inner.descriptor()]),
            Domain::Product(parts) => {
                Type::generic("ProductDomain", parts.iter().map(Domain::descriptor).collect())
            }
        }
    }

    /// Record domain and record count of `Sized(Vector(atom), n)`
    pub fn sized_records(&self) -> Option<(&Domain, usize)> {
        match self {
            Domain::Sized { inner, size } => match inner.as_ref() {
                Domain::Vector(atom) => Some((atom.as_ref(), *size)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `value` belongs to this domain
    pub fn member(&self, value: &AnyObject) -> OpalResult<bool> {
        match self {
            Domain::All(carrier) => Ok(&value.type_() == carrier && !is_nan(value)),
            Domain::Interval {
                carrier,
                lower,
                upper,
            } => {
                if &value.type_() != carrier {
                    return Ok(false);
                }
                let above = matches!(
                    value.scalar_cmp(lower),
                    Some(Ordering::Greater) | Some(Ordering::Equal)
                );
                let below = matches!(
                    value.scalar_cmp(upper),
                    Some(Ordering::Less) | Some(Ordering::Equal)
                );
                Ok(above && below)
            }
            Domain::Vector(inner) => {
                if value.type_() != self.carrier() {
                    return Ok(false);
                }
                match value.elements() {
                    Some(items) => {
                        for item in &items {
                            if !inner.member(item)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Domain::Sized { inner, size } => {
                let element = inner.carrier();
                let len = match element.element() {
                    Some(el) => value.len_of(el).ok(),
                    None => None,
                };
                match len {
                    Some(len) if len == *size => inner.member(value),
                    _ => Ok(false),
                }
            }
            Domain::Product(parts) => match value {
                AnyObject::Tuple(items) if items.len() == parts.len() => {
                    for (part, item) in parts.iter().zip(items) {
                        if !part.member(item)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
        }
    }
}

fn is_nan(value: &AnyObject) -> bool {
    match value {
        AnyObject::F32(v) => v.is_nan(),
        AnyObject::F64(v) => v.is_nan(),
        _ => false,
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::All(carrier) => write!(f, "AllDomain<{}>", carrier),
            Domain::Interval {
                carrier,
                lower,
                upper,
            } => write!(f, "IntervalDomain<{}>[{}, {}]", carrier, lower, upper),
            Domain::Vector(inner) => write!(f, "VectorDomain<{}>", inner),
            Domain::Sized { inner, size } => write!(f, "SizedDomain<{}>[{}]", inner, size),
            Domain::Product(parts) => {
                let inner: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "ProductDomain<{}>", inner.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_interval() -> Domain {
        Domain::interval(AnyObject::F64(0.0), AnyObject::F64(10.0)).unwrap()
    }

    #[test]
    fn test_interval_rejects_bad_bounds() {
        assert!(Domain::interval(AnyObject::F64(1.0), AnyObject::F64(0.0)).is_err());
        assert!(Domain::interval(AnyObject::F64(0.0), AnyObject::I32(1)).is_err());
        assert!(Domain::interval(AnyObject::Bool(false), AnyObject::Bool(true)).is_err());
    }

    #[test]
    fn test_membership() {
        let domain = Domain::sized(Domain::vector(unit_interval()), 3);
        assert!(domain.member(&AnyObject::VecF64(vec![0.0, 5.0, 10.0])).unwrap());
        assert!(!domain.member(&AnyObject::VecF64(vec![0.0, 11.0, 1.0])).unwrap());
        assert!(!domain.member(&AnyObject::VecF64(vec![1.0, 2.0])).unwrap());
        assert!(!domain.member(&AnyObject::VecI32(vec![1, 2, 3])).unwrap());

        let all = Domain::all(Type::F64);
        assert!(all.member(&AnyObject::F64(-1e300)).unwrap());
        assert!(!all.member(&AnyObject::F64(f64::NAN)).unwrap());
    }

    #[test]
    fn test_product_membership() {
        let domain = Domain::Product(vec![Domain::all(Type::U32), Domain::all(Type::F64)]);
        let value = AnyObject::Tuple(vec![AnyObject::U32(3), AnyObject::F64(0.5)]);
        assert!(domain.member(&value).unwrap());
        assert!(!domain.member(&AnyObject::Tuple(vec![AnyObject::U32(3)])).unwrap());
    }

    #[test]
    fn test_structural_equality_and_display() {
        let a = Domain::sized(Domain::vector(unit_interval()), 10);
        let b = Domain::sized(Domain::vector(unit_interval()), 10);
        let c = Domain::sized(Domain::vector(unit_interval()), 11);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a.to_string(),
            "SizedDomain<VectorDomain<IntervalDomain<f64>[0.0, 10.0]>>[10]"
        );
        assert_eq!(a.carrier().to_string(), "Vec<f64>");
        assert_eq!(a.sized_records(), Some((&unit_interval(), 10)));
        assert_eq!(unit_interval().descriptor().to_string(), "IntervalDomain<f64>");
    }
}
