//! Metrics, measures and the distances they range over

use std::fmt;
use std::sync::Arc;

use crate::{AnyObject, OpalError, OpalResult, Type};

/// Distance between neighboring inputs
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Size of the symmetric difference between two datasets
    SymmetricDistance,
    /// Number of changed records between two equally sized datasets
    HammingDistance,
    AbsoluteDistance(Type),
    L1Sensitivity(Type),
    L2Sensitivity(Type),
}

impl Metric {
    pub fn from_type(ty: &Type) -> OpalResult<Self> {
        let parsed = match ty.as_generic() {
            Some(("SymmetricDistance", [])) => Metric::SymmetricDistance,
            Some(("HammingDistance", [])) => Metric::HammingDistance,
            Some(("AbsoluteDistance", [q])) if q.is_numeric() => {
                Metric::AbsoluteDistance(q.clone())
            }
            Some(("L1Sensitivity", [q])) if q.is_numeric() => Metric::L1Sensitivity(q.clone()),
            Some(("L2Sensitivity", [q])) if q.is_numeric() => Metric::L2Sensitivity(q.clone()),
            _ => return Err(OpalError::NotImplemented(format!("metric {}", ty))),
        };
        Ok(parsed)
    }

    pub fn descriptor(&self) -> Type {
        match self {
            Metric::SymmetricDistance => Type::named("SymmetricDistance"),
            Metric::HammingDistance => Type::named("HammingDistance"),
            Metric::AbsoluteDistance(q) => Type::generic("AbsoluteDistance", vec![q.clone()]),
            Metric::L1Sensitivity(q) => Type::generic("L1Sensitivity", vec![q.clone()]),
            Metric::L2Sensitivity(q) => Type::generic("L2Sensitivity", vec![q.clone()]),
        }
    }

    /// Type of the distances this metric produces
    pub fn distance_type(&self) -> Type {
        match self {
            Metric::SymmetricDistance | Metric::HammingDistance => Type::U32,
            Metric::AbsoluteDistance(q) | Metric::L1Sensitivity(q) | Metric::L2Sensitivity(q) => {
                q.clone()
            }
        }
    }

    pub fn is_dataset_metric(&self) -> bool {
        matches!(self, Metric::SymmetricDistance | Metric::HammingDistance)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// Divergence between output distributions
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Pure differential privacy, distance `ε`
    MaxDivergence(Type),
    /// Approximate differential privacy as a curve `ε(δ)`
    SmoothedMaxDivergence(Type),
    /// Approximate differential privacy at a fixed `(ε, δ)`
    FixedSmoothedMaxDivergence(Type),
}

impl Measure {
    pub fn from_type(ty: &Type) -> OpalResult<Self> {
        let parsed = match ty.as_generic() {
            Some(("MaxDivergence", [q])) if q.is_float() => Measure::MaxDivergence(q.clone()),
            Some(("SmoothedMaxDivergence", [q])) if q.is_float() => {
                Measure::SmoothedMaxDivergence(q.clone())
            }
            Some(("FixedSmoothedMaxDivergence", [q])) if q.is_float() => {
                Measure::FixedSmoothedMaxDivergence(q.clone())
            }
            _ => return Err(OpalError::NotImplemented(format!("measure {}", ty))),
        };
        Ok(parsed)
    }

    pub fn descriptor(&self) -> Type {
        match self {
            Measure::MaxDivergence(q) => Type::generic("MaxDivergence", vec![q.clone()]),
            Measure::SmoothedMaxDivergence(q) => {
                Type::generic("SmoothedMaxDivergence", vec![q.clone()])
            }
            Measure::FixedSmoothedMaxDivergence(q) => {
                Type::generic("FixedSmoothedMaxDivergence", vec![q.clone()])
            }
        }
    }

    /// Numeric type of the privacy parameters
    pub fn carrier(&self) -> &Type {
        match self {
            Measure::MaxDivergence(q)
            | Measure::SmoothedMaxDivergence(q)
            | Measure::FixedSmoothedMaxDivergence(q) => q,
        }
    }

    /// Type produced by the privacy map
    pub fn distance_type(&self) -> Type {
        match self {
            Measure::MaxDivergence(q) => q.clone(),
            Measure::SmoothedMaxDivergence(q) => Type::generic("SMDCurve", vec![q.clone()]),
            Measure::FixedSmoothedMaxDivergence(q) => Type::Tuple(vec![q.clone(), q.clone()]),
        }
    }

    /// Type of the bound a privacy loss is checked against
    pub fn bound_type(&self) -> Type {
        match self {
            Measure::MaxDivergence(q) => q.clone(),
            Measure::SmoothedMaxDivergence(q) | Measure::FixedSmoothedMaxDivergence(q) => {
                Type::Tuple(vec![q.clone(), q.clone()])
            }
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

type CurveFn = Arc<dyn Fn(f64) -> OpalResult<f64> + Send + Sync>;

/// Privacy curve: epsilon as a function of delta
#[derive(Clone)]
pub struct SmdCurve {
    carrier: Type,
    epsilon: CurveFn,
}

impl SmdCurve {
    pub fn new(
        carrier: Type,
        epsilon: impl Fn(f64) -> OpalResult<f64> + Send + Sync + 'static,
    ) -> Self {
        SmdCurve {
            carrier,
            epsilon: Arc::new(epsilon),
        }
    }

    pub fn carrier(&self) -> &Type {
        &self.carrier
    }

    /// Smallest epsilon such that the mechanism is (epsilon, delta)-DP
    pub fn epsilon(&self, delta: f64) -> OpalResult<f64> {
        if !(delta > 0.0 && delta < 1.0) {
            return Err(OpalError::FailedMap(format!(
                "delta must be in (0, 1), got {}",
                delta
            )));
        }
        (self.epsilon)(delta)
    }
}

impl PartialEq for SmdCurve {
    fn eq(&self, other: &Self) -> bool {
        self.carrier == other.carrier && Arc::ptr_eq(&self.epsilon, &other.epsilon)
    }
}

impl fmt::Debug for SmdCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SMDCurve<{}>", self.carrier)
    }
}

/// Reject negative, NaN or infinite distances
pub fn validate_distance(distance: &AnyObject) -> OpalResult<()> {
    match distance {
        AnyObject::Tuple(items) => items.iter().try_for_each(validate_distance),
        AnyObject::Curve(_) => Ok(()),
        other => {
            let value = other.to_f64().map_err(|e| OpalError::FailedMap(e.to_string()))?;
            if value.is_nan() || value.is_infinite() || value < 0.0 {
                return Err(OpalError::FailedMap(format!(
                    "distance must be a non-negative finite number, got {}",
                    other
                )));
            }
            Ok(())
        }
    }
}

/// Partial order on distances: `lhs <= rhs`.
///
/// Tuples compare component-wise. A curve is below `(ε, δ)` when its
/// epsilon at `δ` does not exceed `ε`.
pub fn distance_le(lhs: &AnyObject, rhs: &AnyObject) -> OpalResult<bool> {
    match (lhs, rhs) {
        (AnyObject::Curve(curve), AnyObject::Tuple(bound)) if bound.len() == 2 => {
            let epsilon = curve.epsilon(bound[1].to_f64()?)?;
            Ok(epsilon <= bound[0].to_f64()?)
        }
        (AnyObject::Tuple(a), AnyObject::Tuple(b)) if a.len() == b.len() => {
            for (x, y) in a.iter().zip(b) {
                if !distance_le(x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => match lhs.scalar_cmp(rhs) {
            Some(ordering) => Ok(ordering.is_le()),
            None if lhs.type_() == rhs.type_() => Ok(false),
            None => Err(OpalError::FailedCast(format!(
                "cannot compare distance {} with {}",
                lhs.type_(),
                rhs.type_()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_descriptors() {
        let metric = Metric::from_type(&Type::parse("L1Sensitivity<f64>").unwrap()).unwrap();
        assert_eq!(metric, Metric::L1Sensitivity(Type::F64));
        assert_eq!(metric.to_string(), "L1Sensitivity<f64>");
        assert_eq!(Metric::SymmetricDistance.distance_type(), Type::U32);
        assert!(Metric::from_type(&Type::named("ChebyshevDistance")).is_err());
    }

    #[test]
    fn test_measure_descriptors() {
        let ty = Type::parse("SmoothedMaxDivergence<f64>").unwrap();
        let measure = Measure::from_type(&ty).unwrap();
        assert_eq!(measure.distance_type().to_string(), "SMDCurve<f64>");
        assert_eq!(measure.bound_type().to_string(), "(f64,f64)");
        assert!(Measure::from_type(&Type::parse("MaxDivergence<i32>").unwrap()).is_err());
    }

    #[test]
    fn test_validate_distance() {
        assert!(validate_distance(&AnyObject::U32(0)).is_ok());
        assert!(validate_distance(&AnyObject::F64(-0.5)).is_err());
        assert!(validate_distance(&AnyObject::F64(f64::NAN)).is_err());
        assert!(validate_distance(&AnyObject::I32(-1)).is_err());
    }

    #[test]
    fn test_distance_le_scalars_and_pairs() {
        assert!(distance_le(&AnyObject::F64(1.0), &AnyObject::F64(1.0)).unwrap());
        assert!(!distance_le(&AnyObject::F64(1.0), &AnyObject::F64(0.999)).unwrap());
        assert!(distance_le(&AnyObject::F64(1.0), &AnyObject::U32(1)).is_err());

        let pair = |e, d| AnyObject::Tuple(vec![AnyObject::F64(e), AnyObject::F64(d)]);
        assert!(distance_le(&pair(1.0, 1e-7), &pair(1.0, 1e-6)).unwrap());
        assert!(!distance_le(&pair(1.0, 1e-5), &pair(1.0, 1e-6)).unwrap());
    }

    #[test]
    fn test_distance_le_curve() {
        let curve = AnyObject::Curve(SmdCurve::new(Type::F64, |delta| Ok((1.0 / delta).ln())));
        let bound = |e: f64, d: f64| AnyObject::Tuple(vec![AnyObject::F64(e), AnyObject::F64(d)]);
        let eps = (1e6_f64).ln();
        assert!(distance_le(&curve, &bound(eps, 1e-6)).unwrap());
        assert!(!distance_le(&curve, &bound(eps - 0.01, 1e-6)).unwrap());
        assert!(distance_le(&curve, &bound(1.0, 0.0)).is_err());
    }
}
