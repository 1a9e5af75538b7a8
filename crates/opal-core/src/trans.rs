//! Transformation constructors
//!
//! Dataset transformations take `SymmetricDistance` (or `HammingDistance`
//! for sized data) as input metric. Aggregates produce a sensitivity metric
//! over their scalar output.

use crate::core::{Function, StabilityMap};
use crate::traits::{Element, Float, Primitive};
use crate::{AnyObject, Domain, Metric, OpalError, OpalResult, Transformation, Type};

fn check_bounds<T: Primitive>(lower: T, upper: T) -> OpalResult<()> {
    if !(lower <= upper) {
        return Err(OpalError::MakeTransformation(format!(
            "lower bound {:?} may not exceed upper bound {:?}",
            lower, upper
        )));
    }
    Ok(())
}

fn interval<T: Primitive>(lower: T, upper: T) -> OpalResult<Domain> {
    Domain::interval(lower.into_object(), upper.into_object())
        .map_err(|e| OpalError::MakeTransformation(e.to_string()))
}

fn dataset_stability() -> StabilityMap {
    StabilityMap::new(|d_in| Ok(AnyObject::U32(d_in.as_u32()?)))
}

/// Pass a vector through unchanged
pub fn make_identity<T: Primitive>() -> OpalResult<Transformation> {
    let domain = Domain::vector(Domain::all(T::type_()));
    Ok(Transformation::new(
        domain.clone(),
        domain,
        Function::new(|arg| Ok(arg.clone())),
        Metric::SymmetricDistance,
        Metric::SymmetricDistance,
        dataset_stability(),
    ))
}

/// Clamp every record into `[lower, upper]`
pub fn make_clamp<T: Primitive>(lower: T, upper: T) -> OpalResult<Transformation> {
    check_bounds(lower, upper)?;
    Ok(Transformation::new(
        Domain::vector(Domain::all(T::type_())),
        Domain::vector(interval(lower, upper)?),
        Function::new(move |arg| {
            let clamped = T::slice_of(arg)?
                .iter()
                .map(|&v| {
                    if v < lower {
                        lower
                    } else if v > upper {
                        upper
                    } else {
                        v
                    }
                })
                .collect();
            Ok(T::vec_into_object(clamped))
        }),
        Metric::SymmetricDistance,
        Metric::SymmetricDistance,
        dataset_stability(),
    ))
}

/// Sum of records bounded in `[lower, upper]`
pub fn make_bounded_sum<T: Float>(lower: T, upper: T) -> OpalResult<Transformation> {
    check_bounds(lower, upper)?;
    let ideal_sensitivity = lower.to_f64().abs().max(upper.to_f64().abs());
    Ok(Transformation::new(
        Domain::vector(interval(lower, upper)?),
        Domain::all(T::type_()),
        Function::new(|arg| Ok(T::slice_of(arg)?.iter().copied().sum::<T>().into_object())),
        Metric::SymmetricDistance,
        Metric::L1Sensitivity(T::type_()),
        StabilityMap::new(move |d_in| {
            let d_in = d_in.as_u32()? as f64;
            AnyObject::float_up(&T::type_(), d_in * ideal_sensitivity)
        }),
    ))
}

/// Mean of exactly `n` records bounded in `[lower, upper]`.
///
/// One added and one removed record move the mean by at most
/// `(upper - lower) / n`, so symmetric distance `d` yields `d (u - l) / 2n`
/// and Hamming distance `d` yields `d (u - l) / n`.
pub fn make_bounded_mean<T: Float>(
    lower: T,
    upper: T,
    n: usize,
    input_metric: Metric,
    output_metric: Metric,
) -> OpalResult<Transformation> {
    check_bounds(lower, upper)?;
    if n == 0 {
        return Err(OpalError::MakeTransformation(
            "dataset size must be positive".into(),
        ));
    }
    let per_unit = match input_metric {
        Metric::SymmetricDistance => 2.0,
        Metric::HammingDistance => 1.0,
        ref other => {
            return Err(OpalError::MakeTransformation(format!(
                "bounded mean requires a dataset input metric, got {}",
                other
            )))
        }
    };
    match &output_metric {
        Metric::L1Sensitivity(q) | Metric::L2Sensitivity(q) if q == &T::type_() => {}
        other => {
            return Err(OpalError::MakeTransformation(format!(
                "bounded mean over {} cannot produce {}",
                T::type_(),
                other
            )))
        }
    }

    let range = upper.to_f64() - lower.to_f64();
    let size = T::from_f64(n as f64);
    Ok(Transformation::new(
        Domain::sized(Domain::vector(interval(lower, upper)?), n),
        Domain::all(T::type_()),
        Function::new(move |arg| {
            let total = T::slice_of(arg)?.iter().copied().sum::<T>();
            Ok((total / size).into_object())
        }),
        input_metric,
        output_metric,
        StabilityMap::new(move |d_in| {
            let d_in = d_in.as_u32()? as f64;
            AnyObject::float_up(&T::type_(), d_in * range / (per_unit * n as f64))
        }),
    ))
}

/// Number of records
pub fn make_count<TIA: Element>() -> OpalResult<Transformation> {
    Ok(Transformation::new(
        Domain::vector(Domain::all(TIA::type_())),
        Domain::all(Type::U32),
        Function::new(|arg| {
            let len = arg.len_of(&TIA::type_())?;
            Ok(AnyObject::U32(u32::try_from(len).unwrap_or(u32::MAX)))
        }),
        Metric::SymmetricDistance,
        Metric::AbsoluteDistance(Type::U32),
        dataset_stability(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity() {
        let identity = make_identity::<i64>().unwrap();
        let data = AnyObject::VecI64(vec![3, -1]);
        assert_eq!(identity.invoke(&data).unwrap(), data);
        assert_eq!(identity.map(&AnyObject::U32(4)).unwrap(), AnyObject::U32(4));
    }

    #[test]
    fn test_clamp() {
        let clamp = make_clamp::<i32>(0, 5).unwrap();
        assert_eq!(
            clamp.invoke(&AnyObject::VecI32(vec![-3, 2, 9])).unwrap(),
            AnyObject::VecI32(vec![0, 2, 5])
        );
        assert!(make_clamp::<i32>(5, 0).is_err());
    }

    #[test]
    fn test_bounded_sum() {
        let sum = make_bounded_sum::<f64>(-2.0, 1.0).unwrap();
        assert_eq!(
            sum.invoke(&AnyObject::VecF64(vec![1.0, -2.0, 0.5])).unwrap(),
            AnyObject::F64(-0.5)
        );
        assert_eq!(sum.map(&AnyObject::U32(3)).unwrap(), AnyObject::F64(6.0));
        assert!(sum.invoke(&AnyObject::VecF64(vec![5.0])).is_err());
    }

    #[test]
    fn test_bounded_mean() {
        let mean = make_bounded_mean::<f64>(
            0.0,
            10.0,
            4,
            Metric::SymmetricDistance,
            Metric::L1Sensitivity(Type::F64),
        )
        .unwrap();
        assert_eq!(
            mean.invoke(&AnyObject::VecF64(vec![1.0, 2.0, 3.0, 6.0])).unwrap(),
            AnyObject::F64(3.0)
        );
        assert_eq!(mean.map(&AnyObject::U32(1)).unwrap(), AnyObject::F64(1.25));
        assert!(mean.invoke(&AnyObject::VecF64(vec![1.0, 2.0])).is_err());

        let hamming = make_bounded_mean::<f64>(
            0.0,
            10.0,
            4,
            Metric::HammingDistance,
            Metric::L2Sensitivity(Type::F64),
        )
        .unwrap();
        assert_eq!(hamming.map(&AnyObject::U32(1)).unwrap(), AnyObject::F64(2.5));
    }

    #[test]
    fn test_bounded_mean_rejects_bad_arguments() {
        let l1 = Metric::L1Sensitivity(Type::F64);
        let symmetric = Metric::SymmetricDistance;
        assert!(make_bounded_mean::<f64>(0.0, 1.0, 0, symmetric.clone(), l1.clone()).is_err());
        assert!(make_bounded_mean::<f64>(1.0, 0.0, 5, symmetric, l1.clone()).is_err());
        assert!(make_bounded_mean::<f64>(0.0, 1.0, 5, l1.clone(), l1).is_err());
        assert!(make_bounded_mean::<f64>(
            0.0,
            1.0,
            5,
            Metric::SymmetricDistance,
            Metric::L1Sensitivity(Type::F32)
        )
        .is_err());
    }

    #[test]
    fn test_count() {
        let count = make_count::<String>().unwrap();
        let data = AnyObject::VecString(vec!["a".into(), "b".into()]);
        assert_eq!(count.invoke(&data).unwrap(), AnyObject::U32(2));
        assert_eq!(count.output_metric, Metric::AbsoluteDistance(Type::U32));
    }

    proptest! {
        #[test]
        fn prop_mean_stability_is_monotone(a in 0u32..1000, b in 0u32..1000, n in 1usize..100) {
            let mean = make_bounded_mean::<f32>(
                -1.0,
                3.0,
                n,
                Metric::SymmetricDistance,
                Metric::L1Sensitivity(Type::F32),
            ).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = mean.map(&AnyObject::U32(lo)).unwrap().to_f64().unwrap();
            let hi = mean.map(&AnyObject::U32(hi)).unwrap().to_f64().unwrap();
            prop_assert!(lo <= hi);
        }
    }
}
