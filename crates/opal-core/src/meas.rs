//! Measurement constructors

use crate::core::{Function, PrivacyMap};
use crate::dist::SmdCurve;
use crate::samplers::{sample_gaussian, sample_laplace, sample_two_sided_geometric};
use crate::traits::{Float, Integer};
use crate::{AnyObject, Domain, Measure, Measurement, Metric, OpalError, OpalResult, Type};

fn check_scale(scale: f64) -> OpalResult<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(OpalError::MakeMeasurement(format!(
            "scale must be positive and finite, got {}",
            scale
        )));
    }
    Ok(())
}

/// Add Laplace noise of the given scale. Pure DP with `ε = d_in / scale`.
pub fn make_base_laplace<T: Float>(scale: T) -> OpalResult<Measurement> {
    let scale = scale.to_f64();
    check_scale(scale)?;
    Ok(Measurement::new(
        Domain::all(T::type_()),
        Domain::all(T::type_()),
        Function::new(move |arg| {
            let value = T::from_object(arg)?.to_f64();
            Ok(T::from_f64(value + sample_laplace(scale)?).into_object())
        }),
        Metric::L1Sensitivity(T::type_()),
        Measure::MaxDivergence(T::type_()),
        PrivacyMap::new(move |d_in| AnyObject::float_up(&T::type_(), d_in.to_f64()? / scale)),
    ))
}

/// Epsilon at `delta` of a mechanism satisfying `rho`-zCDP
fn zcdp_epsilon(rho: f64, delta: f64) -> f64 {
    if rho == 0.0 {
        return 0.0;
    }
    rho + 2.0 * (rho * (1.0 / delta).ln()).sqrt()
}

/// Add Gaussian noise of the given scale.
///
/// The map returns a privacy curve: sensitivity `d` under noise `σ` is
/// `ρ = d² / 2σ²` zCDP, which converts to `ε(δ) = ρ + 2 √(ρ ln(1/δ))`.
pub fn make_base_gaussian<T: Float>(scale: T) -> OpalResult<Measurement> {
    let scale = scale.to_f64();
    check_scale(scale)?;
    Ok(Measurement::new(
        Domain::all(T::type_()),
        Domain::all(T::type_()),
        Function::new(move |arg| {
            let value = T::from_object(arg)?.to_f64();
            Ok(T::from_f64(value + sample_gaussian(scale)?).into_object())
        }),
        Metric::L2Sensitivity(T::type_()),
        Measure::SmoothedMaxDivergence(T::type_()),
        PrivacyMap::new(move |d_in| {
            let ratio = d_in.to_f64()? / scale;
            let rho = ratio * ratio / 2.0;
            let carrier = T::type_();
            let rounding = carrier.clone();
            Ok(AnyObject::Curve(SmdCurve::new(carrier, move |delta| {
                Ok(AnyObject::float_up(&rounding, zcdp_epsilon(rho, delta))?.to_f64()?)
            })))
        }),
    ))
}

/// Add two-sided geometric noise to an integer. Pure DP with `ε = d_in / scale`.
pub fn make_base_geometric<T: Integer>(scale: f64) -> OpalResult<Measurement> {
    check_scale(scale)?;
    Ok(Measurement::new(
        Domain::all(T::type_()),
        Domain::all(T::type_()),
        Function::new(move |arg| {
            let value = T::from_object(arg)?.to_i128();
            let noise = sample_two_sided_geometric(scale)?;
            Ok(T::from_i128_saturating(value.saturating_add(noise)).into_object())
        }),
        Metric::AbsoluteDistance(T::type_()),
        Measure::MaxDivergence(Type::F64),
        PrivacyMap::new(move |d_in| Ok(AnyObject::F64(d_in.to_f64()? / scale))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_laplace() {
        let laplace = make_base_laplace::<f64>(0.5).unwrap();
        assert_eq!(laplace.map(&AnyObject::F64(1.0)).unwrap(), AnyObject::F64(2.0));
        assert!(laplace.check(&AnyObject::F64(0.5), &AnyObject::F64(1.0)).unwrap());
        let release = laplace.invoke(&AnyObject::F64(100.0)).unwrap();
        assert!(matches!(release, AnyObject::F64(_)));
        assert!(make_base_laplace::<f64>(0.0).is_err());
        assert!(make_base_laplace::<f32>(f32::NAN).is_err());
    }

    #[test]
    fn test_laplace_f32_rounds_up() {
        let laplace = make_base_laplace::<f32>(3.0).unwrap();
        let loss = laplace.map(&AnyObject::F32(1.0)).unwrap().to_f64().unwrap();
        assert!(loss >= 1.0 / 3.0);
    }

    #[test]
    fn test_gaussian_curve() {
        let gaussian = make_base_gaussian::<f64>(10.0).unwrap();
        let curve = gaussian.map(&AnyObject::F64(1.0)).unwrap();
        let curve = curve.as_curve().unwrap();
        let rho = 0.005_f64;
        let expected = rho + 2.0 * (rho * (1e6_f64).ln()).sqrt();
        assert!((curve.epsilon(1e-6).unwrap() - expected).abs() < 1e-12);
        assert!(curve.epsilon(1e-3).unwrap() < curve.epsilon(1e-6).unwrap());
        assert!(curve.epsilon(0.0).is_err());
    }

    #[test]
    fn test_geometric() {
        let geometric = make_base_geometric::<u32>(2.0).unwrap();
        assert_eq!(geometric.map(&AnyObject::U32(1)).unwrap(), AnyObject::F64(0.5));
        assert!(matches!(geometric.invoke(&AnyObject::U32(0)).unwrap(), AnyObject::U32(_)));
        assert!(make_base_geometric::<i64>(-1.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_laplace_check_matches_map(
            d_in in 0.0f64..10.0,
            d_out in 0.0f64..30.0,
            scale in 0.1f64..5.0,
        ) {
            let laplace = make_base_laplace::<f64>(scale).unwrap();
            let loss = laplace.map(&AnyObject::F64(d_in)).unwrap().to_f64().unwrap();
            let check = laplace.check(&AnyObject::F64(d_in), &AnyObject::F64(d_out)).unwrap();
            prop_assert_eq!(check, loss <= d_out);
        }

        #[test]
        fn prop_gaussian_curve_is_monotone(
            a in 0.0f64..5.0,
            b in 0.0f64..5.0,
            delta in 1e-9f64..0.5,
        ) {
            let gaussian = make_base_gaussian::<f64>(1.0).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let at = |d: f64| {
                let curve = gaussian.map(&AnyObject::F64(d)).unwrap();
                curve.as_curve().unwrap().epsilon(delta).unwrap()
            };
            prop_assert!(at(lo) <= at(hi));
        }
    }
}
