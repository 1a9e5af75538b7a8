//! Sequential composition
//!
//! `make_chain_tt(t1, t0)` runs `t0` first, matching function composition
//! order. The boundary between the two must agree exactly on domain and
//! metric, otherwise nothing is built.

use crate::core::{Function, PrivacyMap, StabilityMap};
use crate::{Domain, Measurement, Metric, OpalError, OpalResult, Transformation};

fn check_boundary(
    output_domain: &Domain,
    output_metric: &Metric,
    input_domain: &Domain,
    input_metric: &Metric,
) -> OpalResult<()> {
    if output_domain != input_domain {
        return Err(OpalError::DomainMismatch(format!(
            "output domain {} does not match input domain {}",
            output_domain, input_domain
        )));
    }
    if output_metric != input_metric {
        return Err(OpalError::DomainMismatch(format!(
            "output metric {} does not match input metric {}",
            output_metric, input_metric
        )));
    }
    Ok(())
}

/// Transformation followed by a transformation
pub fn make_chain_tt(
    transformation1: &Transformation,
    transformation0: &Transformation,
) -> OpalResult<Transformation> {
    check_boundary(
        &transformation0.output_domain,
        &transformation0.output_metric,
        &transformation1.input_domain,
        &transformation1.input_metric,
    )?;
    Ok(Transformation::new(
        transformation0.input_domain.clone(),
        transformation1.output_domain.clone(),
        Function::make_chain(&transformation1.function, &transformation0.function),
        transformation0.input_metric.clone(),
        transformation1.output_metric.clone(),
        StabilityMap::make_chain(&transformation1.stability_map, &transformation0.stability_map),
    ))
}

/// Transformation followed by a measurement
pub fn make_chain_mt(
    measurement1: &Measurement,
    transformation0: &Transformation,
) -> OpalResult<Measurement> {
    check_boundary(
        &transformation0.output_domain,
        &transformation0.output_metric,
        &measurement1.input_domain,
        &measurement1.input_metric,
    )?;
    Ok(Measurement::new(
        transformation0.input_domain.clone(),
        measurement1.output_domain.clone(),
        Function::make_chain(&measurement1.function, &transformation0.function),
        transformation0.input_metric.clone(),
        measurement1.output_measure.clone(),
        PrivacyMap::make_chain(&measurement1.privacy_map, &transformation0.stability_map),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meas::make_base_laplace;
    use crate::trans::{make_bounded_mean, make_clamp, make_identity};
    use crate::{AnyObject, Type};

    #[test]
    fn test_chain_tt_composes_maps() {
        let identity = make_identity::<f64>().unwrap();
        let clamp = make_clamp::<f64>(0.0, 1.0).unwrap();
        let chained = make_chain_tt(&clamp, &identity).unwrap();
        assert_eq!(chained.input_domain, identity.input_domain);
        assert_eq!(chained.output_domain, clamp.output_domain);
        assert_eq!(
            chained.invoke(&AnyObject::VecF64(vec![-1.0, 0.5, 2.0])).unwrap(),
            AnyObject::VecF64(vec![0.0, 0.5, 1.0])
        );
        assert_eq!(chained.map(&AnyObject::U32(3)).unwrap(), AnyObject::U32(3));
    }

    #[test]
    fn test_chain_mt_mean_laplace() {
        let mean = make_bounded_mean::<f64>(
            0.0,
            10.0,
            10,
            Metric::SymmetricDistance,
            Metric::L1Sensitivity(Type::F64),
        )
        .unwrap();
        let laplace = make_base_laplace::<f64>(0.5).unwrap();
        let chained = make_chain_mt(&laplace, &mean).unwrap();
        assert!(chained.check(&AnyObject::U32(1), &AnyObject::F64(1.0)).unwrap());
        assert!(!chained.check(&AnyObject::U32(1), &AnyObject::F64(0.999)).unwrap());
    }

    #[test]
    fn test_chain_rejects_mismatch() {
        let identity = make_identity::<f64>().unwrap();
        let laplace = make_base_laplace::<f64>(0.5).unwrap();
        match make_chain_mt(&laplace, &identity) {
            Err(OpalError::DomainMismatch(msg)) => {
                assert!(msg.contains("VectorDomain<AllDomain<f64>>"))
            }
            other => panic!("unexpected {:?}", other),
        }
        let ints = make_identity::<i32>().unwrap();
        assert!(matches!(make_chain_tt(&ints, &identity), Err(OpalError::DomainMismatch(_))));
    }
}
