//! Combinators that build new measurements out of existing ones

use std::fmt;
use std::sync::Arc;

use crate::core::{Function, PrivacyMap};
use crate::dist::SmdCurve;
use crate::{AnyObject, Domain, Measure, Measurement, Metric, OpalError, OpalResult};

/// Rule combining the privacy losses of composed measurements.
///
/// `compose` receives every child's loss at the same input distance and
/// must be monotone in each of them. It never sees data.
pub trait CompositionRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fails when the rule has no theorem for `measure`
    fn supports(&self, measure: &Measure) -> OpalResult<()>;

    fn compose(&self, measure: &Measure, losses: &[AnyObject]) -> OpalResult<AnyObject>;
}

/// Sequential composition by summation
#[derive(Debug, Clone, Copy, Default)]
pub struct Additive;

impl CompositionRule for Additive {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn supports(&self, _measure: &Measure) -> OpalResult<()> {
        Ok(())
    }

    fn compose(&self, measure: &Measure, losses: &[AnyObject]) -> OpalResult<AnyObject> {
        let carrier = measure.carrier();
        match measure {
            Measure::MaxDivergence(_) => {
                let total = sum(losses.iter().map(AnyObject::to_f64))?;
                AnyObject::float_up(carrier, total)
            }
            Measure::FixedSmoothedMaxDivergence(_) => {
                let (epsilons, deltas) = split_pairs(losses)?;
                Ok(AnyObject::Tuple(vec![
                    AnyObject::float_up(carrier, epsilons.iter().sum())?,
                    AnyObject::float_up(carrier, deltas.iter().sum())?,
                ]))
            }
            Measure::SmoothedMaxDivergence(_) => {
                let curves = losses
                    .iter()
                    .map(|loss| loss.as_curve().cloned())
                    .collect::<OpalResult<Vec<SmdCurve>>>()?;
                let parts = curves.len() as f64;
                Ok(AnyObject::Curve(SmdCurve::new(carrier.clone(), move |delta| {
                    sum(curves.iter().map(|curve| curve.epsilon(delta / parts)))
                })))
            }
        }
    }
}

/// Heterogeneous advanced composition over `(ε, δ)` pairs, capped by the
/// additive bound. Spends an extra `delta_prime` of failure probability.
#[derive(Debug, Clone, Copy)]
pub struct Advanced {
    delta_prime: f64,
}

impl Advanced {
    pub fn new(delta_prime: f64) -> OpalResult<Self> {
        if !(delta_prime > 0.0 && delta_prime < 1.0) {
            return Err(OpalError::MakeMeasurement(format!(
                "delta_prime must be in (0, 1), got {}",
                delta_prime
            )));
        }
        Ok(Advanced { delta_prime })
    }
}

impl CompositionRule for Advanced {
    fn name(&self) -> &'static str {
        "advanced"
    }

    fn supports(&self, measure: &Measure) -> OpalResult<()> {
        match measure {
            Measure::FixedSmoothedMaxDivergence(_) => Ok(()),
            other => Err(OpalError::MakeMeasurement(format!(
                "advanced composition requires FixedSmoothedMaxDivergence, got {}",
                other
            ))),
        }
    }

    fn compose(&self, measure: &Measure, losses: &[AnyObject]) -> OpalResult<AnyObject> {
        self.supports(measure)?;
        let (epsilons, deltas) = split_pairs(losses)?;

        let additive: f64 = epsilons.iter().sum();
        let squares: f64 = epsilons.iter().map(|e| e * e).sum();
        let drift: f64 = epsilons.iter().map(|e| e * e.exp_m1()).sum();
        let advanced = (2.0 * (1.0 / self.delta_prime).ln() * squares).sqrt() + drift;

        let carrier = measure.carrier();
        Ok(AnyObject::Tuple(vec![
            AnyObject::float_up(carrier, additive.min(advanced))?,
            AnyObject::float_up(carrier, deltas.iter().sum::<f64>() + self.delta_prime)?,
        ]))
    }
}

fn sum(values: impl Iterator<Item = OpalResult<f64>>) -> OpalResult<f64> {
    values.sum()
}

fn split_pairs(losses: &[AnyObject]) -> OpalResult<(Vec<f64>, Vec<f64>)> {
    let mut epsilons = Vec::with_capacity(losses.len());
    let mut deltas = Vec::with_capacity(losses.len());
    for loss in losses {
        match loss.as_tuple()? {
            [epsilon, delta] => {
                epsilons.push(epsilon.to_f64()?);
                deltas.push(delta.to_f64()?);
            }
            other => {
                return Err(OpalError::FailedMap(format!(
                    "expected an (epsilon, delta) pair, got {} components",
                    other.len()
                )))
            }
        }
    }
    Ok((epsilons, deltas))
}

/// Run every measurement on the same input and release all outputs.
///
/// The measurements must share input domain, input metric and output
/// measure. Outputs are returned as a tuple in the given order.
pub fn make_basic_composition(
    measurements: &[Measurement],
    rule: Arc<dyn CompositionRule>,
) -> OpalResult<Measurement> {
    let first = measurements.first().ok_or_else(|| {
        OpalError::MakeMeasurement("basic composition requires at least one measurement".into())
    })?;

    for (index, other) in measurements.iter().enumerate().skip(1) {
        if other.input_domain != first.input_domain {
            return Err(OpalError::DomainMismatch(format!(
                "measurement {} has input domain {}, expected {}",
                index, other.input_domain, first.input_domain
            )));
        }
        if other.input_metric != first.input_metric {
            return Err(OpalError::DomainMismatch(format!(
                "measurement {} has input metric {}, expected {}",
                index, other.input_metric, first.input_metric
            )));
        }
        if other.output_measure != first.output_measure {
            return Err(OpalError::DomainMismatch(format!(
                "measurement {} has output measure {}, expected {}",
                index, other.output_measure, first.output_measure
            )));
        }
    }
    rule.supports(&first.output_measure)?;
    tracing::debug!(
        children = measurements.len(),
        rule = rule.name(),
        "building basic composition"
    );

    let functions: Vec<Function> = measurements.iter().map(|m| m.function.clone()).collect();
    let maps: Vec<PrivacyMap> = measurements.iter().map(|m| m.privacy_map.clone()).collect();
    let measure = first.output_measure.clone();

    Ok(Measurement::new(
        first.input_domain.clone(),
        Domain::Product(measurements.iter().map(|m| m.output_domain.clone()).collect()),
        Function::new(move |arg| {
            functions
                .iter()
                .map(|f| f.eval(arg))
                .collect::<OpalResult<Vec<_>>>()
                .map(AnyObject::Tuple)
        }),
        first.input_metric.clone(),
        first.output_measure.clone(),
        PrivacyMap::new(move |d_in| {
            let losses = maps
                .iter()
                .map(|map| map.eval(d_in))
                .collect::<OpalResult<Vec<_>>>()?;
            rule.compose(&measure, &losses)
        }),
    ))
}

/// Amplify the privacy of a measurement over a sample of `n` records drawn
/// without replacement from a population of `population_size`.
///
/// With `k` records changed and `ε₁` the loss for one changed record, the
/// amplified loss is `k · ln(1 + (n / N)(e^ε₁ − 1))`. The result never
/// exceeds the unamplified loss.
pub fn make_population_amplification(
    measurement: &Measurement,
    population_size: usize,
) -> OpalResult<Measurement> {
    let (_, sample_size) = measurement.input_domain.sized_records().ok_or_else(|| {
        OpalError::MakeMeasurement(format!(
            "amplification requires a sized dataset input, got {}",
            measurement.input_domain
        ))
    })?;
    if sample_size == 0 || sample_size > population_size {
        return Err(OpalError::MakeMeasurement(format!(
            "sample size {} must be between 1 and the population size {}",
            sample_size, population_size
        )));
    }
    let carrier = match &measurement.output_measure {
        Measure::MaxDivergence(carrier) => carrier.clone(),
        other => {
            return Err(OpalError::MakeMeasurement(format!(
                "amplification is only implemented for MaxDivergence, got {}",
                other
            )))
        }
    };
    // distance between neighbors differing in exactly one record
    let unit = match measurement.input_metric {
        Metric::SymmetricDistance => 2,
        Metric::HammingDistance => 1,
        ref other => {
            return Err(OpalError::MakeMeasurement(format!(
                "amplification requires a dataset metric, got {}",
                other
            )))
        }
    };

    let ratio = sample_size as f64 / population_size as f64;
    tracing::debug!(sample_size, population_size, "building population amplification");
    let inner = measurement.privacy_map.clone();

    Ok(Measurement::new(
        measurement.input_domain.clone(),
        measurement.output_domain.clone(),
        measurement.function.clone(),
        measurement.input_metric.clone(),
        measurement.output_measure.clone(),
        PrivacyMap::new(move |d_in| {
            let records = d_in.as_u32()?.div_ceil(unit);
            let epsilon_one = inner.eval(&AnyObject::U32(unit))?.to_f64()?;
            let amplified = records as f64 * (ratio * epsilon_one.exp_m1()).ln_1p();
            let unamplified = inner.eval(d_in)?.to_f64()?;
            AnyObject::float_up(&carrier, amplified.min(unamplified))
        }),
    ))
}

/// Fix the delta of a curve-valued measurement, producing `(ε(δ), δ)`
pub fn make_fix_delta(measurement: &Measurement, delta: f64) -> OpalResult<Measurement> {
    let carrier = match &measurement.output_measure {
        Measure::SmoothedMaxDivergence(carrier) => carrier.clone(),
        other => {
            return Err(OpalError::MakeMeasurement(format!(
                "{} does not expose a privacy curve",
                other
            )))
        }
    };
    if !(delta > 0.0 && delta < 1.0) {
        return Err(OpalError::MakeMeasurement(format!(
            "delta must be in (0, 1), got {}",
            delta
        )));
    }

    let inner = measurement.privacy_map.clone();
    Ok(Measurement::new(
        measurement.input_domain.clone(),
        measurement.output_domain.clone(),
        measurement.function.clone(),
        measurement.input_metric.clone(),
        Measure::FixedSmoothedMaxDivergence(carrier.clone()),
        PrivacyMap::new(move |d_in| {
            let epsilon = inner.eval(d_in)?.as_curve()?.epsilon(delta)?;
            Ok(AnyObject::Tuple(vec![
                AnyObject::float_up(&carrier, epsilon)?,
                AnyObject::float_up(&carrier, delta)?,
            ]))
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::make_chain_mt;
    use crate::meas::{make_base_gaussian, make_base_geometric, make_base_laplace};
    use crate::trans::{make_bounded_mean, make_count};
    use crate::Type;
    use proptest::prelude::*;

    fn mean_laplace(scale: f64) -> Measurement {
        let mean = make_bounded_mean::<f64>(
            0.0,
            10.0,
            10,
            Metric::SymmetricDistance,
            Metric::L1Sensitivity(Type::F64),
        )
        .unwrap();
        make_chain_mt(&make_base_laplace::<f64>(scale).unwrap(), &mean).unwrap()
    }

    fn count_geometric(scale: f64) -> Measurement {
        let count = make_count::<i32>().unwrap();
        make_chain_mt(&make_base_geometric::<u32>(scale).unwrap(), &count).unwrap()
    }

    fn f64_of(obj: AnyObject) -> f64 {
        obj.to_f64().unwrap()
    }

    #[test]
    fn test_basic_composition_sums_losses() {
        let composed = make_basic_composition(
            &[count_geometric(2.0), count_geometric(200.0)],
            Arc::new(Additive),
        )
        .unwrap();
        let loss = f64_of(composed.map(&AnyObject::U32(1)).unwrap());
        assert!((loss - 0.505).abs() < 1e-12);

        let release = composed.invoke(&AnyObject::VecI32(vec![1, 2, 3])).unwrap();
        assert_eq!(release.as_tuple().unwrap().len(), 2);
        assert_eq!(
            composed.output_domain.to_string(),
            "ProductDomain<AllDomain<u32>, AllDomain<u32>>"
        );
    }

    #[test]
    fn test_basic_composition_rejects_empty_and_mismatched() {
        assert!(matches!(
            make_basic_composition(&[], Arc::new(Additive)),
            Err(OpalError::MakeMeasurement(_))
        ));
        assert!(matches!(
            make_basic_composition(&[count_geometric(2.0), mean_laplace(1.0)], Arc::new(Additive)),
            Err(OpalError::DomainMismatch(_))
        ));
    }

    #[test]
    fn test_composition_of_curves() {
        let gaussian = make_base_gaussian::<f64>(10.0).unwrap();
        let parts = [gaussian.clone(), gaussian.clone()];
        let composed = make_basic_composition(&parts, Arc::new(Additive)).unwrap();
        let curve = composed.map(&AnyObject::F64(1.0)).unwrap();
        let single = gaussian.map(&AnyObject::F64(1.0)).unwrap();
        let expected = 2.0 * single.as_curve().unwrap().epsilon(5e-7).unwrap();
        let actual = curve.as_curve().unwrap().epsilon(1e-6).unwrap();
        assert!((actual - expected).abs() < 1e-12);
    }

    #[test]
    fn test_advanced_composition_caps_at_additive() {
        let rule = Advanced::new(1e-6).unwrap();
        let measure = Measure::FixedSmoothedMaxDivergence(Type::F64);
        let pair = |e: f64, d: f64| AnyObject::Tuple(vec![AnyObject::F64(e), AnyObject::F64(d)]);

        let few = rule.compose(&measure, &[pair(1.0, 1e-7), pair(1.0, 1e-7)]).unwrap();
        let few = few.as_tuple().unwrap();
        assert_eq!(f64_of(few[0].clone()), 2.0);
        assert!((f64_of(few[1].clone()) - 1.2e-6).abs() < 1e-15);

        let many: Vec<AnyObject> = (0..1000).map(|_| pair(0.01, 0.0)).collect();
        let many = rule.compose(&measure, &many).unwrap();
        assert!(f64_of(many.as_tuple().unwrap()[0].clone()) < 10.0);

        assert!(rule.supports(&Measure::MaxDivergence(Type::F64)).is_err());
        assert!(Advanced::new(0.0).is_err());
    }

    #[test]
    fn test_population_amplification() {
        let amplified = make_population_amplification(&mean_laplace(0.5), 100).unwrap();
        let loss = f64_of(amplified.map(&AnyObject::U32(1)).unwrap());
        let expected = (0.1 * 2.0_f64.exp_m1()).ln_1p();
        assert!((loss - expected).abs() < 1e-12);
        assert!(amplified.check(&AnyObject::U32(1), &AnyObject::F64(1.494)).unwrap());
        assert!(!amplified.check(&AnyObject::U32(1), &AnyObject::F64(0.494)).unwrap());
        assert_eq!(f64_of(amplified.map(&AnyObject::U32(0)).unwrap()), 0.0);
    }

    #[test]
    fn test_population_amplification_requirements() {
        assert!(make_population_amplification(&mean_laplace(0.5), 9).is_err());
        assert!(make_population_amplification(&count_geometric(2.0), 100).is_err());
        let gaussian = make_base_gaussian::<f64>(1.0).unwrap();
        assert!(make_population_amplification(&gaussian, 100).is_err());
    }

    #[test]
    fn test_fix_delta() {
        let gaussian = make_base_gaussian::<f64>(10.0).unwrap();
        let fixed = make_fix_delta(&gaussian, 1e-6).unwrap();
        assert_eq!(fixed.output_measure, Measure::FixedSmoothedMaxDivergence(Type::F64));

        let pair = fixed.map(&AnyObject::F64(1.0)).unwrap();
        let pair = pair.as_tuple().unwrap();
        let curve = gaussian.map(&AnyObject::F64(1.0)).unwrap();
        assert_eq!(
            f64_of(pair[0].clone()),
            curve.as_curve().unwrap().epsilon(1e-6).unwrap()
        );
        assert_eq!(f64_of(pair[1].clone()), 1e-6);

        assert!(make_fix_delta(&mean_laplace(1.0), 1e-6).is_err());
        assert!(make_fix_delta(&gaussian, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_amplification_is_monotone(
            a in 0u32..50,
            b in 0u32..50,
            population in 10usize..1000,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let amplified = make_population_amplification(&mean_laplace(0.5), population).unwrap();
            let lo = f64_of(amplified.map(&AnyObject::U32(lo)).unwrap());
            let hi = f64_of(amplified.map(&AnyObject::U32(hi)).unwrap());
            prop_assert!(lo <= hi);
        }

        #[test]
        fn prop_advanced_is_monotone(e1 in 0.0f64..2.0, e2 in 0.0f64..2.0, bump in 0.0f64..1.0) {
            let rule = Advanced::new(1e-6).unwrap();
            let measure = Measure::FixedSmoothedMaxDivergence(Type::F64);
            let pair = |e: f64| AnyObject::Tuple(vec![AnyObject::F64(e), AnyObject::F64(0.0)]);
            let base = rule.compose(&measure, &[pair(e1), pair(e2)]).unwrap();
            let raised = rule.compose(&measure, &[pair(e1 + bump), pair(e2)]).unwrap();
            prop_assert!(crate::dist::distance_le(&base, &raised).unwrap());
        }
    }
}
