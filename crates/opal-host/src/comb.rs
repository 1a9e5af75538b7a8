//! Combinators over measurements
//!
//! Every combinator consumes its input measurements on success; the result
//! adopts their handles, so releasing the result frees the inputs as well.
//! A failed combinator hands its inputs back inside [`Rejected`].

use opal_core::Type;
use opal_ffi::{RULE_ADDITIVE, RULE_ADVANCED};

use crate::catalog;
use crate::entity::Measurement;
use crate::marshal::Arg;
use crate::resolve::{standardize, Bindings, TypeHint};
use crate::{Consumed, HostError, HostResult, HostValue, Library, Rejected};

const SMOOTHED_MAX_DIVERGENCE: &str = "SmoothedMaxDivergence";

/// How the privacy losses of composed measurements are combined
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum CompositionPolicy {
    /// Sum the losses; curves split delta evenly
    #[default]
    Additive,
    /// Advanced composition over fixed-delta losses, never worse than
    /// additive
    Advanced { delta_prime: f64 },
}

impl CompositionPolicy {
    fn selector(self) -> (u64, f64) {
        match self {
            CompositionPolicy::Additive => (RULE_ADDITIVE, 0.0),
            CompositionPolicy::Advanced { delta_prime } => (RULE_ADVANCED, delta_prime),
        }
    }
}

fn expect_same(what: &str, first: &str, other: &str) -> HostResult<()> {
    if first != other {
        return Err(HostError::DomainMismatch(format!(
            "composed measurements disagree on {}: {} and {}",
            what, first, other
        )));
    }
    Ok(())
}

impl Library {
    /// Run every measurement on the same input, releasing the tuple of
    /// their outputs under the additive rule
    pub fn basic_composition(
        &self,
        measurements: Vec<Measurement>,
    ) -> Consumed<Measurement, Vec<Measurement>> {
        self.basic_composition_with(measurements, CompositionPolicy::default())
    }

    pub fn basic_composition_with(
        &self,
        measurements: Vec<Measurement>,
        policy: CompositionPolicy,
    ) -> Consumed<Measurement, Vec<Measurement>> {
        let built = expect_compatible(&measurements).and_then(|()| {
            let (rule, rule_param) = policy.selector();
            let args = vec![
                Arg::Handles(measurements.iter().map(Measurement::handle).collect()),
                Arg::Value(HostValue::Int(rule as i64)),
                Arg::Value(HostValue::Float(rule_param)),
            ];
            let handle = self
                .dispatcher()
                .call(&catalog::MAKE_BASIC_COMPOSITION, &Bindings::new(), args)?
                .into_handle()?;
            Measurement::new(handle, self.dispatcher().clone())
        });
        let (mut composed, measurements) = Rejected::guard(built, measurements)?;
        tracing::debug!(children = measurements.len(), ?policy, "composed measurements");
        composed.adopt(measurements.into_iter().map(Measurement::into_handle));
        Ok(composed)
    }

    /// Amplify a measurement on a sample of `population_size` records.
    ///
    /// `dia` names the record domain of the measurement's sized input, `mo`
    /// its output measure.
    pub fn population_amplification(
        &self,
        measurement: Measurement,
        population_size: u64,
        dia: impl Into<TypeHint>,
        mo: impl Into<TypeHint>,
    ) -> Consumed<Measurement, Measurement> {
        let (dia, mo) = (dia.into(), mo.into());
        let built = (|| -> HostResult<Measurement> {
            let size = i64::try_from(population_size).map_err(|_| {
                HostError::Marshal(format!(
                    "population_size {} overflows a host integer",
                    population_size
                ))
            })?;
            let mut bindings = Bindings::new();
            bindings.insert("DIA".into(), standardize(&dia)?);
            bindings.insert("MO".into(), standardize(&mo)?);

            let args = vec![
                Arg::Handle(measurement.handle()),
                Arg::Value(HostValue::Int(size)),
            ];
            let handle = self
                .dispatcher()
                .call(&catalog::MAKE_POPULATION_AMPLIFICATION, &bindings, args)?
                .into_handle()?;
            Measurement::new(handle, self.dispatcher().clone())
        })();
        let (mut amplified, measurement) = Rejected::guard(built, measurement)?;
        amplified.adopt([measurement.into_handle()]);
        Ok(amplified)
    }

    /// Fix the delta of a curve-valued measurement, yielding `(epsilon, delta)` losses
    pub fn fix_delta(
        &self,
        measurement: Measurement,
        delta: f64,
    ) -> Consumed<Measurement, Measurement> {
        let built = (|| -> HostResult<Measurement> {
            let (measure, carrier) = curve_measure(&measurement)?;
            let mut bindings = Bindings::new();
            bindings.insert("MO".into(), measure);
            bindings.insert("T".into(), carrier);
            let args = vec![
                Arg::Handle(measurement.handle()),
                Arg::Value(HostValue::Float(delta)),
            ];
            let handle = self
                .dispatcher()
                .call(&catalog::MAKE_FIX_DELTA, &bindings, args)?
                .into_handle()?;
            Measurement::new(handle, self.dispatcher().clone())
        })();
        let (mut fixed, measurement) = Rejected::guard(built, measurement)?;
        fixed.adopt([measurement.into_handle()]);
        Ok(fixed)
    }
}

fn expect_compatible(measurements: &[Measurement]) -> HostResult<()> {
    if let Some((first, rest)) = measurements.split_first() {
        for other in rest {
            expect_same("input domain", first.input_domain(), other.input_domain())?;
            expect_same("input metric", first.input_metric(), other.input_metric())?;
            expect_same("output measure", first.output_measure(), other.output_measure())?;
        }
    }
    Ok(())
}

/// Curve measure of `measurement` and its carrier
fn curve_measure(measurement: &Measurement) -> HostResult<(Type, Type)> {
    if !measurement.output_measure().starts_with(SMOOTHED_MAX_DIVERGENCE) {
        return Err(HostError::UnsupportedType(format!(
            "fix_delta requires a {} measure, got {}",
            SMOOTHED_MAX_DIVERGENCE,
            measurement.output_measure()
        )));
    }
    let measure = Type::parse(measurement.output_measure())
        .map_err(|e| HostError::UnsupportedType(e.to_string()))?;
    match measure.as_generic() {
        Some((_, [carrier])) => {
            let carrier = carrier.clone();
            Ok((measure, carrier))
        }
        _ => Err(HostError::UnsupportedType(format!("{} has no carrier type", measure))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Features, Hints};

    fn library() -> Library {
        Library::new(Features::all())
    }

    #[test]
    fn test_composition_sums_losses() {
        let lib = library();
        let hints = Hints::new();
        let parts = vec![
            lib.make_base_laplace(1.0, &hints).unwrap(),
            lib.make_base_laplace(2.0, &hints).unwrap(),
        ];
        let composed = lib.basic_composition(parts).unwrap();
        assert_eq!(composed.map(1.0).unwrap(), HostValue::Float(1.5));
        assert_eq!(composed.handle().children().len(), 2);

        match composed.invoke(0.0).unwrap() {
            HostValue::Tuple(items) => assert_eq!(items.len(), 2),
            other => panic!("expected a tuple, got {}", other),
        }
    }

    #[test]
    fn test_composition_requires_shared_input() {
        let lib = library();
        let hints = Hints::new();
        let parts = vec![
            lib.make_base_laplace(1.0, &hints).unwrap(),
            lib.make_base_laplace(1.0, &Hints::new().with("T", "f32")).unwrap(),
        ];
        let before = opal_ffi::alloc::live_allocations();
        let rejected = lib.basic_composition(parts).unwrap_err();
        assert!(matches!(rejected.error, HostError::DomainMismatch(_)));
        assert_eq!(opal_ffi::alloc::live_allocations(), before);

        let parts = rejected.into_inputs();
        assert_eq!(parts.len(), 2);
        assert!(parts[1].check(1.0, 1.0).unwrap());
    }

    #[test]
    fn test_empty_composition_is_rejected() {
        let rejected = library().basic_composition(vec![]).unwrap_err();
        assert!(matches!(rejected.error, HostError::Native { .. }));
        assert!(rejected.inputs.is_empty());
    }

    #[test]
    fn test_advanced_policy() {
        let lib = library();
        let hints = Hints::new();
        let parts = (0..10)
            .map(|_| {
                let gaussian = lib.make_base_gaussian(20.0, &hints).unwrap();
                lib.fix_delta(gaussian, 1e-7).unwrap()
            })
            .collect::<Vec<_>>();
        let composed = lib
            .basic_composition_with(parts, CompositionPolicy::Advanced { delta_prime: 1e-6 })
            .unwrap();
        match composed.map(1.0).unwrap() {
            HostValue::Tuple(items) => assert_eq!(items.len(), 2),
            other => panic!("expected (epsilon, delta), got {}", other),
        }
    }

    #[test]
    fn test_fix_delta_requires_curve() {
        let lib = library();
        let laplace = lib.make_base_laplace(1.0, &Hints::new()).unwrap();
        let rejected = lib.fix_delta(laplace, 1e-6).unwrap_err();
        assert!(matches!(rejected.error, HostError::UnsupportedType(_)));
        assert_eq!(rejected.inputs.map(1.0).unwrap(), HostValue::Float(1.0));
    }

    #[test]
    fn test_amplification_descriptors_must_match() {
        let lib = library();
        let mean = lib.make_bounded_mean(0.0, 10.0, 10, &Hints::new()).unwrap();
        let laplace = lib.make_base_laplace(0.5, &Hints::new()).unwrap();
        let measurement = lib.chain_mt(mean, laplace).unwrap();
        let (dia, mo) = ("IntervalDomain<f32>", "MaxDivergence<f64>");
        let rejected = lib.population_amplification(measurement, 100, dia, mo).unwrap_err();
        assert!(matches!(rejected.error, HostError::Dispatch(_) | HostError::DomainMismatch(_)));
        assert!(rejected.inputs.check(1, 1.0).unwrap());
    }

    #[test]
    fn test_population_size_overflow() {
        let lib = library();
        let mean = lib.make_bounded_mean(0.0, 10.0, 10, &Hints::new()).unwrap();
        let laplace = lib.make_base_laplace(0.5, &Hints::new()).unwrap();
        let measurement = lib.chain_mt(mean, laplace).unwrap();
        let (dia, mo) = ("IntervalDomain<f64>", "MaxDivergence<f64>");
        let rejected = lib
            .population_amplification(measurement, u64::MAX, dia, mo)
            .unwrap_err();
        assert!(matches!(
            rejected.error,
            HostError::Marshal(ref m) if m.contains("population_size")
        ));
        assert_eq!(rejected.inputs.handle().allocation_count(), 3);
    }
}
