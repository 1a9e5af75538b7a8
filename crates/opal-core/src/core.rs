//! Core entities: functions, maps, transformations and measurements
//!
//! Every entity is type-erased over [`AnyObject`]. Kernels are generic and
//! monomorphized per carrier; once built, their closures only see erased
//! values and check the concrete types at the boundary.

use std::fmt;
use std::sync::Arc;

use crate::dist::{distance_le, validate_distance};
use crate::{AnyObject, Domain, Measure, Metric, OpalError, OpalResult};

type Erased = Arc<dyn Fn(&AnyObject) -> OpalResult<AnyObject> + Send + Sync>;

/// A function from an input domain to an output domain
#[derive(Clone)]
pub struct Function {
    function: Erased,
}

impl Function {
    pub fn new(
        function: impl Fn(&AnyObject) -> OpalResult<AnyObject> + Send + Sync + 'static,
    ) -> Self {
        Function {
            function: Arc::new(function),
        }
    }

    pub fn eval(&self, arg: &AnyObject) -> OpalResult<AnyObject> {
        (self.function)(arg)
    }

    /// `function1(function0(x))`
    pub fn make_chain(function1: &Function, function0: &Function) -> Function {
        let function0 = function0.function.clone();
        let function1 = function1.function.clone();
        Function::new(move |arg| function1(&function0(arg)?))
    }
}

/// Maps an input distance bound to an output distance bound
#[derive(Clone)]
pub struct StabilityMap {
    map: Erased,
}

impl StabilityMap {
    pub fn new(map: impl Fn(&AnyObject) -> OpalResult<AnyObject> + Send + Sync + 'static) -> Self {
        StabilityMap { map: Arc::new(map) }
    }

    pub fn eval(&self, d_in: &AnyObject) -> OpalResult<AnyObject> {
        validate_distance(d_in)?;
        (self.map)(d_in)
    }

    pub fn make_chain(map1: &StabilityMap, map0: &StabilityMap) -> StabilityMap {
        let map0 = map0.clone();
        let map1 = map1.clone();
        StabilityMap::new(move |d_in| map1.eval(&map0.eval(d_in)?))
    }
}

/// Maps an input distance bound to a privacy-loss bound
#[derive(Clone)]
pub struct PrivacyMap {
    map: Erased,
}

impl PrivacyMap {
    pub fn new(map: impl Fn(&AnyObject) -> OpalResult<AnyObject> + Send + Sync + 'static) -> Self {
        PrivacyMap { map: Arc::new(map) }
    }

    pub fn eval(&self, d_in: &AnyObject) -> OpalResult<AnyObject> {
        validate_distance(d_in)?;
        (self.map)(d_in)
    }

    /// Privacy map of a measurement applied after a transformation
    pub fn make_chain(map1: &PrivacyMap, map0: &StabilityMap) -> PrivacyMap {
        let map0 = map0.clone();
        let map1 = map1.clone();
        PrivacyMap::new(move |d_in| map1.eval(&map0.eval(d_in)?))
    }
}

fn check_distance_type(metric: &Metric, d_in: &AnyObject) -> OpalResult<()> {
    let expected = metric.distance_type();
    if d_in.type_() != expected {
        return Err(OpalError::FailedCast(format!(
            "{} distances are {}, got {}",
            metric,
            expected,
            d_in.type_()
        )));
    }
    Ok(())
}

fn check_member(domain: &Domain, arg: &AnyObject) -> OpalResult<()> {
    if !domain.member(arg)? {
        return Err(OpalError::FailedFunction(format!(
            "input {} is not a member of {}",
            arg.type_(),
            domain
        )));
    }
    Ok(())
}

/// A deterministic data transformation with a stability guarantee
#[derive(Clone)]
pub struct Transformation {
    pub input_domain: Domain,
    pub output_domain: Domain,
    pub function: Function,
    pub input_metric: Metric,
    pub output_metric: Metric,
    pub stability_map: StabilityMap,
}

impl Transformation {
    pub fn new(
        input_domain: Domain,
        output_domain: Domain,
        function: Function,
        input_metric: Metric,
        output_metric: Metric,
        stability_map: StabilityMap,
    ) -> Self {
        Transformation {
            input_domain,
            output_domain,
            function,
            input_metric,
            output_metric,
            stability_map,
        }
    }

    pub fn invoke(&self, arg: &AnyObject) -> OpalResult<AnyObject> {
        check_member(&self.input_domain, arg)?;
        self.function.eval(arg)
    }

    pub fn map(&self, d_in: &AnyObject) -> OpalResult<AnyObject> {
        check_distance_type(&self.input_metric, d_in)?;
        self.stability_map.eval(d_in)
    }

    /// `map(d_in) <= d_out`
    pub fn check(&self, d_in: &AnyObject, d_out: &AnyObject) -> OpalResult<bool> {
        distance_le(&self.map(d_in)?, d_out)
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("input_domain", &self.input_domain.to_string())
            .field("output_domain", &self.output_domain.to_string())
            .field("input_metric", &self.input_metric)
            .field("output_metric", &self.output_metric)
            .finish()
    }
}

/// A randomized mechanism with a privacy guarantee.
///
/// Repeated invocations on the same input draw fresh randomness.
#[derive(Clone)]
pub struct Measurement {
    pub input_domain: Domain,
    pub output_domain: Domain,
    pub function: Function,
    pub input_metric: Metric,
    pub output_measure: Measure,
    pub privacy_map: PrivacyMap,
}

impl Measurement {
    pub fn new(
        input_domain: Domain,
        output_domain: Domain,
        function: Function,
        input_metric: Metric,
        output_measure: Measure,
        privacy_map: PrivacyMap,
    ) -> Self {
        Measurement {
            input_domain,
            output_domain,
            function,
            input_metric,
            output_measure,
            privacy_map,
        }
    }

    pub fn invoke(&self, arg: &AnyObject) -> OpalResult<AnyObject> {
        check_member(&self.input_domain, arg)?;
        self.function.eval(arg)
    }

    pub fn map(&self, d_in: &AnyObject) -> OpalResult<AnyObject> {
        check_distance_type(&self.input_metric, d_in)?;
        self.privacy_map.eval(d_in)
    }

    /// `map(d_in) <= d_out`
    pub fn check(&self, d_in: &AnyObject, d_out: &AnyObject) -> OpalResult<bool> {
        distance_le(&self.map(d_in)?, d_out)
    }
}

impl fmt::Debug for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measurement")
            .field("input_domain", &self.input_domain.to_string())
            .field("output_domain", &self.output_domain.to_string())
            .field("input_metric", &self.input_metric)
            .field("output_measure", &self.output_measure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Type;

    fn doubler() -> Transformation {
        Transformation::new(
            Domain::all(Type::F64),
            Domain::all(Type::F64),
            Function::new(|arg| Ok(AnyObject::F64(arg.to_f64()? * 2.0))),
            Metric::AbsoluteDistance(Type::F64),
            Metric::AbsoluteDistance(Type::F64),
            StabilityMap::new(|d_in| Ok(AnyObject::F64(d_in.to_f64()? * 2.0))),
        )
    }

    #[test]
    fn test_invoke_checks_membership() {
        let t = doubler();
        assert_eq!(t.invoke(&AnyObject::F64(1.5)).unwrap(), AnyObject::F64(3.0));
        match t.invoke(&AnyObject::I32(1)) {
            Err(OpalError::FailedFunction(msg)) => assert!(msg.contains("AllDomain<f64>")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_map_and_check() {
        let t = doubler();
        assert_eq!(t.map(&AnyObject::F64(1.0)).unwrap(), AnyObject::F64(2.0));
        assert!(t.check(&AnyObject::F64(1.0), &AnyObject::F64(2.0)).unwrap());
        assert!(!t.check(&AnyObject::F64(1.0), &AnyObject::F64(1.9)).unwrap());
    }

    #[test]
    fn test_map_rejects_bad_distances() {
        let t = doubler();
        assert!(matches!(t.map(&AnyObject::F64(-1.0)), Err(OpalError::FailedMap(_))));
        assert!(matches!(t.map(&AnyObject::U32(1)), Err(OpalError::FailedCast(_))));
    }

    #[test]
    fn test_function_chain() {
        let t = doubler();
        let f = Function::make_chain(&t.function, &t.function);
        assert_eq!(f.eval(&AnyObject::F64(1.0)).unwrap(), AnyObject::F64(4.0));
    }
}
