//! Transformations, measurements and the chain operator
//!
//! An entity wraps one native handle together with the descriptors of its
//! domains, metrics and distance types. Descriptors are read once at
//! construction; they decide how `invoke`, `map` and `check` marshal their
//! arguments.

use std::sync::Arc;

use opal_core::{Metric, Type};
use opal_ffi::EntityField;
use parking_lot::Mutex;

use crate::catalog::{self, Signature};
use crate::dispatch::Dispatcher;
use crate::handle::{Handle, HandleKind};
use crate::marshal::Arg;
use crate::resolve::Bindings;
use crate::{Consumed, HostError, HostResult, HostValue, Library, Rejected};

const SMOOTHED_MAX_DIVERGENCE: &str = "SmoothedMaxDivergence";

/// Descriptors of an entity, as reported by the native side
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub input_domain: String,
    pub output_domain: String,
    pub input_metric: String,
    /// Output metric of a transformation, output measure of a measurement
    pub output_distance: String,
    pub input_carrier: Type,
    pub input_distance: Type,
    pub output_bound: Type,
}

fn parse(text: &str) -> HostResult<Type> {
    Type::parse(text).map_err(|e| HostError::UnsupportedType(format!("{}: {}", text, e)))
}

/// Handle plus what is known about it; shared by both entity kinds
#[derive(Debug)]
struct Bound {
    handle: Handle,
    descriptors: Descriptors,
    dispatcher: Arc<Dispatcher>,
    /// Input distances count records or are unsigned
    nonnegative_input: bool,
    invoke: &'static Signature,
    map: &'static Signature,
    check: &'static Signature,
}

impl Bound {
    fn new(handle: Handle, dispatcher: Arc<Dispatcher>) -> HostResult<Self> {
        let (invoke, map, check, describe) = match handle.kind() {
            HandleKind::Transformation => (
                &catalog::TRANSFORMATION_INVOKE,
                &catalog::TRANSFORMATION_MAP,
                &catalog::TRANSFORMATION_CHECK,
                &catalog::TRANSFORMATION_DESCRIBE,
            ),
            HandleKind::Measurement => (
                &catalog::MEASUREMENT_INVOKE,
                &catalog::MEASUREMENT_MAP,
                &catalog::MEASUREMENT_CHECK,
                &catalog::MEASUREMENT_DESCRIBE,
            ),
            other => {
                return Err(HostError::Dispatch(format!(
                    "{:?} handles do not back an entity",
                    other
                )))
            }
        };

        let field = |field: EntityField| -> HostResult<String> {
            let args = vec![Arg::Handle(&handle), Arg::Value(HostValue::Int(field as i64))];
            match dispatcher.call(describe, &Bindings::new(), args)?.into_value()? {
                HostValue::Str(text) => Ok(text),
                other => Err(HostError::Marshal(format!(
                    "expected a descriptor, got {}",
                    other
                ))),
            }
        };
        let descriptors = Descriptors {
            input_domain: field(EntityField::InputDomain)?,
            output_domain: field(EntityField::OutputDomain)?,
            input_metric: field(EntityField::InputMetric)?,
            output_distance: field(EntityField::OutputDistance)?,
            input_carrier: parse(&field(EntityField::InputCarrier)?)?,
            input_distance: parse(&field(EntityField::InputDistanceType)?)?,
            output_bound: parse(&field(EntityField::OutputBoundType)?)?,
        };
        let dataset_metric = Metric::from_type(&parse(&descriptors.input_metric)?)
            .map_or(false, |metric| metric.is_dataset_metric());
        let nonnegative_input =
            dataset_metric || matches!(descriptors.input_distance, Type::U32 | Type::U64);
        tracing::debug!(
            kind = ?handle.kind(),
            input_domain = %descriptors.input_domain,
            output = %descriptors.output_distance,
            "entity constructed"
        );

        Ok(Bound {
            handle,
            descriptors,
            dispatcher,
            nonnegative_input,
            invoke,
            map,
            check,
        })
    }

    /// Reject input distances outside the support of the map before they
    /// reach the marshaller
    fn expect_distance(&self, d_in: &HostValue) -> HostResult<()> {
        if !self.nonnegative_input {
            return Ok(());
        }
        let negative = match d_in {
            HostValue::Int(d) => *d < 0,
            HostValue::Float(d) => *d < 0.0,
            _ => false,
        };
        if negative {
            return Err(HostError::Domain(format!(
                "{} distances are non-negative, got {}",
                self.descriptors.input_metric, d_in
            )));
        }
        Ok(())
    }

    fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("TI".into(), self.descriptors.input_carrier.clone());
        bindings.insert("QI".into(), self.descriptors.input_distance.clone());
        bindings.insert("QO".into(), self.descriptors.output_bound.clone());
        bindings
    }

    fn invoke(&self, arg: HostValue) -> HostResult<HostValue> {
        let args = vec![Arg::Handle(&self.handle), Arg::Value(arg)];
        self.dispatcher.call(self.invoke, &self.bindings(), args)?.into_value()
    }

    fn map(&self, d_in: HostValue) -> HostResult<HostValue> {
        self.expect_distance(&d_in)?;
        let args = vec![Arg::Handle(&self.handle), Arg::Value(d_in)];
        self.dispatcher.call(self.map, &self.bindings(), args)?.into_value()
    }

    fn check(&self, d_in: HostValue, d_out: HostValue) -> HostResult<bool> {
        self.expect_distance(&d_in)?;
        let args = vec![Arg::Handle(&self.handle), Arg::Value(d_in), Arg::Value(d_out)];
        match self.dispatcher.call(self.check, &self.bindings(), args)?.into_value()? {
            HostValue::Bool(passed) => Ok(passed),
            other => Err(HostError::Marshal(format!("check returned {}", other))),
        }
    }
}

/// A stability-bounded function from datasets to values
#[derive(Debug)]
pub struct Transformation {
    bound: Bound,
}

impl Transformation {
    pub(crate) fn new(handle: Handle, dispatcher: Arc<Dispatcher>) -> HostResult<Self> {
        Ok(Transformation {
            bound: Bound::new(handle, dispatcher)?,
        })
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.bound.descriptors
    }

    pub fn input_domain(&self) -> &str {
        &self.bound.descriptors.input_domain
    }

    pub fn output_domain(&self) -> &str {
        &self.bound.descriptors.output_domain
    }

    pub fn input_metric(&self) -> &str {
        &self.bound.descriptors.input_metric
    }

    pub fn output_metric(&self) -> &str {
        &self.bound.descriptors.output_distance
    }

    pub fn invoke(&self, arg: impl Into<HostValue>) -> HostResult<HostValue> {
        self.bound.invoke(arg.into())
    }

    /// Output stability for input distance `d_in`
    pub fn map(&self, d_in: impl Into<HostValue>) -> HostResult<HostValue> {
        self.bound.map(d_in.into())
    }

    pub fn check(
        &self,
        d_in: impl Into<HostValue>,
        d_out: impl Into<HostValue>,
    ) -> HostResult<bool> {
        self.bound.check(d_in.into(), d_out.into())
    }

    pub fn handle(&self) -> &Handle {
        &self.bound.handle
    }

    /// Free this transformation and everything it was built from
    pub fn release(self) -> HostResult<usize> {
        self.bound.handle.release()
    }

    pub(crate) fn into_handle(self) -> Handle {
        self.bound.handle
    }

    pub(crate) fn adopt(&mut self, children: impl IntoIterator<Item = Handle>) {
        self.bound.handle.adopt(children);
    }
}

/// A randomized function from datasets to released values
#[derive(Debug)]
pub struct Measurement {
    bound: Bound,
    invoke_lock: Mutex<()>,
}

// SAFETY: the native measurement is immutable after construction. `map`,
// `check` and `describe` only read it; `invoke` draws randomness and holds
// the `parking_lot` lock `invoke_lock` for the whole native call. `Handle`
// is `Send` and is only touched through `&self` here, so shared references
// never free or mutate it; release takes the measurement by value.
unsafe impl Sync for Measurement {}

impl Measurement {
    pub(crate) fn new(handle: Handle, dispatcher: Arc<Dispatcher>) -> HostResult<Self> {
        Ok(Measurement {
            bound: Bound::new(handle, dispatcher)?,
            invoke_lock: Mutex::new(()),
        })
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.bound.descriptors
    }

    pub fn input_domain(&self) -> &str {
        &self.bound.descriptors.input_domain
    }

    pub fn output_domain(&self) -> &str {
        &self.bound.descriptors.output_domain
    }

    pub fn input_metric(&self) -> &str {
        &self.bound.descriptors.input_metric
    }

    pub fn output_measure(&self) -> &str {
        &self.bound.descriptors.output_distance
    }

    fn is_curve_valued(&self) -> bool {
        self.output_measure().starts_with(SMOOTHED_MAX_DIVERGENCE)
    }

    /// Release a noisy value for `arg`
    pub fn invoke(&self, arg: impl Into<HostValue>) -> HostResult<HostValue> {
        let _guard = self.invoke_lock.lock();
        self.bound.invoke(arg.into())
    }

    /// Privacy loss for input distance `d_in`.
    ///
    /// Curve-valued measures have no host representation of their loss;
    /// use [`Measurement::map_curve`].
    pub fn map(&self, d_in: impl Into<HostValue>) -> HostResult<HostValue> {
        if self.is_curve_valued() {
            return Err(HostError::UnsupportedType(format!(
                "{} maps to a privacy curve, use map_curve",
                self.output_measure()
            )));
        }
        self.bound.map(d_in.into())
    }

    /// Privacy curve for input distance `d_in`
    pub fn map_curve(&self, d_in: impl Into<HostValue>) -> HostResult<Curve> {
        if !self.is_curve_valued() {
            return Err(HostError::UnsupportedType(format!(
                "{} does not map to a privacy curve",
                self.output_measure()
            )));
        }
        let d_in = d_in.into();
        self.bound.expect_distance(&d_in)?;
        let args = vec![Arg::Handle(&self.bound.handle), Arg::Value(d_in)];
        let handle = self
            .bound
            .dispatcher
            .call(&catalog::MEASUREMENT_MAP_CURVE, &self.bound.bindings(), args)?
            .into_handle()?;
        Ok(Curve {
            handle,
            dispatcher: self.bound.dispatcher.clone(),
        })
    }

    pub fn check(
        &self,
        d_in: impl Into<HostValue>,
        d_out: impl Into<HostValue>,
    ) -> HostResult<bool> {
        self.bound.check(d_in.into(), d_out.into())
    }

    pub fn handle(&self) -> &Handle {
        &self.bound.handle
    }

    /// Free this measurement and everything it was built from
    pub fn release(self) -> HostResult<usize> {
        self.bound.handle.release()
    }

    pub(crate) fn into_handle(self) -> Handle {
        self.bound.handle
    }

    pub(crate) fn adopt(&mut self, children: impl IntoIterator<Item = Handle>) {
        self.bound.handle.adopt(children);
    }
}

/// Native privacy curve returned by [`Measurement::map_curve`]
#[derive(Debug)]
pub struct Curve {
    handle: Handle,
    dispatcher: Arc<Dispatcher>,
}

impl Curve {
    /// Smallest epsilon at which the curve holds with failure probability `delta`
    pub fn epsilon(&self, delta: f64) -> HostResult<f64> {
        let args = vec![Arg::Handle(&self.handle), Arg::Value(HostValue::Float(delta))];
        let returned = self.dispatcher.call(&catalog::CURVE_EPSILON, &Bindings::new(), args)?;
        match returned.into_value()? {
            HostValue::Float(epsilon) => Ok(epsilon),
            other => Err(HostError::Marshal(format!("curve returned {}", other))),
        }
    }

    /// Display form of the native curve
    pub fn to_text(&self) -> HostResult<String> {
        let args = vec![Arg::Handle(&self.handle)];
        let returned = self.dispatcher.call(&catalog::DATA_TO_STRING, &Bindings::new(), args)?;
        match returned.into_value()? {
            HostValue::Str(text) => Ok(text),
            other => Err(HostError::Marshal(format!("expected text, got {}", other))),
        }
    }
}

/// Either kind of entity
#[derive(Debug)]
pub enum Entity {
    Transformation(Transformation),
    Measurement(Measurement),
}

impl Entity {
    pub fn descriptors(&self) -> &Descriptors {
        match self {
            Entity::Transformation(t) => t.descriptors(),
            Entity::Measurement(m) => m.descriptors(),
        }
    }

    pub fn invoke(&self, arg: impl Into<HostValue>) -> HostResult<HostValue> {
        match self {
            Entity::Transformation(t) => t.invoke(arg),
            Entity::Measurement(m) => m.invoke(arg),
        }
    }

    pub fn map(&self, d_in: impl Into<HostValue>) -> HostResult<HostValue> {
        match self {
            Entity::Transformation(t) => t.map(d_in),
            Entity::Measurement(m) => m.map(d_in),
        }
    }

    pub fn check(
        &self,
        d_in: impl Into<HostValue>,
        d_out: impl Into<HostValue>,
    ) -> HostResult<bool> {
        match self {
            Entity::Transformation(t) => t.check(d_in, d_out),
            Entity::Measurement(m) => m.check(d_in, d_out),
        }
    }

    pub fn release(self) -> HostResult<usize> {
        match self {
            Entity::Transformation(t) => t.release(),
            Entity::Measurement(m) => m.release(),
        }
    }

    pub fn into_transformation(self) -> HostResult<Transformation> {
        match self {
            Entity::Transformation(t) => Ok(t),
            Entity::Measurement(m) => Err(HostError::DomainMismatch(format!(
                "expected a transformation, got a measurement into {}",
                m.output_measure()
            ))),
        }
    }

    pub fn into_measurement(self) -> HostResult<Measurement> {
        match self {
            Entity::Measurement(m) => Ok(m),
            Entity::Transformation(t) => Err(HostError::DomainMismatch(format!(
                "expected a measurement, got a transformation into {}",
                t.output_metric()
            ))),
        }
    }
}

impl From<Transformation> for Entity {
    fn from(t: Transformation) -> Self {
        Entity::Transformation(t)
    }
}

impl From<Measurement> for Entity {
    fn from(m: Measurement) -> Self {
        Entity::Measurement(m)
    }
}

/// Fail unless `first`'s output feeds `second`'s input
fn expect_boundary(first: &Descriptors, second: &Descriptors) -> HostResult<()> {
    if first.output_domain != second.input_domain {
        return Err(HostError::DomainMismatch(format!(
            "output domain {} does not match input domain {}",
            first.output_domain, second.input_domain
        )));
    }
    if first.output_distance != second.input_metric {
        return Err(HostError::DomainMismatch(format!(
            "output metric {} does not match input metric {}",
            first.output_distance, second.input_metric
        )));
    }
    Ok(())
}

impl Library {
    /// Sequential composition: `first` runs, then `second` on its output.
    ///
    /// The result is a measurement when `second` is one. Nothing can follow
    /// a measurement. On failure both entities are handed back untouched.
    pub fn chain(
        &self,
        first: impl Into<Entity>,
        second: impl Into<Entity>,
    ) -> Consumed<Entity, (Entity, Entity)> {
        let (first, second): (Entity, Entity) = (first.into(), second.into());
        let first = match first {
            Entity::Transformation(t) => t,
            Entity::Measurement(m) => {
                let error = HostError::DomainMismatch(format!(
                    "cannot chain after a measurement into {}",
                    m.output_measure()
                ));
                return Err(Rejected {
                    error,
                    inputs: (Entity::Measurement(m), second),
                });
            }
        };
        match second {
            Entity::Transformation(t) => self
                .chain_tt(first, t)
                .map(Entity::Transformation)
                .map_err(|r| r.map_inputs(|(a, b)| (a.into(), b.into()))),
            Entity::Measurement(m) => self
                .chain_mt(first, m)
                .map(Entity::Measurement)
                .map_err(|r| r.map_inputs(|(a, b)| (a.into(), b.into()))),
        }
    }

    /// Chain two transformations
    pub fn chain_tt(
        &self,
        first: Transformation,
        second: Transformation,
    ) -> Consumed<Transformation, (Transformation, Transformation)> {
        let built = expect_boundary(first.descriptors(), second.descriptors()).and_then(|()| {
            let args = vec![Arg::Handle(second.handle()), Arg::Handle(first.handle())];
            let handle = self
                .dispatcher()
                .call(&catalog::MAKE_CHAIN_TT, &Bindings::new(), args)?
                .into_handle()?;
            Transformation::new(handle, self.dispatcher().clone())
        });
        let (mut chained, (first, second)) = Rejected::guard(built, (first, second))?;
        chained.adopt([second.into_handle(), first.into_handle()]);
        Ok(chained)
    }

    /// Chain a transformation into a measurement
    pub fn chain_mt(
        &self,
        first: Transformation,
        second: Measurement,
    ) -> Consumed<Measurement, (Transformation, Measurement)> {
        let built = expect_boundary(first.descriptors(), second.descriptors()).and_then(|()| {
            let args = vec![Arg::Handle(second.handle()), Arg::Handle(first.handle())];
            let handle = self
                .dispatcher()
                .call(&catalog::MAKE_CHAIN_MT, &Bindings::new(), args)?
                .into_handle()?;
            Measurement::new(handle, self.dispatcher().clone())
        });
        let (mut chained, (first, second)) = Rejected::guard(built, (first, second))?;
        chained.adopt([second.into_handle(), first.into_handle()]);
        Ok(chained)
    }
}
