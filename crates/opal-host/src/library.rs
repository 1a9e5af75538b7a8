//! Library facade: feature configuration and kernel constructors
//!
//! Constructors take their value parameters as host values and their type
//! arguments as [`Hints`]. A type argument with no hint is inferred from
//! the values where that is unambiguous, or takes a documented default.

use std::sync::Arc;

use opal_core::Type;

use crate::catalog::{self, Signature};
use crate::dispatch::Dispatcher;
use crate::entity::{Measurement, Transformation};
use crate::marshal::Arg;
use crate::resolve::{infer, template, Bindings, Hints};
use crate::{Features, HostError, HostResult, HostValue};

/// Entry point of the host API
#[derive(Debug, Clone)]
pub struct Library {
    dispatcher: Arc<Dispatcher>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new(Features::default())
    }
}

impl Library {
    /// The feature set is fixed for the life of the library
    pub fn new(features: Features) -> Self {
        let enabled: Vec<&str> = features.iter().collect();
        tracing::debug!(features = ?enabled, "library configured");
        Library {
            dispatcher: Arc::new(Dispatcher::new(features)),
        }
    }

    /// Features from `OPAL_FEATURES`
    pub fn from_env() -> Self {
        Self::new(Features::from_env())
    }

    pub fn features(&self) -> &Features {
        self.dispatcher.features()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn transformation(
        &self,
        signature: &Signature,
        bindings: &Bindings,
        args: Vec<Arg<'_>>,
    ) -> HostResult<Transformation> {
        let handle = self.dispatcher.call(signature, bindings, args)?.into_handle()?;
        Transformation::new(handle, self.dispatcher.clone())
    }

    fn measurement(
        &self,
        signature: &Signature,
        bindings: &Bindings,
        args: Vec<Arg<'_>>,
    ) -> HostResult<Measurement> {
        let handle = self.dispatcher.call(signature, bindings, args)?.into_handle()?;
        Measurement::new(handle, self.dispatcher.clone())
    }

    /// Identity on vectors of `T`; `T` must be given
    pub fn make_identity(&self, hints: &Hints) -> HostResult<Transformation> {
        let bindings = bind([("T", hints.require("T")?)]);
        self.transformation(&catalog::MAKE_IDENTITY, &bindings, vec![])
    }

    pub fn make_clamp(
        &self,
        lower: impl Into<HostValue>,
        upper: impl Into<HostValue>,
        hints: &Hints,
    ) -> HostResult<Transformation> {
        let (lower, upper) = (lower.into(), upper.into());
        let bindings = bind([("T", hints.resolve("T", || infer(&lower))?)]);
        self.transformation(
            &catalog::MAKE_CLAMP,
            &bindings,
            vec![Arg::Value(lower), Arg::Value(upper)],
        )
    }

    pub fn make_bounded_sum(
        &self,
        lower: impl Into<HostValue>,
        upper: impl Into<HostValue>,
        hints: &Hints,
    ) -> HostResult<Transformation> {
        let (lower, upper) = (lower.into(), upper.into());
        let bindings = bind([("T", hints.resolve("T", || infer(&lower))?)]);
        self.transformation(
            &catalog::MAKE_BOUNDED_SUM,
            &bindings,
            vec![Arg::Value(lower), Arg::Value(upper)],
        )
    }

    /// Mean of exactly `n` values in `[lower, upper]`.
    ///
    /// `MI` defaults to `SymmetricDistance` and `MO` to `L1Sensitivity<T>`;
    /// the bounds are read as the carrier of `MO`.
    pub fn make_bounded_mean(
        &self,
        lower: impl Into<HostValue>,
        upper: impl Into<HostValue>,
        n: u64,
        hints: &Hints,
    ) -> HostResult<Transformation> {
        let (lower, upper) = (lower.into(), upper.into());
        let n = i64::try_from(n)
            .map_err(|_| HostError::Marshal(format!("n {} overflows a host integer", n)))?;
        let mut bindings = bind([("T", hints.resolve("T", || infer(&lower))?)]);
        let input_metric = hints.resolve("MI", || Ok(Type::named("SymmetricDistance")))?;
        let output_metric = hints.resolve("MO", || template("L1Sensitivity<T>", &bindings))?;
        if let Some((_, [carrier])) = output_metric.as_generic() {
            bindings.insert("T".into(), carrier.clone());
        }
        bindings.insert("MI".into(), input_metric);
        bindings.insert("MO".into(), output_metric);

        self.transformation(
            &catalog::MAKE_BOUNDED_MEAN,
            &bindings,
            vec![
                Arg::Value(lower),
                Arg::Value(upper),
                Arg::Value(HostValue::Int(n)),
            ],
        )
    }

    /// Number of records in a vector of `TIA`; `TIA` must be given
    pub fn make_count(&self, hints: &Hints) -> HostResult<Transformation> {
        let bindings = bind([("TIA", hints.require("TIA")?)]);
        self.transformation(&catalog::MAKE_COUNT, &bindings, vec![])
    }

    pub fn make_base_laplace(
        &self,
        scale: impl Into<HostValue>,
        hints: &Hints,
    ) -> HostResult<Measurement> {
        let scale = scale.into();
        let bindings = bind([("T", hints.resolve("T", || infer(&scale))?)]);
        self.measurement(&catalog::MAKE_BASE_LAPLACE, &bindings, vec![Arg::Value(scale)])
    }

    pub fn make_base_gaussian(
        &self,
        scale: impl Into<HostValue>,
        hints: &Hints,
    ) -> HostResult<Measurement> {
        let scale = scale.into();
        let bindings = bind([("T", hints.resolve("T", || infer(&scale))?)]);
        self.measurement(&catalog::MAKE_BASE_GAUSSIAN, &bindings, vec![Arg::Value(scale)])
    }

    /// Two-sided geometric noise on integers of type `T`, `i32` by default
    pub fn make_base_geometric(&self, scale: f64, hints: &Hints) -> HostResult<Measurement> {
        let bindings = bind([("T", hints.resolve("T", || Ok(Type::I32))?)]);
        self.measurement(
            &catalog::MAKE_BASE_GEOMETRIC,
            &bindings,
            vec![Arg::Value(HostValue::Float(scale))],
        )
    }
}

fn bind<const N: usize>(pairs: [(&str, Type); N]) -> Bindings {
    pairs
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect()
}
