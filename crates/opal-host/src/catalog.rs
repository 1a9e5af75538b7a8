//! Declared signatures of the native operations
//!
//! A signature names the operation, its type parameters, how each value
//! argument crosses the boundary and what comes back. Parameter
//! descriptors are shapes over the call's bindings.

use crate::features::{CONTRIB, FLOATING_POINT};

/// How an argument crosses the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passing {
    /// Fixed-width scalar in the payload itself
    ByValue,
    /// Scalar in address-stable storage, pointer in the payload
    ByRef,
    /// Boxed native object built from the host value
    Object,
    /// Existing native entity or object
    Handle,
    /// Array of native entities
    HandleList,
}

/// What a successful call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Transformation,
    Measurement,
    /// Native object kept alive as a handle
    Object,
    /// Slice view borrowing a native object
    View,
    /// Native object decoded to a host value, then freed
    Value,
    Bool,
    Float,
    Str,
    Unit,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub descriptor: &'static str,
    pub passing: Passing,
}

const fn param(name: &'static str, descriptor: &'static str, passing: Passing) -> Param {
    Param {
        name,
        descriptor,
        passing,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub module: &'static str,
    pub name: &'static str,
    /// Type parameters, in the order of the type-argument blob
    pub type_params: &'static [&'static str],
    /// Whether the type arguments select a separate entry point
    pub monomorphized: bool,
    pub params: &'static [Param],
    pub returns: ReturnKind,
    pub features: &'static [&'static str],
}

impl Signature {
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

const fn kernel(
    module: &'static str,
    name: &'static str,
    type_params: &'static [&'static str],
    params: &'static [Param],
    returns: ReturnKind,
    features: &'static [&'static str],
) -> Signature {
    Signature {
        module,
        name,
        type_params,
        monomorphized: true,
        params,
        returns,
        features,
    }
}

const fn core(name: &'static str, params: &'static [Param], returns: ReturnKind) -> Signature {
    Signature {
        module: "core",
        name,
        type_params: &[],
        monomorphized: false,
        params,
        returns,
        features: &[],
    }
}

const ENTITY: Param = param("entity", "", Passing::Handle);

const BOUNDS: &[Param] = &[
    param("lower", "T", Passing::ByRef),
    param("upper", "T", Passing::ByRef),
];
const MEAN_PARAMS: &[Param] = &[
    param("lower", "T", Passing::ByRef),
    param("upper", "T", Passing::ByRef),
    param("n", "u64", Passing::ByValue),
];
const SCALE_BY_REF: &[Param] = &[param("scale", "T", Passing::ByRef)];
const SCALE_BY_VALUE: &[Param] = &[param("scale", "f64", Passing::ByValue)];
const COMPOSITION_PARAMS: &[Param] = &[
    param("measurements", "", Passing::HandleList),
    param("rule", "u64", Passing::ByValue),
    param("rule_param", "f64", Passing::ByRef),
];
const AMPLIFICATION_PARAMS: &[Param] = &[
    ENTITY,
    param("population_size", "u64", Passing::ByValue),
];
const FIX_DELTA_PARAMS: &[Param] = &[ENTITY, param("delta", "T", Passing::ByRef)];
const INVOKE_PARAMS: &[Param] = &[ENTITY, param("arg", "TI", Passing::Object)];
const MAP_PARAMS: &[Param] = &[ENTITY, param("d_in", "QI", Passing::Object)];
const CHECK_PARAMS: &[Param] = &[
    ENTITY,
    param("d_in", "QI", Passing::Object),
    param("d_out", "QO", Passing::Object),
];
const DESCRIBE_PARAMS: &[Param] = &[ENTITY, param("field", "u64", Passing::ByValue)];
const CHAIN_PARAMS: &[Param] = &[
    param("outer", "", Passing::Handle),
    param("inner", "", Passing::Handle),
];
const CURVE_PARAMS: &[Param] = &[
    param("curve", "", Passing::Handle),
    param("delta", "f64", Passing::ByRef),
];

// transformations
pub static MAKE_IDENTITY: Signature =
    kernel("trans", "make_identity", &["T"], &[], ReturnKind::Transformation, &[]);
pub static MAKE_CLAMP: Signature =
    kernel("trans", "make_clamp", &["T"], BOUNDS, ReturnKind::Transformation, &[]);
pub static MAKE_BOUNDED_SUM: Signature = kernel(
    "trans",
    "make_bounded_sum",
    &["T"],
    BOUNDS,
    ReturnKind::Transformation,
    &[FLOATING_POINT],
);
pub static MAKE_BOUNDED_MEAN: Signature = kernel(
    "trans",
    "make_bounded_mean",
    &["MI", "MO"],
    MEAN_PARAMS,
    ReturnKind::Transformation,
    &[FLOATING_POINT],
);
pub static MAKE_COUNT: Signature =
    kernel("trans", "make_count", &["TIA"], &[], ReturnKind::Transformation, &[]);

// measurements
pub static MAKE_BASE_LAPLACE: Signature = kernel(
    "meas",
    "make_base_laplace",
    &["T"],
    SCALE_BY_REF,
    ReturnKind::Measurement,
    &[FLOATING_POINT],
);
pub static MAKE_BASE_GAUSSIAN: Signature = kernel(
    "meas",
    "make_base_gaussian",
    &["T"],
    SCALE_BY_REF,
    ReturnKind::Measurement,
    &[FLOATING_POINT],
);
pub static MAKE_BASE_GEOMETRIC: Signature = kernel(
    "meas",
    "make_base_geometric",
    &["T"],
    SCALE_BY_VALUE,
    ReturnKind::Measurement,
    &[],
);

// combinators
pub static MAKE_BASIC_COMPOSITION: Signature = Signature {
    module: "comb",
    name: "make_basic_composition",
    type_params: &[],
    monomorphized: false,
    params: COMPOSITION_PARAMS,
    returns: ReturnKind::Measurement,
    features: &[],
};
pub static MAKE_POPULATION_AMPLIFICATION: Signature = kernel(
    "comb",
    "make_population_amplification",
    &["DIA", "MO"],
    AMPLIFICATION_PARAMS,
    ReturnKind::Measurement,
    &[CONTRIB],
);
pub static MAKE_FIX_DELTA: Signature = kernel(
    "comb",
    "make_fix_delta",
    &["MO"],
    FIX_DELTA_PARAMS,
    ReturnKind::Measurement,
    &[],
);

// entity operations; TI, QI and QO are bound per entity
pub static TRANSFORMATION_INVOKE: Signature =
    core("transformation_invoke", INVOKE_PARAMS, ReturnKind::Value);
pub static TRANSFORMATION_MAP: Signature =
    core("transformation_map", MAP_PARAMS, ReturnKind::Value);
pub static TRANSFORMATION_CHECK: Signature =
    core("transformation_check", CHECK_PARAMS, ReturnKind::Bool);
pub static TRANSFORMATION_DESCRIBE: Signature =
    core("transformation_describe", DESCRIBE_PARAMS, ReturnKind::Str);
pub static MEASUREMENT_INVOKE: Signature =
    core("measurement_invoke", INVOKE_PARAMS, ReturnKind::Value);
pub static MEASUREMENT_MAP: Signature = core("measurement_map", MAP_PARAMS, ReturnKind::Value);
/// Map of a curve-valued measurement; the curve stays native
pub static MEASUREMENT_MAP_CURVE: Signature =
    core("measurement_map", MAP_PARAMS, ReturnKind::Object);
pub static MEASUREMENT_CHECK: Signature =
    core("measurement_check", CHECK_PARAMS, ReturnKind::Bool);
pub static MEASUREMENT_DESCRIBE: Signature =
    core("measurement_describe", DESCRIBE_PARAMS, ReturnKind::Str);
pub static MAKE_CHAIN_TT: Signature =
    core("make_chain_tt", CHAIN_PARAMS, ReturnKind::Transformation);
pub static MAKE_CHAIN_MT: Signature =
    core("make_chain_mt", CHAIN_PARAMS, ReturnKind::Measurement);
pub static CURVE_EPSILON: Signature = core("curve_epsilon", CURVE_PARAMS, ReturnKind::Float);

pub static DATA_TO_STRING: Signature = Signature {
    module: "data",
    name: "to_string",
    type_params: &[],
    monomorphized: false,
    params: &[param("object", "", Passing::Handle)],
    returns: ReturnKind::Str,
    features: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_signature() {
        assert_eq!(MAKE_BOUNDED_MEAN.type_params, &["MI", "MO"]);
        assert_eq!(MAKE_BOUNDED_MEAN.params[2].passing, Passing::ByValue);
        assert_eq!(MAKE_BOUNDED_MEAN.qualified_name(), "trans::make_bounded_mean");
    }

    #[test]
    fn test_float_kernels_are_gated() {
        for signature in [&MAKE_BASE_LAPLACE, &MAKE_BASE_GAUSSIAN, &MAKE_BOUNDED_MEAN] {
            assert!(signature.features.contains(&FLOATING_POINT));
        }
        assert!(MAKE_POPULATION_AMPLIFICATION.features.contains(&CONTRIB));
        assert!(MAKE_BASE_GEOMETRIC.features.is_empty());
    }
}
