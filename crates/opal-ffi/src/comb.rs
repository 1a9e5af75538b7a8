//! Combinator entry points
//!
//! Combinators clone what they need out of their inputs. The caller keeps
//! ownership of every input and releases it together with the result.

use std::ffi::c_char;
use std::sync::Arc;

use opal_core::traits::Float;
use opal_core::{
    make_basic_composition, make_fix_delta, make_population_amplification, Additive, Advanced,
    CompositionRule, Measurement, OpalError, Type,
};

use crate::error::{Fallible, FfiError};
use crate::types::{FfiPayload, FfiResult, FfiSlice};
use crate::util::{self, entry};

/// Rule selector for `comb__make_basic_composition`
pub const RULE_ADDITIVE: u64 = 0;
pub const RULE_ADVANCED: u64 = 1;

unsafe fn composition_rule(
    selector: u64,
    param: &FfiPayload,
) -> Fallible<Arc<dyn CompositionRule>> {
    let rule: Arc<dyn CompositionRule> = match selector {
        RULE_ADDITIVE => Arc::new(Additive),
        RULE_ADVANCED => Arc::new(Advanced::new(util::read::<f64>(param, "delta_prime")?)?),
        other => {
            let message = format!("unknown composition rule {}", other);
            return Err(OpalError::InvalidArgument(message).into());
        }
    };
    Ok(rule)
}

fn expect_descriptor(what: &str, expected: &Type, actual: Type) -> Fallible<()> {
    if expected != &actual {
        return Err(OpalError::DomainMismatch(format!(
            "{} {} does not match the measurement's {}",
            what, expected, actual
        ))
        .into());
    }
    Ok(())
}

/// `comb__make_basic_composition(&[measurement], rule, &rule_param)`
pub unsafe extern "C" fn basic_composition(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 3)?;
        let slice = util::as_ref::<FfiSlice>(&args[0], "measurements")?;
        let pointers: &[*const Measurement] = if slice.len == 0 {
            &[]
        } else if slice.ptr.is_null() {
            return Err(FfiError::NullPointer("measurements"));
        } else {
            std::slice::from_raw_parts(slice.ptr as *const *const Measurement, slice.len)
        };
        let mut measurements = Vec::with_capacity(pointers.len());
        for pointer in pointers {
            if pointer.is_null() {
                return Err(FfiError::NullPointer("measurement"));
            }
            measurements.push((**pointer).clone());
        }
        let rule = composition_rule(args[1].uint, &args[2])?;
        Ok(util::boxed(make_basic_composition(&measurements, rule)?))
    })
}

/// `comb__make_population_amplification<DIA,MO>(measurement, population_size)`.
///
/// `DIA` names the record domain of the sized input and `MO` the output
/// measure; both must describe the measurement.
pub unsafe extern "C" fn population_amplification(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let type_args = util::type_args(type_args, 2)?;
        let args = util::args(args, len, 2)?;
        let measurement = util::as_ref::<Measurement>(&args[0], "measurement")?;
        let (records, _) = measurement.input_domain.sized_records().ok_or_else(|| {
            OpalError::MakeMeasurement(format!(
                "amplification requires a sized dataset input, got {}",
                measurement.input_domain
            ))
        })?;
        expect_descriptor("DIA", &type_args[0], records.descriptor())?;
        expect_descriptor("MO", &type_args[1], measurement.output_measure.descriptor())?;
        let population_size = usize::try_from(args[1].uint).map_err(|_| {
            OpalError::InvalidArgument("population size does not fit in usize".into())
        })?;
        Ok(util::boxed(make_population_amplification(measurement, population_size)?))
    })
}

/// `comb__make_fix_delta<MO>(measurement, &delta)`; `T` is the carrier of `MO`
pub unsafe extern "C" fn fix_delta<T: Float>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let type_args = util::type_args(type_args, 1)?;
        let args = util::args(args, len, 2)?;
        let measurement = util::as_ref::<Measurement>(&args[0], "measurement")?;
        expect_descriptor("MO", &type_args[0], measurement.output_measure.descriptor())?;
        let delta = util::read::<T>(&args[1], "delta")?;
        Ok(util::boxed(make_fix_delta(measurement, delta.to_f64())?))
    })
}
