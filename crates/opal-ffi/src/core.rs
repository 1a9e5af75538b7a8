//! Entity entry points: invoke, map, check, describe, free, chain

use std::ffi::c_char;

use opal_core::{make_chain_mt, make_chain_tt, AnyObject, Measurement, OpalError, Transformation};

use crate::error::{Fallible, FfiError};
use crate::types::{FfiPayload, FfiResult};
use crate::util::{self, entry};

/// Field selector for `core__*_describe`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityField {
    InputDomain = 0,
    OutputDomain = 1,
    InputMetric = 2,
    /// Output metric of a transformation, output measure of a measurement
    OutputDistance = 3,
    /// Type of the values accepted by `invoke`
    InputCarrier = 4,
    /// Type of `d_in`
    InputDistanceType = 5,
    /// Type of the bound `d_out` passed to `check`
    OutputBoundType = 6,
}

impl TryFrom<u64> for EntityField {
    type Error = FfiError;

    fn try_from(value: u64) -> Fallible<Self> {
        Ok(match value {
            0 => EntityField::InputDomain,
            1 => EntityField::OutputDomain,
            2 => EntityField::InputMetric,
            3 => EntityField::OutputDistance,
            4 => EntityField::InputCarrier,
            5 => EntityField::InputDistanceType,
            6 => EntityField::OutputBoundType,
            other => {
                let message = format!("unknown entity field {}", other);
                return Err(OpalError::InvalidArgument(message).into());
            }
        })
    }
}

fn describe_transformation(t: &Transformation, field: EntityField) -> String {
    match field {
        EntityField::InputDomain => t.input_domain.to_string(),
        EntityField::OutputDomain => t.output_domain.to_string(),
        EntityField::InputMetric => t.input_metric.to_string(),
        EntityField::OutputDistance => t.output_metric.to_string(),
        EntityField::InputCarrier => t.input_domain.carrier().to_string(),
        EntityField::InputDistanceType => t.input_metric.distance_type().to_string(),
        EntityField::OutputBoundType => t.output_metric.distance_type().to_string(),
    }
}

fn describe_measurement(m: &Measurement, field: EntityField) -> String {
    match field {
        EntityField::InputDomain => m.input_domain.to_string(),
        EntityField::OutputDomain => m.output_domain.to_string(),
        EntityField::InputMetric => m.input_metric.to_string(),
        EntityField::OutputDistance => m.output_measure.to_string(),
        EntityField::InputCarrier => m.input_domain.carrier().to_string(),
        EntityField::InputDistanceType => m.input_metric.distance_type().to_string(),
        EntityField::OutputBoundType => m.output_measure.bound_type().to_string(),
    }
}

/// `core__transformation_invoke(transformation, arg)` -> object
pub unsafe extern "C" fn transformation_invoke(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let t = util::as_ref::<Transformation>(&args[0], "transformation")?;
        let arg = util::as_ref::<AnyObject>(&args[1], "arg")?;
        Ok(util::boxed(t.invoke(arg)?))
    })
}

/// `core__transformation_map(transformation, d_in)` -> object
pub unsafe extern "C" fn transformation_map(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let t = util::as_ref::<Transformation>(&args[0], "transformation")?;
        let d_in = util::as_ref::<AnyObject>(&args[1], "d_in")?;
        Ok(util::boxed(t.map(d_in)?))
    })
}

/// `core__transformation_check(transformation, d_in, d_out)` -> bool
pub unsafe extern "C" fn transformation_check(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 3)?;
        let t = util::as_ref::<Transformation>(&args[0], "transformation")?;
        let d_in = util::as_ref::<AnyObject>(&args[1], "d_in")?;
        let d_out = util::as_ref::<AnyObject>(&args[2], "d_out")?;
        Ok(FfiPayload::boolean(t.check(d_in, d_out)?))
    })
}

/// `core__transformation_describe(transformation, field)` -> string
pub unsafe extern "C" fn transformation_describe(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let t = util::as_ref::<Transformation>(&args[0], "transformation")?;
        let field = EntityField::try_from(args[1].uint)?;
        Ok(util::c_str(&describe_transformation(t, field)))
    })
}

/// `core__transformation_free(transformation)`
pub unsafe extern "C" fn transformation_free(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        drop(util::reclaim::<Transformation>(&args[0], "transformation")?);
        Ok(FfiPayload::null())
    })
}

/// `core__measurement_invoke(measurement, arg)` -> object
pub unsafe extern "C" fn measurement_invoke(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let m = util::as_ref::<Measurement>(&args[0], "measurement")?;
        let arg = util::as_ref::<AnyObject>(&args[1], "arg")?;
        Ok(util::boxed(m.invoke(arg)?))
    })
}

/// `core__measurement_map(measurement, d_in)` -> object
pub unsafe extern "C" fn measurement_map(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let m = util::as_ref::<Measurement>(&args[0], "measurement")?;
        let d_in = util::as_ref::<AnyObject>(&args[1], "d_in")?;
        Ok(util::boxed(m.map(d_in)?))
    })
}

/// `core__measurement_check(measurement, d_in, d_out)` -> bool
pub unsafe extern "C" fn measurement_check(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 3)?;
        let m = util::as_ref::<Measurement>(&args[0], "measurement")?;
        let d_in = util::as_ref::<AnyObject>(&args[1], "d_in")?;
        let d_out = util::as_ref::<AnyObject>(&args[2], "d_out")?;
        Ok(FfiPayload::boolean(m.check(d_in, d_out)?))
    })
}

/// `core__measurement_describe(measurement, field)` -> string
pub unsafe extern "C" fn measurement_describe(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let m = util::as_ref::<Measurement>(&args[0], "measurement")?;
        let field = EntityField::try_from(args[1].uint)?;
        Ok(util::c_str(&describe_measurement(m, field)))
    })
}

/// `core__measurement_free(measurement)`
pub unsafe extern "C" fn measurement_free(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        drop(util::reclaim::<Measurement>(&args[0], "measurement")?);
        Ok(FfiPayload::null())
    })
}

/// `core__make_chain_tt(transformation1, transformation0)` -> transformation.
/// The inputs stay owned by the caller.
pub unsafe extern "C" fn make_chain_tt_entry(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let t1 = util::as_ref::<Transformation>(&args[0], "transformation1")?;
        let t0 = util::as_ref::<Transformation>(&args[1], "transformation0")?;
        Ok(util::boxed(make_chain_tt(t1, t0)?))
    })
}

/// `core__make_chain_mt(measurement1, transformation0)` -> measurement.
/// The inputs stay owned by the caller.
pub unsafe extern "C" fn make_chain_mt_entry(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let m1 = util::as_ref::<Measurement>(&args[0], "measurement1")?;
        let t0 = util::as_ref::<Transformation>(&args[1], "transformation0")?;
        Ok(util::boxed(make_chain_mt(m1, t0)?))
    })
}

/// `core__curve_epsilon(curve, &delta)` -> f64
pub unsafe extern "C" fn curve_epsilon(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 2)?;
        let curve = util::as_ref::<AnyObject>(&args[0], "curve")?;
        let delta = util::read::<f64>(&args[1], "delta")?;
        Ok(FfiPayload::float(curve.as_curve()?.epsilon(delta)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc;
    use crate::error::FfiStatus;
    use opal_core::meas::make_base_laplace;
    use opal_core::trans::make_identity;
    use std::ffi::{c_void, CStr};

    unsafe fn call(entry: crate::RawEntry, args: &[FfiPayload]) -> FfiResult {
        entry(std::ptr::null(), args.as_ptr(), args.len())
    }

    #[test]
    fn test_measurement_round_trip() {
        let before = alloc::live_allocations();
        unsafe {
            let m = util::boxed(make_base_laplace::<f64>(0.5).unwrap());
            let d_in = util::boxed(AnyObject::F64(1.0));
            let d_out = util::boxed(AnyObject::F64(2.0));

            let result = call(measurement_check, &[m, d_in, d_out]);
            assert!(result.is_ok());
            assert_eq!(result.payload.boolean, 1);

            let result = call(measurement_map, &[m, d_in]);
            assert_eq!(*(result.payload.ptr as *const AnyObject), AnyObject::F64(2.0));
            call(crate::data::object_free, &[result.payload]);

            let result = call(measurement_describe, &[m, FfiPayload::uint(3)]);
            let text = CStr::from_ptr(result.payload.ptr as *const c_char);
            assert_eq!(text.to_str().unwrap(), "MaxDivergence<f64>");
            call(crate::data::str_free, &[result.payload]);

            for payload in [d_in, d_out] {
                call(crate::data::object_free, &[payload]);
            }
            call(measurement_free, &[m]);
        }
        assert_eq!(alloc::live_allocations(), before);
    }

    #[test]
    fn test_chain_mismatch_reports_status() {
        unsafe {
            let m = util::boxed(make_base_laplace::<f64>(0.5).unwrap());
            let t = util::boxed(make_identity::<f64>().unwrap());
            let result = call(make_chain_mt_entry, &[m, t]);
            assert_eq!(result.status, FfiStatus::DomainMismatch as i32);
            crate::opal_string_free(result.error);
            call(measurement_free, &[m]);
            call(transformation_free, &[t]);
        }
    }

    #[test]
    fn test_null_and_arity_errors() {
        unsafe {
            let result = call(measurement_map, &[FfiPayload::null(), FfiPayload::null()]);
            assert_eq!(result.status, FfiStatus::NullPointer as i32);
            crate::opal_string_free(result.error);

            let result = call(measurement_map, &[FfiPayload::ptr(std::ptr::null::<c_void>())]);
            assert_eq!(result.status, FfiStatus::InvalidArgument as i32);
            crate::opal_string_free(result.error);
        }
    }
}
