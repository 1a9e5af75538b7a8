//! Transformation constructor entry points, one instantiation per carrier

use std::ffi::c_char;

use opal_core::traits::{Element, Float, Primitive};
use opal_core::{trans, Metric, OpalError};

use crate::error::Fallible;
use crate::types::{FfiPayload, FfiResult};
use crate::util::{self, entry};

/// `trans__make_identity<T>()`
pub unsafe extern "C" fn make_identity<T: Primitive>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        util::args(args, len, 0)?;
        Ok(util::boxed(trans::make_identity::<T>()?))
    })
}

/// `trans__make_clamp<T>(&lower, &upper)`
pub unsafe extern "C" fn make_clamp<T: Primitive>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        let args = util::args(args, len, 2)?;
        let lower = util::read::<T>(&args[0], "lower")?;
        let upper = util::read::<T>(&args[1], "upper")?;
        Ok(util::boxed(trans::make_clamp::<T>(lower, upper)?))
    })
}

/// `trans__make_bounded_sum<T>(&lower, &upper)`
pub unsafe extern "C" fn make_bounded_sum<T: Float>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        let args = util::args(args, len, 2)?;
        let lower = util::read::<T>(&args[0], "lower")?;
        let upper = util::read::<T>(&args[1], "upper")?;
        Ok(util::boxed(trans::make_bounded_sum::<T>(lower, upper)?))
    })
}

fn mean_metrics<T: Float>(type_args: &[opal_core::Type]) -> Fallible<(Metric, Metric)> {
    let input_metric = Metric::from_type(&type_args[0])?;
    let output_metric = Metric::from_type(&type_args[1])?;
    match &output_metric {
        Metric::L1Sensitivity(q) | Metric::L2Sensitivity(q) if q == &T::type_() => {
            Ok((input_metric, output_metric))
        }
        other => Err(OpalError::NotImplemented(format!(
            "bounded mean entry over {} called with {}",
            T::type_(),
            other
        ))
        .into()),
    }
}

/// `trans__make_bounded_mean<MI,MO>(&lower, &upper, n)`; `T` is the
/// carrier of `MO`
pub unsafe extern "C" fn make_bounded_mean<T: Float>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let (input_metric, output_metric) = mean_metrics::<T>(&util::type_args(type_args, 2)?)?;
        let args = util::args(args, len, 3)?;
        let lower = util::read::<T>(&args[0], "lower")?;
        let upper = util::read::<T>(&args[1], "upper")?;
        let n = args[2].uint as usize;
        Ok(util::boxed(trans::make_bounded_mean::<T>(
            lower,
            upper,
            n,
            input_metric,
            output_metric,
        )?))
    })
}

/// `trans__make_count<TIA>()`
pub unsafe extern "C" fn make_count<TIA: Element>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[TIA::type_()])?;
        util::args(args, len, 0)?;
        Ok(util::boxed(trans::make_count::<TIA>()?))
    })
}
