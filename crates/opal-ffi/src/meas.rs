//! Measurement constructor entry points

use std::ffi::c_char;

use opal_core::meas;
use opal_core::traits::{Float, Integer};

use crate::types::{FfiPayload, FfiResult};
use crate::util::{self, entry};

/// `meas__make_base_laplace<T>(&scale)`
pub unsafe extern "C" fn make_base_laplace<T: Float>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        let args = util::args(args, len, 1)?;
        let scale = util::read::<T>(&args[0], "scale")?;
        Ok(util::boxed(meas::make_base_laplace::<T>(scale)?))
    })
}

/// `meas__make_base_gaussian<T>(&scale)`
pub unsafe extern "C" fn make_base_gaussian<T: Float>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        let args = util::args(args, len, 1)?;
        let scale = util::read::<T>(&args[0], "scale")?;
        Ok(util::boxed(meas::make_base_gaussian::<T>(scale)?))
    })
}

/// `meas__make_base_geometric<T>(scale)`, scale passed by value
pub unsafe extern "C" fn make_base_geometric<T: Integer>(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        util::expect_type_args(type_args, &[T::type_()])?;
        let args = util::args(args, len, 1)?;
        Ok(util::boxed(meas::make_base_geometric::<T>(args[0].float)?))
    })
}
