#![allow(clippy::missing_safety_doc)]
//! OPAL FFI - Narrow C-style call boundary
//!
//! Every native operation is exported under a canonical symbol name with
//! one uniform signature. Calls return an [`FfiResult`] envelope; native
//! objects cross as opaque pointers that the caller frees explicitly.

pub mod error;
pub mod alloc;
pub mod types;
mod util;
pub mod data;
pub mod core;
pub mod trans;
pub mod meas;
pub mod comb;
pub mod exports;

use std::ffi::c_char;

pub use error::*;
pub use types::*;
pub use crate::core::EntityField;
pub use comb::{RULE_ADDITIVE, RULE_ADVANCED};
pub use exports::{lookup, opal_lookup, symbols};

/// Library version
#[no_mangle]
pub extern "C" fn opal_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

/// Free a string allocated by OPAL, such as an envelope's error message
#[no_mangle]
pub unsafe extern "C" fn opal_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(alloc::string_from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(opal_version()) };
        assert_eq!(version.to_str().unwrap(), opal_core::VERSION);
    }

    #[test]
    fn test_lookup_by_c_string() {
        let symbol = CString::new("trans__make_count__i32").unwrap();
        assert!(unsafe { opal_lookup(symbol.as_ptr()) }.is_some());
        unsafe { opal_string_free(std::ptr::null_mut()) };
    }

    #[test]
    fn test_full_pipeline_through_exports() {
        let before = alloc::live_allocations();
        let mean =
            lookup("trans__make_bounded_mean__SymmetricDistance__L1Sensitivity<f64>").unwrap();
        let laplace = lookup("meas__make_base_laplace__f64").unwrap();
        let chain = lookup("core__make_chain_mt").unwrap();
        let check = lookup("core__measurement_check").unwrap();
        let free_meas = lookup("core__measurement_free").unwrap();
        let free_trans = lookup("core__transformation_free").unwrap();
        let free_obj = lookup("data__object_free").unwrap();

        let (lower, upper, scale) = (0.0_f64, 10.0_f64, 0.5_f64);
        unsafe {
            let blob = CString::new("<SymmetricDistance,L1Sensitivity<f64>>").unwrap();
            let args = [FfiPayload::ptr(&lower), FfiPayload::ptr(&upper), FfiPayload::uint(10)];
            let t = mean(blob.as_ptr(), args.as_ptr(), 3);
            assert!(t.is_ok());

            let blob = CString::new("<f64>").unwrap();
            let m = laplace(blob.as_ptr(), [FfiPayload::ptr(&scale)].as_ptr(), 1);
            assert!(m.is_ok());

            let chained = chain(std::ptr::null(), [m.payload, t.payload].as_ptr(), 2);
            assert!(chained.is_ok());

            let d_in = alloc::into_raw(opal_core::AnyObject::U32(1));
            let d_out = alloc::into_raw(opal_core::AnyObject::F64(1.0));
            let args = [chained.payload, FfiPayload::ptr(d_in), FfiPayload::ptr(d_out)];
            let result = check(std::ptr::null(), args.as_ptr(), 3);
            assert!(result.is_ok());
            assert_eq!(result.payload.boolean, 1);

            for object in [d_in, d_out] {
                free_obj(std::ptr::null(), [FfiPayload::ptr(object)].as_ptr(), 1);
            }
            for measurement in [chained.payload, m.payload] {
                free_meas(std::ptr::null(), [measurement].as_ptr(), 1);
            }
            free_trans(std::ptr::null(), [t.payload].as_ptr(), 1);
        }
        assert_eq!(alloc::live_allocations(), before);
    }
}
