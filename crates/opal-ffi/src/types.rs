//! FFI-compatible type definitions

use std::ffi::{c_char, c_int, c_void};
use std::fmt;

use crate::alloc;
use crate::error::{set_last_error, Fallible, FfiStatus};

/// One argument or return value: a pointer or a fixed-width scalar
#[repr(C)]
#[derive(Clone, Copy)]
pub union FfiPayload {
    pub ptr: *const c_void,
    pub int: i64,
    pub uint: u64,
    pub float: f64,
    pub boolean: u8,
}

impl FfiPayload {
    pub fn null() -> Self {
        FfiPayload {
            ptr: std::ptr::null(),
        }
    }

    pub fn ptr<T>(ptr: *const T) -> Self {
        FfiPayload {
            ptr: ptr as *const c_void,
        }
    }

    pub fn int(value: i64) -> Self {
        FfiPayload { int: value }
    }

    pub fn uint(value: u64) -> Self {
        FfiPayload { uint: value }
    }

    pub fn float(value: f64) -> Self {
        FfiPayload { float: value }
    }

    pub fn boolean(value: bool) -> Self {
        // zero the full word so every view of the union is defined
        let mut payload = FfiPayload { uint: 0 };
        payload.boolean = value as u8;
        payload
    }

    /// Raw bits, valid for any variant
    pub fn bits(&self) -> u64 {
        unsafe { self.uint }
    }
}

impl fmt::Debug for FfiPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FfiPayload({:#018x})", self.bits())
    }
}

/// Result envelope returned by every entry point.
///
/// `status == 0` means `payload` is valid. Otherwise `error` holds a
/// message the caller must free with [`crate::opal_string_free`].
#[repr(C)]
#[derive(Debug)]
pub struct FfiResult {
    pub status: c_int,
    pub payload: FfiPayload,
    pub error: *mut c_char,
}

impl FfiResult {
    pub fn ok(payload: FfiPayload) -> Self {
        FfiResult {
            status: FfiStatus::Ok.into(),
            payload,
            error: std::ptr::null_mut(),
        }
    }

    pub fn ok_unit() -> Self {
        Self::ok(FfiPayload::null())
    }

    pub fn err(status: FfiStatus, message: &str) -> Self {
        tracing::warn!(?status, error = message, "native call failed");
        set_last_error(message);
        FfiResult {
            status: status.into(),
            payload: FfiPayload { uint: 0 },
            error: alloc::string_into_raw(message),
        }
    }

    pub fn from_fallible(result: Fallible<FfiPayload>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => Self::err(e.status(), &e.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FfiStatus::Ok as c_int
    }
}

/// Contiguous values crossing the boundary
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiSlice {
    pub ptr: *const c_void,
    pub len: usize,
}

impl FfiSlice {
    pub fn new(ptr: *const c_void, len: usize) -> Self {
        FfiSlice { ptr, len }
    }
}

/// Uniform signature shared by every exported entry point
pub type RawEntry = unsafe extern "C" fn(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FfiError;
    use std::ffi::CStr;

    #[test]
    fn test_payload_views() {
        assert_eq!(unsafe { FfiPayload::float(2.5).float }, 2.5);
        assert_eq!(FfiPayload::boolean(true).bits(), 1);
        assert!(unsafe { FfiPayload::null().ptr }.is_null());
    }

    #[test]
    fn test_error_envelope_owns_message() {
        let before = alloc::live_allocations();
        let result = FfiResult::from_fallible(Err(FfiError::NullPointer("measurement")));
        assert!(!result.is_ok());
        assert_eq!(result.status, FfiStatus::NullPointer as c_int);
        let message = unsafe { CStr::from_ptr(result.error) }.to_str().unwrap().to_string();
        assert!(message.contains("measurement"));
        unsafe { crate::opal_string_free(result.error) };
        assert_eq!(alloc::live_allocations(), before);
    }
}
