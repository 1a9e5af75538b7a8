//! FFI Error handling

use std::ffi::{c_char, c_int, CString};

use opal_core::OpalError;
use thiserror::Error;

/// Status codes carried by every [`crate::FfiResult`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    /// Success
    Ok = 0,
    /// Invalid argument
    InvalidArgument = -1,
    /// Type descriptor could not be parsed
    TypeParse = -2,
    /// No instantiation for the requested descriptors
    Unimplemented = -3,
    /// Domains or metrics disagree at a composition boundary
    DomainMismatch = -4,
    /// Function evaluation failed
    FailedFunction = -5,
    /// Map evaluated outside its support
    FailedMap = -6,
    /// Transformation constructor rejected its arguments
    MakeTransformation = -7,
    /// Measurement constructor rejected its arguments
    MakeMeasurement = -8,
    /// Value has the wrong type
    FailedCast = -9,
    /// Null pointer argument
    NullPointer = -10,
    /// Internal error
    Internal = -99,
}

impl FfiStatus {
    pub fn from_code(code: c_int) -> Option<Self> {
        Some(match code {
            0 => FfiStatus::Ok,
            -1 => FfiStatus::InvalidArgument,
            -2 => FfiStatus::TypeParse,
            -3 => FfiStatus::Unimplemented,
            -4 => FfiStatus::DomainMismatch,
            -5 => FfiStatus::FailedFunction,
            -6 => FfiStatus::FailedMap,
            -7 => FfiStatus::MakeTransformation,
            -8 => FfiStatus::MakeMeasurement,
            -9 => FfiStatus::FailedCast,
            -10 => FfiStatus::NullPointer,
            -99 => FfiStatus::Internal,
            _ => return None,
        })
    }
}

impl From<FfiStatus> for c_int {
    fn from(status: FfiStatus) -> Self {
        status as c_int
    }
}

impl From<&OpalError> for FfiStatus {
    fn from(error: &OpalError) -> Self {
        match error {
            OpalError::TypeParse(_) => FfiStatus::TypeParse,
            OpalError::NotImplemented(_) => FfiStatus::Unimplemented,
            OpalError::DomainMismatch(_) => FfiStatus::DomainMismatch,
            OpalError::MakeTransformation(_) => FfiStatus::MakeTransformation,
            OpalError::MakeMeasurement(_) => FfiStatus::MakeMeasurement,
            OpalError::FailedFunction(_) => FfiStatus::FailedFunction,
            OpalError::FailedMap(_) => FfiStatus::FailedMap,
            OpalError::FailedCast(_) => FfiStatus::FailedCast,
            OpalError::InvalidArgument(_) => FfiStatus::InvalidArgument,
        }
    }
}

/// Errors raised while decoding a call at the boundary
#[derive(Error, Debug)]
pub enum FfiError {
    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("Invalid UTF-8 in {0}")]
    Utf8(&'static str),

    #[error("Expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("Expected {expected} type arguments, got {got}")]
    TypeArity { expected: usize, got: usize },

    #[error("{0}")]
    Core(#[from] OpalError),

    #[error("Native panic: {0}")]
    Panic(String),
}

impl FfiError {
    pub fn status(&self) -> FfiStatus {
        match self {
            FfiError::NullPointer(_) => FfiStatus::NullPointer,
            FfiError::Utf8(_) | FfiError::Arity { .. } => FfiStatus::InvalidArgument,
            FfiError::TypeArity { .. } => FfiStatus::TypeParse,
            FfiError::Core(e) => e.into(),
            FfiError::Panic(_) => FfiStatus::Internal,
        }
    }
}

/// Result type for entry point bodies
pub type Fallible<T> = Result<T, FfiError>;

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> =
        const { std::cell::RefCell::new(None) };
}

/// Set the last error message
pub fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Get the last error message
/// Returns NULL if no error
#[no_mangle]
pub extern "C" fn opal_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(s) => s.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Clear the last error
#[no_mangle]
pub extern "C" fn opal_clear_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_status_round_trip() {
        for status in [FfiStatus::Ok, FfiStatus::FailedMap, FfiStatus::Internal] {
            assert_eq!(FfiStatus::from_code(status.into()), Some(status));
        }
        assert_eq!(FfiStatus::from_code(7), None);
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let error = FfiError::from(OpalError::DomainMismatch("x".into()));
        assert_eq!(error.status(), FfiStatus::DomainMismatch);
        assert_eq!(error.to_string(), "Domain mismatch: x");
        assert_eq!(FfiError::NullPointer("arg").status(), FfiStatus::NullPointer);
    }

    #[test]
    fn test_last_error() {
        set_last_error("boom");
        let msg = unsafe { CStr::from_ptr(opal_get_last_error()) };
        assert_eq!(msg.to_str().unwrap(), "boom");
        opal_clear_error();
        assert!(opal_get_last_error().is_null());
    }
}
