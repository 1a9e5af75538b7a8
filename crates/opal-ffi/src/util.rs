//! Helpers shared by entry point bodies

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

use opal_core::{OpalError, Type};

use crate::alloc;
use crate::error::{Fallible, FfiError, FfiStatus};
use crate::types::{FfiPayload, FfiResult};

/// Run an entry point body, turning errors and panics into an envelope
pub(crate) fn entry(body: impl FnOnce() -> Fallible<FfiPayload>) -> FfiResult {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => FfiResult::from_fallible(result),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            FfiResult::err(FfiStatus::Internal, &FfiError::Panic(message).to_string())
        }
    }
}

/// View the argument array, checking its length
pub(crate) unsafe fn args<'a>(
    args: *const FfiPayload,
    len: usize,
    expected: usize,
) -> Fallible<&'a [FfiPayload]> {
    if len != expected {
        return Err(FfiError::Arity { expected, got: len });
    }
    if len == 0 {
        return Ok(&[]);
    }
    if args.is_null() {
        return Err(FfiError::NullPointer("args"));
    }
    Ok(std::slice::from_raw_parts(args, len))
}

/// Parse the type-argument blob, checking the number of arguments
pub(crate) unsafe fn type_args(blob: *const c_char, expected: usize) -> Fallible<Vec<Type>> {
    let text = if blob.is_null() {
        ""
    } else {
        CStr::from_ptr(blob)
            .to_str()
            .map_err(|_| FfiError::Utf8("type arguments"))?
    };
    let parsed = Type::parse_args(text)?;
    if parsed.len() != expected {
        return Err(FfiError::TypeArity {
            expected,
            got: parsed.len(),
        });
    }
    Ok(parsed)
}

/// Check that the blob names exactly the instantiation of this entry
pub(crate) unsafe fn expect_type_args(blob: *const c_char, expected: &[Type]) -> Fallible<()> {
    let parsed = type_args(blob, expected.len())?;
    if parsed != expected {
        return Err(OpalError::NotImplemented(format!(
            "entry for {} called with {}",
            Type::args_blob(expected),
            Type::args_blob(&parsed)
        ))
        .into());
    }
    Ok(())
}

/// Borrow the value behind a pointer argument
pub(crate) unsafe fn as_ref<'a, T>(payload: &FfiPayload, what: &'static str) -> Fallible<&'a T> {
    let ptr = payload.ptr as *const T;
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    Ok(&*ptr)
}

/// Read a scalar passed by address
pub(crate) unsafe fn read<T: Copy>(payload: &FfiPayload, what: &'static str) -> Fallible<T> {
    Ok(*as_ref::<T>(payload, what)?)
}

pub(crate) fn boxed<T>(value: T) -> FfiPayload {
    FfiPayload::ptr(alloc::into_raw(value))
}

/// Reclaim a boxed argument owned by the caller
pub(crate) unsafe fn reclaim<T>(payload: &FfiPayload, what: &'static str) -> Fallible<Box<T>> {
    let ptr = payload.ptr as *mut T;
    if ptr.is_null() {
        return Err(FfiError::NullPointer(what));
    }
    Ok(alloc::from_raw(ptr))
}

pub(crate) fn c_str(s: &str) -> FfiPayload {
    FfiPayload::ptr(alloc::string_into_raw(s) as *const c_void)
}
