//! Result envelope handling

use std::ffi::{c_char, CStr};

use opal_core::Type;
use opal_ffi::{FfiPayload, FfiResult, FfiStatus};

use crate::catalog::ReturnKind;
use crate::dispatch;
use crate::handle::{Handle, HandleKind};
use crate::marshal::{decode, decode_object};
use crate::{HostError, HostResult, HostValue};

const STR_FREE: &str = "data__str_free";

/// Successful outcome of a dispatch
#[derive(Debug)]
pub enum Returned {
    Handle(Handle),
    Value(HostValue),
    Unit,
}

impl Returned {
    pub fn into_handle(self) -> HostResult<Handle> {
        match self {
            Returned::Handle(handle) => Ok(handle),
            other => Err(HostError::Marshal(format!("expected a native handle, got {:?}", other))),
        }
    }

    pub fn into_value(self) -> HostResult<HostValue> {
        match self {
            Returned::Value(value) => Ok(value),
            other => Err(HostError::Marshal(format!("expected a host value, got {:?}", other))),
        }
    }
}

/// Interpret an envelope as declared by `kind`.
///
/// Failures carry the native code and message unchanged; the message
/// string is freed once copied.
pub fn handle_result(result: FfiResult, kind: ReturnKind) -> HostResult<Returned> {
    if !result.is_ok() {
        return Err(native_error(result));
    }
    let payload = result.payload;
    Ok(match kind {
        ReturnKind::Transformation => {
            Returned::Handle(handle(payload, HandleKind::Transformation)?)
        }
        ReturnKind::Measurement => Returned::Handle(handle(payload, HandleKind::Measurement)?),
        ReturnKind::Object => Returned::Handle(handle(payload, HandleKind::Object)?),
        ReturnKind::View => Returned::Handle(handle(payload, HandleKind::View)?),
        ReturnKind::Value => {
            let object = handle(payload, HandleKind::Object)?;
            Returned::Value(decode_object(&object)?)
        }
        ReturnKind::Bool => Returned::Value(decode(payload, &Type::Bool)?),
        ReturnKind::Float => Returned::Value(decode(payload, &Type::F64)?),
        ReturnKind::Str => Returned::Value(HostValue::Str(take_string(payload)?)),
        ReturnKind::Unit => Returned::Unit,
    })
}

fn handle(payload: FfiPayload, kind: HandleKind) -> HostResult<Handle> {
    // SAFETY: pointer-returning entries write the `ptr` view
    Handle::new(unsafe { payload.ptr }, kind)
}

fn native_error(result: FfiResult) -> HostError {
    let message = if result.error.is_null() {
        String::new()
    } else {
        // SAFETY: a failed envelope owns a nul-terminated message
        let message = unsafe { CStr::from_ptr(result.error) }.to_string_lossy().into_owned();
        unsafe { opal_ffi::opal_string_free(result.error) };
        message
    };
    tracing::debug!(code = result.status, error = %message, "native call reported failure");
    match FfiStatus::from_code(result.status) {
        Some(FfiStatus::DomainMismatch) => HostError::DomainMismatch(message),
        Some(FfiStatus::FailedMap) => HostError::Domain(message),
        _ => HostError::Native {
            code: result.status,
            message,
        },
    }
}

/// Copy an owned native string and free it
fn take_string(payload: FfiPayload) -> HostResult<String> {
    // SAFETY: string-returning entries write the `ptr` view
    let ptr = unsafe { payload.ptr } as *const c_char;
    if ptr.is_null() {
        return Err(HostError::Marshal("native call returned a null string".into()));
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    handle_result(dispatch::invoke(STR_FREE, "", &[payload])?, ReturnKind::Unit)?;
    Ok(text)
}
