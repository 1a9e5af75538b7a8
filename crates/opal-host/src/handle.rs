//! Owned native handles
//!
//! A handle owns one native allocation and the handles it was composed
//! from. Handles form a tree; releasing the root frees children first,
//! then the root itself, each exactly once.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use opal_ffi::FfiPayload;

use crate::catalog::ReturnKind;
use crate::dispatch;
use crate::envelope::handle_result;
use crate::{HostError, HostResult};

/// What a native pointer refers to, and so how it is freed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Transformation,
    Measurement,
    Object,
    /// Slice view borrowing an object
    View,
}

impl HandleKind {
    fn free_symbol(self) -> &'static str {
        match self {
            HandleKind::Transformation => "core__transformation_free",
            HandleKind::Measurement => "core__measurement_free",
            HandleKind::Object => "data__object_free",
            HandleKind::View => "data__slice_free",
        }
    }
}

pub struct Handle {
    ptr: NonNull<c_void>,
    kind: HandleKind,
    children: Vec<Handle>,
    released: bool,
}

// SAFETY: the native objects behind a handle are immutable and their
// closures are `Send + Sync`; the handle is the only owner.
unsafe impl Send for Handle {}

impl Handle {
    pub(crate) fn new(ptr: *const c_void, kind: HandleKind) -> HostResult<Self> {
        let ptr = NonNull::new(ptr as *mut c_void).ok_or_else(|| {
            HostError::Dispatch(format!("native call returned a null {:?}", kind))
        })?;
        Ok(Handle {
            ptr,
            kind,
            children: Vec::new(),
            released: false,
        })
    }

    /// Take ownership of the handles this one was built from
    pub(crate) fn adopt(&mut self, children: impl IntoIterator<Item = Handle>) {
        self.children.extend(children);
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.ptr.as_ptr()
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Native allocations owned by this tree, the root included
    pub fn allocation_count(&self) -> usize {
        1 + self.children.iter().map(Handle::allocation_count).sum::<usize>()
    }

    /// Free the whole tree in post-order; returns the number of
    /// allocations freed.
    pub fn release(mut self) -> HostResult<usize> {
        self.release_tree()
    }

    fn release_tree(&mut self) -> HostResult<usize> {
        let mut freed = 0;
        for child in std::mem::take(&mut self.children) {
            freed += child.release()?;
        }

        // never retried, even if the free fails
        self.released = true;
        let result = dispatch::invoke(
            self.kind.free_symbol(),
            "",
            &[FfiPayload::ptr(self.ptr.as_ptr())],
        )?;
        handle_result(result, ReturnKind::Unit)?;
        tracing::trace!(kind = ?self.kind, "released native allocation");
        Ok(freed + 1)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_tree() {
                tracing::warn!(error = %e, kind = ?self.kind, "failed to release native handle");
            }
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("ptr", &self.ptr)
            .field("children", &self.children.len())
            .finish()
    }
}
