//! Boxing host data into native objects and viewing objects as slices

use std::ffi::{c_char, c_void};

use opal_core::{AnyObject, OpalError, Type};

use crate::alloc;
use crate::error::{Fallible, FfiError};
use crate::types::{FfiPayload, FfiResult, FfiSlice};
use crate::util::{self, entry};

/// Owned view returned by `data__object_as_slice`.
///
/// `slice` is first so a pointer to the holder is a pointer to the slice.
/// The auxiliary buffers back `slice.ptr` for tuples and string vectors.
#[repr(C)]
struct SliceHolder {
    slice: FfiSlice,
    elements: Vec<FfiSlice>,
    members: Vec<*const AnyObject>,
}

unsafe fn scalar<T: Copy>(slice: &FfiSlice) -> Fallible<T> {
    if slice.len != 1 {
        return Err(OpalError::InvalidArgument(format!(
            "scalar slices hold one value, got {}",
            slice.len
        ))
        .into());
    }
    if slice.ptr.is_null() {
        return Err(FfiError::NullPointer("slice"));
    }
    Ok(*(slice.ptr as *const T))
}

unsafe fn values<T: Clone>(slice: &FfiSlice) -> Fallible<Vec<T>> {
    if slice.len == 0 {
        return Ok(Vec::new());
    }
    if slice.ptr.is_null() {
        return Err(FfiError::NullPointer("slice"));
    }
    Ok(std::slice::from_raw_parts(slice.ptr as *const T, slice.len).to_vec())
}

unsafe fn string(slice: &FfiSlice) -> Fallible<String> {
    let bytes = values::<u8>(slice)?;
    String::from_utf8(bytes).map_err(|_| FfiError::Utf8("string slice"))
}

/// Build an owned object of type `ty` from the caller's memory
unsafe fn slice_to_object(slice: &FfiSlice, ty: &Type) -> Fallible<AnyObject> {
    Ok(match ty {
        Type::Bool => AnyObject::Bool(scalar::<u8>(slice)? != 0),
        Type::I32 => AnyObject::I32(scalar(slice)?),
        Type::I64 => AnyObject::I64(scalar(slice)?),
        Type::U32 => AnyObject::U32(scalar(slice)?),
        Type::U64 => AnyObject::U64(scalar(slice)?),
        Type::F32 => AnyObject::F32(scalar(slice)?),
        Type::F64 => AnyObject::F64(scalar(slice)?),
        Type::String => AnyObject::String(string(slice)?),
        Type::Tuple(items) => {
            if slice.len != items.len() {
                return Err(OpalError::InvalidArgument(format!(
                    "{} expects {} components, got {}",
                    ty,
                    items.len(),
                    slice.len
                ))
                .into());
            }
            let parts = values::<*const FfiSlice>(slice)?;
            let mut objects = Vec::with_capacity(parts.len());
            for (part, item) in parts.iter().zip(items) {
                if part.is_null() {
                    return Err(FfiError::NullPointer("tuple component"));
                }
                objects.push(slice_to_object(&**part, item)?);
            }
            AnyObject::Tuple(objects)
        }
        other => match other.element() {
            Some(Type::Bool) => {
                AnyObject::VecBool(values::<u8>(slice)?.into_iter().map(|b| b != 0).collect())
            }
            Some(Type::I32) => AnyObject::VecI32(values(slice)?),
            Some(Type::I64) => AnyObject::VecI64(values(slice)?),
            Some(Type::U32) => AnyObject::VecU32(values(slice)?),
            Some(Type::U64) => AnyObject::VecU64(values(slice)?),
            Some(Type::F32) => AnyObject::VecF32(values(slice)?),
            Some(Type::F64) => AnyObject::VecF64(values(slice)?),
            Some(Type::String) => {
                let parts = values::<FfiSlice>(slice)?;
                AnyObject::VecString(parts.iter().map(|p| string(p)).collect::<Fallible<_>>()?)
            }
            _ => {
                let message = format!("cannot box values of type {}", ty);
                return Err(OpalError::NotImplemented(message).into());
            }
        },
    })
}

fn view<T>(value: &T) -> FfiSlice {
    FfiSlice::new(value as *const T as *const c_void, 1)
}

fn view_vec<T>(values: &[T]) -> FfiSlice {
    FfiSlice::new(values.as_ptr() as *const c_void, values.len())
}

/// Borrowing view of an object's memory
fn object_to_holder(obj: &AnyObject) -> Fallible<SliceHolder> {
    let mut holder = SliceHolder {
        slice: FfiSlice::new(std::ptr::null(), 0),
        elements: Vec::new(),
        members: Vec::new(),
    };
    holder.slice = match obj {
        AnyObject::Bool(v) => view(v),
        AnyObject::I32(v) => view(v),
        AnyObject::I64(v) => view(v),
        AnyObject::U32(v) => view(v),
        AnyObject::U64(v) => view(v),
        AnyObject::F32(v) => view(v),
        AnyObject::F64(v) => view(v),
        AnyObject::String(v) => view_vec(v.as_bytes()),
        AnyObject::VecBool(v) => view_vec(v),
        AnyObject::VecI32(v) => view_vec(v),
        AnyObject::VecI64(v) => view_vec(v),
        AnyObject::VecU32(v) => view_vec(v),
        AnyObject::VecU64(v) => view_vec(v),
        AnyObject::VecF32(v) => view_vec(v),
        AnyObject::VecF64(v) => view_vec(v),
        AnyObject::VecString(v) => {
            holder.elements = v.iter().map(|s| view_vec(s.as_bytes())).collect();
            view_vec(&holder.elements)
        }
        AnyObject::Tuple(items) => {
            holder.members = items.iter().map(|item| item as *const AnyObject).collect();
            view_vec(&holder.members)
        }
        AnyObject::Curve(_) => {
            return Err(OpalError::FailedCast(
                "privacy curves have no slice view, evaluate them with core__curve_epsilon".into(),
            )
            .into())
        }
    };
    Ok(holder)
}

/// `data__slice_as_object<T>(slice)`: copy caller memory into a new object
pub unsafe extern "C" fn slice_as_object(
    type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let ty = util::type_args(type_args, 1)?.remove(0);
        let args = util::args(args, len, 1)?;
        let slice = util::as_ref::<FfiSlice>(&args[0], "slice")?;
        Ok(util::boxed(slice_to_object(slice, &ty)?))
    })
}

/// `data__object_type(object)`: descriptor of the object, as an owned string
pub unsafe extern "C" fn object_type(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        let obj = util::as_ref::<AnyObject>(&args[0], "object")?;
        Ok(util::c_str(&obj.type_().to_string()))
    })
}

/// `data__to_string(object)`: display form of the object, as an owned string
pub unsafe extern "C" fn object_to_string(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        let obj = util::as_ref::<AnyObject>(&args[0], "object")?;
        Ok(util::c_str(&obj.to_string()))
    })
}

/// `data__object_as_slice(object)`: view borrowing the object's memory.
///
/// Tuples view as an array of component object pointers, string vectors
/// as an array of byte slices. Free the view with `data__slice_free`
/// before freeing the object.
pub unsafe extern "C" fn object_as_slice(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        let obj = util::as_ref::<AnyObject>(&args[0], "object")?;
        Ok(util::boxed(object_to_holder(obj)?))
    })
}

/// `data__slice_free(slice)`
pub unsafe extern "C" fn slice_free(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        drop(util::reclaim::<SliceHolder>(&args[0], "slice")?);
        Ok(FfiPayload::null())
    })
}

/// `data__object_free(object)`
pub unsafe extern "C" fn object_free(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        drop(util::reclaim::<AnyObject>(&args[0], "object")?);
        Ok(FfiPayload::null())
    })
}

/// `data__str_free(string)`
pub unsafe extern "C" fn str_free(
    _type_args: *const c_char,
    args: *const FfiPayload,
    len: usize,
) -> FfiResult {
    entry(|| {
        let args = util::args(args, len, 1)?;
        let ptr = args[0].ptr as *mut c_char;
        if ptr.is_null() {
            return Err(FfiError::NullPointer("string"));
        }
        drop(alloc::string_from_raw(ptr));
        Ok(FfiPayload::null())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    unsafe fn boxed_object(ty: &str, slice: &FfiSlice) -> *mut AnyObject {
        let blob = CString::new(format!("<{}>", ty)).unwrap();
        let args = [FfiPayload::ptr(slice)];
        let result = slice_as_object(blob.as_ptr(), args.as_ptr(), 1);
        assert!(result.is_ok());
        result.payload.ptr as *mut AnyObject
    }

    unsafe fn free(entry: crate::RawEntry, ptr: *const c_void) {
        let args = [FfiPayload::ptr(ptr)];
        assert!(entry(std::ptr::null(), args.as_ptr(), 1).is_ok());
    }

    #[test]
    fn test_box_vector_and_view_it() {
        let before = alloc::live_allocations();
        let data = [1.0_f64, 2.0, 3.0];
        unsafe {
            let obj = boxed_object("Vec<f64>", &view_vec(&data));
            assert_eq!(*obj, AnyObject::VecF64(vec![1.0, 2.0, 3.0]));

            let args = [FfiPayload::ptr(obj)];
            let ty = object_type(std::ptr::null(), args.as_ptr(), 1);
            let text = CStr::from_ptr(ty.payload.ptr as *const c_char);
            assert_eq!(text.to_str().unwrap(), "Vec<f64>");
            free(str_free, ty.payload.ptr);

            let rendered = object_to_string(std::ptr::null(), args.as_ptr(), 1);
            let text = CStr::from_ptr(rendered.payload.ptr as *const c_char);
            assert_eq!(text.to_str().unwrap(), "[1.0, 2.0, 3.0]");
            free(str_free, rendered.payload.ptr);

            let view = object_as_slice(std::ptr::null(), args.as_ptr(), 1);
            let slice = &*(view.payload.ptr as *const FfiSlice);
            assert_eq!(std::slice::from_raw_parts(slice.ptr as *const f64, slice.len), &data);
            free(slice_free, view.payload.ptr);
            free(object_free, obj as *const c_void);
        }
        assert_eq!(alloc::live_allocations(), before);
    }

    #[test]
    fn test_box_tuple_and_strings() {
        let epsilon = 1.5_f64;
        let count = 7_u32;
        let epsilon_slice = view(&epsilon);
        let count_slice = view(&count);
        let parts = [&epsilon_slice as *const FfiSlice, &count_slice as *const FfiSlice];
        let words = ["ab", "c"];
        let word_slices: Vec<FfiSlice> = words.iter().map(|w| view_vec(w.as_bytes())).collect();
        unsafe {
            let tuple = boxed_object("(f64,u32)", &view_vec(&parts));
            assert_eq!(
                *tuple,
                AnyObject::Tuple(vec![AnyObject::F64(1.5), AnyObject::U32(7)])
            );
            free(object_free, tuple as *const c_void);

            let strings = boxed_object("Vec<String>", &view_vec(&word_slices));
            assert_eq!(*strings, AnyObject::VecString(vec!["ab".into(), "c".into()]));
            free(object_free, strings as *const c_void);
        }
    }

    #[test]
    fn test_box_rejects_bad_shapes() {
        let value = 1.0_f64;
        let value_slice = view(&value);
        let parts = [&value_slice as *const FfiSlice];
        let blob = CString::new("<(f64,f64)>").unwrap();
        let slice = view_vec(&parts);
        let args = [FfiPayload::ptr(&slice)];
        let result = unsafe { slice_as_object(blob.as_ptr(), args.as_ptr(), 1) };
        assert!(!result.is_ok());
        unsafe { crate::opal_string_free(result.error) };

        let blob = CString::new("<Vec<Vec<f64>>>").unwrap();
        let result = unsafe { slice_as_object(blob.as_ptr(), args.as_ptr(), 1) };
        assert_eq!(result.status, crate::FfiStatus::Unimplemented as i32);
        unsafe { crate::opal_string_free(result.error) };
    }
}
