//! Value marshalling across the boundary
//!
//! Arguments are encoded into a [`CallFrame`], which owns every buffer,
//! scalar slot and temporary native object the payloads point into. The
//! frame must outlive the call and is dropped right after it; native
//! entry points copy what they keep.

use std::ffi::c_void;

use opal_core::Type;
use opal_ffi::{FfiPayload, FfiSlice};

use crate::catalog::{Param, Passing, ReturnKind};
use crate::dispatch;
use crate::envelope::handle_result;
use crate::handle::Handle;
use crate::resolve::{template, Bindings};
use crate::{HostError, HostResult, HostValue};

const SLICE_AS_OBJECT: &str = "data__slice_as_object";
const OBJECT_TYPE: &str = "data__object_type";
const OBJECT_AS_SLICE: &str = "data__object_as_slice";

/// One argument of a dispatch
#[derive(Debug)]
pub enum Arg<'a> {
    Value(HostValue),
    Handle(&'a Handle),
    Handles(Vec<&'a Handle>),
}

impl Arg<'_> {
    fn describe(&self) -> String {
        match self {
            Arg::Value(value) => format!("value {}", value),
            Arg::Handle(handle) => format!("{:?} handle", handle.kind()),
            Arg::Handles(handles) => format!("{} handles", handles.len()),
        }
    }
}

/// Scalar storage whose address is passed for by-reference parameters
#[repr(C)]
union ScalarSlot {
    boolean: u8,
    int32: i32,
    int64: i64,
    uint32: u32,
    uint64: u64,
    float32: f32,
    float64: f64,
}

/// Memory backing an [`FfiSlice`]
enum Buffer {
    Bytes(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Slices(Vec<FfiSlice>),
    Pointers(Vec<*const c_void>),
}

fn view<T>(values: &[T]) -> FfiSlice {
    FfiSlice::new(values.as_ptr() as *const c_void, values.len())
}

impl Buffer {
    fn slice(&self) -> FfiSlice {
        match self {
            Buffer::Bytes(v) => view(v),
            Buffer::I32(v) => view(v),
            Buffer::I64(v) => view(v),
            Buffer::U32(v) => view(v),
            Buffer::U64(v) => view(v),
            Buffer::F32(v) => view(v),
            Buffer::F64(v) => view(v),
            Buffer::Slices(v) => view(v),
            Buffer::Pointers(v) => view(v),
        }
    }
}

fn mismatch(value: &HostValue, ty: &Type) -> HostError {
    HostError::Marshal(format!("cannot marshal {} as {}", value, ty))
}

fn boolean(value: &HostValue, ty: &Type) -> HostResult<bool> {
    value.as_bool().ok_or_else(|| mismatch(value, ty))
}

fn integer<T: TryFrom<i64>>(value: &HostValue, ty: &Type) -> HostResult<T> {
    let int = value.as_int().ok_or_else(|| mismatch(value, ty))?;
    T::try_from(int).map_err(|_| HostError::Marshal(format!("{} is out of range for {}", int, ty)))
}

fn float(value: &HostValue, ty: &Type) -> HostResult<f64> {
    value.as_float().ok_or_else(|| mismatch(value, ty))
}

fn string<'v>(value: &'v HostValue, ty: &Type) -> HostResult<&'v str> {
    value.as_str().ok_or_else(|| mismatch(value, ty))
}

fn collect<T>(
    items: &[HostValue],
    element: &Type,
    convert: impl Fn(&HostValue, &Type) -> HostResult<T>,
) -> HostResult<Vec<T>> {
    items.iter().map(|item| convert(item, element)).collect()
}

/// Encode a scalar for by-value passing
pub fn encode(value: &HostValue, ty: &Type) -> HostResult<FfiPayload> {
    Ok(match ty {
        Type::Bool => FfiPayload::boolean(boolean(value, ty)?),
        Type::I32 => FfiPayload::int(integer::<i32>(value, ty)? as i64),
        Type::I64 => FfiPayload::int(integer(value, ty)?),
        Type::U32 => FfiPayload::uint(integer::<u32>(value, ty)? as u64),
        Type::U64 => FfiPayload::uint(integer(value, ty)?),
        Type::F32 | Type::F64 => FfiPayload::float(float(value, ty)?),
        other => {
            return Err(HostError::Marshal(format!(
                "{} cannot be passed by value",
                other
            )))
        }
    })
}

/// Decode a scalar returned by value
pub fn decode(payload: FfiPayload, ty: &Type) -> HostResult<HostValue> {
    // SAFETY: every view of the union is a plain integer or float; the
    // descriptor says which one the callee wrote.
    unsafe {
        Ok(match ty {
            Type::Bool => HostValue::Bool(payload.boolean != 0),
            Type::I32 | Type::I64 => HostValue::Int(payload.int),
            Type::U32 | Type::U64 => HostValue::Int(unsigned(payload.uint)?),
            Type::F32 | Type::F64 => HostValue::Float(payload.float),
            other => {
                return Err(HostError::Marshal(format!(
                    "{} is not returned by value",
                    other
                )))
            }
        })
    }
}

fn unsigned(value: u64) -> HostResult<i64> {
    i64::try_from(value)
        .map_err(|_| HostError::Marshal(format!("{} overflows a host integer", value)))
}

fn scalar_slot(value: &HostValue, ty: &Type) -> HostResult<ScalarSlot> {
    Ok(match ty {
        Type::Bool => ScalarSlot {
            boolean: boolean(value, ty)? as u8,
        },
        Type::I32 => ScalarSlot {
            int32: integer(value, ty)?,
        },
        Type::I64 => ScalarSlot {
            int64: integer(value, ty)?,
        },
        Type::U32 => ScalarSlot {
            uint32: integer(value, ty)?,
        },
        Type::U64 => ScalarSlot {
            uint64: integer(value, ty)?,
        },
        Type::F32 => ScalarSlot {
            float32: float(value, ty)? as f32,
        },
        Type::F64 => ScalarSlot {
            float64: float(value, ty)?,
        },
        other => {
            return Err(HostError::Marshal(format!(
                "{} cannot be passed by reference",
                other
            )))
        }
    })
}

/// Storage for the arguments of one native call
#[derive(Default)]
pub struct CallFrame {
    payloads: Vec<FfiPayload>,
    slots: Vec<Box<ScalarSlot>>,
    buffers: Vec<Buffer>,
    slices: Vec<Box<FfiSlice>>,
    temporaries: Vec<Handle>,
}

impl CallFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> &[FfiPayload] {
        &self.payloads
    }

    /// Encode `arg` as declared by `param`
    pub fn push(&mut self, param: &Param, arg: Arg<'_>, bindings: &Bindings) -> HostResult<()> {
        let payload = match (param.passing, arg) {
            (Passing::ByValue, Arg::Value(value)) => {
                encode(&value, &template(param.descriptor, bindings)?)?
            }
            (Passing::ByRef, Arg::Value(value)) => {
                let slot = Box::new(scalar_slot(&value, &template(param.descriptor, bindings)?)?);
                let payload = FfiPayload::ptr(&*slot as *const ScalarSlot);
                self.slots.push(slot);
                payload
            }
            (Passing::Object, Arg::Value(value)) => {
                let ty = template(param.descriptor, bindings)?;
                FfiPayload::ptr(self.box_object(&value, &ty)?)
            }
            (Passing::Handle, Arg::Handle(handle)) => FfiPayload::ptr(handle.as_ptr()),
            (Passing::HandleList, Arg::Handles(handles)) => {
                let pointers = handles.iter().map(|h| h.as_ptr()).collect();
                let slice = self.keep(Buffer::Pointers(pointers));
                self.boxed_slice(slice)
            }
            (passing, arg) => {
                return Err(HostError::Marshal(format!(
                    "{} is passed {:?}, got {}",
                    param.name,
                    passing,
                    arg.describe()
                )))
            }
        };
        self.payloads.push(payload);
        Ok(())
    }

    fn keep(&mut self, buffer: Buffer) -> FfiSlice {
        let slice = buffer.slice();
        self.buffers.push(buffer);
        slice
    }

    fn boxed_slice(&mut self, slice: FfiSlice) -> FfiPayload {
        let slice = Box::new(slice);
        let payload = FfiPayload::ptr(&*slice as *const FfiSlice);
        self.slices.push(slice);
        payload
    }

    /// Lay out `value` in frame-owned memory as the native side expects `ty`
    fn encode_slice(&mut self, value: &HostValue, ty: &Type) -> HostResult<FfiSlice> {
        let buffer = match ty {
            Type::Bool => Buffer::Bytes(vec![boolean(value, ty)? as u8]),
            Type::I32 => Buffer::I32(vec![integer(value, ty)?]),
            Type::I64 => Buffer::I64(vec![integer(value, ty)?]),
            Type::U32 => Buffer::U32(vec![integer(value, ty)?]),
            Type::U64 => Buffer::U64(vec![integer(value, ty)?]),
            Type::F32 => Buffer::F32(vec![float(value, ty)? as f32]),
            Type::F64 => Buffer::F64(vec![float(value, ty)?]),
            Type::String => Buffer::Bytes(string(value, ty)?.as_bytes().to_vec()),
            Type::Tuple(items) => {
                let parts = value.as_tuple().ok_or_else(|| mismatch(value, ty))?;
                if parts.len() != items.len() {
                    return Err(HostError::Marshal(format!(
                        "{} has {} components, {} expects {}",
                        value,
                        parts.len(),
                        ty,
                        items.len()
                    )));
                }
                let mut pointers = Vec::with_capacity(parts.len());
                for (part, item) in parts.iter().zip(items) {
                    let slice = Box::new(self.encode_slice(part, item)?);
                    pointers.push(&*slice as *const FfiSlice as *const c_void);
                    self.slices.push(slice);
                }
                Buffer::Pointers(pointers)
            }
            _ => {
                let element = ty.element().ok_or_else(|| {
                    HostError::UnsupportedType(format!(
                        "values of type {} cannot be marshalled",
                        ty
                    ))
                })?;
                let items = value.as_list().ok_or_else(|| mismatch(value, ty))?;
                self.encode_list(items, element)?
            }
        };
        Ok(self.keep(buffer))
    }

    fn encode_list(&mut self, items: &[HostValue], element: &Type) -> HostResult<Buffer> {
        Ok(match element {
            Type::Bool => {
                Buffer::Bytes(collect(items, element, |v, t| boolean(v, t).map(u8::from))?)
            }
            Type::I32 => Buffer::I32(collect(items, element, integer)?),
            Type::I64 => Buffer::I64(collect(items, element, integer)?),
            Type::U32 => Buffer::U32(collect(items, element, integer)?),
            Type::U64 => Buffer::U64(collect(items, element, integer)?),
            Type::F32 => {
                Buffer::F32(collect(items, element, |v, t| float(v, t).map(|x| x as f32))?)
            }
            Type::F64 => Buffer::F64(collect(items, element, float)?),
            Type::String => {
                let mut slices = Vec::with_capacity(items.len());
                for item in items {
                    let bytes = string(item, element)?.as_bytes().to_vec();
                    slices.push(self.keep(Buffer::Bytes(bytes)));
                }
                Buffer::Slices(slices)
            }
            other => {
                return Err(HostError::UnsupportedType(format!(
                    "vectors of {} cannot be marshalled",
                    other
                )))
            }
        })
    }

    /// Box `value` into a native object owned by this frame
    fn box_object(&mut self, value: &HostValue, ty: &Type) -> HostResult<*const c_void> {
        let slice = self.encode_slice(value, ty)?;
        let payload = self.boxed_slice(slice);
        let blob = Type::args_blob(std::slice::from_ref(ty));
        let result = dispatch::invoke(SLICE_AS_OBJECT, &blob, &[payload])?;
        let object = handle_result(result, ReturnKind::Object)?.into_handle()?;
        let ptr = object.as_ptr();
        self.temporaries.push(object);
        Ok(ptr)
    }
}

/// Read a native object back into a host value. The object is borrowed.
pub fn decode_object(object: &Handle) -> HostResult<HostValue> {
    let result = dispatch::invoke(OBJECT_TYPE, "", &[FfiPayload::ptr(object.as_ptr())])?;
    let text = match handle_result(result, ReturnKind::Str)?.into_value()? {
        HostValue::Str(text) => text,
        other => {
            return Err(HostError::Marshal(format!(
                "expected a type descriptor, got {}",
                other
            )))
        }
    };
    let ty = Type::parse(&text).map_err(|e| HostError::UnsupportedType(e.to_string()))?;
    decode_member(object.as_ptr(), &ty)
}

fn decode_member(object: *const c_void, ty: &Type) -> HostResult<HostValue> {
    let result = dispatch::invoke(OBJECT_AS_SLICE, "", &[FfiPayload::ptr(object)])?;
    let view = handle_result(result, ReturnKind::View)?.into_handle()?;
    // SAFETY: the view points at a live `FfiSlice` that borrows `object`;
    // both outlive this read.
    unsafe { read_slice(&*(view.as_ptr() as *const FfiSlice), ty) }
}

unsafe fn values<'a, T>(slice: &FfiSlice) -> &'a [T] {
    if slice.len == 0 || slice.ptr.is_null() {
        return &[];
    }
    std::slice::from_raw_parts(slice.ptr as *const T, slice.len)
}

unsafe fn utf8(slice: &FfiSlice) -> HostResult<String> {
    String::from_utf8(values::<u8>(slice).to_vec())
        .map_err(|_| HostError::Marshal("native string is not valid UTF-8".into()))
}

unsafe fn read_slice(slice: &FfiSlice, ty: &Type) -> HostResult<HostValue> {
    match ty {
        Type::String => Ok(HostValue::Str(utf8(slice)?)),
        Type::Tuple(items) => {
            let members = values::<*const c_void>(slice);
            if members.len() != items.len() {
                return Err(HostError::Marshal(format!(
                    "{} viewed with {} components",
                    ty,
                    members.len()
                )));
            }
            members
                .iter()
                .zip(items)
                .map(|(member, item)| decode_member(*member, item))
                .collect::<HostResult<_>>()
                .map(HostValue::Tuple)
        }
        _ if ty.is_primitive() => read_list(slice, ty)?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::Marshal(format!("empty view of a {}", ty))),
        _ => match ty.element() {
            Some(element) => Ok(HostValue::List(read_list(slice, element)?)),
            None => Err(HostError::UnsupportedType(format!("cannot decode values of type {}", ty))),
        },
    }
}

unsafe fn read_list(slice: &FfiSlice, element: &Type) -> HostResult<Vec<HostValue>> {
    Ok(match element {
        Type::Bool => values::<u8>(slice).iter().map(|&b| HostValue::Bool(b != 0)).collect(),
        Type::I32 => values::<i32>(slice).iter().map(|&v| HostValue::Int(v as i64)).collect(),
        Type::I64 => values::<i64>(slice).iter().map(|&v| HostValue::Int(v)).collect(),
        Type::U32 => values::<u32>(slice).iter().map(|&v| HostValue::Int(v as i64)).collect(),
        Type::U64 => values::<u64>(slice)
            .iter()
            .map(|&v| unsigned(v).map(HostValue::Int))
            .collect::<HostResult<_>>()?,
        Type::F32 => values::<f32>(slice).iter().map(|&v| HostValue::Float(v as f64)).collect(),
        Type::F64 => values::<f64>(slice).iter().map(|&v| HostValue::Float(v)).collect(),
        Type::String => values::<FfiSlice>(slice)
            .iter()
            .map(|s| utf8(s).map(HostValue::Str))
            .collect::<HostResult<_>>()?,
        other => {
            return Err(HostError::UnsupportedType(format!(
                "cannot decode vectors of {}",
                other
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Param;

    const OBJECT: Param = Param {
        name: "value",
        descriptor: "T",
        passing: Passing::Object,
    };

    fn bound(ty: &str) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("T".into(), Type::parse(ty).unwrap());
        bindings
    }

    fn round_trip(value: HostValue, ty: &str) -> HostResult<HostValue> {
        let mut frame = CallFrame::new();
        frame.push(&OBJECT, Arg::Value(value), &bound(ty))?;
        let ptr = unsafe { frame.payloads()[0].ptr };
        let result = dispatch::invoke(OBJECT_TYPE, "", &[FfiPayload::ptr(ptr)])?;
        let text = handle_result(result, ReturnKind::Str)?.into_value()?;
        assert_eq!(text, HostValue::Str(Type::parse(ty).unwrap().to_string()));
        let ty = Type::parse(ty).unwrap();
        decode_member(ptr, &ty)
    }

    #[test]
    fn test_scalar_payloads() {
        let payload = encode(&HostValue::Int(7), &Type::U32).unwrap();
        assert_eq!(payload.bits(), 7);
        assert_eq!(decode(payload, &Type::U32).unwrap(), HostValue::Int(7));
        assert_eq!(
            decode(encode(&HostValue::Int(2), &Type::F64).unwrap(), &Type::F64).unwrap(),
            HostValue::Float(2.0)
        );
        assert!(matches!(
            encode(&HostValue::Int(-1), &Type::U32),
            Err(HostError::Marshal(_))
        ));
        assert!(matches!(
            encode(&HostValue::Float(0.5), &Type::I32),
            Err(HostError::Marshal(_))
        ));
    }

    #[test]
    fn test_objects_round_trip() {
        let data = HostValue::from(vec![1.5, 2.5]);
        assert_eq!(round_trip(data.clone(), "Vec<f64>").unwrap(), data);

        let words = HostValue::from(vec!["a", "bc"]);
        assert_eq!(round_trip(words.clone(), "Vec<String>").unwrap(), words);

        let pair = HostValue::from((1.0, 1e-6));
        assert_eq!(round_trip(pair.clone(), "(f64,f64)").unwrap(), pair);

        assert_eq!(round_trip(HostValue::Int(3), "u32").unwrap(), HostValue::Int(3));
        assert_eq!(
            round_trip(HostValue::from(vec![true, false]), "Vec<bool>").unwrap(),
            HostValue::from(vec![true, false])
        );
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let triple = HostValue::Tuple(vec![1.0.into(), 2.0.into(), 3.0.into()]);
        let error = round_trip(triple, "(f64,f64)").unwrap_err();
        assert!(matches!(error, HostError::Marshal(_)));
    }

    #[test]
    fn test_frame_releases_temporaries() {
        let before = opal_ffi::alloc::live_allocations();
        {
            let mut frame = CallFrame::new();
            frame
                .push(&OBJECT, Arg::Value(HostValue::from(vec![1, 2, 3])), &bound("Vec<i32>"))
                .unwrap();
            assert_eq!(opal_ffi::alloc::live_allocations(), before + 1);
        }
        assert_eq!(opal_ffi::alloc::live_allocations(), before);
    }

    #[test]
    fn test_passing_mismatch() {
        let mut frame = CallFrame::new();
        let by_ref = Param {
            name: "scale",
            descriptor: "T",
            passing: Passing::ByRef,
        };
        let error = frame
            .push(&by_ref, Arg::Handles(vec![]), &bound("f64"))
            .unwrap_err();
        assert!(matches!(error, HostError::Marshal(_)));
        assert!(frame.payloads().is_empty());
    }
}
