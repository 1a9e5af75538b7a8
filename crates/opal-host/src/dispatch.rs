//! Dispatch table
//!
//! Every native instantiation is reached through its canonical symbol.
//! A dispatch performs exactly one foreign call and is never retried: the
//! call may already have allocated native memory.

use std::ffi::CString;

use opal_core::{symbol_name, Type};
use opal_ffi::{FfiPayload, FfiResult};

use crate::catalog::Signature;
use crate::envelope::{handle_result, Returned};
use crate::marshal::{Arg, CallFrame};
use crate::resolve::Bindings;
use crate::{Features, HostError, HostResult};

/// `module__operation[__descriptor...]`
pub fn build_symbol(module: &str, operation: &str, descriptors: &[Type]) -> String {
    symbol_name(module, operation, descriptors)
}

/// Call the entry point behind `symbol` once and hand back its envelope
pub fn invoke(symbol: &str, type_arg_blob: &str, args: &[FfiPayload]) -> HostResult<FfiResult> {
    let entry = opal_ffi::lookup(symbol)
        .ok_or_else(|| HostError::Dispatch(format!("no native instantiation named {}", symbol)))?;
    let blob = CString::new(type_arg_blob).map_err(|_| {
        HostError::Marshal(format!("type arguments {:?} contain a nul byte", type_arg_blob))
    })?;
    tracing::trace!(symbol, type_args = type_arg_blob, args = args.len(), "native call");
    // SAFETY: `args` and `blob` outlive the call and every entry reads at
    // most `args.len()` payloads.
    Ok(unsafe { entry(blob.as_ptr(), args.as_ptr(), args.len()) })
}

/// Dispatches catalog operations under a fixed feature set
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    features: Features,
}

impl Dispatcher {
    pub fn new(features: Features) -> Self {
        Dispatcher { features }
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    /// Type arguments of `signature` under `bindings`
    pub fn type_args(&self, signature: &Signature, bindings: &Bindings) -> HostResult<Vec<Type>> {
        signature
            .type_params
            .iter()
            .map(|name| {
                bindings.get(*name).cloned().ok_or_else(|| {
                    HostError::UnsupportedType(format!(
                        "type argument {} of {} is unbound",
                        name,
                        signature.qualified_name()
                    ))
                })
            })
            .collect()
    }

    /// Symbol of `signature` instantiated at `type_args`
    pub fn symbol(&self, signature: &Signature, type_args: &[Type]) -> String {
        let descriptors = if signature.monomorphized { type_args } else { &[] };
        build_symbol(signature.module, signature.name, descriptors)
    }

    /// Marshal `args`, call the instantiation selected by `bindings` and
    /// interpret the envelope.
    pub fn call(
        &self,
        signature: &Signature,
        bindings: &Bindings,
        args: Vec<Arg<'_>>,
    ) -> HostResult<Returned> {
        let operation = signature.qualified_name();
        self.features.require(signature.features, &operation)?;
        if args.len() != signature.params.len() {
            return Err(HostError::Marshal(format!(
                "{} expects {} arguments, got {}",
                operation,
                signature.params.len(),
                args.len()
            )));
        }

        let type_args = self.type_args(signature, bindings)?;
        let symbol = self.symbol(signature, &type_args);
        let mut frame = CallFrame::new();
        for (param, arg) in signature.params.iter().zip(args) {
            frame.push(param, arg, bindings)?;
        }

        tracing::debug!(symbol = %symbol, "dispatching");
        let result = invoke(&symbol, &Type::args_blob(&type_args), frame.payloads())?;
        let returned = handle_result(result, signature.returns);
        drop(frame);
        returned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::features::FLOATING_POINT;
    use crate::HostValue;

    fn bindings(pairs: &[(&str, Type)]) -> Bindings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_build_symbol() {
        let mean = build_symbol(
            "trans",
            "make_bounded_mean",
            &[Type::named("SymmetricDistance"), Type::parse("L1Sensitivity<f64>").unwrap()],
        );
        assert_eq!(mean, "trans__make_bounded_mean__SymmetricDistance__L1Sensitivity<f64>");
        assert_eq!(build_symbol("core", "make_chain_mt", &[]), "core__make_chain_mt");
    }

    #[test]
    fn test_unknown_symbol() {
        let error = invoke("meas__make_base_laplace__i32", "<i32>", &[]).unwrap_err();
        assert!(matches!(error, HostError::Dispatch(_)));
    }

    #[test]
    fn test_feature_gate_runs_before_marshalling() {
        let dispatcher = Dispatcher::new(Features::new());
        let error = dispatcher
            .call(&catalog::MAKE_BASE_LAPLACE, &Bindings::new(), vec![])
            .unwrap_err();
        assert!(matches!(error, HostError::FeatureDisabled { .. }));
    }

    #[test]
    fn test_call_checks_arity() {
        let dispatcher = Dispatcher::new(Features::new().enable([FLOATING_POINT]));
        let b = bindings(&[("T", Type::F64)]);
        let error = dispatcher.call(&catalog::MAKE_BASE_LAPLACE, &b, vec![]).unwrap_err();
        assert!(matches!(error, HostError::Marshal(_)));

        let made = dispatcher
            .call(&catalog::MAKE_BASE_LAPLACE, &b, vec![Arg::Value(HostValue::Float(1.0))])
            .unwrap();
        assert!(made.into_handle().is_ok());
    }

    #[test]
    fn test_unbound_type_argument() {
        let dispatcher = Dispatcher::new(Features::all());
        let error = dispatcher
            .call(&catalog::MAKE_BASE_LAPLACE, &Bindings::new(), vec![Arg::Value(1.0.into())])
            .unwrap_err();
        assert!(matches!(error, HostError::UnsupportedType(_)));
    }
}
