//! OPAL Core - Composable privacy-preserving computations
//!
//! This crate is the native computation library behind the OPAL boundary:
//! - Type descriptors and type-erased values (Type, AnyObject)
//! - Domains, metrics and measures
//! - Transformations and Measurements with their stability/privacy maps
//! - Chaining and composition combinators
//! - Kernels monomorphized per carrier type

pub mod error;
pub mod types;
pub mod data;
pub mod traits;
pub mod dom;
pub mod dist;
pub mod core;
pub mod chain;
pub mod comb;
pub mod samplers;
pub mod trans;
pub mod meas;

pub use error::*;
pub use types::*;
pub use data::*;
pub use dom::Domain;
pub use dist::{Measure, Metric, SmdCurve};
pub use crate::core::{Function, Measurement, PrivacyMap, StabilityMap, Transformation};
pub use chain::{make_chain_mt, make_chain_tt};
pub use comb::{
    make_basic_composition, make_fix_delta, make_population_amplification, Additive, Advanced,
    CompositionRule,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
