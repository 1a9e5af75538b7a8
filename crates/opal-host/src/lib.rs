//! OPAL Host - Dynamically-typed API over the native boundary
//!
//! This crate is what a host environment programs against:
//! - Type descriptor resolution from host values and hints
//! - Marshalling of host values into call frames and back
//! - Dispatch to monomorphized native entry points by symbol
//! - Owned handle trees with deterministic post-order release
//! - Transformations and Measurements, chaining and combinators
//!
//! ```no_run
//! use opal_host::{Features, Hints, Library};
//!
//! let lib = Library::new(Features::all());
//! let mean = lib.make_bounded_mean(0.0, 10.0, 10, &Hints::new())?;
//! let laplace = lib.make_base_laplace(0.5, &Hints::new())?;
//! let measurement = lib.chain_mt(mean, laplace)?;
//! assert!(measurement.check(1, 1.0)?);
//! # Ok::<(), opal_host::HostError>(())
//! ```

pub mod error;
pub mod value;
pub mod features;
pub mod resolve;
pub mod catalog;
pub mod marshal;
pub mod dispatch;
pub mod envelope;
pub mod handle;
pub mod entity;
pub mod comb;
pub mod library;

pub use error::*;
pub use value::{HostType, HostValue};
pub use features::{Features, CONTRIB, FLOATING_POINT};
pub use resolve::{Hints, TypeHint};
pub use handle::{Handle, HandleKind};
pub use entity::{Curve, Descriptors, Entity, Measurement, Transformation};
pub use comb::CompositionPolicy;
pub use library::Library;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
