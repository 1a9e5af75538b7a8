//! Error types for the host side of the boundary

use std::fmt;

use thiserror::Error;

/// Host errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    // Resolution and marshalling
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Marshal error: {0}")]
    Marshal(String),

    // Dispatch
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Feature disabled: {feature} is required by {operation}")]
    FeatureDisabled { feature: String, operation: String },

    /// Native failure, code and message as reported by the native side
    #[error("Native error {code}: {message}")]
    Native { code: i32, message: String },

    // Entity errors
    #[error("Domain mismatch: {0}")]
    DomainMismatch(String),

    #[error("Domain error: {0}")]
    Domain(String),
}

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// A failed chain or combinator, holding the entities it did not consume
#[derive(Debug)]
pub struct Rejected<I> {
    pub error: HostError,
    pub inputs: I,
}

impl<I> Rejected<I> {
    /// Pair `result` with the inputs it was built from; on failure the
    /// inputs travel back with the error.
    pub(crate) fn guard<T>(result: HostResult<T>, inputs: I) -> Result<(T, I), Self> {
        match result {
            Ok(value) => Ok((value, inputs)),
            Err(error) => Err(Rejected { error, inputs }),
        }
    }

    pub fn into_inputs(self) -> I {
        self.inputs
    }

    pub fn map_inputs<J>(self, f: impl FnOnce(I) -> J) -> Rejected<J> {
        Rejected {
            error: self.error,
            inputs: f(self.inputs),
        }
    }
}

impl<I> fmt::Display for Rejected<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<I: fmt::Debug> std::error::Error for Rejected<I> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<I> From<Rejected<I>> for HostError {
    fn from(rejected: Rejected<I>) -> Self {
        rejected.error
    }
}

/// Result of an operation that consumes entities only on success
pub type Consumed<T, I> = Result<T, Rejected<I>>;
