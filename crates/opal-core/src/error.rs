//! Error types for the native computation library

use thiserror::Error;

/// Core OPAL errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpalError {
    // Descriptor errors
    #[error("Failed to parse type descriptor: {0}")]
    TypeParse(String),

    #[error("No instantiation for {0}")]
    NotImplemented(String),

    // Composition errors
    #[error("Domain mismatch: {0}")]
    DomainMismatch(String),

    #[error("Unable to make transformation: {0}")]
    MakeTransformation(String),

    #[error("Unable to make measurement: {0}")]
    MakeMeasurement(String),

    // Evaluation errors
    #[error("Failed function: {0}")]
    FailedFunction(String),

    #[error("Failed map: {0}")]
    FailedMap(String),

    #[error("Failed cast: {0}")]
    FailedCast(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for OPAL operations
pub type OpalResult<T> = Result<T, OpalError>;
