//! Feature flags gating experimental code paths
//!
//! Flags are set once when a [`crate::Library`] is built and are read-only
//! afterwards.

use std::collections::BTreeSet;

use crate::{HostError, HostResult};

/// Float-noise kernels and float aggregates
pub const FLOATING_POINT: &str = "floating-point";
/// Combinators whose proofs are not yet vetted
pub const CONTRIB: &str = "contrib";

/// Environment variable read by [`Features::from_env`]
pub const FEATURES_ENV: &str = "OPAL_FEATURES";

/// Set of enabled feature flags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Features {
    enabled: BTreeSet<String>,
}

impl Features {
    /// No features enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known feature
    pub fn all() -> Self {
        Self::new().enable([FLOATING_POINT, CONTRIB])
    }

    pub fn enable<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Comma-separated flags from `OPAL_FEATURES`
    pub fn from_env() -> Self {
        std::env::var(FEATURES_ENV)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(list: &str) -> Self {
        Self::new().enable(
            list.split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty()),
        )
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }

    /// Fail unless every flag in `required` is enabled
    pub fn require(&self, required: &[&str], operation: &str) -> HostResult<()> {
        match required.iter().find(|flag| !self.is_enabled(flag)) {
            Some(flag) => Err(HostError::FeatureDisabled {
                feature: flag.to_string(),
                operation: operation.to_string(),
            }),
            None => Ok(()),
        }
    }
}
