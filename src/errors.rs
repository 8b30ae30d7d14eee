// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error taxonomy for composition and apply
//!
//! Four kinds, with distinct propagation policies:
//! - [`ValidationError`](crate::config::ValidationError): bad input, fatal
//!   before any resource mutation
//! - `UnresolvedReference`: a derived rule or output references an absent
//!   component, fatal before mutation, names the missing component
//! - `Provider`: per-resource creation/deletion failure; siblings continue
//!   unless they depend on the failed resource
//! - `Provision`: per-instance post-provision failure; other instances'
//!   passes continue

use thiserror::Error;

use crate::config::ValidationError;
use crate::provider::ProviderError;

/// Errors surfaced by the composition engine
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Input configuration is invalid
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A derived rule or output references a component that is absent
    #[error("Unresolved reference `{reference}`: component `{missing}` is absent")]
    UnresolvedReference { reference: String, missing: String },

    /// Resource creation or deletion failed
    #[error("Provider error in component `{component}`: {source}")]
    Provider {
        component: String,
        #[source]
        source: ProviderError,
    },

    /// Post-provision pass failed for one instance
    #[error("Provisioning failed for instance {index}: {message}")]
    Provision { index: usize, message: String },
}

impl ComposeError {
    /// Build an unresolved-reference error naming the missing component
    pub fn unresolved(reference: impl Into<String>, missing: impl Into<String>) -> Self {
        ComposeError::UnresolvedReference {
            reference: reference.into(),
            missing: missing.into(),
        }
    }

    /// Short kind tag for apply summaries
    pub fn kind(&self) -> &'static str {
        match self {
            ComposeError::Validation(_) => "validation",
            ComposeError::UnresolvedReference { .. } => "unresolved-reference",
            ComposeError::Provider { .. } => "provider",
            ComposeError::Provision { .. } => "provision",
        }
    }
}

/// Result type for composition operations
pub type ComposeResult<T> = Result<T, ComposeError>;
