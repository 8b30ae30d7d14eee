// Copyright (c) 2025 - Cowboy AI, Inc.
//! Storage Composer
//!
//! Declares the audit-log container pair unconditionally: a primary sink
//! plus a version-history container that retains every overwritten object
//! immutably (append-only audit trail, tamper evidence). The versions
//! container is declared first because the primary's versioning link
//! references it.

use crate::config::EnvironmentConfig;
use crate::provider::ResourceSpec;

use super::ComponentPlan;

/// Component name used for published storage attributes
pub const COMPONENT: &str = "storage";

/// Logical name of the primary audit container
pub fn primary_container_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-audit", cfg.name_prefix)
}

/// Logical name of the paired version-history container
pub fn versions_container_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-audit-versions", cfg.name_prefix)
}

/// Declare the audit container pair
pub fn compose(cfg: &EnvironmentConfig) -> ComponentPlan {
    let versions = versions_container_name(cfg);
    let primary = primary_container_name(cfg);

    let mut plan = ComponentPlan::new(COMPONENT);
    // Ordering invariant: versions container exists before the link to it
    plan.push(ResourceSpec::Container {
        name: versions.clone(),
        versions_of: None,
    });
    plan.push(ResourceSpec::Container {
        name: primary,
        versions_of: Some(versions),
    });
    plan
}
