// Copyright (c) 2025 - Cowboy AI, Inc.
//! Composers
//!
//! A composer is a pure function: configuration plus already-published
//! attributes in, declared resources plus attributes out. No composer
//! performs I/O; the engine executes the declared plans against the
//! provider and publishes the results. This keeps re-evaluation
//! (reconciliation) idempotent and safely repeatable.
//!
//! ```text
//! EnvironmentConfig ─┐
//!                    ├─> compose() ──> ComponentPlan ──> engine/provider
//! Published attrs  ──┘                                        │
//!        ▲                                                    │
//!        └────────────────── publish ─────────────────────────┘
//! ```

pub mod database;
pub mod load_balancer;
pub mod scaling;
pub mod security;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::AttributeValue;
use crate::errors::{ComposeError, ComposeResult};
use crate::provider::{ResourceRecord, ResourceSpec};

/// Ordered resource declarations for one component
///
/// Resources are listed dependencies-first; the engine applies them in
/// order within the component, while independent components run
/// concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlan {
    pub component: String,
    pub resources: Vec<ResourceSpec>,
}

impl ComponentPlan {
    /// Create a plan for the named component
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            resources: Vec::new(),
        }
    }

    /// Append a resource declaration
    pub fn push(&mut self, spec: ResourceSpec) {
        self.resources.push(spec);
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the plan declares nothing
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Resource name embedding the instance index only for scaled deployments
///
/// Singleton deployments get index-free names so operators can tell a
/// scaled roll-out from a singleton at a glance.
pub fn name_for(prefix: &str, role: &str, index: usize, count: u32) -> String {
    if count > 1 {
        format!("{prefix}-{role}-{index}")
    } else {
        format!("{prefix}-{role}")
    }
}

/// Durably published attributes, keyed by component and logical resource
/// name
///
/// This is the only shared state between components. Entries are written
/// once per apply pass; later recomputation fully replaces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Published {
    components: BTreeMap<String, BTreeMap<String, ResourceRecord>>,
}

impl Published {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a resource record under a component
    pub fn publish(
        &mut self,
        component: impl Into<String>,
        logical_name: impl Into<String>,
        record: ResourceRecord,
    ) {
        self.components
            .entry(component.into())
            .or_default()
            .insert(logical_name.into(), record);
    }

    /// Record published for a resource, if any
    pub fn record(&self, component: &str, logical_name: &str) -> Option<&ResourceRecord> {
        self.components.get(component)?.get(logical_name)
    }

    /// Attribute of a published resource, if any
    pub fn attr(&self, component: &str, logical_name: &str, key: &str) -> Option<&AttributeValue> {
        self.record(component, logical_name)?.attributes.get(key)
    }

    /// Attribute of a published resource, or an unresolved-reference error
    /// naming the missing component
    pub fn require_attr(
        &self,
        component: &str,
        logical_name: &str,
        key: &str,
    ) -> ComposeResult<&AttributeValue> {
        self.attr(component, logical_name, key).ok_or_else(|| {
            ComposeError::unresolved(format!("{component}/{logical_name}.{key}"), component)
        })
    }

    /// Whether anything is published for the component
    pub fn has_component(&self, component: &str) -> bool {
        self.components
            .get(component)
            .is_some_and(|records| !records.is_empty())
    }
}
