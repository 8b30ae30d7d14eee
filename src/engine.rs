// Copyright (c) 2025 - Cowboy AI, Inc.
//! Composition Engine
//!
//! Dependency-respecting parallel apply, not a single-threaded sequential
//! pass:
//!
//! ```text
//! Phase 1 (concurrent)      Phase 2 (concurrent)      Phase 3 (barrier)
//! ────────────────────      ────────────────────      ─────────────────
//! storage                   database                  security-derived
//! security (base rules)     load_balancer               (needs the LB
//! compute-0 ─┐                (needs addresses)          subnet binding)
//! compute-1  ├─ independent
//! compute-N ─┘
//! ```
//!
//! Inside one component, resources apply strictly in declaration order
//! (instance → volume → attach). No component consumes another's output
//! before it is durably published; the derived security rules wait behind
//! the load balancer's subnet binding, a two-phase barrier rather than
//! free concurrency.
//!
//! Error policy: validation and unresolved-reference errors abort before
//! any resource mutation. Provider errors are collected per component and
//! surfaced in the summary while unaffected siblings continue; a component
//! whose dependency failed is reported failed without being attempted.
//!
//! Cancellation: dropping the `apply` future drops its `JoinSet`s, which
//! aborts all in-flight component tasks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::compose::{
    database, load_balancer, scaling, security, storage, ComponentPlan, Published,
};
use crate::config::EnvironmentConfig;
use crate::domain::{Feature, InstanceSet};
use crate::errors::{ComposeError, ComposeResult};
use crate::provider::{EnsureStatus, Provider, ResourceRecord};

/// Outcome classification for one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Created,
    Unchanged,
    Failed,
}

/// Failure context carried by a failed component report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportError {
    /// Error kind tag (`provider`, `unresolved-reference`, ...)
    pub kind: String,
    pub message: String,
    /// Instance index, for compute-tier components
    pub instance_index: Option<usize>,
}

/// Per-component apply report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentReport {
    pub component: String,
    pub created: usize,
    pub unchanged: usize,
    pub error: Option<ReportError>,
}

impl ComponentReport {
    /// Collapse counts and error into the user-visible status
    pub fn status(&self) -> ComponentStatus {
        if self.error.is_some() {
            ComponentStatus::Failed
        } else if self.created > 0 {
            ComponentStatus::Created
        } else {
            ComponentStatus::Unchanged
        }
    }
}

/// Result of one apply pass
#[derive(Debug, Clone)]
pub struct ApplySummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub components: Vec<ComponentReport>,
    pub published: Published,
    pub instances: InstanceSet,
}

impl ApplySummary {
    /// Report for the named component, if it ran
    pub fn component(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|r| r.component == name)
    }

    /// Total resources created across all components
    pub fn created_total(&self) -> usize {
        self.components.iter().map(|r| r.created).sum()
    }

    /// Whether any component failed
    pub fn has_failures(&self) -> bool {
        self.components
            .iter()
            .any(|r| r.status() == ComponentStatus::Failed)
    }
}

/// The composition engine
///
/// Pure composers declare; the engine executes declarations against the
/// provider and publishes results. Re-running apply with identical
/// configuration and unchanged provider state performs zero additional
/// creates or deletes.
pub struct Engine<P: Provider + 'static> {
    provider: Arc<P>,
}

impl<P: Provider + 'static> Engine<P> {
    /// Create an engine over the given provider
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Create an engine over a shared provider handle
    pub fn from_arc(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Shared provider handle
    pub fn provider(&self) -> Arc<P> {
        Arc::clone(&self.provider)
    }

    /// Apply the configuration, reconciling declared state with the
    /// provider
    pub async fn apply(&self, cfg: &EnvironmentConfig) -> ComposeResult<ApplySummary> {
        let started_at = Utc::now();

        // Pre-flight: dangling derived-rule referents abort before any
        // resource mutation.
        let policy = security::declare(cfg);
        security::check_referents(&policy, cfg)?;

        let mut published = Published::new();
        let mut components = Vec::new();

        // Phase 1: storage, base security policy, and every compute
        // instance sub-graph are mutually independent.
        let mut phase1 = vec![storage::compose(cfg), security::base_plan(cfg, &policy)];
        phase1.extend(scaling::expand(cfg, &[policy.group_name.clone()]));
        self.run_phase(phase1, &mut components, &mut published).await;

        let security_ok = component_ok(&components, security::COMPONENT);
        let instances = scaling::instance_set_from(cfg, &published);

        // Phase 2: consumers of phase-1 outputs.
        let mut phase2 = Vec::new();
        if let Feature::Present(db) = &cfg.database {
            if security_ok {
                phase2.push(database::compose(cfg, db, &policy.group_name));
            } else {
                components.push(dependency_failed(
                    database::COMPONENT,
                    security::COMPONENT,
                ));
            }
        }
        if let Feature::Present(lb) = &cfg.load_balancer {
            phase2.push(load_balancer::compose(cfg, lb, &instances));
        }
        self.run_phase(phase2, &mut components, &mut published).await;

        // Phase 3: barrier. Derived rules resolve only once the balancer's
        // subnet binding is durably published.
        if !policy.derived_rules.is_empty() {
            if !security_ok {
                components.push(dependency_failed(
                    security::DERIVED_COMPONENT,
                    security::COMPONENT,
                ));
            } else {
                match security::resolve_derived(&policy, &published) {
                    Ok(resolved) => {
                        let plan = security::derived_plan(&policy, &resolved);
                        self.run_phase(vec![plan], &mut components, &mut published)
                            .await;
                    }
                    Err(err) => {
                        warn!(error = %err, "derived rule resolution failed");
                        components.push(ComponentReport {
                            component: security::DERIVED_COMPONENT.to_string(),
                            created: 0,
                            unchanged: 0,
                            error: Some(ReportError {
                                kind: err.kind().to_string(),
                                message: err.to_string(),
                                instance_index: None,
                            }),
                        });
                    }
                }
            }
        }

        components.sort_by_key(|r| component_rank(&r.component));
        let summary = ApplySummary {
            started_at,
            finished_at: Utc::now(),
            components,
            published,
            instances,
        };
        info!(
            created = summary.created_total(),
            failures = summary.has_failures(),
            "apply pass finished"
        );
        Ok(summary)
    }

    /// Run a set of independent component plans concurrently
    async fn run_phase(
        &self,
        plans: Vec<ComponentPlan>,
        components: &mut Vec<ComponentReport>,
        published: &mut Published,
    ) {
        let mut set = JoinSet::new();
        for plan in plans {
            let provider = Arc::clone(&self.provider);
            set.spawn(async move { apply_plan(provider, plan).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((report, records)) => {
                    for (logical, record) in records {
                        published.publish(report.component.clone(), logical, record);
                    }
                    components.push(report);
                }
                Err(join_err) => {
                    // A panicked component task is reported, not propagated.
                    warn!(error = %join_err, "component task aborted");
                }
            }
        }
    }
}

/// Apply a single component plan, resources strictly in order
async fn apply_plan<P: Provider>(
    provider: Arc<P>,
    plan: ComponentPlan,
) -> (ComponentReport, Vec<(String, ResourceRecord)>) {
    let instance_index = instance_index_of(&plan.component);
    let mut created = 0;
    let mut unchanged = 0;
    let mut records = Vec::new();
    let mut error = None;

    for spec in &plan.resources {
        match provider.ensure(spec).await {
            Ok(outcome) => {
                match outcome.status {
                    EnsureStatus::Created => created += 1,
                    EnsureStatus::Unchanged => unchanged += 1,
                }
                records.push((spec.logical_name().to_string(), outcome.record));
            }
            Err(source) => {
                let err = ComposeError::Provider {
                    component: plan.component.clone(),
                    source,
                };
                warn!(component = %plan.component, error = %err, "resource apply failed");
                error = Some(ReportError {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                    instance_index,
                });
                // Later resources in this plan depend on the failed one.
                break;
            }
        }
    }

    (
        ComponentReport {
            component: plan.component,
            created,
            unchanged,
            error,
        },
        records,
    )
}

fn dependency_failed(component: &str, dependency: &str) -> ComponentReport {
    ComponentReport {
        component: component.to_string(),
        created: 0,
        unchanged: 0,
        error: Some(ReportError {
            kind: "provider".to_string(),
            message: format!("dependency `{dependency}` failed"),
            instance_index: None,
        }),
    }
}

fn component_ok(components: &[ComponentReport], name: &str) -> bool {
    components
        .iter()
        .find(|r| r.component == name)
        .is_some_and(|r| r.error.is_none())
}

fn instance_index_of(component: &str) -> Option<usize> {
    component.strip_prefix("compute-")?.parse().ok()
}

fn component_rank(component: &str) -> (u8, usize) {
    match component {
        storage::COMPONENT => (0, 0),
        security::COMPONENT => (1, 0),
        c if c.starts_with("compute-") => (2, instance_index_of(c).unwrap_or(usize::MAX)),
        database::COMPONENT => (3, 0),
        load_balancer::COMPONENT => (4, 0),
        security::DERIVED_COMPONENT => (5, 0),
        _ => (6, 0),
    }
}
