// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reconciliation behavior: repeated applies converge without extra work,
//! and failures stay confined to the affected component.

use std::sync::Arc;

use stackform::compose::database;
use stackform::provision::{
    InMemoryTriggerStore, Orchestrator, ProvisionOutcome, RecordingExecutor, RecordingRunner,
    StaticSecrets,
};
use stackform::{aggregate, resolve, ComponentStatus, Engine, InMemoryProvider, RawConfig};

fn full_config() -> RawConfig {
    RawConfig {
        instance_count: 2,
        lb_enabled: true,
        db_enabled: true,
        ansible_enabled: true,
        settle_secs: 0,
        allow_ssh_cidrs: vec!["198.51.100.0/24".to_string()],
        ..RawConfig::default()
    }
}

#[tokio::test]
async fn test_reapply_and_rerun_are_both_idempotent() -> anyhow::Result<()> {
    let cfg = resolve(full_config())?;
    let engine = Engine::new(InMemoryProvider::new());

    let runner = Arc::new(RecordingRunner::new());
    let orchestrator = Orchestrator::new(
        runner.clone(),
        Arc::new(RecordingExecutor::new()),
        Arc::new(StaticSecrets::new().with("secret/db-password", "s3cret")),
        Arc::new(InMemoryTriggerStore::new()),
    );

    // First pass: everything created, one runner invocation per instance.
    let first = engine.apply(&cfg).await?;
    assert!(!first.has_failures());
    let facts = database::connection_facts(&cfg, &first.published);
    let reports = orchestrator.run(&cfg, &first.instances, facts.as_ref()).await;
    assert!(reports
        .iter()
        .all(|r| r.outcome == ProvisionOutcome::Applied));
    assert_eq!(runner.invocations().len(), 2);

    // Second pass: zero creates, zero deletes, zero runner invocations.
    let created = engine.provider().created_total().await;
    let second = engine.apply(&cfg).await?;
    assert_eq!(second.created_total(), 0);
    assert_eq!(engine.provider().created_total().await, created);
    assert_eq!(engine.provider().deleted_total().await, 0);

    let facts = database::connection_facts(&cfg, &second.published);
    let reports = orchestrator
        .run(&cfg, &second.instances, facts.as_ref())
        .await;
    assert!(reports
        .iter()
        .all(|r| r.outcome == ProvisionOutcome::Skipped));
    assert_eq!(runner.invocations().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_instance_failure_confined_through_outputs() {
    let provider = InMemoryProvider::new();
    provider.fail_on("app-node-1").await;

    let cfg = resolve(RawConfig {
        instance_count: 3,
        ..RawConfig::default()
    })
    .unwrap();
    let engine = Engine::new(provider);
    let summary = engine.apply(&cfg).await.unwrap();

    assert_eq!(
        summary.component("compute-1").unwrap().status(),
        ComponentStatus::Failed
    );
    assert_eq!(
        summary.component("compute-0").unwrap().status(),
        ComponentStatus::Created
    );
    assert_eq!(
        summary.component("compute-2").unwrap().status(),
        ComponentStatus::Created
    );

    // The failed slot stays in place all the way out to the outputs.
    let outputs = aggregate(&cfg, &summary.published, &summary.instances).unwrap();
    assert_eq!(outputs.instance_ids.len(), 3);
    assert!(outputs.instance_ids[0].is_some());
    assert!(outputs.instance_ids[1].is_none());
    assert!(outputs.instance_ids[2].is_some());
    assert!(outputs.instance_addresses[1].is_empty());
}

#[tokio::test]
async fn test_provisioning_skips_failed_slot() {
    let provider = InMemoryProvider::new();
    provider.fail_on("app-node-0").await;

    let cfg = resolve(RawConfig {
        instance_count: 2,
        ansible_enabled: true,
        settle_secs: 0,
        ..RawConfig::default()
    })
    .unwrap();
    let engine = Engine::new(provider);
    let summary = engine.apply(&cfg).await.unwrap();
    assert_eq!(summary.instances.live().count(), 1);

    let runner = Arc::new(RecordingRunner::new());
    let orchestrator = Orchestrator::new(
        runner.clone(),
        Arc::new(RecordingExecutor::new()),
        Arc::new(StaticSecrets::new()),
        Arc::new(InMemoryTriggerStore::new()),
    );

    let reports = orchestrator.run(&cfg, &summary.instances, None).await;
    // Only the live instance is provisioned; the failed slot produces no
    // report and no invocation.
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].index, 1);
    assert_eq!(reports[0].outcome, ProvisionOutcome::Applied);
    assert_eq!(runner.invocations().len(), 1);
}

#[tokio::test]
async fn test_recovered_dependency_converges_on_reapply() {
    // First apply fails the balancer; the derived rule cannot resolve.
    let provider = InMemoryProvider::new();
    provider.fail_on("app-lb").await;

    let cfg = resolve(RawConfig {
        lb_enabled: true,
        ..RawConfig::default()
    })
    .unwrap();
    let engine = Engine::new(provider);

    let first = engine.apply(&cfg).await.unwrap();
    assert!(first.has_failures());
    assert_eq!(
        first.component("security-derived").unwrap().status(),
        ComponentStatus::Failed
    );

    // Lift the failure and re-apply on the same provider: only the missing
    // pieces are created, everything already present reports unchanged.
    engine.provider().clear_failures().await;
    let recovered = engine.apply(&cfg).await.unwrap();
    assert!(!recovered.has_failures());
    assert_eq!(
        recovered.component("storage").unwrap().status(),
        ComponentStatus::Unchanged
    );
    assert_eq!(
        recovered.component("load_balancer").unwrap().status(),
        ComponentStatus::Created
    );
    assert_eq!(
        recovered.component("security-derived").unwrap().status(),
        ComponentStatus::Created
    );
}
