// Copyright (c) 2025 - Cowboy AI, Inc.
//! End-to-end composition scenarios: full configurations through the
//! engine against the in-memory provider, checked down to the aggregated
//! outputs.

use pretty_assertions::assert_eq;

use stackform::compose::{database, load_balancer, security};
use stackform::domain::RuleSource;
use stackform::provider::{InMemoryProvider, Provider, ResourceRecord};
use stackform::{aggregate, resolve, ComponentStatus, Engine, RawConfig, ValidationError};

async fn rule_record(
    provider: &InMemoryProvider,
    logical_name: &str,
) -> Option<ResourceRecord> {
    provider
        .read("security_group_rule", logical_name)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_scaled_deployment_with_all_components() {
    let cfg = resolve(RawConfig {
        instance_count: 2,
        lb_enabled: true,
        db_enabled: true,
        allow_ssh_cidrs: vec!["203.0.113.0/24".to_string()],
        ..RawConfig::default()
    })
    .unwrap();

    let engine = Engine::new(InMemoryProvider::new());
    let summary = engine.apply(&cfg).await.unwrap();
    assert!(!summary.has_failures());

    // Two compute instances, both live
    assert_eq!(summary.instances.len(), 2);
    assert_eq!(summary.instances.live().count(), 2);

    // Base policy: allow-all egress plus exactly one SSH rule
    let security = summary.component(security::COMPONENT).unwrap();
    assert_eq!(security.status(), ComponentStatus::Created);
    let provider = engine.provider();
    assert!(rule_record(&provider, "app-compute-rule-0").await.is_some());
    assert!(rule_record(&provider, "app-compute-rule-1").await.is_some());
    assert!(rule_record(&provider, "app-compute-rule-2").await.is_none());

    // One derived rule, materialized after the balancer published
    let derived = summary.component(security::DERIVED_COMPONENT).unwrap();
    assert_eq!(derived.created, 1);
    assert!(rule_record(&provider, "app-compute-derived-rule-0")
        .await
        .is_some());

    // Database present with its group-referencing rule
    assert_eq!(
        summary.component(database::COMPONENT).unwrap().status(),
        ComponentStatus::Created
    );
    let db_plan = database::compose(&cfg, cfg.database.get().unwrap(), "app-compute");
    let group_rule = db_plan
        .resources
        .iter()
        .find_map(|spec| match spec {
            stackform::ResourceSpec::SecurityGroupRule { rule, .. } => Some(rule.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(group_rule.source, RuleSource::Group("app-compute".to_string()));

    // Balancer has one member per instance
    let members = load_balancer::members_of(&summary.instances);
    assert_eq!(members.len(), 2);

    // Outputs: index-aligned, balancer VIP present
    let outputs = aggregate(&cfg, &summary.published, &summary.instances).unwrap();
    assert_eq!(outputs.instance_ids.len(), 2);
    assert!(outputs.instance_ids.iter().all(Option::is_some));
    assert_eq!(outputs.instance_addresses.len(), 2);
    assert!(outputs.lb_vip_address.is_some());
    assert!(outputs.lb_public_address.is_none());
}

#[tokio::test]
async fn test_singleton_without_balancer() {
    let cfg = resolve(RawConfig::default()).unwrap();

    let engine = Engine::new(InMemoryProvider::new());
    let summary = engine.apply(&cfg).await.unwrap();
    assert!(!summary.has_failures());

    // Index-free names for the singleton
    let provider = engine.provider();
    assert!(provider
        .read("instance", "app-node")
        .await
        .unwrap()
        .is_some());
    assert!(provider
        .read("volume", "app-data")
        .await
        .unwrap()
        .is_some());

    // No balancer, no database, no derived rules
    assert!(summary.component(load_balancer::COMPONENT).is_none());
    assert!(summary.component(database::COMPONENT).is_none());
    assert!(summary.component(security::DERIVED_COMPONENT).is_none());

    let outputs = aggregate(&cfg, &summary.published, &summary.instances).unwrap();
    assert_eq!(outputs.instance_ids.len(), 1);
    assert_eq!(outputs.instance_addresses.len(), 1);
    assert!(outputs.lb_vip_address.is_none());
    assert!(outputs.lb_public_address.is_none());
    assert!(outputs.primary_container_id.is_some());
    assert!(outputs.versions_container_id.is_some());
}

#[tokio::test]
async fn test_malformed_cidr_rejected_before_any_mutation() {
    let err = resolve(RawConfig {
        allow_http_cidrs: vec!["10.0.0.5/24".to_string()],
        ..RawConfig::default()
    })
    .unwrap_err();

    match err {
        ValidationError::InvalidCidr { field, entry, .. } => {
            assert_eq!(field, "allow_http_cidrs");
            assert_eq!(entry, "10.0.0.5/24");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing ever reached the provider
    let provider = InMemoryProvider::new();
    assert_eq!(provider.resource_count().await, 0);
}

#[tokio::test]
async fn test_audit_containers_always_present() {
    // Storage is unconditional; even the most minimal configuration gets
    // the audit pair with the versioning link.
    let cfg = resolve(RawConfig::default()).unwrap();
    let engine = Engine::new(InMemoryProvider::new());
    let summary = engine.apply(&cfg).await.unwrap();

    let provider = engine.provider();
    assert!(provider
        .read("container", "app-audit")
        .await
        .unwrap()
        .is_some());
    assert!(provider
        .read("container", "app-audit-versions")
        .await
        .unwrap()
        .is_some());
    assert!(!summary.has_failures());
}
