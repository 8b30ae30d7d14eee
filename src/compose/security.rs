// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Policy Composer
//!
//! Produces the compute tier's default-deny policy: a security group with
//! no implicit ingress allowance, one explicit allow rule per
//! caller-supplied CIDR entry (so individual entries can be revoked
//! independently), and allow-all egress unless the stricter mode is
//! selected.
//!
//! Resolution is two-phase. Phase one ([`declare`]) emits the group and
//! every rule whose source is statically known. A rule whose source is
//! another component's output, here the compute-port allowance scoped to
//! the load balancer's subnet CIDR, is declared as a [`DerivedRule`] and
//! only materialized by [`resolve_derived`] once the referent's binding
//! has been published. A derived rule whose referent is absent fails with
//! an unresolved-reference error naming the missing component; it is never
//! silently omitted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DefaultAction, EnvironmentConfig};
use crate::domain::{Cidr, Feature, PortRange, Protocol, SecurityRule};
use crate::errors::{ComposeError, ComposeResult};
use crate::provider::{ProviderError, ResourceSpec};

use super::{load_balancer, name_for, ComponentPlan, Published};

/// Component name for the base policy
pub const COMPONENT: &str = "security";

/// Component name for derived rules (applied after the barrier)
pub const DERIVED_COMPONENT: &str = "security-derived";

/// Logical name of the compute tier's security group
pub fn group_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-compute", cfg.name_prefix)
}

/// Reference to a published attribute of another component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRef {
    pub component: String,
    pub logical_name: String,
    pub attribute: String,
}

/// A rule whose source CIDR is only knowable after another component has
/// been resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRule {
    pub protocol: Protocol,
    pub port_range: PortRange,
    pub referent: AttributeRef,
}

/// Declared security policy (phase-one output)
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    pub group_name: String,
    pub base_rules: Vec<SecurityRule>,
    pub derived_rules: Vec<DerivedRule>,
}

/// Phase one: declare the group and all statically-known rules
pub fn declare(cfg: &EnvironmentConfig) -> SecurityPolicy {
    let mut base_rules = Vec::new();

    if !cfg.egress_restricted {
        base_rules.push(SecurityRule::egress_all());
    }

    // One rule per CIDR entry; duplicates stay duplicates so individual
    // entries can be revoked independently.
    for cidr in &cfg.allow_ssh {
        base_rules.push(SecurityRule::ingress(Protocol::Tcp, PortRange::SSH, *cidr));
    }
    for cidr in &cfg.allow_http {
        base_rules.push(SecurityRule::ingress(Protocol::Tcp, PortRange::HTTP, *cidr));
    }
    for cidr in &cfg.allow_https {
        base_rules.push(SecurityRule::ingress(Protocol::Tcp, PortRange::HTTPS, *cidr));
    }

    let mut derived_rules = Vec::new();
    if let Feature::Present(lb) = &cfg.load_balancer {
        // Allow the compute port only from the balancer's subnet; the
        // subnet CIDR is a provider lookup, resolved after the balancer
        // publishes its binding.
        derived_rules.push(DerivedRule {
            protocol: Protocol::Tcp,
            port_range: PortRange::new(lb.port, lb.port).unwrap_or(PortRange::HTTP),
            referent: AttributeRef {
                component: load_balancer::COMPONENT.to_string(),
                logical_name: load_balancer::balancer_name(cfg),
                attribute: "vip_subnet_cidr".to_string(),
            },
        });
    }

    debug!(
        base = base_rules.len(),
        derived = derived_rules.len(),
        "declared security policy"
    );

    SecurityPolicy {
        group_name: group_name(cfg),
        base_rules,
        derived_rules,
    }
}

/// Pre-flight referent check, run before any resource mutation
///
/// Every derived rule must reference a component the configuration
/// actually enables; a dangling referent aborts the apply up front.
pub fn check_referents(policy: &SecurityPolicy, cfg: &EnvironmentConfig) -> ComposeResult<()> {
    for rule in &policy.derived_rules {
        let present = match rule.referent.component.as_str() {
            load_balancer::COMPONENT => cfg.load_balancer.is_present(),
            _ => false,
        };
        if !present {
            return Err(ComposeError::unresolved(
                format!(
                    "{}/{}.{}",
                    rule.referent.component, rule.referent.logical_name, rule.referent.attribute
                ),
                rule.referent.component.clone(),
            ));
        }
    }
    Ok(())
}

/// Phase two: materialize derived rules from published attributes
///
/// Must run only after every referenced binding has been published (the
/// engine's barrier guarantees this). A missing referent is an
/// unresolved-reference error naming the absent component.
pub fn resolve_derived(
    policy: &SecurityPolicy,
    published: &Published,
) -> ComposeResult<Vec<SecurityRule>> {
    policy
        .derived_rules
        .iter()
        .map(|rule| {
            let value = published.require_attr(
                &rule.referent.component,
                &rule.referent.logical_name,
                &rule.referent.attribute,
            )?;
            let cidr_str = value.as_str().ok_or_else(|| {
                ComposeError::unresolved(
                    format!("{}.{}", rule.referent.logical_name, rule.referent.attribute),
                    rule.referent.component.clone(),
                )
            })?;
            let cidr = Cidr::new(cidr_str).map_err(|e| ComposeError::Provider {
                component: DERIVED_COMPONENT.to_string(),
                source: ProviderError::Backend(format!(
                    "referent `{}` reported invalid CIDR `{cidr_str}`: {e}",
                    rule.referent.logical_name
                )),
            })?;
            Ok(SecurityRule::ingress(rule.protocol, rule.port_range, cidr))
        })
        .collect()
}

/// Resource plan for the base policy (group + static rules + optional
/// stricter firewall layer)
pub fn base_plan(cfg: &EnvironmentConfig, policy: &SecurityPolicy) -> ComponentPlan {
    let mut plan = ComponentPlan::new(COMPONENT);

    plan.push(ResourceSpec::SecurityGroup {
        name: policy.group_name.clone(),
        description: format!("{} compute tier (default deny)", cfg.name_prefix),
    });

    // Position-stable rule names keep duplicate entries distinct while
    // re-applies stay idempotent.
    for (i, rule) in policy.base_rules.iter().enumerate() {
        plan.push(ResourceSpec::SecurityGroupRule {
            name: format!("{}-rule-{i}", policy.group_name),
            group: policy.group_name.clone(),
            rule: rule.clone(),
        });
    }

    if let Feature::Present(fw) = &cfg.firewall {
        let attachments = (0..cfg.instance_count as usize)
            .map(|i| name_for(&cfg.name_prefix, "node", i, cfg.instance_count))
            .collect();
        plan.push(ResourceSpec::FirewallPolicy {
            name: format!("{}-fw", cfg.name_prefix),
            ingress_action: action_str(fw.ingress_default).to_string(),
            egress_action: action_str(fw.egress_default).to_string(),
            attachments,
        });
    }

    plan
}

/// Resource plan materializing resolved derived rules
pub fn derived_plan(policy: &SecurityPolicy, resolved: &[SecurityRule]) -> ComponentPlan {
    let mut plan = ComponentPlan::new(DERIVED_COMPONENT);
    for (i, rule) in resolved.iter().enumerate() {
        plan.push(ResourceSpec::SecurityGroupRule {
            name: format!("{}-derived-rule-{i}", policy.group_name),
            group: policy.group_name.clone(),
            rule: rule.clone(),
        });
    }
    plan
}

fn action_str(action: DefaultAction) -> &'static str {
    match action {
        DefaultAction::Allow => "allow",
        DefaultAction::Deny => "deny",
    }
}
