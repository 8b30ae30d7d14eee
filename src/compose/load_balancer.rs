// Copyright (c) 2025 - Cowboy AI, Inc.
//! Load Balancer Composer
//!
//! Present only when the balancer feature is enabled. Declares balancer,
//! listener, pool, and health monitor, with one pool member per live
//! compute instance: the member address is the *first* address of each
//! instance, in instance-index order. An instance with no address yet is
//! excluded from membership; that is a transient state during creation
//! ordering, not an error. Optionally binds a public-facing address.
//!
//! The balancer publishes its bound subnet's CIDR, which the security
//! composer consumes for its derived compute-port rule.

use std::net::Ipv4Addr;
use tracing::debug;

use crate::config::{EnvironmentConfig, LoadBalancerSettings};
use crate::domain::{InstanceSet, LoadBalancerSpec};
use crate::provider::ResourceSpec;

use super::{ComponentPlan, Published};

/// Component name used for published balancer attributes
pub const COMPONENT: &str = "load_balancer";

/// Logical name of the balancer
pub fn balancer_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-lb", cfg.name_prefix)
}

/// Logical name of the pool
pub fn pool_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-lb-pool", cfg.name_prefix)
}

/// Logical name of the floating ip, when a public address is requested
pub fn floating_ip_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-lb-fip", cfg.name_prefix)
}

/// Backend membership: first address of each live instance, index order
///
/// Returns `(instance index, address)` pairs so member names stay stable
/// when a middle instance is temporarily address-less.
pub fn members_of(instances: &InstanceSet) -> Vec<(usize, Ipv4Addr)> {
    instances
        .live()
        .filter_map(|handle| handle.primary_address().map(|addr| (handle.index, addr)))
        .collect()
}

/// Declare the balancer component
pub fn compose(
    cfg: &EnvironmentConfig,
    lb: &LoadBalancerSettings,
    instances: &InstanceSet,
) -> ComponentPlan {
    let balancer = balancer_name(cfg);
    let listener = format!("{balancer}-listener");
    let pool = pool_name(cfg);

    let mut plan = ComponentPlan::new(COMPONENT);
    plan.push(ResourceSpec::LoadBalancer {
        name: balancer.clone(),
        vip_network_id: cfg.network_id.clone(),
    });
    plan.push(ResourceSpec::Listener {
        name: listener.clone(),
        load_balancer: balancer.clone(),
        protocol: "HTTP".to_string(),
        port: lb.port,
    });
    plan.push(ResourceSpec::Pool {
        name: pool.clone(),
        listener,
    });
    plan.push(ResourceSpec::HealthMonitor {
        name: format!("{balancer}-monitor"),
        pool: pool.clone(),
        path: lb.health_check_path.clone(),
        interval_secs: lb.monitor_interval.as_secs(),
        timeout_secs: lb.monitor_timeout.as_secs(),
        max_retries: lb.monitor_retries,
    });

    let members = members_of(instances);
    debug!(members = members.len(), "composed balancer membership");
    for (index, address) in members {
        plan.push(ResourceSpec::PoolMember {
            name: format!("{pool}-member-{index}"),
            pool: pool.clone(),
            address,
            port: lb.port,
        });
    }

    if lb.assign_public_address {
        plan.push(ResourceSpec::FloatingIp {
            name: floating_ip_name(cfg),
            attach_to: balancer,
        });
    }

    plan
}

/// Assemble the published balancer shape from applied attributes
///
/// Returns `None` when the balancer has not published (absent or failed);
/// outputs stay absent rather than zero-valued.
pub fn spec_from(
    cfg: &EnvironmentConfig,
    instances: &InstanceSet,
    published: &Published,
) -> Option<LoadBalancerSpec> {
    let lb = cfg.load_balancer.get()?;
    let record = published.record(COMPONENT, &balancer_name(cfg))?;

    let vip_subnet = record
        .attributes
        .get_str("vip_subnet_cidr")
        .unwrap_or_default()
        .to_string();

    let public_address = published
        .attr(COMPONENT, &floating_ip_name(cfg), "public_address")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());

    Some(LoadBalancerSpec {
        vip_subnet,
        members: members_of(instances)
            .into_iter()
            .map(|(_, addr)| addr)
            .collect(),
        health_check_path: lb.health_check_path.clone(),
        public_address,
    })
}
