// Copyright (c) 2025 - Cowboy AI, Inc.
//! Output Aggregator
//!
//! Collapses the published attribute set into the stable, consumer-facing
//! output shape. Instance-indexed outputs are placeholder-aligned: the
//! list always has exactly `instance_count` entries and a failed
//! instance's slot is `None`, so output position N refers to instance N
//! across apply passes. Feature-gated outputs are absent (`None`) when the
//! feature is disabled or unpublished, never zero-valued.

use serde::Serialize;
use tracing::debug;

use crate::compose::{load_balancer, security, storage, Published};
use crate::config::EnvironmentConfig;
use crate::domain::InstanceSet;
use crate::errors::{ComposeError, ComposeResult};

/// Consumer-facing outputs of one apply pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutputs {
    /// Primary audit container identifier
    pub primary_container_id: Option<String>,
    /// Version-history container identifier
    pub versions_container_id: Option<String>,
    /// Compute-tier security group identifier
    pub security_group_id: String,
    /// Instance identifiers, index-aligned; `None` marks a failed slot
    pub instance_ids: Vec<Option<String>>,
    /// Per-instance address lists, index-aligned; empty for failed slots
    pub instance_addresses: Vec<Vec<String>>,
    /// Balancer VIP address; absent when the balancer is disabled
    pub lb_vip_address: Option<String>,
    /// Balancer public address; absent unless requested and bound
    pub lb_public_address: Option<String>,
}

/// Aggregate published attributes into the output shape
///
/// The security group is the one hard requirement: every deployment has
/// one, so its absence is an unresolved reference, not an empty output.
pub fn aggregate(
    cfg: &EnvironmentConfig,
    published: &Published,
    instances: &InstanceSet,
) -> ComposeResult<StackOutputs> {
    let group = security::group_name(cfg);
    let security_group_id = published
        .record(security::COMPONENT, &group)
        .map(|record| record.id.to_string())
        .ok_or_else(|| {
            ComposeError::unresolved(
                format!("{}/{group}", security::COMPONENT),
                security::COMPONENT,
            )
        })?;

    let primary_container_id = published
        .record(storage::COMPONENT, &storage::primary_container_name(cfg))
        .map(|record| record.id.to_string());
    let versions_container_id = published
        .record(storage::COMPONENT, &storage::versions_container_name(cfg))
        .map(|record| record.id.to_string());

    let instance_ids = instances
        .slots()
        .iter()
        .map(|slot| slot.as_ref().map(|handle| handle.id.to_string()))
        .collect();
    let instance_addresses = instances
        .slots()
        .iter()
        .map(|slot| {
            slot.as_ref()
                .map(|handle| handle.addresses.iter().map(|a| a.to_string()).collect())
                .unwrap_or_default()
        })
        .collect();

    let lb_vip_address = cfg.load_balancer.get().and_then(|_| {
        published
            .attr(
                load_balancer::COMPONENT,
                &load_balancer::balancer_name(cfg),
                "vip_address",
            )
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    let lb_public_address = cfg.load_balancer.get().and_then(|_| {
        published
            .attr(
                load_balancer::COMPONENT,
                &load_balancer::floating_ip_name(cfg),
                "public_address",
            )
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });

    debug!(
        instances = instances.len(),
        lb = lb_vip_address.is_some(),
        "aggregated outputs"
    );
    Ok(StackOutputs {
        primary_container_id,
        versions_container_id,
        security_group_id,
        instance_ids,
        instance_addresses,
        lb_vip_address,
        lb_public_address,
    })
}
