// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Provider Boundary
//!
//! The cloud provider is a black box behind the [`Provider`] trait: it
//! creates, reads, and deletes primitives described by typed
//! [`ResourceSpec`] descriptors and reports a stable identifier plus a
//! provider-specific attribute set for each. `ensure` is the idempotent
//! entry point: a resource already in its desired state is reported as
//! [`EnsureStatus::Unchanged`], never re-created.
//!
//! [`InMemoryProvider`] is the recording double used by the test suites.
//! It allocates deterministic addresses and counts creates/deletes so
//! idempotence properties can be asserted directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Attributes, ResourceId, SecurityRule};

/// Provider operation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Failed to create {kind} `{name}`: {message}")]
    CreateFailed {
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} `{name}` not found")]
    NotFound { kind: String, name: String },

    #[error("Provider backend error: {0}")]
    Backend(String),
}

/// Typed resource descriptor consumed by the provider
///
/// Each descriptor carries a logical name; (kind, logical name) is the
/// idempotence key the provider uses for "already in desired state"
/// detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceSpec {
    /// Object-storage container; `versions_of` links this container as the
    /// version-history sink of another (by that container's logical name)
    Container {
        name: String,
        versions_of: Option<String>,
    },
    /// Named security group (default-deny ingress)
    SecurityGroup { name: String, description: String },
    /// Single rule attached to a security group
    SecurityGroupRule {
        /// Logical name of this rule occurrence (position-stable)
        name: String,
        group: String,
        rule: SecurityRule,
    },
    /// Compute instance
    Instance {
        name: String,
        network_id: String,
        key_ref: String,
        security_groups: Vec<String>,
        user_data: Option<String>,
    },
    /// Block storage volume
    Volume { name: String, size_gb: u32 },
    /// Attachment of a volume to an instance at a fixed device slot
    VolumeAttachment {
        name: String,
        instance: String,
        volume: String,
        device: String,
    },
    /// Load balancer bound to a subnet
    LoadBalancer { name: String, vip_network_id: String },
    /// Listener on the balancer
    Listener {
        name: String,
        load_balancer: String,
        protocol: String,
        port: u16,
    },
    /// Backend pool behind a listener
    Pool { name: String, listener: String },
    /// One backend member of a pool
    PoolMember {
        name: String,
        pool: String,
        address: Ipv4Addr,
        port: u16,
    },
    /// Health monitor polling the pool members
    HealthMonitor {
        name: String,
        pool: String,
        path: String,
        interval_secs: u64,
        timeout_secs: u64,
        max_retries: u32,
    },
    /// Public-facing address bound to another resource
    FloatingIp { name: String, attach_to: String },
    /// Stricter deny-by-default policy layer scoped to attachment points
    FirewallPolicy {
        name: String,
        ingress_action: String,
        egress_action: String,
        attachments: Vec<String>,
    },
}

impl ResourceSpec {
    /// Resource kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::Container { .. } => "container",
            ResourceSpec::SecurityGroup { .. } => "security_group",
            ResourceSpec::SecurityGroupRule { .. } => "security_group_rule",
            ResourceSpec::Instance { .. } => "instance",
            ResourceSpec::Volume { .. } => "volume",
            ResourceSpec::VolumeAttachment { .. } => "volume_attachment",
            ResourceSpec::LoadBalancer { .. } => "load_balancer",
            ResourceSpec::Listener { .. } => "listener",
            ResourceSpec::Pool { .. } => "pool",
            ResourceSpec::PoolMember { .. } => "pool_member",
            ResourceSpec::HealthMonitor { .. } => "health_monitor",
            ResourceSpec::FloatingIp { .. } => "floating_ip",
            ResourceSpec::FirewallPolicy { .. } => "firewall_policy",
        }
    }

    /// Logical name (idempotence key within a kind)
    pub fn logical_name(&self) -> &str {
        match self {
            ResourceSpec::Container { name, .. }
            | ResourceSpec::SecurityGroup { name, .. }
            | ResourceSpec::SecurityGroupRule { name, .. }
            | ResourceSpec::Instance { name, .. }
            | ResourceSpec::Volume { name, .. }
            | ResourceSpec::VolumeAttachment { name, .. }
            | ResourceSpec::LoadBalancer { name, .. }
            | ResourceSpec::Listener { name, .. }
            | ResourceSpec::Pool { name, .. }
            | ResourceSpec::PoolMember { name, .. }
            | ResourceSpec::HealthMonitor { name, .. }
            | ResourceSpec::FloatingIp { name, .. }
            | ResourceSpec::FirewallPolicy { name, .. } => name,
        }
    }
}

/// Stable record the provider reports for an existing resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub attributes: Attributes,
}

/// Whether `ensure` created the resource or found it already in state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureStatus {
    Created,
    Unchanged,
}

/// Result of an `ensure` call
#[derive(Debug, Clone, PartialEq)]
pub struct EnsureOutcome {
    pub record: ResourceRecord,
    pub status: EnsureStatus,
}

/// Cloud resource provider boundary
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create the resource if absent; report it unchanged if already in
    /// its desired state
    async fn ensure(&self, spec: &ResourceSpec) -> Result<EnsureOutcome, ProviderError>;

    /// Read an existing resource, if any
    async fn read(
        &self,
        kind: &str,
        logical_name: &str,
    ) -> Result<Option<ResourceRecord>, ProviderError>;

    /// Delete a resource; deleting an absent resource is not an error
    async fn delete(&self, kind: &str, logical_name: &str) -> Result<(), ProviderError>;
}

/// Deterministic private address for the nth allocation
///
/// Allocations come out of a flat 10.0.0.0/16 pool starting at 10.0.0.11,
/// spilling into the third octet once the fourth is exhausted, so large
/// fleets keep getting distinct addresses.
fn pool_address(ordinal: u32) -> Ipv4Addr {
    let n = ordinal + 10;
    Ipv4Addr::new(10, 0, ((n >> 8) & 0xff) as u8, (n & 0xff) as u8)
}

#[derive(Debug, Default)]
struct InMemoryState {
    resources: BTreeMap<(String, String), ResourceRecord>,
    created_total: u64,
    deleted_total: u64,
    next_host: u32,
    next_public_host: u32,
    fail_on: BTreeSet<String>,
}

/// Recording in-memory provider
///
/// Serves stable identifiers and deterministic addresses, detects
/// "already exists" by (kind, logical name), and counts creates and
/// deletes. Resource creation can be forced to fail per logical name to
/// exercise failure-isolation paths.
pub struct InMemoryProvider {
    state: Mutex<InMemoryState>,
    vip_subnet_cidr: String,
}

impl InMemoryProvider {
    /// Create an empty provider with the default VIP subnet (10.0.0.0/24)
    pub fn new() -> Self {
        Self::with_vip_subnet("10.0.0.0/24")
    }

    /// Create an empty provider reporting the given subnet CIDR for load
    /// balancers
    pub fn with_vip_subnet(cidr: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            vip_subnet_cidr: cidr.into(),
        }
    }

    /// Force creation of the named resource to fail
    pub async fn fail_on(&self, logical_name: impl Into<String>) {
        self.state.lock().await.fail_on.insert(logical_name.into());
    }

    /// Lift all injected failures
    pub async fn clear_failures(&self) {
        self.state.lock().await.fail_on.clear();
    }

    /// Total resources created so far
    pub async fn created_total(&self) -> u64 {
        self.state.lock().await.created_total
    }

    /// Total resources deleted so far
    pub async fn deleted_total(&self) -> u64 {
        self.state.lock().await.deleted_total
    }

    /// Number of resources currently held
    pub async fn resource_count(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    fn synthesize_attributes(&self, spec: &ResourceSpec, state: &mut InMemoryState) -> Attributes {
        let mut attrs = Attributes::new();
        match spec {
            ResourceSpec::Instance { .. } => {
                state.next_host += 1;
                let address = pool_address(state.next_host);
                attrs.insert("primary_address", address.to_string());
                attrs.insert("addresses", vec![address.to_string()]);
            }
            ResourceSpec::LoadBalancer { .. } => {
                state.next_host += 1;
                let vip = pool_address(state.next_host);
                attrs.insert("vip_address", vip.to_string());
                attrs.insert("vip_subnet_cidr", self.vip_subnet_cidr.as_str());
            }
            ResourceSpec::FloatingIp { .. } => {
                state.next_public_host += 1;
                // Documentation /24; wraps rather than overflowing if a
                // test ever allocates past 255 public addresses.
                let public = Ipv4Addr::new(203, 0, 113, (state.next_public_host & 0xff) as u8);
                attrs.insert("public_address", public.to_string());
            }
            ResourceSpec::Volume { size_gb, .. } => {
                attrs.insert("size_gb", i64::from(*size_gb));
            }
            _ => {}
        }
        attrs
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn ensure(&self, spec: &ResourceSpec) -> Result<EnsureOutcome, ProviderError> {
        let mut state = self.state.lock().await;
        let key = (spec.kind().to_string(), spec.logical_name().to_string());

        if let Some(record) = state.resources.get(&key) {
            return Ok(EnsureOutcome {
                record: record.clone(),
                status: EnsureStatus::Unchanged,
            });
        }

        if state.fail_on.contains(spec.logical_name()) {
            return Err(ProviderError::CreateFailed {
                kind: spec.kind().to_string(),
                name: spec.logical_name().to_string(),
                message: "injected failure".to_string(),
            });
        }

        let attributes = self.synthesize_attributes(spec, &mut state);
        let record = ResourceRecord {
            id: ResourceId::new(),
            attributes,
        };
        debug!(kind = spec.kind(), name = spec.logical_name(), "created resource");
        state.resources.insert(key, record.clone());
        state.created_total += 1;

        Ok(EnsureOutcome {
            record,
            status: EnsureStatus::Created,
        })
    }

    async fn read(
        &self,
        kind: &str,
        logical_name: &str,
    ) -> Result<Option<ResourceRecord>, ProviderError> {
        let state = self.state.lock().await;
        Ok(state
            .resources
            .get(&(kind.to_string(), logical_name.to_string()))
            .cloned())
    }

    async fn delete(&self, kind: &str, logical_name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if state
            .resources
            .remove(&(kind.to_string(), logical_name.to_string()))
            .is_some()
        {
            state.deleted_total += 1;
        }
        Ok(())
    }
}
