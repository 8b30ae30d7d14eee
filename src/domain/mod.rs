// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain model for the composition engine
//!
//! Value objects and entities shared by all composers:
//! - [`Feature`] models conditional component presence as a sum type, so
//!   downstream code matches exhaustively instead of re-checking flags
//! - [`SecurityRule`] / [`RuleSource`] model policy entries; a group-sourced
//!   rule is *derived* and cannot materialize until its referent exists
//! - [`InstanceSet`] is an index-keyed arena, so index alignment of fan-out
//!   results is structural rather than convention-based
//! - [`ProvisionTrigger`] is the idempotence key for post-provision runs

pub mod attributes;
pub mod network;

pub use attributes::{AttributeValue, Attributes, ResourceId};
pub use network::{Cidr, NetworkError, PortRange};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::Ipv4Addr;

/// Conditional presence of an optional component
///
/// Resolved once by the config resolver from the corresponding feature
/// flag. `Absent` means the component contributes nothing: no resources,
/// no outputs, no placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature<T> {
    /// Component is disabled; it has no outputs
    Absent,
    /// Component is enabled with its resolved settings
    Present(T),
}

impl<T> Feature<T> {
    /// Resolve a flag into presence, building settings lazily
    pub fn when(enabled: bool, settings: impl FnOnce() -> T) -> Self {
        if enabled {
            Feature::Present(settings())
        } else {
            Feature::Absent
        }
    }

    /// Whether the component is enabled
    pub fn is_present(&self) -> bool {
        matches!(self, Feature::Present(_))
    }

    /// Borrow the settings, if present
    pub fn get(&self) -> Option<&T> {
        match self {
            Feature::Present(settings) => Some(settings),
            Feature::Absent => None,
        }
    }
}

/// Traffic direction of a security rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

/// Transport protocol of a security rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Any protocol (used for unrestricted egress)
    Any,
}

/// Source of a security rule
///
/// A `Group` source references another security group by name. Such a rule
/// tracks group membership automatically and is immune to address churn,
/// but it is *derived*: it cannot be materialized until the referenced
/// group exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleSource {
    /// Static CIDR block
    Cidr(Cidr),
    /// Reference to another security group, by logical name
    Group(String),
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Cidr(cidr) => write!(f, "{cidr}"),
            RuleSource::Group(name) => write!(f, "group:{name}"),
        }
    }
}

/// A single security policy rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: Direction,
    pub protocol: Protocol,
    pub port_range: PortRange,
    pub source: RuleSource,
}

impl SecurityRule {
    /// Ingress rule allowing a port range from a CIDR block
    pub fn ingress(protocol: Protocol, port_range: PortRange, cidr: Cidr) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol,
            port_range,
            source: RuleSource::Cidr(cidr),
        }
    }

    /// Ingress rule allowing a port range from members of another group
    pub fn ingress_from_group(
        protocol: Protocol,
        port_range: PortRange,
        group: impl Into<String>,
    ) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol,
            port_range,
            source: RuleSource::Group(group.into()),
        }
    }

    /// Unrestricted egress rule (any protocol, any destination)
    pub fn egress_all() -> Self {
        Self {
            direction: Direction::Egress,
            protocol: Protocol::Any,
            port_range: PortRange::all(),
            source: RuleSource::Cidr(Cidr::any()),
        }
    }
}

/// One provisioned compute instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    /// Position in the instance arena, 0..N-1
    pub index: usize,
    /// Provider-assigned identifier
    pub id: ResourceId,
    /// Instance name (index-free for singleton deployments)
    pub name: String,
    /// Addresses reported by the provider, first entry is primary
    pub addresses: Vec<Ipv4Addr>,
    /// Attached data volume
    pub volume_id: ResourceId,
}

impl InstanceHandle {
    /// Primary address, if the provider has reported one
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.addresses.first().copied()
    }
}

/// Index-keyed arena of compute instances
///
/// Length always equals the configured instance count. A slot is `None`
/// when that instance failed to provision; subsequent slots never shift,
/// so position *i* always corresponds to instance *i*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSet {
    slots: Vec<Option<InstanceHandle>>,
}

impl InstanceSet {
    /// Build from an index-aligned slot vector
    ///
    /// # Invariant
    /// Every present handle's `index` matches its slot position.
    pub fn from_slots(slots: Vec<Option<InstanceHandle>>) -> Self {
        debug_assert!(slots
            .iter()
            .enumerate()
            .all(|(i, slot)| slot.as_ref().map_or(true, |h| h.index == i)));
        Self { slots }
    }

    /// Number of slots (== configured instance count)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Handle at the given index, if that instance provisioned
    pub fn get(&self, index: usize) -> Option<&InstanceHandle> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Index-aligned slot view
    pub fn slots(&self) -> &[Option<InstanceHandle>] {
        &self.slots
    }

    /// Iterate over live instances in index order
    pub fn live(&self) -> impl Iterator<Item = &InstanceHandle> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

/// Declared shape of the load balancer component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    /// Subnet the virtual address is bound to (provider network id)
    pub vip_subnet: String,
    /// Backend addresses, one per live instance, in instance-index order
    pub members: Vec<Ipv4Addr>,
    /// Path polled by the health monitor
    pub health_check_path: String,
    /// Public-facing address, if one was requested and bound
    pub public_address: Option<Ipv4Addr>,
}

/// Idempotence key for a post-provision pass
///
/// The content hash covers the instance identity, its current addresses,
/// and the automation target. An unchanged hash means the pass is skipped;
/// a changed hash means it re-runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionTrigger {
    pub instance_id: ResourceId,
    pub content_hash: String,
}

impl ProvisionTrigger {
    /// Compute the trigger for an instance and automation target
    pub fn new(
        instance_id: ResourceId,
        fixed_ips: &[Ipv4Addr],
        playbook_ref: &str,
        credential_ref: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(instance_id.as_uuid().as_bytes());
        for ip in fixed_ips {
            hasher.update(ip.octets());
        }
        hasher.update(playbook_ref.as_bytes());
        hasher.update(credential_ref.as_bytes());

        let digest = hasher.finalize();
        let content_hash = digest.iter().map(|b| format!("{b:02x}")).collect();

        Self {
            instance_id,
            content_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_when() {
        let present = Feature::when(true, || 42);
        assert!(present.is_present());
        assert_eq!(present.get(), Some(&42));

        let absent: Feature<i32> = Feature::when(false, || unreachable!());
        assert!(!absent.is_present());
        assert_eq!(absent.get(), None);
    }

    #[test]
    fn test_rule_constructors() {
        let ssh = SecurityRule::ingress(
            Protocol::Tcp,
            PortRange::SSH,
            Cidr::new("10.0.0.0/24").unwrap(),
        );
        assert_eq!(ssh.direction, Direction::Ingress);
        assert!(matches!(ssh.source, RuleSource::Cidr(_)));

        let db = SecurityRule::ingress_from_group(
            Protocol::Tcp,
            PortRange::single(5432).unwrap(),
            "app-compute",
        );
        assert_eq!(db.source, RuleSource::Group("app-compute".to_string()));

        let egress = SecurityRule::egress_all();
        assert_eq!(egress.direction, Direction::Egress);
        assert_eq!(egress.protocol, Protocol::Any);
    }

    #[test]
    fn test_instance_set_alignment() {
        let handle = InstanceHandle {
            index: 1,
            id: ResourceId::new(),
            name: "app-node-1".to_string(),
            addresses: vec!["10.0.0.6".parse().unwrap()],
            volume_id: ResourceId::new(),
        };
        let set = InstanceSet::from_slots(vec![None, Some(handle)]);

        assert_eq!(set.len(), 2);
        assert!(set.get(0).is_none());
        assert_eq!(set.get(1).unwrap().name, "app-node-1");
        assert_eq!(set.live().count(), 1);
    }

    #[test]
    fn test_trigger_hash_stability() {
        let id = ResourceId::new();
        let ips: Vec<Ipv4Addr> = vec!["10.0.0.5".parse().unwrap()];

        let a = ProvisionTrigger::new(id, &ips, "site.yml", "deploy-key");
        let b = ProvisionTrigger::new(id, &ips, "site.yml", "deploy-key");
        assert_eq!(a.content_hash, b.content_hash);

        // Any covered fact changing must change the hash
        let other_playbook = ProvisionTrigger::new(id, &ips, "other.yml", "deploy-key");
        assert_ne!(a.content_hash, other_playbook.content_hash);

        let other_ips: Vec<Ipv4Addr> = vec!["10.0.0.9".parse().unwrap()];
        let moved = ProvisionTrigger::new(id, &other_ips, "site.yml", "deploy-key");
        assert_ne!(a.content_hash, moved.content_hash);
    }
}
