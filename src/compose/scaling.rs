// Copyright (c) 2025 - Cowboy AI, Inc.
//! Scaling Composer
//!
//! Expands the compute role into exactly `instance_count` indexed
//! instances. Each instance owns a strictly-ordered resource sub-graph:
//! the instance itself, a data volume, and the attachment binding the
//! volume at a fixed device slot. Instances are mutually independent, so
//! the engine applies their plans concurrently.
//!
//! The bootstrap script is idempotent: it formats the data device only if
//! no filesystem is present, appends the mount entry only if missing, and
//! mounts via `mount -a` so repeated runs converge instead of duplicating
//! entries.

use std::net::Ipv4Addr;
use tracing::debug;

use crate::config::EnvironmentConfig;
use crate::domain::{AttributeValue, InstanceHandle, InstanceSet};
use crate::provider::ResourceSpec;

use super::{name_for, ComponentPlan, Published};

/// Fixed device slot for the data volume
pub const DATA_DEVICE: &str = "/dev/vdb";

/// Mount point for the data volume
pub const DATA_MOUNT: &str = "/srv/data";

/// Component name for instance `index`
pub fn component_name(index: usize) -> String {
    format!("compute-{index}")
}

/// Instance name; index-free for singleton deployments
pub fn instance_name(cfg: &EnvironmentConfig, index: usize) -> String {
    name_for(&cfg.name_prefix, "node", index, cfg.instance_count)
}

/// Data volume name for instance `index`
pub fn volume_name(cfg: &EnvironmentConfig, index: usize) -> String {
    name_for(&cfg.name_prefix, "data", index, cfg.instance_count)
}

/// Expand the compute role into one ordered plan per instance
pub fn expand(cfg: &EnvironmentConfig, security_groups: &[String]) -> Vec<ComponentPlan> {
    (0..cfg.instance_count as usize)
        .map(|index| {
            let instance = instance_name(cfg, index);
            let volume = volume_name(cfg, index);

            let mut plan = ComponentPlan::new(component_name(index));
            // Strict order inside the sub-graph: instance, volume, attach
            plan.push(ResourceSpec::Instance {
                name: instance.clone(),
                network_id: cfg.network_id.clone(),
                key_ref: cfg.key_ref.clone(),
                security_groups: security_groups.to_vec(),
                user_data: Some(bootstrap_script(DATA_DEVICE, DATA_MOUNT)),
            });
            plan.push(ResourceSpec::Volume {
                name: volume.clone(),
                size_gb: cfg.volume_size_gb,
            });
            plan.push(ResourceSpec::VolumeAttachment {
                name: format!("{instance}-attach"),
                instance,
                volume,
                device: DATA_DEVICE.to_string(),
            });
            plan
        })
        .collect()
}

/// Idempotent data-volume bootstrap
///
/// Guards: format only when no filesystem is present, append the fstab
/// entry only when absent, mount-all so re-runs converge.
pub fn bootstrap_script(device: &str, mount_point: &str) -> String {
    format!(
        "#!/bin/sh\n\
         set -eu\n\
         if ! blkid {device} >/dev/null 2>&1; then\n\
         \x20\x20mkfs.ext4 {device}\n\
         fi\n\
         mkdir -p {mount_point}\n\
         if ! grep -q '^{device} ' /etc/fstab; then\n\
         \x20\x20printf '{device} {mount_point} ext4 defaults,nofail 0 2\\n' >> /etc/fstab\n\
         fi\n\
         mount -a\n"
    )
}

/// Build the index-keyed instance arena from published attributes
///
/// A slot is `None` when that instance's sub-graph did not publish (it
/// failed to provision); subsequent slots never shift.
pub fn instance_set_from(cfg: &EnvironmentConfig, published: &Published) -> InstanceSet {
    let slots = (0..cfg.instance_count as usize)
        .map(|index| {
            let component = component_name(index);
            let instance = instance_name(cfg, index);
            let volume = volume_name(cfg, index);

            let instance_record = published.record(&component, &instance)?;
            let volume_record = published.record(&component, &volume)?;

            let addresses = instance_record
                .attributes
                .get("addresses")
                .and_then(AttributeValue::as_list)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .filter_map(|s| s.parse::<Ipv4Addr>().ok())
                        .collect()
                })
                .unwrap_or_default();

            Some(InstanceHandle {
                index,
                id: instance_record.id,
                name: instance,
                addresses,
                volume_id: volume_record.id,
            })
        })
        .collect::<Vec<_>>();

    debug!(
        live = slots.iter().filter(|s| s.is_some()).count(),
        total = slots.len(),
        "assembled instance set"
    );
    InstanceSet::from_slots(slots)
}
