// Copyright (c) 2025 - Cowboy AI, Inc.
//! Database Composer
//!
//! Present only when the database feature is enabled. Declares one
//! database instance with its own dedicated security group; that group's
//! single ingress rule references the compute tier's group identity: a
//! group-to-group reference, never a CIDR. Database exposure thus tracks
//! compute-tier membership as instances come and go and is immune to
//! address churn.
//!
//! This component never accepts or forwards secret material. Its outputs
//! are limited to non-sensitive connection facts (host, port, database
//! name, user); the password is fetched out of band by the post-provision
//! orchestrator at invocation time.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::config::{DatabaseSettings, EnvironmentConfig};
use crate::domain::{PortRange, Protocol, SecurityRule};
use crate::provider::ResourceSpec;

use super::{ComponentPlan, Published};

/// Component name used for published database attributes
pub const COMPONENT: &str = "database";

/// Logical name of the database's dedicated security group
pub fn group_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-db", cfg.name_prefix)
}

/// Logical name of the database instance
pub fn instance_name(cfg: &EnvironmentConfig) -> String {
    format!("{}-db-node", cfg.name_prefix)
}

/// Declare the database component
///
/// `compute_group` is the logical name of the compute tier's security
/// group, published by the security composer.
pub fn compose(
    cfg: &EnvironmentConfig,
    db: &DatabaseSettings,
    compute_group: &str,
) -> ComponentPlan {
    let group = group_name(cfg);

    let mut plan = ComponentPlan::new(COMPONENT);
    plan.push(ResourceSpec::SecurityGroup {
        name: group.clone(),
        description: format!("{} database (compute-tier members only)", cfg.name_prefix),
    });
    plan.push(ResourceSpec::SecurityGroupRule {
        name: format!("{group}-rule-0"),
        group: group.clone(),
        rule: SecurityRule::ingress_from_group(
            Protocol::Tcp,
            PortRange::new(db.port, db.port).unwrap_or(PortRange::all()),
            compute_group,
        ),
    });
    plan.push(ResourceSpec::Instance {
        name: instance_name(cfg),
        network_id: cfg.network_id.clone(),
        key_ref: cfg.key_ref.clone(),
        security_groups: vec![group],
        user_data: None,
    });
    plan
}

/// Non-sensitive connection facts exposed to the orchestrator
///
/// Deliberately has no password field; secret material never passes
/// through this component's output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbFacts {
    pub host: Ipv4Addr,
    pub port: u16,
    pub name: String,
    pub user: String,
}

/// Derive connection facts from published attributes
///
/// `None` when the database is absent or has not published a host address.
pub fn connection_facts(cfg: &EnvironmentConfig, published: &Published) -> Option<DbFacts> {
    let db = cfg.database.get()?;
    let host = published
        .attr(COMPONENT, &instance_name(cfg), "primary_address")?
        .as_str()?
        .parse()
        .ok()?;

    Some(DbFacts {
        host,
        port: db.port,
        name: db.name.clone(),
        user: db.user.clone(),
    })
}
