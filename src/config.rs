// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration Resolution
//!
//! Turns a raw, serde-deserializable configuration into a validated
//! [`EnvironmentConfig`]. Validation fails fast with a structured error
//! naming the offending field; no partial configuration is ever returned.
//! Optional components are resolved exactly once here into [`Feature`]
//! variants, so downstream composers match exhaustively instead of
//! re-checking flags.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Cidr, Feature, NetworkError};

/// Configuration validation error
///
/// Each variant names the offending field so callers can report a precise
/// diagnostic without string-matching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field `{field}` must not be empty")]
    EmptyField { field: &'static str },

    #[error("Field `instance_count` must be >= 1, got {value}")]
    InvalidInstanceCount { value: u32 },

    #[error("Field `volume_size_gb` must be > 0, got {value}")]
    InvalidVolumeSize { value: u32 },

    #[error("Field `{field}` contains invalid CIDR entry `{entry}`: {source}")]
    InvalidCidr {
        field: &'static str,
        entry: String,
        #[source]
        source: NetworkError,
    },

    #[error("Field `{field}` must be a non-zero port, got {value}")]
    InvalidPort { field: &'static str, value: u16 },

    #[error("Field `{field}` must be `allow` or `deny`, got `{value}`")]
    InvalidDefaultAction { field: &'static str, value: String },

    #[error("Firewall ingress default may not be `allow` on top of a default-deny base policy")]
    FirewallIngressDefaultAllow,
}

/// Default action of a firewall policy layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Allow,
    Deny,
}

impl DefaultAction {
    fn parse(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        match value {
            "allow" => Ok(DefaultAction::Allow),
            "deny" => Ok(DefaultAction::Deny),
            other => Err(ValidationError::InvalidDefaultAction {
                field,
                value: other.to_string(),
            }),
        }
    }
}

/// Raw configuration as supplied by the operator
///
/// All fields have defaults so a test fixture or a partial JSON/TOML file
/// can feed the resolver directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    /// Provider region / auth handle
    pub region: String,
    pub auth_ref: String,

    /// Provider network the compute tier attaches to
    pub network_id: String,

    /// Key pair / credential reference used for instance access
    pub key_ref: String,

    /// Naming prefix for every declared resource
    pub name_prefix: String,

    /// CIDR allow-lists, one rule per entry
    pub allow_ssh_cidrs: Vec<String>,
    pub allow_http_cidrs: Vec<String>,
    pub allow_https_cidrs: Vec<String>,

    /// Compute tier size
    pub instance_count: u32,

    /// Data volume size per instance
    pub volume_size_gb: u32,

    /// Port the application listens on
    pub compute_port: u16,

    /// Restrict egress instead of the default allow-all
    pub egress_restricted: bool,

    // Feature flags
    pub lb_enabled: bool,
    pub db_enabled: bool,
    pub fw_enabled: bool,
    pub ansible_enabled: bool,
    pub remote_exec_enabled: bool,

    // Load balancer settings
    pub lb_health_check_path: String,
    pub lb_assign_public_address: bool,
    pub lb_monitor_interval_secs: u64,
    pub lb_monitor_timeout_secs: u64,
    pub lb_monitor_retries: u32,

    // Database settings
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password_ref: String,

    // Firewall policy layer settings
    pub fw_ingress_default: String,
    pub fw_egress_default: String,

    // Configuration-run settings
    pub playbook_ref: String,
    pub settle_secs: u64,
    pub strict_host_key_checking: bool,

    // Verification-run settings
    pub verify_service_names: Vec<String>,
    pub verify_marker_path: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            region: "region-one".to_string(),
            auth_ref: "default".to_string(),
            network_id: "private-net".to_string(),
            key_ref: "deploy-key".to_string(),
            name_prefix: "app".to_string(),
            allow_ssh_cidrs: Vec::new(),
            allow_http_cidrs: Vec::new(),
            allow_https_cidrs: Vec::new(),
            instance_count: 1,
            volume_size_gb: 10,
            compute_port: 80,
            egress_restricted: false,
            lb_enabled: false,
            db_enabled: false,
            fw_enabled: false,
            ansible_enabled: false,
            remote_exec_enabled: false,
            lb_health_check_path: "/".to_string(),
            lb_assign_public_address: false,
            lb_monitor_interval_secs: 10,
            lb_monitor_timeout_secs: 5,
            lb_monitor_retries: 3,
            db_port: 5432,
            db_name: "appdb".to_string(),
            db_user: "app".to_string(),
            db_password_ref: "secret/db-password".to_string(),
            fw_ingress_default: "deny".to_string(),
            fw_egress_default: "allow".to_string(),
            playbook_ref: "site.yml".to_string(),
            settle_secs: 60,
            strict_host_key_checking: false,
            verify_service_names: vec![
                "nginx".to_string(),
                "httpd".to_string(),
                "apache2".to_string(),
            ],
            verify_marker_path: "/var/tmp/stackform-verify".to_string(),
        }
    }
}

/// Load balancer component settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSettings {
    pub port: u16,
    pub health_check_path: String,
    pub assign_public_address: bool,
    /// Health monitor tuning; design values, not hardcoded contracts
    pub monitor_interval: Duration,
    pub monitor_timeout: Duration,
    pub monitor_retries: u32,
}

/// Database component settings
///
/// Carries only non-sensitive connection facts plus a secret *reference*.
/// The secret value itself is fetched at invocation time by the
/// post-provision orchestrator and never stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password_ref: String,
}

/// Stricter firewall policy layer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirewallSettings {
    pub ingress_default: DefaultAction,
    pub egress_default: DefaultAction,
}

/// Configuration-run (external automation) settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRunSettings {
    pub playbook_ref: String,
    /// Fixed settle period before the first run against a fresh instance.
    /// Known limitation: a sleep rather than an active readiness probe.
    pub settle: Duration,
    pub strict_host_key_checking: bool,
}

/// Verification-run (remote smoke test) settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRunSettings {
    /// Candidate service unit names; the check passes if any is active
    pub service_names: Vec<String>,
    /// Port probed over local HTTP
    pub probe_port: u16,
    /// Path of the audit marker written by the verification pass
    pub marker_path: String,
}

/// Validated, internally-consistent configuration
///
/// Owned by the config resolver for the process lifetime; every other
/// entity in the engine is derived from it plus live provider state.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    pub region: String,
    pub auth_ref: String,
    pub network_id: String,
    pub key_ref: String,
    pub name_prefix: String,

    pub allow_ssh: Vec<Cidr>,
    pub allow_http: Vec<Cidr>,
    pub allow_https: Vec<Cidr>,

    pub instance_count: u32,
    pub volume_size_gb: u32,
    pub compute_port: u16,
    pub egress_restricted: bool,

    pub load_balancer: Feature<LoadBalancerSettings>,
    pub database: Feature<DatabaseSettings>,
    pub firewall: Feature<FirewallSettings>,
    pub configuration_run: Feature<ConfigurationRunSettings>,
    pub verification_run: Feature<VerificationRunSettings>,
}

/// Resolve and validate a raw configuration
///
/// Side-effect free. Fails fast on the first violation with an error
/// naming the offending field.
pub fn resolve(raw: RawConfig) -> Result<EnvironmentConfig, ValidationError> {
    require_non_empty("network_id", &raw.network_id)?;
    require_non_empty("key_ref", &raw.key_ref)?;
    require_non_empty("name_prefix", &raw.name_prefix)?;

    if raw.instance_count < 1 {
        return Err(ValidationError::InvalidInstanceCount {
            value: raw.instance_count,
        });
    }
    if raw.volume_size_gb == 0 {
        return Err(ValidationError::InvalidVolumeSize {
            value: raw.volume_size_gb,
        });
    }
    if raw.compute_port == 0 {
        return Err(ValidationError::InvalidPort {
            field: "compute_port",
            value: raw.compute_port,
        });
    }

    let allow_ssh = parse_cidrs("allow_ssh_cidrs", &raw.allow_ssh_cidrs)?;
    let allow_http = parse_cidrs("allow_http_cidrs", &raw.allow_http_cidrs)?;
    let allow_https = parse_cidrs("allow_https_cidrs", &raw.allow_https_cidrs)?;

    let load_balancer = if raw.lb_enabled {
        Feature::Present(LoadBalancerSettings {
            port: raw.compute_port,
            health_check_path: raw.lb_health_check_path.clone(),
            assign_public_address: raw.lb_assign_public_address,
            monitor_interval: Duration::from_secs(raw.lb_monitor_interval_secs),
            monitor_timeout: Duration::from_secs(raw.lb_monitor_timeout_secs),
            monitor_retries: raw.lb_monitor_retries,
        })
    } else {
        Feature::Absent
    };

    let database = if raw.db_enabled {
        require_non_empty("db_name", &raw.db_name)?;
        require_non_empty("db_user", &raw.db_user)?;
        require_non_empty("db_password_ref", &raw.db_password_ref)?;
        if raw.db_port == 0 {
            return Err(ValidationError::InvalidPort {
                field: "db_port",
                value: raw.db_port,
            });
        }
        Feature::Present(DatabaseSettings {
            port: raw.db_port,
            name: raw.db_name.clone(),
            user: raw.db_user.clone(),
            password_ref: raw.db_password_ref.clone(),
        })
    } else {
        Feature::Absent
    };

    let firewall = if raw.fw_enabled {
        let ingress_default = DefaultAction::parse("fw_ingress_default", &raw.fw_ingress_default)?;
        let egress_default = DefaultAction::parse("fw_egress_default", &raw.fw_egress_default)?;

        // Invariant: the layered policy may not re-permit traffic the
        // default-deny base policy denies.
        if ingress_default == DefaultAction::Allow {
            return Err(ValidationError::FirewallIngressDefaultAllow);
        }
        Feature::Present(FirewallSettings {
            ingress_default,
            egress_default,
        })
    } else {
        Feature::Absent
    };

    let configuration_run = if raw.ansible_enabled {
        require_non_empty("playbook_ref", &raw.playbook_ref)?;
        Feature::Present(ConfigurationRunSettings {
            playbook_ref: raw.playbook_ref.clone(),
            settle: Duration::from_secs(raw.settle_secs),
            strict_host_key_checking: raw.strict_host_key_checking,
        })
    } else {
        Feature::Absent
    };

    let verification_run = if raw.remote_exec_enabled {
        if raw.verify_service_names.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "verify_service_names",
            });
        }
        Feature::Present(VerificationRunSettings {
            service_names: raw.verify_service_names.clone(),
            probe_port: raw.compute_port,
            marker_path: raw.verify_marker_path.clone(),
        })
    } else {
        Feature::Absent
    };

    Ok(EnvironmentConfig {
        region: raw.region,
        auth_ref: raw.auth_ref,
        network_id: raw.network_id,
        key_ref: raw.key_ref,
        name_prefix: raw.name_prefix,
        allow_ssh,
        allow_http,
        allow_https,
        instance_count: raw.instance_count,
        volume_size_gb: raw.volume_size_gb,
        compute_port: raw.compute_port,
        egress_restricted: raw.egress_restricted,
        load_balancer,
        database,
        firewall,
        configuration_run,
        verification_run,
    })
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

fn parse_cidrs(field: &'static str, entries: &[String]) -> Result<Vec<Cidr>, ValidationError> {
    entries
        .iter()
        .map(|entry| {
            Cidr::new(entry).map_err(|source| ValidationError::InvalidCidr {
                field,
                entry: entry.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let cfg = resolve(RawConfig::default()).unwrap();
        assert_eq!(cfg.instance_count, 1);
        assert!(!cfg.load_balancer.is_present());
        assert!(!cfg.database.is_present());
        assert!(!cfg.configuration_run.is_present());
    }

    #[test]
    fn test_malformed_cidr_names_field() {
        let raw = RawConfig {
            allow_ssh_cidrs: vec!["10.0.0.0/24".to_string(), "bogus".to_string()],
            ..RawConfig::default()
        };
        let err = resolve(raw).unwrap_err();
        match err {
            ValidationError::InvalidCidr { field, entry, .. } => {
                assert_eq!(field, "allow_ssh_cidrs");
                assert_eq!(entry, "bogus");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_count_rejected() {
        let raw = RawConfig {
            instance_count: 0,
            ..RawConfig::default()
        };
        assert_eq!(
            resolve(raw).unwrap_err(),
            ValidationError::InvalidInstanceCount { value: 0 }
        );
    }

    #[test]
    fn test_empty_network_id_rejected() {
        let raw = RawConfig {
            network_id: "  ".to_string(),
            ..RawConfig::default()
        };
        assert_eq!(
            resolve(raw).unwrap_err(),
            ValidationError::EmptyField { field: "network_id" }
        );
    }

    #[test]
    fn test_zero_volume_rejected() {
        let raw = RawConfig {
            volume_size_gb: 0,
            ..RawConfig::default()
        };
        assert!(matches!(
            resolve(raw).unwrap_err(),
            ValidationError::InvalidVolumeSize { value: 0 }
        ));
    }

    #[test]
    fn test_firewall_ingress_allow_conflicts() {
        let raw = RawConfig {
            fw_enabled: true,
            fw_ingress_default: "allow".to_string(),
            ..RawConfig::default()
        };
        assert_eq!(
            resolve(raw).unwrap_err(),
            ValidationError::FirewallIngressDefaultAllow
        );
    }

    #[test]
    fn test_firewall_deny_deny_resolves() {
        let raw = RawConfig {
            fw_enabled: true,
            fw_ingress_default: "deny".to_string(),
            fw_egress_default: "deny".to_string(),
            ..RawConfig::default()
        };
        let cfg = resolve(raw).unwrap();
        let fw = cfg.firewall.get().unwrap();
        assert_eq!(fw.ingress_default, DefaultAction::Deny);
        assert_eq!(fw.egress_default, DefaultAction::Deny);
    }

    #[test]
    fn test_features_resolved_once() {
        let raw = RawConfig {
            lb_enabled: true,
            db_enabled: true,
            ansible_enabled: true,
            ..RawConfig::default()
        };
        let cfg = resolve(raw).unwrap();
        assert!(cfg.load_balancer.is_present());
        assert_eq!(cfg.database.get().unwrap().port, 5432);
        assert_eq!(
            cfg.configuration_run.get().unwrap().settle,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_raw_config_deserializes() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"instance_count": 3, "lb_enabled": true, "allow_ssh_cidrs": ["10.0.0.0/24"]}"#,
        )
        .unwrap();
        let cfg = resolve(raw).unwrap();
        assert_eq!(cfg.instance_count, 3);
        assert!(cfg.load_balancer.is_present());
        assert_eq!(cfg.allow_ssh.len(), 1);
    }
}
