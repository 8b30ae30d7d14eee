// Copyright (c) 2025 - Cowboy AI, Inc.
//! Post-Provision Orchestrator
//!
//! Two independent modes, each gated by its own feature and each keyed by
//! a [`ProvisionTrigger`] content hash covering the instance identity, its
//! current addresses, and the automation target. An unchanged hash means
//! the pass is skipped; a changed hash means it re-runs (idempotent
//! convergence, not unconditional re-execution).
//!
//! - *Configuration run*: waits a fixed settle period, then invokes the
//!   external configuration runner once per instance with derived
//!   non-secret facts. The settle sleep is a known limitation: a fixed
//!   delay rather than an active readiness probe.
//! - *Verification run*: remote read-only smoke checks (service-active
//!   tolerant of alternate unit names, a local HTTP probe, and an audit
//!   marker write, the only mutation).
//!
//! Passes fan out per instance and run concurrently across instances but
//! strictly sequentially within one. Failure of one instance's pass never
//! prevents the others from running.
//!
//! Secret material is fetched from the [`SecretSource`] at invocation time
//! and handed to the runner transiently; it is never published or stored.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::compose::database::DbFacts;
use crate::config::{ConfigurationRunSettings, EnvironmentConfig, VerificationRunSettings};
use crate::domain::{Feature, InstanceHandle, InstanceSet, ProvisionTrigger, ResourceId};
use crate::errors::ComposeError;

/// External automation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Runner exited with status {0}")]
    NonZeroExit(i32),

    #[error("Connection to target failed: {0}")]
    Connection(String),

    #[error("Secret `{0}` unavailable")]
    SecretUnavailable(String),
}

/// Configuration-management runner boundary (opaque external command)
#[async_trait]
pub trait ConfigurationRunner: Send + Sync {
    /// Apply the referenced playbook against a single target address
    async fn run(
        &self,
        target: Ipv4Addr,
        credential_ref: &str,
        extra_vars: &BTreeMap<String, String>,
        playbook_ref: &str,
        strict_host_key_checking: bool,
    ) -> Result<(), RunnerError>;
}

/// Remote execution channel for verification commands
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command on the target, returning its exit status
    async fn exec(&self, target: Ipv4Addr, command: &str) -> Result<i32, RunnerError>;
}

/// External secret store, consulted only at invocation time
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, secret_ref: &str) -> Result<String, RunnerError>;
}

/// Orchestration mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionMode {
    Configuration,
    Verification,
}

impl ProvisionMode {
    fn tag(&self) -> &'static str {
        match self {
            ProvisionMode::Configuration => "configuration",
            ProvisionMode::Verification => "verification",
        }
    }
}

/// Outcome of one instance's pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The pass ran and succeeded
    Applied,
    /// The trigger hash was unchanged; nothing ran
    Skipped,
    /// The pass failed; other instances are unaffected
    Failed(String),
}

/// Per-instance, per-mode report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub index: usize,
    pub mode: ProvisionMode,
    pub outcome: ProvisionOutcome,
}

impl ProvisionReport {
    /// Failed outcome as a crate error, for callers that abort on failure
    pub fn to_error(&self) -> Option<ComposeError> {
        match &self.outcome {
            ProvisionOutcome::Failed(message) => Some(ComposeError::Provision {
                index: self.index,
                message: message.clone(),
            }),
            ProvisionOutcome::Applied | ProvisionOutcome::Skipped => None,
        }
    }
}

/// Last-known-good trigger hashes, persisted alongside published state
pub trait TriggerStore: Send + Sync {
    /// Hash recorded for the instance in the given mode, if any
    fn last(&self, instance: &ResourceId, mode: ProvisionMode) -> Option<String>;

    /// Record a hash after a successful pass
    fn record(&self, instance: &ResourceId, mode: ProvisionMode, hash: &str);
}

/// In-memory trigger store
#[derive(Debug, Default)]
pub struct InMemoryTriggerStore {
    hashes: Mutex<BTreeMap<(ResourceId, &'static str), String>>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerStore for InMemoryTriggerStore {
    fn last(&self, instance: &ResourceId, mode: ProvisionMode) -> Option<String> {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(*instance, mode.tag()))
            .cloned()
    }

    fn record(&self, instance: &ResourceId, mode: ProvisionMode, hash: &str) {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((*instance, mode.tag()), hash.to_string());
    }
}

/// Post-provision orchestrator
pub struct Orchestrator {
    runner: Arc<dyn ConfigurationRunner>,
    executor: Arc<dyn RemoteExecutor>,
    secrets: Arc<dyn SecretSource>,
    triggers: Arc<dyn TriggerStore>,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn ConfigurationRunner>,
        executor: Arc<dyn RemoteExecutor>,
        secrets: Arc<dyn SecretSource>,
        triggers: Arc<dyn TriggerStore>,
    ) -> Self {
        Self {
            runner,
            executor,
            secrets,
            triggers,
        }
    }

    /// Run every enabled mode against every live instance
    ///
    /// Reports come back sorted by mode then instance index; absent modes
    /// contribute no reports.
    pub async fn run(
        &self,
        cfg: &EnvironmentConfig,
        instances: &InstanceSet,
        db: Option<&DbFacts>,
    ) -> Vec<ProvisionReport> {
        let mut reports = Vec::new();

        if let Feature::Present(settings) = &cfg.configuration_run {
            reports.extend(
                self.run_configuration(cfg, settings, instances, db)
                    .await,
            );
        }
        if let Feature::Present(settings) = &cfg.verification_run {
            reports.extend(self.run_verification(settings, instances).await);
        }

        reports.sort_by_key(|r| (r.mode, r.index));
        reports
    }

    async fn run_configuration(
        &self,
        cfg: &EnvironmentConfig,
        settings: &ConfigurationRunSettings,
        instances: &InstanceSet,
        db: Option<&DbFacts>,
    ) -> Vec<ProvisionReport> {
        let mut set = JoinSet::new();

        for handle in instances.live() {
            let runner = Arc::clone(&self.runner);
            let secrets = Arc::clone(&self.secrets);
            let triggers = Arc::clone(&self.triggers);
            let settings = settings.clone();
            let handle = handle.clone();
            let credential_ref = cfg.key_ref.clone();
            let db = db.cloned();
            let db_password_ref = cfg
                .database
                .get()
                .map(|settings| settings.password_ref.clone());

            set.spawn(async move {
                let outcome = configuration_pass(
                    runner.as_ref(),
                    secrets.as_ref(),
                    triggers.as_ref(),
                    &settings,
                    &handle,
                    &credential_ref,
                    db.as_ref(),
                    db_password_ref.as_deref(),
                )
                .await;
                ProvisionReport {
                    index: handle.index,
                    mode: ProvisionMode::Configuration,
                    outcome,
                }
            });
        }

        collect(set).await
    }

    async fn run_verification(
        &self,
        settings: &VerificationRunSettings,
        instances: &InstanceSet,
    ) -> Vec<ProvisionReport> {
        let mut set = JoinSet::new();

        for handle in instances.live() {
            let executor = Arc::clone(&self.executor);
            let triggers = Arc::clone(&self.triggers);
            let settings = settings.clone();
            let handle = handle.clone();

            set.spawn(async move {
                let outcome =
                    verification_pass(executor.as_ref(), triggers.as_ref(), &settings, &handle)
                        .await;
                ProvisionReport {
                    index: handle.index,
                    mode: ProvisionMode::Verification,
                    outcome,
                }
            });
        }

        collect(set).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn configuration_pass(
    runner: &dyn ConfigurationRunner,
    secrets: &dyn SecretSource,
    triggers: &dyn TriggerStore,
    settings: &ConfigurationRunSettings,
    handle: &InstanceHandle,
    credential_ref: &str,
    db: Option<&DbFacts>,
    db_password_ref: Option<&str>,
) -> ProvisionOutcome {
    let trigger = ProvisionTrigger::new(
        handle.id,
        &handle.addresses,
        &settings.playbook_ref,
        credential_ref,
    );
    if triggers.last(&handle.id, ProvisionMode::Configuration).as_deref()
        == Some(trigger.content_hash.as_str())
    {
        debug!(instance = %handle.name, "trigger unchanged, skipping configuration run");
        return ProvisionOutcome::Skipped;
    }

    let Some(target) = handle.primary_address() else {
        return ProvisionOutcome::Failed("instance has no address".to_string());
    };

    // Known limitation: fixed settle delay, not a readiness probe.
    sleep(settings.settle).await;

    let mut extra_vars = BTreeMap::new();
    extra_vars.insert("instance_address".to_string(), target.to_string());
    if let Some(facts) = db {
        extra_vars.insert("db_host".to_string(), facts.host.to_string());
        extra_vars.insert("db_port".to_string(), facts.port.to_string());
        extra_vars.insert("db_name".to_string(), facts.name.clone());
        extra_vars.insert("db_user".to_string(), facts.user.clone());

        // Fetched at invocation time, handed over transiently, never
        // recorded anywhere.
        if let Some(secret_ref) = db_password_ref {
            match secrets.fetch(secret_ref).await {
                Ok(password) => {
                    extra_vars.insert("db_password".to_string(), password);
                }
                Err(err) => return ProvisionOutcome::Failed(err.to_string()),
            }
        }
    }

    match runner
        .run(
            target,
            credential_ref,
            &extra_vars,
            &settings.playbook_ref,
            settings.strict_host_key_checking,
        )
        .await
    {
        Ok(()) => {
            triggers.record(&handle.id, ProvisionMode::Configuration, &trigger.content_hash);
            info!(instance = %handle.name, "configuration run applied");
            ProvisionOutcome::Applied
        }
        Err(err) => {
            warn!(instance = %handle.name, error = %err, "configuration run failed");
            ProvisionOutcome::Failed(err.to_string())
        }
    }
}

async fn verification_pass(
    executor: &dyn RemoteExecutor,
    triggers: &dyn TriggerStore,
    settings: &VerificationRunSettings,
    handle: &InstanceHandle,
) -> ProvisionOutcome {
    // The hash must cover the whole command sequence: service candidates,
    // probe port, and marker path all change what runs on the host.
    let automation_target = format!(
        "verify:{}:{}:{}",
        settings.service_names.join(","),
        settings.probe_port,
        settings.marker_path
    );
    let trigger = ProvisionTrigger::new(handle.id, &handle.addresses, &automation_target, "");
    if triggers.last(&handle.id, ProvisionMode::Verification).as_deref()
        == Some(trigger.content_hash.as_str())
    {
        return ProvisionOutcome::Skipped;
    }

    let Some(target) = handle.primary_address() else {
        return ProvisionOutcome::Failed("instance has no address".to_string());
    };

    for command in verification_commands(settings) {
        match executor.exec(target, &command).await {
            Ok(0) => {}
            Ok(code) => {
                return ProvisionOutcome::Failed(format!("`{command}` exited with {code}"));
            }
            Err(err) => return ProvisionOutcome::Failed(err.to_string()),
        }
    }

    triggers.record(&handle.id, ProvisionMode::Verification, &trigger.content_hash);
    ProvisionOutcome::Applied
}

/// Fixed sequence of read-only checks plus the audit marker write
pub fn verification_commands(settings: &VerificationRunSettings) -> Vec<String> {
    let service_check = settings
        .service_names
        .iter()
        .map(|name| format!("systemctl is-active {name}"))
        .collect::<Vec<_>>()
        .join(" || ");

    vec![
        service_check,
        format!(
            "curl -fsS http://127.0.0.1:{}/ >/dev/null",
            settings.probe_port
        ),
        format!("date -u +%FT%TZ > {}", settings.marker_path),
    ]
}

async fn collect(mut set: JoinSet<ProvisionReport>) -> Vec<ProvisionReport> {
    let mut reports = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(join_err) => warn!(error = %join_err, "provision task aborted"),
        }
    }
    reports
}

/// Recording configuration runner for tests
///
/// Captures every invocation and can be told to fail for specific
/// targets.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<RunnerInvocation>>,
    fail_targets: Mutex<Vec<Ipv4Addr>>,
}

/// One captured runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInvocation {
    pub target: Ipv4Addr,
    pub credential_ref: String,
    pub extra_vars: BTreeMap<String, String>,
    pub playbook_ref: String,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any invocation against this target
    pub fn fail_target(&self, target: Ipv4Addr) {
        self.fail_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
    }

    /// Captured invocations, in call order
    pub fn invocations(&self) -> Vec<RunnerInvocation> {
        self.invocations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ConfigurationRunner for RecordingRunner {
    async fn run(
        &self,
        target: Ipv4Addr,
        credential_ref: &str,
        extra_vars: &BTreeMap<String, String>,
        playbook_ref: &str,
        _strict_host_key_checking: bool,
    ) -> Result<(), RunnerError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunnerInvocation {
                target,
                credential_ref: credential_ref.to_string(),
                extra_vars: extra_vars.clone(),
                playbook_ref: playbook_ref.to_string(),
            });

        if self
            .fail_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&target)
        {
            return Err(RunnerError::NonZeroExit(2));
        }
        Ok(())
    }
}

/// Recording remote executor for tests; every command exits 0 unless a
/// failing substring is configured
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<(Ipv4Addr, String)>>,
    fail_containing: Mutex<Option<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing this substring exit non-zero
    pub fn fail_commands_containing(&self, needle: impl Into<String>) {
        *self.fail_containing.lock().unwrap_or_else(PoisonError::into_inner) = Some(needle.into());
    }

    /// Captured commands, in call order
    pub fn commands(&self) -> Vec<(Ipv4Addr, String)> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn exec(&self, target: Ipv4Addr, command: &str) -> Result<i32, RunnerError> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target, command.to_string()));

        let failing = self.fail_containing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.as_deref().is_some_and(|n| command.contains(n)) {
            return Ok(3);
        }
        Ok(0)
    }
}

/// Static secret map for tests
#[derive(Debug, Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, secret_ref: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(secret_ref.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecrets {
    async fn fetch(&self, secret_ref: &str) -> Result<String, RunnerError> {
        self.values
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| RunnerError::SecretUnavailable(secret_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawConfig};

    fn orchestrator_with(
        runner: Arc<RecordingRunner>,
        executor: Arc<RecordingExecutor>,
        triggers: Arc<InMemoryTriggerStore>,
    ) -> Orchestrator {
        Orchestrator::new(
            runner,
            executor,
            Arc::new(StaticSecrets::new().with("secret/db-password", "hunter2")),
            triggers,
        )
    }

    fn instances(addresses: &[&str]) -> InstanceSet {
        let slots = addresses
            .iter()
            .enumerate()
            .map(|(index, addr)| {
                Some(InstanceHandle {
                    index,
                    id: ResourceId::new(),
                    name: format!("app-node-{index}"),
                    addresses: vec![addr.parse().unwrap()],
                    volume_id: ResourceId::new(),
                })
            })
            .collect();
        InstanceSet::from_slots(slots)
    }

    fn config_run_cfg() -> crate::config::EnvironmentConfig {
        resolve(RawConfig {
            instance_count: 2,
            ansible_enabled: true,
            settle_secs: 0,
            ..RawConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_run_per_instance() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner.clone(), executor, triggers);

        let set = instances(&["10.0.0.11", "10.0.0.12"]);
        let reports = orchestrator.run(&config_run_cfg(), &set, None).await;

        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| r.outcome == ProvisionOutcome::Applied));

        // N independent invocations, each addressed individually
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        let mut targets: Vec<_> = invocations.iter().map(|i| i.target.to_string()).collect();
        targets.sort();
        assert_eq!(targets, vec!["10.0.0.11", "10.0.0.12"]);
    }

    #[tokio::test]
    async fn test_unchanged_trigger_skips_rerun() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner.clone(), executor, triggers);

        let cfg = config_run_cfg();
        let set = instances(&["10.0.0.11", "10.0.0.12"]);

        let first = orchestrator.run(&cfg, &set, None).await;
        assert!(first.iter().all(|r| r.outcome == ProvisionOutcome::Applied));

        let second = orchestrator.run(&cfg, &set, None).await;
        assert!(second.iter().all(|r| r.outcome == ProvisionOutcome::Skipped));
        assert_eq!(runner.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_isolated_per_instance() {
        let runner = Arc::new(RecordingRunner::new());
        runner.fail_target("10.0.0.11".parse().unwrap());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner.clone(), executor, triggers);

        let cfg = config_run_cfg();
        let set = instances(&["10.0.0.11", "10.0.0.12"]);
        let reports = orchestrator.run(&cfg, &set, None).await;

        assert!(matches!(reports[0].outcome, ProvisionOutcome::Failed(_)));
        assert_eq!(reports[0].to_error().unwrap().kind(), "provision");
        assert_eq!(reports[1].outcome, ProvisionOutcome::Applied);
        assert!(reports[1].to_error().is_none());

        // The failed pass records no hash, so it re-runs next pass while
        // the successful one skips.
        let again = orchestrator.run(&cfg, &set, None).await;
        assert!(matches!(again[0].outcome, ProvisionOutcome::Failed(_)));
        assert_eq!(again[1].outcome, ProvisionOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_db_facts_and_secret_passed_transiently() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner.clone(), executor, triggers);

        let cfg = resolve(RawConfig {
            ansible_enabled: true,
            db_enabled: true,
            settle_secs: 0,
            ..RawConfig::default()
        })
        .unwrap();
        let set = instances(&["10.0.0.11"]);
        let facts = DbFacts {
            host: "10.0.0.20".parse().unwrap(),
            port: 5432,
            name: "appdb".to_string(),
            user: "app".to_string(),
        };

        let reports = orchestrator.run(&cfg, &set, Some(&facts)).await;
        assert_eq!(reports[0].outcome, ProvisionOutcome::Applied);

        let vars = &runner.invocations()[0].extra_vars;
        assert_eq!(vars.get("db_host").map(String::as_str), Some("10.0.0.20"));
        assert_eq!(vars.get("db_port").map(String::as_str), Some("5432"));
        assert_eq!(vars.get("db_password").map(String::as_str), Some("hunter2"));
    }

    #[tokio::test]
    async fn test_verification_commands_are_read_only_plus_marker() {
        let cfg = resolve(RawConfig {
            remote_exec_enabled: true,
            ..RawConfig::default()
        })
        .unwrap();
        let settings = cfg.verification_run.get().unwrap();
        let commands = verification_commands(settings);

        assert_eq!(commands.len(), 3);
        // Tolerant of multiple possible service names
        assert!(commands[0].contains("systemctl is-active nginx"));
        assert!(commands[0].contains(" || systemctl is-active httpd"));
        // Local HTTP probe
        assert!(commands[1].contains("curl -fsS http://127.0.0.1:80/"));
        // Audit marker is the only mutation
        assert!(commands[2].contains("/var/tmp/stackform-verify"));
    }

    #[tokio::test]
    async fn test_verification_pass_runs_and_skips() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner, executor.clone(), triggers);

        let cfg = resolve(RawConfig {
            remote_exec_enabled: true,
            ..RawConfig::default()
        })
        .unwrap();
        let set = instances(&["10.0.0.11"]);

        let first = orchestrator.run(&cfg, &set, None).await;
        assert_eq!(first[0].mode, ProvisionMode::Verification);
        assert_eq!(first[0].outcome, ProvisionOutcome::Applied);
        assert_eq!(executor.commands().len(), 3);

        let second = orchestrator.run(&cfg, &set, None).await;
        assert_eq!(second[0].outcome, ProvisionOutcome::Skipped);
        assert_eq!(executor.commands().len(), 3);
    }

    #[tokio::test]
    async fn test_changed_service_list_reruns_verification() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner, executor.clone(), triggers);

        let set = instances(&["10.0.0.11"]);

        let cfg = resolve(RawConfig {
            remote_exec_enabled: true,
            verify_service_names: vec!["nginx".to_string()],
            ..RawConfig::default()
        })
        .unwrap();
        let first = orchestrator.run(&cfg, &set, None).await;
        assert_eq!(first[0].outcome, ProvisionOutcome::Applied);

        // A different service list is a different command sequence, so the
        // pass must re-run rather than skip on the stale hash.
        let cfg = resolve(RawConfig {
            remote_exec_enabled: true,
            verify_service_names: vec!["caddy".to_string()],
            ..RawConfig::default()
        })
        .unwrap();
        let second = orchestrator.run(&cfg, &set, None).await;
        assert_eq!(second[0].outcome, ProvisionOutcome::Applied);
        assert!(executor
            .commands()
            .iter()
            .any(|(_, cmd)| cmd.contains("systemctl is-active caddy")));
    }

    #[tokio::test]
    async fn test_verification_failure_reports_command() {
        let runner = Arc::new(RecordingRunner::new());
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_commands_containing("curl");
        let triggers = Arc::new(InMemoryTriggerStore::new());
        let orchestrator = orchestrator_with(runner, executor, triggers);

        let cfg = resolve(RawConfig {
            remote_exec_enabled: true,
            ..RawConfig::default()
        })
        .unwrap();
        let set = instances(&["10.0.0.11"]);

        let reports = orchestrator.run(&cfg, &set, None).await;
        match &reports[0].outcome {
            ProvisionOutcome::Failed(message) => assert!(message.contains("curl")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
