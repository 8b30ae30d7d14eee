// Copyright (c) 2025 - Cowboy AI, Inc.
//! Declarative infrastructure composition
//!
//! Stackform turns a flat environment configuration into a composed
//! deployment: audit storage, a layered security posture, an indexed
//! compute tier with per-instance data volumes, and optional database and
//! load-balancer components, then converges cloud state to match and
//! runs post-provision configuration and verification passes.
//!
//! ```text
//! RawConfig ──resolve──> EnvironmentConfig
//!                              │
//!                      composers (pure)
//!                              │
//!                        ComponentPlans ──Engine──> Provider
//!                              │                       │
//!                           Published <────publish─────┘
//!                              │
//!              ┌───────────────┼────────────────┐
//!        StackOutputs    Orchestrator     derived rules
//! ```
//!
//! Everything upstream of the [`provider::Provider`] boundary is pure and
//! deterministic; every mutation goes through idempotent `ensure` calls,
//! so re-applying an unchanged configuration performs no work.

pub mod compose;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod outputs;
pub mod provider;
pub mod provision;
pub mod telemetry;

// Re-export commonly used types
pub use config::{resolve, EnvironmentConfig, RawConfig, ValidationError};
pub use engine::{ApplySummary, ComponentStatus, Engine};
pub use errors::{ComposeError, ComposeResult};
pub use outputs::{aggregate, StackOutputs};
pub use provider::{InMemoryProvider, Provider, ResourceSpec};
pub use provision::{Orchestrator, ProvisionOutcome, ProvisionReport};
