// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tracing setup shared by binaries and long-running harnesses

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// Reads `RUST_LOG` for directives and defaults to `info`. Safe to call
/// once per process; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
