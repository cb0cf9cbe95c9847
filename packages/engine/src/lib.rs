// packages/engine/src/lib.rs
//! Sensor Guard Engine Library
//!
//! This library intercepts sensor listener registrations, wraps each
//! consumer in a proxy and rewrites readings before the consumer sees them.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **interception**: listener registry, proxies, transforms and the registration facade
//! - **replay**: offline replay of captured readings through the interception layer
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors

// Public module exports
pub mod interception;
pub mod observability;
pub mod replay;
pub mod utils;

// Re-export commonly used types
pub use interception::{
    ListenerHandle, ListenerKey, ListenerProxy, ListenerRegistry, RegistrationFacade, Sensor,
    SensorEvent, SensorEventListener, SensorKind, SensorManager, Substitute,
};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, built {} with {})",
            self.version, self.git_hash, self.build_timestamp, self.rustc_version
        )
    }
}
