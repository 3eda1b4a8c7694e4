// src/lib.rs
//! Hosted Program Runtime Library
//!
//! This library hosts untrusted, student-authored programs inside a managed
//! session, runs them to completion or failure, and streams console output,
//! lifecycle status and errors to a remote client.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **protocol**: Client message envelope, typed kinds, safe send
//! - **exception**: Failure taxonomy and the single-boundary handler
//! - **loader**: Class loading and entry-point resolution
//! - **compiler**: Program sources and the compiler contract
//! - **runtime**: Sessions, console capture, quotas, orchestration
//! - **observability**: Tracing setup and metric names
//! - **utils**: Configuration and host errors

// Public module exports
pub mod compiler;
pub mod exception;
pub mod loader;
pub mod observability;
pub mod protocol;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use compiler::{CompileError, Compiler, ProgramSource};
pub use exception::{ErrorKind, ExceptionHandler, ExceptionKey, ExceptionRecord};
pub use protocol::{ClientMessage, OutputAdapter, SafeSender};
pub use runtime::{ExecutionSession, ProgramContext, SessionExecutor, SessionOutcome};
pub use utils::config::HostConfig;
pub use utils::errors::{HostError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Runtime build information
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert!(!info.version.is_empty());
        assert!(!info.git_hash.is_empty());
    }
}
