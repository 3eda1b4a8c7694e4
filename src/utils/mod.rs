// src/utils/mod.rs
//! Shared utilities
//!
//! - **config**: Layered host configuration (file + environment)
//! - **errors**: Infrastructure error type and crate `Result`

pub mod config;
pub mod errors;

pub use config::HostConfig;
pub use errors::{HostError, Result};
