// src/observability/mod.rs
//! Logging and metrics setup
//!
//! - **Tracing**: `tracing_subscriber` registry with an `EnvFilter` and a
//!   plain or JSON formatting layer
//! - **Metrics**: counter names emitted through the `metrics` facade. No
//!   exporter is installed here; embedders pick their own recorder.

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{HostError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Counter names
pub mod names {
    /// Messages delivered to the transport, by `type`
    pub const MESSAGES_SENT: &str = "hosted_messages_sent_total";
    /// Messages not delivered, by `reason`
    pub const MESSAGES_DROPPED: &str = "hosted_messages_dropped_total";
    /// Failures routed by the exception handler, by `kind`
    pub const EXCEPTIONS: &str = "hosted_exceptions_total";
    /// Rejected quota consumptions, by `quota`
    pub const QUOTA_REJECTIONS: &str = "hosted_quota_rejections_total";
    /// Finished sessions, by `outcome`
    pub const SESSIONS: &str = "hosted_sessions_total";
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Returns `Ok(false)` when a
/// subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| HostError::ObservabilityError(format!("invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    Ok(installed.is_ok())
}

/// Register descriptions for every counter with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(names::MESSAGES_SENT, "Client messages delivered to the transport");
    metrics::describe_counter!(names::MESSAGES_DROPPED, "Client messages that were not delivered");
    metrics::describe_counter!(names::EXCEPTIONS, "Session failures by kind");
    metrics::describe_counter!(names::QUOTA_REJECTIONS, "Side-effecting calls rejected by a quota");
    metrics::describe_counter!(names::SESSIONS, "Finished sessions by outcome");
}
