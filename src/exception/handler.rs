// src/exception/handler.rs
//! Single-boundary failure routing
//!
//! Every failure that reaches the outer frame of a session passes through
//! [`ExceptionHandler::handle`] exactly once. The handler never forwards
//! host diagnostics to the client: users see a symbolic key and catalog
//! text, plus the cause only when the cause is their own program.

use crate::exception::catalog::MessageCatalog;
use crate::exception::kind::{ErrorKind, ExceptionKey, LogSeverity};
use crate::exception::record::ExceptionRecord;
use crate::observability::names;
use crate::protocol::message::{Detail, DetailKey, ExceptionMessage};
use crate::protocol::sink::SafeSender;
use std::sync::Arc;
use tracing::{error, warn};

/// Logging collaborator
pub trait ErrorLog: Send + Sync {
    fn severe(&self, tag: &str, record: &ExceptionRecord);
    fn warning(&self, tag: &str, record: &ExceptionRecord);
}

/// `ErrorLog` backed by `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingErrorLog {
    session_id: String,
}

impl TracingErrorLog {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

impl ErrorLog for TracingErrorLog {
    fn severe(&self, tag: &str, record: &ExceptionRecord) {
        let cause = record.cause_message().unwrap_or_default();
        error!(
            session_id = %self.session_id,
            tag,
            kind = %record.kind(),
            cause = %cause,
            "session failure"
        );
    }

    fn warning(&self, tag: &str, record: &ExceptionRecord) {
        let cause = record.cause_message().unwrap_or_default();
        warn!(
            session_id = %self.session_id,
            tag,
            kind = %record.kind(),
            cause = %cause,
            "session diagnostic"
        );
    }
}

/// Process termination collaborator
pub trait Terminator: Send + Sync {
    fn terminate(&self, exit_code: i32);
}

/// Exits the host process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, exit_code: i32) {
        std::process::exit(exit_code);
    }
}

/// What the handler did with a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledFailure {
    pub kind: ErrorKind,
    pub key: ExceptionKey,
    pub notified_user: bool,
    /// Set when the failure terminated the process
    pub exit_code: Option<i32>,
}

/// Central failure router for one session
pub struct ExceptionHandler {
    sender: Arc<SafeSender>,
    catalog: Arc<MessageCatalog>,
    log: Arc<dyn ErrorLog>,
    terminator: Arc<dyn Terminator>,
}

impl ExceptionHandler {
    pub fn new(
        sender: Arc<SafeSender>,
        catalog: Arc<MessageCatalog>,
        log: Arc<dyn ErrorLog>,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            sender,
            catalog,
            log,
            terminator,
        }
    }

    /// Recover the record a failure carries, or classify it as Unknown
    pub fn classify(failure: anyhow::Error) -> ExceptionRecord {
        match failure.downcast::<ExceptionRecord>() {
            Ok(record) => record,
            Err(foreign) => ExceptionRecord::unknown().with_cause(foreign),
        }
    }

    /// Route any failure
    pub fn handle(&self, failure: anyhow::Error) -> HandledFailure {
        self.handle_record(Self::classify(failure))
    }

    /// Route a typed failure
    pub fn handle_record(&self, record: ExceptionRecord) -> HandledFailure {
        let kind = record.kind();
        let policy = kind.policy();
        let tag = record.key().as_str();

        metrics::counter!(names::EXCEPTIONS, "kind" => kind.as_str()).increment(1);

        match policy.log {
            LogSeverity::Severe => self.log.severe(tag, &record),
            LogSeverity::Warning => self.log.warning(tag, &record),
            LogSeverity::None => {}
        }

        let exit_code = if policy.terminate { record.exit_code() } else { None };

        let notified_user = if policy.notify_user {
            self.sender.send(self.user_message(&record, exit_code))
        } else {
            false
        };

        let handled = HandledFailure {
            kind,
            key: record.key(),
            notified_user,
            exit_code,
        };

        if let Some(code) = exit_code {
            self.terminator.terminate(code);
        }

        handled
    }

    fn user_message(&self, record: &ExceptionRecord, exit_code: Option<i32>) -> ExceptionMessage {
        let text = self
            .catalog
            .lookup(record.key())
            .or(record.fallback_message())
            .unwrap_or_else(|| record.kind().generic_message());

        let mut detail = Detail::new();
        detail.insert(DetailKey::FallbackMessage, text.to_string());

        // Only the hosted program's own diagnostics reach the client
        if record.kind() == ErrorKind::UserInitiated {
            detail.extend(record.detail().iter().map(|(k, v)| (*k, v.clone())));
            if let Some(cause) = record.cause_message() {
                detail.insert(DetailKey::Cause, cause);
            }
        }

        if let Some(code) = exit_code {
            detail.insert(DetailKey::ExitCode, code.to_string());
        }

        ExceptionMessage {
            key: record.key().as_str().to_string(),
            detail,
        }
    }
}
