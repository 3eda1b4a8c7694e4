// src/exception/record.rs
//! Typed failure value

use crate::exception::kind::{ErrorKind, ExceptionKey};
use crate::protocol::message::{Detail, DetailKey};
use std::error::Error as StdError;
use thiserror::Error;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// A failure with a kind and a symbolic key
///
/// Built at the point of failure and consumed once by the
/// [`ExceptionHandler`](crate::exception::ExceptionHandler). Producers
/// return it through `anyhow::Error`; the handler recovers it by downcast.
#[derive(Debug, Error)]
#[error("{kind} failure {key}")]
pub struct ExceptionRecord {
    kind: ErrorKind,
    key: ExceptionKey,
    #[source]
    cause: Option<BoxedCause>,
    fallback_message: Option<String>,
    detail: Detail,
    host_raised: bool,
}

impl ExceptionRecord {
    pub fn new(kind: ErrorKind, key: ExceptionKey) -> Self {
        Self {
            kind,
            key,
            cause: None,
            fallback_message: None,
            detail: Detail::new(),
            host_raised: false,
        }
    }

    /// Record with the key's usual kind
    pub fn of(key: ExceptionKey) -> Self {
        Self::new(key.default_kind(), key)
    }

    pub fn user(key: ExceptionKey) -> Self {
        Self::new(ErrorKind::UserInitiated, key)
    }

    pub fn internal(key: ExceptionKey) -> Self {
        Self::new(ErrorKind::InternalServer, key)
    }

    pub fn internal_facing(key: ExceptionKey) -> Self {
        Self::new(ErrorKind::InternalFacing, key)
    }

    pub fn fatal(key: ExceptionKey) -> Self {
        Self::new(ErrorKind::Fatal, key)
    }

    pub fn unknown() -> Self {
        Self::new(ErrorKind::Unknown, ExceptionKey::UnknownError)
    }

    pub fn with_cause(mut self, cause: impl Into<BoxedCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_fallback(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, key: DetailKey, value: impl Into<String>) -> Self {
        self.detail.insert(key, value.into());
        self
    }

    /// Mark a record raised by a host service on behalf of the program
    pub(crate) fn raised_by_host(mut self) -> Self {
        self.host_raised = true;
        self
    }

    pub(crate) fn is_host_raised(&self) -> bool {
        self.host_raised
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn key(&self) -> ExceptionKey {
        self.key
    }

    pub fn fallback_message(&self) -> Option<&str> {
        self.fallback_message.as_deref()
    }

    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    /// Rendered cause chain, outermost first
    pub fn cause_message(&self) -> Option<String> {
        let cause = self.cause.as_ref()?;
        let mut rendered = cause.to_string();
        let mut source = cause.source();
        while let Some(err) = source {
            rendered.push_str(": ");
            rendered.push_str(&err.to_string());
            source = err.source();
        }
        Some(rendered)
    }

    /// Exit code when this record terminates the process
    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Fatal => Some(self.key.exit_code().unwrap_or(1)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(ExceptionRecord::user(ExceptionKey::TooManyWrites).kind(), ErrorKind::UserInitiated);
        assert_eq!(ExceptionRecord::of(ExceptionKey::ContentStoreFailure).kind(), ErrorKind::InternalServer);
        assert_eq!(ExceptionRecord::unknown().key(), ExceptionKey::UnknownError);
    }

    #[test]
    fn test_cause_chain() {
        let inner = anyhow::anyhow!("disk full").context("write failed");
        let record = ExceptionRecord::internal(ExceptionKey::ContentStoreFailure).with_cause(inner);
        assert_eq!(record.cause_message().as_deref(), Some("write failed: disk full"));
    }

    #[test]
    fn test_exit_code_only_for_fatal() {
        assert_eq!(ExceptionRecord::fatal(ExceptionKey::LowDiskSpace).exit_code(), Some(50));
        assert_eq!(ExceptionRecord::fatal(ExceptionKey::InternalException).exit_code(), Some(1));
        assert_eq!(ExceptionRecord::user(ExceptionKey::RuntimeError).exit_code(), None);
    }

    #[test]
    fn test_round_trips_through_anyhow() {
        let err: anyhow::Error = ExceptionRecord::user(ExceptionKey::ClassNotFound)
            .with_fallback("missing class")
            .into();
        let record = err.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.key(), ExceptionKey::ClassNotFound);
        assert_eq!(record.fallback_message(), Some("missing class"));
    }
}
