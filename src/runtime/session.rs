// src/runtime/session.rs
//! Per-session state
//!
//! An `ExecutionSession` owns everything that belongs to one run: quotas,
//! the output buffer, the end-of-session registry and the cancellation
//! plumbing. Nothing in it is shared with other sessions.
//!
//! State machine:
//!
//! ```text
//! Created --start()--> Running --end()--> Ended
//!    |                                      ^
//!    +----------------end()-----------------+
//! ```

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::protocol::sink::{OutputAdapter, SafeSender};
use crate::runtime::input::{InputHandle, InputRedirector};
use crate::runtime::lifecycle::LifecycleNotifier;
use crate::runtime::output::OutputRedirector;
use crate::runtime::quota::ResourceQuotaGuard;
use crate::utils::config::HostConfig;
use crate::utils::errors::{HostError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Running => write!(f, "running"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Why a running program was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    Stopped,
    ConnectionLost,
    ResourceExhausted(ExceptionKey),
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Timeout => "timeout",
            CancelReason::Stopped => "stopped",
            CancelReason::ConnectionLost => "connection_lost",
            CancelReason::ResourceExhausted(_) => "resource_exhausted",
        }
    }

    /// Failure reported for this cancellation
    pub fn into_record(self) -> ExceptionRecord {
        match self {
            CancelReason::Timeout => ExceptionRecord::user(ExceptionKey::ProgramTimeout),
            CancelReason::Stopped => ExceptionRecord::user(ExceptionKey::ProgramStopped),
            CancelReason::ConnectionLost => {
                ExceptionRecord::internal_facing(ExceptionKey::ConnectionTerminated)
            }
            CancelReason::ResourceExhausted(key) => ExceptionRecord::fatal(key),
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote control for a session, usable from any thread
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    stop: CancellationToken,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl SessionHandle {
    /// Request a user-visible stop
    pub fn stop(&self) {
        self.cancel(CancelReason::Stopped);
    }

    /// Abort because a host resource ran out; classified Fatal
    pub fn abort_fatal(&self, key: ExceptionKey) {
        self.cancel(CancelReason::ResourceExhausted(key));
    }

    /// Record `reason` unless another one got there first
    pub fn cancel(&self, reason: CancelReason) {
        let recorded = {
            let mut slot = self.reason.lock();
            *slot.get_or_insert(reason)
        };
        info!(session_id = %self.session_id, reason = %recorded, "session cancellation requested");
        self.stop.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock()
    }
}

/// One end-to-end run of a hosted program
pub struct ExecutionSession {
    id: String,
    state: Mutex<SessionState>,
    quotas: Arc<ResourceQuotaGuard>,
    sender: Arc<SafeSender>,
    output: Arc<OutputRedirector>,
    lifecycle: Arc<LifecycleNotifier>,

    /// Seen by the hosted program; cancelled when it must stop
    interrupt: CancellationToken,

    /// External cancellation requests
    stop: CancellationToken,
    cancel_reason: Arc<Mutex<Option<CancelReason>>>,

    input_handle: InputHandle,
    input: Mutex<Option<InputRedirector>>,
    created_at: DateTime<Utc>,
}

impl ExecutionSession {
    pub fn new(adapter: Arc<dyn OutputAdapter>, config: &HostConfig) -> Self {
        Self::with_id(Ulid::new().to_string(), adapter, config)
    }

    pub fn with_id(id: impl Into<String>, adapter: Arc<dyn OutputAdapter>, config: &HostConfig) -> Self {
        let id = id.into();
        let sender = Arc::new(SafeSender::new(
            adapter,
            id.clone(),
            config.transport.send_conditional_messages,
        ));
        let output = Arc::new(OutputRedirector::new(
            Arc::clone(&sender),
            config.session.flush_policy,
        ));
        let interrupt = CancellationToken::new();
        let (input_handle, input) =
            InputRedirector::channel(interrupt.clone(), config.session.input_poll_interval());

        let lifecycle = Arc::new(LifecycleNotifier::new(id.clone()));
        {
            let output = Arc::clone(&output);
            lifecycle.register_fn("output", move || {
                output.close();
                Ok(())
            });
        }
        {
            let input_handle = input_handle.clone();
            lifecycle.register_fn("input", move || {
                input_handle.close();
                Ok(())
            });
        }

        debug!(session_id = %id, "session created");

        Self {
            quotas: Arc::new(ResourceQuotaGuard::new(&config.quotas)),
            state: Mutex::new(SessionState::Created),
            sender,
            output,
            lifecycle,
            interrupt,
            stop: CancellationToken::new(),
            cancel_reason: Arc::new(Mutex::new(None)),
            input_handle,
            input: Mutex::new(Some(input)),
            created_at: Utc::now(),
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Created -> Running
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SessionState::Created {
            return Err(HostError::InvalidState(format!(
                "session {} cannot start from {}",
                self.id, *state
            )));
        }
        *state = SessionState::Running;
        info!(session_id = %self.id, "session running");
        Ok(())
    }

    /// Move to Ended and tear the session down
    ///
    /// The first call interrupts the hosted program, fires the lifecycle
    /// listeners (the output buffer gets its final flush there) and
    /// returns `true`; later calls do nothing.
    pub fn end(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Ended {
                return false;
            }
            *state = SessionState::Ended;
        }

        self.interrupt.cancel();
        let notified = self.lifecycle.notify_ended();
        info!(session_id = %self.id, listeners = notified, "session ended");
        true
    }

    pub fn is_ended(&self) -> bool {
        self.state() == SessionState::Ended
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.id.clone(),
            stop: self.stop.clone(),
            reason: Arc::clone(&self.cancel_reason),
        }
    }

    /// Producer side of the program's standard input
    pub fn input_handle(&self) -> InputHandle {
        self.input_handle.clone()
    }

    /// Reader side of standard input; available once
    pub fn take_input(&self) -> Option<InputRedirector> {
        self.input.lock().take()
    }

    pub fn quotas(&self) -> &Arc<ResourceQuotaGuard> {
        &self.quotas
    }

    pub fn sender(&self) -> &Arc<SafeSender> {
        &self.sender
    }

    pub fn output(&self) -> &Arc<OutputRedirector> {
        &self.output
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleNotifier> {
        &self.lifecycle
    }

    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        *self.cancel_reason.lock()
    }
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ErrorKind;
    use crate::protocol::queue::QueueAdapter;
    use crate::runtime::quota::QuotaClass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(queue: &Arc<QueueAdapter>) -> ExecutionSession {
        ExecutionSession::with_id("s1", queue.clone(), &HostConfig::default())
    }

    #[test]
    fn test_state_transitions() {
        let queue = Arc::new(QueueAdapter::new(16));
        let session = session(&queue);
        assert_eq!(session.state(), SessionState::Created);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(matches!(session.start(), Err(HostError::InvalidState(_))));

        assert!(session.end());
        assert_eq!(session.state(), SessionState::Ended);
        assert!(!session.end());
        assert!(session.start().is_err());
    }

    #[test]
    fn test_end_from_created() {
        let queue = Arc::new(QueueAdapter::new(16));
        let session = session(&queue);
        assert!(session.end());
        assert!(session.is_ended());
    }

    #[test]
    fn test_end_flushes_and_fires_listeners_once() {
        let queue = Arc::new(QueueAdapter::new(16));
        let session = session(&queue);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.lifecycle().register_fn("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        session.output().write_all(b"left over").unwrap();
        session.end();
        session.end();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(session.output().is_closed());
        assert!(session.interrupt_token().is_cancelled());
        let messages = queue.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].value(), "left over");
    }

    #[test]
    fn test_first_cancel_reason_wins() {
        let queue = Arc::new(QueueAdapter::new(16));
        let session = session(&queue);
        let handle = session.handle();

        handle.abort_fatal(ExceptionKey::LowDiskSpace);
        handle.stop();

        assert!(session.stop_token().is_cancelled());
        assert_eq!(
            session.cancel_reason(),
            Some(CancelReason::ResourceExhausted(ExceptionKey::LowDiskSpace))
        );
    }

    #[test]
    fn test_cancel_reason_records() {
        assert_eq!(CancelReason::Timeout.into_record().key(), ExceptionKey::ProgramTimeout);
        assert_eq!(CancelReason::Stopped.into_record().kind(), ErrorKind::UserInitiated);
        assert_eq!(CancelReason::ConnectionLost.into_record().kind(), ErrorKind::InternalFacing);

        let fatal = CancelReason::ResourceExhausted(ExceptionKey::OutOfMemory).into_record();
        assert_eq!(fatal.kind(), ErrorKind::Fatal);
        assert_eq!(fatal.exit_code(), Some(51));
    }

    #[test]
    fn test_sessions_do_not_share_quotas() {
        let queue = Arc::new(QueueAdapter::new(16));
        let first = ExecutionSession::new(queue.clone(), &HostConfig::default());
        let second = ExecutionSession::new(queue.clone(), &HostConfig::default());
        assert_ne!(first.id(), second.id());

        first.quotas().try_consume(QuotaClass::FileWrite).unwrap();
        first.quotas().try_consume(QuotaClass::FileWrite).unwrap();
        assert!(first.quotas().try_consume(QuotaClass::FileWrite).is_err());
        assert!(second.quotas().try_consume(QuotaClass::FileWrite).is_ok());
    }

    #[test]
    fn test_input_taken_once() {
        let queue = Arc::new(QueueAdapter::new(16));
        let session = session(&queue);
        assert!(session.take_input().is_some());
        assert!(session.take_input().is_none());
    }
}
