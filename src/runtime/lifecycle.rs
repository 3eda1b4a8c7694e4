// src/runtime/lifecycle.rs
//! End-of-session notification
//!
//! Subsystems register cleanup here instead of the executor knowing about
//! each of them. Listeners fire once, in registration order, and a failing
//! or panicking listener does not stop the rest. Failures are kept as
//! `LISTENER_FAILURE` records for the session's exception handler.

use crate::exception::{ExceptionKey, ExceptionRecord};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cleanup hook run when a session ends
pub trait LifecycleListener: Send + Sync {
    fn name(&self) -> &str;

    fn on_session_end(&self) -> anyhow::Result<()>;
}

struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> LifecycleListener for FnListener<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_session_end(&self) -> anyhow::Result<()> {
        (self.f)()
    }
}

/// Exactly-once session end registry
pub struct LifecycleNotifier {
    session_id: String,
    listeners: Mutex<Vec<Arc<dyn LifecycleListener>>>,
    failures: Mutex<Vec<ExceptionRecord>>,
    ended: AtomicBool,
}

impl LifecycleNotifier {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            listeners: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            ended: AtomicBool::new(false),
        }
    }

    /// Add a listener; ignored once the session has ended
    pub fn register(&self, listener: Arc<dyn LifecycleListener>) -> bool {
        let mut listeners = self.listeners.lock();
        if self.ended.load(Ordering::Acquire) {
            warn!(
                session_id = %self.session_id,
                listener = listener.name(),
                "listener registered after session end; ignoring"
            );
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Register a closure
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnListener {
            name: name.into(),
            f,
        }))
    }

    /// Fire every listener once
    ///
    /// Returns the number of listeners that ran; later calls return 0.
    pub fn notify_ended(&self) -> usize {
        if self.ended.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let listeners = std::mem::take(&mut *self.listeners.lock());
        debug!(session_id = %self.session_id, count = listeners.len(), "notifying session end");

        for listener in &listeners {
            let cause = match catch_unwind(AssertUnwindSafe(|| listener.on_session_end())) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("listener {} failed: {:#}", listener.name(), err),
                Err(_) => format!("listener {} panicked", listener.name()),
            };
            debug!(session_id = %self.session_id, cause = %cause, "session end listener failed");
            self.failures
                .lock()
                .push(ExceptionRecord::internal_facing(ExceptionKey::ListenerFailure).with_cause(cause));
        }

        listeners.len()
    }

    /// Failures collected by `notify_ended`, drained
    pub fn take_failures(&self) -> Vec<ExceptionRecord> {
        std::mem::take(&mut *self.failures.lock())
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fires_exactly_once() {
        let notifier = LifecycleNotifier::new("session");
        let calls = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let calls = Arc::clone(&calls);
            notifier.register_fn(format!("listener-{}", i), move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(notifier.notify_ended(), 3);
        assert_eq!(notifier.notify_ended(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_registration_order() {
        let notifier = LifecycleNotifier::new("session");
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            notifier.register_fn(name, move || {
                order.lock().push(name);
                Ok(())
            });
        }

        notifier.notify_ended();
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let notifier = LifecycleNotifier::new("session");
        let reached = Arc::new(AtomicBool::new(false));

        notifier.register_fn("errors", || anyhow::bail!("release failed"));
        notifier.register_fn("panics", || panic!("listener bug"));
        {
            let reached = Arc::clone(&reached);
            notifier.register_fn("last", move || {
                reached.store(true, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(notifier.notify_ended(), 3);
        assert!(reached.load(Ordering::SeqCst));

        let failures = notifier.take_failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.key() == ExceptionKey::ListenerFailure));
        assert_eq!(failures[0].kind(), crate::exception::ErrorKind::InternalFacing);
        assert_eq!(
            failures[0].cause_message().as_deref(),
            Some("listener errors failed: release failed")
        );
        assert_eq!(failures[1].cause_message().as_deref(), Some("listener panics panicked"));
        assert!(notifier.take_failures().is_empty());
    }

    #[test]
    fn test_register_after_end_ignored() {
        let notifier = LifecycleNotifier::new("session");
        notifier.notify_ended();

        assert!(!notifier.register_fn("late", || Ok(())));
        assert_eq!(notifier.listener_count(), 0);
        assert!(notifier.has_ended());
    }
}
