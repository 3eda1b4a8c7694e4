// src/runtime/executor.rs
//! Session orchestration
//!
//! `SessionExecutor` drives one session from source files to `EXITED`:
//!
//! ```text
//! COMPILING -> compile -> COMPILATION_SUCCESSFUL -> resolve entry point
//!   -> RUNNING -> program (blocking thread) -> [TIMEOUT_WARNING]
//!   -> failure? ExceptionHandler -> end session -> EXITED
//! ```
//!
//! The hosted program runs on a blocking thread while the executor watches
//! the deadline, external stop requests and the connection. Every exit path
//! converges on [`ExecutionSession::end`], so lifecycle listeners fire once
//! and `EXITED` is the last message the client sees.

use crate::compiler::{Compiler, ProgramSource};
use crate::exception::{
    ErrorLog, ExceptionHandler, ExceptionKey, ExceptionRecord, HandledFailure, MessageCatalog,
    ProcessTerminator, Terminator, TracingErrorLog,
};
use crate::loader::{EntryPoint, EntryPointResolver, Loader};
use crate::observability::names;
use crate::protocol::message::{DebugMessage, DetailKey, StatusKey, StatusMessage};
use crate::protocol::sink::OutputAdapter;
use crate::runtime::content::{ContentGateway, ContentStore, LocalContentStore};
use crate::runtime::context::ProgramContext;
use crate::runtime::flusher::OutputFlusher;
use crate::runtime::output::Console;
use crate::runtime::session::{CancelReason, ExecutionSession, SessionState};
use crate::utils::config::HostConfig;
use crate::utils::errors::{HostError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long an interrupted program gets to unwind
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Result of one session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub exit_code: i32,
    pub failure: Option<HandledFailure>,
    pub cancel_reason: Option<CancelReason>,
    pub state: SessionState,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Ends the session and reports `EXITED` before the process goes away
struct ShutdownTerminator {
    session: Arc<ExecutionSession>,
    inner: Arc<dyn Terminator>,
}

impl Terminator for ShutdownTerminator {
    fn terminate(&self, exit_code: i32) {
        finish(&self.session, exit_code);
        self.inner.terminate(exit_code);
    }
}

fn finish(session: &ExecutionSession, exit_code: i32) -> bool {
    if !session.end() {
        return false;
    }
    session.sender().send(
        StatusMessage::new(StatusKey::Exited).with_detail(DetailKey::ExitCode, exit_code.to_string()),
    );
    true
}

/// Top-level orchestrator for hosted program sessions
pub struct SessionExecutor {
    config: HostConfig,
    compiler: Arc<dyn Compiler>,
    loader: Arc<dyn Loader>,
    store: Arc<dyn ContentStore>,
    catalog: Arc<MessageCatalog>,
    error_log: Option<Arc<dyn ErrorLog>>,
    terminator: Arc<dyn Terminator>,
    grace_period: Duration,
}

impl SessionExecutor {
    /// Build an executor from validated configuration
    ///
    /// Uses the local content store, the configured message catalog and
    /// real process termination; each can be replaced with the `with_*`
    /// builders.
    pub fn new(config: HostConfig, compiler: Arc<dyn Compiler>, loader: Arc<dyn Loader>) -> Result<Self> {
        config.validate()?;
        let catalog = MessageCatalog::load(&config.catalog)?;
        let store = Arc::new(LocalContentStore::new(config.content.base_dir.clone()));

        Ok(Self {
            config,
            compiler,
            loader,
            store,
            catalog: Arc::new(catalog),
            error_log: None,
            terminator: Arc::new(ProcessTerminator),
            grace_period: DEFAULT_GRACE_PERIOD,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_catalog(mut self, catalog: MessageCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Log collaborator for every session; defaults to a per-session `TracingErrorLog`
    pub fn with_error_log(mut self, log: Arc<dyn ErrorLog>) -> Self {
        self.error_log = Some(log);
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Create a session wired to this executor's configuration
    pub fn create_session(&self, adapter: Arc<dyn OutputAdapter>) -> ExecutionSession {
        ExecutionSession::new(adapter, &self.config)
    }

    /// Run a session to completion
    ///
    /// Never fails: every failure is routed through the session's
    /// exception handler and reflected in the outcome.
    pub async fn run(&self, session: ExecutionSession, sources: Vec<ProgramSource>, args: Vec<String>) -> SessionOutcome {
        let session = Arc::new(session);
        let session_id = session.id().to_string();
        info!(session_id = %session_id, files = sources.len(), "session starting");

        let log: Arc<dyn ErrorLog> = match &self.error_log {
            Some(log) => Arc::clone(log),
            None => Arc::new(TracingErrorLog::new(session_id.clone())),
        };
        let handler = ExceptionHandler::new(
            Arc::clone(session.sender()),
            Arc::clone(&self.catalog),
            log,
            Arc::new(ShutdownTerminator {
                session: Arc::clone(&session),
                inner: Arc::clone(&self.terminator),
            }),
        );

        let flusher = OutputFlusher::start(Arc::clone(session.output()), self.config.session.flush_interval());

        let failure = match self.execute(&session, sources, args).await {
            Ok(()) => None,
            Err(err) => {
                // Console output the program produced comes before its failure
                session.output().flush();
                Some(handler.handle(err))
            }
        };

        flusher.shutdown().await;

        let exit_code = failure.as_ref().and_then(|f| f.exit_code).unwrap_or(0);
        finish(&session, exit_code);
        for record in session.lifecycle().take_failures() {
            handler.handle_record(record);
        }

        let cancel_reason = session.cancel_reason();
        let outcome = match (&failure, cancel_reason) {
            (None, _) => "completed",
            (Some(_), Some(_)) => "cancelled",
            (Some(_), None) => "failed",
        };
        metrics::counter!(names::SESSIONS, "outcome" => outcome).increment(1);
        info!(session_id = %session_id, outcome, exit_code, "session finished");

        SessionOutcome {
            session_id,
            exit_code,
            failure,
            cancel_reason,
            state: session.state(),
        }
    }

    async fn execute(&self, session: &Arc<ExecutionSession>, sources: Vec<ProgramSource>, args: Vec<String>) -> anyhow::Result<()> {
        let sender = session.sender();
        let code_extension = &self.config.session.code_extension;

        sender.send(StatusMessage::new(StatusKey::Compiling));

        let (code, others): (Vec<_>, Vec<_>) = sources.into_iter().partition(|s| s.is_code(code_extension));
        let resources: HashMap<String, String> = others.into_iter().map(|s| (s.name, s.contents)).collect();
        debug!(session_id = %session.id(), code = code.len(), resources = resources.len(), "sources routed");

        let compiler = Arc::clone(&self.compiler);
        let artifact = tokio::task::spawn_blocking(move || compiler.compile(&code))
            .await
            .map_err(|e| ExceptionRecord::internal(ExceptionKey::InternalCompilerException).with_cause(e))?
            .map_err(ExceptionRecord::from)?;

        sender.send(StatusMessage::new(StatusKey::CompilationSuccessful));

        let resolver = EntryPointResolver::new(Arc::clone(&self.loader), self.config.session.entry_symbol.clone());
        let entry = resolver.resolve(&artifact)?;
        sender.send(DebugMessage::new(format!(
            "entry point {}.{}",
            entry.class_name, entry.descriptor.name
        )));

        let ctx = self.program_context(session, resources)?;
        session.start()?;
        sender.send(StatusMessage::new(StatusKey::Running));

        let program = spawn_program(entry, ctx, args);
        self.supervise(session, program).await
    }

    fn program_context(&self, session: &Arc<ExecutionSession>, resources: HashMap<String, String>) -> Result<ProgramContext> {
        let input = session
            .take_input()
            .ok_or_else(|| HostError::InvalidState(format!("session {} input already taken", session.id())))?;
        let interrupt = session.interrupt_token();
        let content = ContentGateway::new(
            session.id(),
            Arc::clone(session.quotas()),
            Arc::clone(&self.store),
            self.config.content.upload_url_ttl(),
        );

        Ok(ProgramContext::new(
            session.id(),
            Console::new(Arc::clone(session.output()), interrupt.clone()),
            input,
            content,
            interrupt,
            Arc::clone(session.sender()),
            Arc::new(resources),
        ))
    }

    /// Wait for the program, the deadline, a stop request or connection loss
    async fn supervise(&self, session: &Arc<ExecutionSession>, mut program: JoinHandle<anyhow::Result<()>>) -> anyhow::Result<()> {
        let timeout = self.config.session.timeout();
        let warning = tokio::time::sleep(timeout.saturating_sub(self.config.session.timeout_warning()));
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(warning, deadline);

        let handle = session.handle();
        let stop = session.stop_token();
        let connection_lost = session.sender().connection_lost_token();
        let mut warned = false;

        loop {
            tokio::select! {
                joined = &mut program => return joined_result(joined),
                _ = &mut warning, if !warned => {
                    warned = true;
                    session.sender().send(StatusMessage::new(StatusKey::TimeoutWarning));
                }
                _ = &mut deadline => {
                    handle.cancel(CancelReason::Timeout);
                    break;
                }
                _ = stop.cancelled() => break,
                _ = connection_lost.cancelled() => {
                    handle.cancel(CancelReason::ConnectionLost);
                    break;
                }
            }
        }

        let reason = session.cancel_reason().unwrap_or(CancelReason::Stopped);
        info!(session_id = %session.id(), reason = %reason, "interrupting hosted program");
        session.interrupt_token().cancel();

        match tokio::time::timeout(self.grace_period, &mut program).await {
            Ok(_) => debug!(session_id = %session.id(), "hosted program unwound"),
            Err(_) => warn!(
                session_id = %session.id(),
                grace_ms = self.grace_period.as_millis() as u64,
                "hosted program did not stop within grace period"
            ),
        }

        Err(reason.into_record().into())
    }
}

fn spawn_program(entry: EntryPoint, mut ctx: ProgramContext, args: Vec<String>) -> JoinHandle<anyhow::Result<()>> {
    tokio::task::spawn_blocking(move || {
        let result = entry.invoke(&mut ctx, &args);
        ctx.console().flush();
        result
    })
}

fn joined_result(joined: std::result::Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(ExceptionRecord::internal(ExceptionKey::InternalRuntimeException)
            .with_cause(e)
            .into()),
    }
}
