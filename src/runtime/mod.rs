// src/runtime/mod.rs
//! Hosted program execution runtime
//!
//! This module runs one hosted program per session:
//!
//! - **Session**: per-session state, cancellation and the state machine
//! - **Executor**: compile, resolve, run and report a session
//! - **Output**: console capture with autoflush
//! - **Input**: client-supplied standard input
//! - **Quota**: per-session ceilings on side-effecting operations
//! - **Content**: file writes and upload URLs behind the quotas
//! - **Lifecycle**: exactly-once end-of-session notification
//! - **Flusher**: background timer for buffered console output
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── SessionExecutor ────────────────────────┐
//! │                                                                 │
//! │   Compiler ──► EntryPointResolver ──► EntryPoint (blocking)     │
//! │                                            │                    │
//! │                                     ProgramContext              │
//! │                  ┌──────────┬───────────┼────────────┐          │
//! │               Console    Input   ContentGateway    emit()       │
//! │                  │                      │            │          │
//! │          OutputRedirector ◄─ Flusher  Quotas         │          │
//! │                  │                                   │          │
//! │                  └──────────► SafeSender ◄───────────┘          │
//! │                                   │                             │
//! │   ExceptionHandler ───────────────┤                             │
//! │                                   ▼                             │
//! │                             OutputAdapter                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod content;
pub mod context;
pub mod executor;
pub mod flusher;
pub mod input;
pub mod lifecycle;
pub mod output;
pub mod quota;
pub mod session;

// Re-export commonly used types
pub use content::{ContentGateway, ContentStore, LocalContentStore, StoreError};
pub use context::ProgramContext;
pub use executor::{SessionExecutor, SessionOutcome};
pub use flusher::OutputFlusher;
pub use input::{InputHandle, InputRedirector};
pub use lifecycle::{LifecycleListener, LifecycleNotifier};
pub use output::{Console, FlushPolicy, OutputError, OutputRedirector};
pub use quota::{QuotaClass, QuotaLimits, ResourceQuota, ResourceQuotaGuard};
pub use session::{CancelReason, ExecutionSession, SessionHandle, SessionState};
