// src/exception/mod.rs
//! Failure taxonomy and central routing
//!
//! - **Kind**: `ErrorKind` and the symbolic `ExceptionKey` vocabulary
//! - **Record**: `ExceptionRecord`, the typed failure value producers raise
//! - **Catalog**: Human-readable text per symbolic key
//! - **Handler**: Single-boundary classification, logging, notification
//!   and termination
//!
//! # Routing
//!
//! ```text
//! Kind            Log       Notify user   Terminate
//! Fatal           severe    yes           exit(code)
//! InternalServer  severe    generic       no
//! InternalFacing  warning   no            no
//! UserInitiated   -         yes           no
//! Unknown         severe    yes           no
//! ```

pub mod catalog;
pub mod handler;
pub mod kind;
pub mod record;

// Re-export commonly used types
pub use catalog::MessageCatalog;
pub use handler::{
    ErrorLog, ExceptionHandler, HandledFailure, ProcessTerminator, Terminator, TracingErrorLog,
};
pub use kind::{ErrorKind, ExceptionKey, KindPolicy, LogSeverity};
pub use record::ExceptionRecord;
