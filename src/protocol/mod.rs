// src/protocol/mod.rs
//! Client message protocol
//!
//! Every observable event of a session (console output, lifecycle status,
//! user-facing errors, domain signals) is funnelled through this module:
//!
//! - **Message**: The typed `ClientMessage` envelope and its wire shape
//! - **Sink**: Transport contract and the never-throwing `SafeSender`
//! - **Queue**: Bounded in-memory FIFO transport
//!
//! # Wire shape
//!
//! ```text
//! {"type": "SYSTEM_OUT", "value": "hello\n", "detail": {}}
//! {"type": "EXCEPTION",  "value": "TOO_MANY_WRITES", "detail": {"fallbackMessage": "..."}}
//! ```

pub mod message;
pub mod queue;
pub mod sink;

// Re-export commonly used types
pub use message::{
    ClientMessage, ClientMessageKind, DebugMessage, Detail, DetailKey, ExceptionMessage,
    MessageType, SendPolicy, StatusKey, StatusMessage, SystemOut,
};
pub use queue::{QueueAdapter, QueueStats};
pub use sink::{OutputAdapter, SafeSender, TransportError};
