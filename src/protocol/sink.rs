// src/protocol/sink.rs
//! Transport contract and safe send
//!
//! The transport may fail at any moment; the hosted program must never
//! observe that. `SafeSender` is the single send boundary: it serializes
//! delivery per session, swallows transport errors, and remembers a lost
//! connection so later sends are dropped quietly.

use crate::observability::names;
use crate::protocol::message::ClientMessage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transport failure
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("transport backpressure: {0}")]
    Backpressure(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Outbound transport (websocket, queue, ...)
///
/// Implementations must preserve the order in which one session submits
/// messages.
pub trait OutputAdapter: Send + Sync {
    fn send(&self, message: &ClientMessage) -> Result<(), TransportError>;
}

/// Never-throwing send boundary for one session
pub struct SafeSender {
    adapter: Arc<dyn OutputAdapter>,
    session_id: String,

    /// Deliver `Conditional` messages too
    send_conditional: bool,

    /// Serializes delivery so producers on different threads stay FIFO
    send_lock: Mutex<()>,

    connection_lost: AtomicBool,

    /// Cancelled once the transport reports a lost connection
    lost_token: CancellationToken,
}

impl SafeSender {
    pub fn new(
        adapter: Arc<dyn OutputAdapter>,
        session_id: impl Into<String>,
        send_conditional: bool,
    ) -> Self {
        Self {
            adapter,
            session_id: session_id.into(),
            send_conditional,
            send_lock: Mutex::new(()),
            connection_lost: AtomicBool::new(false),
            lost_token: CancellationToken::new(),
        }
    }

    /// Send a message, logging transport failures
    ///
    /// Returns whether the message reached the transport.
    pub fn send(&self, message: impl Into<ClientMessage>) -> bool {
        self.deliver(message.into(), true)
    }

    /// Send a message without logging failures
    ///
    /// For callers that already know the transport is unhealthy.
    pub fn send_quietly(&self, message: impl Into<ClientMessage>) -> bool {
        self.deliver(message.into(), false)
    }

    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::Acquire)
    }

    /// Token cancelled when the connection is lost
    pub fn connection_lost_token(&self) -> CancellationToken {
        self.lost_token.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn deliver(&self, message: ClientMessage, log_failures: bool) -> bool {
        if !message.should_always_send() && !self.send_conditional {
            metrics::counter!(names::MESSAGES_DROPPED, "reason" => "conditional")
                .increment(1);
            return false;
        }

        let _guard = self.send_lock.lock();

        if self.is_connection_lost() {
            debug!(session_id = %self.session_id, "dropping message after connection loss");
            metrics::counter!(names::MESSAGES_DROPPED, "reason" => "disconnected")
                .increment(1);
            return false;
        }

        match self.adapter.send(&message) {
            Ok(()) => {
                metrics::counter!(
                    names::MESSAGES_SENT,
                    "type" => message.message_type().as_str()
                )
                .increment(1);
                true
            }
            Err(err) => {
                if let TransportError::ConnectionLost(_) = err {
                    self.connection_lost.store(true, Ordering::Release);
                    self.lost_token.cancel();
                }
                if log_failures {
                    warn!(
                        session_id = %self.session_id,
                        message_type = %message.message_type(),
                        error = %err,
                        "failed to send client message"
                    );
                }
                metrics::counter!(names::MESSAGES_DROPPED, "reason" => "transport")
                    .increment(1);
                false
            }
        }
    }
}

impl std::fmt::Debug for SafeSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeSender")
            .field("session_id", &self.session_id)
            .field("send_conditional", &self.send_conditional)
            .field("connection_lost", &self.is_connection_lost())
            .finish()
    }
}
