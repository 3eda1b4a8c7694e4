// src/protocol/queue.rs
//! Bounded in-memory transport
//!
//! FIFO queue of client messages with delivery counters. Used as the
//! transport for embedded hosts and in tests; a consumer drains it on its
//! own schedule.

use crate::protocol::message::ClientMessage;
use crate::protocol::sink::{OutputAdapter, TransportError};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lock-free message queue
pub struct QueueAdapter {
    /// Underlying bounded queue
    queue: ArrayQueue<ClientMessage>,

    /// Push counter
    push_count: AtomicU64,

    /// Pop counter
    pop_count: AtomicU64,

    /// Rejection counter (queue full)
    drop_count: AtomicU64,

    /// Simulated peer disconnect
    disconnected: AtomicBool,
}

impl QueueAdapter {
    /// Create a new queue adapter
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Try to pop the oldest message
    pub fn try_pop(&self) -> Option<ClientMessage> {
        let message = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(message)
    }

    /// Pop everything currently queued, oldest first
    pub fn drain(&self) -> Vec<ClientMessage> {
        let mut messages = Vec::with_capacity(self.queue.len());
        while let Some(message) = self.try_pop() {
            messages.push(message);
        }
        messages
    }

    /// Mark the peer as gone; later sends fail with `ConnectionLost`
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl OutputAdapter for QueueAdapter {
    fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionLost("peer disconnected".to_string()));
        }

        match self.queue.push(message.clone()) {
            Ok(()) => {
                self.push_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Backpressure(format!(
                    "queue full ({} messages)",
                    self.queue.capacity()
                )))
            }
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Total messages accepted
    pub push_count: u64,

    /// Total messages consumed
    pub pop_count: u64,

    /// Total messages rejected (queue full)
    pub drop_count: u64,

    /// Current queue size
    pub current_size: usize,

    /// Queue capacity
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }

    /// Calculate rejection rate
    pub fn drop_rate(&self) -> f64 {
        let attempts = self.push_count + self.drop_count;
        if attempts == 0 {
            0.0
        } else {
            (self.drop_count as f64 / attempts as f64) * 100.0
        }
    }
}
