// src/runtime/output.rs
//! Console capture for the hosted program
//!
//! `OutputRedirector` stands in for the hosted program's standard output.
//! Bytes accumulate in a locked buffer; a flush decodes them as UTF-8 and
//! emits one `SYSTEM_OUT` message. The buffer is shared by the program
//! thread, the background flusher and the executor.
//!
//! # Flush contract
//!
//! [`FlushPolicy::AutoFlush`]: every top-level console operation
//! ([`Console::print`], [`Console::println`], one `io::Write::write`) is
//! followed by a flush, so the client sees output in real time.
//! [`FlushPolicy::Buffered`]: output leaves only on explicit flush, the
//! background timer, or close.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::protocol::message::SystemOut;
use crate::protocol::sink::SafeSender;
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// When buffered console output is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush after every top-level output operation
    #[default]
    AutoFlush,
    /// Flush only on demand, on the timer, and on close
    Buffered,
}

/// Console write failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    #[error("console is closed")]
    Closed,

    #[error("range {offset}+{length} out of bounds for {available} bytes")]
    RangeOutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },
}

struct RedirectorState {
    buffer: BytesMut,
    /// Released on close
    sink: Option<Arc<SafeSender>>,
}

/// Byte sink replacing the hosted program's standard output
pub struct OutputRedirector {
    state: Mutex<RedirectorState>,
    policy: FlushPolicy,
}

impl OutputRedirector {
    pub fn new(sink: Arc<SafeSender>, policy: FlushPolicy) -> Self {
        Self {
            state: Mutex::new(RedirectorState {
                buffer: BytesMut::with_capacity(1024),
                sink: Some(sink),
            }),
            policy,
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Append one byte
    pub fn write_unit(&self, byte: u8) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(OutputError::Closed);
        }
        state.buffer.extend_from_slice(&[byte]);
        Ok(())
    }

    /// Append `bytes[offset..offset + length]`
    pub fn write_range(&self, bytes: &[u8], offset: usize, length: usize) -> Result<(), OutputError> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= bytes.len())
            .ok_or(OutputError::RangeOutOfBounds {
                offset,
                length,
                available: bytes.len(),
            })?;

        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(OutputError::Closed);
        }
        state.buffer.extend_from_slice(&bytes[offset..end]);
        Ok(())
    }

    /// Append a whole slice
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), OutputError> {
        self.write_range(bytes, 0, bytes.len())
    }

    /// Emit buffered text as one message
    ///
    /// Returns whether a message was emitted. An empty buffer is a no-op.
    /// A trailing incomplete UTF-8 sequence stays buffered for the next
    /// flush.
    pub fn flush(&self) -> bool {
        let mut state = self.state.lock();
        Self::flush_locked(&mut state, false)
    }

    /// Flush the remainder and release the sink
    ///
    /// Returns `false` when already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return false;
        }
        Self::flush_locked(&mut state, true);
        state.sink = None;
        debug!("console closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sink.is_none()
    }

    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    // The lock is held across the send so concurrent flushes stay ordered
    fn flush_locked(state: &mut RedirectorState, final_flush: bool) -> bool {
        let Some(sink) = state.sink.clone() else {
            return false;
        };
        let Some(text) = take_decodable(&mut state.buffer, final_flush) else {
            return false;
        };
        sink.send(SystemOut(text));
        true
    }
}

/// Split off the longest prefix that decodes cleanly
fn take_decodable(buffer: &mut BytesMut, final_flush: bool) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }

    let decodable = match std::str::from_utf8(buffer) {
        Ok(_) => buffer.len(),
        // Incomplete sequence at the very end
        Err(e) if e.error_len().is_none() && !final_flush => e.valid_up_to(),
        Err(_) => buffer.len(),
    };

    if decodable == 0 {
        return None;
    }

    let chunk = buffer.split_to(decodable);
    Some(String::from_utf8_lossy(&chunk).into_owned())
}

/// Hosted program's view of standard output
#[derive(Clone)]
pub struct Console {
    redirector: Arc<OutputRedirector>,
    interrupt: CancellationToken,
}

impl Console {
    pub fn new(redirector: Arc<OutputRedirector>, interrupt: CancellationToken) -> Self {
        Self {
            redirector,
            interrupt,
        }
    }

    /// Write text
    pub fn print(&self, text: &str) -> anyhow::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Write text followed by a newline, as one operation
    pub fn println(&self, text: &str) -> anyhow::Result<()> {
        self.check_interrupted()?;
        self.redirector
            .write_all(text.as_bytes())
            .and_then(|_| self.redirector.write_unit(b'\n'))
            .map_err(interrupted)?;
        self.after_operation();
        Ok(())
    }

    /// Write raw bytes
    pub fn write_bytes(&self, bytes: &[u8]) -> anyhow::Result<()> {
        self.check_interrupted()?;
        self.redirector.write_all(bytes).map_err(interrupted)?;
        self.after_operation();
        Ok(())
    }

    /// Emit whatever is buffered
    pub fn flush(&self) {
        self.redirector.flush();
    }

    fn check_interrupted(&self) -> anyhow::Result<()> {
        if self.interrupt.is_cancelled() {
            return Err(ExceptionRecord::user(ExceptionKey::ProgramInterrupted).into());
        }
        Ok(())
    }

    fn after_operation(&self) {
        if self.redirector.policy() == FlushPolicy::AutoFlush {
            self.redirector.flush();
        }
    }
}

fn interrupted(err: OutputError) -> anyhow::Error {
    ExceptionRecord::user(ExceptionKey::ProgramInterrupted)
        .with_cause(err)
        .into()
}

impl io::Write for Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::BrokenPipe, err.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.redirector.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::queue::QueueAdapter;
    use proptest::prelude::*;
    use std::io::Write;

    fn redirector(policy: FlushPolicy) -> (Arc<QueueAdapter>, Arc<OutputRedirector>) {
        let queue = Arc::new(QueueAdapter::new(1024));
        let sender = Arc::new(SafeSender::new(queue.clone(), "session", false));
        (queue, Arc::new(OutputRedirector::new(sender, policy)))
    }

    fn values(queue: &QueueAdapter) -> Vec<String> {
        queue.drain().iter().map(|m| m.value().to_string()).collect()
    }

    #[test]
    fn test_empty_flush_emits_nothing() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        assert!(!output.flush());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_unit_flush() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        output.write_unit(b'a').unwrap();
        assert!(output.flush());
        assert_eq!(values(&queue), vec!["a"]);
    }

    #[test]
    fn test_second_flush_is_noop() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        output.write_unit(b'a').unwrap();
        output.write_unit(b'b').unwrap();
        output.write_unit(b'c').unwrap();
        output.flush();
        output.flush();
        assert_eq!(values(&queue), vec!["abc"]);
    }

    #[test]
    fn test_partial_range_write() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        output.write_range(b"hello world", 1, 4).unwrap();
        output.flush();
        assert_eq!(values(&queue), vec!["ello"]);
    }

    #[test]
    fn test_range_out_of_bounds() {
        let (_queue, output) = redirector(FlushPolicy::Buffered);
        assert_eq!(
            output.write_range(b"abc", 2, 5),
            Err(OutputError::RangeOutOfBounds {
                offset: 2,
                length: 5,
                available: 3
            })
        );
        assert_eq!(output.buffered_len(), 0);
    }

    #[test]
    fn test_incomplete_utf8_held_back() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        let snowman = "☃".as_bytes();

        output.write_all(b"x").unwrap();
        output.write_all(&snowman[..1]).unwrap();
        output.flush();
        assert_eq!(values(&queue), vec!["x"]);

        output.write_all(&snowman[1..]).unwrap();
        output.flush();
        assert_eq!(values(&queue), vec!["☃"]);
    }

    #[test]
    fn test_close_flushes_and_is_idempotent() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        output.write_all(b"tail").unwrap();

        assert!(output.close());
        assert!(!output.close());
        assert_eq!(values(&queue), vec!["tail"]);

        assert_eq!(output.write_unit(b'x'), Err(OutputError::Closed));
        assert!(!output.flush());
    }

    #[test]
    fn test_console_autoflush() {
        let (queue, output) = redirector(FlushPolicy::AutoFlush);
        let console = Console::new(output, CancellationToken::new());

        console.print("a").unwrap();
        console.println("b").unwrap();
        assert_eq!(values(&queue), vec!["a", "b\n"]);
    }

    #[test]
    fn test_console_buffered() {
        let (queue, output) = redirector(FlushPolicy::Buffered);
        let mut console = Console::new(output, CancellationToken::new());

        write!(console, "x={}", 1).unwrap();
        console.println("").unwrap();
        assert!(queue.is_empty());

        console.flush();
        assert_eq!(values(&queue), vec!["x=1\n"]);
    }

    #[test]
    fn test_console_interrupted() {
        let (queue, output) = redirector(FlushPolicy::AutoFlush);
        let token = CancellationToken::new();
        let console = Console::new(output, token.clone());

        token.cancel();
        let err = console.print("late").unwrap_err();
        let record = err.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.key(), ExceptionKey::ProgramInterrupted);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_flushes_never_emit_empty() {
        use std::thread;

        let (queue, output) = redirector(FlushPolicy::Buffered);
        let mut handles = vec![];

        for i in 0..4 {
            let o = Arc::clone(&output);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        o.write_unit(b'z').unwrap();
                    }
                    o.flush();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        output.close();

        let emitted = values(&queue);
        assert!(emitted.iter().all(|v| !v.is_empty()));
        assert_eq!(emitted.concat().len(), 100);
    }

    proptest! {
        #[test]
        fn prop_flushes_preserve_text(chunks in proptest::collection::vec(".{0,8}", 0..20)) {
            let (queue, output) = redirector(FlushPolicy::Buffered);
            for chunk in &chunks {
                output.write_all(chunk.as_bytes()).unwrap();
                output.flush();
            }
            let emitted = values(&queue);
            prop_assert!(emitted.iter().all(|v| !v.is_empty()));
            prop_assert_eq!(emitted.concat(), chunks.concat());
        }
    }
}
