// src/runtime/input.rs
//! Client input for the hosted program
//!
//! Lines typed by the client are pushed through an [`InputHandle`]; the
//! hosted program pulls them with [`InputRedirector::read_line`]. Reads
//! block in bounded slices so a cancelled session interrupts them.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum InputEvent {
    Line(String),
    Closed,
}

/// Producer side, held by the transport
#[derive(Clone)]
pub struct InputHandle {
    tx: Sender<InputEvent>,
}

impl InputHandle {
    /// Queue one line of input; returns `false` once the reader is gone
    pub fn push_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(InputEvent::Line(line.into())).is_ok()
    }

    /// Signal end of input
    pub fn close(&self) {
        let _ = self.tx.send(InputEvent::Closed);
    }
}

/// Hosted program's view of standard input
pub struct InputRedirector {
    rx: Receiver<InputEvent>,
    interrupt: CancellationToken,
    poll_interval: Duration,
    exhausted: bool,
}

impl InputRedirector {
    /// Create a connected handle/reader pair
    pub fn channel(interrupt: CancellationToken, poll_interval: Duration) -> (InputHandle, Self) {
        let (tx, rx) = unbounded();
        let reader = Self {
            rx,
            interrupt,
            poll_interval,
            exhausted: false,
        };
        (InputHandle { tx }, reader)
    }

    /// Block until a line arrives
    ///
    /// `Ok(None)` means end of input. Fails with `PROGRAM_INTERRUPTED` when
    /// the session is cancelled while waiting.
    pub fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        self.read_line_until(None)
    }

    /// Like [`read_line`](Self::read_line) but gives up after `timeout`,
    /// returning `Ok(None)` without marking input exhausted
    pub fn read_line_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<String>> {
        self.read_line_until(Some(Instant::now() + timeout))
    }

    fn read_line_until(&mut self, deadline: Option<Instant>) -> anyhow::Result<Option<String>> {
        loop {
            if self.interrupt.is_cancelled() {
                return Err(ExceptionRecord::user(ExceptionKey::ProgramInterrupted).into());
            }
            if self.exhausted {
                return Ok(None);
            }

            let mut wait = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                wait = wait.min(deadline - now);
            }

            match self.rx.recv_timeout(wait) {
                Ok(InputEvent::Line(line)) => return Ok(Some(line)),
                Ok(InputEvent::Closed) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("input exhausted");
                    self.exhausted = true;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}
