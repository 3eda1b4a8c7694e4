// src/runtime/flusher.rs
//! Background console flusher
//!
//! Under [`FlushPolicy::Buffered`](crate::runtime::output::FlushPolicy)
//! console output would otherwise sit in the buffer until the program ends.
//! The flusher drains it on a fixed interval and on demand. Each flush runs
//! on the blocking pool, so a slow transport never stalls a runtime worker.

use crate::runtime::output::OutputRedirector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct OutputFlusher {
    flush_notify: Arc<Notify>,
    stop: CancellationToken,
    handle: Option<JoinHandle<u64>>,
}

impl OutputFlusher {
    /// Spawn the flush loop on the current runtime
    pub fn start(redirector: Arc<OutputRedirector>, flush_interval: Duration) -> Self {
        let flush_notify = Arc::new(Notify::new());
        let stop = CancellationToken::new();

        let notify = Arc::clone(&flush_notify);
        let token = stop.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut flushes = 0u64;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                    _ = notify.notified() => {}
                }

                if redirector.is_closed() {
                    break;
                }
                // flush locks the buffer and sends on the transport
                let target = Arc::clone(&redirector);
                match tokio::task::spawn_blocking(move || target.flush()).await {
                    Ok(true) => flushes += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("output flush task failed: {}", e);
                        break;
                    }
                }
            }

            debug!(flushes, "output flusher stopped");
            flushes
        });

        Self {
            flush_notify,
            stop,
            handle: Some(handle),
        }
    }

    /// Ask for a flush without waiting for the next tick
    pub fn request_flush(&self) {
        self.flush_notify.notify_one();
    }

    /// Stop the loop and wait for it; returns how many flushes emitted output
    pub async fn shutdown(mut self) -> u64 {
        self.stop.cancel();
        match self.handle.take() {
            Some(handle) => match handle.await {
                Ok(flushes) => flushes,
                Err(e) => {
                    warn!("output flusher task failed: {}", e);
                    0
                }
            },
            None => 0,
        }
    }
}

impl Drop for OutputFlusher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
