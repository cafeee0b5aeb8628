//! Background flusher
//!
//! Optional worker thread that flushes an engine's write buffer on a timer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use crate::error::Result;

/// Something with a write buffer to flush
pub(crate) trait Flush: Send + Sync {
    fn flush_pending(&self) -> Result<()>;
}

/// Handle to a running flusher thread; stops it on drop
pub(crate) struct Flusher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawn a thread flushing `target` every `interval`
    pub fn spawn(target: Arc<dyn Flush>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("dawnkv-flusher".to_string())
            .spawn(move || loop {
                crossbeam::select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if let Err(e) = target.flush_pending() {
                            tracing::warn!(error = %e, "background flush failed");
                        }
                    }
                }
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the worker
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("background flusher panicked");
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}
