//! Time source and completion notification seams.
//!
//! Background operations are measured in milliseconds of monotonic time. The
//! embedding event loop owns the real timer: it reads
//! [`crate::MailboxContext::next_tick_at`] and calls
//! [`crate::MailboxContext::tick`] once that deadline passes. Unit tests drive
//! the same path deterministically through [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::Opcode;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Host clock backed by [`Instant`], starting at zero when created.
#[derive(Debug)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock. Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Receives the edge-triggered "background command complete" signal.
///
/// The device layer maps this onto MSI/MSI-X; the mailbox only guarantees one
/// call per finished operation.
pub trait CompletionSink: Send {
    fn background_complete(&mut self, opcode: Opcode);
}

/// Sink used until the embedder installs a real one.
#[derive(Debug, Default)]
pub struct NullSink;

impl CompletionSink for NullSink {
    fn background_complete(&mut self, _opcode: Opcode) {}
}
