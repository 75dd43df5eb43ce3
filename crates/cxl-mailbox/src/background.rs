//! Background operation tracking.
//!
//! A context runs at most one background command at a time. The tracker only
//! measures progress; what happens when an operation finishes is decided by
//! the owning [`crate::MailboxContext`].

use crate::{MailboxStatus, Opcode, BACKGROUND_TICK_MS, CACHE_LINE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Running {
    opcode: Opcode,
    start_ms: u64,
    runtime_ms: u64,
    next_tick_ms: u64,
}

/// Snapshot returned by Background Operation Status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundStatus {
    /// Opcode of the running operation, `None` when idle.
    pub opcode: Option<Opcode>,
    pub percent: u8,
    pub return_code: MailboxStatus,
}

impl BackgroundStatus {
    pub fn running(&self) -> bool {
        self.opcode.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundTracker {
    running: Option<Running>,
    percent: u8,
    return_code: MailboxStatus,
}

impl Default for BackgroundTracker {
    fn default() -> Self {
        Self {
            running: None,
            percent: 0,
            return_code: MailboxStatus::Success,
        }
    }
}

impl BackgroundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn running_opcode(&self) -> Option<Opcode> {
        self.running.map(|r| r.opcode)
    }

    /// Begins tracking `opcode`; the first progress update is due one tick later.
    pub fn start(&mut self, opcode: Opcode, now_ms: u64, runtime_ms: u64) {
        self.running = Some(Running {
            opcode,
            start_ms: now_ms,
            runtime_ms,
            next_tick_ms: now_ms.saturating_add(BACKGROUND_TICK_MS),
        });
        self.percent = 0;
        self.return_code = MailboxStatus::Success;
    }

    pub fn status(&self) -> BackgroundStatus {
        BackgroundStatus {
            opcode: self.running_opcode(),
            percent: self.percent,
            return_code: self.return_code,
        }
    }

    pub fn next_tick_at(&self) -> Option<u64> {
        self.running.map(|r| r.next_tick_ms)
    }

    /// Updates progress at `now_ms`.
    ///
    /// Returns the opcode once its runtime has elapsed; the tracker is idle
    /// again at that point with progress left at 100.
    pub fn poll(&mut self, now_ms: u64) -> Option<Opcode> {
        let running = self.running.as_mut()?;
        let elapsed = now_ms.saturating_sub(running.start_ms);
        if elapsed >= running.runtime_ms {
            let opcode = running.opcode;
            self.running = None;
            self.percent = 100;
            self.return_code = MailboxStatus::Success;
            return Some(opcode);
        }
        let percent = elapsed.saturating_mul(100) / running.runtime_ms;
        self.percent = percent.min(99) as u8;
        running.next_tick_ms = now_ms.saturating_add(BACKGROUND_TICK_MS);
        None
    }
}

/// Sanitize runtime in seconds for a device of `capacity_mib`.
pub fn sanitize_duration_secs(capacity_mib: u64) -> u64 {
    const STEPS: [(u64, u64); 12] = [
        (512, 4),
        (1024, 8),
        (2 * 1024, 15),
        (4 * 1024, 30),
        (8 * 1024, 60),
        (16 * 1024, 120),
        (32 * 1024, 240),
        (64 * 1024, 480),
        (128 * 1024, 900),
        (256 * 1024, 1800),
        (512 * 1024, 3600),
        (1024 * 1024, 7200),
    ];
    STEPS
        .iter()
        .find(|(limit, _)| capacity_mib <= *limit)
        .map_or(4 * 3600, |&(_, secs)| secs)
}

/// Estimated scan runtime: 0.0005ms per cache line, at least 1ms.
pub fn scan_duration_ms(len_bytes: u64) -> u64 {
    (len_bytes / CACHE_LINE_SIZE / 2000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::SANITIZE_OVERWRITE;

    #[test]
    fn sanitize_steps() {
        assert_eq!(sanitize_duration_secs(0), 4);
        assert_eq!(sanitize_duration_secs(512), 4);
        assert_eq!(sanitize_duration_secs(513), 8);
        assert_eq!(sanitize_duration_secs(1024 * 1024), 7200);
        assert_eq!(sanitize_duration_secs(1024 * 1024 + 1), 14400);
    }

    #[test]
    fn scan_estimate() {
        assert_eq!(scan_duration_ms(64), 1);
        assert_eq!(scan_duration_ms(256 * 1024 * 1024), 2097);
    }

    #[test]
    fn progress_then_completion() {
        let mut bg = BackgroundTracker::new();
        bg.start(SANITIZE_OVERWRITE, 10, 4000);
        assert_eq!(bg.next_tick_at(), Some(1010));
        assert_eq!(bg.status().percent, 0);

        assert_eq!(bg.poll(1010), None);
        assert_eq!(bg.status().percent, 25);
        assert_eq!(bg.next_tick_at(), Some(2010));
        assert!(bg.status().running());

        assert_eq!(bg.poll(4010), Some(SANITIZE_OVERWRITE));
        let status = bg.status();
        assert_eq!(status.opcode, None);
        assert_eq!(status.percent, 100);
        assert_eq!(bg.next_tick_at(), None);
        assert_eq!(bg.poll(5000), None);
    }
}
