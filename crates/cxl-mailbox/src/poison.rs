//! Poison (media error) tracking.
//!
//! Three lists are kept:
//! - the live list reported by Get Poison List, bounded to
//!   [`POISON_LIST_LIMIT`] records and never overlapping;
//! - the ground-truth list of media errors known to the device model, which
//!   Scan Media walks to rebuild the live list;
//! - the queue of Scan Media results drained by Get Scan Media Results.

use std::collections::VecDeque;

use tracing::warn;

use crate::CACHE_LINE_SIZE;

/// Maximum number of live poison records.
pub const POISON_LIST_LIMIT: usize = 256;

const LINE_MASK: u64 = CACHE_LINE_SIZE - 1;

/// Source of a poison record; encoded in the low 3 bits of the wire address.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoisonKind {
    External = 0x1,
    Internal = 0x2,
    Injected = 0x3,
    Vendor = 0x7,
}

impl PoisonKind {
    pub fn bits(self) -> u64 {
        self as u64
    }
}

/// A poisoned device physical address range, cache-line aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonRecord {
    pub start: u64,
    pub len: u64,
    pub kind: PoisonKind,
}

impl PoisonRecord {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end()
    }

    fn contains(&self, start: u64, end: u64) -> bool {
        self.start <= start && end <= self.end()
    }
}

/// Records returned by a poison list query, already clipped to the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoisonListing {
    pub records: Vec<PoisonRecord>,
    /// More overlapping records exist than were returned.
    pub more: bool,
}

#[derive(Debug, Default)]
pub struct PoisonStore {
    live: Vec<PoisonRecord>,
    ground_truth: Vec<PoisonRecord>,
    results: VecDeque<PoisonRecord>,
    overflow_timestamp: Option<u64>,
    scan_has_run: bool,
    scan_overflowed: bool,
}

impl PoisonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[PoisonRecord] {
        &self.live
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Timestamp of the first overflow, if the list has overflowed since the
    /// last full scan.
    pub fn overflow_timestamp(&self) -> Option<u64> {
        self.overflow_timestamp
    }

    pub fn scan_has_run(&self) -> bool {
        self.scan_has_run
    }

    pub fn pending_results(&self) -> usize {
        self.results.len()
    }

    pub fn is_poisoned(&self, dpa: u64) -> bool {
        let line = dpa & !LINE_MASK;
        self.live
            .iter()
            .any(|r| r.contains(line, line + CACHE_LINE_SIZE))
    }

    /// Returns every live record overlapping `[start, start + len)`, clipped to
    /// the query and to cache-line bounds, stopping after `max_records`.
    pub fn list(&self, start: u64, len: u64, max_records: usize) -> PoisonListing {
        let end = start.saturating_add(len);
        let mut listing = PoisonListing::default();
        for rec in self.live.iter().filter(|r| r.overlaps(start, end)) {
            if listing.records.len() == max_records {
                listing.more = true;
                break;
            }
            let rec_start = rec.start & !LINE_MASK;
            let clip_start = rec_start.max(start);
            let clip_end = rec_start.saturating_add(rec.len).min(end);
            listing.records.push(PoisonRecord {
                start: clip_start,
                len: clip_end - clip_start,
                kind: rec.kind,
            });
        }
        listing
    }

    /// Marks one cache line as poisoned by host request.
    ///
    /// `frozen` is set while a scan is in flight: the request succeeds but the
    /// list is left untouched.
    pub fn inject(&mut self, dpa: u64, frozen: bool) -> Result<(), PoisonLimit> {
        if self.is_poisoned(dpa) || frozen {
            return Ok(());
        }
        if self.live.len() >= POISON_LIST_LIMIT {
            return Err(PoisonLimit);
        }
        self.insert_sorted(PoisonRecord {
            start: dpa & !LINE_MASK,
            len: CACHE_LINE_SIZE,
            kind: PoisonKind::Injected,
        });
        Ok(())
    }

    /// Removes one cache line from whichever record contains it, keeping the
    /// head and tail remainders.
    ///
    /// Returns whether a record was split or removed.
    pub fn clear(&mut self, dpa: u64, frozen: bool, now: u64) -> bool {
        if frozen {
            return false;
        }
        let line = dpa & !LINE_MASK;
        let line_end = line + CACHE_LINE_SIZE;
        let Some(idx) = self
            .live
            .iter()
            .position(|r| r.contains(line, line_end))
        else {
            return false;
        };

        let rec = self.live.remove(idx);
        if line > rec.start {
            self.insert_sorted(PoisonRecord {
                start: rec.start,
                len: line - rec.start,
                kind: rec.kind,
            });
        }
        if line_end < rec.end() {
            let tail = PoisonRecord {
                start: line_end,
                len: rec.end() - line_end,
                kind: rec.kind,
            };
            if self.live.len() >= POISON_LIST_LIMIT {
                self.set_overflow(now);
            } else {
                self.insert_sorted(tail);
            }
        }
        true
    }

    /// Adds a media error known to the device (not host injected).
    ///
    /// The error always lands in the ground-truth list; it is also added to
    /// the live list when there is room, otherwise the list overflows.
    pub fn record_media_error(&mut self, start: u64, len: u64, kind: PoisonKind, now: u64) {
        let aligned_start = start & !LINE_MASK;
        let end = start.saturating_add(len);
        let aligned_end = end.saturating_add(LINE_MASK) & !LINE_MASK;
        if aligned_end <= aligned_start {
            return;
        }
        let rec = PoisonRecord {
            start: aligned_start,
            len: aligned_end - aligned_start,
            kind,
        };
        self.ground_truth.push(rec);
        if !self.insert_live(rec) {
            self.set_overflow(now);
        }
    }

    /// Starts a scan of `[start, start + len)`.
    ///
    /// Previous results are discarded. If the live list had overflowed it is
    /// dropped and rebuilt from the ground-truth records the scan finds.
    pub fn begin_scan(&mut self, start: u64, len: u64, now: u64) {
        let end = start.saturating_add(len);
        self.results.clear();
        self.scan_overflowed = false;
        if self.overflow_timestamp.is_some() {
            self.live.clear();
        }

        let (found, remaining): (Vec<_>, Vec<_>) = self
            .ground_truth
            .drain(..)
            .partition(|r| r.overlaps(start, end));
        self.ground_truth = remaining;

        for rec in found {
            if !self.insert_live(rec) {
                self.scan_overflowed = true;
                self.set_overflow(now);
            }
            self.results.push_back(rec);
        }
    }

    /// Commits a finished scan.
    pub fn complete_scan(&mut self) {
        if self.overflow_timestamp.is_some() && !self.scan_overflowed {
            self.overflow_timestamp = None;
        }
        self.scan_has_run = true;
    }

    /// Drains up to `max` queued scan results in the order they were found.
    ///
    /// The flag is set when results remain queued.
    pub fn take_results(&mut self, max: usize) -> (Vec<PoisonRecord>, bool) {
        let n = max.min(self.results.len());
        let taken: Vec<_> = self.results.drain(..n).collect();
        (taken, !self.results.is_empty())
    }

    /// Span covered by the results still queued, for restarting a drain.
    pub fn next_result_range(&self) -> Option<(u64, u64)> {
        let first = self.results.front()?;
        let end = self.results.iter().map(PoisonRecord::end).max()?;
        Some((first.start, end.saturating_sub(first.start)))
    }

    /// Inserts the parts of `rec` not already covered by live records.
    ///
    /// Returns `false` if the list ran out of room.
    fn insert_live(&mut self, rec: PoisonRecord) -> bool {
        let mut cursor = rec.start;
        let mut pieces = Vec::new();
        for r in self.live.iter().filter(|r| r.overlaps(rec.start, rec.end())) {
            if r.start > cursor {
                pieces.push((cursor, r.start));
            }
            cursor = cursor.max(r.end());
        }
        if cursor < rec.end() {
            pieces.push((cursor, rec.end()));
        }

        for (start, end) in pieces {
            if self.live.len() >= POISON_LIST_LIMIT {
                return false;
            }
            self.insert_sorted(PoisonRecord {
                start,
                len: end - start,
                kind: rec.kind,
            });
        }
        true
    }

    fn insert_sorted(&mut self, rec: PoisonRecord) {
        let idx = self.live.partition_point(|r| r.start < rec.start);
        self.live.insert(idx, rec);
    }

    fn set_overflow(&mut self, now: u64) {
        if self.overflow_timestamp.is_none() {
            warn!(timestamp = now, "poison list overflowed");
            self.overflow_timestamp = Some(now);
        }
    }
}

/// The live list already holds [`POISON_LIST_LIMIT`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonLimit;
