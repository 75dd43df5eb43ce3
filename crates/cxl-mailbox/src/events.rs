//! Device event logs.

use std::collections::VecDeque;

use crate::wire::{put_u16, put_u24, put_u64};

/// Records kept per log before further inserts overflow.
pub const MAX_EVENT_RECORDS: usize = 8;
/// Encoded size of one event record.
pub const EVENT_RECORD_SIZE: usize = 128;
pub const EVENT_DATA_SIZE: usize = EVENT_RECORD_SIZE - EVENT_HEADER_SIZE;
const EVENT_HEADER_SIZE: usize = 48;

/// Interrupt setting mode for MSI/MSI-X delivery.
pub const INT_MODE_MSI: u8 = 0x1;
const INT_MODE_MASK: u8 = 0x3;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLogType {
    Informational = 0,
    Warning = 1,
    Failure = 2,
    Fatal = 3,
    DynamicCapacity = 4,
}

impl EventLogType {
    pub const ALL: [EventLogType; 5] = [
        EventLogType::Informational,
        EventLogType::Warning,
        EventLogType::Failure,
        EventLogType::Fatal,
        EventLogType::DynamicCapacity,
    ];

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

/// Event payload supplied by the device model. The handle and timestamp are
/// assigned when the record is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub uuid: [u8; 16],
    /// 24-bit record flags.
    pub flags: u32,
    pub related_handle: u16,
    pub maintenance_class: u8,
    pub data: [u8; EVENT_DATA_SIZE],
}

impl Default for EventRecord {
    fn default() -> Self {
        Self {
            uuid: [0; 16],
            flags: 0,
            related_handle: 0,
            maintenance_class: 0,
            data: [0; EVENT_DATA_SIZE],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredEvent {
    handle: u16,
    timestamp: u64,
    record: EventRecord,
}

impl StoredEvent {
    fn encode(&self, dst: &mut [u8]) {
        dst[..16].copy_from_slice(&self.record.uuid);
        dst[16] = EVENT_RECORD_SIZE as u8;
        put_u24(dst, 17, self.record.flags);
        put_u16(dst, 20, self.handle);
        put_u16(dst, 22, self.record.related_handle);
        put_u64(dst, 24, self.timestamp);
        dst[32] = self.record.maintenance_class;
        dst[EVENT_HEADER_SIZE..EVENT_RECORD_SIZE].copy_from_slice(&self.record.data);
    }
}

#[derive(Debug, Clone)]
struct EventLog {
    records: VecDeque<StoredEvent>,
    next_handle: u16,
    overflow_count: u16,
    first_overflow: u64,
    last_overflow: u64,
    irq_vector: Option<u8>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            next_handle: 1,
            overflow_count: 0,
            first_overflow: 0,
            last_overflow: 0,
            irq_vector: None,
        }
    }
}

impl EventLog {
    fn reset_overflow(&mut self) {
        self.overflow_count = 0;
        self.first_overflow = 0;
        self.last_overflow = 0;
    }
}

/// Fixed part of a Get Event Records response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventOverflow {
    pub count: u16,
    pub first_timestamp: u64,
    pub last_timestamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct EventLogs {
    logs: [EventLog; 5],
}

impl EventLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, returning its handle, or `None` if the log is full
    /// and the overflow counters were bumped instead.
    pub fn insert(&mut self, ty: EventLogType, record: EventRecord, timestamp: u64) -> Option<u16> {
        let log = &mut self.logs[ty as usize];
        if log.records.len() >= MAX_EVENT_RECORDS {
            if log.overflow_count == 0 {
                log.first_overflow = timestamp;
            }
            log.overflow_count = log.overflow_count.saturating_add(1);
            log.last_overflow = timestamp;
            return None;
        }
        let handle = log.next_handle;
        log.next_handle = match log.next_handle.wrapping_add(1) {
            0 => 1,
            h => h,
        };
        log.records.push_back(StoredEvent {
            handle,
            timestamp,
            record,
        });
        Some(handle)
    }

    pub fn len(&self, ty: EventLogType) -> usize {
        self.logs[ty as usize].records.len()
    }

    pub fn overflow(&self, ty: EventLogType) -> Option<EventOverflow> {
        let log = &self.logs[ty as usize];
        (log.overflow_count > 0).then_some(EventOverflow {
            count: log.overflow_count,
            first_timestamp: log.first_overflow,
            last_timestamp: log.last_overflow,
        })
    }

    /// Handles of the stored records, oldest first.
    pub fn handles(&self, ty: EventLogType) -> Vec<u16> {
        self.logs[ty as usize]
            .records
            .iter()
            .map(|e| e.handle)
            .collect()
    }

    /// Encodes up to `max` of the oldest records into `out`, returning how
    /// many were written and whether more remain.
    pub(crate) fn encode_records(
        &self,
        ty: EventLogType,
        max: usize,
        out: &mut Vec<u8>,
    ) -> (usize, bool) {
        let log = &self.logs[ty as usize];
        let n = max.min(log.records.len());
        for event in log.records.iter().take(n) {
            let start = out.len();
            out.resize(start + EVENT_RECORD_SIZE, 0);
            event.encode(&mut out[start..]);
        }
        (n, n < log.records.len())
    }

    /// Removes the oldest records, which must carry `handles` in order.
    ///
    /// Returns `false` and removes nothing on a mismatch.
    pub fn clear(&mut self, ty: EventLogType, handles: &[u16]) -> bool {
        let log = &mut self.logs[ty as usize];
        if handles.len() > log.records.len()
            || log
                .records
                .iter()
                .zip(handles)
                .any(|(event, &h)| event.handle != h)
        {
            return false;
        }
        log.records.drain(..handles.len());
        if log.records.is_empty() {
            log.reset_overflow();
        }
        true
    }

    pub fn clear_all(&mut self, ty: EventLogType) {
        let log = &mut self.logs[ty as usize];
        log.records.clear();
        log.reset_overflow();
    }

    /// Interrupt setting byte: `vector << 4 | mode`, zero when disabled.
    pub fn interrupt_setting(&self, ty: EventLogType) -> u8 {
        match self.logs[ty as usize].irq_vector {
            Some(vec) => (vec & 0xf) << 4 | INT_MODE_MSI,
            None => 0,
        }
    }

    pub fn set_interrupt_setting(&mut self, ty: EventLogType, setting: u8) {
        self.logs[ty as usize].irq_vector =
            (setting & INT_MODE_MASK == INT_MODE_MSI).then_some(setting >> 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_tracked_and_reset_when_emptied() {
        let mut logs = EventLogs::new();
        for i in 0..MAX_EVENT_RECORDS {
            assert_eq!(
                logs.insert(EventLogType::Fatal, EventRecord::default(), i as u64),
                Some(i as u16 + 1)
            );
        }
        assert_eq!(logs.insert(EventLogType::Fatal, EventRecord::default(), 100), None);
        assert_eq!(logs.insert(EventLogType::Fatal, EventRecord::default(), 200), None);
        assert_eq!(
            logs.overflow(EventLogType::Fatal),
            Some(EventOverflow {
                count: 2,
                first_timestamp: 100,
                last_timestamp: 200
            })
        );

        assert!(!logs.clear(EventLogType::Fatal, &[2]));
        assert!(logs.clear(EventLogType::Fatal, &[1, 2]));
        assert!(logs.overflow(EventLogType::Fatal).is_some());
        logs.clear_all(EventLogType::Fatal);
        assert_eq!(logs.overflow(EventLogType::Fatal), None);
    }

    #[test]
    fn handles_skip_zero() {
        let mut logs = EventLogs::new();
        logs.logs[0].next_handle = u16::MAX;
        assert_eq!(
            logs.insert(EventLogType::Informational, EventRecord::default(), 0),
            Some(u16::MAX)
        );
        assert_eq!(
            logs.insert(EventLogType::Informational, EventRecord::default(), 0),
            Some(1)
        );
    }

    #[test]
    fn record_encoding() {
        let mut logs = EventLogs::new();
        let record = EventRecord {
            uuid: [0xab; 16],
            flags: 0x01_0203,
            related_handle: 9,
            maintenance_class: 4,
            data: [0x5a; EVENT_DATA_SIZE],
        };
        logs.insert(EventLogType::Warning, record, 0x1122).unwrap();
        let mut out = Vec::new();
        assert_eq!(logs.encode_records(EventLogType::Warning, 4, &mut out), (1, false));
        assert_eq!(out.len(), EVENT_RECORD_SIZE);
        assert_eq!(out[16], 128);
        assert_eq!(&out[17..20], &[0x03, 0x02, 0x01]);
        assert_eq!(&out[20..22], &1u16.to_le_bytes());
        assert_eq!(&out[24..32], &0x1122u64.to_le_bytes());
        assert_eq!(out[32], 4);
        assert_eq!(out[127], 0x5a);
    }

    #[test]
    fn interrupt_settings() {
        let mut logs = EventLogs::new();
        logs.set_interrupt_setting(EventLogType::Failure, 0x51);
        assert_eq!(logs.interrupt_setting(EventLogType::Failure), 0x51);
        logs.set_interrupt_setting(EventLogType::Failure, 0x52);
        assert_eq!(logs.interrupt_setting(EventLogType::Failure), 0);
    }
}
