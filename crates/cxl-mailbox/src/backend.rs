use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::CACHE_LINE_SIZE;

/// PCI identity reported by IDENTIFY.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,
    pub serial: u64,
}

/// Media and label storage of a memory expansion device.
///
/// The mailbox never touches host memory directly; every media side effect
/// goes through this trait.
pub trait MemoryBackend: Send {
    /// Static volatile capacity in bytes.
    fn volatile_capacity(&self) -> u64;
    /// Static persistent capacity in bytes.
    fn persistent_capacity(&self) -> u64;

    /// Label storage area size in bytes.
    fn lsa_size(&self) -> u32;
    /// Reads label storage into `buf`, returning the number of bytes copied.
    fn read_lsa(&self, offset: u32, buf: &mut [u8]) -> usize;
    fn write_lsa(&mut self, offset: u32, data: &[u8]);

    /// Overwrites one cache line at device physical address `dpa`.
    ///
    /// Returns `false` if the address is not backed.
    fn write_cacheline(&mut self, dpa: u64, data: &[u8; CACHE_LINE_SIZE as usize]) -> bool;

    fn set_media_enabled(&mut self, enabled: bool);

    /// Zeroes all media and label storage.
    fn sanitize(&mut self);

    fn static_capacity(&self) -> u64 {
        self.volatile_capacity()
            .saturating_add(self.persistent_capacity())
    }
}

/// In-memory backend.
///
/// Media contents are kept sparsely (only written cache lines) so large
/// capacities can be modelled without allocating them.
#[derive(Debug, Clone)]
pub struct RamBackend {
    volatile: u64,
    persistent: u64,
    dynamic: u64,
    lsa: Vec<u8>,
    lines: HashMap<u64, [u8; CACHE_LINE_SIZE as usize]>,
    media_enabled: bool,
    sanitize_count: u32,
}

impl RamBackend {
    pub fn new(volatile: u64, persistent: u64, lsa_size: usize) -> Self {
        Self {
            volatile,
            persistent,
            dynamic: 0,
            lsa: vec![0u8; lsa_size],
            lines: HashMap::new(),
            media_enabled: true,
            sanitize_count: 0,
        }
    }

    /// Extends the backed range past static capacity for dynamic capacity regions.
    pub fn with_dynamic_capacity(mut self, bytes: u64) -> Self {
        self.dynamic = bytes;
        self
    }

    pub fn media_enabled(&self) -> bool {
        self.media_enabled
    }

    pub fn sanitize_count(&self) -> u32 {
        self.sanitize_count
    }

    pub fn cacheline(&self, dpa: u64) -> Option<&[u8; CACHE_LINE_SIZE as usize]> {
        self.lines.get(&dpa)
    }

    pub fn lsa(&self) -> &[u8] {
        &self.lsa
    }
}

impl MemoryBackend for RamBackend {
    fn volatile_capacity(&self) -> u64 {
        self.volatile
    }

    fn persistent_capacity(&self) -> u64 {
        self.persistent
    }

    fn lsa_size(&self) -> u32 {
        u32::try_from(self.lsa.len()).unwrap_or(u32::MAX)
    }

    fn read_lsa(&self, offset: u32, buf: &mut [u8]) -> usize {
        let start = (offset as usize).min(self.lsa.len());
        let len = buf.len().min(self.lsa.len() - start);
        buf[..len].copy_from_slice(&self.lsa[start..start + len]);
        len
    }

    fn write_lsa(&mut self, offset: u32, data: &[u8]) {
        let start = (offset as usize).min(self.lsa.len());
        let len = data.len().min(self.lsa.len() - start);
        self.lsa[start..start + len].copy_from_slice(&data[..len]);
    }

    fn write_cacheline(&mut self, dpa: u64, data: &[u8; CACHE_LINE_SIZE as usize]) -> bool {
        let limit = self.static_capacity().saturating_add(self.dynamic);
        match dpa.checked_add(CACHE_LINE_SIZE) {
            Some(end) if end <= limit => {
                let line = dpa & !(CACHE_LINE_SIZE - 1);
                self.lines.insert(line, *data);
                true
            }
            _ => false,
        }
    }

    fn set_media_enabled(&mut self, enabled: bool) {
        self.media_enabled = enabled;
    }

    fn sanitize(&mut self) {
        self.lines.clear();
        self.lsa.fill(0);
        self.sanitize_count += 1;
    }
}
