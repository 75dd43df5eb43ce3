#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cxl_mailbox::{
    CompletionSink, MailboxContext, ManualClock, MemoryBackend, MemoryDeviceConfig, Opcode,
    RamBackend, Response, CACHE_LINE_SIZE,
};

pub const MIB: u64 = 1024 * 1024;

/// Backend handle the test keeps a clone of, to observe media side effects.
#[derive(Clone)]
pub struct SharedBackend(pub Arc<Mutex<RamBackend>>);

impl MemoryBackend for SharedBackend {
    fn volatile_capacity(&self) -> u64 {
        self.0.lock().unwrap().volatile_capacity()
    }

    fn persistent_capacity(&self) -> u64 {
        self.0.lock().unwrap().persistent_capacity()
    }

    fn lsa_size(&self) -> u32 {
        self.0.lock().unwrap().lsa_size()
    }

    fn read_lsa(&self, offset: u32, buf: &mut [u8]) -> usize {
        self.0.lock().unwrap().read_lsa(offset, buf)
    }

    fn write_lsa(&mut self, offset: u32, data: &[u8]) {
        self.0.lock().unwrap().write_lsa(offset, data)
    }

    fn write_cacheline(&mut self, dpa: u64, data: &[u8; CACHE_LINE_SIZE as usize]) -> bool {
        self.0.lock().unwrap().write_cacheline(dpa, data)
    }

    fn set_media_enabled(&mut self, enabled: bool) {
        self.0.lock().unwrap().set_media_enabled(enabled)
    }

    fn sanitize(&mut self) {
        self.0.lock().unwrap().sanitize()
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Vec<Opcode>>>);

impl CompletionSink for RecordingSink {
    fn background_complete(&mut self, opcode: Opcode) {
        self.0.lock().unwrap().push(opcode);
    }
}

pub struct Harness {
    pub ctx: MailboxContext,
    pub clock: ManualClock,
    pub backend: Arc<Mutex<RamBackend>>,
    pub completions: Arc<Mutex<Vec<Opcode>>>,
}

impl Harness {
    pub fn new(config: MemoryDeviceConfig) -> Self {
        let clock = ManualClock::new(0);
        let backend = Arc::new(Mutex::new(config.ram_backend()));
        let mut ctx = MailboxContext::memory_device(
            &config,
            Box::new(SharedBackend(backend.clone())),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let sink = RecordingSink::default();
        let completions = sink.0.clone();
        ctx.set_completion_sink(Box::new(sink));
        Self {
            ctx,
            clock,
            backend,
            completions,
        }
    }

    pub fn send(&mut self, opcode: Opcode, input: &[u8]) -> Response {
        self.ctx.dispatch(opcode.set(), opcode.command(), input)
    }

    /// Advances the clock one tick interval and delivers the tick.
    pub fn tick(&mut self) {
        self.clock.advance(cxl_mailbox::BACKGROUND_TICK_MS);
        self.ctx.tick();
    }

    pub fn completions(&self) -> Vec<Opcode> {
        self.completions.lock().unwrap().clone()
    }
}

pub fn memdev(volatile: u64, persistent: u64) -> Harness {
    Harness::new(MemoryDeviceConfig {
        volatile_capacity: volatile,
        persistent_capacity: persistent,
        lsa_size: 1024,
        ..Default::default()
    })
}

pub fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

pub fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

pub fn u64_at(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

/// `{start, length in cache lines}` request used by the poison and scan commands.
pub fn range_request(start: u64, lines: u64) -> Vec<u8> {
    let mut req = Vec::with_capacity(16);
    req.extend_from_slice(&start.to_le_bytes());
    req.extend_from_slice(&lines.to_le_bytes());
    req
}
