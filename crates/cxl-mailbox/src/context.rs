//! Mailbox contexts and request dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::backend::{DeviceIdentity, MemoryBackend};
use crate::background::{BackgroundStatus, BackgroundTracker};
use crate::cel::{self, CelEntry};
use crate::config::{MemoryDeviceConfig, SwitchConfig};
use crate::dcd::{DcStore, Extent};
use crate::error::Result;
use crate::events::{EventLogType, EventLogs, EventRecord};
use crate::opcode::{SANITIZE_OVERWRITE, SCAN_MEDIA};
use crate::poison::{PoisonKind, PoisonStore};
use crate::registry::{
    CommandDescriptor, InputLength, DCD_COMMANDS, MEDIA_GATED, SWITCH_COMMANDS,
    SWITCH_MCTP_COMMANDS, TYPE3_COMMANDS, TYPE3_MCTP_COMMANDS,
};
use crate::time::{Clock, CompletionSink, NullSink};
use crate::topology::SwitchTopology;
use crate::{Completion, MailboxStatus, Opcode, MAX_PAYLOAD_SIZE};

/// Component type reported by IDENTIFY.
pub(crate) const COMPONENT_SWITCH: u8 = 0x00;
pub(crate) const COMPONENT_TYPE3: u8 = 0x03;

/// Outcome of one mailbox request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: MailboxStatus,
    /// Response payload; empty unless the command was accepted.
    pub payload: Vec<u8>,
}

impl Response {
    fn error(status: MailboxStatus) -> Self {
        Self {
            status,
            payload: Vec::new(),
        }
    }

    pub fn background_started(&self) -> bool {
        self.status == MailboxStatus::BackgroundStarted
    }
}

pub(crate) struct MemoryDevice {
    pub(crate) identity: DeviceIdentity,
    pub(crate) backend: Box<dyn MemoryBackend>,
    pub(crate) poison: PoisonStore,
    pub(crate) dcd: DcStore,
    pub(crate) events: EventLogs,
}

impl MemoryDevice {
    /// Static plus dynamic capacity.
    pub(crate) fn provisioned_capacity(&self) -> u64 {
        self.backend
            .static_capacity()
            .saturating_add(self.dcd.total_capacity())
    }
}

pub(crate) struct SwitchState {
    pub(crate) identity: DeviceIdentity,
    pub(crate) ingress_port: u8,
    pub(crate) topology: Box<dyn SwitchTopology>,
}

/// What the context is attached to, fixed at construction.
pub(crate) enum Personality {
    MemoryDevice(Box<MemoryDevice>),
    MemoryDeviceMctp(DeviceIdentity),
    Switch(Box<SwitchState>),
}

/// Host time as last set by TIMESTAMP_SET.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Timestamp {
    set: Option<(u64, u64)>,
}

impl Timestamp {
    pub(crate) fn set(&mut self, host_ns: u64, now_ms: u64) {
        self.set = Some((host_ns, now_ms));
    }

    /// Zero until set, then host time advanced by the local clock.
    pub(crate) fn now_ns(&self, now_ms: u64) -> u64 {
        match self.set {
            Some((host_ns, set_at_ms)) => host_ns.wrapping_add(
                now_ms.saturating_sub(set_at_ms).saturating_mul(1_000_000),
            ),
            None => 0,
        }
    }
}

/// One management endpoint: a command table plus the state its commands act on.
pub struct MailboxContext {
    commands: BTreeMap<u16, CommandDescriptor>,
    payload_max: usize,
    /// Tighter response bound for the request in flight, set when the
    /// response is relayed inside another message.
    response_limit: Option<usize>,
    cel: Vec<CelEntry>,
    pub(crate) bg: BackgroundTracker,
    pub(crate) timestamp: Timestamp,
    clock: Arc<dyn Clock>,
    sink: Box<dyn CompletionSink>,
    pub(crate) personality: Personality,
}

impl fmt::Debug for MailboxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxContext")
            .field("commands", &self.commands.len())
            .field("payload_max", &self.payload_max)
            .field("bg", &self.bg)
            .finish_non_exhaustive()
    }
}

impl MailboxContext {
    fn with_tables(
        tables: &[&[CommandDescriptor]],
        payload_max: usize,
        clock: Arc<dyn Clock>,
        personality: Personality,
    ) -> Self {
        let mut ctx = Self {
            commands: BTreeMap::new(),
            payload_max,
            response_limit: None,
            cel: Vec::new(),
            bg: BackgroundTracker::new(),
            timestamp: Timestamp::default(),
            clock,
            sink: Box::new(NullSink),
            personality,
        };
        for table in tables {
            ctx.install(table);
        }
        ctx.cel = cel::build(&ctx.commands);
        ctx
    }

    /// Primary mailbox of a memory expansion device.
    ///
    /// Dynamic capacity commands are installed when the configuration declares
    /// regions.
    pub fn memory_device(
        config: &MemoryDeviceConfig,
        backend: Box<dyn MemoryBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let regions = config.layout_regions(backend.static_capacity())?;
        let dcd = DcStore::new(regions)?;
        let tables: &[&[CommandDescriptor]] = if dcd.regions().is_empty() {
            &[TYPE3_COMMANDS]
        } else {
            &[TYPE3_COMMANDS, DCD_COMMANDS]
        };
        let dev = MemoryDevice {
            identity: config.identity,
            backend,
            poison: PoisonStore::new(),
            dcd,
            events: EventLogs::new(),
        };
        Ok(Self::with_tables(
            tables,
            config.payload_max,
            clock,
            Personality::MemoryDevice(Box::new(dev)),
        ))
    }

    /// MCTP endpoint of a memory device; identification only.
    pub fn memory_device_mctp(identity: DeviceIdentity, clock: Arc<dyn Clock>) -> Self {
        Self::with_tables(
            &[TYPE3_MCTP_COMMANDS],
            MAX_PAYLOAD_SIZE,
            clock,
            Personality::MemoryDeviceMctp(identity),
        )
    }

    /// Switch CCI mailbox.
    pub fn switch(
        config: &SwitchConfig,
        topology: Box<dyn SwitchTopology>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::switch_with(SWITCH_COMMANDS, config, topology, clock)
    }

    /// MCTP endpoint of a switch upstream port.
    pub fn switch_mctp(
        config: &SwitchConfig,
        topology: Box<dyn SwitchTopology>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::switch_with(SWITCH_MCTP_COMMANDS, config, topology, clock)
    }

    fn switch_with(
        table: &[CommandDescriptor],
        config: &SwitchConfig,
        topology: Box<dyn SwitchTopology>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let state = SwitchState {
            identity: DeviceIdentity {
                subsystem_vendor_id: 0,
                subsystem_id: 0,
                ..config.identity
            },
            ingress_port: config.ingress_port,
            topology,
        };
        Ok(Self::with_tables(
            &[table],
            config.payload_max,
            clock,
            Personality::Switch(Box::new(state)),
        ))
    }

    fn install(&mut self, table: &[CommandDescriptor]) {
        for desc in table {
            self.commands.insert(desc.opcode.0, *desc);
        }
    }

    /// Merges `table` into the installed commands and regenerates the CEL.
    pub fn add_commands(&mut self, table: &[CommandDescriptor], payload_max: usize) {
        self.install(table);
        self.payload_max = self.payload_max.max(payload_max);
        self.cel = cel::build(&self.commands);
    }

    pub fn set_completion_sink(&mut self, sink: Box<dyn CompletionSink>) {
        self.sink = sink;
    }

    pub fn payload_max(&self) -> usize {
        self.payload_max
    }

    /// Largest response the request being processed may produce.
    pub(crate) fn response_max(&self) -> usize {
        self.response_limit
            .map_or(self.payload_max, |limit| limit.min(self.payload_max))
    }

    pub fn cel(&self) -> &[CelEntry] {
        &self.cel
    }

    pub fn command(&self, opcode: Opcode) -> Option<&CommandDescriptor> {
        self.commands.get(&opcode.0)
    }

    pub fn background_status(&self) -> BackgroundStatus {
        self.bg.status()
    }

    /// Deadline (in clock milliseconds) of the next background progress update.
    pub fn next_tick_at(&self) -> Option<u64> {
        self.bg.next_tick_at()
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub(crate) fn timestamp_ns(&self) -> u64 {
        self.timestamp.now_ns(self.now_ms())
    }

    pub(crate) fn memdev(&mut self) -> std::result::Result<&mut MemoryDevice, MailboxStatus> {
        match &mut self.personality {
            Personality::MemoryDevice(dev) => Ok(dev),
            _ => Err(MailboxStatus::Unsupported),
        }
    }

    pub(crate) fn switch_state(&mut self) -> std::result::Result<&mut SwitchState, MailboxStatus> {
        match &mut self.personality {
            Personality::Switch(sw) => Ok(sw),
            _ => Err(MailboxStatus::Unsupported),
        }
    }

    /// Identity and component type reported by IDENTIFY.
    pub(crate) fn identity(&self) -> (DeviceIdentity, u8) {
        match &self.personality {
            Personality::MemoryDevice(dev) => (dev.identity, COMPONENT_TYPE3),
            Personality::MemoryDeviceMctp(identity) => (*identity, COMPONENT_TYPE3),
            Personality::Switch(sw) => (sw.identity, COMPONENT_SWITCH),
        }
    }

    pub fn switch_topology(&mut self) -> Option<&mut dyn SwitchTopology> {
        match &mut self.personality {
            Personality::Switch(sw) => Some(sw.topology.as_mut()),
            _ => None,
        }
    }

    pub fn poison(&self) -> Option<&PoisonStore> {
        match &self.personality {
            Personality::MemoryDevice(dev) => Some(&dev.poison),
            _ => None,
        }
    }

    /// Reports a media error found by the device model.
    ///
    /// Returns `false` if this context has no media.
    pub fn record_media_error(&mut self, start: u64, len: u64, kind: PoisonKind) -> bool {
        let now = self.timestamp_ns();
        match self.memdev() {
            Ok(dev) => {
                dev.poison.record_media_error(start, len, kind, now);
                true
            }
            Err(_) => false,
        }
    }

    /// Appends a device event, returning its handle. `None` if the log
    /// overflowed or this context has no event logs.
    pub fn insert_event(&mut self, log: EventLogType, record: EventRecord) -> Option<u16> {
        let now = self.timestamp_ns();
        self.memdev().ok()?.events.insert(log, record, now)
    }

    pub fn extents(&self) -> &[Extent] {
        match &self.personality {
            Personality::MemoryDevice(dev) => dev.dcd.extents(),
            _ => &[],
        }
    }

    /// Provisions an extent without a host request.
    pub fn insert_extent(
        &mut self,
        start: u64,
        len: u64,
        tag: [u8; 16],
        shared_seq: u16,
    ) -> std::result::Result<(), MailboxStatus> {
        self.memdev()?.dcd.insert_extent(start, len, tag, shared_seq)
    }

    /// Processes one request whose response must fit in `limit` bytes.
    ///
    /// Paginated commands size their output to the limit, so a relaying
    /// caller can wrap the response without overflowing its own payload.
    pub fn dispatch_with_limit(
        &mut self,
        set: u8,
        cmd: u8,
        input: &[u8],
        limit: usize,
    ) -> Response {
        let saved = self.response_limit.replace(limit.min(self.response_max()));
        let resp = self.dispatch(set, cmd, input);
        self.response_limit = saved;
        resp
    }

    /// Processes one request.
    pub fn dispatch(&mut self, set: u8, cmd: u8, input: &[u8]) -> Response {
        let opcode = Opcode::new(set, cmd);
        let Some(desc) = self.commands.get(&opcode.0).copied() else {
            debug!(%opcode, "unsupported mailbox command");
            return Response::error(MailboxStatus::Unsupported);
        };

        if let InputLength::Fixed(len) = desc.input {
            if input.len() != len {
                debug!(%opcode, expected = len, got = input.len(), "bad payload length");
                return Response::error(MailboxStatus::InvalidPayloadLength);
            }
        }
        if desc.is_background() && self.bg.is_running() {
            return Response::error(MailboxStatus::Busy);
        }
        if self.bg.running_opcode() == Some(SANITIZE_OVERWRITE) && MEDIA_GATED.contains(&opcode) {
            return Response::error(MailboxStatus::MediaDisabled);
        }

        let mut out = Vec::new();
        let completion = match (desc.handler)(self, input, &mut out) {
            Ok(completion) => completion,
            Err(status) => return Response::error(status),
        };
        if out.len() > self.response_max() {
            error!(
                %opcode,
                len = out.len(),
                max = self.response_max(),
                "response exceeds maximum payload"
            );
            return Response::error(MailboxStatus::InternalError);
        }
        if let Completion::Background { runtime_ms } = completion {
            if !desc.is_background() {
                error!(%opcode, "foreground command tried to start a background operation");
                return Response::error(MailboxStatus::InternalError);
            }
            self.bg.start(opcode, self.clock.now_ms(), runtime_ms);
            debug!(%opcode, name = desc.name, runtime_ms, "background operation started");
        }
        Response {
            status: completion.status(),
            payload: out,
        }
    }

    /// Advances the running background operation, if its tick is due.
    ///
    /// When the operation finishes its side effect is applied and the
    /// completion sink is notified once.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        match self.bg.next_tick_at() {
            Some(due) if now >= due => {}
            _ => return,
        }
        let Some(opcode) = self.bg.poll(now) else {
            return;
        };
        self.complete_background(opcode);
        info!(%opcode, "background operation complete");
        self.sink.background_complete(opcode);
    }

    fn complete_background(&mut self, opcode: Opcode) {
        let Personality::MemoryDevice(dev) = &mut self.personality else {
            return;
        };
        match opcode {
            SANITIZE_OVERWRITE => {
                dev.backend.sanitize();
                dev.backend.set_media_enabled(true);
            }
            SCAN_MEDIA => dev.poison.complete_scan(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::*;
    use crate::{ManualClock, RamBackend};

    fn memdev() -> MailboxContext {
        let config = MemoryDeviceConfig::default();
        let backend = Box::new(config.ram_backend());
        MailboxContext::memory_device(&config, backend, Arc::new(ManualClock::new(0))).unwrap()
    }

    #[test]
    fn cel_matches_table_in_opcode_order() {
        let ctx = memdev();
        let opcodes: Vec<u16> = ctx.cel().iter().map(|e| e.opcode.0).collect();
        let mut sorted = opcodes.clone();
        sorted.sort_unstable();
        assert_eq!(opcodes, sorted);
        assert_eq!(opcodes.len(), TYPE3_COMMANDS.len());
        assert!(ctx.command(DCD_GET_DC_CONFIG).is_none());
    }

    #[test]
    fn add_commands_rebuilds_cel() {
        let mut ctx = memdev();
        let before = ctx.cel().len();
        ctx.add_commands(DCD_COMMANDS, 4096);
        assert_eq!(ctx.cel().len(), before + DCD_COMMANDS.len());
        assert_eq!(ctx.payload_max(), 4096);
        let release = ctx
            .cel()
            .iter()
            .find(|e| e.opcode == DCD_RELEASE_CAPACITY)
            .unwrap();
        assert_eq!(release.effects, crate::CommandEffects::DATA_CHANGE);
    }

    #[test]
    fn unknown_and_misfit_requests() {
        let mut ctx = memdev();
        let resp = ctx.dispatch(0x7f, 0x00, &[]);
        assert_eq!(resp.status, MailboxStatus::Unsupported);
        assert!(resp.payload.is_empty());

        let resp = ctx.dispatch(SET_INFOSTAT, IDENTIFY.command(), &[0]);
        assert_eq!(resp.status, MailboxStatus::InvalidPayloadLength);
    }

    #[test]
    fn mctp_endpoint_only_identifies() {
        let mut ctx = MailboxContext::memory_device_mctp(
            DeviceIdentity::default(),
            Arc::new(ManualClock::new(0)),
        );
        assert_eq!(ctx.dispatch(SET_INFOSTAT, 0x01, &[]).payload.len(), 18);
        assert_eq!(
            ctx.dispatch(SET_IDENTIFY, 0x00, &[]).status,
            MailboxStatus::Unsupported
        );
        assert!(!ctx.record_media_error(0, 64, PoisonKind::Internal));
    }

    #[test]
    fn timestamp_advances_with_clock() {
        let clock = ManualClock::new(100);
        let config = MemoryDeviceConfig::default();
        let mut ctx = MailboxContext::memory_device(
            &config,
            Box::new(RamBackend::new(0, 256 << 20, 0)),
            Arc::new(clock.clone()),
        )
        .unwrap();
        assert_eq!(ctx.timestamp_ns(), 0);
        ctx.timestamp.set(5_000, clock.now_ms());
        clock.advance(2);
        assert_eq!(ctx.timestamp_ns(), 2_005_000);
    }
}
