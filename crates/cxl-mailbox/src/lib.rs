//! Mailbox command processor for CXL memory expanders and switches.
//!
//! A [`MailboxContext`] is one management endpoint: the primary mailbox of a
//! memory device, its MCTP endpoint, or a switch CCI. Requests arrive as
//! `(command set, command, payload)` and are answered synchronously with a
//! [`MailboxStatus`] and a little-endian response payload. Long-running
//! commands (sanitize, scan media) report
//! [`MailboxStatus::BackgroundStarted`] and are advanced by the embedder
//! calling [`MailboxContext::tick`].

pub mod backend;
pub mod background;
pub mod cel;
mod cmd;
pub mod config;
pub mod context;
pub mod dcd;
pub mod error;
pub mod events;
pub mod opcode;
pub mod poison;
pub mod registry;
pub mod status;
pub mod time;
pub mod topology;
mod wire;

#[cfg(test)]
mod proptests;

pub use backend::{DeviceIdentity, MemoryBackend, RamBackend};
pub use background::{BackgroundStatus, BackgroundTracker};
pub use config::{MemoryDeviceConfig, RegionConfig, SwitchConfig};
pub use context::{MailboxContext, Response};
pub use dcd::{DcStore, Extent, ExtentRange, Region};
pub use error::{ConfigError, Result};
pub use events::{EventLogType, EventRecord};
pub use opcode::{CommandEffects, Opcode};
pub use poison::{PoisonKind, PoisonRecord, PoisonStore, POISON_LIST_LIMIT};
pub use registry::{CommandDescriptor, Handler, InputLength};
pub use status::{CommandResult, Completion, MailboxStatus};
pub use time::{Clock, CompletionSink, ManualClock, NullSink, StdClock};
pub use topology::{StaticTopology, SwitchTopology};

/// Granularity of poison tracking and media writes.
pub const CACHE_LINE_SIZE: u64 = 64;

/// Unit in which capacities are reported; provisioned capacity must be a
/// multiple of it.
pub const CAPACITY_MULTIPLIER: u64 = 256 * 1024 * 1024;

pub const MAX_PAYLOAD_SHIFT: u32 = 11;
/// Default maximum request/response payload.
pub const MAX_PAYLOAD_SIZE: usize = 1 << MAX_PAYLOAD_SHIFT;

/// Interval between background progress updates.
pub const BACKGROUND_TICK_MS: u64 = 1000;
