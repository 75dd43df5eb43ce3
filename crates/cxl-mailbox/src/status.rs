use core::fmt;

/// Mailbox return codes.
///
/// Discriminants are the values written to the return-code field of the
/// mailbox status register (and the CCI message header when tunnelled).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailboxStatus {
    Success = 0x00,
    /// Not a failure: the command was accepted and continues in the background.
    BackgroundStarted = 0x01,
    InvalidInput = 0x02,
    Unsupported = 0x03,
    /// Provisioning bug (e.g. capacity not a multiple of 256MiB).
    InternalError = 0x04,
    Busy = 0x06,
    MediaDisabled = 0x07,
    InvalidPhysicalAddress = 0x0f,
    InjectPoisonLimit = 0x10,
    InvalidPayloadLength = 0x16,
    InvalidExtentList = 0x1e,
}

impl MailboxStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x00 => Self::Success,
            0x01 => Self::BackgroundStarted,
            0x02 => Self::InvalidInput,
            0x03 => Self::Unsupported,
            0x04 => Self::InternalError,
            0x06 => Self::Busy,
            0x07 => Self::MediaDisabled,
            0x0f => Self::InvalidPhysicalAddress,
            0x10 => Self::InjectPoisonLimit,
            0x16 => Self::InvalidPayloadLength,
            0x1e => Self::InvalidExtentList,
            _ => return None,
        })
    }

    /// Whether the status means the command was accepted.
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Success | Self::BackgroundStarted)
    }
}

impl fmt::Display for MailboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::BackgroundStarted => "background command started",
            Self::InvalidInput => "invalid input",
            Self::Unsupported => "unsupported",
            Self::InternalError => "internal error",
            Self::Busy => "busy",
            Self::MediaDisabled => "media disabled",
            Self::InvalidPhysicalAddress => "invalid physical address",
            Self::InjectPoisonLimit => "inject poison limit reached",
            Self::InvalidPayloadLength => "invalid payload length",
            Self::InvalidExtentList => "invalid extent list",
        };
        write!(f, "{name} ({:#04x})", self.code())
    }
}

/// How a successfully accepted command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Finished synchronously; reported as [`MailboxStatus::Success`].
    Done,
    /// Continues in the background for `runtime_ms`; reported as
    /// [`MailboxStatus::BackgroundStarted`].
    Background { runtime_ms: u64 },
}

impl Completion {
    pub fn status(self) -> MailboxStatus {
        match self {
            Completion::Done => MailboxStatus::Success,
            Completion::Background { .. } => MailboxStatus::BackgroundStarted,
        }
    }
}

/// Result type returned by command handlers.
pub type CommandResult = Result<Completion, MailboxStatus>;
