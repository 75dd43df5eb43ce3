use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while building a mailbox context from configuration.
///
/// Protocol-level failures are never reported through this type; they are
/// [`crate::MailboxStatus`] values returned to the requester.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("too many dynamic capacity regions: {count} (max {max})")]
    TooManyRegions { count: usize, max: usize },

    #[error("region {index}: invalid block size {block_size:#x}")]
    InvalidBlockSize { index: usize, block_size: u64 },

    #[error("region {index}: length {len:#x} is not a multiple of block size {block_size:#x}")]
    UnalignedRegion {
        index: usize,
        len: u64,
        block_size: u64,
    },

    #[error("region {index}: empty region")]
    EmptyRegion { index: usize },

    #[error("dynamic capacity spans {blocks} minimum-size blocks (max {max})")]
    TooManyBlocks { blocks: u64, max: u64 },

    #[error("regions {prev} and {index} overlap or are out of order")]
    RegionOrder { prev: usize, index: usize },

    #[error("maximum payload size {0} is outside 256..=1MiB")]
    InvalidPayloadSize(usize),

    #[error("label storage size {0:#x} does not fit in 32 bits")]
    LsaTooLarge(u64),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}
