//! Command handlers, grouped by command set.
//!
//! Each handler decodes its fixed-layout request, acts on the context, and
//! appends the encoded response to `out`.

pub(crate) mod dcd;
pub(crate) mod events;
pub(crate) mod infostat;
pub(crate) mod logs;
pub(crate) mod media;
pub(crate) mod memdev;
pub(crate) mod switch;
pub(crate) mod tunnel;

use crate::{MailboxStatus, CAPACITY_MULTIPLIER};

/// Capacity in multiplier units; provisioning must be multiplier aligned.
pub(crate) fn capacity_units(bytes: u64) -> Result<u64, MailboxStatus> {
    if bytes % CAPACITY_MULTIPLIER != 0 {
        return Err(MailboxStatus::InternalError);
    }
    Ok(bytes / CAPACITY_MULTIPLIER)
}
