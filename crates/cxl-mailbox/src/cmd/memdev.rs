//! Memory device identification, label storage and sanitize.

use tracing::debug;

use super::capacity_units;
use crate::background::sanitize_duration_secs;
use crate::context::MailboxContext;
use crate::events::MAX_EVENT_RECORDS;
use crate::poison::POISON_LIST_LIMIT;
use crate::wire::{grow, put_cstr, put_u16, put_u24, put_u32, put_u64, read_u32};
use crate::Completion::{Background, Done};
use crate::{CommandResult, MailboxStatus};

const FW_INFO_LEN: usize = 0x50;
const FW_SLOTS: u8 = 2;
const FW_ACTIVE_SLOT: u8 = 1 << 0;
const FW_STAGED_SLOT: u8 = 1 << 3;

const MEMDEV_IDENTIFY_LEN: usize = 0x45;
const PARTITION_INFO_LEN: usize = 0x20;
const LSA_HEADER: usize = 8;
const SECURITY_STATE_LEN: usize = 4;

/// Sanitize runtimes at or below this run synchronously.
const SANITIZE_SYNC_SECS: u64 = 2;

pub(crate) fn firmware_update_get_info(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let dev = ctx.memdev()?;
    capacity_units(dev.backend.volatile_capacity())?;
    capacity_units(dev.backend.persistent_capacity())?;

    let buf = grow(out, FW_INFO_LEN);
    buf[0] = FW_SLOTS;
    buf[1] = FW_ACTIVE_SLOT | FW_STAGED_SLOT;
    put_cstr(&mut buf[0x10..0x20], "BWFW VERSION 0");
    Ok(Done)
}

pub(crate) fn identify_memory_device(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let dev = ctx.memdev()?;
    let volatile = capacity_units(dev.backend.volatile_capacity())?;
    let persistent = capacity_units(dev.backend.persistent_capacity())?;
    let lsa_size = dev.backend.lsa_size();

    let buf = grow(out, MEMDEV_IDENTIFY_LEN);
    put_cstr(&mut buf[..0x10], "BWFW VERSION 00");
    put_u64(buf, 0x10, volatile + persistent);
    put_u64(buf, 0x18, volatile);
    put_u64(buf, 0x20, persistent);
    // Partition alignment stays zero: capacity is not partitionable.
    for off in [0x30, 0x32, 0x34, 0x36] {
        put_u16(buf, off, MAX_EVENT_RECORDS as u16);
    }
    put_u32(buf, 0x38, lsa_size);
    put_u24(buf, 0x3c, POISON_LIST_LIMIT as u32);
    put_u16(buf, 0x43, MAX_EVENT_RECORDS as u16);
    Ok(Done)
}

pub(crate) fn get_partition_info(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let dev = ctx.memdev()?;
    let volatile = capacity_units(dev.backend.volatile_capacity())?;
    let persistent = capacity_units(dev.backend.persistent_capacity())?;

    let buf = grow(out, PARTITION_INFO_LEN);
    put_u64(buf, 0x00, volatile);
    put_u64(buf, 0x08, persistent);
    Ok(Done)
}

pub(crate) fn get_lsa(ctx: &mut MailboxContext, input: &[u8], out: &mut Vec<u8>) -> CommandResult {
    let offset = read_u32(input, 0)?;
    let length = read_u32(input, 4)?;
    let response_max = ctx.response_max();
    let dev = ctx.memdev()?;

    match offset.checked_add(length) {
        Some(end) if end <= dev.backend.lsa_size() => {}
        _ => return Err(MailboxStatus::InvalidInput),
    }
    if length as usize > response_max {
        return Err(MailboxStatus::InvalidInput);
    }
    let buf = grow(out, length as usize);
    dev.backend.read_lsa(offset, buf);
    Ok(Done)
}

pub(crate) fn set_lsa(ctx: &mut MailboxContext, input: &[u8], _out: &mut Vec<u8>) -> CommandResult {
    if input.is_empty() {
        return Ok(Done);
    }
    if input.len() < LSA_HEADER {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    let offset = read_u32(input, 0)?;
    let data = &input[LSA_HEADER..];
    let dev = ctx.memdev()?;

    let fits = u64::from(offset) + data.len() as u64 <= u64::from(dev.backend.lsa_size());
    if !fits {
        return Err(MailboxStatus::InvalidInput);
    }
    dev.backend.write_lsa(offset, data);
    Ok(Done)
}

/// Overwrites all media with zeroes.
///
/// Media stays disabled until the background operation completes.
pub(crate) fn sanitize_overwrite(
    ctx: &mut MailboxContext,
    _input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let dev = ctx.memdev()?;
    let capacity_mib = dev.backend.static_capacity() >> 20;
    let secs = sanitize_duration_secs(capacity_mib);
    debug!(capacity_mib, secs, "sanitize runtime estimate");

    if secs <= SANITIZE_SYNC_SECS {
        dev.backend.sanitize();
        return Ok(Done);
    }
    dev.backend.set_media_enabled(false);
    Ok(Background {
        runtime_ms: secs * 1000,
    })
}

pub(crate) fn get_security_state(
    _ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    grow(out, SECURITY_STATE_LEN);
    Ok(Done)
}
