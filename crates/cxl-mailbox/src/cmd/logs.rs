//! Timestamp and log retrieval, shared by memory device and switch mailboxes.

use crate::cel::{self, CEL_UUID};
use crate::context::MailboxContext;
use crate::wire::{grow, put_u16, put_u32, put_u64, read_bytes, read_u32, read_u64};
use crate::Completion::Done;
use crate::{CommandResult, MailboxStatus};

const SUPPORTED_LOGS_LEN: usize = 0x1c;

pub(crate) fn timestamp_get(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let now = ctx.timestamp_ns();
    put_u64(grow(out, 8), 0, now);
    Ok(Done)
}

pub(crate) fn timestamp_set(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let host_ns = read_u64(input, 0)?;
    let now = ctx.now_ms();
    ctx.timestamp.set(host_ns, now);
    Ok(Done)
}

pub(crate) fn get_supported(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let cel_size = ctx.cel().len() * cel::CEL_ENTRY_SIZE;
    let buf = grow(out, SUPPORTED_LOGS_LEN);
    put_u16(buf, 0, 1);
    buf[8..24].copy_from_slice(&CEL_UUID);
    put_u32(buf, 24, cel_size as u32);
    Ok(Done)
}

/// Reads `length` bytes of a log at `offset`. Only the CEL is supported.
pub(crate) fn get_log(ctx: &mut MailboxContext, input: &[u8], out: &mut Vec<u8>) -> CommandResult {
    let uuid: [u8; 16] = read_bytes(input, 0)?;
    let offset = read_u32(input, 16)? as usize;
    let length = read_u32(input, 20)? as usize;

    match offset.checked_add(length) {
        Some(end) if end <= ctx.response_max() => {}
        _ => return Err(MailboxStatus::InvalidInput),
    }
    if uuid != CEL_UUID {
        return Err(MailboxStatus::Unsupported);
    }

    let log = cel::encode(ctx.cel());
    let buf = grow(out, length);
    if let Some(src) = log.get(offset..) {
        let n = src.len().min(length);
        buf[..n].copy_from_slice(&src[..n]);
    }
    Ok(Done)
}
