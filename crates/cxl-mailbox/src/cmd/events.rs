use crate::context::MailboxContext;
use crate::events::{EventLogType, EVENT_RECORD_SIZE};
use crate::wire::{grow, put_u16, put_u64, read_u8};
use crate::Completion::Done;
use crate::{CommandResult, MailboxStatus};

const GET_RECORDS_HEADER: usize = 32;
const FLAG_OVERFLOW: u8 = 1 << 0;
const FLAG_MORE_RECORDS: u8 = 1 << 1;

const CLEAR_HEADER: usize = 6;
const CLEAR_ALL: u8 = 1 << 0;

const INT_POLICY_LEN: usize = 5;
const INT_POLICY_MIN_LEN: usize = 4;

fn log_type(raw: u8) -> Result<EventLogType, MailboxStatus> {
    EventLogType::from_raw(raw).ok_or(MailboxStatus::InvalidInput)
}

pub(crate) fn get_records(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let max_recs = (ctx.response_max().saturating_sub(GET_RECORDS_HEADER) / EVENT_RECORD_SIZE)
        .min(u16::MAX as usize);
    let ty = log_type(read_u8(input, 0)?)?;
    let events = &ctx.memdev()?.events;

    grow(out, GET_RECORDS_HEADER);
    let (count, more) = events.encode_records(ty, max_recs, out);
    let hdr = &mut out[..GET_RECORDS_HEADER];
    if more {
        hdr[0] |= FLAG_MORE_RECORDS;
    }
    if let Some(overflow) = events.overflow(ty) {
        hdr[0] |= FLAG_OVERFLOW;
        put_u16(hdr, 2, overflow.count);
        put_u64(hdr, 4, overflow.first_timestamp);
        put_u64(hdr, 12, overflow.last_timestamp);
    }
    put_u16(hdr, 20, count as u16);
    Ok(Done)
}

pub(crate) fn clear_records(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    if input.len() < CLEAR_HEADER {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    let nr = usize::from(input[2]);
    let handles: Vec<u16> = input[CLEAR_HEADER..]
        .chunks_exact(2)
        .take(nr)
        .map(|h| u16::from_le_bytes([h[0], h[1]]))
        .collect();
    if handles.len() < nr {
        return Err(MailboxStatus::InvalidPayloadLength);
    }

    let ty = log_type(input[0])?;
    let events = &mut ctx.memdev()?.events;
    if input[1] & CLEAR_ALL != 0 {
        events.clear_all(ty);
    } else if !events.clear(ty, &handles) {
        return Err(MailboxStatus::InvalidInput);
    }
    Ok(Done)
}

pub(crate) fn get_interrupt_policy(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let events = &ctx.memdev()?.events;
    let buf = grow(out, INT_POLICY_LEN);
    for (slot, ty) in buf.iter_mut().zip(EventLogType::ALL) {
        *slot = events.interrupt_setting(ty);
    }
    Ok(Done)
}

pub(crate) fn set_interrupt_policy(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    if input.len() < INT_POLICY_MIN_LEN {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    let events = &mut ctx.memdev()?.events;
    for (&setting, ty) in input.iter().take(INT_POLICY_LEN).zip(EventLogType::ALL) {
        events.set_interrupt_setting(ty, setting);
    }
    Ok(Done)
}
