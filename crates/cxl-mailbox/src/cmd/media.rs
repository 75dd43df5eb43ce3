//! Media and poison management.

use crate::background::scan_duration_ms;
use crate::context::{MailboxContext, MemoryDevice};
use crate::opcode::SCAN_MEDIA;
use crate::poison::PoisonRecord;
use crate::wire::{grow, put_u16, put_u32, put_u64, read_bytes, read_u64};
use crate::Completion::{Background, Done};
use crate::{CommandResult, MailboxStatus, CACHE_LINE_SIZE};

const LIST_HEADER: usize = 32;
const RECORD_SIZE: usize = 16;

const POISON_FLAG_MORE: u8 = 1 << 0;
const POISON_FLAG_OVERFLOW: u8 = 1 << 1;
const POISON_FLAG_SCANNING: u8 = 1 << 2;

const RESULTS_FLAG_MORE: u8 = 1 << 0;

const LINE_MASK: u64 = CACHE_LINE_SIZE - 1;

fn max_records(limit: usize) -> usize {
    limit.saturating_sub(LIST_HEADER) / RECORD_SIZE
}

fn encode_record(dst: &mut [u8], rec: &PoisonRecord) {
    put_u64(dst, 0, (rec.start & !LINE_MASK) | rec.kind.bits());
    let lines = rec.len / CACHE_LINE_SIZE;
    put_u32(dst, 8, u32::try_from(lines).unwrap_or(u32::MAX));
}

/// Decodes `{start, length in cache lines}` and checks it against the device.
fn media_range(dev: &MemoryDevice, input: &[u8]) -> Result<(u64, u64), MailboxStatus> {
    let start = read_u64(input, 0)?;
    let len = read_u64(input, 8)?
        .checked_mul(CACHE_LINE_SIZE)
        .ok_or(MailboxStatus::InvalidInput)?;
    if start & LINE_MASK != 0 {
        return Err(MailboxStatus::InvalidInput);
    }
    match start.checked_add(len) {
        Some(end) if end <= dev.provisioned_capacity() => Ok((start, len)),
        _ => Err(MailboxStatus::InvalidPhysicalAddress),
    }
}

pub(crate) fn get_poison_list(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let max = max_records(ctx.response_max());
    let scanning = ctx.bg.running_opcode() == Some(SCAN_MEDIA);
    let start = read_u64(input, 0)?;
    let len = read_u64(input, 8)?.saturating_mul(CACHE_LINE_SIZE);
    if start & LINE_MASK != 0 {
        return Err(MailboxStatus::InvalidInput);
    }
    let poison = &ctx.memdev()?.poison;
    let listing = poison.list(start, len, max);

    let buf = grow(out, LIST_HEADER + listing.records.len() * RECORD_SIZE);
    let (hdr, body) = buf.split_at_mut(LIST_HEADER);
    if listing.more {
        hdr[0] |= POISON_FLAG_MORE;
    }
    if let Some(ts) = poison.overflow_timestamp() {
        hdr[0] |= POISON_FLAG_OVERFLOW;
        put_u64(hdr, 2, ts);
    }
    if scanning {
        hdr[0] |= POISON_FLAG_SCANNING;
    }
    put_u16(hdr, 10, listing.records.len() as u16);
    for (dst, rec) in body.chunks_exact_mut(RECORD_SIZE).zip(&listing.records) {
        encode_record(dst, rec);
    }
    Ok(Done)
}

pub(crate) fn inject_poison(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let dpa = read_u64(input, 0)?;
    let scanning = ctx.bg.running_opcode() == Some(SCAN_MEDIA);
    ctx.memdev()?
        .poison
        .inject(dpa, scanning)
        .map_err(|_| MailboxStatus::InjectPoisonLimit)?;
    Ok(Done)
}

/// Writes the supplied cache line and removes it from the poison list.
pub(crate) fn clear_poison(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let dpa = read_u64(input, 0)? & !LINE_MASK;
    let data: [u8; CACHE_LINE_SIZE as usize] = read_bytes(input, 8)?;
    let scanning = ctx.bg.running_opcode() == Some(SCAN_MEDIA);
    let now = ctx.timestamp_ns();
    let dev = ctx.memdev()?;

    match dpa.checked_add(CACHE_LINE_SIZE) {
        Some(end) if end <= dev.provisioned_capacity() => {}
        _ => return Err(MailboxStatus::InvalidPhysicalAddress),
    }
    if !dev.backend.write_cacheline(dpa, &data) {
        return Err(MailboxStatus::InternalError);
    }
    dev.poison.clear(dpa, scanning, now);
    Ok(Done)
}

pub(crate) fn get_scan_media_capabilities(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let dev = ctx.memdev()?;
    let (_, len) = media_range(dev, input)?;
    let runtime = scan_duration_ms(len);
    put_u32(grow(out, 4), 0, u32::try_from(runtime).unwrap_or(u32::MAX));
    Ok(Done)
}

/// Starts a scan of the requested range. Always runs in the background.
pub(crate) fn scan_media(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let now = ctx.timestamp_ns();
    let dev = ctx.memdev()?;
    let (start, len) = media_range(dev, input)?;

    dev.poison.begin_scan(start, len, now);
    Ok(Background {
        runtime_ms: scan_duration_ms(len),
    })
}

pub(crate) fn get_scan_media_results(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let max = max_records(ctx.response_max());
    let poison = &mut ctx.memdev()?.poison;
    if !poison.scan_has_run() {
        return Err(MailboxStatus::Unsupported);
    }
    let (records, more) = poison.take_results(max);

    let buf = grow(out, LIST_HEADER + records.len() * RECORD_SIZE);
    let (hdr, body) = buf.split_at_mut(LIST_HEADER);
    if more {
        if let Some((start, len)) = poison.next_result_range() {
            put_u64(hdr, 0, start);
            put_u64(hdr, 8, len);
        }
        hdr[16] |= RESULTS_FLAG_MORE;
    }
    put_u16(hdr, 18, records.len() as u16);
    for (dst, rec) in body.chunks_exact_mut(RECORD_SIZE).zip(&records) {
        encode_record(dst, rec);
    }
    Ok(Done)
}
