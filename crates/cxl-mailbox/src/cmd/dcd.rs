//! Dynamic capacity configuration commands.

use crate::context::MailboxContext;
use crate::dcd::ExtentRange;
use crate::wire::{grow, put_u32, put_u64, read_u32, read_u64, read_u8};
use crate::Completion::Done;
use crate::{CommandResult, MailboxStatus, CAPACITY_MULTIPLIER};

const CONFIG_HEADER: usize = 8;
const REGION_RECORD: usize = 40;

const EXTENT_LIST_HEADER: usize = 16;
const EXTENT_RECORD: usize = 40;

const UPDATE_HEADER: usize = 8;
const UPDATE_ENTRY: usize = 24;

pub(crate) fn get_dc_config(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let count = usize::from(read_u8(input, 0)?);
    let start_id = usize::from(read_u8(input, 1)?);
    let regions = ctx.memdev()?.dcd.region_config(start_id, count)?;

    let buf = grow(out, CONFIG_HEADER + regions.len() * REGION_RECORD);
    let (hdr, body) = buf.split_at_mut(CONFIG_HEADER);
    hdr[0] = regions.len() as u8;
    for (dst, region) in body.chunks_exact_mut(REGION_RECORD).zip(regions) {
        put_u64(dst, 0, region.base);
        put_u64(dst, 8, region.decode_len / CAPACITY_MULTIPLIER);
        put_u64(dst, 16, region.len);
        put_u64(dst, 24, region.block_size);
        put_u32(dst, 32, region.dsmad_handle);
        dst[36] = region.flags;
    }
    Ok(Done)
}

pub(crate) fn get_extent_list(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let requested = read_u32(input, 0)? as usize;
    let start_idx = read_u32(input, 4)? as usize;
    let fit = ctx.response_max().saturating_sub(EXTENT_LIST_HEADER) / EXTENT_RECORD;
    let dcd = &ctx.memdev()?.dcd;
    let extents = dcd.extent_list(start_idx, requested.min(fit))?;

    let buf = grow(out, EXTENT_LIST_HEADER + extents.len() * EXTENT_RECORD);
    let (hdr, body) = buf.split_at_mut(EXTENT_LIST_HEADER);
    put_u32(hdr, 0, extents.len() as u32);
    put_u32(hdr, 4, dcd.extents().len() as u32);
    put_u32(hdr, 8, dcd.generation());
    for (dst, ext) in body.chunks_exact_mut(EXTENT_RECORD).zip(extents) {
        put_u64(dst, 0, ext.start);
        put_u64(dst, 8, ext.len);
        dst[16..32].copy_from_slice(&ext.tag);
        dst[32..34].copy_from_slice(&ext.shared_seq.to_le_bytes());
    }
    Ok(Done)
}

/// Decodes an add/release payload into its extent entries.
fn extent_entries(input: &[u8]) -> Result<Vec<ExtentRange>, MailboxStatus> {
    if input.len() < UPDATE_HEADER {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    let count = read_u32(input, 0)? as usize;
    let needed = count
        .checked_mul(UPDATE_ENTRY)
        .and_then(|n| n.checked_add(UPDATE_HEADER))
        .ok_or(MailboxStatus::InvalidPayloadLength)?;
    if input.len() < needed {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    (0..count)
        .map(|i| {
            let off = UPDATE_HEADER + i * UPDATE_ENTRY;
            Ok(ExtentRange::new(read_u64(input, off)?, read_u64(input, off + 8)?))
        })
        .collect()
}

pub(crate) fn add_capacity_response(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let entries = extent_entries(input)?;
    ctx.memdev()?.dcd.add(&entries)?;
    Ok(Done)
}

pub(crate) fn release_capacity(
    ctx: &mut MailboxContext,
    input: &[u8],
    _out: &mut Vec<u8>,
) -> CommandResult {
    let entries = extent_entries(input)?;
    ctx.memdev()?.dcd.release(&entries)?;
    Ok(Done)
}
