//! Little-endian field access for fixed-layout mailbox payloads.
//!
//! Reads are bounds checked against the request payload and fail with
//! [`MailboxStatus::InvalidPayloadLength`]; writes target response buffers the
//! handler sized itself, so an out-of-range write is a layout bug.

use crate::MailboxStatus;

pub(crate) fn read_u8(buf: &[u8], off: usize) -> Result<u8, MailboxStatus> {
    buf.get(off).copied().ok_or(MailboxStatus::InvalidPayloadLength)
}

fn read_array<const N: usize>(buf: &[u8], off: usize) -> Result<[u8; N], MailboxStatus> {
    let end = off.checked_add(N).ok_or(MailboxStatus::InvalidPayloadLength)?;
    let bytes = buf
        .get(off..end)
        .ok_or(MailboxStatus::InvalidPayloadLength)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub(crate) fn read_u16(buf: &[u8], off: usize) -> Result<u16, MailboxStatus> {
    read_array(buf, off).map(u16::from_le_bytes)
}

pub(crate) fn read_u24(buf: &[u8], off: usize) -> Result<u32, MailboxStatus> {
    let b: [u8; 3] = read_array(buf, off)?;
    Ok(u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16)
}

pub(crate) fn read_u32(buf: &[u8], off: usize) -> Result<u32, MailboxStatus> {
    read_array(buf, off).map(u32::from_le_bytes)
}

pub(crate) fn read_u64(buf: &[u8], off: usize) -> Result<u64, MailboxStatus> {
    read_array(buf, off).map(u64::from_le_bytes)
}

pub(crate) fn read_bytes<const N: usize>(buf: &[u8], off: usize) -> Result<[u8; N], MailboxStatus> {
    read_array(buf, off)
}

pub(crate) fn put_u16(buf: &mut [u8], off: usize, val: u16) {
    buf[off..off + 2].copy_from_slice(&val.to_le_bytes());
}

pub(crate) fn put_u24(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 3].copy_from_slice(&val.to_le_bytes()[..3]);
}

pub(crate) fn put_u32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut [u8], off: usize, val: u64) {
    buf[off..off + 8].copy_from_slice(&val.to_le_bytes());
}

/// Copies `s` into `dst`, NUL padded and always NUL terminated.
pub(crate) fn put_cstr(dst: &mut [u8], s: &str) {
    dst.fill(0);
    let bytes = s.as_bytes();
    let len = bytes.len().min(dst.len().saturating_sub(1));
    dst[..len].copy_from_slice(&bytes[..len]);
}

/// Zero-extends `out` to `len` bytes and returns the new tail region.
pub(crate) fn grow(out: &mut Vec<u8>, len: usize) -> &mut [u8] {
    let start = out.len();
    out.resize(start + len, 0);
    &mut out[start..]
}
