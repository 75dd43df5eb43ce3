//! Physical switch command set.

use crate::context::MailboxContext;
use crate::wire::{grow, put_u16, read_u8};
use crate::Completion::Done;
use crate::{CommandResult, MailboxStatus};

const IDENTIFY_SWITCH_LEN: usize = 0x49;
const HDM_DECODERS_PER_USP: u8 = 4;

const PORT_STATE_HEADER: usize = 4;
const PORT_INFO_LEN: usize = 16;

const CONFIG_STATE_DSP: u8 = 3;
const CONFIG_STATE_USP: u8 = 4;
const DEVICE_TYPE_NONE: u8 = 0;
const DEVICE_TYPE_TYPE3: u8 = 4;
const CXL_VERSION: u8 = 2;
const LINK_WIDTH: u8 = 0x10;
const LINK_SPEEDS: u8 = 0x1c;
const LINK_SPEED: u8 = 5;
const LTSSM_L0: u8 = 7;
const DSP_LD_COUNT: u8 = 3;

pub(crate) fn identify_switch_device(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let sw = ctx.switch_state()?;
    let upstream = sw.topology.upstream_port();
    let downstream = sw.topology.downstream_ports();
    let num_ports = (downstream.len() + 1) as u8;

    let buf = grow(out, IDENTIFY_SWITCH_LEN);
    buf[0] = sw.ingress_port;
    buf[2] = num_ports;
    buf[3] = 1;
    let bitmap = &mut buf[0x04..0x24];
    for port in downstream.iter().copied().chain([upstream]) {
        bitmap[usize::from(port / 8)] |= 1 << (port % 8);
    }
    buf[0x24] = 1;
    put_u16(buf, 0x44, u16::from(num_ports));
    put_u16(buf, 0x46, u16::from(num_ports));
    buf[0x48] = HDM_DECODERS_PER_USP;
    Ok(Done)
}

pub(crate) fn get_physical_port_state(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let count = usize::from(read_u8(input, 0)?);
    if input.len() != 1 + count {
        return Err(MailboxStatus::InvalidPayloadLength);
    }
    let ids = &input[1..];
    let sw = ctx.switch_state()?;
    let upstream = sw.topology.upstream_port();
    let downstream = sw.topology.downstream_ports();

    let buf = grow(out, PORT_STATE_HEADER + count * PORT_INFO_LEN);
    let (hdr, body) = buf.split_at_mut(PORT_STATE_HEADER);
    hdr[0] = count as u8;
    for (dst, &port) in body.chunks_exact_mut(PORT_INFO_LEN).zip(ids) {
        dst[0] = port;
        if port == upstream {
            dst[1] = CONFIG_STATE_USP;
            dst[4] = DEVICE_TYPE_NONE;
        } else if downstream.contains(&port) {
            dst[1] = CONFIG_STATE_DSP;
            dst[4] = if sw.topology.leaf_mailbox(port).is_some() {
                DEVICE_TYPE_TYPE3
            } else {
                DEVICE_TYPE_NONE
            };
            dst[15] = DSP_LD_COUNT;
        } else {
            return Err(MailboxStatus::InvalidInput);
        }
        dst[2] = CXL_VERSION;
        dst[5] = CXL_VERSION;
        dst[6] = LINK_WIDTH;
        dst[7] = LINK_WIDTH;
        dst[8] = LINK_SPEEDS;
        dst[9] = LINK_SPEED;
        dst[10] = LINK_SPEED;
        dst[11] = LTSSM_L0;
        // First lane (12) and link state (13..15) stay zero.
    }
    Ok(Done)
}
