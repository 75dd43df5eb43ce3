//! Tunnel Management Command: relays a CCI message to a device below a
//! downstream port and wraps its response.

use tracing::debug;

use crate::context::MailboxContext;
use crate::wire::{grow, put_u16, put_u24, read_u16, read_u24, read_u8};
use crate::Completion::Done;
use crate::{CommandResult, MailboxStatus};

const TUNNEL_HEADER: usize = 4;
const CCI_HEADER: usize = 12;

const TARGET_PORT: u8 = 0;
const CATEGORY_RESPONSE: u8 = 1;

pub(crate) fn tunnel_management_command(
    ctx: &mut MailboxContext,
    input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let port = read_u8(input, 0).map_err(|_| MailboxStatus::InvalidInput)?;
    let target_type = read_u8(input, 1).map_err(|_| MailboxStatus::InvalidInput)?;
    let size = usize::from(read_u16(input, 2).map_err(|_| MailboxStatus::InvalidInput)?);
    if size < CCI_HEADER || input.len() < TUNNEL_HEADER + size {
        return Err(MailboxStatus::InvalidInput);
    }
    let msg = &input[TUNNEL_HEADER..TUNNEL_HEADER + size];
    let tag = msg[1];
    let command = msg[3];
    let set = msg[4];
    let pl_len = read_u24(msg, 5)? as usize;
    if pl_len > size - CCI_HEADER {
        return Err(MailboxStatus::InvalidInput);
    }
    if target_type != TARGET_PORT {
        debug!(port, target_type, "tunnel target type not supported");
        return Err(MailboxStatus::Unsupported);
    }

    // The leaf's reply travels behind both headers.
    let room = ctx
        .response_max()
        .saturating_sub(TUNNEL_HEADER + CCI_HEADER);
    let sw = ctx.switch_state()?;
    let Some(leaf) = sw.topology.leaf_mailbox(port) else {
        debug!(port, "no device below tunnel port");
        return Err(MailboxStatus::InvalidInput);
    };
    let payload = &msg[CCI_HEADER..CCI_HEADER + pl_len];
    let resp = leaf.dispatch_with_limit(set, command, payload, room);
    debug!(port, set, command, status = %resp.status, "tunnelled command");

    let inner_len = CCI_HEADER + resp.payload.len();
    let resp_len = u16::try_from(inner_len).map_err(|_| MailboxStatus::InternalError)?;
    let buf = grow(out, TUNNEL_HEADER + inner_len);
    put_u16(buf, 0, resp_len);
    let cci = &mut buf[TUNNEL_HEADER..];
    cci[0] = CATEGORY_RESPONSE;
    cci[1] = tag;
    cci[3] = command;
    cci[4] = set;
    put_u24(cci, 5, resp.payload.len() as u32);
    put_u16(cci, 10, resp.status.code());
    cci[CCI_HEADER..].copy_from_slice(&resp.payload);
    Ok(Done)
}
