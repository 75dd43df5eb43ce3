use crate::context::MailboxContext;
use crate::wire::{grow, put_u16, put_u64};
use crate::CommandResult;
use crate::Completion::Done;

const IDENTIFY_LEN: usize = 18;
const BG_STATUS_LEN: usize = 8;

pub(crate) fn identify(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let (id, component_type) = ctx.identity();
    let shift = ctx.payload_max().ilog2() as u8;
    let buf = grow(out, IDENTIFY_LEN);
    put_u16(buf, 0, id.vendor_id);
    put_u16(buf, 2, id.device_id);
    put_u16(buf, 4, id.subsystem_vendor_id);
    put_u16(buf, 6, id.subsystem_id);
    put_u64(buf, 8, id.serial);
    buf[16] = shift;
    buf[17] = component_type;
    Ok(Done)
}

pub(crate) fn background_operation_status(
    ctx: &mut MailboxContext,
    _input: &[u8],
    out: &mut Vec<u8>,
) -> CommandResult {
    let status = ctx.background_status();
    let buf = grow(out, BG_STATUS_LEN);
    buf[0] = status.percent << 1 | u8::from(status.running());
    put_u16(buf, 2, status.opcode.map_or(0, |op| op.0));
    put_u16(buf, 4, status.return_code.code());
    Ok(Done)
}
