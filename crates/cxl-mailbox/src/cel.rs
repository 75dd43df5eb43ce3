//! Command Effects Log.

use std::collections::BTreeMap;

use crate::registry::CommandDescriptor;
use crate::wire::put_u16;
use crate::{CommandEffects, Opcode};

/// Log identifier of the Command Effects Log (0da9c0b5-bf41-4b78-8f79-96b1623b3f17).
pub const CEL_UUID: [u8; 16] = [
    0x0d, 0xa9, 0xc0, 0xb5, 0xbf, 0x41, 0x4b, 0x78, 0x8f, 0x79, 0x96, 0xb1, 0x62, 0x3b, 0x3f, 0x17,
];

pub const CEL_ENTRY_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CelEntry {
    pub opcode: Opcode,
    pub effects: CommandEffects,
}

/// One entry per installed command, in ascending opcode order.
pub fn build(table: &BTreeMap<u16, CommandDescriptor>) -> Vec<CelEntry> {
    table
        .values()
        .map(|desc| CelEntry {
            opcode: desc.opcode,
            effects: desc.effects,
        })
        .collect()
}

pub fn encode(entries: &[CelEntry]) -> Vec<u8> {
    let mut out = vec![0u8; entries.len() * CEL_ENTRY_SIZE];
    for (chunk, entry) in out.chunks_exact_mut(CEL_ENTRY_SIZE).zip(entries) {
        put_u16(chunk, 0, entry.opcode.0);
        put_u16(chunk, 2, entry.effects.bits());
    }
    out
}
