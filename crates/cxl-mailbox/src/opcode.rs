use bitflags::bitflags;
use core::fmt;

/// A 16-bit mailbox opcode: command set in the high byte, command in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(pub u16);

impl Opcode {
    pub const fn new(set: u8, cmd: u8) -> Self {
        Opcode((set as u16) << 8 | cmd as u16)
    }

    pub const fn set(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn command(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}h", self.0)
    }
}

bitflags! {
    /// Command Effects Log flags describing what state a command may change.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct CommandEffects: u16 {
        const CONFIG_CHANGE = 1 << 1;
        const DATA_CHANGE = 1 << 2;
        const POLICY_CHANGE = 1 << 3;
        const LOG_CHANGE = 1 << 4;
        const SECURITY_STATE_CHANGE = 1 << 5;
        const BACKGROUND_OPERATION = 1 << 6;
    }
}

// Command sets.
pub const SET_INFOSTAT: u8 = 0x00;
pub const SET_EVENTS: u8 = 0x01;
pub const SET_FIRMWARE_UPDATE: u8 = 0x02;
pub const SET_TIMESTAMP: u8 = 0x03;
pub const SET_LOGS: u8 = 0x04;
pub const SET_IDENTIFY: u8 = 0x40;
pub const SET_CCLS: u8 = 0x41;
pub const SET_MEDIA_AND_POISON: u8 = 0x43;
pub const SET_SANITIZE: u8 = 0x44;
pub const SET_PERSISTENT_MEM: u8 = 0x45;
pub const SET_DCD_CONFIG: u8 = 0x48;
pub const SET_PHYSICAL_SWITCH: u8 = 0x51;
pub const SET_TUNNEL: u8 = 0x53;

pub const IDENTIFY: Opcode = Opcode::new(SET_INFOSTAT, 0x01);
pub const BACKGROUND_OPERATION_STATUS: Opcode = Opcode::new(SET_INFOSTAT, 0x02);

pub const EVENTS_GET_RECORDS: Opcode = Opcode::new(SET_EVENTS, 0x00);
pub const EVENTS_CLEAR_RECORDS: Opcode = Opcode::new(SET_EVENTS, 0x01);
pub const EVENTS_GET_INTERRUPT_POLICY: Opcode = Opcode::new(SET_EVENTS, 0x02);
pub const EVENTS_SET_INTERRUPT_POLICY: Opcode = Opcode::new(SET_EVENTS, 0x03);

pub const FIRMWARE_UPDATE_GET_INFO: Opcode = Opcode::new(SET_FIRMWARE_UPDATE, 0x00);

pub const TIMESTAMP_GET: Opcode = Opcode::new(SET_TIMESTAMP, 0x00);
pub const TIMESTAMP_SET: Opcode = Opcode::new(SET_TIMESTAMP, 0x01);

pub const LOGS_GET_SUPPORTED: Opcode = Opcode::new(SET_LOGS, 0x00);
pub const LOGS_GET_LOG: Opcode = Opcode::new(SET_LOGS, 0x01);

pub const IDENTIFY_MEMORY_DEVICE: Opcode = Opcode::new(SET_IDENTIFY, 0x00);

pub const CCLS_GET_PARTITION_INFO: Opcode = Opcode::new(SET_CCLS, 0x00);
pub const CCLS_GET_LSA: Opcode = Opcode::new(SET_CCLS, 0x02);
pub const CCLS_SET_LSA: Opcode = Opcode::new(SET_CCLS, 0x03);

pub const GET_POISON_LIST: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x00);
pub const INJECT_POISON: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x01);
pub const CLEAR_POISON: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x02);
pub const GET_SCAN_MEDIA_CAPABILITIES: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x03);
pub const SCAN_MEDIA: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x04);
pub const GET_SCAN_MEDIA_RESULTS: Opcode = Opcode::new(SET_MEDIA_AND_POISON, 0x05);

pub const SANITIZE_OVERWRITE: Opcode = Opcode::new(SET_SANITIZE, 0x00);

pub const GET_SECURITY_STATE: Opcode = Opcode::new(SET_PERSISTENT_MEM, 0x00);

pub const DCD_GET_DC_CONFIG: Opcode = Opcode::new(SET_DCD_CONFIG, 0x00);
pub const DCD_GET_EXTENT_LIST: Opcode = Opcode::new(SET_DCD_CONFIG, 0x01);
pub const DCD_ADD_CAPACITY_RESPONSE: Opcode = Opcode::new(SET_DCD_CONFIG, 0x02);
pub const DCD_RELEASE_CAPACITY: Opcode = Opcode::new(SET_DCD_CONFIG, 0x03);

pub const IDENTIFY_SWITCH_DEVICE: Opcode = Opcode::new(SET_PHYSICAL_SWITCH, 0x00);
pub const GET_PHYSICAL_PORT_STATE: Opcode = Opcode::new(SET_PHYSICAL_SWITCH, 0x01);

pub const TUNNEL_MANAGEMENT_COMMAND: Opcode = Opcode::new(SET_TUNNEL, 0x00);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_packs_set_and_command() {
        assert_eq!(SCAN_MEDIA.0, 0x4304);
        assert_eq!(SANITIZE_OVERWRITE.set(), 0x44);
        assert_eq!(GET_PHYSICAL_PORT_STATE.command(), 0x01);
        assert_eq!(TUNNEL_MANAGEMENT_COMMAND.to_string(), "5300h");
    }
}
