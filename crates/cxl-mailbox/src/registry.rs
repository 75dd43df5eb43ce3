//! Command descriptors and the per-role base command tables.
//!
//! The tables are immutable; a [`crate::MailboxContext`] copies the ones its
//! role needs into its own opcode map when it is built.

use core::fmt;

use crate::cmd;
use crate::context::MailboxContext;
use crate::opcode::*;
use crate::{CommandEffects, CommandResult};

/// Command handler. Writes the response into the output buffer, which starts
/// empty.
pub type Handler = fn(&mut MailboxContext, &[u8], &mut Vec<u8>) -> CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLength {
    Fixed(usize),
    /// The handler validates the length itself.
    Variable,
}

#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    pub opcode: Opcode,
    pub name: &'static str,
    pub input: InputLength,
    pub effects: CommandEffects,
    pub handler: Handler,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("input", &self.input)
            .field("effects", &self.effects)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    pub const fn new(
        opcode: Opcode,
        name: &'static str,
        input: InputLength,
        effects: CommandEffects,
        handler: Handler,
    ) -> Self {
        Self {
            opcode,
            name,
            input,
            effects,
            handler,
        }
    }

    pub fn is_background(&self) -> bool {
        self.effects.contains(CommandEffects::BACKGROUND_OPERATION)
    }
}

use CommandEffects as E;
use InputLength::{Fixed, Variable};

const NONE: CommandEffects = CommandEffects::empty();

const fn desc(
    opcode: Opcode,
    name: &'static str,
    input: InputLength,
    effects: CommandEffects,
    handler: Handler,
) -> CommandDescriptor {
    CommandDescriptor::new(opcode, name, input, effects, handler)
}

const IDENTIFY_DESC: CommandDescriptor =
    desc(IDENTIFY, "IDENTIFY", Fixed(0), NONE, cmd::infostat::identify);
const BG_STATUS_DESC: CommandDescriptor = desc(
    BACKGROUND_OPERATION_STATUS,
    "BACKGROUND_OPERATION_STATUS",
    Fixed(0),
    NONE,
    cmd::infostat::background_operation_status,
);
const TIMESTAMP_GET_DESC: CommandDescriptor =
    desc(TIMESTAMP_GET, "TIMESTAMP_GET", Fixed(0), NONE, cmd::logs::timestamp_get);
const TIMESTAMP_SET_DESC: CommandDescriptor = desc(
    TIMESTAMP_SET,
    "TIMESTAMP_SET",
    Fixed(8),
    E::POLICY_CHANGE,
    cmd::logs::timestamp_set,
);
const LOGS_GET_SUPPORTED_DESC: CommandDescriptor = desc(
    LOGS_GET_SUPPORTED,
    "LOGS_GET_SUPPORTED",
    Fixed(0),
    NONE,
    cmd::logs::get_supported,
);
const LOGS_GET_LOG_DESC: CommandDescriptor =
    desc(LOGS_GET_LOG, "LOGS_GET_LOG", Fixed(0x18), NONE, cmd::logs::get_log);
const IDENTIFY_SWITCH_DESC: CommandDescriptor = desc(
    IDENTIFY_SWITCH_DEVICE,
    "IDENTIFY_SWITCH_DEVICE",
    Fixed(0),
    NONE,
    cmd::switch::identify_switch_device,
);
const PORT_STATE_DESC: CommandDescriptor = desc(
    GET_PHYSICAL_PORT_STATE,
    "GET_PHYSICAL_PORT_STATE",
    Variable,
    NONE,
    cmd::switch::get_physical_port_state,
);

/// Primary mailbox of a memory expansion device.
pub static TYPE3_COMMANDS: &[CommandDescriptor] = &[
    IDENTIFY_DESC,
    BG_STATUS_DESC,
    desc(EVENTS_GET_RECORDS, "EVENTS_GET_RECORDS", Fixed(1), NONE, cmd::events::get_records),
    desc(
        EVENTS_CLEAR_RECORDS,
        "EVENTS_CLEAR_RECORDS",
        Variable,
        E::LOG_CHANGE,
        cmd::events::clear_records,
    ),
    desc(
        EVENTS_GET_INTERRUPT_POLICY,
        "EVENTS_GET_INTERRUPT_POLICY",
        Fixed(0),
        NONE,
        cmd::events::get_interrupt_policy,
    ),
    desc(
        EVENTS_SET_INTERRUPT_POLICY,
        "EVENTS_SET_INTERRUPT_POLICY",
        Variable,
        E::CONFIG_CHANGE,
        cmd::events::set_interrupt_policy,
    ),
    desc(
        FIRMWARE_UPDATE_GET_INFO,
        "FIRMWARE_UPDATE_GET_INFO",
        Fixed(0),
        NONE,
        cmd::memdev::firmware_update_get_info,
    ),
    TIMESTAMP_GET_DESC,
    TIMESTAMP_SET_DESC,
    LOGS_GET_SUPPORTED_DESC,
    LOGS_GET_LOG_DESC,
    desc(
        IDENTIFY_MEMORY_DEVICE,
        "IDENTIFY_MEMORY_DEVICE",
        Fixed(0),
        NONE,
        cmd::memdev::identify_memory_device,
    ),
    desc(
        CCLS_GET_PARTITION_INFO,
        "CCLS_GET_PARTITION_INFO",
        Fixed(0),
        NONE,
        cmd::memdev::get_partition_info,
    ),
    desc(CCLS_GET_LSA, "CCLS_GET_LSA", Fixed(8), NONE, cmd::memdev::get_lsa),
    desc(
        CCLS_SET_LSA,
        "CCLS_SET_LSA",
        Variable,
        E::CONFIG_CHANGE.union(E::DATA_CHANGE),
        cmd::memdev::set_lsa,
    ),
    desc(GET_POISON_LIST, "GET_POISON_LIST", Fixed(16), NONE, cmd::media::get_poison_list),
    desc(INJECT_POISON, "INJECT_POISON", Fixed(8), NONE, cmd::media::inject_poison),
    desc(CLEAR_POISON, "CLEAR_POISON", Fixed(72), NONE, cmd::media::clear_poison),
    desc(
        GET_SCAN_MEDIA_CAPABILITIES,
        "GET_SCAN_MEDIA_CAPABILITIES",
        Fixed(16),
        NONE,
        cmd::media::get_scan_media_capabilities,
    ),
    desc(
        SCAN_MEDIA,
        "SCAN_MEDIA",
        Fixed(17),
        E::BACKGROUND_OPERATION,
        cmd::media::scan_media,
    ),
    desc(
        GET_SCAN_MEDIA_RESULTS,
        "GET_SCAN_MEDIA_RESULTS",
        Fixed(0),
        NONE,
        cmd::media::get_scan_media_results,
    ),
    desc(
        SANITIZE_OVERWRITE,
        "SANITIZE_OVERWRITE",
        Fixed(0),
        E::DATA_CHANGE
            .union(E::SECURITY_STATE_CHANGE)
            .union(E::BACKGROUND_OPERATION),
        cmd::memdev::sanitize_overwrite,
    ),
    desc(
        GET_SECURITY_STATE,
        "GET_SECURITY_STATE",
        Fixed(0),
        NONE,
        cmd::memdev::get_security_state,
    ),
];

/// Dynamic capacity commands, merged when the device declares regions.
pub static DCD_COMMANDS: &[CommandDescriptor] = &[
    desc(DCD_GET_DC_CONFIG, "DCD_GET_DC_CONFIG", Fixed(2), NONE, cmd::dcd::get_dc_config),
    desc(
        DCD_GET_EXTENT_LIST,
        "DCD_GET_EXTENT_LIST",
        Fixed(8),
        NONE,
        cmd::dcd::get_extent_list,
    ),
    desc(
        DCD_ADD_CAPACITY_RESPONSE,
        "DCD_ADD_CAPACITY_RESPONSE",
        Variable,
        E::DATA_CHANGE,
        cmd::dcd::add_capacity_response,
    ),
    desc(
        DCD_RELEASE_CAPACITY,
        "DCD_RELEASE_CAPACITY",
        Variable,
        E::DATA_CHANGE,
        cmd::dcd::release_capacity,
    ),
];

/// Switch CCI.
pub static SWITCH_COMMANDS: &[CommandDescriptor] = &[
    IDENTIFY_DESC,
    BG_STATUS_DESC,
    TIMESTAMP_GET_DESC,
    TIMESTAMP_SET_DESC,
    LOGS_GET_SUPPORTED_DESC,
    LOGS_GET_LOG_DESC,
    IDENTIFY_SWITCH_DESC,
    PORT_STATE_DESC,
    desc(
        TUNNEL_MANAGEMENT_COMMAND,
        "TUNNEL_MANAGEMENT_COMMAND",
        Variable,
        NONE,
        cmd::tunnel::tunnel_management_command,
    ),
];

/// MCTP endpoint of a memory device.
pub static TYPE3_MCTP_COMMANDS: &[CommandDescriptor] = &[IDENTIFY_DESC];

/// MCTP endpoint of a switch upstream port.
pub static SWITCH_MCTP_COMMANDS: &[CommandDescriptor] =
    &[IDENTIFY_DESC, IDENTIFY_SWITCH_DESC, PORT_STATE_DESC];

/// Commands rejected with media disabled while a sanitize is in flight.
pub(crate) const MEDIA_GATED: &[Opcode] = &[
    EVENTS_GET_RECORDS,
    CCLS_GET_PARTITION_INFO,
    CCLS_GET_LSA,
    CCLS_SET_LSA,
    LOGS_GET_LOG,
    GET_POISON_LIST,
    INJECT_POISON,
    CLEAR_POISON,
];
