// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

//! Data structures and parsing code for MMC commands. Like the rest of SCSI,
//! parsing happens in two steps: first the opcode (and, for SERVICE ACTION IN,
//! the service action) becomes a `CommandType`, then the rest of the CDB is
//! decoded into a `Cdb` holding a `Command` with its parameters plus the
//! allocation length shared by most commands.
//!
//! Parsing only decodes fields. Whether a field value is acceptable is up to
//! the command handler, so that the transfer size is known before any error is
//! reported.

use std::convert::TryFrom;

use num_enum::TryFromPrimitive;

#[derive(PartialEq, Eq, TryFromPrimitive, Debug, Copy, Clone)]
#[repr(u8)]
pub(crate) enum ModeSensePageControl {
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum SenseFormat {
    Fixed,
    Descriptor,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Command {
    TestUnitReady,
    RequestSense(SenseFormat),
    Inquiry {
        evpd: bool,
        page_code: u8,
    },
    ModeSelect6,
    ModeSense6 {
        pc: ModeSensePageControl,
        page_code: u8,
    },
    ModeSense10 {
        pc: ModeSensePageControl,
        page_code: u8,
    },
    StartStopUnit {
        /// Load/eject: act on the medium rather than the spindle
        load_eject: bool,
        start: bool,
    },
    PreventAllowMediumRemoval {
        prevent: bool,
    },
    ReadCapacity10,
    ReadCapacity16,
    /// READ (6), (10), (12) and (16), normalized to the widest field sizes.
    Read {
        lba: u64,
        transfer_length: u32,
    },
    Seek10 {
        lba: u32,
    },
    Verify10 {
        lba: u32,
        verification_length: u16,
    },
    ReadBuffer {
        mode: u8,
    },
    ReadToc {
        format: u8,
        msf: bool,
        track: u8,
    },
    GetConfiguration {
        rt: u8,
        starting_feature: u16,
    },
    GetEventStatusNotification {
        polled: bool,
        class_request: u8,
    },
    LogSense {
        page_code: u8,
        subpage_code: u8,
    },
    ReadDiscInformation,
    ReadTrackInformation {
        address_type: u8,
        address: u32,
    },
    ReadDvdStructure {
        media_type: u8,
        layer: u8,
        format: u8,
    },
    MechanismStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandType {
    TestUnitReady,
    RequestSense,
    Read6,
    Inquiry,
    ModeSelect6,
    ModeSense6,
    StartStopUnit,
    PreventAllowMediumRemoval,
    ReadCapacity10,
    Read10,
    Seek10,
    Verify10,
    ReadBuffer,
    ReadToc,
    GetConfiguration,
    GetEventStatusNotification,
    LogSense,
    ReadDiscInformation,
    ReadTrackInformation,
    ModeSense10,
    Read16,
    ReadCapacity16,
    Read12,
    ReadDvdStructure,
    MechanismStatus,
}

pub(crate) const OPCODES: &[(CommandType, (u8, Option<u16>))] = &[
    (CommandType::TestUnitReady, (0x0, None)),
    (CommandType::RequestSense, (0x3, None)),
    (CommandType::Read6, (0x8, None)),
    (CommandType::Inquiry, (0x12, None)),
    (CommandType::ModeSelect6, (0x15, None)),
    (CommandType::ModeSense6, (0x1a, None)),
    (CommandType::StartStopUnit, (0x1b, None)),
    (CommandType::PreventAllowMediumRemoval, (0x1e, None)),
    (CommandType::ReadCapacity10, (0x25, None)),
    (CommandType::Read10, (0x28, None)),
    (CommandType::Seek10, (0x2b, None)),
    (CommandType::Verify10, (0x2f, None)),
    (CommandType::ReadBuffer, (0x3c, None)),
    (CommandType::ReadToc, (0x43, None)),
    (CommandType::GetConfiguration, (0x46, None)),
    (CommandType::GetEventStatusNotification, (0x4a, None)),
    (CommandType::LogSense, (0x4d, None)),
    (CommandType::ReadDiscInformation, (0x51, None)),
    (CommandType::ReadTrackInformation, (0x52, None)),
    (CommandType::ModeSense10, (0x5a, None)),
    (CommandType::Read16, (0x88, None)),
    (CommandType::ReadCapacity16, (0x9e, Some(0x10))),
    (CommandType::Read12, (0xa8, None)),
    (CommandType::ReadDvdStructure, (0xad, None)),
    (CommandType::MechanismStatus, (0xbd, None)),
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct UnparsedServiceAction(u8);
impl UnparsedServiceAction {
    pub fn parse(self, service_action: u16) -> Option<CommandType> {
        OPCODES
            .iter()
            .find(|(_, opcode)| *opcode == (self.0, Some(service_action)))
            .map(|&(ty, _)| ty)
    }
}

/// See `parse_opcode`
#[derive(Debug, Clone, Copy)]
pub(crate) enum ParseOpcodeResult {
    /// The opcode represents a single command.
    Command(CommandType),
    /// The opcode requires a service action.
    ServiceAction(UnparsedServiceAction),
    /// The opcode is invalid.
    Invalid,
}

/// Determine the command that corresponds to a SCSI opcode.
///
/// Most commands are identified by the opcode alone; SERVICE ACTION IN (16)
/// needs the service action from the second byte as well, which the caller
/// resolves with `UnparsedServiceAction::parse`.
pub(crate) fn parse_opcode(opcode: u8) -> ParseOpcodeResult {
    let found = OPCODES.iter().find(|(_, (x, _))| *x == opcode);
    match found {
        Some(&(ty, (_, None))) => ParseOpcodeResult::Command(ty),
        Some((_, (_, Some(_)))) => ParseOpcodeResult::ServiceAction(UnparsedServiceAction(opcode)),
        None => ParseOpcodeResult::Invalid,
    }
}

/// Whether a command with this opcode is processed while the unit is not
/// ready, i.e. while a unit attention is pending or no medium is loaded.
pub(crate) fn runs_when_not_ready(opcode: u8) -> bool {
    matches!(
        parse_opcode(opcode),
        ParseOpcodeResult::Command(
            CommandType::Inquiry
                | CommandType::GetConfiguration
                | CommandType::GetEventStatusNotification
        )
    )
}

impl CommandType {
    fn from_cdb(cdb: &[u8]) -> Result<Self, ParseError> {
        let opcode = *cdb.first().ok_or(ParseError::TooSmall)?;
        match parse_opcode(opcode) {
            ParseOpcodeResult::Command(ty) => Ok(ty),
            ParseOpcodeResult::ServiceAction(sa) => {
                let sa_byte = *cdb.get(1).ok_or(ParseError::TooSmall)?;
                sa.parse(u16::from(sa_byte & 0b0001_1111))
                    .ok_or(ParseError::InvalidField)
            }
            ParseOpcodeResult::Invalid => Err(ParseError::InvalidCommand),
        }
    }

    /// Length of the CDB for this command type, which follows from the
    /// opcode's group code.
    pub const fn cdb_len(self) -> usize {
        match self {
            Self::TestUnitReady
            | Self::RequestSense
            | Self::Read6
            | Self::Inquiry
            | Self::ModeSelect6
            | Self::ModeSense6
            | Self::StartStopUnit
            | Self::PreventAllowMediumRemoval => 6,
            Self::ReadCapacity10
            | Self::Read10
            | Self::Seek10
            | Self::Verify10
            | Self::ReadBuffer
            | Self::ReadToc
            | Self::GetConfiguration
            | Self::GetEventStatusNotification
            | Self::LogSense
            | Self::ReadDiscInformation
            | Self::ReadTrackInformation
            | Self::ModeSense10 => 10,
            Self::Read12 | Self::ReadDvdStructure | Self::MechanismStatus => 12,
            Self::Read16 | Self::ReadCapacity16 => 16,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Cdb {
    pub command: Command,
    pub allocation_length: Option<u32>,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum ParseError {
    /// The opcode (specifically the first byte of the CDB) is unknown, i.e. we
    /// should respond with INVALID COMMAND OPERATION CODE
    InvalidCommand,
    /// Another field of the CDB (including the service action, if any) is
    /// invalid, i.e. we should respond with INVALID FIELD IN CDB.
    InvalidField,
    /// The CDB has fewer bytes than necessary for its opcode.
    TooSmall,
}

fn be16(cdb: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([cdb[at], cdb[at + 1]])
}

fn be32(cdb: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([cdb[at], cdb[at + 1], cdb[at + 2], cdb[at + 3]])
}

impl Cdb {
    // No sense splitting this up; it's one arm per opcode.
    #[allow(clippy::too_many_lines)]
    pub fn parse(cdb: &[u8]) -> Result<Self, ParseError> {
        let ct = CommandType::from_cdb(cdb)?;
        if cdb.len() < ct.cdb_len() {
            return Err(ParseError::TooSmall);
        }
        // Shrink the cdb down to its size, so accidentally accessing fields past the
        // length panics
        let cdb = &cdb[..ct.cdb_len()];

        let parsed = match ct {
            CommandType::TestUnitReady => Self {
                command: Command::TestUnitReady,
                allocation_length: None,
            },
            CommandType::RequestSense => {
                let format = if cdb[1] & 0b0000_0001 == 1 {
                    SenseFormat::Descriptor
                } else {
                    SenseFormat::Fixed
                };
                Self {
                    command: Command::RequestSense(format),
                    allocation_length: Some(u32::from(cdb[4])),
                }
            }
            CommandType::Inquiry => Self {
                command: Command::Inquiry {
                    evpd: cdb[1] & 0b0000_0001 != 0,
                    page_code: cdb[2],
                },
                allocation_length: Some(u32::from(be16(cdb, 3))),
            },
            CommandType::ModeSelect6 => Self {
                command: Command::ModeSelect6,
                // parameter list length; the parameters themselves are ignored
                allocation_length: Some(u32::from(cdb[4])),
            },
            CommandType::ModeSense6 => Self {
                command: Command::ModeSense6 {
                    pc: page_control(cdb[2])?,
                    page_code: cdb[2] & 0b0011_1111,
                },
                allocation_length: Some(u32::from(cdb[4])),
            },
            CommandType::ModeSense10 => Self {
                command: Command::ModeSense10 {
                    pc: page_control(cdb[2])?,
                    page_code: cdb[2] & 0b0011_1111,
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::StartStopUnit => Self {
                command: Command::StartStopUnit {
                    load_eject: cdb[4] & 0b0000_0010 != 0,
                    start: cdb[4] & 0b0000_0001 != 0,
                },
                allocation_length: None,
            },
            CommandType::PreventAllowMediumRemoval => Self {
                command: Command::PreventAllowMediumRemoval {
                    prevent: cdb[4] & 0b0000_0001 != 0,
                },
                allocation_length: None,
            },
            CommandType::ReadCapacity10 => Self {
                command: Command::ReadCapacity10,
                // no allocation length field; the reply is always 8 bytes
                allocation_length: Some(8),
            },
            CommandType::ReadCapacity16 => Self {
                command: Command::ReadCapacity16,
                allocation_length: Some(be32(cdb, 10)),
            },
            CommandType::Read6 => Self {
                command: Command::Read {
                    lba: u64::from(be32(cdb, 0) & 0x001f_ffff),
                    transfer_length: u32::from(cdb[4]),
                },
                allocation_length: None,
            },
            CommandType::Read10 => Self {
                command: Command::Read {
                    lba: u64::from(be32(cdb, 2)),
                    transfer_length: u32::from(be16(cdb, 7)),
                },
                allocation_length: None,
            },
            CommandType::Read12 => Self {
                command: Command::Read {
                    lba: u64::from(be32(cdb, 2)),
                    transfer_length: be32(cdb, 6),
                },
                allocation_length: None,
            },
            CommandType::Read16 => Self {
                command: Command::Read {
                    lba: (u64::from(be32(cdb, 2)) << 32) | u64::from(be32(cdb, 6)),
                    transfer_length: be32(cdb, 10),
                },
                allocation_length: None,
            },
            CommandType::Seek10 => Self {
                command: Command::Seek10 {
                    lba: be32(cdb, 2),
                },
                allocation_length: None,
            },
            CommandType::Verify10 => Self {
                command: Command::Verify10 {
                    lba: be32(cdb, 2),
                    verification_length: be16(cdb, 7),
                },
                allocation_length: None,
            },
            CommandType::ReadBuffer => Self {
                command: Command::ReadBuffer {
                    mode: cdb[1] & 0b0001_1111,
                },
                allocation_length: Some(u32::from_be_bytes([0, cdb[6], cdb[7], cdb[8]])),
            },
            CommandType::ReadToc => Self {
                command: Command::ReadToc {
                    format: cdb[2] & 0b0000_1111,
                    msf: cdb[1] & 0b0000_0010 != 0,
                    track: cdb[6],
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::GetConfiguration => Self {
                command: Command::GetConfiguration {
                    rt: cdb[1] & 0b0000_0011,
                    starting_feature: be16(cdb, 2),
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::GetEventStatusNotification => Self {
                command: Command::GetEventStatusNotification {
                    polled: cdb[1] & 0b0000_0001 != 0,
                    class_request: cdb[4],
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::LogSense => Self {
                command: Command::LogSense {
                    page_code: cdb[2] & 0b0011_1111,
                    subpage_code: cdb[3],
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::ReadDiscInformation => Self {
                command: Command::ReadDiscInformation,
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::ReadTrackInformation => Self {
                command: Command::ReadTrackInformation {
                    address_type: cdb[1] & 0b0000_0011,
                    address: be32(cdb, 2),
                },
                allocation_length: Some(u32::from(be16(cdb, 7))),
            },
            CommandType::ReadDvdStructure => Self {
                command: Command::ReadDvdStructure {
                    media_type: cdb[1],
                    layer: cdb[6],
                    format: cdb[7],
                },
                allocation_length: Some(u32::from(be16(cdb, 8))),
            },
            CommandType::MechanismStatus => Self {
                command: Command::MechanismStatus,
                allocation_length: Some(u32::from(be16(cdb, 8))),
            },
        };

        Ok(parsed)
    }
}

fn page_control(byte: u8) -> Result<ModeSensePageControl, ParseError> {
    ModeSensePageControl::try_from((byte & 0b1100_0000) >> 6).map_err(|_| ParseError::InvalidField)
}
