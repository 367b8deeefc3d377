//! Typed command decode, grounded on
//! `usbd_scsi::scsi::commands::command::Command`'s opcode-dispatch `match`
//! -- same shape (one `match` over `OpCode`, one enum variant per command
//! family), adapted from CBW-payload parsing to parallel-SCSI's raw CDB
//! bytes and extended with the READ TOC / READ CD / SEEK(6) families
//! spec.md §4.8 adds.

use crate::cdb::Cdb;
use num_traits::FromPrimitive;
use scsi_proto::{Error as ScsiError, OpCode};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadWrite {
    pub lba: u32,
    pub blocks: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadToc {
    pub msf: bool,
    pub format: u8,
    pub track_or_session: u8,
    pub allocation_length: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReadCd {
    pub lba: u32,
    pub count: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StartStopUnit {
    pub start: bool,
    pub load_eject: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModeSense {
    pub page_code: u8,
    pub allocation_length: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    TestUnitReady,
    RequestSense { allocation_length: u8 },
    Inquiry { allocation_length: u16 },
    Read(ReadWrite),
    Write(ReadWrite),
    SeekSix { lba: u32 },
    ModeSense(ModeSense),
    ModeSelect { parameter_list_length: u16 },
    StartStopUnit(StartStopUnit),
    ReadCapacity,
    ReadFormatCapacities,
    ReportLuns,
    PreventAllowMediumRemoval { prevent: bool },
    SynchronizeCache,
    Verify,
    Format { fmtdata: bool },
    SendDiagnostic,
    ReadToc(ReadToc),
    ReadCd(ReadCd),
    GetEventStatusNotification { allocation_length: u16 },
    MechanismStatus,
    ReadSubChannel { allocation_length: u16 },
    ReadHeader { lba: u32, msf: bool },
    GetConfiguration { allocation_length: u16 },
    ReadDiscInformation { allocation_length: u16 },
    ReadTrackInformation { track_number: u8, allocation_length: u16 },
    SetCdSpeed,
}

impl Command {
    /// `cdb` already has the right number of bytes for its opcode's group
    /// (the phase sequencer reads them off the bus per spec.md §4.8 before
    /// calling this).
    pub fn decode(cdb: &Cdb) -> Result<Command, ScsiError> {
        let op = OpCode::from_u8(cdb.opcode()).ok_or_else(ScsiError::unhandled_op_code)?;
        Ok(match op {
            OpCode::TestUnitReady => Command::TestUnitReady,
            OpCode::RequestSense => Command::RequestSense { allocation_length: cdb.byte(4) },
            OpCode::Inquiry => Command::Inquiry { allocation_length: cdb.allocation_length() },
            OpCode::Read6 => Command::Read(ReadWrite { lba: cdb.lba21(), blocks: cdb.blocks8() }),
            OpCode::Write6 => Command::Write(ReadWrite { lba: cdb.lba21(), blocks: cdb.blocks8() }),
            OpCode::Seek6 => Command::SeekSix { lba: cdb.lba21() },
            OpCode::Read10 => Command::Read(ReadWrite { lba: cdb.lba32(), blocks: cdb.blocks16() }),
            OpCode::Write10 => Command::Write(ReadWrite { lba: cdb.lba32(), blocks: cdb.blocks16() }),
            OpCode::Read12 => Command::Read(ReadWrite { lba: cdb.lba32(), blocks: cdb.blocks32() }),
            OpCode::Write12 => Command::Write(ReadWrite { lba: cdb.lba32(), blocks: cdb.blocks32() }),
            OpCode::ModeSense6 => Command::ModeSense(ModeSense { page_code: cdb.byte(2) & 0x3F, allocation_length: cdb.byte(4) as u16 }),
            OpCode::ModeSense10 => Command::ModeSense(ModeSense { page_code: cdb.byte(2) & 0x3F, allocation_length: cdb.allocation_length() }),
            OpCode::ModeSelect6 => Command::ModeSelect { parameter_list_length: cdb.byte(4) as u16 },
            OpCode::ModeSelect10 => Command::ModeSelect { parameter_list_length: cdb.allocation_length() },
            OpCode::StartStopUnit => Command::StartStopUnit(StartStopUnit { start: cdb.byte(4) & 0x01 != 0, load_eject: cdb.byte(4) & 0x02 != 0 }),
            OpCode::ReadCapacity10 => Command::ReadCapacity,
            OpCode::ReadFormatCapacities => Command::ReadFormatCapacities,
            OpCode::ReportLuns => Command::ReportLuns,
            OpCode::PreventAllowMediumRemoval => Command::PreventAllowMediumRemoval { prevent: cdb.byte(4) & 0x01 != 0 },
            OpCode::SynchronizeCache10 => Command::SynchronizeCache,
            OpCode::Verify10 => Command::Verify,
            OpCode::Format => Command::Format { fmtdata: cdb.byte(1) & 0x10 != 0 },
            OpCode::SendDiagnostic => Command::SendDiagnostic,
            OpCode::ReadTocPmaAtip => Command::ReadToc(ReadToc {
                msf: cdb.byte(1) & 0x02 != 0,
                format: cdb.byte(2) & 0x0F,
                track_or_session: cdb.byte(6),
                allocation_length: cdb.allocation_length(),
            }),
            OpCode::ReadCd => Command::ReadCd(ReadCd { lba: cdb.lba32(), count: cdb.blocks32() >> 8 }),
            OpCode::GetEventStatusNotification => Command::GetEventStatusNotification { allocation_length: cdb.allocation_length() },
            OpCode::MechanismStatus => Command::MechanismStatus,
            OpCode::ReadSubChannel => Command::ReadSubChannel { allocation_length: cdb.allocation_length() },
            OpCode::ReadHeader => Command::ReadHeader { lba: cdb.lba32(), msf: cdb.byte(1) & 0x02 != 0 },
            OpCode::GetConfiguration => Command::GetConfiguration { allocation_length: cdb.allocation_length() },
            OpCode::ReadDiscInformation => Command::ReadDiscInformation { allocation_length: cdb.allocation_length() },
            OpCode::ReadTrackInformation => {
                Command::ReadTrackInformation { track_number: cdb.byte(5), allocation_length: cdb.allocation_length() }
            }
            OpCode::SetCdSpeed => Command::SetCdSpeed,
        })
    }
}
