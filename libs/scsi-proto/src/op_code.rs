// Vendored from https://github.com/stm32-rs/stm32-usbd tag v0.6.0
// Original copyright (c) 2021 Matti Virkkunen <mvirkkunen@gmail.com>, Vadim Kaushan <admin@disasm.info>,
// Nicolas Stalder <n@stalder.io>", Jonas Martin <lichtfeind@gmail.com>
// SPDX-License-Identifier: MIT
// SPDX-LIcense-Identifier: Apache 2.0

use num_derive::{FromPrimitive, ToPrimitive};

/// SCSI op codes as defined by SPC-3, extended with the parallel-SCSI and
/// CD-ROM opcodes spec.md §4.8/§4.6 name beyond the USB mass-storage subset.
#[derive(Clone, Copy, Eq, PartialEq, Debug, FromPrimitive, ToPrimitive)]
pub enum OpCode {
    TestUnitReady = 0x00,
    RequestSense = 0x03,
    Format = 0x04,
    Read6 = 0x08,
    Write6 = 0x0A,
    Seek6 = 0x0B,
    Inquiry = 0x12,
    ModeSelect6 = 0x15,
    ModeSense6 = 0x1A,
    StartStopUnit = 0x1B,
    SendDiagnostic = 0x1D,
    PreventAllowMediumRemoval = 0x1E,
    ReadFormatCapacities = 0x23,
    ReadCapacity10 = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    Verify10 = 0x2F,
    SynchronizeCache10 = 0x35,
    ReadSubChannel = 0x42,
    ReadTocPmaAtip = 0x43,
    ReadHeader = 0x44,
    GetConfiguration = 0x46,
    GetEventStatusNotification = 0x4A,
    ReadDiscInformation = 0x51,
    ReadTrackInformation = 0x52,
    ModeSelect10 = 0x55,
    ModeSense10 = 0x5A,
    ReportLuns = 0xA0,
    Read12 = 0xA8,
    Write12 = 0xAA,
    SetCdSpeed = 0xBB,
    MechanismStatus = 0xBD,
    ReadCd = 0xBE,
}

impl OpCode {
    /// The CDB group this opcode belongs to, per SCSI-2's top-3-bits rule
    /// (spec.md §4.8's "determines total CDB length from its opcode group").
    pub fn group(self) -> u8 { (self as u8) >> 5 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn read10_round_trips_through_raw_byte() {
        assert_eq!(OpCode::from_u8(0x28), Some(OpCode::Read10));
    }

    #[test]
    fn unknown_opcode_byte_yields_none() {
        assert_eq!(OpCode::from_u8(0xFF), None);
    }

    #[test]
    fn group_6_opcodes_are_group_0() {
        assert_eq!(OpCode::TestUnitReady.group(), 0);
        assert_eq!(OpCode::Seek6.group(), 0);
    }

    #[test]
    fn group_12_opcode_read12_is_group_5() {
        assert_eq!(OpCode::Read12.group(), 5);
    }

    #[test]
    fn mmc_opcodes_land_in_the_groups_their_real_cdb_lengths_need() {
        assert_eq!(OpCode::GetEventStatusNotification.group(), 2); // 10-byte CDB
        assert_eq!(OpCode::MechanismStatus.group(), 5); // 12-byte CDB
        assert_eq!(OpCode::SetCdSpeed.group(), 5); // 12-byte CDB
    }
}
