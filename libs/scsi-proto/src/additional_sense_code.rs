// Vendored from https://github.com/stm32-rs/stm32-usbd tag v0.6.0
// Original copyright (c) 2021 Matti Virkkunen <mvirkkunen@gmail.com>, Vadim Kaushan <admin@disasm.info>,
// Nicolas Stalder <n@stalder.io>", Jonas Martin <lichtfeind@gmail.com>
// SPDX-License-Identifier: MIT
// SPDX-LIcense-Identifier: Apache 2.0

/// Additional Sense Code / Qualifier pairs, extended with the parallel-SCSI
/// error taxonomy from spec.md §7 (parity, medium, mode-mismatch and
/// command-sequence errors) beyond what the USB mass-storage subset used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdditionalSenseCode {
    /// ASC 0x20, ASCQ 0x00 - INVALID COMMAND OPERATION CODE
    InvalidCommandOperationCode,
    /// ASC 0x64, ASCQ 0x01 - INVALID PACKET SIZE
    InvalidPacketSize,
    /// ASC 0x24, ASCQ 0x00 - INVALID FIELD IN CDB
    InvalidFieldInCdb,
    /// ASC 0x00, ASCQ 0x00 - NO ADDITIONAL SENSE INFORMATION
    NoAdditionalSenseInformation,
    /// ASC 0x0C, ASCQ 0x00 - WRITE ERROR
    WriteError,
    /// ASC 0x51, ASCQ 0x00 - ERASE FAILURE
    EraseFailure,
    /// ASC 0x21, ASCQ 0x00 - LOGICAL BLOCK ADDRESS OUT OF RANGE
    LogicalBlockAddressOutOfRange,
    /// ASC 0x47, ASCQ 0x00 - SCSI PARITY ERROR
    ScsiParityError,
    /// ASC 0x11, ASCQ 0x00 - UNRECOVERED READ ERROR
    UnrecoveredReadError,
    /// ASC 0x0C, ASCQ 0x03 - WRITE ERROR (SDIO write-token failure)
    WriteFailed,
    /// ASC 0x3A, ASCQ 0x00 - MEDIUM NOT PRESENT
    MediumNotPresent,
    /// ASC 0x28, ASCQ 0x00 - NOT READY TO READY TRANSITION (medium may have changed)
    MediumMayHaveChanged,
    /// ASC 0x64, ASCQ 0x00 - ILLEGAL MODE FOR THIS TRACK
    IllegalModeForTrack,
    /// ASC 0x2C, ASCQ 0x00 - COMMAND SEQUENCE ERROR
    CommandSequenceError,
}

impl AdditionalSenseCode {
    pub fn asc(&self) -> u8 {
        match self {
            AdditionalSenseCode::InvalidCommandOperationCode => 0x20,
            AdditionalSenseCode::InvalidPacketSize => 0x64,
            AdditionalSenseCode::InvalidFieldInCdb => 0x24,
            AdditionalSenseCode::NoAdditionalSenseInformation => 0x00,
            AdditionalSenseCode::WriteError => 0x0C,
            AdditionalSenseCode::EraseFailure => 0x51,
            AdditionalSenseCode::LogicalBlockAddressOutOfRange => 0x21,
            AdditionalSenseCode::ScsiParityError => 0x47,
            AdditionalSenseCode::UnrecoveredReadError => 0x11,
            AdditionalSenseCode::WriteFailed => 0x0C,
            AdditionalSenseCode::MediumNotPresent => 0x3A,
            AdditionalSenseCode::MediumMayHaveChanged => 0x28,
            AdditionalSenseCode::IllegalModeForTrack => 0x64,
            AdditionalSenseCode::CommandSequenceError => 0x2C,
        }
    }

    pub fn ascq(&self) -> u8 {
        match self {
            AdditionalSenseCode::InvalidPacketSize => 0x01,
            AdditionalSenseCode::WriteFailed => 0x03,
            _ => 0x00,
        }
    }

    pub fn from(asc: u8, ascq: u8) -> Option<Self> {
        use AdditionalSenseCode::*;
        match (asc, ascq) {
            (0x20, 0x00) => Some(InvalidCommandOperationCode),
            (0x64, 0x01) => Some(InvalidPacketSize),
            (0x24, 0x00) => Some(InvalidFieldInCdb),
            (0x00, 0x00) => Some(NoAdditionalSenseInformation),
            (0x0C, 0x00) => Some(WriteError),
            (0x51, 0x00) => Some(EraseFailure),
            (0x21, 0x00) => Some(LogicalBlockAddressOutOfRange),
            (0x47, 0x00) => Some(ScsiParityError),
            (0x11, 0x00) => Some(UnrecoveredReadError),
            (0x0C, 0x03) => Some(WriteFailed),
            (0x3A, 0x00) => Some(MediumNotPresent),
            (0x28, 0x00) => Some(MediumMayHaveChanged),
            (0x64, 0x00) => Some(IllegalModeForTrack),
            (0x2C, 0x00) => Some(CommandSequenceError),
            _ => None,
        }
    }
}

impl Default for AdditionalSenseCode {
    fn default() -> Self { AdditionalSenseCode::NoAdditionalSenseInformation }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_error_maps_to_aborted_command_asc() {
        let code = AdditionalSenseCode::ScsiParityError;
        assert_eq!((code.asc(), code.ascq()), (0x47, 0x00));
        assert_eq!(AdditionalSenseCode::from(0x47, 0x00), Some(code));
    }

    #[test]
    fn write_error_and_write_failed_share_asc_but_differ_in_ascq() {
        assert_eq!(AdditionalSenseCode::WriteError.asc(), AdditionalSenseCode::WriteFailed.asc());
        assert_ne!(AdditionalSenseCode::WriteError.ascq(), AdditionalSenseCode::WriteFailed.ascq());
    }

    #[test]
    fn unknown_pair_returns_none() {
        assert_eq!(AdditionalSenseCode::from(0xFF, 0xFF), None);
    }
}
