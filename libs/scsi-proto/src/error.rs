// Vendored from https://github.com/stm32-rs/stm32-usbd tag v0.6.0
// Original copyright (c) 2021 Matti Virkkunen <mvirkkunen@gmail.com>, Vadim Kaushan <admin@disasm.info>,
// Nicolas Stalder <n@stalder.io>", Jonas Martin <lichtfeind@gmail.com>
// SPDX-License-Identifier: MIT
// SPDX-LIcense-Identifier: Apache 2.0

use crate::additional_sense_code::AdditionalSenseCode;
use crate::sense_key::SenseKey;

/// A SCSI-level error as the initiator would see it: a sense key plus the
/// additional sense code pair, the composition `usbd_scsi::scsi::error::Error`
/// uses but without the USB Bulk-Only Transport / `usb_device` variants that
/// have no parallel-SCSI equivalent (there is no CBW here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub sense_key: SenseKey,
    pub asc: AdditionalSenseCode,
}

impl Error {
    pub const fn new(sense_key: SenseKey, asc: AdditionalSenseCode) -> Self { Error { sense_key, asc } }

    pub fn unhandled_op_code() -> Self { Error::new(SenseKey::IllegalRequest, AdditionalSenseCode::InvalidCommandOperationCode) }
    pub fn invalid_field_in_cdb() -> Self { Error::new(SenseKey::IllegalRequest, AdditionalSenseCode::InvalidFieldInCdb) }
    pub fn lba_out_of_range() -> Self { Error::new(SenseKey::IllegalRequest, AdditionalSenseCode::LogicalBlockAddressOutOfRange) }
    pub fn scsi_parity_error() -> Self { Error::new(SenseKey::AbortedCommand, AdditionalSenseCode::ScsiParityError) }
    pub fn unrecovered_read_error() -> Self { Error::new(SenseKey::MediumError, AdditionalSenseCode::UnrecoveredReadError) }
    pub fn write_failed() -> Self { Error::new(SenseKey::MediumError, AdditionalSenseCode::WriteFailed) }
    pub fn medium_not_present() -> Self { Error::new(SenseKey::NotReady, AdditionalSenseCode::MediumNotPresent) }
    pub fn medium_may_have_changed() -> Self { Error::new(SenseKey::UnitAttention, AdditionalSenseCode::MediumMayHaveChanged) }
    pub fn illegal_mode_for_track() -> Self { Error::new(SenseKey::IllegalRequest, AdditionalSenseCode::IllegalModeForTrack) }
    pub fn command_sequence_error() -> Self { Error::new(SenseKey::IllegalRequest, AdditionalSenseCode::CommandSequenceError) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_error_reports_aborted_command() {
        assert_eq!(Error::scsi_parity_error().sense_key, SenseKey::AbortedCommand);
    }

    #[test]
    fn lba_out_of_range_reports_illegal_request() {
        let e = Error::lba_out_of_range();
        assert_eq!(e.sense_key, SenseKey::IllegalRequest);
        assert_eq!(e.asc.asc(), 0x21);
    }
}
