//! Fixed-format (0x70) sense data, the REQUEST SENSE response body.
//! Grounded on `usbd_scsi::scsi::commands::request_sense`'s fixed-layout
//! response struct, rebuilt as a plain byte-array writer since this crate
//! no longer round-trips sense data through `packing::Packed`.

use scsi_proto::error::Error as ScsiError;

pub const SENSE_DATA_LEN: usize = 18;

/// Writes an 18-byte fixed-format sense response for `err`, or an all-zero
/// "no sense" block when `err` is `None` (REQUEST SENSE is itself valid
/// with nothing outstanding).
pub fn build_sense_data(err: Option<ScsiError>) -> [u8; SENSE_DATA_LEN] {
    let mut out = [0u8; SENSE_DATA_LEN];
    out[0] = 0x70; // current errors, fixed format
    out[7] = SENSE_DATA_LEN as u8 - 8; // additional sense length
    if let Some(e) = err {
        out[2] = e.sense_key as u8;
        out[12] = e.asc.asc();
        out[13] = e.asc.ascq();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scsi_proto::{AdditionalSenseCode, SenseKey};

    #[test]
    fn no_sense_block_is_all_zero_past_the_header() {
        let s = build_sense_data(None);
        assert_eq!(s[0], 0x70);
        assert_eq!(s[2], 0);
        assert_eq!(s[12], 0);
    }

    #[test]
    fn parity_error_surfaces_its_sense_key_and_asc() {
        let s = build_sense_data(Some(ScsiError::scsi_parity_error()));
        assert_eq!(s[2], SenseKey::AbortedCommand as u8);
        assert_eq!(s[12], AdditionalSenseCode::ScsiParityError.asc());
    }
}
