use num_derive::{FromPrimitive, ToPrimitive};

/// SPC-3 sense keys, surfaced in the REQUEST SENSE response after a CHECK
/// CONDITION status (spec.md §7's error taxonomy).
#[derive(Clone, Copy, Eq, PartialEq, Debug, FromPrimitive, ToPrimitive)]
pub enum SenseKey {
    NoSense = 0x0,
    RecoveredError = 0x1,
    NotReady = 0x2,
    MediumError = 0x3,
    HardwareError = 0x4,
    IllegalRequest = 0x5,
    UnitAttention = 0x6,
    DataProtect = 0x7,
    BlankCheck = 0x8,
    VendorSpecific = 0x9,
    CopyAborted = 0xA,
    AbortedCommand = 0xB,
    VolumeOverflow = 0xD,
    Miscompare = 0xE,
    Completed = 0xF,
}

impl Default for SenseKey {
    fn default() -> Self { SenseKey::NoSense }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn default_is_no_sense() {
        assert_eq!(SenseKey::default(), SenseKey::NoSense);
    }

    #[test]
    fn illegal_request_round_trips() {
        assert_eq!(SenseKey::from_u8(0x5), Some(SenseKey::IllegalRequest));
    }
}
