//! SCSI synchronous transfer timing classes, spec.md §4.2's table. Periods
//! are in 4ns units (the SCSI-2 synchronous negotiation unit); minimums are
//! reproduced in nanoseconds and converted to MCU clock cycles by the
//! caller, who knows the actual system clock.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferClass {
    Fast20,
    Fast10,
    Scsi5,
}

#[derive(Debug, Copy, Clone)]
pub struct TimingSpec {
    pub data_setup_ns: u32,
    pub req_pulse_ns: u32,
    pub hold_ns: u32,
}

impl TransferClass {
    /// Classify a negotiated synchronous period (4ns units) per spec.md's
    /// table: FAST-20 for period < 25 (<100ns), FAST-10 for period < 50
    /// (<200ns), SCSI-5 otherwise.
    pub fn from_period(period_4ns: u8) -> TransferClass {
        if period_4ns < 25 {
            TransferClass::Fast20
        } else if period_4ns < 50 {
            TransferClass::Fast10
        } else {
            TransferClass::Scsi5
        }
    }

    pub fn spec(self) -> TimingSpec {
        match self {
            TransferClass::Fast20 => TimingSpec { data_setup_ns: 12, req_pulse_ns: 15, hold_ns: 17 },
            TransferClass::Fast10 => TimingSpec { data_setup_ns: 12, req_pulse_ns: 30, hold_ns: 0 },
            TransferClass::Scsi5 => TimingSpec { data_setup_ns: 25, req_pulse_ns: 90, hold_ns: 90 },
        }
    }
}

/// Convert a nanosecond minimum to a whole number of MCU clock cycles,
/// rounding up so the PIO program delay never undershoots the standard.
pub fn ns_to_cycles(ns: u32, clock_hz: u32) -> u32 {
    // cycles = ceil(ns * clock_hz / 1e9)
    let num = ns as u64 * clock_hz as u64;
    ((num + 999_999_999) / 1_000_000_000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_table_boundaries() {
        assert_eq!(TransferClass::from_period(24), TransferClass::Fast20);
        assert_eq!(TransferClass::from_period(25), TransferClass::Fast10);
        assert_eq!(TransferClass::from_period(49), TransferClass::Fast10);
        assert_eq!(TransferClass::from_period(50), TransferClass::Scsi5);
    }

    #[test]
    fn ns_to_cycles_rounds_up() {
        // 15ns at 133MHz is 1.995 cycles -> must round up to 2, never 1.
        assert_eq!(ns_to_cycles(15, 133_000_000), 2);
        assert_eq!(ns_to_cycles(0, 133_000_000), 0);
    }
}
