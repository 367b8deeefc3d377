#![cfg_attr(feature = "baremetal", no_std)]
//! Pin-level SCSI bus PHY: logical pin drive/sense, phase sequencing and
//! odd-parity encode/decode. See spec.md §4.1, §6, §8.
//!
//! The timing numbers here (bus-settle, reset pulse width, selection
//! timeout) are the SCSI-2 electrical minimums; callers provide a clock
//! source via [`Clock`] so this crate stays independent of the platform
//! timer.

pub mod regs;

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

/// Bus-settle delay: data-release (400ns) + phase-change (400ns).
pub const BUS_SETTLE: Duration = Duration::from_nanos(800);
/// `release_outputs()` waits this long before tri-stating.
pub const RELEASE_HOLDOFF: Duration = Duration::from_millis(1);
/// Minimum RST pulse width recognized as a real reset, not bus noise.
pub const RESET_PULSE_MIN: Duration = Duration::from_micros(25);
/// SEL phase timeout before giving up on an initiator.
pub const SELECTION_TIMEOUT: Duration = Duration::from_micros(250);
/// Any single wait exceeding this aborts the in-flight command (spec.md §5).
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// One SCSI bus wire. Active-low on the wire; this API is all logical
/// "asserted" booleans, matching spec.md §4.1's stated contract.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Pin {
    Db(u8),
    /// Parity bit for DB0-7 (8-bit variant) or DB0-15's low byte (16-bit).
    Dbp,
    /// Parity bit for DB8-15, 16-bit wide variants only.
    Dbp1,
    Bsy,
    Sel,
    Cd,
    Io,
    Msg,
    Req,
    Ack,
    Atn,
    Rst,
}

/// SCSI bus phase, encoded on MSG/CD/IO per SCSI-2 (spec.md §3, §6).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    BusFree,
    Arbitration,
    Selection,
    Reselection,
    Command,
    DataIn,
    DataOut,
    Status,
    MessageIn,
    MessageOut,
}

/// Platform hook a `BusPhy` drives; implemented once in hardware (PIO/GPIO)
/// and once as a hosted fake for tests, mirroring the `cfg`-gated
/// constructors `xous-pio::PioSharedState::new()` uses to pick a backend.
pub trait PhyBackend {
    fn set_pin(&mut self, pin: Pin, asserted: bool);
    fn read_pin(&self, pin: Pin) -> bool;
    /// Busy-wait for approximately `d`. Backends that can't sleep precisely
    /// (the hosted fake) may just track elapsed ticks.
    fn delay(&mut self, d: Duration);
    /// Flip the external bus transceiver to drive the data bus outward.
    fn enable_data_out(&mut self);
    /// Flip the transceiver back to high-Z / input and release REQ.
    fn release_data_and_req(&mut self);
}

/// Odd-parity fold over one byte: the xor of all 8 bits, inverted.
/// `parity(b) ^ parity_bit(b) == 1` is the receiver's check (spec.md §8).
pub const fn odd_parity(byte: u8) -> bool {
    let mut x = byte;
    x ^= x >> 4;
    x ^= x >> 2;
    x ^= x >> 1;
    (x & 1) == 0
}

/// Pre-built 8-bit variant wire image lookup table: index is the data byte,
/// value is `(!byte) | (parity << 8)`, ready to push straight into a PIO
/// TX FIFO / GPIO latch (spec.md §4.2's "256-entry lookup table").
#[repr(align(512))]
pub struct WireLut([u16; 256]);

impl WireLut {
    pub const fn build() -> Self {
        let mut table = [0u16; 256];
        let mut i = 0;
        while i < 256 {
            let byte = i as u8;
            let parity_bit = odd_parity(byte) as u16;
            table[i] = ((!byte) as u16) | (parity_bit << 8);
            i += 1;
        }
        WireLut(table)
    }
    pub fn encode(&self, byte: u8) -> u16 { self.0[byte as usize] }
    /// Decode a wire word back to a data byte and validate its parity bit.
    /// Returns `None` on a parity mismatch.
    pub fn decode(wire: u16) -> Option<u8> {
        let byte = !(wire as u8);
        let parity_bit = ((wire >> 8) & 1) != 0;
        if odd_parity(byte) == parity_bit { Some(byte) } else { None }
    }
}

pub static PARITY_LUT: WireLut = WireLut::build();

/// ISR-visible phy state. Flags are atomics so a reset/ATN interrupt can set
/// them without synchronizing with whatever the main loop is doing
/// (spec.md §9's note on process-wide mutable state).
pub struct ScsiPhyState {
    pub phase: Phase,
    pub reset_flag: AtomicBool,
    pub atn_flag: AtomicBool,
    pub parity_error: AtomicBool,
    /// Synchronous transfer offset (REQ-ahead-of-ACK allowance), 0 = async.
    pub sync_offset: u8,
    /// Synchronous transfer period, in 4ns units.
    pub sync_period: u8,
    pub initiator_id: Option<u8>,
}

impl ScsiPhyState {
    pub const fn new() -> Self {
        ScsiPhyState {
            phase: Phase::BusFree,
            reset_flag: AtomicBool::new(false),
            atn_flag: AtomicBool::new(false),
            parity_error: AtomicBool::new(false),
            sync_offset: 0,
            sync_period: 0,
            initiator_id: None,
        }
    }

    pub fn is_reset(&self) -> bool { self.reset_flag.load(Ordering::Acquire) }
    pub fn raise_reset(&self) { self.reset_flag.store(true, Ordering::Release) }
    pub fn clear_reset(&self) { self.reset_flag.store(false, Ordering::Release) }
    pub fn raise_parity_error(&self) { self.parity_error.store(true, Ordering::Release) }
    pub fn take_parity_error(&self) -> bool { self.parity_error.swap(false, Ordering::AcqRel) }
}

impl Default for ScsiPhyState {
    fn default() -> Self { Self::new() }
}

/// Errors surfaced while driving the bus, distinct from the SCSI-level
/// sense-key errors `scsi-proto` defines.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PhyError {
    /// A wait exceeded `WATCHDOG_TIMEOUT`; `reset_flag` has been set.
    Timeout,
    /// `reset_flag` was already set when the call started.
    Reset,
}

/// Drives one `PhyBackend`, sequencing phases and (de)asserting pins.
pub struct BusPhy<B: PhyBackend> {
    backend: B,
    pub state: ScsiPhyState,
}

impl<B: PhyBackend> BusPhy<B> {
    pub fn new(backend: B) -> Self { BusPhy { backend, state: ScsiPhyState::new() } }

    pub fn set_pin(&mut self, pin: Pin, asserted: bool) { self.backend.set_pin(pin, asserted) }
    pub fn read_pin(&self, pin: Pin) -> bool { self.backend.read_pin(pin) }

    /// Program the CD/IO/MSG wires for `phase` and wait one bus-settle
    /// interval. Bails out early with `PhyError::Reset` if RST fired first.
    pub fn set_phase(&mut self, phase: Phase) -> Result<(), PhyError> {
        if self.state.is_reset() {
            return Err(PhyError::Reset);
        }
        let (msg, cd, io) = phase_wires(phase);
        self.backend.set_pin(Pin::Msg, msg);
        self.backend.set_pin(Pin::Cd, cd);
        self.backend.set_pin(Pin::Io, io);
        self.backend.delay(BUS_SETTLE);
        self.state.phase = phase;
        Ok(())
    }

    /// De-assert every outbound wire, wait the release hold-off, then hand
    /// the transceiver back to its default (input) direction.
    pub fn release_outputs(&mut self) {
        for pin in [Pin::Bsy, Pin::Sel, Pin::Cd, Pin::Io, Pin::Msg, Pin::Req, Pin::Atn] {
            self.backend.set_pin(pin, false);
        }
        self.backend.delay(RELEASE_HOLDOFF);
        self.backend.release_data_and_req();
        self.state.phase = Phase::BusFree;
    }

    pub fn enable_data_out(&mut self) { self.backend.enable_data_out() }

    /// Wait for `condition` to become true, polling `reset_flag` every
    /// iteration and timing out after `WATCHDOG_TIMEOUT` (spec.md §5, §7).
    pub fn wait_for<F: FnMut(&B) -> bool>(&mut self, mut condition: F, poll_interval: Duration) -> Result<(), PhyError> {
        let mut elapsed = Duration::ZERO;
        loop {
            if self.state.is_reset() {
                return Err(PhyError::Reset);
            }
            if condition(&self.backend) {
                return Ok(());
            }
            self.backend.delay(poll_interval);
            elapsed += poll_interval;
            if elapsed >= WATCHDOG_TIMEOUT {
                self.state.raise_reset();
                return Err(PhyError::Timeout);
            }
        }
    }

    pub fn backend_mut(&mut self) -> &mut B { &mut self.backend }
    pub fn backend(&self) -> &B { &self.backend }
}

/// MSG/CD/IO wire encoding for each phase, per SCSI-2 (spec.md §6).
fn phase_wires(phase: Phase) -> (bool, bool, bool) {
    // (MSG, CD, IO)
    match phase {
        Phase::BusFree | Phase::Arbitration | Phase::Selection | Phase::Reselection => (false, false, false),
        Phase::DataOut => (false, false, false),
        Phase::DataIn => (false, false, true),
        Phase::Command => (false, true, false),
        Phase::Status => (false, true, true),
        Phase::MessageOut => (true, true, false),
        Phase::MessageIn => (true, true, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBackend {
        pins: HashMap<Pin, bool>,
        data_out_enabled: bool,
    }
    impl PhyBackend for FakeBackend {
        fn set_pin(&mut self, pin: Pin, asserted: bool) { self.pins.insert(pin, asserted); }
        fn read_pin(&self, pin: Pin) -> bool { *self.pins.get(&pin).unwrap_or(&false) }
        fn delay(&mut self, _d: Duration) {}
        fn enable_data_out(&mut self) { self.data_out_enabled = true; }
        fn release_data_and_req(&mut self) { self.data_out_enabled = false; }
    }

    #[test]
    fn odd_parity_is_odd() {
        for b in 0u8..=255 {
            let ones = b.count_ones() + odd_parity(b) as u32;
            assert_eq!(ones % 2, 1, "byte {b:#04x} parity should make total ones odd");
        }
    }

    #[test]
    fn wire_lut_round_trips_every_byte() {
        for b in 0u8..=255 {
            let wire = PARITY_LUT.encode(b);
            assert_eq!(WireLut::decode(wire), Some(b));
        }
    }

    #[test]
    fn wire_lut_detects_single_bit_flip() {
        for b in 0u8..=255 {
            let wire = PARITY_LUT.encode(b);
            for bit in 0..9 {
                let flipped = wire ^ (1 << bit);
                let decoded = WireLut::decode(flipped);
                // Flipping one bit of a 9-bit (8 data + 1 parity) word must
                // either change the byte or break the parity check -- never both
                // silently agree with the original byte.
                if let Some(d) = decoded {
                    assert_ne!(d, b, "single-bit flip on bit {bit} of {b:#04x} went undetected");
                }
            }
        }
    }

    #[test]
    fn phase_sequence_ends_busfree() {
        let mut phy = BusPhy::new(FakeBackend::default());
        phy.set_phase(Phase::Command).unwrap();
        assert_eq!(phy.state.phase, Phase::Command);
        phy.release_outputs();
        assert_eq!(phy.state.phase, Phase::BusFree);
        assert!(!phy.backend().read_pin(Pin::Bsy));
    }

    #[test]
    fn reset_flag_aborts_phase_change() {
        let mut phy = BusPhy::new(FakeBackend::default());
        phy.state.raise_reset();
        assert_eq!(phy.set_phase(Phase::Command), Err(PhyError::Reset));
    }

    #[test]
    fn wait_for_times_out_and_sets_reset() {
        let mut phy = BusPhy::new(FakeBackend::default());
        let res = phy.wait_for(|_| false, Duration::from_secs(1));
        assert_eq!(res, Err(PhyError::Timeout));
        assert!(phy.state.is_reset());
    }
}
