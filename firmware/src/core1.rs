//! Core 1 entry point: wide-bus (16-bit) parity generation, fed through a
//! single-slot mailbox from Core 0's command loop. Per spec.md §5's "Core 1
//! ... receives work via a single-slot mailbox" and §4.1's requirement that
//! 16-bit wide variants run the same parity algorithm in parallel on both
//! bytes, grounded on `bus_phy::{PARITY_LUT, WireLut}` for the algorithm
//! itself and `bus_phy::ScsiPhyState`'s atomic flag shape for the handoff.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use bus_phy::PARITY_LUT;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MailboxBusy;

/// One pending high-byte-of-a-wide-transfer job: Core 0 posts the upper
/// byte of a 16-bit wide word while it handles the lower byte's parity
/// itself, Core 1 posts back the 9-bit wire value (byte in bits 0..=7,
/// parity in bit 8) for `DBP1`. Holds at most one outstanding job.
pub struct Core1Mailbox {
    job_byte: AtomicU16,
    has_job: AtomicBool,
    result_wire: AtomicU16,
    has_result: AtomicBool,
}

impl Core1Mailbox {
    pub const fn new() -> Self {
        Core1Mailbox {
            job_byte: AtomicU16::new(0),
            has_job: AtomicBool::new(false),
            result_wire: AtomicU16::new(0),
            has_result: AtomicBool::new(false),
        }
    }

    /// Called from Core 0. Rejected if the previous job's result hasn't
    /// been collected yet.
    pub fn post(&self, high_byte: u8) -> Result<(), MailboxBusy> {
        if self.has_job.load(Ordering::Acquire) {
            return Err(MailboxBusy);
        }
        self.job_byte.store(high_byte as u16, Ordering::Relaxed);
        self.has_job.store(true, Ordering::Release);
        Ok(())
    }

    /// Called from Core 0 after `post`; spins until Core 1 has produced
    /// the wire value.
    pub fn take_result(&self) -> u16 {
        while !self.has_result.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.has_result.store(false, Ordering::Release);
        self.result_wire.load(Ordering::Relaxed)
    }

    fn take_job(&self) -> Option<u8> {
        if self.has_job.load(Ordering::Acquire) {
            let b = self.job_byte.load(Ordering::Relaxed) as u8;
            self.has_job.store(false, Ordering::Release);
            Some(b)
        } else {
            None
        }
    }

    fn post_result(&self, wire: u16) {
        self.result_wire.store(wire, Ordering::Relaxed);
        self.has_result.store(true, Ordering::Release);
    }
}

impl Default for Core1Mailbox {
    fn default() -> Self { Self::new() }
}

/// Core 1's whole job for the life of the program: park on the mailbox,
/// encode whatever byte Core 0 hands it through the same `PARITY_LUT` Core 0
/// uses for the low byte, hand the 9-bit wire value back.
pub fn core1_entry(mailbox: &Core1Mailbox) -> ! {
    loop {
        if let Some(byte) = mailbox.take_job() {
            mailbox.post_result(PARITY_LUT.encode(byte));
        } else {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_then_take_job_round_trips_the_byte() {
        let mailbox = Core1Mailbox::new();
        mailbox.post(0xA5).unwrap();
        assert_eq!(mailbox.take_job(), Some(0xA5));
    }

    #[test]
    fn posting_while_a_job_is_still_pending_is_rejected() {
        let mailbox = Core1Mailbox::new();
        mailbox.post(0x01).unwrap();
        assert_eq!(mailbox.post(0x02), Err(MailboxBusy));
    }

    #[test]
    fn worker_round_trip_matches_the_shared_lut() {
        let mailbox = Core1Mailbox::new();
        mailbox.post(0x3C).unwrap();
        // Drive one iteration of the worker loop by hand rather than
        // spawning a real thread, since `core1_entry` never returns.
        if let Some(byte) = mailbox.take_job() {
            mailbox.post_result(PARITY_LUT.encode(byte));
        }
        assert_eq!(mailbox.take_result(), PARITY_LUT.encode(0x3C));
    }
}
