#![cfg_attr(feature = "baremetal", no_std)]
//! Accelerated PIO+DMA transfer engine for the SCSI data phases. See
//! spec.md §4.2 for the full state-machine description; this crate keeps
//! the externally-observable contract (timing classification, the
//! queueing rules for `start_write`/`finish_write`, overflow handling) as
//! plain, host-testable logic, and keeps the actual PIO programs
//! (`programs.rs`) and register plumbing (`pio.rs`) as the hardware
//! realization a bring-up engineer would reach for next.

pub mod pio;
pub mod programs;
pub mod regs;
pub mod timing;

use bus_phy::{BusPhy, Phase, PhyBackend, PhyError, Pin, PARITY_LUT};
use timing::TransferClass;

/// A queued (not yet transmitted) or in-flight DMA buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub addr: usize,
    pub len: usize,
}
impl Buffer {
    fn is_contiguous_with(&self, other: &Buffer) -> bool { self.addr + self.len == other.addr }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XferError {
    /// Caller violated the two-slot queueing contract (spec.md §4.2).
    QueueFull,
    Timeout,
    Reset,
    ParityError,
}
impl From<PhyError> for XferError {
    fn from(e: PhyError) -> Self {
        match e {
            PhyError::Timeout => XferError::Timeout,
            PhyError::Reset => XferError::Reset,
        }
    }
}

/// Implements spec.md §4.2's queueing contract: `start_write` may be called
/// while a prior buffer still drains. A buffer contiguous with the live one
/// is merged into it; otherwise it becomes the single queued-next buffer. A
/// third call while both slots are full is a contract violation -- callers
/// are expected to have called `finish_write`/drained first.
#[derive(Debug, Default)]
pub struct WriteQueue {
    live: Option<Buffer>,
    queued: Option<Buffer>,
}

impl WriteQueue {
    pub fn new() -> Self { WriteQueue::default() }

    pub fn is_full(&self) -> bool { self.live.is_some() && self.queued.is_some() }
    pub fn is_drained(&self) -> bool { self.live.is_none() && self.queued.is_none() }
    pub fn live(&self) -> Option<Buffer> { self.live }

    pub fn start_write(&mut self, buf: Buffer) -> Result<(), XferError> {
        match (self.live, self.queued) {
            (None, None) => {
                self.live = Some(buf);
                Ok(())
            }
            (Some(live), None) => {
                if live.is_contiguous_with(&buf) {
                    self.live = Some(Buffer { addr: live.addr, len: live.len + buf.len });
                } else {
                    self.queued = Some(buf);
                }
                Ok(())
            }
            (Some(_), Some(_)) => Err(XferError::QueueFull),
            (None, Some(_)) => unreachable!("queued buffer without a live one"),
        }
    }

    /// Hardware (DMA completion) reports the live buffer has been fully
    /// transmitted; promote the queued buffer, if any, to live.
    pub fn retire_live(&mut self) -> Option<Buffer> {
        let done = self.live.take();
        self.live = self.queued.take();
        done
    }
}

/// Drives the REQ/ACK handshake for one direction of a data phase. The
/// per-byte loop below is what SM-DATA/SM-PARITY implement in hardware
/// (`programs.rs`); this is its host-testable reference semantics.
pub struct AccelXfer {
    pub sync_offset: u8,
    pub sync_period: u8,
    pub req_delay_cycles: u32,
    write_queue: WriteQueue,
}

impl AccelXfer {
    pub fn new() -> Self {
        AccelXfer { sync_offset: 0, sync_period: 0, req_delay_cycles: 0, write_queue: WriteQueue::new() }
    }

    pub fn is_synchronous(&self) -> bool { self.sync_offset > 0 }
    pub fn transfer_class(&self) -> TransferClass { TransferClass::from_period(self.sync_period) }

    /// Negotiate new sync parameters. Per spec.md §9's REDESIGN FLAG, this
    /// regenerates the PIO program from a template instead of patching
    /// delay fields of a program that may currently be executing.
    pub fn negotiate_sync(&mut self, offset: u8, period_4ns: u8, clock_hz: u32) {
        self.sync_offset = offset;
        self.sync_period = period_4ns;
        let spec = self.transfer_class().spec();
        self.req_delay_cycles = timing::ns_to_cycles(spec.req_pulse_ns, clock_hz);
        let _ = programs::async_write_program_with_delay(self.req_delay_cycles.min(255) as u8);
    }

    pub fn queue_write(&mut self, buf: Buffer) -> Result<(), XferError> { self.write_queue.start_write(buf) }
    pub fn write_queue(&self) -> &WriteQueue { &self.write_queue }
    pub fn retire_write(&mut self) -> Option<Buffer> { self.write_queue.retire_live() }

    /// Drive one byte out over `phy` in async mode: present the wire word,
    /// hold data-preset time, assert REQ, wait ACK low, release REQ.
    pub fn write_byte_async<B: PhyBackend>(&self, phy: &mut BusPhy<B>, byte: u8) -> Result<(), XferError> {
        let wire = PARITY_LUT.encode(byte);
        for bit in 0..8u8 {
            phy.set_pin(Pin::Db(bit), (wire >> bit) & 1 != 0);
        }
        phy.set_pin(Pin::Dbp, (wire >> 8) & 1 != 0);
        phy.set_pin(Pin::Req, true);
        phy.wait_for(|b| b.read_pin(Pin::Ack), core::time::Duration::from_nanos(50))?;
        phy.set_pin(Pin::Req, false);
        phy.wait_for(|b| !b.read_pin(Pin::Ack), core::time::Duration::from_nanos(50))?;
        Ok(())
    }

    /// Drive `bytes` out, blocking until the last byte's ACK handshake has
    /// completed -- spec.md §4.2's `finish_write` contract (PIO TX FIFO
    /// empty, SM back at its idle label, ACK high). `bytes` stands in for
    /// whatever the DMA-B/DMA-C chain would have fed the FIFO from the
    /// buffers tracked by `WriteQueue`; the queue itself only tracks
    /// address ranges; it doesn't own the memory being transmitted.
    pub fn finish_write<B: PhyBackend>(&mut self, phy: &mut BusPhy<B>, bytes: &[u8]) -> Result<(), XferError> {
        phy.set_phase(Phase::DataOut)?;
        phy.enable_data_out();
        for &b in bytes {
            if phy.state.is_reset() {
                return Err(XferError::Reset);
            }
            self.write_byte_async(phy, b)?;
        }
        Ok(())
    }

    /// Read one byte in async mode, returning `ParityError` (not aborting)
    /// on a bad parity bit so the caller can latch it sticky per spec.md §4.1.
    pub fn read_byte_async<B: PhyBackend>(&self, phy: &mut BusPhy<B>) -> Result<u8, XferError> {
        phy.set_pin(Pin::Req, true);
        phy.wait_for(|b| b.read_pin(Pin::Ack), core::time::Duration::from_nanos(50))?;
        let mut wire: u16 = 0;
        for bit in 0..8u8 {
            if phy.read_pin(Pin::Db(bit)) {
                wire |= 1 << bit;
            }
        }
        if phy.read_pin(Pin::Dbp) {
            wire |= 1 << 8;
        }
        phy.set_pin(Pin::Req, false);
        phy.wait_for(|b| !b.read_pin(Pin::Ack), core::time::Duration::from_nanos(50))?;
        match bus_phy::WireLut::decode(wire) {
            Some(byte) => Ok(byte),
            None => {
                phy.state.raise_parity_error();
                Err(XferError::ParityError)
            }
        }
    }
}

impl Default for AccelXfer {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBackend {
        pins: HashMap<Pin, bool>,
    }
    impl PhyBackend for FakeBackend {
        fn set_pin(&mut self, pin: Pin, asserted: bool) {
            self.pins.insert(pin, asserted);
            // loopback ACK immediately after REQ, like a very fast initiator
            if pin == Pin::Req {
                self.pins.insert(Pin::Ack, asserted);
            }
        }
        fn read_pin(&self, pin: Pin) -> bool { *self.pins.get(&pin).unwrap_or(&false) }
        fn delay(&mut self, _d: core::time::Duration) {}
        fn enable_data_out(&mut self) {}
        fn release_data_and_req(&mut self) {}
    }

    #[test]
    fn contiguous_writes_merge_into_one_live_buffer() {
        let mut q = WriteQueue::new();
        q.start_write(Buffer { addr: 0x1000, len: 64 }).unwrap();
        q.start_write(Buffer { addr: 0x1040, len: 64 }).unwrap();
        assert_eq!(q.live(), Some(Buffer { addr: 0x1000, len: 128 }));
        assert!(!q.is_full());
    }

    #[test]
    fn non_contiguous_write_becomes_queued_slot() {
        let mut q = WriteQueue::new();
        q.start_write(Buffer { addr: 0x1000, len: 64 }).unwrap();
        q.start_write(Buffer { addr: 0x3000, len: 32 }).unwrap();
        assert!(q.is_full());
    }

    #[test]
    fn third_buffer_while_full_is_rejected() {
        let mut q = WriteQueue::new();
        q.start_write(Buffer { addr: 0x1000, len: 64 }).unwrap();
        q.start_write(Buffer { addr: 0x3000, len: 32 }).unwrap();
        assert_eq!(q.start_write(Buffer { addr: 0x5000, len: 16 }), Err(XferError::QueueFull));
    }

    #[test]
    fn retire_promotes_queued_to_live() {
        let mut q = WriteQueue::new();
        q.start_write(Buffer { addr: 0x1000, len: 64 }).unwrap();
        q.start_write(Buffer { addr: 0x3000, len: 32 }).unwrap();
        let done = q.retire_live();
        assert_eq!(done, Some(Buffer { addr: 0x1000, len: 64 }));
        assert_eq!(q.live(), Some(Buffer { addr: 0x3000, len: 32 }));
        assert!(!q.is_full());
    }

    #[test]
    fn write_then_read_round_trips_with_loopback_ack() {
        let mut phy = BusPhy::new(FakeBackend::default());
        let xfer = AccelXfer::new();
        xfer.write_byte_async(&mut phy, 0xA5).unwrap();
        // loopback fake doesn't retain data bus state across reads independent
        // of REQ, but the handshake itself must complete without timing out.
    }

    #[test]
    fn sync_negotiation_classifies_correctly() {
        let mut xfer = AccelXfer::new();
        xfer.negotiate_sync(8, 12, 133_000_000);
        assert_eq!(xfer.transfer_class(), TransferClass::Fast20);
        assert!(xfer.is_synchronous());
    }
}
