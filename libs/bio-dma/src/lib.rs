#![cfg_attr(feature = "baremetal", no_std)]
//! Multi-channel DMA-chain primitive: one channel's completion re-arms the
//! next, without CPU involvement once started. This is the mechanism
//! spec.md §4.2 describes for the async-write path (DMA-B writes the
//! looked-up GPIO word's address into DMA-C's trigger register) and that
//! §4.3's SDIO driver reuses for streaming 512-byte blocks.
//!
//! Grounded on `xous-bio-bdma`'s `BioSharedState`: a shared register handle
//! plus a fixed small set of independently-claimable engines, with the same
//! claim/release discipline spec.md §5 calls out ("claim-owned by whichever
//! subsystem has initialized them; releasing is explicit").

use core::sync::atomic::{AtomicBool, Ordering};

pub const MAX_CHANNELS: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmaError {
    NoFreeChannel,
    InvalidChannel,
    /// A channel was asked to chain into itself or a cycle.
    ChainCycle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(pub usize);

/// One DMA transfer: a source/destination pair plus how many transfer-sized
/// units to move. `unit_bytes` lets the same struct describe a byte-wide
/// SCSI handshake transfer or a 512-byte SDIO block.
#[derive(Debug, Copy, Clone)]
pub struct Descriptor {
    pub src: *const u8,
    pub dst: *mut u8,
    pub unit_bytes: usize,
    pub count: usize,
}
unsafe impl Send for Descriptor {}

/// A transfer source/sink that knows how to move one `Descriptor` worth of
/// data. The real implementation programs MMIO trigger registers; the
/// hosted implementation (used by tests) does the memcpy directly so the
/// chaining logic can be exercised without hardware.
pub trait DmaBackend {
    fn start(&mut self, channel: ChannelId, desc: Descriptor);
    /// True once `channel`'s transfer has moved all `count` units.
    fn is_complete(&self, channel: ChannelId) -> bool;
}

struct Channel {
    claimed: bool,
    /// Channel to retrigger when this one completes (the DMA-B -> DMA-C
    /// relationship from spec.md §4.2).
    chain_to: Option<ChannelId>,
    completions: u32,
}

pub struct DmaEngine<B: DmaBackend> {
    backend: B,
    channels: [Channel; MAX_CHANNELS],
    /// Set by a completion ISR in firmware; polled by `service()`.
    pending_irq: AtomicBool,
}

impl<B: DmaBackend> DmaEngine<B> {
    pub fn new(backend: B) -> Self {
        DmaEngine {
            backend,
            channels: core::array::from_fn(|_| Channel { claimed: false, chain_to: None, completions: 0 }),
            pending_irq: AtomicBool::new(false),
        }
    }

    pub fn claim(&mut self) -> Result<ChannelId, DmaError> {
        let idx = self.channels.iter().position(|c| !c.claimed).ok_or(DmaError::NoFreeChannel)?;
        self.channels[idx].claimed = true;
        Ok(ChannelId(idx))
    }

    /// Explicit release, per spec.md §5's claim-ownership discipline.
    pub fn release(&mut self, channel: ChannelId) -> Result<(), DmaError> {
        let c = self.channels.get_mut(channel.0).ok_or(DmaError::InvalidChannel)?;
        c.claimed = false;
        c.chain_to = None;
        Ok(())
    }

    /// Arm `from` so that when it completes, `to` is started automatically
    /// by `service()`. Two channels chaining into each other would spin
    /// `service()` forever, so that's rejected up front.
    pub fn chain(&mut self, from: ChannelId, to: ChannelId) -> Result<(), DmaError> {
        if from == to {
            return Err(DmaError::ChainCycle);
        }
        if from.0 >= MAX_CHANNELS || to.0 >= MAX_CHANNELS {
            return Err(DmaError::InvalidChannel);
        }
        if self.channels[to.0].chain_to == Some(from) {
            return Err(DmaError::ChainCycle);
        }
        self.channels[from.0].chain_to = Some(to);
        Ok(())
    }

    pub fn start(&mut self, channel: ChannelId, desc: Descriptor) -> Result<(), DmaError> {
        if channel.0 >= MAX_CHANNELS || !self.channels[channel.0].claimed {
            return Err(DmaError::InvalidChannel);
        }
        self.backend.start(channel, desc);
        Ok(())
    }

    /// Called from the DMA-completion ISR (or a tight poll loop when
    /// running without interrupts). Advances the chain by one link per
    /// completed channel and returns which channels completed this round.
    pub fn service(&mut self) -> heapless::Vec<ChannelId, MAX_CHANNELS> {
        self.pending_irq.store(false, Ordering::Release);
        let mut completed = heapless::Vec::new();
        for idx in 0..MAX_CHANNELS {
            let id = ChannelId(idx);
            if self.channels[idx].claimed && self.backend.is_complete(id) {
                self.channels[idx].completions += 1;
                let _ = completed.push(id);
            }
        }
        completed
    }

    pub fn completions(&self, channel: ChannelId) -> u32 {
        self.channels.get(channel.0).map(|c| c.completions).unwrap_or(0)
    }

    pub fn notify_irq(&self) { self.pending_irq.store(true, Ordering::Release) }
    pub fn irq_pending(&self) -> bool { self.pending_irq.load(Ordering::Acquire) }

    pub fn backend_mut(&mut self) -> &mut B { &mut self.backend }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct FakeBackend {
        // channel -> (copied bytes, done)
        state: Rc<RefCell<HashMap<usize, (Vec<u8>, bool)>>>,
    }
    impl DmaBackend for FakeBackend {
        fn start(&mut self, channel: ChannelId, desc: Descriptor) {
            let bytes = unsafe {
                core::slice::from_raw_parts(desc.src, desc.unit_bytes * desc.count).to_vec()
            };
            unsafe {
                core::ptr::copy_nonoverlapping(bytes.as_ptr(), desc.dst, bytes.len());
            }
            self.state.borrow_mut().insert(channel.0, (bytes, true));
        }
        fn is_complete(&self, channel: ChannelId) -> bool {
            self.state.borrow().get(&channel.0).map(|(_, done)| *done).unwrap_or(false)
        }
    }

    #[test]
    fn claim_then_release_allows_reuse() {
        let mut engine = DmaEngine::new(FakeBackend::default());
        let a = engine.claim().unwrap();
        engine.release(a).unwrap();
        let b = engine.claim().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhausting_channels_errors() {
        let mut engine = DmaEngine::new(FakeBackend::default());
        for _ in 0..MAX_CHANNELS {
            engine.claim().unwrap();
        }
        assert_eq!(engine.claim(), Err(DmaError::NoFreeChannel));
    }

    #[test]
    fn self_chain_rejected() {
        let mut engine = DmaEngine::new(FakeBackend::default());
        let a = engine.claim().unwrap();
        assert_eq!(engine.chain(a, a), Err(DmaError::ChainCycle));
    }

    #[test]
    fn transfer_copies_bytes_and_reports_complete() {
        let mut engine = DmaEngine::new(FakeBackend::default());
        let a = engine.claim().unwrap();
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        let desc = Descriptor { src: src.as_ptr(), dst: dst.as_mut_ptr(), unit_bytes: 1, count: 4 };
        engine.start(a, desc).unwrap();
        let completed = engine.service();
        assert_eq!(completed.as_slice(), [a]);
        assert_eq!(dst, src);
        assert_eq!(engine.completions(a), 1);
    }
}
