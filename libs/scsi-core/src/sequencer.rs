//! The phase sequencer: selection through message-in, built around
//! `bus-phy::BusPhy` and `accel-xfer::AccelXfer`. Grounded on
//! `usbd_scsi::Scsi::process_command`'s read-CBW -> decode -> dispatch ->
//! reply loop, adapted from one CBW read to byte-at-a-time CDB assembly
//! over real bus phases (there is no CBW in parallel SCSI).

use core::time::Duration;

use accel_xfer::{AccelXfer, XferError};
use bus_phy::{BusPhy, Phase, PhyBackend, PhyError, Pin};
use media::MediaIo;

use crate::cdb::{Cdb, MAX_CDB_LEN};
use crate::command::Command;
use crate::target::{Outcome, Target};

/// Upper bound on a single block-I/O command's per-block scratch; covers
/// both 512-byte SD blocks and 2048-byte CD-ROM cooked sectors.
const MAX_BLOCK_BYTES: usize = 2048;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopError {
    Reset,
    Timeout,
    ParityAbort,
}
impl From<XferError> for LoopError {
    fn from(e: XferError) -> Self {
        let mapped = match e {
            XferError::Reset => LoopError::Reset,
            XferError::Timeout => LoopError::Timeout,
            XferError::ParityError => LoopError::ParityAbort,
            XferError::QueueFull => LoopError::Reset,
        };
        log::warn!("phase sequencer aborting: {:?} ({:?})", mapped, e);
        mapped
    }
}
impl From<PhyError> for LoopError {
    fn from(e: PhyError) -> Self {
        let mapped = match e {
            PhyError::Reset => LoopError::Reset,
            PhyError::Timeout => LoopError::Timeout,
        };
        log::warn!("phase sequencer aborting: {:?} ({:?})", mapped, e);
        mapped
    }
}

pub struct CommandLoop<B: PhyBackend, M: MediaIo> {
    pub phy: BusPhy<B>,
    pub xfer: AccelXfer,
    pub target: Target,
    pub io: M,
}

impl<B: PhyBackend, M: MediaIo> CommandLoop<B, M> {
    pub fn new(phy: BusPhy<B>, xfer: AccelXfer, target: Target, io: M) -> Self {
        CommandLoop { phy, xfer, target, io }
    }

    /// Runs one SELECTION -> COMMAND -> (DATA) -> STATUS -> MESSAGE IN
    /// cycle to completion. Assumes the caller has already observed SEL
    /// asserted with our target id on the bus.
    pub fn service_one_command(&mut self) -> Result<(), LoopError> {
        self.phy.set_phase(Phase::Command)?;
        self.phy.set_pin(Pin::Bsy, true);

        let opcode = self.xfer.read_byte_async(&mut self.phy)?;
        let len = Cdb::length_for_opcode(opcode).min(MAX_CDB_LEN);
        let mut bytes = [0u8; MAX_CDB_LEN];
        bytes[0] = opcode;
        for b in bytes.iter_mut().take(len).skip(1) {
            *b = self.xfer.read_byte_async(&mut self.phy)?;
        }
        let cdb = Cdb::from_bytes(&bytes[..len]);

        let outcome = match Command::decode(&cdb) {
            Ok(cmd) => self.target.dispatch(&cmd),
            Err(e) => Outcome::CheckCondition(e),
        };

        match self.run_data_phase(outcome) {
            Ok(()) => {}
            // A DATA OUT parity error ends this command in CHECK CONDITION;
            // it doesn't abort the loop the way RST or a watchdog timeout
            // does, per spec.md §4.8.
            Err(LoopError::ParityAbort) => self.target.record_parity_error(),
            Err(e) => return Err(e),
        }
        self.finish_with_status()
    }

    fn run_data_phase(&mut self, outcome: Outcome) -> Result<(), LoopError> {
        match outcome {
            Outcome::Good => Ok(()),
            Outcome::CheckCondition(_) => Ok(()),
            Outcome::DataIn(bytes) => {
                self.phy.set_phase(Phase::DataIn)?;
                self.phy.enable_data_out();
                for &b in bytes.iter() {
                    self.xfer.write_byte_async(&mut self.phy, b)?;
                }
                Ok(())
            }
            Outcome::BlockRead { lba, blocks } => self.stream_blocks_in(lba, blocks),
            Outcome::BlockReadCd { lba, blocks } => self.stream_cd_blocks_in(lba, blocks),
            Outcome::BlockWrite { lba, blocks } => self.receive_blocks_out(lba, blocks),
            Outcome::DataOut { length, continuation } => self.drain_data_out(length, continuation),
        }
    }

    /// Accepts and discards a DATA OUT phase of `length` bytes (FORMAT
    /// UNIT's defect list, MODE SELECT's mode pages), then lets the target
    /// react to the continuation; per spec.md §4.8 this never fails the
    /// command, it just keeps the bus handshake honest.
    fn drain_data_out(&mut self, length: u16, continuation: crate::target::PostDataOut) -> Result<(), LoopError> {
        self.phy.set_phase(Phase::DataOut)?;
        for _ in 0..length {
            match self.xfer.read_byte_async(&mut self.phy) {
                Ok(_) => {}
                Err(XferError::ParityError) => return Err(LoopError::ParityAbort),
                Err(e) => return Err(e.into()),
            }
        }
        let _ = self.target.complete_data_out(continuation);
        Ok(())
    }

    fn stream_blocks_in(&mut self, lba: u32, blocks: u32) -> Result<(), LoopError> {
        use media::prefetch::{MAX_CACHED_SECTORS, SECTOR_BYTES};

        let block_size = self.target.block_size.max(1) as u64;
        let target_id = self.target.media.target_id;
        self.phy.set_phase(Phase::DataIn)?;
        self.phy.enable_data_out();

        // `take`'s borrow is tied to `self.target`, which the image read
        // below also needs; copy any cache hit out to the stack first so
        // the borrow ends before that read.
        let mut cached = [[0u8; SECTOR_BYTES]; MAX_CACHED_SECTORS];
        let cached_served = match self.target.prefetch.take(target_id, lba, blocks) {
            Some((sectors, served)) => {
                for (dst, src) in cached.iter_mut().zip(sectors.iter()) {
                    *dst = *src;
                }
                served
            }
            None => 0,
        };

        let chunk = (block_size as usize).min(MAX_BLOCK_BYTES);
        let mut buf = [0u8; MAX_BLOCK_BYTES];
        // Sectors read fresh from the image this call, folded into the
        // cache once streaming finishes, per spec.md §4.9's "fill after a
        // read completes" rule.
        let mut fresh = [[0u8; SECTOR_BYTES]; MAX_CACHED_SECTORS];
        let mut fresh_len = 0usize;

        if cached_served < blocks {
            self.target
                .image
                .seek((lba as u64 + cached_served as u64) * block_size)
                .map_err(|_| LoopError::Reset)?;
        }

        for i in 0..blocks {
            if self.phy.state.is_reset() {
                return Err(LoopError::Reset);
            }
            if i < cached_served {
                let sector = cached[i as usize];
                for &b in &sector[..chunk] {
                    self.xfer.write_byte_async(&mut self.phy, b)?;
                }
            } else {
                self.target
                    .image
                    .read(&mut self.io, &mut buf[..chunk])
                    .map_err(|e| { self.target.record_io_error(e); LoopError::Reset })?;
                for &b in &buf[..chunk] {
                    self.xfer.write_byte_async(&mut self.phy, b)?;
                }
                if fresh_len < MAX_CACHED_SECTORS {
                    fresh[fresh_len][..chunk].copy_from_slice(&buf[..chunk]);
                    fresh_len += 1;
                }
            }
        }

        if fresh_len > 0 {
            self.target.prefetch.fill(target_id, lba + cached_served, &fresh[..fresh_len]);
        }
        Ok(())
    }

    /// READ CD: streams one Red-Book-formatted 2352-byte frame per
    /// requested LBA, built by `Target::format_cd_sector` rather than a
    /// raw pass-through of image bytes.
    fn stream_cd_blocks_in(&mut self, lba: u32, blocks: u32) -> Result<(), LoopError> {
        self.phy.set_phase(Phase::DataIn)?;
        self.phy.enable_data_out();
        let mut frame = [0u8; media::cdrom::SECTOR_SIZE_RAW];
        for i in 0..blocks {
            if self.phy.state.is_reset() {
                return Err(LoopError::Reset);
            }
            self.target.format_cd_sector(&mut self.io, lba + i, &mut frame).map_err(|_| LoopError::Reset)?;
            for &b in frame.iter() {
                self.xfer.write_byte_async(&mut self.phy, b)?;
            }
        }
        Ok(())
    }

    fn receive_blocks_out(&mut self, lba: u32, blocks: u32) -> Result<(), LoopError> {
        let block_size = self.target.block_size.max(1) as u64;
        self.phy.set_phase(Phase::DataOut)?;
        let mut buf = [0u8; MAX_BLOCK_BYTES];
        let chunk = (block_size as usize).min(MAX_BLOCK_BYTES);
        self.target
            .image
            .seek(lba as u64 * block_size)
            .map_err(|_| LoopError::Reset)?;
        for _ in 0..blocks {
            for slot in buf.iter_mut().take(chunk) {
                *slot = match self.xfer.read_byte_async(&mut self.phy) {
                    Ok(b) => b,
                    Err(XferError::ParityError) => {
                        // Sticky parity error: abort before this sector's SD
                        // commit, per spec.md §4.8.
                        return Err(LoopError::ParityAbort);
                    }
                    Err(e) => return Err(e.into()),
                };
            }
            self.target
                .image
                .write(&mut self.io, &buf[..chunk])
                .map_err(|e| { self.target.record_io_error(e); LoopError::Reset })?;
        }
        Ok(())
    }

    fn finish_with_status(&mut self) -> Result<(), LoopError> {
        let status_byte = if self.target.has_sense() { 0x02 } else { 0x00 };
        self.phy.set_phase(Phase::Status)?;
        self.phy.enable_data_out();
        self.xfer.write_byte_async(&mut self.phy, status_byte)?;
        self.phy.set_phase(Phase::MessageIn)?;
        self.xfer.write_byte_async(&mut self.phy, 0x00)?; // COMMAND COMPLETE
        self.phy.release_outputs();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media::manager::TargetMedia;
    use media::ImageStore;
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
        fn delay(&mut self, _d: Duration) {}
        fn enable_data_out(&mut self) {}
        fn release_data_and_req(&mut self) {}
    }

    struct VecIo(Vec<u8>);
    impl MediaIo for VecIo {
        fn read_exact(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<(), media::ImageError> {
            let start = byte_offset as usize;
            buf.copy_from_slice(self.0.get(start..start + buf.len()).ok_or(media::ImageError::OutOfRange)?);
            Ok(())
        }
        fn write_all(&mut self, byte_offset: u64, buf: &[u8]) -> Result<(), media::ImageError> {
            let start = byte_offset as usize;
            self.0.get_mut(start..start + buf.len()).ok_or(media::ImageError::OutOfRange)?.copy_from_slice(buf);
            Ok(())
        }
    }

    fn loopback_backend() -> FakeBackend {
        // ACK mirrors REQ immediately, like accel-xfer's own loopback fake.
        FakeBackend::default()
    }

    #[test]
    fn inquiry_drives_data_in_then_good_status() {
        let phy = BusPhy::new(loopback_backend());
        let image = ImageStore::open("disk.img", 512, 512 * 4, false).unwrap();
        let target = Target::new(TargetMedia::new(0, false), image, heapless::Vec::new());
        let io = VecIo(vec![0u8; 512 * 4]);
        let mut cl = CommandLoop::new(phy, AccelXfer::new(), target, io);

        // ACK is asserted/released synchronously with REQ in this fake, so
        // wait_for never spins; drive the fields directly rather than
        // faking real bus timing.
        let outcome = cl.target.dispatch(&Command::Inquiry { allocation_length: 36 });
        assert!(matches!(outcome, Outcome::DataIn(_)));
    }

    #[test]
    fn stream_cd_blocks_in_red_book_formats_cooked_sectors() {
        let phy = BusPhy::new(loopback_backend());
        let image = ImageStore::open("disk.img", 2048, 2048 * 2, false).unwrap();
        let mut tracks: heapless::Vec<media::Track, 99> = heapless::Vec::new();
        let _ = tracks.push(media::Track {
            number: 1,
            mode: media::TrackMode::Mode1_2048,
            sector_length: 2048,
            track_start_lba: 0,
            data_start_lba: 0,
            file_offset: 0,
        });
        let target = Target::new(TargetMedia::new(0, true), image, tracks);
        let io = VecIo(vec![0x42u8; 2048 * 2]);
        let mut cl = CommandLoop::new(phy, AccelXfer::new(), target, io);
        assert!(cl.stream_cd_blocks_in(0, 1).is_ok());
    }

    #[test]
    fn stream_cd_blocks_in_rejects_audio_tracks() {
        let phy = BusPhy::new(loopback_backend());
        let image = ImageStore::open("disk.img", 2048, 2048 * 2, false).unwrap();
        let mut tracks: heapless::Vec<media::Track, 99> = heapless::Vec::new();
        let _ = tracks.push(media::Track {
            number: 1,
            mode: media::TrackMode::Audio,
            sector_length: 2352,
            track_start_lba: 0,
            data_start_lba: 0,
            file_offset: 0,
        });
        let target = Target::new(TargetMedia::new(0, true), image, tracks);
        let io = VecIo(vec![0x42u8; 2048 * 2]);
        let mut cl = CommandLoop::new(phy, AccelXfer::new(), target, io);
        assert_eq!(cl.stream_cd_blocks_in(0, 1), Err(LoopError::Reset));
    }

    #[test]
    fn stream_blocks_in_completes_over_a_loopback_bus() {
        // The fake's ACK-mirrors-REQ behavior makes the target->initiator
        // direction self-contained (each written byte completes its own
        // handshake); exercising the initiator->target direction would
        // need a simulated host driving DB/DBP, which this hosted fake
        // doesn't provide.
        let phy = BusPhy::new(loopback_backend());
        let image = ImageStore::open("disk.img", 512, 512 * 4, false).unwrap();
        let target = Target::new(TargetMedia::new(0, false), image, heapless::Vec::new());
        let io = VecIo(vec![0xABu8; 512 * 4]);
        let mut cl = CommandLoop::new(phy, AccelXfer::new(), target, io);
        assert!(cl.stream_blocks_in(0, 2).is_ok());
    }
}
