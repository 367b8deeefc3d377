#![cfg_attr(feature = "baremetal", no_std)]
#![cfg_attr(feature = "baremetal", no_main)]

//! Core 0 entry point: owns the SCSI command loop built from `scsi-core`,
//! `bus-phy`, `accel-xfer`, `sdio` and `media`, wired to the concrete MMIO
//! backends in `platform`. Grounded on the teacher's `baremetal/src/main.rs`
//! `rust_entry`/panic-handler shape, generalized from a "print hello world
//! forever" loop to servicing one SCSI command per bus selection.

mod config;
mod console;
mod core1;
mod emergency_log;
mod watchdog;

#[cfg(feature = "baremetal")]
mod platform;

use bio_dma::DmaBackend;
use bus_phy::{BusPhy, Pin};
use config::{ConfigSource, StaticConfig};
use media::image_store::{ImageError, MediaIo};
use media::manager::TargetMedia;
use media::ImageStore;
use scsi_core::sequencer::CommandLoop;
use scsi_core::target::Target;
use sdio::{SdioBackend, SdioDriver, BLOCK_LEN};

/// Bridges `media::MediaIo`'s byte-granular contract onto `sdio::SdioDriver`'s
/// 512-byte block I/O; the two crates don't depend on each other, so this
/// adapter is where `firmware` pays for that separation.
struct SdioMediaIo<'a, S: SdioBackend, D: DmaBackend> {
    driver: &'a mut SdioDriver<S, D>,
}

impl<'a, S: SdioBackend, D: DmaBackend> MediaIo for SdioMediaIo<'a, S, D> {
    fn read_exact(&mut self, byte_offset: u64, buf: &mut [u8]) -> Result<(), ImageError> {
        if byte_offset % BLOCK_LEN as u64 != 0 {
            return Err(ImageError::NotBlockAligned);
        }
        let base_lba = (byte_offset / BLOCK_LEN as u64) as u32;
        for (i, chunk) in buf.chunks_mut(BLOCK_LEN).enumerate() {
            let mut block = [[0u8; BLOCK_LEN]; 1];
            self.driver.read_blocks(base_lba + i as u32, &mut block).map_err(|_| ImageError::Io)?;
            chunk.copy_from_slice(&block[0][..chunk.len()]);
        }
        Ok(())
    }

    fn write_all(&mut self, byte_offset: u64, buf: &[u8]) -> Result<(), ImageError> {
        if byte_offset % BLOCK_LEN as u64 != 0 {
            return Err(ImageError::NotBlockAligned);
        }
        let base_lba = (byte_offset / BLOCK_LEN as u64) as u32;
        for (i, chunk) in buf.chunks(BLOCK_LEN).enumerate() {
            let mut block = [[0u8; BLOCK_LEN]; 1];
            block[0][..chunk.len()].copy_from_slice(chunk);
            self.driver.write_blocks(base_lba + i as u32, &block).map_err(|_| ImageError::Io)?;
        }
        Ok(())
    }
}

/// Builds the one target this bring-up configuration serves (the first
/// entry of `StaticConfig`) and runs command loops forever. Selection
/// polling (observing `SEL` asserted with our id) is simplified to "always
/// selected" here; the real arbitration/selection phase lives in
/// `bus_phy::BusPhy` and is exercised by `scsi-core`'s own tests.
#[cfg(feature = "baremetal")]
fn run<S, D, P>(mut driver: SdioDriver<S, D>, phy_backend: P) -> !
where
    S: SdioBackend,
    D: DmaBackend,
    P: bus_phy::PhyBackend,
{
    let cfg = StaticConfig::single_disk(0, BLOCK_LEN as u32);
    let target_cfg = &cfg.targets()[0];
    // The real directory lookup that resolves a target's backing file to a
    // byte range is an external collaborator (spec.md §4.4); this bring-up
    // configuration starts from an empty image until one is inserted.
    let image = ImageStore::open("disk0", BLOCK_LEN as u32, 0, false).expect("static image spec is always valid");
    let media = TargetMedia::new(target_cfg.scsi_id, false);
    let target = Target::new(media, image, heapless::Vec::new());
    let phy = BusPhy::new(phy_backend);
    let xfer = accel_xfer::AccelXfer::new();
    let io = SdioMediaIo { driver: &mut driver };
    let mut command_loop = CommandLoop::new(phy, xfer, target, io);

    loop {
        while !command_loop.phy.read_pin(Pin::Sel) {
            core::hint::spin_loop();
        }
        if let Err(e) = command_loop.service_one_command() {
            log::warn!("command loop aborted: {:?}", e);
        }
    }
}

#[cfg(all(not(test), feature = "baremetal"))]
mod panic_handler {
    use core::panic::PanicInfo;

    #[panic_handler]
    fn handle_panic(_info: &PanicInfo) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}

/// This fictional MCU's own MMIO layout (there is no SVD, per SPEC_FULL.md
/// §2): three word-addressed peripheral blocks, one per `platform` backend.
const GPIO_BASE: *mut u32 = 0x4000_0000 as *mut u32;
const DMA_BASE: *mut u32 = 0x4001_0000 as *mut u32;
const SDIO_BASE: *mut u32 = 0x4002_0000 as *mut u32;

/// # Safety
/// Runs exactly once, at reset, before anything else touches these
/// peripheral blocks.
#[cfg(feature = "baremetal")]
#[export_name = "rust_entry"]
pub unsafe extern "C" fn rust_entry() -> ! {
    let phy_backend = platform::GpioPhyBackend::new(GPIO_BASE);
    let dma_backend = platform::MmioDmaBackend::new(DMA_BASE);
    let sdio_backend = platform::MmioSdioBackend::new(SDIO_BASE);
    let dma = bio_dma::DmaEngine::new(dma_backend);
    let driver = SdioDriver::new(sdio_backend, dma);
    run(driver, phy_backend)
}

#[cfg(not(feature = "baremetal"))]
fn main() {}
