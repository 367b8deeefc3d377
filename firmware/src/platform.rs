//! Concrete MMIO backends for the `PhyBackend`/`DmaBackend`/`SdioBackend`
//! traits each driver crate defines. Those crates own the sequencing logic
//! and are hardware-agnostic by design; this module is where a board bring-up
//! engineer plugs in real registers, mirroring how `cramium-hal`'s board
//! support sits below `xous-pio`/`xous-bio-bdma`'s hardware-agnostic state
//! machines. This target has no SVD (see SPEC_FULL.md §2), so the register
//! layout below is this fictional MCU's own, expressed through the same
//! `Csr<T>` ergonomics `bus_phy::regs`/`accel_xfer::regs` already use.

#![cfg(feature = "baremetal")]

use core::time::Duration;

use bio_dma::{ChannelId, DmaBackend, Descriptor};
use bus_phy::regs::{Csr, Field, Register};
use bus_phy::{Pin, PhyBackend};
use sdio::{Command, Response48, SdioBackend};

/// Approximate MCU core clock; only used to turn a `Duration` into a spin
/// count for `delay()`, since this target has no cycle-accurate timer wired
/// up yet.
const CPU_HZ: u64 = 133_000_000;

fn spin_cycles(d: Duration) -> u64 { (d.as_nanos() as u64 * CPU_HZ) / 1_000_000_000 }

// --- Bus PHY GPIO block -----------------------------------------------

const REG_GPIO_OUT: Register = Register::new(0x00, 0xFFFF_FFFF);
const REG_GPIO_IN: Register = Register::new(0x01, 0xFFFF_FFFF);
const REG_GPIO_OE: Register = Register::new(0x02, 0xFFFF_FFFF);

fn pin_bit(pin: Pin) -> usize {
    match pin {
        Pin::Db(n) => n as usize,
        Pin::Dbp => 8,
        Pin::Dbp1 => 9,
        Pin::Bsy => 10,
        Pin::Sel => 11,
        Pin::Cd => 12,
        Pin::Io => 13,
        Pin::Msg => 14,
        Pin::Req => 15,
        Pin::Ack => 16,
        Pin::Atn => 17,
        Pin::Rst => 18,
    }
}

pub struct GpioPhyBackend {
    csr: Csr<u32>,
}

impl GpioPhyBackend {
    /// # Safety
    /// `base` must address this target's bus-PHY GPIO block for the whole
    /// program lifetime, and nothing else may alias it.
    pub unsafe fn new(base: *mut u32) -> Self { GpioPhyBackend { csr: Csr::new(base) } }
}

impl PhyBackend for GpioPhyBackend {
    fn set_pin(&mut self, pin: Pin, asserted: bool) {
        self.csr.wfo(Field::new(1, pin_bit(pin), REG_GPIO_OUT), asserted as u32);
    }

    fn read_pin(&self, pin: Pin) -> bool { self.csr.rf(Field::new(1, pin_bit(pin), REG_GPIO_IN)) != 0 }

    fn delay(&mut self, d: Duration) {
        for _ in 0..spin_cycles(d) {
            core::hint::spin_loop();
        }
    }

    fn enable_data_out(&mut self) { self.csr.wo(REG_GPIO_OE, 0xFFFF_FFFF); }
    fn release_data_and_req(&mut self) { self.csr.wo(REG_GPIO_OE, 0); }
}

// --- DMA channel trigger block -----------------------------------------

const REG_DMA_SRC: Register = Register::new(0x00, 0xFFFF_FFFF);
const REG_DMA_DST: Register = Register::new(0x01, 0xFFFF_FFFF);
const REG_DMA_COUNT: Register = Register::new(0x02, 0xFFFF_FFFF);
const REG_DMA_CTRL: Register = Register::new(0x03, 0xFFFF_FFFF);
const REG_DMA_STATUS: Register = Register::new(0x04, 0xFFFF_FFFF);
const CHANNEL_STRIDE: usize = 8;

const CTRL_START_BIT: usize = 0;
const STATUS_DONE_BIT: usize = 0;

pub struct MmioDmaBackend {
    csr: Csr<u32>,
}

impl MmioDmaBackend {
    /// # Safety
    /// `base` must address `bio_dma::MAX_CHANNELS` contiguous channel
    /// register blocks of `CHANNEL_STRIDE` words each.
    pub unsafe fn new(base: *mut u32) -> Self { MmioDmaBackend { csr: Csr::new(base) } }

    fn channel_reg(&self, channel: ChannelId, reg: Register) -> Register {
        Register::new(reg.offset() + channel.0 * CHANNEL_STRIDE, 0xFFFF_FFFF)
    }
}

impl DmaBackend for MmioDmaBackend {
    fn start(&mut self, channel: ChannelId, desc: Descriptor) {
        self.csr.wo(self.channel_reg(channel, REG_DMA_SRC), desc.src as u32);
        self.csr.wo(self.channel_reg(channel, REG_DMA_DST), desc.dst as u32);
        self.csr.wo(self.channel_reg(channel, REG_DMA_COUNT), (desc.count * desc.unit_bytes) as u32);
        let ctrl = self.channel_reg(channel, REG_DMA_CTRL);
        self.csr.wfo(Field::new(1, CTRL_START_BIT, ctrl), 1);
    }

    fn is_complete(&self, channel: ChannelId) -> bool {
        let status = self.channel_reg(channel, REG_DMA_STATUS);
        self.csr.rf(Field::new(1, STATUS_DONE_BIT, status)) != 0
    }
}

// --- SDIO command/response block ---------------------------------------

const REG_SD_CMD: Register = Register::new(0x00, 0xFFFF_FFFF);
const REG_SD_ARG: Register = Register::new(0x01, 0xFFFF_FFFF);
const REG_SD_RESP0: Register = Register::new(0x02, 0xFFFF_FFFF);
const REG_SD_RESP1: Register = Register::new(0x03, 0xFFFF_FFFF);
const REG_SD_RESP2: Register = Register::new(0x04, 0xFFFF_FFFF);
const REG_SD_RESP3: Register = Register::new(0x05, 0xFFFF_FFFF);
const REG_SD_STATUS: Register = Register::new(0x06, 0xFFFF_FFFF);
const REG_SD_CLKDIV: Register = Register::new(0x07, 0xFFFF_FFFF);
const REG_SD_BUSWIDTH: Register = Register::new(0x08, 0xFFFF_FFFF);
const REG_SD_CRC_DAT0: Register = Register::new(0x09, 0xFFFF_FFFF);
const REG_SD_CRC_DAT1: Register = Register::new(0x0A, 0xFFFF_FFFF);
const REG_SD_CRC_DAT2: Register = Register::new(0x0B, 0xFFFF_FFFF);
const REG_SD_CRC_DAT3: Register = Register::new(0x0C, 0xFFFF_FFFF);

const STATUS_CMD_DONE: Field = Field::new(1, 0, REG_SD_STATUS);
const STATUS_READ_TOKEN: Field = Field::new(1, 1, REG_SD_STATUS);
const STATUS_WRITE_TOKEN_VALID: Field = Field::new(1, 2, REG_SD_STATUS);
const STATUS_WRITE_TOKEN: Field = Field::new(5, 3, REG_SD_STATUS);

pub struct MmioSdioBackend {
    csr: Csr<u32>,
}

impl MmioSdioBackend {
    /// # Safety
    /// `base` must address this target's SDIO command/response block for
    /// the whole program lifetime.
    pub unsafe fn new(base: *mut u32) -> Self { MmioSdioBackend { csr: Csr::new(base) } }

    fn wait_cmd_done(&self) {
        while self.csr.rf(STATUS_CMD_DONE) == 0 {
            core::hint::spin_loop();
        }
    }
}

impl SdioBackend for MmioSdioBackend {
    fn send_cmd(&mut self, cmd: Command) -> Option<Response48> {
        self.csr.wo(REG_SD_ARG, cmd.arg);
        self.csr.wo(REG_SD_CMD, cmd.index as u32);
        self.wait_cmd_done();
        let data = self.csr.r(REG_SD_RESP0);
        let bytes = [cmd.index, (data >> 24) as u8, (data >> 16) as u8, (data >> 8) as u8, data as u8];
        Some(Response48 { index: cmd.index, data, crc7: sdio::crc::crc7(&bytes) })
    }

    fn send_cmd_r2(&mut self, cmd: Command) -> Option<[u8; 16]> {
        self.csr.wo(REG_SD_ARG, cmd.arg);
        self.csr.wo(REG_SD_CMD, cmd.index as u32);
        self.wait_cmd_done();
        let words = [
            self.csr.r(REG_SD_RESP0),
            self.csr.r(REG_SD_RESP1),
            self.csr.r(REG_SD_RESP2),
            self.csr.r(REG_SD_RESP3),
        ];
        let mut out = [0u8; 16];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
        }
        Some(out)
    }

    fn set_bus_width_4bit(&mut self) { self.csr.wo(REG_SD_BUSWIDTH, 1); }
    fn set_clock_hz(&mut self, hz: u32) { self.csr.wo(REG_SD_CLKDIV, (CPU_HZ as u32 / hz.max(1)).max(2)); }

    fn delay(&mut self, d: Duration) {
        for _ in 0..spin_cycles(d) {
            core::hint::spin_loop();
        }
    }

    fn read_token_ready(&self) -> bool { self.csr.rf(STATUS_READ_TOKEN) != 0 }

    fn received_block_crc16(&self) -> [u16; 4] {
        [
            self.csr.r(REG_SD_CRC_DAT0) as u16,
            self.csr.r(REG_SD_CRC_DAT1) as u16,
            self.csr.r(REG_SD_CRC_DAT2) as u16,
            self.csr.r(REG_SD_CRC_DAT3) as u16,
        ]
    }

    fn write_token(&self) -> Option<u8> {
        if self.csr.rf(STATUS_WRITE_TOKEN_VALID) != 0 {
            Some(self.csr.rf(STATUS_WRITE_TOKEN) as u8)
        } else {
            None
        }
    }
}
