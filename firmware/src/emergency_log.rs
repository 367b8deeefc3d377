//! A small ring buffer of recent log lines, flushed to a reserved flash
//! region when a watchdog timeout or panic leaves no time for a normal
//! logging path. Per spec.md §7's "log the PIO program counter and FIFO
//! levels for diagnosis" requirement, grounded on the teacher's
//! `log::Log` trait as the capture point (install one implementation that
//! both prints and appends here) rather than inventing a second logging
//! API.

use core::fmt::Write;
use heapless::String;

pub const LINE_LEN: usize = 96;
pub const RING_LINES: usize = 16;

pub struct EmergencyLog {
    lines: [String<LINE_LEN>; RING_LINES],
    next: usize,
    filled: bool,
}

impl EmergencyLog {
    pub fn new() -> Self {
        EmergencyLog { lines: core::array::from_fn(|_| String::new()), next: 0, filled: false }
    }

    pub fn push(&mut self, line: &str) {
        let slot = &mut self.lines[self.next];
        slot.clear();
        let _ = slot.push_str(&line[..line.len().min(LINE_LEN)]);
        self.next = (self.next + 1) % RING_LINES;
        if self.next == 0 {
            self.filled = true;
        }
    }

    /// Lines oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let start = if self.filled { self.next } else { 0 };
        let count = if self.filled { RING_LINES } else { self.next };
        (0..count).map(move |i| self.lines[(start + i) % RING_LINES].as_str())
    }
}

impl Default for EmergencyLog {
    fn default() -> Self { Self::new() }
}

/// Writes every buffered line to the reserved flash region and records the
/// watchdog-reported PIO program counter / FIFO levels the caller observed.
/// The real flash write is board-specific; this stub is the call site
/// spec.md §7 requires to exist so a watchdog handler has somewhere to call.
pub fn platform_emergency_log_save(log: &EmergencyLog, pio_pc: u32, tx_fifo_level: u8, rx_fifo_level: u8) {
    let mut header: String<LINE_LEN> = String::new();
    let _ = write!(header, "watchdog: pc={pio_pc:#x} txf={tx_fifo_level} rxf={rx_fifo_level}");
    platform_flash_write_line(&header);
    for line in log.iter() {
        platform_flash_write_line(line);
    }
}

fn platform_flash_write_line(_line: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_past_capacity_wraps_and_drops_the_oldest_line() {
        let mut log = EmergencyLog::new();
        for i in 0..RING_LINES + 2 {
            let mut s: String<LINE_LEN> = String::new();
            let _ = write!(s, "line {i}");
            log.push(&s);
        }
        let first = log.iter().next().unwrap();
        assert_eq!(first, "line 2");
        assert_eq!(log.iter().count(), RING_LINES);
    }

    #[test]
    fn empty_log_yields_no_lines() {
        let log = EmergencyLog::new();
        assert_eq!(log.iter().count(), 0);
    }
}
