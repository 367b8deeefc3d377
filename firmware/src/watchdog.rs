//! Centralizes the "busy-wait with a bounded deadline, honoring reset" shape
//! that spec.md §5 requires at every suspension point (PIO FIFO wait, DMA
//! completion, SD busy poll, host ACK edge). Grounded on
//! `bus_phy::BusPhy::wait_for`'s same contract, generalized so call sites
//! that aren't already a `BusPhy` wait (SD card busy-polling, core-to-core
//! mailbox handoff) share one implementation instead of re-deriving it.

use core::time::Duration;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeout;

/// An absolute point `poll_interval`-sized ticks in the future, tracked as
/// elapsed time rather than a wall clock (this target has no RTC).
#[derive(Debug, Copy, Clone)]
pub struct Deadline {
    remaining: Duration,
}

impl Deadline {
    pub fn after(d: Duration) -> Self { Deadline { remaining: d } }

    fn tick(&mut self, step: Duration) -> bool {
        match self.remaining.checked_sub(step) {
            Some(rest) => {
                self.remaining = rest;
                false
            }
            None => {
                self.remaining = Duration::ZERO;
                true
            }
        }
    }
}

/// Polls `ready` every `step`, reset-checking via `is_reset` each iteration,
/// until it returns `true` or `deadline` elapses. Every spin-wait site in
/// `firmware` goes through this instead of a bespoke loop, so the watchdog
/// reset behavior spec.md §5's Cancellation section describes is applied
/// uniformly.
pub fn wait_until<R, D>(mut deadline: Deadline, step: Duration, mut is_reset: R, mut ready: D) -> Result<(), Timeout>
where
    R: FnMut() -> bool,
    D: FnMut() -> bool,
{
    loop {
        if is_reset() {
            return Err(Timeout);
        }
        if ready() {
            return Ok(());
        }
        if deadline.tick(step) {
            return Err(Timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_immediately_succeeds_without_consuming_deadline() {
        let deadline = Deadline::after(Duration::from_millis(1));
        assert_eq!(wait_until(deadline, Duration::from_micros(1), || false, || true), Ok(()));
    }

    #[test]
    fn never_ready_times_out() {
        let deadline = Deadline::after(Duration::from_micros(10));
        assert_eq!(wait_until(deadline, Duration::from_micros(1), || false, || false), Err(Timeout));
    }

    #[test]
    fn reset_observed_before_ready_aborts_immediately() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(wait_until(deadline, Duration::from_micros(1), || true, || false), Err(Timeout));
    }
}
