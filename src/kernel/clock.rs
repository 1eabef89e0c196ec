// Monotonic millisecond clock, injected into contexts and timers
//
// Firmware uses SystemClock (embassy time driver). Hosts that need
// deterministic time, simulations and tests, drive a ManualClock.

use core::cell::Cell;

use critical_section::Mutex;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

// cs: no 64-bit atomics on the 32-bit targets this runs on
pub struct ManualClock {
    now: Mutex<Cell<u64>>,
}

impl ManualClock {
    pub const fn new(start_ms: u64) -> Self {
        Self {
            now: Mutex::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        critical_section::with(|cs| self.now.borrow(cs).set(ms));
    }

    pub fn advance(&self, ms: u64) {
        critical_section::with(|cs| {
            let now = self.now.borrow(cs);
            now.set(now.get().saturating_add(ms));
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        critical_section::with(|cs| self.now.borrow(cs).get())
    }
}
