// Pollable expiry source
//
// Two states: armed (expiry = a concrete instant) and disarmed (expiry =
// DISARMED, never reached). Nothing fires by itself; whoever polls calls
// request(), normally the context the timer is attached to, so timer
// messages are serialized with the rest of that context's callbacks.
//
// A repeating timer re-arms from the time it was seen expired, not from
// the missed expiry: after a long stall it fires once, not in a burst.

use alloc::sync::Arc;
use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use super::{Publisher, Requestable, Source};
use crate::kernel::{Clock, ExecutionContext};

const DISARMED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerMsg {
    pub id: u32,
}

pub struct TimerSource {
    id: u32,
    interval: AtomicU32,
    repeat: bool,
    // cs: no 64-bit atomics on the 32-bit targets
    expiry: Mutex<Cell<u64>>,
    clock: Arc<dyn Clock>,
    source: Source<TimerMsg>,
}

impl TimerSource {
    /// Create a timer polled by `context`. A repeating timer is armed
    /// immediately; a one-shot waits for [`start`](Self::start).
    pub fn new(context: &ExecutionContext, id: u32, interval_ms: u32, repeat: bool) -> Arc<Self> {
        let timer = Self::detached(Arc::clone(context.clock()), id, interval_ms, repeat);
        context.attach_timer(&timer);
        log::info!(
            "timer {} on '{}': {} ms{}",
            id,
            context.name(),
            interval_ms,
            if repeat { ", repeating" } else { "" }
        );
        timer
    }

    /// A timer nobody polls yet. Attach it to a context or call
    /// [`request`](Requestable::request) from an external poller.
    pub fn detached(clock: Arc<dyn Clock>, id: u32, interval_ms: u32, repeat: bool) -> Arc<Self> {
        let timer = Arc::new(Self {
            id,
            interval: AtomicU32::new(interval_ms),
            repeat,
            expiry: Mutex::new(Cell::new(DISARMED)),
            clock,
            source: Source::new(),
        });
        if repeat {
            timer.start();
        }
        timer
    }

    pub fn attach(self: &Arc<Self>, context: &ExecutionContext) {
        context.attach_timer(self);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn interval(&self) -> u32 {
        self.interval.load(Ordering::Relaxed)
    }

    /// Takes effect at the next (re)arm.
    pub fn set_interval(&self, interval_ms: u32) {
        self.interval.store(interval_ms, Ordering::Relaxed);
    }

    /// Arm: expire `interval` from now.
    pub fn start(&self) {
        let expiry = self.clock.now_ms().saturating_add(u64::from(self.interval()));
        critical_section::with(|cs| self.expiry.borrow(cs).set(expiry));
    }

    /// Disarm.
    pub fn stop(&self) {
        critical_section::with(|cs| self.expiry.borrow(cs).set(DISARMED));
    }

    /// Absolute expiry in clock milliseconds, `None` while disarmed.
    pub fn expiry(&self) -> Option<u64> {
        let expiry = critical_section::with(|cs| self.expiry.borrow(cs).get());
        (expiry != DISARMED).then_some(expiry)
    }

    pub fn is_armed(&self) -> bool {
        self.expiry().is_some()
    }
}

impl Publisher<TimerMsg> for TimerSource {
    fn source(&self) -> &Source<TimerMsg> {
        &self.source
    }
}

impl Requestable for TimerSource {
    fn request(&self) {
        let now = self.clock.now_ms();
        let interval = self.interval();
        let fired = critical_section::with(|cs| {
            let expiry = self.expiry.borrow(cs);
            if expiry.get() == DISARMED || now < expiry.get() {
                return false;
            }
            expiry.set(if self.repeat {
                now.saturating_add(u64::from(interval))
            } else {
                DISARMED
            });
            true
        });

        if fired {
            log::debug!("timer {} triggered ({} ms)", self.id, interval);
            self.source.emit(&TimerMsg { id: self.id });
        }
    }
}
