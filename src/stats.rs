// Process-wide drop counters
//
// Every silent drop in the runtime bumps one of these. They are plain
// relaxed atomics so the interrupt-safe enqueue path can count without
// taking a critical section. Per-object counters live on the objects
// themselves (Sink, QueueSource, ExecutionContext); these are the sums.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

static CHANNEL_OVERFLOW: AtomicU32 = AtomicU32::new(0);
static CHANNEL_PUSH_BUSY: AtomicU32 = AtomicU32::new(0);
static CHANNEL_POP_BUSY: AtomicU32 = AtomicU32::new(0);
static WORK_QUEUE_OVERFLOW: AtomicU32 = AtomicU32::new(0);
static UNHANDLED: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub channel_overflow: u32,
    pub channel_push_busy: u32,
    pub channel_pop_busy: u32,
    pub work_queue_overflow: u32,
    pub unhandled: u32,
}

impl Stats {
    pub fn total_drops(&self) -> u32 {
        self.channel_overflow
            .wrapping_add(self.channel_push_busy)
            .wrapping_add(self.work_queue_overflow)
            .wrapping_add(self.unhandled)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ovfl: {} busyPush: {} busyPop: {} workQovfl: {} unhandled: {}",
            self.channel_overflow,
            self.channel_push_busy,
            self.channel_pop_busy,
            self.work_queue_overflow,
            self.unhandled
        )
    }
}

#[inline]
pub(crate) fn count_channel_overflow() {
    CHANNEL_OVERFLOW.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn count_push_busy() {
    CHANNEL_PUSH_BUSY.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn count_pop_busy() {
    CHANNEL_POP_BUSY.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn count_work_queue_overflow() {
    WORK_QUEUE_OVERFLOW.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn count_unhandled() {
    UNHANDLED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> Stats {
    Stats {
        channel_overflow: CHANNEL_OVERFLOW.load(Ordering::Relaxed),
        channel_push_busy: CHANNEL_PUSH_BUSY.load(Ordering::Relaxed),
        channel_pop_busy: CHANNEL_POP_BUSY.load(Ordering::Relaxed),
        work_queue_overflow: WORK_QUEUE_OVERFLOW.load(Ordering::Relaxed),
        unhandled: UNHANDLED.load(Ordering::Relaxed),
    }
}
