// Execution context: one cooperative strand with a work queue and timers
//
// Anything, including an ISR, may enqueue a work item. The strand takes
// items one at a time, waits for the next with a bounded timeout and
// polls every attached timer once per iteration whether or not an item
// arrived, so periodic timers keep running under load and in silence.
//
// The wait is cut short at the nearest armed timer expiry and never
// exceeds `max_wait`.

use alloc::format;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};

use crate::error::EnqueueError;
use crate::kernel::clock::{Clock, SystemClock};
use crate::registry::Registry;
use crate::stats;
use crate::stream::{Invoker, Requestable, TimerSource};

/// Slots in each context's work queue.
pub const WORK_QUEUE_CAPACITY: usize = 20;

/// Upper bound on how long a context blocks waiting for work.
pub const DEFAULT_MAX_WAIT_MS: u64 = 100;

/// A deferred, one-shot invocation handed to a context.
pub type WorkItem = Arc<dyn Invoker>;

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    name: Option<&'static str>,
    max_wait: Duration,
}

impl ContextConfig {
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

pub struct ExecutionContext {
    name: String,
    queue: Channel<CriticalSectionRawMutex, WorkItem, WORK_QUEUE_CAPACITY>,
    timers: Registry<Weak<TimerSource>>,
    clock: Arc<dyn Clock>,
    max_wait: Duration,
    // the strand: at most one caller drives this context at a time
    busy: AtomicBool,
    overflows: AtomicU32,
}

// Releases the strand on every exit path, including a dropped future.
struct Strand<'a>(&'a AtomicBool);

impl<'a> Strand<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Strand(flag))
    }
}

impl Drop for Strand<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExecutionContext {
    pub fn new(config: ContextConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ContextConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let name = match config.name {
            Some(name) => String::from(name),
            None => format!("context-{}", id),
        };
        log::info!("context '{}' created", name);

        Arc::new(Self {
            name,
            queue: Channel::new(),
            timers: Registry::new(),
            clock,
            max_wait: config.max_wait,
            busy: AtomicBool::new(false),
            overflows: AtomicU32::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Hand a work item to this context. Interrupt safe, never blocks.
    /// A full queue drops the item and counts it.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), EnqueueError> {
        match self.queue.try_send(item) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                stats::count_work_queue_overflow();
                Err(EnqueueError::Overflow)
            }
        }
    }

    /// Work items waiting. Advisory.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Work items dropped because the queue was full.
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Poll `timer` on every iteration of this context. The context only
    /// holds a weak reference; a dropped timer is pruned.
    pub fn attach_timer(&self, timer: &Arc<TimerSource>) {
        self.timers.push(Arc::downgrade(timer));
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// `request()` every attached timer once.
    pub fn poll_timers(&self) {
        let mut dead = 0;
        for timer in self.timers.snapshot().iter() {
            match timer.upgrade() {
                Some(timer) => timer.request(),
                None => dead += 1,
            }
        }
        if dead > 0 {
            log::debug!("context '{}': pruning {} dropped timers", self.name, dead);
            self.timers.retain(|t| t.strong_count() > 0);
        }
    }

    // time until the nearest armed timer, capped at max_wait
    fn next_wait(&self) -> Duration {
        let now = self.clock.now_ms();
        let mut wait = self.max_wait.as_millis();
        for timer in self.timers.snapshot().iter() {
            if let Some(expiry) = timer.upgrade().and_then(|t| t.expiry()) {
                wait = wait.min(expiry.saturating_sub(now));
            }
        }
        Duration::from_millis(wait)
    }

    /// One non-blocking iteration: run at most one queued item, then poll
    /// the timers. Returns whether an item ran.
    pub fn poll_once(&self) -> bool {
        let Some(_strand) = Strand::claim(&self.busy) else {
            log::warn!("context '{}' is already being driven", self.name);
            return false;
        };

        let ran = match self.queue.try_receive() {
            Ok(item) => {
                item.invoke();
                true
            }
            Err(_) => false,
        };
        self.poll_timers();
        ran
    }

    /// One blocking iteration: wait up to the bounded timeout for an item,
    /// run it, then poll the timers. If another caller is driving the
    /// context, sleeps for `max_wait` instead so that caller can progress.
    pub async fn step(&self) {
        let Some(_strand) = Strand::claim(&self.busy) else {
            log::warn!("context '{}' is already being driven", self.name);
            Timer::after(self.max_wait).await;
            return;
        };

        let wait = self.next_wait();
        if let Either::First(item) = select(self.queue.receive(), Timer::after(wait)).await {
            item.invoke();
        }
        self.poll_timers();
    }

    /// The context loop. Spawn as an embassy task on firmware, or use
    /// [`ExecutionContext::start`] on a host.
    pub async fn run(&self) -> ! {
        log::info!("context '{}' running", self.name);
        loop {
            self.step().await;
        }
    }

    /// Run the loop on a dedicated OS thread named after the context.
    #[cfg(feature = "std")]
    pub fn start(self: &Arc<Self>) -> std::io::Result<std::thread::JoinHandle<()>> {
        let ctx = Arc::clone(self);
        std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                crate::kernel::block_on(ctx.run());
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ManualClock;
    use crate::stream::Publisher;
    use core::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl Invoker for Counter {
        fn invoke(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter(AtomicUsize::new(0)))
    }

    #[test]
    fn names() {
        let named = ExecutionContext::new(ContextConfig::default().with_name("mqtt"));
        assert_eq!(named.name(), "mqtt");
        let anon = ExecutionContext::new(ContextConfig::default());
        assert!(anon.name().starts_with("context-"));
    }

    #[test]
    fn runs_items_in_enqueue_order() {
        let ctx = ExecutionContext::new(ContextConfig::default());
        let log = Arc::new(std::sync::Mutex::new(alloc::vec::Vec::new()));

        struct Tagged(u32, Arc<std::sync::Mutex<alloc::vec::Vec<u32>>>);
        impl Invoker for Tagged {
            fn invoke(&self) {
                self.1.lock().unwrap().push(self.0);
            }
        }

        for tag in 0..5 {
            ctx.enqueue(Arc::new(Tagged(tag, log.clone()))).unwrap();
        }
        assert_eq!(ctx.pending(), 5);
        while ctx.poll_once() {}
        assert_eq!(*log.lock().unwrap(), [0, 1, 2, 3, 4]);
        assert_eq!(ctx.pending(), 0);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let ctx = ExecutionContext::new(ContextConfig::default());
        let item = counter();
        for _ in 0..WORK_QUEUE_CAPACITY {
            ctx.enqueue(item.clone()).unwrap();
        }
        assert_eq!(ctx.enqueue(item.clone()), Err(EnqueueError::Overflow));
        assert_eq!(ctx.enqueue(item.clone()), Err(EnqueueError::Overflow));
        assert_eq!(ctx.overflows(), 2);

        while ctx.poll_once() {}
        assert_eq!(item.0.load(Ordering::SeqCst), WORK_QUEUE_CAPACITY);
    }

    #[test]
    fn timers_polled_without_work() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = ExecutionContext::with_clock(ContextConfig::default(), clock.clone());
        let timer = TimerSource::new(&ctx, 3, 100, true);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer.subscribe_fn(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!ctx.poll_once());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        clock.set(100);
        assert!(!ctx.poll_once());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timers_polled_alongside_work() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = ExecutionContext::with_clock(ContextConfig::default(), clock.clone());
        let timer = TimerSource::new(&ctx, 1, 10, true);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timer.subscribe_fn(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let item = counter();
        for _ in 0..5 {
            ctx.enqueue(item.clone()).unwrap();
        }
        for _ in 0..5 {
            clock.advance(10);
            assert!(ctx.poll_once());
        }
        assert_eq!(item.0.load(Ordering::SeqCst), 5);
        assert_eq!(fired.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn dropped_timers_are_pruned() {
        let ctx = ExecutionContext::new(ContextConfig::default());
        let keep = TimerSource::new(&ctx, 1, 1000, true);
        {
            let _gone = TimerSource::new(&ctx, 2, 1000, true);
            assert_eq!(ctx.timer_count(), 2);
        }
        ctx.poll_timers();
        assert_eq!(ctx.timer_count(), 1);
        drop(keep);
    }

    #[test]
    fn wait_is_cut_at_next_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = ExecutionContext::with_clock(
            ContextConfig::default().with_max_wait(Duration::from_millis(500)),
            clock.clone(),
        );
        assert_eq!(ctx.next_wait(), Duration::from_millis(500));
        let timer = TimerSource::new(&ctx, 1, 40, true);
        assert_eq!(ctx.next_wait(), Duration::from_millis(40));
        clock.set(55);
        assert_eq!(ctx.next_wait(), Duration::from_millis(0));
        timer.stop();
        assert_eq!(ctx.next_wait(), Duration::from_millis(500));
    }

    #[test]
    fn step_returns_after_bounded_wait() {
        let ctx = ExecutionContext::new(
            ContextConfig::default().with_max_wait(Duration::from_millis(5)),
        );
        crate::kernel::block_on(ctx.step());
        assert_eq!(ctx.pending(), 0);
    }

    #[test]
    fn second_driver_yields_to_the_first() {
        let ctx = ExecutionContext::new(
            ContextConfig::default().with_max_wait(Duration::from_millis(10)),
        );
        let (tx, rx) = std::sync::mpsc::channel();
        let c = ctx.clone();
        std::thread::spawn(move || {
            // run() never finishes, so this returns only once step() does
            crate::kernel::block_on(select(c.step(), c.run()));
            let _ = tx.send(());
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(2)), Ok(()));
    }

    #[test]
    fn started_context_drains_from_other_thread() {
        let ctx = ExecutionContext::new(ContextConfig::default().with_name("worker"));
        let item = counter();
        let _handle = ctx.start().unwrap();
        for _ in 0..10 {
            while ctx.enqueue(item.clone()).is_err() {
                std::thread::yield_now();
            }
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while item.0.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(item.0.load(Ordering::SeqCst), 10);
    }
}
