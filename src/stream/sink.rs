// Typed subscriber with a stated concurrency mode
//
//   sync:   on() runs the handler inline, on the emitter's stack.
//   async:  on() writes into the embedded channel and schedules the sink
//           on its context; the context later drains the channel, one
//           handler call per value, in arrival order.
//
// Backpressure is silent loss: a full channel drops the value and counts
// it. A sink already scheduled does not enqueue itself again until it
// starts draining, so a burst costs one work-queue slot, not N.
//
// The handler lives in a critical-section cell and is taken out while it
// runs, so it is never called with interrupts masked. Finding it missing
// on delivery means a re-entrant call (a sync handler emitting into
// itself); that value is dropped and counted as busy. Finding it missing
// on drain means another drain is running; the sink schedules itself again
// if values are still buffered.

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering, fence};

use critical_section::Mutex;

use super::{Invoker, Requestable, Subscriber};
use crate::channel::BoundedChannel;
use crate::error::{ReadError, WriteError};
use crate::kernel::ExecutionContext;
use crate::stats;

type Handler<T> = Box<dyn FnMut(&T) + Send>;

pub struct Sink<T, const N: usize> {
    buffer: BoundedChannel<T, N>,
    handler: Mutex<RefCell<Option<Handler<T>>>>,
    handled: bool,
    last: Mutex<RefCell<Option<T>>>,
    context: Option<Arc<ExecutionContext>>,
    scheduled: AtomicBool,
    overflows: AtomicU32,
    me: Weak<Self>,
}

impl<T: Clone + Send + 'static, const N: usize> Sink<T, N> {
    /// Handler runs inline on whatever context emits.
    pub fn sync<F>(handler: F) -> Arc<Self>
    where
        F: FnMut(&T) + Send + 'static,
    {
        Self::build(None, Some(Box::new(handler)))
    }

    /// Handler runs on `context`, never on the emitter.
    pub fn async_on<F>(context: &Arc<ExecutionContext>, handler: F) -> Arc<Self>
    where
        F: FnMut(&T) + Send + 'static,
    {
        Self::build(Some(Arc::clone(context)), Some(Box::new(handler)))
    }

    /// A sink nobody attached a handler to. Values are logged and discarded.
    pub fn unhandled() -> Arc<Self> {
        Self::build(None, None)
    }

    fn build(context: Option<Arc<ExecutionContext>>, handler: Option<Handler<T>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            buffer: BoundedChannel::new(),
            handled: handler.is_some(),
            handler: Mutex::new(RefCell::new(handler)),
            last: Mutex::new(RefCell::new(None)),
            context,
            scheduled: AtomicBool::new(false),
            overflows: AtomicU32::new(0),
            me: me.clone(),
        })
    }

    pub fn is_async(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&Arc<ExecutionContext>> {
        self.context.as_ref()
    }

    /// Buffered values not yet handled. Advisory.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// The most recent value this sink accepted, handled yet or not.
    /// `None` until the first one arrives.
    pub fn last(&self) -> Option<T> {
        critical_section::with(|cs| self.last.borrow_ref(cs).clone())
    }

    fn remember(&self, value: &T) {
        critical_section::with(|cs| *self.last.borrow_ref_mut(cs) = Some(value.clone()));
    }

    /// Values dropped by this sink.
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }

    fn drop_value(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    fn discard_unhandled(&self) {
        log::warn!("no handler attached to sink {:p}, value discarded", self);
        stats::count_unhandled();
    }

    fn deliver_inline(&self, value: &T) {
        if !self.handled {
            self.discard_unhandled();
            return;
        }
        let taken = critical_section::with(|cs| self.handler.borrow_ref_mut(cs).take());
        let Some(mut handler) = taken else {
            log::trace!("re-entrant delivery into sink {:p} dropped", self);
            self.drop_value();
            stats::count_push_busy();
            return;
        };
        self.remember(value);
        handler(value);
        critical_section::with(|cs| *self.handler.borrow_ref_mut(cs) = Some(handler));
    }

    fn schedule(&self, context: &ExecutionContext) {
        // pairs with the fence in drain(): either we see the flag cleared
        // and enqueue, or the drain sees our write
        fence(Ordering::SeqCst);
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        if context.enqueue(me).is_err() {
            // the value stays buffered; the next arrival retries
            self.scheduled.store(false, Ordering::SeqCst);
        }
    }

    fn drain(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        if !self.handled {
            while self.buffer.read().is_ok() {
                self.discard_unhandled();
            }
            return;
        }

        let taken = critical_section::with(|cs| self.handler.borrow_ref_mut(cs).take());
        let Some(mut handler) = taken else {
            // another drain holds the handler; retry later so values
            // buffered after it stopped reading are not stranded
            stats::count_pop_busy();
            if let Some(context) = &self.context
                && !self.buffer.is_empty()
            {
                self.schedule(context);
            }
            return;
        };
        loop {
            match self.buffer.read() {
                Ok(value) => handler(&value),
                Err(ReadError::Empty) => break,
                Err(ReadError::Busy) => {
                    stats::count_pop_busy();
                    break;
                }
            }
        }
        critical_section::with(|cs| *self.handler.borrow_ref_mut(cs) = Some(handler));
    }
}

impl<T: Clone + Send + 'static, const N: usize> Subscriber<T> for Sink<T, N> {
    fn on(&self, value: &T) {
        let Some(context) = &self.context else {
            self.deliver_inline(value);
            return;
        };
        match self.buffer.write(value.clone()) {
            Ok(()) => {
                self.remember(value);
                self.schedule(context);
            }
            Err(WriteError::Full(_)) => {
                log::trace!("sink {:p} full, value dropped", self);
                self.drop_value();
                stats::count_channel_overflow();
            }
        }
    }
}

impl<T: Clone + Send + 'static, const N: usize> Invoker for Sink<T, N> {
    fn invoke(&self) {
        self.drain();
    }
}

impl<T: Clone + Send + 'static, const N: usize> Requestable for Sink<T, N> {
    fn request(&self) {
        self.drain();
    }
}
