// Typed multicast emitter
//
// emit() calls on() of every subscriber, in subscription order, on the
// caller's stack. It never buffers and never changes context; that is
// the job of an async Sink among the subscribers.

use alloc::sync::Arc;

use super::{Publisher, Subscriber};
use crate::registry::Registry;

pub struct Source<T> {
    subscribers: Registry<Arc<dyn Subscriber<T>>>,
}

impl<T: 'static> Source<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Registry::new(),
        }
    }

    pub(crate) fn push(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.subscribers.push(subscriber);
    }

    pub fn emit(&self, value: &T) {
        for subscriber in self.subscribers.snapshot().iter() {
            subscriber.on(value);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: 'static> Default for Source<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Publisher<T> for Source<T> {
    fn source(&self) -> &Source<T> {
        self
    }
}
