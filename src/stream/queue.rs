// Buffered pass-through: push in, pull out
//
// on() buffers (dropping when full); request() pops one value and emits
// it. Turns a bursty push stream into one paced by whoever requests,
// typically a timer or a Poller.

use core::sync::atomic::{AtomicU32, Ordering};

use super::{Publisher, Requestable, Source, Subscriber};
use crate::channel::BoundedChannel;
use crate::error::ReadError;
use crate::stats;

pub struct QueueSource<T, const N: usize> {
    queue: BoundedChannel<T, N>,
    source: Source<T>,
    overflows: AtomicU32,
}

impl<T: 'static, const N: usize> QueueSource<T, N> {
    pub fn new() -> Self {
        Self {
            queue: BoundedChannel::new(),
            source: Source::new(),
            overflows: AtomicU32::new(0),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl<T: 'static, const N: usize> Default for QueueSource<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, const N: usize> Publisher<T> for QueueSource<T, N> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T: Clone + Send + 'static, const N: usize> Subscriber<T> for QueueSource<T, N> {
    fn on(&self, value: &T) {
        if self.queue.write(value.clone()).is_err() {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            stats::count_channel_overflow();
        }
    }
}

impl<T: Send + 'static, const N: usize> Requestable for QueueSource<T, N> {
    fn request(&self) {
        match self.queue.read() {
            Ok(value) => self.source.emit(&value),
            Err(ReadError::Empty) => {}
            Err(ReadError::Busy) => stats::count_pop_busy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    #[test]
    fn only_buffered_items_come_out() {
        // five slots hold four values
        let q: QueueSource<u32, 5> = QueueSource::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        q.subscribe_fn(move |v| o.lock().unwrap().push(*v));

        for i in 0..6 {
            q.on(&i);
        }
        assert_eq!(q.pending(), 4);
        assert_eq!(q.overflows(), 2);

        for _ in 0..10 {
            q.request();
        }
        assert_eq!(*out.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn one_value_per_request() {
        let q: QueueSource<&'static str, 8> = QueueSource::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        q.subscribe_fn(move |v| o.lock().unwrap().push(*v));
        q.on(&"a");
        q.on(&"b");
        q.request();
        assert_eq!(*out.lock().unwrap(), ["a"]);
        q.on(&"c");
        q.request();
        q.request();
        assert_eq!(*out.lock().unwrap(), ["a", "b", "c"]);
        q.request();
        assert_eq!(out.lock().unwrap().len(), 3);
    }

    #[test]
    fn chained_behind_a_source() {
        let upstream: Source<u8> = Source::new();
        let q: Arc<QueueSource<u8, 4>> = Arc::new(QueueSource::new());
        let out = Arc::new(Mutex::new(Vec::new()));
        let o = out.clone();
        &*q >> crate::stream::Sink::<u8, 2>::sync(move |v| o.lock().unwrap().push(*v));
        &upstream >> q.clone();

        upstream.emit(&1);
        upstream.emit(&2);
        assert!(out.lock().unwrap().is_empty());
        q.request();
        assert_eq!(*out.lock().unwrap(), [1]);
    }
}
