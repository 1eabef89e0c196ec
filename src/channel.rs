// Fixed-capacity ring buffer, many producers, one consumer at a time
//
// No allocation after construction, never blocks. One slot is always kept
// empty so full and empty are distinguishable from the cursors alone, so
// a channel of N slots holds N-1 values.
//
// Producers claim a slot by CAS on the write cursor, fill it, then mark it
// ready. Cursors count over a multiple of N rather than wrapping at N, so
// a producer stalled between its full check and its CAS cannot win
// against a cursor that went round the ring meanwhile. An ISR preempting a writer just claims the next slot. The consumer
// stops at the first slot not yet marked ready, which keeps claim order.
// Consumers are still claimed with a flag: a second one gets Busy.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{ReadError, WriteError};

pub struct BoundedChannel<T, const N: usize> {
    buf: [UnsafeCell<MaybeUninit<T>>; N],
    // set once a claimed slot holds its value, cleared when read
    ready: [AtomicBool; N],
    // next position to read, in [0, WRAP)
    read: AtomicUsize,
    // next position to claim, in [0, WRAP)
    write: AtomicUsize,
    reading: AtomicBool,
}

// SAFETY: a slot is written only by the producer whose CAS claimed it and
// read only by the consumer holding the read claim. The ready flag's
// release store / acquire load hands the slot from one to the other, the
// read cursor's release store hands it back.
unsafe impl<T: Send, const N: usize> Send for BoundedChannel<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for BoundedChannel<T, N> {}

impl<T, const N: usize> BoundedChannel<T, N> {
    pub const fn new() -> Self {
        const { assert!(N >= 2, "a channel needs at least two slots") };
        Self {
            buf: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
            ready: [const { AtomicBool::new(false) }; N],
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            reading: AtomicBool::new(false),
        }
    }

    const WRAP: usize = (usize::MAX / N) * N;

    #[inline]
    const fn advance(pos: usize) -> usize {
        if pos + 1 == Self::WRAP { 0 } else { pos + 1 }
    }

    #[inline]
    const fn distance(from: usize, to: usize) -> usize {
        if to >= from { to - from } else { Self::WRAP - from + to }
    }

    /// Non-blocking write. Safe from any number of producers, interrupt
    /// context included. Fails only when no slot is free.
    pub fn write(&self, value: T) -> Result<(), WriteError<T>> {
        // w is always loaded before r, so a full reading was true at some
        // instant
        let mut w = self.write.load(Ordering::Acquire);
        loop {
            let r = self.read.load(Ordering::Acquire);
            let len = Self::distance(r, w);
            if len == N - 1 {
                return Err(WriteError::Full(value));
            }
            if len > N - 1 {
                // our cursor is stale, the consumer already passed it
                w = self.write.load(Ordering::Acquire);
                continue;
            }
            match self.write.compare_exchange_weak(
                w,
                Self::advance(w),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => w = current,
            }
        }

        let slot = w % N;
        // SAFETY: the CAS gave us `slot` exclusively. It lies outside
        // [read, write) as seen by the consumer and its ready flag is clear.
        unsafe { (*self.buf[slot].get()).write(value) };
        self.ready[slot].store(true, Ordering::Release);
        Ok(())
    }

    /// Non-blocking read, oldest claimed value first. A slot claimed but not
    /// yet filled reads as Empty; its producer publishes it right after.
    pub fn read(&self) -> Result<T, ReadError> {
        if self
            .reading
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(ReadError::Busy);
        }

        let r = self.read.load(Ordering::Relaxed);
        let slot = r % N;
        if !self.ready[slot].load(Ordering::Acquire) {
            self.reading.store(false, Ordering::Release);
            return Err(ReadError::Empty);
        }

        // SAFETY: the ready flag was set by the producer after it
        // initialised `slot`; we hold the consumer claim.
        let value = unsafe { (*self.buf[slot].get()).assume_init_read() };
        self.ready[slot].store(false, Ordering::Relaxed);
        self.read.store(Self::advance(r), Ordering::Release);
        self.reading.store(false, Ordering::Release);
        Ok(value)
    }

    /// Claimed values, including any a producer is still filling.
    /// Advisory, may be stale under concurrent use.
    pub fn len(&self) -> usize {
        let r = self.read.load(Ordering::Acquire);
        let w = self.write.load(Ordering::Acquire);
        Self::distance(r, w).min(N - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Values that can still be written, `capacity() - len()`. The slot
    /// kept empty is not counted, so this is one less than the raw number
    /// of unused slots. Advisory, like `len`.
    pub fn space(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Values the channel can hold at once.
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

impl<T, const N: usize> Default for BoundedChannel<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for BoundedChannel<T, N> {
    fn drop(&mut self) {
        while self.read().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[test]
    fn fills_up_after_n_minus_one_writes() {
        let ch: BoundedChannel<u32, 4> = BoundedChannel::new();
        assert_eq!(ch.capacity(), 3);
        for i in 0..3 {
            assert!(ch.write(i).is_ok());
        }
        assert!(ch.is_full());
        assert_eq!(ch.space(), 0);
        assert_eq!(ch.write(99), Err(WriteError::Full(99)));
        assert_eq!(ch.read(), Ok(0));
        assert!(ch.write(3).is_ok());
    }

    #[test]
    fn read_until_empty() {
        let ch: BoundedChannel<&str, 2> = BoundedChannel::new();
        assert_eq!(ch.read(), Err(ReadError::Empty));
        ch.write("a").unwrap();
        assert_eq!(ch.len(), 1);
        assert_eq!(ch.read(), Ok("a"));
        assert_eq!(ch.read(), Err(ReadError::Empty));
        assert!(ch.is_empty());
    }

    #[test]
    fn fifo_with_read_after_every_second_write() {
        let ch: BoundedChannel<i32, 4> = BoundedChannel::new();
        let mut written = Vec::new();
        let mut read = Vec::new();
        for i in 0..10 {
            if ch.write(i).is_ok() {
                written.push(i);
            }
            if i % 2 == 1 {
                if let Ok(v) = ch.read() {
                    read.push(v);
                }
            }
        }
        while let Ok(v) = ch.read() {
            read.push(v);
        }
        assert_eq!(read, written);
        assert!(written.starts_with(&[0, 1, 2, 3, 4]));
    }

    #[test]
    fn drops_pending_values() {
        use alloc::sync::Arc;
        let tracked = Arc::new(());
        {
            let ch: BoundedChannel<Arc<()>, 4> = BoundedChannel::new();
            ch.write(tracked.clone()).unwrap();
            ch.write(tracked.clone()).unwrap();
            assert_eq!(Arc::strong_count(&tracked), 3);
        }
        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[test]
    fn producer_and_consumer_threads() {
        use alloc::sync::Arc;
        const COUNT: u32 = 20_000;
        let ch: Arc<BoundedChannel<u32, 16>> = Arc::new(BoundedChannel::new());

        let tx = ch.clone();
        let producer = std::thread::spawn(move || {
            let mut i = 0;
            while i < COUNT {
                match tx.write(i) {
                    Ok(()) => i += 1,
                    Err(_) => std::thread::yield_now(),
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            match ch.read() {
                Ok(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                Err(_) => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(ch.is_empty());
    }

    #[test]
    fn producer_mid_write_does_not_block_others() {
        let ch: BoundedChannel<u32, 8> = BoundedChannel::new();
        // a producer claimed slot 0 and was preempted before filling it
        ch.write.store(1, Ordering::Release);

        assert_eq!(ch.space(), 6);
        assert!(ch.write(1).is_ok());
        assert!(ch.write(2).is_ok());
        // claim order is kept: nothing comes out past the unfilled slot
        assert_eq!(ch.read(), Err(ReadError::Empty));

        unsafe { (*ch.buf[0].get()).write(0) };
        ch.ready[0].store(true, Ordering::Release);
        assert_eq!(ch.read(), Ok(0));
        assert_eq!(ch.read(), Ok(1));
        assert_eq!(ch.read(), Ok(2));
        assert_eq!(ch.read(), Err(ReadError::Empty));
    }

    #[test]
    fn cursors_cross_the_wrap_point() {
        let ch: BoundedChannel<u32, 3> = BoundedChannel::new();
        let wrap = BoundedChannel::<u32, 3>::WRAP;
        ch.read.store(wrap - 1, Ordering::Relaxed);
        ch.write.store(wrap - 1, Ordering::Relaxed);
        assert!(ch.is_empty());

        assert!(ch.write(1).is_ok());
        assert!(ch.write(2).is_ok());
        assert_eq!(ch.write(3), Err(WriteError::Full(3)));
        assert_eq!(ch.len(), 2);
        assert_eq!(ch.read(), Ok(1));
        assert_eq!(ch.read(), Ok(2));
        assert_eq!(ch.read.load(Ordering::Relaxed), 1);
        assert!(ch.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing_below_capacity() {
        use alloc::sync::Arc;
        use std::sync::Barrier;
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 15;

        for _ in 0..50 {
            let ch: Arc<BoundedChannel<usize, 64>> = Arc::new(BoundedChannel::new());
            let barrier = Arc::new(Barrier::new(PRODUCERS));
            let handles: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let (ch, barrier) = (ch.clone(), barrier.clone());
                    std::thread::spawn(move || {
                        barrier.wait();
                        (0..PER_PRODUCER)
                            .filter(|i| ch.write(p * 100 + i).is_ok())
                            .count()
                    })
                })
                .collect();
            let ok: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(ok, PRODUCERS * PER_PRODUCER);

            let mut seen = Vec::new();
            while let Ok(v) = ch.read() {
                seen.push(v);
            }
            assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
            // each producer's own values stay in order
            for p in 0..PRODUCERS {
                let mine: Vec<usize> = seen.iter().copied().filter(|v| v / 100 == p).collect();
                assert_eq!(mine, (0..PER_PRODUCER).map(|i| p * 100 + i).collect::<Vec<_>>());
            }
        }
    }

    proptest! {
        #[test]
        fn behaves_like_a_bounded_deque(ops in proptest::collection::vec(any::<Option<u8>>(), 0..200)) {
            let ch: BoundedChannel<u8, 5> = BoundedChannel::new();
            let mut model: VecDeque<u8> = VecDeque::new();
            for op in ops {
                match op {
                    Some(v) => {
                        let res = ch.write(v);
                        if model.len() < 4 {
                            prop_assert!(res.is_ok());
                            model.push_back(v);
                        } else {
                            prop_assert_eq!(res, Err(WriteError::Full(v)));
                        }
                    }
                    None => match model.pop_front() {
                        Some(v) => prop_assert_eq!(ch.read(), Ok(v)),
                        None => prop_assert_eq!(ch.read(), Err(ReadError::Empty)),
                    },
                }
                prop_assert_eq!(ch.len(), model.len());
            }
        }
    }
}
