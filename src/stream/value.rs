// Property-style sources
//
// ValueSource: holds the last value; set() stores and emits, get() just
// reads. request() re-emits the current value, so a poller can republish
// properties that rarely change.
//
// LambdaSource: pull-only; request() evaluates the closure and emits the
// result. For readings with a cost (free heap, uptime).

use alloc::boxed::Box;
use core::cell::RefCell;

use critical_section::Mutex;

use super::{Publisher, Requestable, Source};

pub struct ValueSource<T> {
    value: Mutex<RefCell<T>>,
    source: Source<T>,
}

impl<T: Clone + Send + 'static> ValueSource<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(RefCell::new(initial)),
            source: Source::new(),
        }
    }

    pub fn set(&self, value: T) {
        critical_section::with(|cs| *self.value.borrow_ref_mut(cs) = value.clone());
        self.source.emit(&value);
    }

    pub fn get(&self) -> T {
        critical_section::with(|cs| self.value.borrow_ref(cs).clone())
    }
}

impl<T: Clone + Send + Default + 'static> Default for ValueSource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Publisher<T> for ValueSource<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T: Clone + Send + 'static> Requestable for ValueSource<T> {
    fn request(&self) {
        let value = self.get();
        self.source.emit(&value);
    }
}

pub struct LambdaSource<T> {
    producer: Box<dyn Fn() -> T + Send + Sync>,
    source: Source<T>,
}

impl<T: 'static> LambdaSource<T> {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            producer: Box::new(producer),
            source: Source::new(),
        }
    }
}

impl<T: 'static> Publisher<T> for LambdaSource<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T: 'static> Requestable for LambdaSource<T> {
    fn request(&self) {
        let value = (self.producer)();
        self.source.emit(&value);
    }
}
