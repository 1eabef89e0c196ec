// Drop classes of the runtime
//
// Nothing here is fatal. The primitives return these; the layers above
// (Sink, QueueSource, ExecutionContext) turn them into counted drops so
// emitters never see backpressure.

use core::fmt;

/// A value could not be written into a [`BoundedChannel`](crate::BoundedChannel).
/// Carries the rejected value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WriteError<T> {
    /// No free slot.
    Full(T),
}

impl<T> WriteError<T> {
    pub fn into_inner(self) -> T {
        match self {
            WriteError::Full(v) => v,
        }
    }
}

impl<T> fmt::Debug for WriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Full(_) => f.write_str("Full(..)"),
        }
    }
}

impl<T> fmt::Display for WriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Full(_) => write!(f, "channel full, value dropped"),
        }
    }
}

impl<T> core::error::Error for WriteError<T> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// Nothing pending. Normal, not worth logging.
    Empty,
    /// Another consumer is mid-read on the same channel.
    Busy,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Empty => write!(f, "channel empty"),
            ReadError::Busy => write!(f, "channel busy, concurrent read"),
        }
    }
}

impl core::error::Error for ReadError {}

/// The work queue of an execution context is full; the work item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Overflow,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::Overflow => write!(f, "work queue full, item dropped"),
        }
    }
}

impl core::error::Error for EnqueueError {}
