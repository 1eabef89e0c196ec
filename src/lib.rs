// Reactive dataflow runtime for small control firmware
//
// Components talk through typed sources and sinks. Each component's
// state is touched only on its own execution context, even when values
// come from interrupts or other contexts: async sinks buffer and hand
// themselves to their context's work queue, timers are polled by the
// context loop.
//
// no_std + alloc on firmware; the default `std` feature runs contexts
// on OS threads for hosts and tests.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(all(test, not(feature = "std")))]
extern crate std;

pub mod actor;
pub mod channel;
pub mod error;
pub mod kernel;
pub mod poller;
mod registry;
pub mod stats;
pub mod stream;

pub use actor::Actor;
pub use channel::BoundedChannel;
pub use error::{EnqueueError, ReadError, WriteError};
pub use kernel::{Clock, ContextConfig, ExecutionContext, ManualClock, SystemClock, WorkItem};
pub use poller::Poller;
pub use stream::{
    Invoker, LambdaSource, Publisher, QueueSource, Requestable, Sink, Source, Subscriber,
    TimerMsg, TimerSource, ValueSource,
};
