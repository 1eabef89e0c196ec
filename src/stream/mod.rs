// Publish/subscribe primitives
//
// A Source delivers synchronously to its subscribers on the caller's
// stack. Crossing to another context is only ever done by a Sink bound
// to that context, which buffers and schedules itself as a work item.
//
//   producer --emit--> Source --on--> Sink(sync)  -> handler, inline
//                                 \-> Sink(async) -> channel -> context -> handler
//
// Subscriptions are permanent: components are wired once at startup and
// live for the whole process.

pub mod queue;
pub mod sink;
pub mod source;
pub mod timer;
pub mod value;

use alloc::sync::Arc;

pub use queue::QueueSource;
pub use sink::Sink;
pub use source::Source;
pub use timer::{TimerMsg, TimerSource};
pub use value::{LambdaSource, ValueSource};

pub trait Subscriber<T>: Send + Sync {
    fn on(&self, value: &T);
}

/// Something a context can run as a work item.
pub trait Invoker: Send + Sync {
    fn invoke(&self);
}

/// A pull-style source: `request()` makes it emit (or not) now.
pub trait Requestable: Send + Sync {
    fn request(&self);
}

/// Anything that owns a [`Source`] and can be subscribed to.
pub trait Publisher<T: 'static> {
    fn source(&self) -> &Source<T>;

    /// Append `subscriber`. Duplicates are delivered twice.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.source().push(subscriber);
    }

    /// Wire a closure as a synchronous sink.
    fn subscribe_fn<F>(&self, handler: F)
    where
        F: FnMut(&T) + Send + 'static,
        T: Clone + Send,
    {
        self.subscribe(Sink::<T, 2>::sync(handler));
    }
}

// `source >> sink`
macro_rules! impl_shr {
    ($ty:ty, $item:ty $(, $param:ident $(, const $cap:ident)?)?) => {
        impl<'a, S $(, $param $(, const $cap: usize)?)?> core::ops::Shr<Arc<S>> for &'a $ty
        where
            S: Subscriber<$item> + 'static,
            $($param: 'static,)?
        {
            type Output = ();

            fn shr(self, subscriber: Arc<S>) {
                <$ty as Publisher<$item>>::subscribe(self, subscriber);
            }
        }
    };
}

impl_shr!(Source<T>, T, T);
impl_shr!(ValueSource<T>, T, T);
impl_shr!(LambdaSource<T>, T, T);
impl_shr!(QueueSource<T, N>, T, T, const N);
impl_shr!(TimerSource, TimerMsg);
