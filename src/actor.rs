// Thread-affine component base
//
// An actor is bound to exactly one context for its whole life. Every
// sink and timer it creates through these helpers runs on that context,
// so state captured by its handlers is only ever touched from there.

use alloc::sync::Arc;

use crate::kernel::ExecutionContext;
use crate::stream::{Sink, TimerSource};

#[derive(Clone)]
pub struct Actor {
    context: Arc<ExecutionContext>,
}

impl Actor {
    pub fn new(context: &Arc<ExecutionContext>) -> Self {
        Self {
            context: Arc::clone(context),
        }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// An async sink on this actor's context.
    pub fn sink<T, const N: usize, F>(&self, handler: F) -> Arc<Sink<T, N>>
    where
        T: Clone + Send + 'static,
        F: FnMut(&T) + Send + 'static,
    {
        Sink::async_on(&self.context, handler)
    }

    /// A timer polled by this actor's context.
    pub fn timer(&self, id: u32, interval_ms: u32, repeat: bool) -> Arc<TimerSource> {
        TimerSource::new(&self.context, id, interval_ms, repeat)
    }
}
