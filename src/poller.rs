// Round-robin publisher cadence
//
// Telemetry properties are pull sources (ValueSource, LambdaSource,
// QueueSource). A Poller requests one of them per tick, cycling through
// the list, so a slow link sees a steady trickle instead of a burst of
// every property at once. Nothing is requested while disconnected.
//
// Ticks and the connection flag both arrive through async sinks on the
// poller's own context, so requests always run there.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::actor::Actor;
use crate::kernel::ExecutionContext;
use crate::registry::Registry;
use crate::stream::{Publisher, Requestable, Sink, TimerMsg, TimerSource};

pub const POLLER_TIMER_ID: u32 = 1;

pub struct Poller {
    actor: Actor,
    timer: Arc<TimerSource>,
    targets: Arc<Registry<Arc<dyn Requestable>>>,
    connected: Arc<Sink<bool, 2>>,
}

impl Poller {
    pub fn new(context: &Arc<ExecutionContext>, interval_ms: u32) -> Self {
        let actor = Actor::new(context);
        let timer = actor.timer(POLLER_TIMER_ID, interval_ms, true);
        let targets: Arc<Registry<Arc<dyn Requestable>>> = Arc::new(Registry::new());

        let online = Arc::new(AtomicBool::new(false));
        let flag = online.clone();
        let connected = actor.sink::<bool, 2, _>(move |up: &bool| flag.store(*up, Ordering::Relaxed));

        let list = targets.clone();
        let mut next = 0usize;
        let ticks = actor.sink::<TimerMsg, 2, _>(move |_| {
            if !online.load(Ordering::Relaxed) {
                return;
            }
            let targets = list.snapshot();
            if targets.is_empty() {
                return;
            }
            targets[next % targets.len()].request();
            next = next.wrapping_add(1);
        });
        timer.subscribe(ticks);

        Self {
            actor,
            timer,
            targets,
            connected,
        }
    }

    /// Add a target to the rotation. Chainable.
    pub fn add(&self, target: Arc<dyn Requestable>) -> &Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feed the link state in here, e.g. `mqtt.connected >> poller.connected()`.
    pub fn connected(&self) -> Arc<Sink<bool, 2>> {
        self.connected.clone()
    }

    pub fn set_interval(&self, interval_ms: u32) {
        self.timer.set_interval(interval_ms);
    }

    pub fn interval(&self) -> u32 {
        self.timer.interval()
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        self.actor.context()
    }
}
