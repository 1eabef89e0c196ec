// Execution contexts, their clock, and the host-side executor
// One context = one cooperative strand. Contexts run independently of
// each other: as embassy tasks on firmware, as OS threads on a host.

pub mod clock;
pub mod context;
#[cfg(feature = "std")]
pub mod wake;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ContextConfig, ExecutionContext, WORK_QUEUE_CAPACITY, WorkItem};
#[cfg(feature = "std")]
pub use wake::block_on;
