//! Configuration constants for the runtime.
//!
//! Tunables live here as named constants instead of process-global mutable
//! state (no `setdefaulttimeout`-style global).

/// Initial capacity for the task table, to reduce reallocation during startup.
pub const INITIAL_TASK_QUEUE_CAPACITY: usize = 128;

/// Expected number of timers expiring in a single tick, used to size the
/// scratch `Vec` the timer heaps drain into.
pub const EXPECTED_WAKEUP_COUNT: usize = 16;

/// Default backend polling resolution, used whenever the scheduler has
/// pending I/O registrations but no active tasks and no timer to bound the
/// wait.
pub const DEFAULT_POLL_RESOLUTION_MS: u64 = 20;

/// Default operation timeout applied when a caller doesn't specify one
/// explicitly. `None` here means "no default" (operations block forever
/// unless given an explicit timeout).
pub const DEFAULT_OPERATION_TIMEOUT_MS: Option<u64> = None;

/// Default buffer size used by the pooled buffer allocator for socket reads.
pub const BUFFER_SIZE: usize = 4096;

/// Maximum number of buffers kept per thread-local pool before excess
/// buffers are simply dropped.
pub const BUFFER_POOL_SIZE: usize = 100;

/// Size of the batch scratch buffer backends use to drain kernel-reported
/// readiness events per `run()` call.
pub const EVENT_BATCH_SIZE: usize = 256;
