// Task queue: envelope decoding, consumers and the dispatcher loop

pub mod consumer;
pub mod jobs;
pub mod workers;

#[cfg(test)]
pub(crate) mod memory;

pub use consumer::{JobQueue, RedisQueue};
pub use jobs::{EnvelopeError, Task};
pub use workers::{Dispatcher, DispatcherConfig, DispatcherStats, HandlerSet, StatsSnapshot};
