//! Handoff queues connecting the pipeline stages.

mod queue;

pub(crate) use queue::{BoundedQueue, PushError};
