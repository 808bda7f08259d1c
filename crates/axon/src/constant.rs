/// Scratch buffers allocated per attached accelerator device.
///
/// This is the observed ceiling on concurrent in-flight jobs the engine
/// accepts per device; the pool size caps submission concurrency at
/// `device_count * BUFFERS_PER_DEVICE`.
pub(crate) const BUFFERS_PER_DEVICE: usize = 10;

/// Capacity of the submit-to-wait and wait-to-receive handoff queues.
pub(crate) const QUEUE_CAPACITY: usize = 100;
