use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::communication::{BoundedQueue, PushError};
use crate::constant::{BUFFERS_PER_DEVICE, QUEUE_CAPACITY};
use crate::core::completion::completion_loop;
use crate::core::job::{CompletedJob, JobRecord};
use crate::core::worker::WorkerHandle;
use crate::engine::{Engine, EngineFactory, OutputDescriptor};
use crate::error::{Result, RuntimeError, SendError};
use crate::pool::{ScratchBuffer, ScratchPool};
use crate::tensor::{Tensor, TensorBundle, TensorData};

/// The dispatch pipeline fronting one loaded model.
///
/// Producers call [`send_input`](Self::send_input), a dedicated
/// completion worker awaits the engine, and consumers call
/// [`receive_output`](Self::receive_output). Both entry points are safe
/// for concurrent callers; results come out in the order submissions
/// returned success.
///
/// Construction spawns the completion worker, so the runtime must be
/// created inside a Tokio runtime. Call [`shutdown`](Self::shutdown)
/// for orderly teardown; dropping without it cancels the worker but
/// skips the drain bookkeeping.
pub struct InferenceRuntime {
    engine: Arc<dyn Engine>,
    pool: Arc<ScratchPool>,
    in_flight: Arc<BoundedQueue<JobRecord>>,
    completed: Arc<BoundedQueue<CompletedJob>>,
    worker: tokio::sync::Mutex<WorkerHandle>,
    output_sizes: Vec<usize>,
    cancel: CancellationToken,
}

impl InferenceRuntime {
    /// Load a model file through `factory` and start the pipeline.
    pub fn load_model(path: impl AsRef<Path>, factory: &dyn EngineFactory) -> Result<Self> {
        let path = path.as_ref();
        if let Err(err) = std::fs::metadata(path) {
            return Err(RuntimeError::ModelLoadFailed {
                reason: format!("model file {} is not readable: {err}", path.display()),
            });
        }
        info!(path = %path.display(), "loading model");

        let engine = factory
            .load(path)
            .map_err(|err| RuntimeError::ModelLoadFailed {
                reason: format!("engine construction failed: {err:#}"),
            })?;
        Self::with_engine(engine)
    }

    /// Start the pipeline over an already constructed engine.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Result<Self> {
        let devices = engine.device_count();
        if devices == 0 {
            return Err(RuntimeError::ModelLoadFailed {
                reason: "engine reports no attached devices".into(),
            });
        }
        let scratch_size = engine.output_scratch_size();
        let output_sizes = engine.output_tensor_sizes().to_vec();

        let cancel = CancellationToken::new();
        let pool = ScratchPool::new(devices * BUFFERS_PER_DEVICE, scratch_size, cancel.clone())
            .map_err(|err| RuntimeError::ModelLoadFailed {
                reason: format!("scratch pool initialization failed: {err}"),
            })?;
        let pool = Arc::new(pool);
        let in_flight = Arc::new(BoundedQueue::new(QUEUE_CAPACITY, cancel.clone()));
        let completed = Arc::new(BoundedQueue::new(QUEUE_CAPACITY, cancel.clone()));

        let worker = WorkerHandle::new(cancel.clone(), {
            let engine = engine.clone();
            let in_flight = in_flight.clone();
            let completed = completed.clone();
            let pool = pool.clone();
            move || tokio::spawn(completion_loop(engine, in_flight, completed, pool))
        });

        info!(
            devices,
            scratch_size,
            outputs = output_sizes.len(),
            pool_capacity = pool.capacity(),
            "inference runtime ready"
        );
        Ok(Self {
            engine,
            pool,
            in_flight,
            completed,
            worker: tokio::sync::Mutex::new(worker),
            output_sizes,
            cancel,
        })
    }

    /// Submit one input bundle for inference.
    ///
    /// The bundle must hold exactly one tensor. Suspends for
    /// backpressure when every scratch buffer is in flight or the
    /// submit queue is full. Ownership of the bundle transfers to the
    /// pipeline only on success; every failure hands it back inside
    /// [`SendError`].
    pub async fn send_input(&self, input: TensorBundle) -> std::result::Result<(), SendError> {
        if input.len() != 1 {
            let error = RuntimeError::InvalidShape(format!(
                "expected exactly 1 input tensor, got {}",
                input.len()
            ));
            return Err(SendError::new(input, error));
        }

        let mut scratch = match self.pool.checkout().await {
            Ok(buffer) => buffer,
            Err(err) => return Err(SendError::new(input, err)),
        };

        let handle = match self
            .engine
            .submit(input.tensors()[0].data(), &mut scratch)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                self.pool.give_back(scratch);
                return Err(SendError::new(input, RuntimeError::SubmissionFailed(err)));
            }
        };

        let record = JobRecord {
            handle,
            scratch,
            input,
        };
        if let Err(PushError(record)) = self.in_flight.push(record).await {
            let JobRecord { scratch, input, .. } = record;
            self.pool.give_back(scratch);
            return Err(SendError::new(input, RuntimeError::ShuttingDown));
        }
        Ok(())
    }

    /// Retrieve the next completed bundle, waiting up to `timeout`.
    ///
    /// Returns [`RuntimeError::NoResult`] when the timeout elapses or
    /// when shutdown has drained the pipeline. The returned bundle is
    /// owned by the caller.
    pub async fn receive_output(&self, timeout: Duration) -> Result<TensorBundle> {
        let job = match self.completed.pop_timeout(timeout).await {
            Ok(Some(job)) => job,
            Ok(None) | Err(_) => return Err(RuntimeError::NoResult),
        };
        let CompletedJob {
            descriptors,
            scratch,
        } = job;

        let bundle = self.materialize(&descriptors, &scratch);
        self.pool.give_back(scratch);
        let bundle = bundle?;
        debug!(tensors = bundle.len(), "delivering output bundle");
        Ok(bundle)
    }

    /// Build a portable bundle from the staged outputs of one job.
    ///
    /// The engine-reported per-output sizes are authoritative for how
    /// many bytes each slot copies; a descriptor disagreeing with them
    /// or running outside the scratch region is engine misbehavior.
    fn materialize(
        &self,
        descriptors: &[OutputDescriptor],
        scratch: &ScratchBuffer,
    ) -> Result<TensorBundle> {
        if descriptors.len() != self.output_sizes.len() {
            return Err(RuntimeError::CompletionFailed(anyhow!(
                "engine yielded {} output descriptors, model reports {}",
                descriptors.len(),
                self.output_sizes.len()
            )));
        }

        let mut tensors = Vec::with_capacity(descriptors.len());
        for (descriptor, &size) in descriptors.iter().zip(&self.output_sizes) {
            let end = descriptor
                .offset
                .checked_add(size)
                .filter(|&end| end <= scratch.capacity())
                .ok_or_else(|| {
                    RuntimeError::CompletionFailed(anyhow!(
                        "descriptor '{}' addresses bytes outside the scratch buffer",
                        descriptor.name
                    ))
                })?;
            let data = TensorData::from_vec(scratch.as_slice()[descriptor.offset..end].to_vec());
            let tensor = Tensor::new(
                descriptor.name.clone(),
                descriptor.native_type.to_element_type(),
                descriptor.shape.clone(),
                data,
            )
            .map_err(|err| {
                RuntimeError::CompletionFailed(anyhow!(
                    "descriptor '{}' disagrees with the reported output size: {err}",
                    descriptor.name
                ))
            })?;
            tensors.push(tensor);
        }
        Ok(TensorBundle::from_tensors(tensors))
    }

    /// Tear the pipeline down, releasing every resource exactly once.
    ///
    /// Cancels all suspended waits, joins the completion worker, drains
    /// both queues, and frees the scratch pool. Safe to call twice; the
    /// second call is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down inference runtime");
        self.cancel.cancel();
        self.worker.lock().await.shutdown().await;

        for job in self.in_flight.drain() {
            drop(job.input);
            self.pool.forget(job.scratch);
        }
        for job in self.completed.drain() {
            self.pool.forget(job.scratch);
        }
        let freed = self.pool.drain();
        debug!(freed, "scratch pool drained");
        info!("inference runtime shut down");
        Ok(())
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn pool_available(&self) -> usize {
        self.pool.available()
    }

    pub fn pool_outstanding(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Scratch bytes one job's outputs occupy.
    pub fn output_scratch_size(&self) -> usize {
        self.pool.buffer_size()
    }
}

impl Drop for InferenceRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
