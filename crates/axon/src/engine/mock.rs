use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;

use super::{Engine, JobHandle, NativeType, OutputDescriptor};
use crate::pool::ScratchBuffer;
use crate::tensor::TensorData;

/// Shape and type of one output the mock engine emits per job.
#[derive(Clone, Debug)]
pub struct MockOutputSpec {
    pub name: String,
    pub native_type: NativeType,
    pub shape: Vec<usize>,
}

impl MockOutputSpec {
    pub fn new(name: impl Into<String>, native_type: NativeType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            native_type,
            shape,
        }
    }

    fn byte_len(&self) -> usize {
        self.native_type.byte_size() * self.shape.iter().product::<usize>()
    }
}

/// A deterministic in-process engine for tests and examples.
///
/// Jobs complete after a fixed delay. Each output region is the job's
/// input bytes cycled to the output length, so a test can attribute
/// every received bundle to the submission that produced it. Failures
/// can be injected on the nth `submit` or `wait` call.
pub struct MockEngine {
    outputs: Vec<MockOutputSpec>,
    sizes: Vec<usize>,
    scratch_size: usize,
    devices: usize,
    delay: Duration,
    next_handle: AtomicU64,
    submit_calls: AtomicU64,
    wait_calls: AtomicU64,
    staged: Mutex<HashMap<u64, Vec<u8>>>,
    fail_submit_on: Mutex<HashSet<u64>>,
    fail_wait_on: Mutex<HashSet<u64>>,
}

impl MockEngine {
    pub fn new(outputs: Vec<MockOutputSpec>, devices: usize, delay: Duration) -> Self {
        let sizes: Vec<usize> = outputs.iter().map(MockOutputSpec::byte_len).collect();
        let scratch_size = sizes.iter().sum();
        Self {
            outputs,
            sizes,
            scratch_size,
            devices,
            delay,
            next_handle: AtomicU64::new(0),
            submit_calls: AtomicU64::new(0),
            wait_calls: AtomicU64::new(0),
            staged: Mutex::new(HashMap::new()),
            fail_submit_on: Mutex::new(HashSet::new()),
            fail_wait_on: Mutex::new(HashSet::new()),
        }
    }

    /// A single-device engine emitting one uint8 output.
    pub fn single_uint8(name: &str, shape: Vec<usize>, delay: Duration) -> Self {
        Self::new(
            vec![MockOutputSpec::new(name, NativeType::Uint8, shape)],
            1,
            delay,
        )
    }

    /// Make the `n`th call to `submit` fail (1-based).
    pub fn fail_on_nth_submit(&self, n: u64) {
        self.fail_submit_on.lock().unwrap().insert(n);
    }

    /// Make the `n`th call to `wait` fail (1-based).
    pub fn fail_on_nth_wait(&self, n: u64) {
        self.fail_wait_on.lock().unwrap().insert(n);
    }

    /// Number of `wait` calls observed so far.
    pub fn wait_calls(&self) -> u64 {
        self.wait_calls.load(Ordering::SeqCst)
    }

    /// Jobs submitted and not yet waited on.
    pub fn pending_jobs(&self) -> usize {
        self.staged.lock().unwrap().len()
    }

    fn descriptors(&self) -> Vec<OutputDescriptor> {
        let mut offset = 0;
        self.outputs
            .iter()
            .map(|spec| {
                let len = spec.byte_len();
                let descriptor = OutputDescriptor {
                    name: spec.name.clone(),
                    native_type: spec.native_type,
                    shape: spec.shape.clone(),
                    offset,
                    len,
                };
                offset += len;
                descriptor
            })
            .collect()
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn submit(
        &self,
        input: &TensorData,
        scratch: &mut ScratchBuffer,
    ) -> anyhow::Result<JobHandle> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_submit_on.lock().unwrap().contains(&call) {
            bail!("injected submit failure on call {call}");
        }
        if scratch.capacity() < self.scratch_size {
            bail!(
                "scratch buffer holds {} bytes, outputs need {}",
                scratch.capacity(),
                self.scratch_size
            );
        }

        let input_bytes = input.snapshot();
        let staged = if input_bytes.is_empty() {
            vec![0; self.scratch_size]
        } else {
            (0..self.scratch_size)
                .map(|i| input_bytes[i % input_bytes.len()])
                .collect()
        };

        let handle = JobHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.staged.lock().unwrap().insert(handle.raw(), staged);
        Ok(handle)
    }

    async fn wait(
        &self,
        handle: JobHandle,
        scratch: &mut ScratchBuffer,
    ) -> anyhow::Result<Vec<OutputDescriptor>> {
        tokio::time::sleep(self.delay).await;

        let call = self.wait_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let staged = self
            .staged
            .lock()
            .unwrap()
            .remove(&handle.raw())
            .ok_or_else(|| anyhow!("unknown job handle {}", handle.raw()))?;
        if self.fail_wait_on.lock().unwrap().contains(&call) {
            bail!("injected wait failure on call {call}");
        }

        scratch.as_mut_slice()[..self.scratch_size].copy_from_slice(&staged);
        Ok(self.descriptors())
    }

    fn output_scratch_size(&self) -> usize {
        self.scratch_size
    }

    fn output_tensor_sizes(&self) -> &[usize] {
        &self.sizes
    }

    fn device_count(&self) -> usize {
        self.devices
    }
}
