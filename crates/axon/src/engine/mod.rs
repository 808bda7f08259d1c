//! The seam between the dispatch pipeline and the accelerator.
//!
//! The runtime only ever talks to the device through the [`Engine`]
//! trait, which keeps the pipeline testable against [`MockEngine`] and
//! retargetable to any native inference library that exposes an
//! asynchronous submit/wait interface.

mod mock;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::pool::ScratchBuffer;
use crate::tensor::{ElementType, TensorData};

pub use mock::{MockEngine, MockOutputSpec};

/// Opaque identifier for one submitted job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle(u64);

impl JobHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// The engine-side element type vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    /// Produced by some device firmwares; has no portable counterpart.
    Float16,
}

impl NativeType {
    /// Map into the portable vocabulary. Total: natives without a
    /// portable counterpart map to [`ElementType::Undefined`].
    pub fn to_element_type(self) -> ElementType {
        match self {
            Self::Uint8 => ElementType::Uint8,
            Self::Uint16 => ElementType::Uint16,
            Self::Uint32 => ElementType::Uint32,
            Self::Uint64 => ElementType::Uint64,
            Self::Int8 => ElementType::Int8,
            Self::Int16 => ElementType::Int16,
            Self::Int32 => ElementType::Int32,
            Self::Int64 => ElementType::Int64,
            Self::Float32 => ElementType::Float32,
            Self::Float16 => ElementType::Undefined,
        }
    }

    /// Size of one element in device memory.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 | Self::Float16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Uint64 | Self::Int64 => 8,
        }
    }
}

/// Describes one output tensor staged in a job's scratch buffer.
#[derive(Clone, Debug)]
pub struct OutputDescriptor {
    pub name: String,
    pub native_type: NativeType,
    pub shape: Vec<usize>,
    /// Byte offset of the staged region within the scratch buffer.
    pub offset: usize,
    /// Byte length of the staged region.
    pub len: usize,
}

/// Abstract capabilities of the accelerator.
///
/// Implementations must be safe for concurrent `submit` and `wait`
/// calls, complete jobs in submission order, and bound the duration of
/// `wait` (shutdown joins the completion worker through it).
///
/// The device stages its output into the scratch buffer passed to
/// `wait`; the returned descriptors address that staging area by
/// offset. The same buffer handed to `submit` travels with the job so
/// backpressure is applied before the engine ever sees the work.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Enqueue one job on the device and return its handle.
    async fn submit(
        &self,
        input: &TensorData,
        scratch: &mut ScratchBuffer,
    ) -> anyhow::Result<JobHandle>;

    /// Suspend until `handle` completes, staging the outputs into
    /// `scratch` and describing where they landed.
    async fn wait(
        &self,
        handle: JobHandle,
        scratch: &mut ScratchBuffer,
    ) -> anyhow::Result<Vec<OutputDescriptor>>;

    /// Scratch bytes one job's outputs need, fixed at model load.
    fn output_scratch_size(&self) -> usize;

    /// Per-output byte sizes, fixed at model load.
    fn output_tensor_sizes(&self) -> &[usize];

    /// Number of attached accelerator devices.
    fn device_count(&self) -> usize;
}

/// Constructs an engine from a model file.
pub trait EngineFactory: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Arc<dyn Engine>>;
}
