use crate::engine::{JobHandle, OutputDescriptor};
use crate::pool::ScratchBuffer;
use crate::tensor::TensorBundle;

/// One submitted job travelling from the submitter to the completion
/// worker. Owns the input bundle until the engine releases the handle,
/// and the scratch buffer until completion.
#[derive(Debug)]
pub(crate) struct JobRecord {
    pub handle: JobHandle,
    pub scratch: ScratchBuffer,
    pub input: TensorBundle,
}

/// One completed job travelling from the completion worker to the
/// receiver: the engine's output descriptors plus the scratch buffer
/// they address.
pub(crate) struct CompletedJob {
    pub descriptors: Vec<OutputDescriptor>,
    pub scratch: ScratchBuffer,
}
