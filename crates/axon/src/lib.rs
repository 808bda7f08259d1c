//! # Axon
//!
//! An asynchronous inference dispatch runtime for neural-network
//! accelerators that expose an asynchronous submit/wait interface.
//!
//! ## Overview
//!
//! Axon accepts per-frame input tensors from one or more producers,
//! submits them to an accelerator engine, awaits completion on a
//! dedicated worker task, converts the engine's native output
//! descriptors into a portable tensor container, and hands the result
//! back to a consumer. It is the plumbing between an application's
//! frame loop and a device SDK, not an inference library itself.
//!
//! Key components include:
//!
//! - A portable, owned tensor container ([`TensorBundle`]) shared by
//!   every producer and consumer at the pipeline boundary
//! - A bounded pool of reusable output scratch buffers whose checkout
//!   discipline caps in-flight concurrency
//! - A two-stage submit/await pipeline over bounded queues that
//!   preserves submission order end to end
//!
//! ## Architecture
//!
//! The pipeline is a straight line:
//!
//! ```text
//! producer -> send_input -> [in-flight queue] -> completion worker
//!                                        -> [output queue] -> receive_output -> consumer
//! ```
//!
//! Backpressure flows the other way: a slow consumer fills the output
//! queue, which suspends the completion worker, which lets the
//! in-flight queue and then the scratch pool fill, which suspends
//! producers. Shutdown is cooperative through a single cancellation
//! token observed by every suspended wait.
//!
//! The accelerator is reached only through the [`engine::Engine`]
//! trait, so the whole pipeline runs unmodified against the in-process
//! [`engine::MockEngine`].
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use axon::{InferenceRuntime, Tensor, TensorBundle, TensorData, ElementType};
//! use axon::engine::MockEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MockEngine::single_uint8("scores", vec![1, 10], Duration::from_millis(2));
//! let runtime = InferenceRuntime::with_engine(Arc::new(engine))?;
//!
//! let input = TensorBundle::from_tensors(vec![Tensor::new(
//!     "frame",
//!     ElementType::Uint8,
//!     vec![1, 3, 4, 4],
//!     TensorData::from_vec(vec![0; 48]),
//! )?]);
//! runtime.send_input(input).await.map_err(|e| e.to_string())?;
//!
//! let output = runtime.receive_output(Duration::from_secs(1)).await?;
//! println!("{output}");
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Hosts that need a process-wide load/submit/receive/destroy surface
//! use the [`global`] module instead of owning the runtime value.

mod communication;
mod constant;
mod core;
mod error;
mod pool;
mod runtime;
mod tensor;

pub mod engine;
pub mod global;

pub use engine::{Engine, EngineFactory};
pub use error::{Result, RuntimeError, SendError};
pub use pool::ScratchBuffer;
pub use runtime::InferenceRuntime;
pub use tensor::{ElementType, Tensor, TensorBundle, TensorData};
