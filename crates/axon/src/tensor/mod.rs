//! The portable tensor container shared by producers and consumers.
//!
//! A [`TensorBundle`] is a fixed-length, heterogeneous set of named
//! tensors with owned element storage. It is the only data shape the
//! pipeline exposes at its boundaries: producers build one per frame,
//! and consumers receive one per completed job.

mod bundle;
mod data;
mod element;

pub use bundle::{Tensor, TensorBundle};
pub use data::TensorData;
pub use element::ElementType;
