use std::fmt;

use super::{ElementType, TensorData};
use crate::error::{Result, RuntimeError};

/// One named, typed, multi-dimensional tensor with owned storage.
///
/// `Clone` aliases the data region (the shallow-copy semantics of
/// [`TensorData`]); use [`deep_clone`](Self::deep_clone) to detach.
#[derive(Clone, Debug)]
pub struct Tensor {
    name: String,
    element_type: ElementType,
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Build a tensor, checking that the data region matches the shape.
    ///
    /// For supported element types the region length must equal
    /// `byte_size * product(shape)`. Unsupported element types carry
    /// whatever bytes they were given; consumers decide what to do
    /// with them.
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<usize>,
        data: TensorData,
    ) -> Result<Self> {
        let element_size = element_type.byte_size();
        if element_size > 0 {
            let expected = element_size * shape.iter().product::<usize>();
            if data.len() != expected {
                return Err(RuntimeError::InvalidShape(format!(
                    "data region is {} bytes but {element_type} {shape:?} needs {expected}",
                    data.len(),
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            element_type,
            shape,
            data,
        })
    }

    /// The sentinel state of a freshly allocated bundle slot.
    pub fn placeholder() -> Self {
        Self {
            name: String::new(),
            element_type: ElementType::Undefined,
            shape: Vec::new(),
            data: TensorData::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Number of elements described by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Expected region length, or `None` for unsupported element types.
    pub fn expected_byte_len(&self) -> Option<usize> {
        let element_size = self.element_type.byte_size();
        (element_size > 0).then(|| element_size * self.element_count())
    }

    /// An independent copy with freshly allocated name, shape and data.
    pub fn deep_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            element_type: self.element_type,
            shape: self.shape.clone(),
            data: self.data.deep_clone(),
        }
    }

    fn content_eq(&self, other: &Self) -> bool {
        if !self.element_type.is_supported() || !other.element_type.is_supported() {
            return false;
        }
        self.name == other.name
            && self.element_type == other.element_type
            && self.shape == other.shape
            && self.data.bytes_eq(&other.data)
    }
}

/// A fixed-length ordered collection of tensors.
///
/// The slot count is set at creation and never changes. The bundle owns
/// every name, shape and data region it holds; dropping it releases them
/// exactly once, with regions shared through a shallow copy surviving
/// until their last holder drops.
#[derive(Clone, Debug)]
pub struct TensorBundle {
    tensors: Vec<Tensor>,
}

impl TensorBundle {
    /// A bundle of `count` placeholder slots.
    pub fn allocate(count: usize) -> Self {
        Self {
            tensors: (0..count).map(|_| Tensor::placeholder()).collect(),
        }
    }

    /// Take ownership of a prepared tensor set.
    pub fn from_tensors(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    /// Number of tensor slots.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.tensors.get(index)
    }

    /// Replace the tensor in `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds; the slot count never grows.
    pub fn set(&mut self, index: usize, tensor: Tensor) {
        self.tensors[index] = tensor;
    }

    /// A byte-for-byte independent clone of the whole bundle.
    pub fn deep_copy(&self) -> Self {
        Self {
            tensors: self.tensors.iter().map(Tensor::deep_clone).collect(),
        }
    }

    /// Fill `dst`'s slots with views aliasing this bundle's regions.
    ///
    /// After this call both bundles observe the same underlying name,
    /// shape and data storage. Either side may be dropped first; the
    /// shared regions are freed when their last holder goes away.
    pub fn shallow_copy_into(&self, dst: &mut Self) -> Result<()> {
        if self.len() != dst.len() {
            return Err(RuntimeError::ShapeMismatch {
                left: self.len(),
                right: dst.len(),
            });
        }
        for (slot, tensor) in dst.tensors.iter_mut().zip(&self.tensors) {
            *slot = tensor.clone();
        }
        Ok(())
    }

    /// Structural equality over names, types, shapes and data bytes.
    ///
    /// Bundles differing in slot count compare unequal, as does any
    /// slot whose element type has no portable storage size (the byte
    /// length to compare would be meaningless).
    pub fn content_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|(a, b)| a.content_eq(b))
    }
}

impl fmt::Display for TensorBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tensor bundle with {} tensor(s):", self.len())?;
        for (index, tensor) in self.tensors.iter().enumerate() {
            writeln!(
                f,
                "  [{index}] '{}' {} rank={} shape={:?} {} byte(s)",
                tensor.name(),
                tensor.element_type(),
                tensor.rank(),
                tensor.shape(),
                tensor.data().len(),
            )?;
        }
        Ok(())
    }
}
