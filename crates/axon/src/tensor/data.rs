use std::fmt;
use std::sync::{Arc, RwLock};

/// The owned, contiguous byte region backing one tensor.
///
/// Cloning a `TensorData` aliases the region rather than copying it:
/// both handles observe the same bytes, and the storage is released
/// exactly once when the last handle drops. This is what makes a
/// shallow bundle copy share storage with its source. Use
/// [`deep_clone`](Self::deep_clone) for an independent copy.
#[derive(Clone, Default)]
pub struct TensorData {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl TensorData {
    /// A region of `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    /// Take ownership of an existing byte vector.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.bytes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the region out into a fresh vector.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().unwrap().clone()
    }

    /// An independent copy with freshly allocated storage.
    pub fn deep_clone(&self) -> Self {
        Self::from_vec(self.snapshot())
    }

    /// Read the bytes in place.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.bytes.read().unwrap())
    }

    /// Mutate the bytes in place. The region length is fixed.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.bytes.write().unwrap())
    }

    /// Overwrite the region from `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src.len()` differs from the region length.
    pub fn copy_from_slice(&self, src: &[u8]) {
        let mut bytes = self.bytes.write().unwrap();
        assert_eq!(bytes.len(), src.len(), "tensor data length mismatch");
        bytes.copy_from_slice(src);
    }

    /// Whether two handles alias the same underlying region.
    pub fn aliases(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Byte-wise equality of the two regions.
    pub fn bytes_eq(&self, other: &Self) -> bool {
        if self.aliases(other) {
            return true;
        }
        *self.bytes.read().unwrap() == *other.bytes.read().unwrap()
    }
}

impl fmt::Debug for TensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorData").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_aliases_storage() {
        let a = TensorData::from_vec(vec![1, 2, 3]);
        let b = a.clone();
        assert!(a.aliases(&b));

        a.with_bytes_mut(|bytes| bytes[1] = 9);
        assert_eq!(b.snapshot(), vec![1, 9, 3]);
    }

    #[test]
    fn deep_clone_is_independent() {
        let a = TensorData::from_vec(vec![1, 2, 3]);
        let b = a.deep_clone();
        assert!(!a.aliases(&b));
        assert!(a.bytes_eq(&b));

        a.with_bytes_mut(|bytes| bytes[0] = 7);
        assert!(!a.bytes_eq(&b));
        assert_eq!(b.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn copy_from_slice_overwrites() {
        let data = TensorData::zeroed(4);
        data.copy_from_slice(&[4, 3, 2, 1]);
        assert_eq!(data.snapshot(), vec![4, 3, 2, 1]);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn copy_from_slice_rejects_resize() {
        TensorData::zeroed(4).copy_from_slice(&[1, 2]);
    }
}
