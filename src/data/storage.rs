//! Pluggable storage for addressing buffers.
//!
//! This trait abstracts where a flat addressing buffer lives. [`HostStorage`]
//! is the exact, sequential copy used for order-sensitive decisions;
//! [`DeviceStorage`] is the copy the data-parallel primitives read from. Both
//! keep slice semantics so the same grouping code can run on either.

use core::fmt::{self, Debug};

use rayon::prelude::*;

use crate::data::device::Device;

/// Contiguous, indexable storage for `V` with slice access.
pub trait Storage<V>: Debug {
    /// Current length in elements.
    fn len(&self) -> usize;

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entire read-only buffer.
    fn as_slice(&self) -> &[V];

    /// Entire mutable buffer.
    fn as_mut_slice(&mut self) -> &mut [V];

    /// Drop the contents and give the memory back.
    fn release(&mut self);
}

/// `Vec`-backed host storage.
#[derive(Clone, PartialEq, Eq)]
pub struct HostStorage<V>(pub(crate) Vec<V>);

impl<V> Default for HostStorage<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> Debug for HostStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<V> Storage<V> for HostStorage<V> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn as_slice(&self) -> &[V] {
        &self.0
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.0
    }

    fn release(&mut self) {
        self.0 = Vec::new();
    }
}

impl<V> From<Vec<V>> for HostStorage<V> {
    fn from(v: Vec<V>) -> Self {
        Self(v)
    }
}

/// Device-resident storage. Bulk transfers run on a [`Device`].
#[derive(Clone)]
pub struct DeviceStorage<V> {
    data: Vec<V>,
}

impl<V> Default for DeviceStorage<V> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

impl<V> Debug for DeviceStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStorage")
            .field("len", &self.data.len())
            .finish()
    }
}

impl<V> Storage<V> for DeviceStorage<V> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[V] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.data
    }

    fn release(&mut self) {
        self.data = Vec::new();
    }
}

impl<V> DeviceStorage<V>
where
    V: Clone + Send + Sync,
{
    /// Copy a host slice into device memory, replacing the contents.
    pub fn copy_from_host(&mut self, device: &Device, src: &[V]) {
        device.install(|| src.par_iter().cloned().collect_into_vec(&mut self.data));
    }

    /// Copy device memory back into a host vector.
    pub fn copy_to_host(&self, device: &Device, dst: &mut Vec<V>) {
        device.install(|| self.data.par_iter().cloned().collect_into_vec(dst));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Element type with no `Default`.
    #[derive(Clone, Debug, PartialEq)]
    struct Label(u32);

    #[test]
    fn empty_storage_needs_no_default_element() {
        let h = HostStorage::<Label>::default();
        let mut d = DeviceStorage::<Label>::default();
        assert!(h.is_empty() && d.is_empty());
        d.copy_from_host(&Device::global(), &[Label(4)]);
        assert_eq!(d.as_slice(), &[Label(4)]);
    }

    #[test]
    fn device_copy_round_trip() {
        let dev = Device::global();
        let mut d = DeviceStorage::<u32>::default();
        d.copy_from_host(&dev, &[3, 1, 2]);
        let mut back = Vec::new();
        d.copy_to_host(&dev, &mut back);
        assert_eq!(back, vec![3, 1, 2]);
        d.release();
        assert!(d.is_empty());
    }
}
