//! Device-side restriction addressing: a mirrored key array plus its grouping.

use crate::algs::compressed::CompressedAddressing;
use crate::data::{Device, Mirrored};
use crate::mesh_error::AgglomError;

/// Mirrored addressing values with the compressed addressing derived from them.
///
/// Group `g` collects the fine entries that land on key `compressed.target[g]`.
#[derive(Clone, Debug)]
pub struct MirroredAddressing<K> {
    values: Mirrored<K>,
    compressed: CompressedAddressing<K>,
}

impl<K> MirroredAddressing<K>
where
    K: Ord + Copy + Send + Sync,
{
    /// Upload `host` and group it on the device.
    pub fn build(name: &'static str, host: Vec<K>, device: &Device) -> Result<Self, AgglomError> {
        let values = Mirrored::mirrored(name, host, device);
        let compressed = CompressedAddressing::build(device, values.device()?)?;
        Ok(Self { values, compressed })
    }

    pub fn values(&self) -> &Mirrored<K> {
        &self.values
    }

    pub fn compressed(&self) -> &CompressedAddressing<K> {
        &self.compressed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn release(&mut self) {
        self.values.release();
        self.compressed.release();
    }
}
