//! Compressed (grouped) addressing.
//!
//! Given a key per element, [`CompressedAddressing`] stores a stable sort
//! permutation, the sorted unique keys and a CSR offset array so that the
//! members of group `g` are `sort[offsets[g]..offsets[g + 1]]`. The data-parallel
//! build ([`CompressedAddressing::build`]) and the sequential host build
//! ([`CompressedAddressing::build_host`]) produce identical groups.

use num_traits::Zero;
use rayon::prelude::*;

use crate::algs::primitives::{exclusive_scan, gather, reduce_by_key, stable_sort_permutation};
use crate::data::device::Device;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::AgglomError;

/// Sort permutation plus grouped CSR addressing over a key array.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedAddressing<K> {
    /// Original indices in non-decreasing key order.
    pub sort: Vec<usize>,
    /// Sorted unique keys.
    pub target: Vec<K>,
    /// CSR offsets into `sort`, one entry longer than `target`.
    pub target_start: Vec<usize>,
}

/// Stable permutation of `keys` on the device.
pub fn create_sort<K>(device: &Device, keys: &[K]) -> Vec<usize>
where
    K: Ord + Copy + Send + Sync,
{
    stable_sort_permutation(device, keys)
}

/// Unique keys and group offsets from `keys` and their sort permutation.
pub fn create_target<K>(
    device: &Device,
    keys: &[K],
    sort: &[usize],
) -> Result<(Vec<K>, Vec<usize>), AgglomError>
where
    K: Ord + Copy + Send + Sync,
{
    if keys.len() != sort.len() {
        return Err(AgglomError::SizeMismatch {
            expected: keys.len(),
            found: sort.len(),
        });
    }
    let sorted = gather(device, keys, sort);
    let ones = vec![1usize; sorted.len()];
    let (target, counts) = reduce_by_key(device, &sorted, &ones, 0, |a, b| a + b)?;
    let mut target_start = exclusive_scan(device, &counts);
    target_start.push(keys.len());
    Ok((target, target_start))
}

impl<K> CompressedAddressing<K>
where
    K: Ord + Copy + Send + Sync,
{
    /// Data-parallel build.
    pub fn build(device: &Device, keys: &[K]) -> Result<Self, AgglomError> {
        let sort = create_sort(device, keys);
        let (target, target_start) = create_target(device, keys, &sort)?;
        let out = Self {
            sort,
            target,
            target_start,
        };
        out.debug_assert_invariants();
        Ok(out)
    }

    /// Sequential reference build.
    pub fn build_host(keys: &[K]) -> Self {
        let mut sort: Vec<usize> = (0..keys.len()).collect();
        sort.sort_by_key(|&i| keys[i]);
        let mut target = Vec::new();
        let mut target_start = Vec::new();
        for (pos, &i) in sort.iter().enumerate() {
            if target.last() != Some(&keys[i]) {
                target.push(keys[i]);
                target_start.push(pos);
            }
        }
        target_start.push(keys.len());
        Self {
            sort,
            target,
            target_start,
        }
    }

    /// Number of groups.
    pub fn n_groups(&self) -> usize {
        self.target.len()
    }

    /// Original indices belonging to group `g`.
    pub fn group(&self, g: usize) -> &[usize] {
        &self.sort[self.target_start[g]..self.target_start[g + 1]]
    }

    /// Iterate `(key, members)` pairs in key order.
    pub fn groups(&self) -> impl Iterator<Item = (K, &[usize])> + '_ {
        self.target
            .iter()
            .enumerate()
            .map(move |(g, &k)| (k, self.group(g)))
    }

    /// Sum `values` over every group, one result per entry of `target`.
    pub fn sum_groups<T>(&self, device: &Device, values: &[T]) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        if values.len() != self.sort.len() {
            return Err(AgglomError::SizeMismatch {
                expected: self.sort.len(),
                found: values.len(),
            });
        }
        Ok(device.install(|| {
            (0..self.n_groups())
                .into_par_iter()
                .map(|g| {
                    self.group(g)
                        .iter()
                        .fold(T::zero(), |acc, &i| acc + values[i])
                })
                .collect()
        }))
    }

    /// Free all arrays.
    pub fn release(&mut self) {
        *self = Self {
            sort: Vec::new(),
            target: Vec::new(),
            target_start: Vec::new(),
        };
    }
}

impl<K> DebugInvariants for CompressedAddressing<K>
where
    K: Ord + Copy + Send + Sync,
{
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CompressedAddressing");
    }

    fn validate_invariants(&self) -> Result<(), AgglomError> {
        if self.target_start.len() != self.target.len() + 1 {
            return Err(AgglomError::SizeMismatch {
                expected: self.target.len() + 1,
                found: self.target_start.len(),
            });
        }
        if self.target_start.first() != Some(&0)
            || self.target_start.last() != Some(&self.sort.len())
        {
            return Err(AgglomError::inconsistent(
                "group offsets must start at 0 and end at the key count",
            ));
        }
        if self.target_start.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AgglomError::inconsistent("empty or decreasing group offsets"));
        }
        if self.target.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AgglomError::inconsistent("group keys are not strictly increasing"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_key_in_input_order() {
        let dev = Device::global();
        let keys = [2i64, -1, 2, 0, -1, 2];
        let ca = CompressedAddressing::build(&dev, &keys).unwrap();
        assert_eq!(ca.target, vec![-1, 0, 2]);
        assert_eq!(ca.target_start, vec![0, 2, 3, 6]);
        assert_eq!(ca.group(0), &[1, 4]);
        assert_eq!(ca.group(2), &[0, 2, 5]);
        assert_eq!(ca, CompressedAddressing::build_host(&keys));
    }

    #[test]
    fn empty_keys_have_sentinel_only() {
        let dev = Device::global();
        let ca = CompressedAddressing::<usize>::build(&dev, &[]).unwrap();
        assert!(ca.target.is_empty());
        assert_eq!(ca.target_start, vec![0]);
        ca.validate_invariants().unwrap();
    }

    #[test]
    fn group_sums_follow_target_order() {
        let dev = Device::global();
        let ca = CompressedAddressing::build(&dev, &[1usize, 0, 1, 1]).unwrap();
        let sums = ca.sum_groups(&dev, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(sums, vec![2.0, 8.0]);
        assert!(ca.sum_groups(&dev, &[1.0]).is_err());
    }

    #[test]
    fn create_target_rejects_foreign_permutation() {
        let dev = Device::global();
        assert!(create_target(&dev, &[1, 2, 3], &[0, 1]).is_err());
    }
}
