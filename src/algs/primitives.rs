//! Data-parallel array primitives.
//!
//! These are the building blocks of the grouped addressing: a stable
//! sort-by-key permutation, gather, segmented reduction, exclusive
//! scan and scatter. Every function runs on the given [`Device`] and returns
//! once the result is complete. Inputs are never aliased with outputs.

use num_traits::Zero;
use rayon::prelude::*;

use crate::data::device::Device;
use crate::mesh_error::AgglomError;

/// Grain below which a scan chunk is not split further.
const SCAN_GRAIN: usize = 4096;

/// Stable permutation that orders `keys` non-decreasingly.
pub fn stable_sort_permutation<K>(device: &Device, keys: &[K]) -> Vec<usize>
where
    K: Ord + Copy + Send + Sync,
{
    device.install(|| {
        let mut perm: Vec<usize> = (0..keys.len()).into_par_iter().collect();
        // rayon's par_sort_by_key is a stable merge sort.
        perm.par_sort_by_key(|&i| keys[i]);
        perm
    })
}

/// `out[i] = src[map[i]]`.
pub fn gather<T>(device: &Device, src: &[T], map: &[usize]) -> Vec<T>
where
    T: Copy + Send + Sync,
{
    device.install(|| map.par_iter().map(|&i| src[i]).collect())
}

/// Start position of every run of equal keys in a sorted slice.
pub fn segment_heads<K>(device: &Device, sorted: &[K]) -> Vec<usize>
where
    K: PartialEq + Sync,
{
    device.install(|| {
        (0..sorted.len())
            .into_par_iter()
            .filter(|&i| i == 0 || sorted[i] != sorted[i - 1])
            .collect()
    })
}

/// Reduce `values` over runs of equal `sorted_keys`.
///
/// Returns the run keys and one reduced value per run. Within a run values are
/// folded left to right; runs are reduced concurrently.
pub fn reduce_by_key<K, V, F>(
    device: &Device,
    sorted_keys: &[K],
    values: &[V],
    identity: V,
    op: F,
) -> Result<(Vec<K>, Vec<V>), AgglomError>
where
    K: PartialEq + Copy + Send + Sync,
    V: Copy + Send + Sync,
    F: Fn(V, V) -> V + Send + Sync,
{
    if sorted_keys.len() != values.len() {
        return Err(AgglomError::SizeMismatch {
            expected: sorted_keys.len(),
            found: values.len(),
        });
    }
    let heads = segment_heads(device, sorted_keys);
    let n = values.len();
    let reduced = device.install(|| {
        heads
            .par_iter()
            .enumerate()
            .map(|(g, &start)| {
                let end = heads.get(g + 1).copied().unwrap_or(n);
                values[start..end].iter().fold(identity, |acc, &v| op(acc, v))
            })
            .collect()
    });
    Ok((gather(device, sorted_keys, &heads), reduced))
}

/// Exclusive prefix sum: `out[0] = 0`, `out[i] = values[0] + .. + values[i-1]`.
pub fn exclusive_scan<T>(device: &Device, values: &[T]) -> Vec<T>
where
    T: Zero + Copy + Send + Sync,
{
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let chunk = (n / (4 * device.threads().max(1))).max(SCAN_GRAIN);
    device.install(|| {
        let totals: Vec<T> = values
            .par_chunks(chunk)
            .map(|c| c.iter().fold(T::zero(), |a, &b| a + b))
            .collect();
        let mut carry = T::zero();
        let starts: Vec<T> = totals
            .iter()
            .map(|&t| {
                let s = carry;
                carry = carry + t;
                s
            })
            .collect();
        let mut out = vec![T::zero(); n];
        out.par_chunks_mut(chunk)
            .zip(values.par_chunks(chunk))
            .zip(starts.par_iter())
            .for_each(|((dst, src), &start)| {
                let mut acc = start;
                for (o, &v) in dst.iter_mut().zip(src) {
                    *o = acc;
                    acc = acc + v;
                }
            });
        out
    })
}

/// `out[positions[i]] = values[i]`. Positions must be unique.
pub fn scatter<T>(values: &[T], positions: &[usize], out: &mut [T]) -> Result<(), AgglomError>
where
    T: Copy,
{
    if values.len() != positions.len() {
        return Err(AgglomError::SizeMismatch {
            expected: positions.len(),
            found: values.len(),
        });
    }
    let size = out.len();
    for (&v, &p) in values.iter().zip(positions) {
        let slot = out
            .get_mut(p)
            .ok_or(AgglomError::OutOfBoundsAddressing { max: p, size })?;
        *slot = v;
    }
    Ok(())
}
