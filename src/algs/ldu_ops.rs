//! Cell-wise operations over LDU addressing.
//!
//! Each cell reads the faces it owns through `owner_start` and the faces it
//! neighbours through `losort`/`losort_start`, so every output entry is
//! written by exactly one task and no atomics are needed.

use std::ops::Mul;

use num_traits::Zero;
use rayon::prelude::*;

use crate::algs::compressed::CompressedAddressing;
use crate::data::device::Device;
use crate::mesh_error::AgglomError;
use crate::topology::LduAddressing;

fn check_len(expected: usize, found: usize) -> Result<(), AgglomError> {
    if expected == found {
        Ok(())
    } else {
        Err(AgglomError::SizeMismatch { expected, found })
    }
}

/// `out[c] = Σ owner_vals[f] (c owns f) + Σ neighbour_vals[f] (c neighbours f)`.
pub fn cell_reduce<T>(
    device: &Device,
    addr: &LduAddressing,
    owner_vals: &[T],
    neighbour_vals: &[T],
) -> Result<Vec<T>, AgglomError>
where
    T: Zero + Copy + Send + Sync,
{
    check_len(addr.n_faces(), owner_vals.len())?;
    check_len(addr.n_faces(), neighbour_vals.len())?;
    Ok(device.install(|| {
        (0..addr.n_cells())
            .into_par_iter()
            .map(|c| {
                let own = addr
                    .owned_faces(c)
                    .fold(T::zero(), |acc, f| acc + owner_vals[f]);
                addr.neighbour_faces(c)
                    .iter()
                    .fold(own, |acc, &f| acc + neighbour_vals[f])
            })
            .collect()
    }))
}

/// Matrix-vector product `y = A x` for an LDU matrix.
pub fn amul<T>(
    device: &Device,
    addr: &LduAddressing,
    diag: &[T],
    lower: &[T],
    upper: &[T],
    x: &[T],
) -> Result<Vec<T>, AgglomError>
where
    T: Zero + Mul<Output = T> + Copy + Send + Sync,
{
    check_len(addr.n_cells(), diag.len())?;
    check_len(addr.n_cells(), x.len())?;
    check_len(addr.n_faces(), lower.len())?;
    check_len(addr.n_faces(), upper.len())?;
    let owner = addr.owner();
    let neighbour = addr.neighbour();
    Ok(device.install(|| {
        (0..addr.n_cells())
            .into_par_iter()
            .map(|c| {
                let y = addr
                    .owned_faces(c)
                    .fold(diag[c] * x[c], |acc, f| acc + upper[f] * x[neighbour[f]]);
                addr.neighbour_faces(c)
                    .iter()
                    .fold(y, |acc, &f| acc + lower[f] * x[owner[f]])
            })
            .collect()
    }))
}

/// Sum patch face values into the cells they are attached to.
///
/// `patch_addr` groups the patch faces by cell, as built by
/// [`LduMesh::patch_addressing`](crate::topology::LduMesh::patch_addressing).
pub fn patch_reduce<T>(
    device: &Device,
    n_cells: usize,
    patch_addr: &CompressedAddressing<usize>,
    face_vals: &[T],
) -> Result<Vec<T>, AgglomError>
where
    T: Zero + Copy + Send + Sync,
{
    check_len(patch_addr.sort.len(), face_vals.len())?;
    if let Some(&c) = patch_addr.target.last().filter(|&&c| c >= n_cells) {
        return Err(AgglomError::OutOfBoundsAddressing {
            max: c,
            size: n_cells,
        });
    }
    let sums: Vec<T> = device.install(|| {
        (0..patch_addr.n_groups())
            .into_par_iter()
            .map(|g| {
                patch_addr
                    .group(g)
                    .iter()
                    .fold(T::zero(), |acc, &f| acc + face_vals[f])
            })
            .collect()
    });
    let mut out = vec![T::zero(); n_cells];
    crate::algs::primitives::scatter(&sums, &patch_addr.target, &mut out)?;
    Ok(out)
}
