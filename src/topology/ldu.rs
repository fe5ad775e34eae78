//! LDU addressing: the face-based connectivity graph of one level.
//!
//! Cells are matrix rows, faces are off-diagonal couplings. Every face is
//! stored as an `(owner, neighbour)` pair with `owner < neighbour`, and faces
//! are ordered by owner. Per-cell offset arrays give O(1) access to the faces
//! a cell owns (`owner_start`) and the faces it neighbours (`losort`,
//! `losort_start`).

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::AgglomError;

/// Owner/neighbour addressing plus derived per-cell offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LduAddressing {
    n_cells: usize,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    owner_start: Vec<usize>,
    losort: Vec<usize>,
    losort_start: Vec<usize>,
}

impl LduAddressing {
    /// Build and validate addressing for `n_cells` cells.
    pub fn new(
        n_cells: usize,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
    ) -> Result<Self, AgglomError> {
        if owner.len() != neighbour.len() {
            return Err(AgglomError::SizeMismatch {
                expected: owner.len(),
                found: neighbour.len(),
            });
        }
        let mut addr = Self {
            n_cells,
            owner,
            neighbour,
            ..Default::default()
        };
        addr.validate_invariants()?;
        addr.calc_offsets();
        Ok(addr)
    }

    fn calc_offsets(&mut self) {
        let n = self.n_cells;
        let mut own_count = vec![0usize; n + 1];
        let mut nei_count = vec![0usize; n + 1];
        for (&o, &nb) in self.owner.iter().zip(&self.neighbour) {
            own_count[o + 1] += 1;
            nei_count[nb + 1] += 1;
        }
        for c in 0..n {
            own_count[c + 1] += own_count[c];
            nei_count[c + 1] += nei_count[c];
        }

        // Counting sort on neighbour keeps faces of one cell in face order.
        let mut cursor = nei_count.clone();
        let mut losort = vec![0usize; self.neighbour.len()];
        for (face, &nb) in self.neighbour.iter().enumerate() {
            losort[cursor[nb]] = face;
            cursor[nb] += 1;
        }

        self.owner_start = own_count;
        self.losort = losort;
        self.losort_start = nei_count;
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.owner.len()
    }

    /// Lower addressing: owner cell of every face.
    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    /// Upper addressing: neighbour cell of every face.
    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    /// `owner_start[c]..owner_start[c + 1]` are the faces owned by `c`.
    pub fn owner_start(&self) -> &[usize] {
        &self.owner_start
    }

    /// Faces sorted by neighbour cell.
    pub fn losort(&self) -> &[usize] {
        &self.losort
    }

    /// `losort[losort_start[c]..losort_start[c + 1]]` are the faces neighbouring `c`.
    pub fn losort_start(&self) -> &[usize] {
        &self.losort_start
    }

    #[inline]
    pub fn face(&self, f: usize) -> (usize, usize) {
        (self.owner[f], self.neighbour[f])
    }

    /// Faces owned by `cell`.
    pub fn owned_faces(&self, cell: usize) -> std::ops::Range<usize> {
        self.owner_start[cell]..self.owner_start[cell + 1]
    }

    /// Faces for which `cell` is the neighbour.
    pub fn neighbour_faces(&self, cell: usize) -> &[usize] {
        &self.losort[self.losort_start[cell]..self.losort_start[cell + 1]]
    }

    /// Drop all arrays.
    pub fn release(&mut self) {
        *self = Self::default();
    }
}

impl DebugInvariants for LduAddressing {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LduAddressing");
    }

    fn validate_invariants(&self) -> Result<(), AgglomError> {
        let mut prev_owner = 0;
        for (face, (&o, &nb)) in self.owner.iter().zip(&self.neighbour).enumerate() {
            if nb >= self.n_cells {
                return Err(AgglomError::inconsistent(format!(
                    "face {face} neighbour {nb} outside {} cells",
                    self.n_cells
                )));
            }
            if o >= nb {
                return Err(AgglomError::inconsistent(format!(
                    "face {face} is not canonical: owner {o} >= neighbour {nb}"
                )));
            }
            if o < prev_owner {
                return Err(AgglomError::inconsistent(format!(
                    "face {face} breaks owner ordering ({o} after {prev_owner})"
                )));
            }
            prev_owner = o;
        }
        Ok(())
    }
}
