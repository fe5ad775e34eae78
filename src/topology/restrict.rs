//! Cell and face restriction addressing.

use serde::{Deserialize, Serialize};

use crate::mesh_error::AgglomError;

/// Assignment of every fine cell to one coarse cell.
///
/// Deserialized maps go through [`RestrictionMap::new`] and are validated the
/// same way as maps built in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRestrictionMap")]
pub struct RestrictionMap {
    map: Vec<usize>,
    n_coarse: usize,
}

#[derive(Deserialize)]
struct RawRestrictionMap {
    map: Vec<usize>,
    n_coarse: usize,
}

impl TryFrom<RawRestrictionMap> for RestrictionMap {
    type Error = AgglomError;

    fn try_from(raw: RawRestrictionMap) -> Result<Self, Self::Error> {
        Self::new(raw.map, raw.n_coarse)
    }
}

impl RestrictionMap {
    /// Build from a dense map; every entry must be below `n_coarse`.
    pub fn new(map: Vec<usize>, n_coarse: usize) -> Result<Self, AgglomError> {
        if let Some((cell, &c)) = map.iter().enumerate().find(|&(_, &c)| c >= n_coarse) {
            return Err(AgglomError::inconsistent(format!(
                "fine cell {cell} restricts to coarse cell {c} but only {n_coarse} coarse cells exist"
            )));
        }
        Ok(Self { map, n_coarse })
    }

    /// Build from a possibly incomplete clustering; any `None` is rejected.
    pub fn from_assignments(
        assignments: &[Option<usize>],
        n_coarse: usize,
    ) -> Result<Self, AgglomError> {
        let map = assignments
            .iter()
            .enumerate()
            .map(|(cell, a)| {
                a.ok_or_else(|| {
                    AgglomError::inconsistent(format!("fine cell {cell} is unassigned"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(map, n_coarse)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.map
    }

    /// Number of fine cells.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of coarse cells.
    pub fn n_coarse(&self) -> usize {
        self.n_coarse
    }

    #[inline]
    pub fn get(&self, fine: usize) -> usize {
        self.map[fine]
    }

    /// Fail unless this map covers exactly `n_fine` cells.
    pub fn check_fine_size(&self, n_fine: usize) -> Result<(), AgglomError> {
        if self.map.len() != n_fine {
            return Err(AgglomError::inconsistent(format!(
                "restrict map does not correspond to fine level: {} entries for {} cells",
                self.map.len(),
                n_fine
            )));
        }
        Ok(())
    }

    /// Two steps in one: `out[i] = next[self[i]]`.
    pub fn compose(&self, next: &RestrictionMap) -> Result<RestrictionMap, AgglomError> {
        next.check_fine_size(self.n_coarse)?;
        Ok(RestrictionMap {
            map: self.map.iter().map(|&c| next.map[c]).collect(),
            n_coarse: next.n_coarse,
        })
    }
}

/// Where a fine face ends up on the coarse level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceRestrict {
    /// Part of this coarse face.
    Coarse(usize),
    /// Both sides fell into this coarse cell; the face disappears.
    Collapsed(usize),
}

impl FaceRestrict {
    /// Single-integer form used by the device addressing: coarse faces keep
    /// their index, collapsed faces become `-(cell + 1)`.
    #[inline]
    pub fn encode(self) -> i64 {
        match self {
            FaceRestrict::Coarse(f) => f as i64,
            FaceRestrict::Collapsed(c) => -(c as i64) - 1,
        }
    }

    #[inline]
    pub fn decode(v: i64) -> Self {
        if v >= 0 {
            FaceRestrict::Coarse(v as usize)
        } else {
            FaceRestrict::Collapsed((-v - 1) as usize)
        }
    }

    pub fn coarse_face(self) -> Option<usize> {
        match self {
            FaceRestrict::Coarse(f) => Some(f),
            FaceRestrict::Collapsed(_) => None,
        }
    }

    pub fn collapsed_cell(self) -> Option<usize> {
        match self {
            FaceRestrict::Collapsed(c) => Some(c),
            FaceRestrict::Coarse(_) => None,
        }
    }
}
