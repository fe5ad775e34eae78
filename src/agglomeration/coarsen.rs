//! Coarse connectivity from a fine level and a cell restriction map.
//!
//! Fine faces whose two cells restrict to the same coarse cell collapse into
//! it. The rest are merged per coarse (owner, neighbour) pair. Coarse faces
//! are found through a per-coarse-cell adjacency that starts at
//! `initial_neighbour_guess` entries and grows on demand, then renumbered so
//! that all faces of coarse cell 0 come first, then cell 1, and so on. Within
//! one owner, faces keep the order in which they were first met.

use crate::mesh_error::AgglomError;
use crate::topology::adjacency::AdjacencyBuilder;
use crate::topology::{FaceRestrict, LduAddressing, RestrictionMap};

/// Output of [`coarsen`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoarsenedAddressing {
    pub addr: LduAddressing,
    /// Per fine face: coarse face or collapsed coarse cell.
    pub face_restrict: Vec<FaceRestrict>,
    /// Per fine face: whether the coarse face runs against the fine one.
    pub face_flip: Vec<bool>,
}

impl CoarsenedAddressing {
    pub fn n_collapsed(&self) -> usize {
        self.face_restrict
            .iter()
            .filter(|fr| matches!(fr, FaceRestrict::Collapsed(_)))
            .count()
    }

    pub fn n_flipped(&self) -> usize {
        self.face_flip.iter().filter(|&&f| f).count()
    }
}

/// Build the coarse addressing of `fine` under `restrict`.
pub fn coarsen(
    fine: &LduAddressing,
    restrict: &RestrictionMap,
    initial_neighbour_guess: usize,
) -> Result<CoarsenedAddressing, AgglomError> {
    restrict.check_fine_size(fine.n_cells())?;
    let rm = restrict.as_slice();
    let n_coarse = restrict.n_coarse();
    let n_fine_faces = fine.n_faces();

    let mut cell_faces = AdjacencyBuilder::new(n_coarse, initial_neighbour_guess.max(1));
    // Neighbour of every provisional coarse face.
    let mut init_neighbour: Vec<usize> = Vec::new();
    // Provisional id, or the collapsed cell.
    let mut provisional: Vec<FaceRestrict> = Vec::with_capacity(n_fine_faces);

    for (&o, &n) in fine.owner().iter().zip(fine.neighbour()) {
        let (ro, rn) = (rm[o], rm[n]);
        if ro == rn {
            provisional.push(FaceRestrict::Collapsed(ro));
            continue;
        }
        let (c_own, c_nei) = (ro.min(rn), ro.max(rn));
        let found = cell_faces
            .entries(c_own)
            .iter()
            .copied()
            .find(|&cf| init_neighbour[cf] == c_nei);
        let cf = match found {
            Some(cf) => cf,
            None => {
                let cf = init_neighbour.len();
                init_neighbour.push(c_nei);
                cell_faces.push(c_own, cf);
                cf
            }
        };
        provisional.push(FaceRestrict::Coarse(cf));
    }

    // Upper-triangular order.
    let n_coarse_faces = init_neighbour.len();
    let csr = cell_faces.into_csr();
    let mut owner = Vec::with_capacity(n_coarse_faces);
    let mut neighbour = Vec::with_capacity(n_coarse_faces);
    let mut face_map = vec![0usize; n_coarse_faces];
    for cc in 0..csr.n_cells() {
        for &cf in csr.neighbors(cc) {
            face_map[cf] = owner.len();
            owner.push(cc);
            neighbour.push(init_neighbour[cf]);
        }
    }

    let face_restrict: Vec<FaceRestrict> = provisional
        .into_iter()
        .map(|fr| match fr {
            FaceRestrict::Coarse(cf) => FaceRestrict::Coarse(face_map[cf]),
            collapsed => collapsed,
        })
        .collect();

    let mut face_flip = vec![false; n_fine_faces];
    for (f, fr) in face_restrict.iter().enumerate() {
        let FaceRestrict::Coarse(cf) = *fr else { continue };
        let (co, cn) = (owner[cf], neighbour[cf]);
        let (ro, rn) = (rm[fine.owner()[f]], rm[fine.neighbour()[f]]);
        if co == rn && cn == ro {
            face_flip[f] = true;
        } else if co != ro || cn != rn {
            return Err(AgglomError::TopologyViolation {
                fine_face: f,
                restricted_owner: ro,
                restricted_neighbour: rn,
                coarse_face: cf,
                coarse_owner: co,
                coarse_neighbour: cn,
            });
        }
    }

    let addr = LduAddressing::new(n_coarse, owner, neighbour)?;
    Ok(CoarsenedAddressing {
        addr,
        face_restrict,
        face_flip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> LduAddressing {
        // 0-1, 0-2, 1-3, 2-3
        LduAddressing::new(4, vec![0, 0, 1, 2], vec![1, 2, 3, 3]).unwrap()
    }

    #[test]
    fn pairs_collapse_and_merge() {
        let r = RestrictionMap::new(vec![0, 0, 1, 1], 2).unwrap();
        let c = coarsen(&square(), &r, 10).unwrap();
        assert_eq!(c.addr.owner(), &[0]);
        assert_eq!(c.addr.neighbour(), &[1]);
        assert_eq!(
            c.face_restrict,
            vec![
                FaceRestrict::Collapsed(0),
                FaceRestrict::Coarse(0),
                FaceRestrict::Coarse(0),
                FaceRestrict::Collapsed(1),
            ]
        );
        assert_eq!(c.face_flip, vec![false; 4]);
        assert_eq!(c.n_collapsed(), 2);
    }

    #[test]
    fn reversed_restriction_flips() {
        let r = RestrictionMap::new(vec![1, 1, 0, 0], 2).unwrap();
        let c = coarsen(&square(), &r, 10).unwrap();
        assert_eq!(c.addr.owner(), &[0]);
        assert_eq!(c.face_flip, vec![false, true, true, false]);
        assert_eq!(c.n_flipped(), 2);
    }

    #[test]
    fn adjacency_grows_past_the_guess() {
        // Star: cell 0 touches 1..=5, each its own coarse cell.
        let fine = LduAddressing::new(6, vec![0; 5], vec![1, 2, 3, 4, 5]).unwrap();
        let r = RestrictionMap::new((0..6).collect(), 6).unwrap();
        let c = coarsen(&fine, &r, 1).unwrap();
        assert_eq!(c.addr.n_faces(), 5);
        assert_eq!(c.addr.neighbour(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn owner_groups_keep_first_appearance() {
        // Fine faces reach coarse neighbours 2 then 1 from coarse owner 0.
        let fine = LduAddressing::new(3, vec![0, 0], vec![1, 2]).unwrap();
        let r = RestrictionMap::new(vec![0, 2, 1], 3).unwrap();
        let c = coarsen(&fine, &r, 10).unwrap();
        assert_eq!(c.addr.owner(), &[0, 0]);
        assert_eq!(c.addr.neighbour(), &[2, 1]);
    }

    #[test]
    fn wrong_size_map_is_inconsistent() {
        let r = RestrictionMap::new(vec![0, 0, 1], 2).unwrap();
        assert!(matches!(
            coarsen(&square(), &r, 10),
            Err(AgglomError::InconsistentInput(_))
        ));
    }
}
