#![allow(dead_code)]
use ldu_agglom::{
    algs::communicator::RayonComm,
    topology::{FaceRestrict, LduAddressing, LduMesh, Patch, PatchKind, RestrictionMap},
};

/// Structured `nx × ny` grid; cell `j * nx + i` owns its +x and +y faces.
pub fn grid(nx: usize, ny: usize) -> LduAddressing {
    let mut owner = Vec::new();
    let mut neighbour = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let c = j * nx + i;
            if i + 1 < nx {
                owner.push(c);
                neighbour.push(c + 1);
            }
            if j + 1 < ny {
                owner.push(c);
                neighbour.push(c + nx);
            }
        }
    }
    LduAddressing::new(nx * ny, owner, neighbour).unwrap()
}

/// Line of `n` cells with a boundary patch at each end.
pub fn line_mesh(n: usize) -> LduMesh {
    let addr = LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect()).unwrap();
    LduMesh::new(
        addr,
        vec![
            Some(Patch::new(PatchKind::Boundary, vec![0])),
            Some(Patch::new(PatchKind::Boundary, vec![n - 1])),
        ],
    )
    .unwrap()
}

/// Consecutive pairs of cells.
pub fn pairs(n: usize) -> RestrictionMap {
    RestrictionMap::new((0..n).map(|c| c / 2).collect(), n.div_ceil(2)).unwrap()
}

/// Two-rank Rayon comms (ranks 0 and 1).
pub fn rayons() -> (RayonComm, RayonComm) {
    (RayonComm::new(0, 2), RayonComm::new(1, 2))
}

/// What a fine face became: the (owner, neighbour) of its coarse face and the
/// flip, or the cell it collapsed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved {
    Face { owner: usize, neighbour: usize, flip: bool },
    Cell(usize),
}

pub fn resolve(coarse: &LduAddressing, face_restrict: &[FaceRestrict], flip: &[bool]) -> Vec<Resolved> {
    face_restrict
        .iter()
        .zip(flip)
        .map(|(&fr, &flip)| match fr {
            FaceRestrict::Coarse(f) => {
                let (owner, neighbour) = coarse.face(f);
                Resolved::Face { owner, neighbour, flip }
            }
            FaceRestrict::Collapsed(c) => Resolved::Cell(c),
        })
        .collect()
}

pub fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len(), "length differs");
    for (i, (a, b)) in got.iter().zip(want).enumerate() {
        let scale = a.abs().max(b.abs()).max(1.0);
        assert!((a - b).abs() <= tol * scale, "entry {i}: {a} vs {b}");
    }
}
