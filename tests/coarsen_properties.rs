mod util;

use std::collections::HashSet;

use ldu_agglom::agglomeration::{coarsen, compose_face_restrict};
use ldu_agglom::mesh_error::AgglomError;
use ldu_agglom::topology::{FaceRestrict, RestrictionMap};
use proptest::prelude::*;
use util::{Resolved, grid, resolve};

/// Grid dimensions plus a restriction map onto `c` coarse cells.
fn grid_and_map() -> impl Strategy<Value = (usize, usize, usize, Vec<usize>)> {
    (1usize..7, 1usize..7, 1usize..9).prop_flat_map(|(nx, ny, c)| {
        (
            Just(nx),
            Just(ny),
            Just(c),
            prop::collection::vec(0..c, nx * ny),
        )
    })
}

/// Two chained maps: fine → `c1`, then `c1` → `c2`.
fn two_steps() -> impl Strategy<Value = (usize, usize, Vec<usize>, usize, Vec<usize>)> {
    (1usize..7, 1usize..7, 1usize..10, 1usize..6).prop_flat_map(|(nx, ny, c1, c2)| {
        (
            Just(nx),
            Just(ny),
            prop::collection::vec(0..c1, nx * ny),
            Just(c2),
            prop::collection::vec(0..c2, c1),
        )
    })
}

proptest! {
    #[test]
    fn coarse_faces_are_canonical_and_unique((nx, ny, c, map) in grid_and_map()) {
        let fine = grid(nx, ny);
        let r = RestrictionMap::new(map, c).unwrap();
        let out = coarsen(&fine, &r, 4).unwrap();
        let mut seen = HashSet::new();
        for f in 0..out.addr.n_faces() {
            let (o, n) = out.addr.face(f);
            prop_assert!(o < n);
            prop_assert!(seen.insert((o, n)), "pair ({o}, {n}) repeated");
        }
        prop_assert!(out.addr.owner().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn every_fine_face_resolves((nx, ny, c, map) in grid_and_map()) {
        let fine = grid(nx, ny);
        let r = RestrictionMap::new(map.clone(), c).unwrap();
        let out = coarsen(&fine, &r, 2).unwrap();
        prop_assert_eq!(out.face_restrict.len(), fine.n_faces());
        for f in 0..fine.n_faces() {
            let (o, n) = fine.face(f);
            let (ro, rn) = (map[o], map[n]);
            match out.face_restrict[f] {
                FaceRestrict::Collapsed(cell) => {
                    prop_assert_eq!(ro, rn);
                    prop_assert_eq!(cell, ro);
                    prop_assert!(!out.face_flip[f]);
                }
                FaceRestrict::Coarse(cf) => {
                    let (co, cn) = out.addr.face(cf);
                    if out.face_flip[f] {
                        prop_assert_eq!((co, cn), (rn, ro));
                    } else {
                        prop_assert_eq!((co, cn), (ro, rn));
                    }
                }
            }
        }
    }

    #[test]
    fn two_steps_match_one((nx, ny, m1, c2, m2) in two_steps()) {
        let fine = grid(nx, ny);
        let c1 = m2.len();
        let r1 = RestrictionMap::new(m1, c1).unwrap();
        let r2 = RestrictionMap::new(m2, c2).unwrap();

        let step1 = coarsen(&fine, &r1, 10).unwrap();
        let step2 = coarsen(&step1.addr, &r2, 10).unwrap();
        let (fr, flip) = compose_face_restrict(
            &step1.face_restrict,
            &step1.face_flip,
            &step2.face_restrict,
            &step2.face_flip,
            &r2,
        )
        .unwrap();

        let direct = coarsen(&fine, &r1.compose(&r2).unwrap(), 10).unwrap();

        prop_assert_eq!(step2.addr.n_faces(), direct.addr.n_faces());
        let composed: Vec<Resolved> = resolve(&step2.addr, &fr, &flip);
        let expected: Vec<Resolved> = resolve(&direct.addr, &direct.face_restrict, &direct.face_flip);
        prop_assert_eq!(composed, expected);

        let faces = |a: &ldu_agglom::topology::LduAddressing| {
            (0..a.n_faces()).map(|f| a.face(f)).collect::<HashSet<_>>()
        };
        prop_assert_eq!(faces(&step2.addr), faces(&direct.addr));
    }
}

#[test]
fn unassigned_cell_is_rejected() {
    let err = RestrictionMap::from_assignments(&[Some(0), None, Some(1)], 2).unwrap_err();
    assert!(matches!(err, AgglomError::InconsistentInput(_)));
}

#[test]
fn entry_past_coarse_count_is_rejected() {
    assert!(matches!(
        RestrictionMap::new(vec![0, 2], 2),
        Err(AgglomError::InconsistentInput(_))
    ));
}

#[test]
fn identity_map_keeps_every_face() {
    let fine = grid(3, 2);
    let r = RestrictionMap::new((0..6).collect(), 6).unwrap();
    let out = coarsen(&fine, &r, 1).unwrap();
    assert_eq!(out.addr, fine);
    assert_eq!(
        out.face_restrict,
        (0..fine.n_faces()).map(FaceRestrict::Coarse).collect::<Vec<_>>()
    );
    assert_eq!(out.n_flipped(), 0);
}

#[test]
fn everything_into_one_cell_collapses_every_face() {
    let fine = grid(4, 4);
    let r = RestrictionMap::new(vec![0; 16], 1).unwrap();
    let out = coarsen(&fine, &r, 10).unwrap();
    assert_eq!(out.addr.n_faces(), 0);
    assert_eq!(out.n_collapsed(), fine.n_faces());
}
