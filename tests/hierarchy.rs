mod util;

use ldu_agglom::algs::communicator::NoComm;
use ldu_agglom::algs::ldu_ops::amul;
use ldu_agglom::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use util::{Resolved, assert_close, grid, line_mesh, pairs, resolve};

/// 2 × 2 blocks of an `n × n` grid, `n` even.
fn blocks(n: usize) -> RestrictionMap {
    let m = n / 2;
    RestrictionMap::new(
        (0..n * n).map(|c| (c / n / 2) * m + (c % n) / 2).collect(),
        m * m,
    )
    .unwrap()
}

fn random_coeffs(rng: &mut SmallRng, n_cells: usize, n_faces: usize) -> LduCoeffs<f64> {
    LduCoeffs {
        diag: (0..n_cells).map(|_| rng.gen_range(1.0..5.0)).collect(),
        upper: (0..n_faces).map(|_| rng.gen_range(-1.0..0.0)).collect(),
        lower: (0..n_faces).map(|_| rng.gen_range(-1.0..0.0)).collect(),
    }
}

#[test]
fn coarse_matrix_is_galerkin_product() {
    let mut agg =
        Agglomeration::new(LduMesh::from_addressing(grid(6, 6)), AgglomerationConfig::default())
            .unwrap();
    // Reversed block numbering so some faces flip.
    let r = blocks(6);
    let n_coarse = r.n_coarse();
    let reversed = RestrictionMap::new(
        r.as_slice().iter().map(|&c| n_coarse - 1 - c).collect(),
        n_coarse,
    )
    .unwrap();
    agg.agglomerate(&NoComm, reversed).unwrap();
    assert!(agg.face_flip_map(0).unwrap().iter().any(|&f| f));

    let mut rng = SmallRng::seed_from_u64(11);
    let fine = agg.mesh_level(0).unwrap().addr().clone();
    let a = random_coeffs(&mut rng, fine.n_cells(), fine.n_faces());
    let ac = agg.agglomerate_matrix_coeffs(0, &a).unwrap();
    let coarse = agg.mesh_level(1).unwrap().addr().clone();
    let device = agg.device().clone();

    let xc: Vec<f64> = (0..coarse.n_cells()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let px = agg.prolong_field(0, &xc).unwrap();
    let apx = amul(&device, &fine, &a.diag, &a.lower, &a.upper, &px).unwrap();
    let rapx = agg.restrict_field(0, &apx).unwrap();
    let acx = amul(&device, &coarse, &ac.diag, &ac.lower, &ac.upper, &xc).unwrap();
    assert_close(&acx, &rapx, 1e-12);
}

#[test]
fn combined_level_equals_direct_agglomeration() {
    let step1 = blocks(8);
    let step2 = blocks(4);

    let mut two = Agglomeration::new(LduMesh::from_addressing(grid(8, 8)), Default::default()).unwrap();
    two.agglomerate(&NoComm, step1.clone()).unwrap();
    two.agglomerate(&NoComm, step2.clone()).unwrap();
    two.combine_levels(1).unwrap();

    let mut one = Agglomeration::new(LduMesh::from_addressing(grid(8, 8)), Default::default()).unwrap();
    one.agglomerate(&NoComm, step1.compose(&step2).unwrap()).unwrap();

    assert_eq!(two.n_levels(), 1);
    assert_eq!(two.restrict_addressing(0).unwrap(), one.restrict_addressing(0).unwrap());
    assert_eq!(two.n_faces(0).unwrap(), one.n_faces(0).unwrap());
    let resolved = |agg: &Agglomeration| -> Vec<Resolved> {
        resolve(
            agg.mesh_level(1).unwrap().addr(),
            agg.face_restrict_addressing(0).unwrap(),
            agg.face_flip_map(0).unwrap(),
        )
    };
    assert_eq!(resolved(&two), resolved(&one));

    // Device copies were rebuilt for the telescoped level.
    let enc = two.face_restrict_device_addressing(0).unwrap();
    let host: Vec<i64> = two
        .face_restrict_addressing(0)
        .unwrap()
        .iter()
        .map(|fr| fr.encode())
        .collect();
    assert_eq!(enc.values().device().unwrap(), host.as_slice());
}

#[test]
fn boundary_interfaces_follow_their_cells() {
    let mut agg = Agglomeration::new(line_mesh(6), Default::default()).unwrap();
    agg.agglomerate(&NoComm, pairs(6)).unwrap();
    let coarse = agg.interface_level(1).unwrap();
    assert_eq!(coarse[0].as_ref().unwrap().face_cells, vec![0]);
    assert_eq!(coarse[1].as_ref().unwrap().face_cells, vec![2]);
    assert_eq!(
        agg.agglomerate_interface_coeffs(0, 1, &[2.5]).unwrap(),
        vec![2.5]
    );
}

#[test]
fn cyclic_patches_agglomerate_against_their_partner() {
    let addr = LduAddressing::new(4, vec![0, 1, 2], vec![1, 2, 3]).unwrap();
    let mesh = LduMesh::new(
        addr,
        vec![
            Some(Patch::new(PatchKind::Cyclic { partner: 1, owner: true }, vec![0, 1])),
            Some(Patch::new(PatchKind::Cyclic { partner: 0, owner: false }, vec![3, 2])),
        ],
    )
    .unwrap();
    let mut agg = Agglomeration::new(mesh, Default::default()).unwrap();
    agg.agglomerate(&NoComm, RestrictionMap::new(vec![0, 0, 1, 1], 2).unwrap())
        .unwrap();
    let faces = agg.patch_face_restrict_addressing(0).unwrap();
    assert_eq!(faces[0], Some(&[0usize, 0][..]));
    assert_eq!(faces[0], faces[1]);
    assert_eq!(agg.n_patch_faces(0).unwrap(), vec![1, 1]);
}

#[test]
fn unregistered_patch_type_stops_agglomeration() {
    let mut agg = Agglomeration::new(line_mesh(4), Default::default())
        .unwrap()
        .with_registry(InterfaceRegistry::empty());
    assert_eq!(
        agg.agglomerate(&NoComm, pairs(4)),
        Err(AgglomError::UnknownInterfaceType("boundary".into()))
    );
}

#[test]
fn restriction_of_the_wrong_size_is_inconsistent() {
    let mut agg = Agglomeration::new(line_mesh(4), Default::default()).unwrap();
    assert!(matches!(
        agg.agglomerate(&NoComm, pairs(6)),
        Err(AgglomError::InconsistentInput(_))
    ));
    assert_eq!(agg.n_levels(), 0);
}

#[test]
fn only_the_last_level_can_be_rebuilt() {
    let mut agg = Agglomeration::new(line_mesh(8), Default::default()).unwrap();
    agg.agglomerate(&NoComm, pairs(8)).unwrap();
    agg.agglomerate(&NoComm, pairs(4)).unwrap();
    assert!(matches!(
        agg.agglomerate_ldu_addressing(&NoComm, 0),
        Err(AgglomError::InconsistentInput(_))
    ));
    assert_eq!(agg.n_cells(1), Ok(2));
    agg.agglomerate_ldu_addressing(&NoComm, 1).unwrap();
    assert_eq!(agg.n_levels(), 2);
    assert_eq!(agg.n_cells(1), Ok(2));
    assert_eq!(agg.n_faces(1), Ok(1));
}

#[test]
fn deserialized_restriction_is_validated_before_coarsening() {
    let good: RestrictionMap = serde_json::from_str(r#"{"map":[0,0,1,1],"n_coarse":2}"#).unwrap();
    let mut agg = Agglomeration::new(line_mesh(4), Default::default()).unwrap();
    agg.agglomerate(&NoComm, good).unwrap();
    assert_eq!(agg.n_faces(0), Ok(1));

    let bad = serde_json::from_str::<RestrictionMap>(r#"{"map":[5,6],"n_coarse":1}"#);
    assert!(bad.is_err());
}

#[test]
fn queries_on_missing_levels_fail() {
    let mut agg = Agglomeration::new(line_mesh(8), Default::default()).unwrap();
    assert_eq!(agg.n_cells(0), Err(AgglomError::MissingLevel(0)));
    agg.agglomerate(&NoComm, pairs(8)).unwrap();
    assert_eq!(agg.n_cells(0), Ok(4));
    assert!(matches!(agg.mesh_level(2), Err(AgglomError::MissingLevel(2))));
    assert!(agg.combine_levels(1).is_err());
    agg.clear_level(0);
    assert!(matches!(agg.face_flip_map(0), Err(AgglomError::MissingLevel(0))));
    assert!(matches!(agg.coarse_interfaces(0), Err(AgglomError::MissingLevel(0))));
}

#[test]
fn dedicated_device_gives_the_same_hierarchy() {
    let config = AgglomerationConfig {
        device_threads: Some(2),
        initial_neighbour_guess: 1,
        ..Default::default()
    };
    let mut a = Agglomeration::new(LduMesh::from_addressing(grid(8, 8)), config).unwrap();
    let mut b = Agglomeration::new(LduMesh::from_addressing(grid(8, 8)), Default::default()).unwrap();
    assert_eq!(a.device().threads(), 2);
    for agg in [&mut a, &mut b] {
        agg.agglomerate(&NoComm, blocks(8)).unwrap();
    }
    assert_eq!(a.mesh_level(1).unwrap(), b.mesh_level(1).unwrap());
    assert_eq!(
        a.face_restrict_addressing(0).unwrap(),
        b.face_restrict_addressing(0).unwrap()
    );
}
