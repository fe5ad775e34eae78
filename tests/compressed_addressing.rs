use ldu_agglom::DebugInvariants;
use ldu_agglom::algs::CompressedAddressing;
use ldu_agglom::algs::ldu_ops::patch_reduce;
use ldu_agglom::data::Device;
use ldu_agglom::topology::{LduAddressing, LduMesh, Patch, PatchKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn device_build_matches_host(keys in prop::collection::vec(0u32..20, 0..200)) {
        let dev = CompressedAddressing::build(&Device::with_threads(3).unwrap(), &keys).unwrap();
        let host = CompressedAddressing::build_host(&keys);
        prop_assert_eq!(&dev, &host);
        prop_assert!(dev.validate_invariants().is_ok());
    }

    #[test]
    fn groups_count_occurrences(keys in prop::collection::vec(0i64..12, 0..150)) {
        let ca = CompressedAddressing::build(&Device::global(), &keys).unwrap();
        let sorted: Vec<i64> = ca.sort.iter().map(|&i| keys[i]).collect();
        prop_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        for (g, &k) in ca.target.iter().enumerate() {
            let count = keys.iter().filter(|&&x| x == k).count();
            prop_assert_eq!(ca.target_start[g + 1] - ca.target_start[g], count);
        }
        prop_assert_eq!(ca.target_start.last().copied(), Some(keys.len()));
    }
}

#[test]
fn sort_is_stable_within_groups() {
    let ca = CompressedAddressing::build(&Device::global(), &[2u32, 0, 2, 1, 0, 2]).unwrap();
    assert_eq!(ca.target, vec![0, 1, 2]);
    assert_eq!(ca.target_start, vec![0, 2, 3, 6]);
    assert_eq!(ca.group(0), &[1, 4]);
    assert_eq!(ca.group(2), &[0, 2, 5]);
}

#[test]
fn empty_keys_give_one_offset() {
    let ca = CompressedAddressing::<usize>::build(&Device::global(), &[]).unwrap();
    assert_eq!(ca.n_groups(), 0);
    assert_eq!(ca.target_start, vec![0]);
}

#[test]
fn patch_faces_reduce_onto_cells() {
    let addr = LduAddressing::new(3, vec![0, 1], vec![1, 2]).unwrap();
    let mesh = LduMesh::new(
        addr,
        vec![Some(Patch::new(PatchKind::Boundary, vec![2, 0, 2]))],
    )
    .unwrap();
    let device = Device::global();
    let pa = mesh.patch_addressing(&device, 0).unwrap();
    assert_eq!(pa.target, vec![0, 2]);
    let per_cell = patch_reduce(&device, 3, &pa, &[1.0, 2.0, 4.0]).unwrap();
    assert_eq!(per_cell, vec![2.0, 0.0, 5.0]);
}
