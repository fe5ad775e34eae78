mod util;
use util::*;

use bytemuck::{Pod, Zeroable, cast_slice};
use ldu_agglom::algs::communicator::{AgglomCommTags, CommTag, Communicator, NoComm, RayonComm, Wait};
use ldu_agglom::algs::gather::{exchange_labels, gather_bytes, gather_lists, gather_values};
use ldu_agglom::algs::wire::{KIND_LIST, WIRE_VERSION, WireAnnounce};
use ldu_agglom::mesh_error::AgglomError;
use serial_test::serial;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
struct WireU64 {
    x: u64,
}

#[test]
fn no_comm_is_nop() {
    let comm = NoComm;
    assert_eq!((comm.rank(), comm.size()), (0, 1));
    let mut buf = [0u8; 8];
    let h = comm.irecv(0, 123, &mut buf);
    assert!(h.wait().is_none());
    let s = comm.isend(0, 123, &[]);
    assert!(s.wait().is_none());
}

#[test]
#[serial]
fn rayon_comm_roundtrip_and_tag_isolation() {
    let (c0, c1) = rayons();

    const TAG_A: u16 = 0xC100;
    const TAG_B: u16 = 0xC200;

    let mut buf_a = [0u8; core::mem::size_of::<WireU64>()];
    let mut buf_b = [0u8; core::mem::size_of::<WireU64>()];
    let rxa = c1.irecv(0, TAG_A, &mut buf_a);
    let rxb = c1.irecv(0, TAG_B, &mut buf_b);

    let wa = [WireU64 {
        x: 0xDEAD_BEEF_F00D_F00D,
    }];
    let wb = [WireU64 {
        x: 0x0123_4567_89AB_CDEF,
    }];
    c0.isend(1, TAG_B, cast_slice(&wb));
    c0.isend(1, TAG_A, cast_slice(&wa));

    let ra = rxa.wait().expect("rxa");
    let rb = rxb.wait().expect("rxb");
    assert_eq!(&ra[..], cast_slice(&wa));
    assert_eq!(&rb[..], cast_slice(&wb));
}

#[test]
#[serial]
fn rayon_fifo_order() {
    let tag = CommTag(0xC300);
    let (c0, c1) = rayons();

    for i in 0..10u8 {
        let _ = c0.isend(1, tag.base(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        let h = c1.irecv(0, tag.base(), &mut b);
        out.push(h.wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
#[serial]
fn oversized_message_arrives_whole() {
    let tag = CommTag(0xC400);
    let (c0, c1) = rayons();

    let _ = c0.isend(1, tag.base(), &[1, 2, 3, 4, 5, 6]);
    let mut b = [0u8; 4];
    let h = c1.irecv(0, tag.base(), &mut b);
    assert_eq!(h.wait().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn tags_are_derived_from_one_base() {
    let tags = AgglomCommTags::from_base(CommTag::new(u16::MAX));
    assert_eq!(tags.interface.as_u16(), u16::MAX);
    assert_eq!(tags.mesh_header.as_u16(), 0);
    assert_eq!(tags.list.as_u16(), 3);
}

#[test]
#[serial]
fn labels_cross_between_two_ranks() {
    let (c0, c1) = rayons();
    let tag = CommTag::new(0xC500);
    let (r0, r1) = std::thread::scope(|s| {
        let h0 = s.spawn(|| exchange_labels(&c0, tag, &[(1, vec![7, 8]), (1, vec![9])]));
        let h1 = s.spawn(|| exchange_labels(&c1, tag, &[(0, vec![1, 2]), (0, vec![3])]));
        (h0.join().unwrap().unwrap(), h1.join().unwrap().unwrap())
    });
    assert_eq!(r0, vec![vec![1, 2], vec![3]]);
    assert_eq!(r1, vec![vec![7, 8], vec![9]]);
}

#[test]
#[serial]
fn short_reply_is_a_protocol_violation() {
    let (c0, c1) = rayons();
    let tag = CommTag::new(0xC600);
    let (r0, _) = std::thread::scope(|s| {
        let h0 = s.spawn(|| exchange_labels(&c0, tag, &[(1, vec![7, 8])]));
        let h1 = s.spawn(|| exchange_labels(&c1, tag, &[(0, vec![1])]));
        (h0.join().unwrap(), h1.join().unwrap())
    });
    assert!(matches!(r0, Err(AgglomError::ProtocolViolation { rank: 1, .. })));
}

#[test]
#[serial]
fn master_gathers_values_and_lists_in_group_order() {
    let tags = AgglomCommTags::from_base(CommTag::new(0xC700));
    let comms: Vec<RayonComm> = (0..3).map(|r| RayonComm::new(r, 3)).collect();
    let group = [2usize, 0, 1];
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|c| {
                s.spawn(move || {
                    let me = c.rank();
                    let n = gather_values(c, &tags, &group, (me * 10) as u64)?;
                    let l = gather_lists(c, &tags, &group, &vec![me; me + 1])?;
                    Ok::<_, AgglomError>((n, l))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });
    let (n, l) = &results[2];
    assert_eq!(n.as_deref(), Some(&[20u64, 0, 10][..]));
    assert_eq!(
        l.as_deref(),
        Some(&[vec![2, 2, 2], vec![0], vec![1, 1]][..])
    );
    assert!(results[0].0.is_none() && results[1].1.is_none());
}

#[test]
#[serial]
fn body_longer_than_announced_is_a_protocol_violation() {
    let (c0, c1) = rayons();
    let (ann, body) = (CommTag::new(0xC800), CommTag::new(0xC801));
    let a = [WireAnnounce::new(KIND_LIST, 8)];
    c1.isend(0, ann.as_u16(), cast_slice(&a));
    c1.isend(0, body.as_u16(), &[8u8; 16]);

    let err = gather_bytes(&c0, ann, body, &[0, 1], KIND_LIST, vec![1, 2]).unwrap_err();
    assert!(matches!(err, AgglomError::ProtocolViolation { rank: 1, .. }));
}

#[test]
#[serial]
fn announcement_from_another_wire_version_is_rejected() {
    let (c0, c1) = rayons();
    let (ann, body) = (CommTag::new(0xC900), CommTag::new(0xC901));
    let mut a = [WireAnnounce::new(KIND_LIST, 2)];
    a[0].hdr.version_le = (WIRE_VERSION + 1).to_le();
    c1.isend(0, ann.as_u16(), cast_slice(&a));
    c1.isend(0, body.as_u16(), &[1, 2]);

    let err = gather_bytes(&c0, ann, body, &[0, 1], KIND_LIST, Vec::new()).unwrap_err();
    match err {
        AgglomError::ProtocolViolation { rank: 1, reason } => assert!(reason.contains("version")),
        other => panic!("unexpected {other:?}"),
    }
}
