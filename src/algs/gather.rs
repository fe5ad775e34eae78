//! Group gathers and neighbour exchanges used by agglomeration.
//!
//! A gather runs over a process group whose first entry is the master. Every
//! other member announces the byte length of its contribution, then sends the
//! body; the master waits for all announcements before posting the body
//! receives. A body whose length differs from its announcement is a
//! [`AgglomError::ProtocolViolation`]. Like the completion exchanges, every
//! handle is drained before returning, even on error.

use bytemuck::Pod;

use crate::algs::communicator::{AgglomCommTags, CommTag, Communicator, Wait};
use crate::algs::wire::{
    KIND_LIST, KIND_MESH, WireAnnounce, WireLabel, cast_slice, cast_slice_mut, decode_mesh,
    decode_records, encode_mesh, expect_exact_len,
};
use crate::mesh_error::AgglomError;
use crate::topology::LduMesh;

/// Raw byte gather. The master gets every contribution in group order (its
/// own first); other members get `None`.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    announce_tag: CommTag,
    body_tag: CommTag,
    procs: &[usize],
    kind: u16,
    payload: Vec<u8>,
) -> Result<Option<Vec<Vec<u8>>>, AgglomError> {
    let me = comm.rank();
    let Some(&master) = procs.first() else {
        return Err(AgglomError::inconsistent("gather over an empty group"));
    };
    if !procs.contains(&me) {
        return Err(AgglomError::inconsistent(format!(
            "rank {me} is not a member of group {procs:?}"
        )));
    }

    if me != master {
        let ann = WireAnnounce::new(kind, payload.len());
        let h1 = comm.isend(
            master,
            announce_tag.as_u16(),
            cast_slice(std::slice::from_ref(&ann)),
        );
        let h2 = comm.isend(master, body_tag.as_u16(), &payload);
        let _ = h1.wait();
        let _ = h2.wait();
        return Ok(None);
    }

    let others = &procs[1..];

    // 1) announcements
    let mut pending = Vec::with_capacity(others.len());
    for &p in others {
        let mut ann = WireAnnounce::new(kind, 0);
        let h = comm.irecv(
            p,
            announce_tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut ann)),
        );
        pending.push((p, h));
    }
    let mut lens = Vec::with_capacity(others.len());
    let mut maybe_err = None;
    for (p, h) in pending {
        let got = h.wait();
        if maybe_err.is_some() {
            continue;
        }
        match got {
            None => {
                maybe_err = Some(AgglomError::CommError {
                    neighbor: p,
                    reason: "no size announcement received".into(),
                })
            }
            Some(data) => match decode_records::<WireAnnounce>(&data) {
                Ok(v) if v.len() == 1 => match v[0].hdr.check(kind) {
                    Ok(()) => lens.push(v[0].bytes.get()),
                    Err(e) => maybe_err = Some(AgglomError::protocol(p, e)),
                },
                Ok(v) => {
                    maybe_err = Some(AgglomError::protocol(
                        p,
                        format!("expected one announcement, got {}", v.len()),
                    ))
                }
                Err(e) => maybe_err = Some(AgglomError::protocol(p, e)),
            },
        }
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // 2) bodies
    let mut pending = Vec::with_capacity(others.len());
    for (&p, &len) in others.iter().zip(&lens) {
        let mut buf = vec![0u8; len];
        pending.push((p, len, comm.irecv(p, body_tag.as_u16(), &mut buf)));
    }
    let mut out = Vec::with_capacity(procs.len());
    out.push(payload);
    for (p, len, h) in pending {
        let got = h.wait();
        if maybe_err.is_some() {
            continue;
        }
        match got {
            None => {
                maybe_err = Some(AgglomError::CommError {
                    neighbor: p,
                    reason: "no body received".into(),
                })
            }
            Some(data) => match expect_exact_len(data.len(), len) {
                Ok(()) => out.push(data),
                Err(e) => maybe_err = Some(AgglomError::protocol(p, e)),
            },
        }
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(Some(out)),
    }
}

/// Gather one plain value per member.
pub fn gather_values<C, T>(
    comm: &C,
    tags: &AgglomCommTags,
    procs: &[usize],
    value: T,
) -> Result<Option<Vec<T>>, AgglomError>
where
    C: Communicator,
    T: Pod,
{
    let payload = cast_slice(std::slice::from_ref(&value)).to_vec();
    let Some(parts) = gather_bytes(comm, tags.value, tags.list, procs, KIND_LIST, payload)? else {
        return Ok(None);
    };
    procs
        .iter()
        .zip(parts)
        .map(|(&p, bytes)| {
            let mut v = decode_records::<T>(&bytes).map_err(|e| AgglomError::protocol(p, e))?;
            match (v.pop(), v.is_empty()) {
                (Some(x), true) => Ok(x),
                _ => Err(AgglomError::protocol(p, "expected exactly one value")),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Gather one index list per member.
pub fn gather_lists<C: Communicator>(
    comm: &C,
    tags: &AgglomCommTags,
    procs: &[usize],
    list: &[usize],
) -> Result<Option<Vec<Vec<usize>>>, AgglomError> {
    let wire: Vec<WireLabel> = list.iter().map(|&v| WireLabel::of(v)).collect();
    let payload = cast_slice(&wire).to_vec();
    let Some(parts) = gather_bytes(comm, tags.value, tags.list, procs, KIND_LIST, payload)? else {
        return Ok(None);
    };
    procs
        .iter()
        .zip(parts)
        .map(|(&p, bytes)| {
            decode_records::<WireLabel>(&bytes)
                .map(|v| v.iter().map(WireLabel::get).collect())
                .map_err(|e| AgglomError::protocol(p, e))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Gather every member's mesh at the master, in group order.
pub fn gather_meshes<C: Communicator>(
    comm: &C,
    tags: &AgglomCommTags,
    procs: &[usize],
    mesh: &LduMesh,
) -> Result<Option<Vec<LduMesh>>, AgglomError> {
    let payload = encode_mesh(mesh);
    let Some(parts) = gather_bytes(
        comm,
        tags.mesh_header,
        tags.mesh_body,
        procs,
        KIND_MESH,
        payload,
    )?
    else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(procs.len());
    out.push(mesh.clone());
    for (&p, bytes) in procs.iter().zip(parts).skip(1) {
        out.push(decode_mesh(p, &bytes)?);
    }
    Ok(Some(out))
}

/// Swap index lists with neighbouring ranks.
///
/// `sends[i] = (peer, values)`; the reply from `peer` must have the same
/// length. Several entries may share a peer: messages to one peer are matched
/// in order. Receives are posted first, then sends, then everything is waited.
pub fn exchange_labels<C: Communicator>(
    comm: &C,
    tag: CommTag,
    sends: &[(usize, Vec<usize>)],
) -> Result<Vec<Vec<usize>>, AgglomError> {
    let mut recvs = Vec::with_capacity(sends.len());
    for (peer, values) in sends {
        let mut buf = vec![WireLabel::of(0); values.len()];
        recvs.push((*peer, values.len(), comm.irecv(*peer, tag.as_u16(), cast_slice_mut(&mut buf))));
    }

    let mut pending_sends = Vec::with_capacity(sends.len());
    let mut send_bufs = Vec::with_capacity(sends.len());
    for (peer, values) in sends {
        let wire: Vec<WireLabel> = values.iter().map(|&v| WireLabel::of(v)).collect();
        pending_sends.push(comm.isend(*peer, tag.as_u16(), cast_slice(&wire)));
        send_bufs.push(wire);
    }

    let mut out = Vec::with_capacity(sends.len());
    let mut maybe_err = None;
    for (peer, n, h) in recvs {
        let got = h.wait();
        if maybe_err.is_some() {
            continue;
        }
        let expected = n * std::mem::size_of::<WireLabel>();
        match got {
            Some(data) if data.len() == expected => match decode_records::<WireLabel>(&data) {
                Ok(v) => out.push(v.iter().map(WireLabel::get).collect()),
                Err(e) => maybe_err = Some(AgglomError::protocol(peer, e)),
            },
            Some(data) => {
                maybe_err = Some(AgglomError::protocol(
                    peer,
                    format!("expected {expected} bytes, got {}", data.len()),
                ))
            }
            None => {
                maybe_err = Some(AgglomError::CommError {
                    neighbor: peer,
                    reason: "no interface values received".into(),
                })
            }
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}
