//! Fixed, versioned, little-endian wire types for agglomeration exchanges.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::{align_of, size_of};

use crate::mesh_error::AgglomError;
use crate::topology::{LduAddressing, LduMesh, Patch, PatchKind};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Copy `bytes` into freshly allocated records; `bytes` need not be aligned.
pub fn decode_records<T: Pod>(bytes: &[u8]) -> Result<Vec<T>, String> {
    let sz = size_of::<T>();
    if sz == 0 || bytes.len() % sz != 0 {
        return Err(format!(
            "{} bytes is not a whole number of {sz}-byte records",
            bytes.len()
        ));
    }
    let mut out = vec![T::zeroed(); bytes.len() / sz];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds carried in [`WireHdr`].
pub const KIND_MESH: u16 = 1;
pub const KIND_LIST: u16 = 2;

// All multi-byte integers in these structs are little-endian on the wire.
// They are stored pre-LE with `.to_le()` and decoded with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }

    /// Reject a header from another wire version or for another message kind.
    pub fn check(&self, kind: u16) -> Result<(), String> {
        if self.version() != WIRE_VERSION {
            return Err(format!(
                "wire version {} (expected {WIRE_VERSION})",
                self.version()
            ));
        }
        if self.kind() != kind {
            return Err(format!("message kind {} (expected {kind})", self.kind()));
        }
        Ok(())
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// Announces a message body: its kind and byte length.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireAnnounce {
    pub hdr: WireHdr,
    pub bytes: WireCount,
}

impl WireAnnounce {
    pub fn new(kind: u16, bytes: usize) -> Self {
        Self {
            hdr: WireHdr::new(kind),
            bytes: WireCount::new(bytes),
        }
    }
}

/// Leading record of a serialized mesh.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireMeshHdr {
    pub n_cells_le: u64,
    pub n_faces_le: u64,
    pub n_patches_le: u64,
}

/// One internal face.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireFace {
    pub owner_le: u64,
    pub neighbour_le: u64,
}

impl WireFace {
    pub fn new(owner: usize, neighbour: usize) -> Self {
        Self {
            owner_le: (owner as u64).to_le(),
            neighbour_le: (neighbour as u64).to_le(),
        }
    }
    pub fn get(&self) -> (usize, usize) {
        (
            u64::from_le(self.owner_le) as usize,
            u64::from_le(self.neighbour_le) as usize,
        )
    }
}

const PATCH_NONE: u32 = 0;
const PATCH_BOUNDARY: u32 = 1;
const PATCH_CYCLIC: u32 = 2;
const PATCH_PROCESSOR: u32 = 3;

/// Patch header; followed by `size` [`WireLabel`] face cells.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WirePatchHdr {
    pub kind_le: u32,
    pub flag_le: u32,
    pub a_le: u64,
    pub b_le: u64,
    pub size_le: u64,
}

impl WirePatchHdr {
    fn of(patch: Option<&Patch>) -> Self {
        let (kind, flag, a, b, size) = match patch {
            None => (PATCH_NONE, 0, 0, 0, 0),
            Some(p) => {
                let size = p.size() as u64;
                match p.kind {
                    PatchKind::Boundary => (PATCH_BOUNDARY, 0, 0, 0, size),
                    PatchKind::Cyclic { partner, owner } => {
                        (PATCH_CYCLIC, owner as u32, partner as u64, 0, size)
                    }
                    PatchKind::Processor {
                        my_proc,
                        neighb_proc,
                    } => (PATCH_PROCESSOR, 0, my_proc as u64, neighb_proc as u64, size),
                }
            }
        };
        Self {
            kind_le: kind.to_le(),
            flag_le: flag.to_le(),
            a_le: a.to_le(),
            b_le: b.to_le(),
            size_le: size.to_le(),
        }
    }

    fn kind(&self) -> Result<Option<PatchKind>, String> {
        let a = u64::from_le(self.a_le) as usize;
        let b = u64::from_le(self.b_le) as usize;
        match u32::from_le(self.kind_le) {
            PATCH_NONE => Ok(None),
            PATCH_BOUNDARY => Ok(Some(PatchKind::Boundary)),
            PATCH_CYCLIC => Ok(Some(PatchKind::Cyclic {
                partner: a,
                owner: u32::from_le(self.flag_le) != 0,
            })),
            PATCH_PROCESSOR => Ok(Some(PatchKind::Processor {
                my_proc: a,
                neighb_proc: b,
            })),
            other => Err(format!("unknown patch kind {other}")),
        }
    }

    fn size(&self) -> usize {
        u64::from_le(self.size_le) as usize
    }
}

/// A cell id or other index.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireLabel(pub u64);

impl WireLabel {
    pub fn of(v: usize) -> Self {
        Self((v as u64).to_le())
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.0) as usize
    }
}

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireAnnounce>(), 16);
const_assert_eq!(size_of::<WireMeshHdr>(), 24);
const_assert_eq!(size_of::<WireFace>(), 16);
const_assert_eq!(size_of::<WirePatchHdr>(), 32);
const_assert_eq!(size_of::<WireLabel>(), 8);
const_assert_eq!(align_of::<WirePatchHdr>(), 8);

/// Flatten `mesh` into one byte buffer.
pub fn encode_mesh(mesh: &LduMesh) -> Vec<u8> {
    let addr = mesh.addr();
    let hdr = WireMeshHdr {
        n_cells_le: (mesh.n_cells() as u64).to_le(),
        n_faces_le: (mesh.n_faces() as u64).to_le(),
        n_patches_le: (mesh.patches().len() as u64).to_le(),
    };
    let mut out = Vec::new();
    out.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
    let faces: Vec<WireFace> = addr
        .owner()
        .iter()
        .zip(addr.neighbour())
        .map(|(&o, &n)| WireFace::new(o, n))
        .collect();
    out.extend_from_slice(cast_slice(&faces));
    for patch in mesh.patches() {
        let ph = WirePatchHdr::of(patch.as_ref());
        out.extend_from_slice(cast_slice(std::slice::from_ref(&ph)));
        if let Some(p) = patch {
            let cells: Vec<WireLabel> = p.face_cells.iter().map(|&c| WireLabel::of(c)).collect();
            out.extend_from_slice(cast_slice(&cells));
        }
    }
    out
}

/// Inverse of [`encode_mesh`]. Any length or layout mismatch is a protocol
/// violation attributed to `rank`.
pub fn decode_mesh(rank: usize, bytes: &[u8]) -> Result<LduMesh, AgglomError> {
    let mut cursor = Cursor { bytes, pos: 0, rank };
    let hdr: WireMeshHdr = cursor.take_one()?;
    let n_cells = u64::from_le(hdr.n_cells_le) as usize;
    let n_faces = u64::from_le(hdr.n_faces_le) as usize;
    let n_patches = u64::from_le(hdr.n_patches_le) as usize;
    let faces: Vec<WireFace> = cursor.take(n_faces)?;
    let (owner, neighbour): (Vec<usize>, Vec<usize>) = faces.iter().map(WireFace::get).unzip();
    let mut patches = Vec::with_capacity(n_patches);
    for _ in 0..n_patches {
        let ph: WirePatchHdr = cursor.take_one()?;
        let kind = ph.kind().map_err(|e| AgglomError::protocol(rank, e))?;
        match kind {
            None => patches.push(None),
            Some(kind) => {
                let cells: Vec<WireLabel> = cursor.take(ph.size())?;
                patches.push(Some(Patch::new(
                    kind,
                    cells.iter().map(WireLabel::get).collect(),
                )));
            }
        }
    }
    if cursor.pos != bytes.len() {
        return Err(AgglomError::protocol(
            rank,
            format!("{} trailing bytes after mesh", bytes.len() - cursor.pos),
        ));
    }
    let addr = LduAddressing::new(n_cells, owner, neighbour)?;
    LduMesh::new(addr, patches)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    rank: usize,
}

impl Cursor<'_> {
    fn take<T: Pod>(&mut self, n: usize) -> Result<Vec<T>, AgglomError> {
        let len = n
            .checked_mul(size_of::<T>())
            .filter(|&len| self.pos + len <= self.bytes.len())
            .ok_or_else(|| {
                AgglomError::protocol(
                    self.rank,
                    format!(
                        "announced {n} records but only {} bytes remain",
                        self.bytes.len() - self.pos
                    ),
                )
            })?;
        let out = decode_records(&self.bytes[self.pos..self.pos + len])
            .map_err(|e| AgglomError::protocol(self.rank, e))?;
        self.pos += len;
        Ok(out)
    }

    fn take_one<T: Pod>(&mut self) -> Result<T, AgglomError> {
        let mut v = self.take::<T>(1)?;
        v.pop()
            .ok_or_else(|| AgglomError::protocol(self.rank, "empty record"))
    }
}
