//! Level mesh: LDU addressing plus boundary patches.
//!
//! A patch lists, for each of its faces, the internal cell the face is
//! attached to. Coupled patches (cyclic, processor) exchange cell data with a
//! partner; plain boundaries do not.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::algs::compressed::CompressedAddressing;
use crate::data::device::Device;
use crate::mesh_error::AgglomError;
use crate::topology::ldu::LduAddressing;

/// Boundary-condition variant of a patch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchKind {
    /// Physical boundary, no partner.
    Boundary,
    /// Periodic coupling to patch `partner` of the same mesh.
    Cyclic { partner: usize, owner: bool },
    /// Coupling to the process `neighb_proc`.
    Processor { my_proc: usize, neighb_proc: usize },
}

impl PatchKind {
    /// Registry tag of this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            PatchKind::Boundary => "boundary",
            PatchKind::Cyclic { .. } => "cyclic",
            PatchKind::Processor { .. } => "processor",
        }
    }

    pub fn is_coupled(&self) -> bool {
        !matches!(self, PatchKind::Boundary)
    }

    /// Whether this side orders coupled pairs as (mine, partner's).
    pub fn is_owner_side(&self) -> bool {
        match *self {
            PatchKind::Boundary => true,
            PatchKind::Cyclic { owner, .. } => owner,
            PatchKind::Processor {
                my_proc,
                neighb_proc,
            } => my_proc < neighb_proc,
        }
    }
}

/// Face-to-cell list of one boundary patch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub kind: PatchKind,
    pub face_cells: Vec<usize>,
}

impl Patch {
    pub fn new(kind: PatchKind, face_cells: Vec<usize>) -> Self {
        Self { kind, face_cells }
    }

    pub fn size(&self) -> usize {
        self.face_cells.len()
    }
}

/// Addressing of one level with its boundary patches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LduMesh {
    addr: LduAddressing,
    patches: Vec<Option<Patch>>,
}

impl LduMesh {
    pub fn new(addr: LduAddressing, patches: Vec<Option<Patch>>) -> Result<Self, AgglomError> {
        for (p, patch) in patches.iter().enumerate() {
            let Some(patch) = patch else { continue };
            if let Some(&c) = patch.face_cells.iter().find(|&&c| c >= addr.n_cells()) {
                return Err(AgglomError::inconsistent(format!(
                    "patch {p} addresses cell {c} outside {} cells",
                    addr.n_cells()
                )));
            }
            if let PatchKind::Cyclic { partner, .. } = patch.kind {
                let partner_size = patches.get(partner).and_then(|q| q.as_ref()).map(Patch::size);
                if partner_size != Some(patch.size()) {
                    return Err(AgglomError::inconsistent(format!(
                        "cyclic patch {p} has no partner patch {partner} of equal size"
                    )));
                }
            }
        }
        Ok(Self { addr, patches })
    }

    /// Mesh without patches.
    pub fn from_addressing(addr: LduAddressing) -> Self {
        Self {
            addr,
            patches: Vec::new(),
        }
    }

    pub fn addr(&self) -> &LduAddressing {
        &self.addr
    }

    pub fn n_cells(&self) -> usize {
        self.addr.n_cells()
    }

    pub fn n_faces(&self) -> usize {
        self.addr.n_faces()
    }

    pub fn patches(&self) -> &[Option<Patch>] {
        &self.patches
    }

    pub fn patch(&self, p: usize) -> Option<&Patch> {
        self.patches.get(p).and_then(Option::as_ref)
    }

    /// Cell values seen by the faces of patch `p`.
    pub fn interface_internal_field<T: Copy>(
        &self,
        p: usize,
        cell_values: &[T],
    ) -> Result<Vec<T>, AgglomError> {
        if cell_values.len() != self.n_cells() {
            return Err(AgglomError::SizeMismatch {
                expected: self.n_cells(),
                found: cell_values.len(),
            });
        }
        let patch = self
            .patch(p)
            .ok_or_else(|| AgglomError::inconsistent(format!("patch {p} is not set")))?;
        Ok(patch.face_cells.iter().map(|&c| cell_values[c]).collect())
    }

    /// Patch faces grouped by the cell they are attached to.
    ///
    /// `target` lists the distinct patch cells, and the faces of `target[g]`
    /// are `sort[target_start[g]..target_start[g + 1]]`.
    pub fn patch_addressing(
        &self,
        device: &Device,
        p: usize,
    ) -> Result<CompressedAddressing<usize>, AgglomError> {
        let patch = self
            .patch(p)
            .ok_or_else(|| AgglomError::inconsistent(format!("patch {p} is not set")))?;
        CompressedAddressing::build(device, &patch.face_cells)
    }

    pub fn release(&mut self) {
        self.addr.release();
        self.patches = Vec::new();
    }

    /// Merge the meshes of a process group into one mesh.
    ///
    /// `proc_ids[k]` owns `meshes[k]`; the first entry is the master. Cells are
    /// numbered consecutively in group order. Processor patches joining two
    /// members are turned into internal faces; all other patches are kept,
    /// processor patches being retargeted to `proc_master[neighb_proc]`.
    pub fn combine(
        proc_ids: &[usize],
        meshes: &[&LduMesh],
        proc_master: &[usize],
    ) -> Result<CombinedMesh, AgglomError> {
        if proc_ids.len() != meshes.len() || proc_ids.is_empty() {
            return Err(AgglomError::SizeMismatch {
                expected: proc_ids.len(),
                found: meshes.len(),
            });
        }
        let master = proc_ids[0];
        let slot_of: HashMap<usize, usize> =
            proc_ids.iter().enumerate().map(|(k, &p)| (p, k)).collect();

        let mut cell_offsets = Vec::with_capacity(meshes.len() + 1);
        cell_offsets.push(0);
        for m in meshes {
            cell_offsets.push(cell_offsets.last().copied().unwrap_or(0) + m.n_cells());
        }

        // Faces before ordering: (owner, neighbour) in combined numbering.
        let mut raw: Vec<(usize, usize)> = Vec::new();
        let mut raw_face_of: Vec<Vec<usize>> = Vec::with_capacity(meshes.len());
        for (k, m) in meshes.iter().enumerate() {
            let off = cell_offsets[k];
            let start = raw.len();
            raw.extend(
                m.addr()
                    .owner()
                    .iter()
                    .zip(m.addr().neighbour())
                    .map(|(&o, &n)| (o + off, n + off)),
            );
            raw_face_of.push((start..raw.len()).collect());
        }

        // Stitch processor patches internal to the group.
        let mut stitched_raw: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (k, m) in meshes.iter().enumerate() {
            for (p, patch) in m.patches().iter().enumerate() {
                let Some(Patch {
                    kind: PatchKind::Processor { neighb_proc, .. },
                    face_cells,
                }) = patch
                else {
                    continue;
                };
                let Some(&j) = slot_of.get(neighb_proc) else { continue };
                if j <= k {
                    continue;
                }
                let partner = meshes[j].patches().iter().position(|q| {
                    matches!(
                        q,
                        Some(Patch { kind: PatchKind::Processor { neighb_proc: back, .. }, .. })
                            if *back == proc_ids[k]
                    )
                });
                let Some(q) = partner else {
                    return Err(AgglomError::inconsistent(format!(
                        "processor patch {p} of proc {} has no partner on proc {neighb_proc}",
                        proc_ids[k]
                    )));
                };
                let Some(other) = meshes[j].patch(q).map(|pp| &pp.face_cells) else {
                    continue;
                };
                if other.len() != face_cells.len() {
                    return Err(AgglomError::inconsistent(format!(
                        "processor patch sizes differ between proc {} ({}) and proc {neighb_proc} ({})",
                        proc_ids[k],
                        face_cells.len(),
                        other.len()
                    )));
                }
                let mut ids = Vec::with_capacity(face_cells.len());
                for (&a, &b) in face_cells.iter().zip(other.iter()) {
                    let a = a + cell_offsets[k];
                    let b = b + cell_offsets[j];
                    ids.push(raw.len());
                    raw.push((a.min(b), a.max(b)));
                }
                stitched_raw.insert((j, q), ids.clone());
                stitched_raw.insert((k, p), ids);
            }
        }

        // Upper-triangular order with duplicate pairs merged.
        let order = (0..raw.len()).sorted_by_key(|&r| raw[r]).collect_vec();
        let mut new_id = vec![0usize; raw.len()];
        let mut owner = Vec::with_capacity(raw.len());
        let mut neighbour = Vec::with_capacity(raw.len());
        for r in order {
            let (o, n) = raw[r];
            if owner.last() != Some(&o) || neighbour.last() != Some(&n) {
                owner.push(o);
                neighbour.push(n);
            }
            new_id[r] = owner.len() - 1;
        }
        let addr = LduAddressing::new(cell_offsets[meshes.len()], owner, neighbour)?;

        let face_map = raw_face_of
            .iter()
            .map(|faces| faces.iter().map(|&r| new_id[r]).collect())
            .collect();

        // Kept patches: boundaries and cyclics in member order, then processor
        // patches ordered by (neighbour master, member proc pair) so that both
        // masters of a coupled pair list their shared patches identically.
        let mut kept: Vec<((usize, usize, usize, usize, usize), usize, usize)> = Vec::new();
        for (k, m) in meshes.iter().enumerate() {
            for (p, patch) in m.patches().iter().enumerate() {
                let Some(patch) = patch else { continue };
                if stitched_raw.contains_key(&(k, p)) {
                    continue;
                }
                let key = match patch.kind {
                    PatchKind::Processor { neighb_proc, .. } => {
                        let nb_master = master_of(proc_master, neighb_proc)?;
                        let me = proc_ids[k];
                        (1, nb_master, me.min(neighb_proc), me.max(neighb_proc), p)
                    }
                    _ => (0, k, p, 0, 0),
                };
                kept.push((key, k, p));
            }
        }
        kept.sort_unstable();

        let mut boundary_map: Vec<Vec<Option<usize>>> =
            meshes.iter().map(|m| vec![None; m.patches().len()]).collect();
        let mut patches = Vec::with_capacity(kept.len());
        for &(_, k, p) in &kept {
            let Some(patch) = meshes[k].patch(p) else { continue };
            let kind = match patch.kind {
                PatchKind::Processor { neighb_proc, .. } => PatchKind::Processor {
                    my_proc: master,
                    neighb_proc: master_of(proc_master, neighb_proc)?,
                },
                ref other => other.clone(),
            };
            boundary_map[k][p] = Some(patches.len());
            let off = cell_offsets[k];
            patches.push(Some(Patch::new(
                kind,
                patch.face_cells.iter().map(|&c| c + off).collect(),
            )));
        }

        // Cyclic partners are member-local patch indices; move them to the new numbering.
        for (k, m) in meshes.iter().enumerate() {
            for (p, new_p) in boundary_map[k].iter().enumerate() {
                let (Some(new_p), Some(PatchKind::Cyclic { partner: old, .. })) =
                    (*new_p, m.patch(p).map(|pp| &pp.kind))
                else {
                    continue;
                };
                let mapped = boundary_map[k].get(*old).copied().flatten().ok_or_else(|| {
                    AgglomError::inconsistent(format!(
                        "cyclic partner {old} of proc {} was not kept",
                        proc_ids[k]
                    ))
                })?;
                if let Some(Patch {
                    kind: PatchKind::Cyclic { partner, .. },
                    ..
                }) = patches[new_p].as_mut()
                {
                    *partner = mapped;
                }
            }
        }

        let boundary_face_map = meshes
            .iter()
            .enumerate()
            .map(|(k, m)| {
                (0..m.patches().len())
                    .map(|p| match stitched_raw.get(&(k, p)) {
                        Some(ids) => ids.iter().map(|&r| new_id[r]).collect(),
                        None => (0..m.patch(p).map_or(0, Patch::size)).collect(),
                    })
                    .collect()
            })
            .collect();

        Ok(CombinedMesh {
            mesh: LduMesh::new(addr, patches)?,
            cell_offsets,
            face_map,
            boundary_map,
            boundary_face_map,
        })
    }
}

fn master_of(proc_master: &[usize], proc: usize) -> Result<usize, AgglomError> {
    proc_master.get(proc).copied().ok_or_else(|| {
        AgglomError::inconsistent(format!(
            "processor {proc} is not covered by the agglomeration map ({} entries)",
            proc_master.len()
        ))
    })
}

/// Result of [`LduMesh::combine`] with the maps back to the contributions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedMesh {
    pub mesh: LduMesh,
    /// Start of each contribution's cells; one entry longer than the group.
    pub cell_offsets: Vec<usize>,
    /// Per contribution: old internal face → combined face.
    pub face_map: Vec<Vec<usize>>,
    /// Per contribution: old patch → combined patch, `None` when stitched.
    pub boundary_map: Vec<Vec<Option<usize>>>,
    /// Per contribution and patch: old patch face → combined patch face, or
    /// combined internal face when the patch was stitched.
    pub boundary_face_map: Vec<Vec<Vec<usize>>>,
}
