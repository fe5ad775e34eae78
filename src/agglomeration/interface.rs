//! Coarse boundary interfaces.
//!
//! Every patch of a fine level becomes a [`CoarseInterface`] on the next
//! level. Its faces are the distinct restricted cells seen by the fine patch:
//! plain boundaries group fine faces by local coarse cell, coupled patches by
//! the (owner side, neighbour side) pair of coarse cells, numbered in order of
//! first appearance so that both sides of a coupling agree.
//!
//! Construction goes through an [`InterfaceRegistry`] keyed by the patch type
//! tag, so callers can swap the constructor of a variant.

use hashbrown::HashMap;

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::agglomeration::addressing::MirroredAddressing;
use crate::algs::primitives::{gather, reduce_by_key, scatter};
use crate::data::Device;
use crate::mesh_error::AgglomError;
use crate::topology::{Patch, PatchKind};

/// Inputs handed to an interface constructor.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceArgs<'a> {
    pub index: usize,
    pub kind: &'a PatchKind,
    /// Restricted cell of every fine patch face on this side.
    pub local_restrict: &'a [usize],
    /// Restricted cell of every fine patch face on the partner side; empty
    /// for uncoupled patches.
    pub neighbour_restrict: &'a [usize],
    pub device: &'a Device,
}

/// Constructor registered for one patch type tag.
pub type InterfaceConstructor = fn(InterfaceArgs<'_>) -> Result<CoarseInterface, AgglomError>;

/// Type tag → constructor table.
#[derive(Clone)]
pub struct InterfaceRegistry {
    table: HashMap<&'static str, InterfaceConstructor>,
}

impl std::fmt::Debug for InterfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.table.keys().collect();
        tags.sort();
        f.debug_struct("InterfaceRegistry").field("tags", &tags).finish()
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register("boundary", CoarseInterface::uncoupled);
        r.register("cyclic", CoarseInterface::coupled);
        r.register("processor", CoarseInterface::coupled);
        r
    }
}

impl InterfaceRegistry {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register(&mut self, tag: &'static str, ctor: InterfaceConstructor) {
        self.table.insert(tag, ctor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.table.contains_key(tag)
    }

    pub fn construct(&self, args: InterfaceArgs<'_>) -> Result<CoarseInterface, AgglomError> {
        let tag = args.kind.type_name();
        let ctor = self
            .table
            .get(tag)
            .ok_or_else(|| AgglomError::UnknownInterfaceType(tag.to_string()))?;
        ctor(args)
    }
}

/// One coarse patch plus the restriction of the fine patch faces onto it.
#[derive(Clone, Debug)]
pub struct CoarseInterface {
    index: usize,
    kind: PatchKind,
    face_cells: Vec<usize>,
    face_restrict: MirroredAddressing<usize>,
}

impl CoarseInterface {
    /// Assemble from already computed addressing.
    pub fn new(
        index: usize,
        kind: PatchKind,
        face_cells: Vec<usize>,
        face_restrict: Vec<usize>,
        device: &Device,
    ) -> Result<Self, AgglomError> {
        Ok(Self {
            index,
            kind,
            face_cells,
            face_restrict: MirroredAddressing::build("patchFaceRestrict", face_restrict, device)?,
        })
    }

    /// Boundary without a partner: one coarse face per distinct local coarse cell.
    pub fn uncoupled(args: InterfaceArgs<'_>) -> Result<Self, AgglomError> {
        let mut slot: HashMap<usize, usize> = HashMap::new();
        let mut face_cells = Vec::new();
        let face_restrict: Vec<usize> = args
            .local_restrict
            .iter()
            .map(|&c| {
                *slot.entry(c).or_insert_with(|| {
                    face_cells.push(c);
                    face_cells.len() - 1
                })
            })
            .collect();
        Self::new(args.index, args.kind.clone(), face_cells, face_restrict, args.device)
    }

    /// Coupled patch: one coarse face per distinct (owner side, neighbour side)
    /// pair of coarse cells.
    pub fn coupled(args: InterfaceArgs<'_>) -> Result<Self, AgglomError> {
        if args.local_restrict.len() != args.neighbour_restrict.len() {
            return Err(AgglomError::SizeMismatch {
                expected: args.local_restrict.len(),
                found: args.neighbour_restrict.len(),
            });
        }
        let owner_side = args.kind.is_owner_side();
        let mut slot: HashMap<(usize, usize), usize> = HashMap::new();
        let mut face_cells = Vec::new();
        let face_restrict: Vec<usize> = args
            .local_restrict
            .iter()
            .zip(args.neighbour_restrict)
            .map(|(&mine, &theirs)| {
                let key = if owner_side {
                    (mine, theirs)
                } else {
                    (theirs, mine)
                };
                *slot.entry(key).or_insert_with(|| {
                    face_cells.push(mine);
                    face_cells.len() - 1
                })
            })
            .collect();
        Self::new(args.index, args.kind.clone(), face_cells, face_restrict, args.device)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &PatchKind {
        &self.kind
    }

    /// Number of coarse faces.
    pub fn size(&self) -> usize {
        self.face_cells.len()
    }

    /// Coarse cell of every coarse face.
    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    /// Fine patch face → coarse patch face.
    pub fn face_restrict_addressing(&self) -> Result<&[usize], AgglomError> {
        self.face_restrict.values().host()
    }

    pub fn face_restrict(&self) -> &MirroredAddressing<usize> {
        &self.face_restrict
    }

    /// The coarse patch as it appears in the coarse mesh.
    pub fn patch(&self) -> Patch {
        Patch::new(self.kind.clone(), self.face_cells.clone())
    }

    /// Cell values seen by the coarse faces.
    pub fn interface_internal_field<T: Copy>(&self, cell_values: &[T]) -> Result<Vec<T>, AgglomError> {
        self.face_cells
            .iter()
            .map(|&c| {
                cell_values.get(c).copied().ok_or(AgglomError::OutOfBoundsAddressing {
                    max: c,
                    size: cell_values.len(),
                })
            })
            .collect()
    }

    /// Telescope through the next interface: fine faces map straight onto
    /// `coarser`'s faces, and the coarse faces become `coarser`'s.
    pub fn combine(&mut self, coarser: &CoarseInterface, device: &Device) -> Result<(), AgglomError> {
        let next = coarser.face_restrict.values().device()?;
        let cur = self.face_restrict.values().device()?;
        if let Some(&bad) = cur.iter().find(|&&e| e >= next.len()) {
            return Err(AgglomError::OutOfBoundsAddressing {
                max: bad,
                size: next.len(),
            });
        }
        let composed = gather(device, next, cur);
        self.face_restrict.release();
        self.face_restrict = MirroredAddressing::build("patchFaceRestrict", composed, device)?;
        self.face_cells = coarser.face_cells.clone();
        Ok(())
    }

    fn check_coeffs(&self, n: usize, check_addressing: bool) -> Result<&[usize], AgglomError> {
        let addr = self.face_restrict.values().device()?;
        if n != addr.len() {
            return Err(AgglomError::SizeMismatch {
                expected: addr.len(),
                found: n,
            });
        }
        if check_addressing {
            if let Some(&max) = addr.iter().max().filter(|&&m| m >= self.size()) {
                return Err(AgglomError::OutOfBoundsAddressing {
                    max,
                    size: self.size(),
                });
            }
        }
        Ok(addr)
    }

    /// Sum fine face coefficients into the coarse faces: sort by coarse face,
    /// reduce runs, scatter into a zeroed coarse array.
    pub fn agglomerate_coeffs<T>(
        &self,
        device: &Device,
        fine_coeffs: &[T],
        check_addressing: bool,
    ) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let addr = self.check_coeffs(fine_coeffs.len(), check_addressing)?;
        let sort = &self.face_restrict.compressed().sort;
        let keys = gather(device, addr, sort);
        let vals = gather(device, fine_coeffs, sort);
        let (targets, sums) = reduce_by_key(device, &keys, &vals, T::zero(), |a, b| a + b)?;
        let mut coarse = vec![T::zero(); self.size()];
        scatter(&sums, &targets, &mut coarse)?;
        Ok(coarse)
    }

    /// Sequential reference of [`agglomerate_coeffs`](Self::agglomerate_coeffs).
    pub fn agglomerate_coeffs_host<T>(
        &self,
        fine_coeffs: &[T],
        check_addressing: bool,
    ) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let addr = self.check_coeffs(fine_coeffs.len(), check_addressing)?;
        let mut coarse = vec![T::zero(); self.size()];
        for (&a, &v) in addr.iter().zip(fine_coeffs) {
            let slot = coarse.get_mut(a).ok_or(AgglomError::OutOfBoundsAddressing {
                max: a,
                size: self.size(),
            })?;
            *slot = *slot + v;
        }
        Ok(coarse)
    }

    /// Stored form: face cells, then face restriction addressing.
    pub fn persisted(&self) -> Result<PersistedInterface, AgglomError> {
        Ok(PersistedInterface {
            face_cells: self.face_cells.clone(),
            face_restrict_addressing: self.face_restrict_addressing()?.to_vec(),
        })
    }

    /// Rebuild from the stored form.
    pub fn from_persisted(
        index: usize,
        kind: PatchKind,
        stored: PersistedInterface,
        device: &Device,
    ) -> Result<Self, AgglomError> {
        Self::new(
            index,
            kind,
            stored.face_cells,
            stored.face_restrict_addressing,
            device,
        )
    }

    pub fn release(&mut self) {
        self.face_cells = Vec::new();
        self.face_restrict.release();
    }
}

/// Serialized coarse interface. Field order is the stored order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedInterface {
    pub face_cells: Vec<usize>,
    pub face_restrict_addressing: Vec<usize>,
}
