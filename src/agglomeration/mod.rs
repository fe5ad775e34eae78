//! Multigrid hierarchy built by repeated agglomeration of LDU addressing.
//!
//! Level `i` of an [`Agglomeration`] holds the restriction from mesh level
//! `i` to mesh level `i + 1` together with the coarse mesh it produced.
//! Mesh level 0 is the fine mesh handed to [`Agglomeration::new`].
//!
//! Typical use: supply a cell restriction map per level with
//! [`Agglomeration::agglomerate`], optionally telescope two steps with
//! [`Agglomeration::combine_levels`], and hand a level to fewer ranks with
//! [`Agglomeration::proc_agglomerate_ldu_addressing`].

pub mod addressing;
pub mod coarsen;
pub mod combine;
pub mod interface;
pub mod procs;

use num_traits::Zero;
use rayon::prelude::*;

pub use addressing::MirroredAddressing;
pub use coarsen::{CoarsenedAddressing, coarsen};
pub use combine::compose_face_restrict;
pub use interface::{
    CoarseInterface, InterfaceArgs, InterfaceConstructor, InterfaceRegistry, PersistedInterface,
};
pub use procs::{ProcAgglomeration, RegionMasters, calculate_region_master};

use crate::algs::communicator::{AgglomCommTags, CommTag, Communicator};
use crate::algs::gather::{exchange_labels, gather_lists, gather_meshes, gather_values};
use crate::algs::primitives::{gather, scatter};
use crate::data::{Device, Mirrored};
use crate::mesh_error::AgglomError;
use crate::topology::{FaceRestrict, LduMesh, Patch, PatchKind, RestrictionMap};

/// Settings of an [`Agglomeration`].
#[derive(Clone, Debug)]
pub struct AgglomerationConfig {
    /// Starting capacity of each coarse cell's face list while coarsening.
    pub initial_neighbour_guess: usize,
    /// Verify that interface addressing stays inside the coarse interface
    /// before agglomerating coefficients.
    pub check_addressing: bool,
    /// Width of a dedicated device pool; `None` uses the global pool.
    pub device_threads: Option<usize>,
    /// Base tag for all exchanges of this hierarchy.
    pub comm_tag: CommTag,
}

impl Default for AgglomerationConfig {
    fn default() -> Self {
        Self {
            initial_neighbour_guess: 10,
            check_addressing: cfg!(debug_assertions),
            device_threads: None,
            comm_tag: CommTag::new(0xA600),
        }
    }
}

/// Matrix coefficients on LDU addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct LduCoeffs<T> {
    pub diag: Vec<T>,
    pub upper: Vec<T>,
    pub lower: Vec<T>,
}

#[derive(Clone, Debug)]
struct CellRestriction {
    map: RestrictionMap,
    addr: MirroredAddressing<usize>,
}

#[derive(Clone, Debug)]
struct FaceRestriction {
    n_coarse_faces: usize,
    restrict: Vec<FaceRestrict>,
    addr: MirroredAddressing<i64>,
    flip: Mirrored<bool>,
}

/// Restriction from one mesh level to the next and the coarse level it built.
#[derive(Clone, Debug, Default)]
pub struct Level {
    cells: Option<CellRestriction>,
    faces: Option<FaceRestriction>,
    mesh: Option<LduMesh>,
    interfaces: Vec<Option<CoarseInterface>>,
    proc: Option<ProcAgglomeration>,
}

impl Level {
    /// Drop coarse data derived from the cell restriction.
    fn release_coarse(&mut self) {
        if let Some(mut f) = self.faces.take() {
            f.addr.release();
            f.flip.release();
        }
        if let Some(mut m) = self.mesh.take() {
            m.release();
        }
        for gi in self.interfaces.iter_mut().flatten() {
            gi.release();
        }
        self.interfaces = Vec::new();
    }

    /// Drop everything but the processor agglomeration record.
    fn release(&mut self) {
        self.release_coarse();
        if let Some(mut c) = self.cells.take() {
            c.addr.release();
        }
    }
}

/// The agglomeration hierarchy of one rank.
#[derive(Debug)]
pub struct Agglomeration {
    config: AgglomerationConfig,
    device: Device,
    registry: InterfaceRegistry,
    fine: LduMesh,
    levels: Vec<Level>,
}

impl Agglomeration {
    pub fn new(fine: LduMesh, config: AgglomerationConfig) -> Result<Self, AgglomError> {
        let device = Device::from_threads(config.device_threads)?;
        Ok(Self {
            config,
            device,
            registry: InterfaceRegistry::default(),
            fine,
            levels: Vec::new(),
        })
    }

    /// Replace the interface constructors.
    pub fn with_registry(mut self, registry: InterfaceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AgglomerationConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn registry_mut(&mut self) -> &mut InterfaceRegistry {
        &mut self.registry
    }

    fn tags(&self) -> AgglomCommTags {
        AgglomCommTags::from_base(self.config.comm_tag)
    }

    // ----- queries -----------------------------------------------------------

    /// Number of restriction levels; there is one more mesh level.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn has_mesh_level(&self, i: usize) -> bool {
        self.mesh_level(i).is_ok()
    }

    /// Mesh of level `i`; 0 is the fine mesh.
    pub fn mesh_level(&self, i: usize) -> Result<&LduMesh, AgglomError> {
        if i == 0 {
            return Ok(&self.fine);
        }
        self.levels
            .get(i - 1)
            .and_then(|l| l.mesh.as_ref())
            .ok_or(AgglomError::MissingLevel(i))
    }

    /// Patches of mesh level `i`.
    pub fn interface_level(&self, i: usize) -> Result<&[Option<Patch>], AgglomError> {
        Ok(self.mesh_level(i)?.patches())
    }

    fn cells(&self, i: usize) -> Result<&CellRestriction, AgglomError> {
        self.levels
            .get(i)
            .and_then(|l| l.cells.as_ref())
            .ok_or(AgglomError::MissingLevel(i))
    }

    fn faces(&self, i: usize) -> Result<&FaceRestriction, AgglomError> {
        self.levels
            .get(i)
            .and_then(|l| l.faces.as_ref())
            .ok_or(AgglomError::MissingLevel(i))
    }

    /// Coarse cells produced by level `i`.
    pub fn n_cells(&self, i: usize) -> Result<usize, AgglomError> {
        Ok(self.cells(i)?.map.n_coarse())
    }

    /// Coarse faces produced by level `i`.
    pub fn n_faces(&self, i: usize) -> Result<usize, AgglomError> {
        Ok(self.faces(i)?.n_coarse_faces)
    }

    pub fn restrict_addressing(&self, i: usize) -> Result<&RestrictionMap, AgglomError> {
        Ok(&self.cells(i)?.map)
    }

    /// Device copy of the cell restriction with its grouping.
    pub fn restrict_device_addressing(
        &self,
        i: usize,
    ) -> Result<&MirroredAddressing<usize>, AgglomError> {
        Ok(&self.cells(i)?.addr)
    }

    pub fn face_restrict_addressing(&self, i: usize) -> Result<&[FaceRestrict], AgglomError> {
        Ok(&self.faces(i)?.restrict)
    }

    /// Device copy of the face restriction, collapsed faces encoded as
    /// `-(cell + 1)`.
    pub fn face_restrict_device_addressing(
        &self,
        i: usize,
    ) -> Result<&MirroredAddressing<i64>, AgglomError> {
        Ok(&self.faces(i)?.addr)
    }

    pub fn face_flip_map(&self, i: usize) -> Result<&[bool], AgglomError> {
        self.faces(i)?.flip.host()
    }

    /// Interfaces built by level `i`, one slot per patch of mesh level `i`.
    pub fn coarse_interfaces(&self, i: usize) -> Result<&[Option<CoarseInterface>], AgglomError> {
        self.levels
            .get(i)
            .filter(|l| l.mesh.is_some())
            .map(|l| l.interfaces.as_slice())
            .ok_or(AgglomError::MissingLevel(i))
    }

    /// Fine patch face → coarse patch face, per patch.
    pub fn patch_face_restrict_addressing(
        &self,
        i: usize,
    ) -> Result<Vec<Option<&[usize]>>, AgglomError> {
        self.coarse_interfaces(i)?
            .iter()
            .map(|gi| gi.as_ref().map(CoarseInterface::face_restrict_addressing).transpose())
            .collect()
    }

    /// Coarse face count of every interface built by level `i`.
    pub fn n_patch_faces(&self, i: usize) -> Result<Vec<usize>, AgglomError> {
        Ok(self
            .coarse_interfaces(i)?
            .iter()
            .map(|gi| gi.as_ref().map_or(0, CoarseInterface::size))
            .collect())
    }

    pub fn proc_agglomeration(&self, i: usize) -> Option<&ProcAgglomeration> {
        self.levels.get(i).and_then(|l| l.proc.as_ref())
    }

    // ----- building ----------------------------------------------------------

    /// Store the cell restriction of level `i`. `i` is either the next level
    /// or the last one, whose coarse data is then discarded.
    pub fn set_restrict_addressing(
        &mut self,
        i: usize,
        map: RestrictionMap,
    ) -> Result<(), AgglomError> {
        if i > self.levels.len() || i + 1 < self.levels.len() {
            return Err(AgglomError::inconsistent(format!(
                "cannot set restriction of level {i} in a hierarchy of {} levels",
                self.levels.len()
            )));
        }
        self.install_restrict(i, map)
    }

    fn install_restrict(&mut self, i: usize, map: RestrictionMap) -> Result<(), AgglomError> {
        map.check_fine_size(self.mesh_level(i)?.n_cells())?;
        let addr = MirroredAddressing::build("restrictAddressing", map.as_slice().to_vec(), &self.device)?;
        let empty = map.n_coarse().saturating_sub(addr.compressed().n_groups());
        if empty > 0 {
            log::warn!("level {i}: {empty} of {} coarse cells have no fine cell", map.n_coarse());
        }
        if i == self.levels.len() {
            self.levels.push(Level::default());
        }
        let level = &mut self.levels[i];
        level.release();
        level.cells = Some(CellRestriction { map, addr });
        Ok(())
    }

    /// Build the coarse mesh, face restriction and interfaces of level `i`
    /// from its cell restriction. Processor interfaces swap restricted cells
    /// with their neighbours, so every rank owning a coupled level must call
    /// this together. Only the last level can be (re)built; later levels
    /// would otherwise rest on a stale mesh.
    pub fn agglomerate_ldu_addressing<C: Communicator>(
        &mut self,
        comm: &C,
        i: usize,
    ) -> Result<(), AgglomError> {
        if i + 1 < self.levels.len() {
            return Err(AgglomError::inconsistent(format!(
                "cannot rebuild level {i} below {} coarser levels",
                self.levels.len() - i - 1
            )));
        }
        let fine_mesh = self.mesh_level(i)?;
        let cells = self.cells(i)?;
        let coarse = coarsen(
            fine_mesh.addr(),
            &cells.map,
            self.config.initial_neighbour_guess,
        )?;

        // Restricted cells seen from both sides of every patch.
        let rm = cells.map.as_slice();
        let local: Vec<Option<Vec<usize>>> = (0..fine_mesh.patches().len())
            .map(|p| {
                fine_mesh
                    .patch(p)
                    .map(|_| fine_mesh.interface_internal_field(p, rm))
                    .transpose()
            })
            .collect::<Result<_, _>>()?;

        let mut sends = Vec::new();
        let mut sent_for = Vec::new();
        for (p, patch) in fine_mesh.patches().iter().enumerate() {
            if let (Some(Patch { kind: PatchKind::Processor { neighb_proc, .. }, .. }), Some(vals)) =
                (patch, &local[p])
            {
                sends.push((*neighb_proc, vals.clone()));
                sent_for.push(p);
            }
        }
        let mut received: Vec<Option<Vec<usize>>> = vec![None; local.len()];
        for (p, vals) in sent_for
            .into_iter()
            .zip(exchange_labels(comm, self.tags().interface, &sends)?)
        {
            received[p] = Some(vals);
        }

        let mut interfaces = Vec::with_capacity(local.len());
        for (p, patch) in fine_mesh.patches().iter().enumerate() {
            let (Some(patch), Some(mine)) = (patch, &local[p]) else {
                interfaces.push(None);
                continue;
            };
            let theirs: &[usize] = match patch.kind {
                PatchKind::Boundary => &[],
                PatchKind::Cyclic { partner, .. } => local
                    .get(partner)
                    .and_then(Option::as_deref)
                    .ok_or_else(|| {
                        AgglomError::inconsistent(format!("cyclic patch {p} lost partner {partner}"))
                    })?,
                PatchKind::Processor { .. } => received[p].as_deref().unwrap_or(&[]),
            };
            interfaces.push(Some(self.registry.construct(InterfaceArgs {
                index: p,
                kind: &patch.kind,
                local_restrict: mine,
                neighbour_restrict: theirs,
                device: &self.device,
            })?));
        }

        let patches = interfaces
            .iter()
            .map(|gi| gi.as_ref().map(CoarseInterface::patch))
            .collect();
        let (n_fine_cells, n_fine_faces) = (fine_mesh.n_cells(), fine_mesh.n_faces());
        let n_coarse_cells = coarse.addr.n_cells();
        let n_coarse_faces = coarse.addr.n_faces();
        let mesh = LduMesh::new(coarse.addr, patches)?;
        let encoded = coarse.face_restrict.iter().map(|fr| fr.encode()).collect();
        let faces = FaceRestriction {
            n_coarse_faces,
            addr: MirroredAddressing::build("faceRestrictAddressing", encoded, &self.device)?,
            flip: Mirrored::mirrored("faceFlipMap", coarse.face_flip, &self.device),
            restrict: coarse.face_restrict,
        };

        let level = &mut self.levels[i];
        level.release_coarse();
        level.faces = Some(faces);
        level.mesh = Some(mesh);
        level.interfaces = interfaces;

        log::debug!(
            "agglomerated level {i} from nCells:{n_fine_cells} nFaces:{n_fine_faces} \
             to nCells:{n_coarse_cells} nFaces:{n_coarse_faces}"
        );
        Ok(())
    }

    /// Add a level restricted by `map` and build it. Returns the index of the
    /// new mesh level.
    pub fn agglomerate<C: Communicator>(
        &mut self,
        comm: &C,
        map: RestrictionMap,
    ) -> Result<usize, AgglomError> {
        let i = self.levels.len();
        self.set_restrict_addressing(i, map)?;
        self.agglomerate_ldu_addressing(comm, i)?;
        Ok(i + 1)
    }

    /// Fold level `cur` into level `cur - 1`, which then restricts straight
    /// to mesh level `cur + 1`. Level `cur` is released and later levels move
    /// down by one.
    pub fn combine_levels(&mut self, cur: usize) -> Result<(), AgglomError> {
        if cur == 0 || cur >= self.levels.len() {
            return Err(AgglomError::MissingLevel(cur));
        }
        if self.levels[cur].proc.is_some() {
            return Err(AgglomError::inconsistent(format!(
                "level {cur} was processor-agglomerated and cannot be combined"
            )));
        }
        let prev = cur - 1;
        let (cur_cells, cur_faces) = (self.cells(cur)?, self.faces(cur)?);
        let (prev_cells, prev_faces) = (self.cells(prev)?, self.faces(prev)?);

        let map = prev_cells.map.compose(&cur_cells.map)?;
        let (face_restrict, face_flip) = compose_face_restrict(
            &prev_faces.restrict,
            prev_faces.flip.host()?,
            &cur_faces.restrict,
            cur_faces.flip.host()?,
            &cur_cells.map,
        )?;
        let n_coarse_faces = cur_faces.n_coarse_faces;

        let cur_interfaces = &self.levels[cur].interfaces;
        let prev_interfaces = &self.levels[prev].interfaces;
        if cur_interfaces.len() != prev_interfaces.len() {
            return Err(AgglomError::SizeMismatch {
                expected: prev_interfaces.len(),
                found: cur_interfaces.len(),
            });
        }
        let mut interfaces = prev_interfaces.clone();
        for (gi, next) in interfaces.iter_mut().zip(cur_interfaces) {
            if let (Some(gi), Some(next)) = (gi.as_mut(), next) {
                gi.combine(next, &self.device)?;
            }
        }

        let encoded = face_restrict.iter().map(|fr| fr.encode()).collect();
        let faces = FaceRestriction {
            n_coarse_faces,
            addr: MirroredAddressing::build("faceRestrictAddressing", encoded, &self.device)?,
            flip: Mirrored::mirrored("faceFlipMap", face_flip, &self.device),
            restrict: face_restrict,
        };
        let cells = CellRestriction {
            addr: MirroredAddressing::build("restrictAddressing", map.as_slice().to_vec(), &self.device)?,
            map,
        };

        let mut folded = self.levels.remove(cur);
        let mesh = folded.mesh.take();
        folded.release();

        let level = &mut self.levels[prev];
        level.release();
        level.cells = Some(cells);
        level.faces = Some(faces);
        level.mesh = mesh;
        level.interfaces = interfaces;

        log::debug!("combined level {cur} into level {prev}");
        Ok(())
    }

    /// Drop the restriction and coarse data of level `i`.
    pub fn clear_level(&mut self, i: usize) {
        if let Some(level) = self.levels.get_mut(i) {
            level.release();
        }
    }

    // ----- processor agglomeration --------------------------------------------

    /// Merge mesh level `i` of the ranks in `proc_ids` (master first) on the
    /// master, concatenate their level `i` restrictions and rebuild level `i`
    /// there. Other members keep only the agglomeration record.
    ///
    /// Every rank in the communicator takes part, each with its own group.
    pub fn proc_agglomerate_ldu_addressing<C: Communicator>(
        &mut self,
        comm: &C,
        proc_agglom_map: &[usize],
        proc_ids: &[usize],
        i: usize,
    ) -> Result<(), AgglomError> {
        if i == 0 {
            return Err(AgglomError::inconsistent(
                "the fine mesh cannot be processor-agglomerated",
            ));
        }
        let me = comm.rank();
        let regions = calculate_region_master(proc_agglom_map, me)?;
        if proc_ids.first() != regions.agglom_proc_ids.first() || !proc_ids.contains(&me) {
            return Err(AgglomError::inconsistent(format!(
                "group {proc_ids:?} does not match the agglomeration of rank {me} ({:?})",
                regions.agglom_proc_ids
            )));
        }
        let proc_master = regions.proc_master(proc_agglom_map);

        let mut record = ProcAgglomeration {
            proc_agglom_map: proc_agglom_map.to_vec(),
            agglom_proc_ids: proc_ids.to_vec(),
            ..Default::default()
        };

        let gathered = gather_meshes(comm, &self.tags(), proc_ids, self.mesh_level(i)?)?;
        if let Some(meshes) = gathered {
            let refs: Vec<&LduMesh> = meshes.iter().collect();
            let combined = LduMesh::combine(proc_ids, &refs, &proc_master)?;
            record.cell_offsets = combined.cell_offsets;
            record.face_map = combined.face_map;
            record.boundary_map = combined.boundary_map;
            record.boundary_face_map = combined.boundary_face_map;
            self.levels[i - 1].mesh = Some(combined.mesh);
            log::debug!(
                "rank {me}: combined meshes of {proc_ids:?} into {} cells",
                self.mesh_level(i)?.n_cells()
            );
        }

        self.proc_agglomerate_restrict_addressing(comm, proc_ids, i)?;

        if me == proc_ids[0] {
            self.agglomerate_ldu_addressing(comm, i)?;
        } else {
            self.clear_level(i);
        }
        if let Some(level) = self.levels.get_mut(i) {
            level.proc = Some(record);
        }
        Ok(())
    }

    /// Gather the level `i` restrictions of `proc_ids` on the master and
    /// renumber them onto the combined coarse cells.
    pub fn proc_agglomerate_restrict_addressing<C: Communicator>(
        &mut self,
        comm: &C,
        proc_ids: &[usize],
        i: usize,
    ) -> Result<(), AgglomError> {
        let tags = self.tags();
        let map = &self.cells(i)?.map;
        let n_fine = gather_values(comm, &tags, proc_ids, map.len() as u64)?;
        let n_coarse = gather_values(comm, &tags, proc_ids, map.n_coarse() as u64)?;
        let lists = gather_lists(comm, &tags, proc_ids, map.as_slice())?;
        let (Some(n_fine), Some(n_coarse), Some(lists)) = (n_fine, n_coarse, lists) else {
            return Ok(());
        };
        let n_fine: Vec<usize> = n_fine.into_iter().map(|n| n as usize).collect();
        let n_coarse: Vec<usize> = n_coarse.into_iter().map(|n| n as usize).collect();
        let (combined, total) = procs::renumber_restrict(proc_ids, &n_fine, &n_coarse, &lists)?;
        self.install_restrict(i, RestrictionMap::new(combined, total)?)
    }

    // ----- field transfer -------------------------------------------------------

    /// Sum a fine cell field into the coarse cells of level `i`.
    pub fn restrict_field<T>(&self, i: usize, fine: &[T]) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let cells = self.cells(i)?;
        let ca = cells.addr.compressed();
        let sums = ca.sum_groups(&self.device, fine)?;
        let mut coarse = vec![T::zero(); cells.map.n_coarse()];
        scatter(&sums, &ca.target, &mut coarse)?;
        Ok(coarse)
    }

    /// Inject a coarse cell field back onto the fine cells of level `i`.
    pub fn prolong_field<T>(&self, i: usize, coarse: &[T]) -> Result<Vec<T>, AgglomError>
    where
        T: Copy + Send + Sync,
    {
        let cells = self.cells(i)?;
        if coarse.len() != cells.map.n_coarse() {
            return Err(AgglomError::SizeMismatch {
                expected: cells.map.n_coarse(),
                found: coarse.len(),
            });
        }
        Ok(gather(&self.device, coarse, cells.addr.values().device()?))
    }

    /// Split grouped face sums into (coarse face sums, collapsed cell sums).
    fn face_sums<T>(&self, i: usize, fine: &[T]) -> Result<(Vec<T>, Vec<T>), AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let faces = self.faces(i)?;
        let ca = faces.addr.compressed();
        let sums = ca.sum_groups(&self.device, fine)?;
        let mut on_faces = vec![T::zero(); faces.n_coarse_faces];
        let mut in_cells = vec![T::zero(); self.n_cells(i)?];
        for (&key, sum) in ca.target.iter().zip(sums) {
            let size = on_faces.len().max(in_cells.len());
            let slot = match FaceRestrict::decode(key) {
                FaceRestrict::Coarse(f) => on_faces.get_mut(f),
                FaceRestrict::Collapsed(c) => in_cells.get_mut(c),
            };
            *slot.ok_or(AgglomError::OutOfBoundsAddressing {
                max: key.unsigned_abs() as usize,
                size,
            })? = sum;
        }
        Ok((on_faces, in_cells))
    }

    /// Sum a fine face field into the coarse faces of level `i`; collapsed
    /// faces are dropped.
    pub fn restrict_face_field<T>(&self, i: usize, fine: &[T]) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        Ok(self.face_sums(i, fine)?.0)
    }

    /// Galerkin coarse matrix for piecewise-constant transfer. Coefficients
    /// of flipped faces swap between upper and lower; collapsed faces add
    /// both their coefficients to the coarse diagonal.
    pub fn agglomerate_matrix_coeffs<T>(
        &self,
        i: usize,
        fine: &LduCoeffs<T>,
    ) -> Result<LduCoeffs<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let flip = self.faces(i)?.flip.device()?;
        if fine.upper.len() != flip.len() || fine.lower.len() != flip.len() {
            return Err(AgglomError::SizeMismatch {
                expected: flip.len(),
                found: fine.upper.len().min(fine.lower.len()),
            });
        }
        let (upper, lower): (Vec<T>, Vec<T>) = self.device.install(|| {
            flip.par_iter()
                .zip(fine.upper.par_iter().zip(&fine.lower))
                .map(|(&f, (&u, &l))| if f { (l, u) } else { (u, l) })
                .unzip()
        });
        let both: Vec<T> = self.device.install(|| {
            fine.upper
                .par_iter()
                .zip(&fine.lower)
                .map(|(&u, &l)| u + l)
                .collect()
        });

        let (c_upper, _) = self.face_sums(i, &upper)?;
        let (c_lower, _) = self.face_sums(i, &lower)?;
        let (_, collapsed) = self.face_sums(i, &both)?;
        let mut diag = self.restrict_field(i, &fine.diag)?;
        for (d, c) in diag.iter_mut().zip(collapsed) {
            *d = *d + c;
        }
        Ok(LduCoeffs {
            diag,
            upper: c_upper,
            lower: c_lower,
        })
    }

    /// Agglomerate coefficients of patch `p` with the interface built by level `i`.
    pub fn agglomerate_interface_coeffs<T>(
        &self,
        i: usize,
        p: usize,
        fine: &[T],
    ) -> Result<Vec<T>, AgglomError>
    where
        T: Zero + Copy + Send + Sync,
    {
        let gi = self
            .coarse_interfaces(i)?
            .get(p)
            .and_then(Option::as_ref)
            .ok_or_else(|| AgglomError::inconsistent(format!("level {i} has no interface {p}")))?;
        gi.agglomerate_coeffs(&self.device, fine, self.config.check_addressing)
    }
}
