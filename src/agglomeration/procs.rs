//! Processor agglomeration: several ranks hand their level to one master.

use serde::{Deserialize, Serialize};

use crate::mesh_error::AgglomError;

/// Masters per region and the group of the calling rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionMasters {
    /// `master_procs[region]` is the lowest rank mapped to `region`.
    pub master_procs: Vec<usize>,
    /// Ranks sharing the caller's region, master first.
    pub agglom_proc_ids: Vec<usize>,
}

impl RegionMasters {
    /// Master of every rank, indexed by rank.
    pub fn proc_master(&self, proc_agglom_map: &[usize]) -> Vec<usize> {
        proc_agglom_map
            .iter()
            .map(|&region| self.master_procs[region])
            .collect()
    }

    pub fn is_master(&self, proc: usize) -> bool {
        self.agglom_proc_ids.first() == Some(&proc)
    }
}

/// Derive the region masters of `proc_agglom_map` (rank → region) and the
/// ordered group of `my_proc`. Regions must be numbered densely from zero.
pub fn calculate_region_master(
    proc_agglom_map: &[usize],
    my_proc: usize,
) -> Result<RegionMasters, AgglomError> {
    let n_regions = proc_agglom_map.iter().max().map_or(0, |&r| r + 1);
    let mut master = vec![None::<usize>; n_regions];
    for (proc, &region) in proc_agglom_map.iter().enumerate() {
        let m = &mut master[region];
        *m = Some(m.map_or(proc, |cur| cur.min(proc)));
    }
    let master_procs = master
        .iter()
        .enumerate()
        .map(|(region, m)| {
            m.ok_or_else(|| {
                AgglomError::inconsistent(format!("agglomeration region {region} has no processor"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let my_region = *proc_agglom_map.get(my_proc).ok_or_else(|| {
        AgglomError::inconsistent(format!(
            "processor {my_proc} is not in the agglomeration map of {} processors",
            proc_agglom_map.len()
        ))
    })?;
    let mut agglom_proc_ids: Vec<usize> = proc_agglom_map
        .iter()
        .enumerate()
        .filter(|&(_, &r)| r == my_region)
        .map(|(p, _)| p)
        .collect();
    if let Some(pos) = agglom_proc_ids
        .iter()
        .position(|&p| p == master_procs[my_region])
    {
        agglom_proc_ids.swap(0, pos);
    }
    Ok(RegionMasters {
        master_procs,
        agglom_proc_ids,
    })
}

/// Bookkeeping of one processor agglomeration, kept on every group member.
/// The maps back to the contributions are only filled on the master.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcAgglomeration {
    pub proc_agglom_map: Vec<usize>,
    pub agglom_proc_ids: Vec<usize>,
    /// Start of each member's cells in the combined mesh.
    pub cell_offsets: Vec<usize>,
    /// Per member: old internal face → combined face.
    pub face_map: Vec<Vec<usize>>,
    /// Per member: old patch → combined patch, `None` when stitched.
    pub boundary_map: Vec<Vec<Option<usize>>>,
    /// Per member and patch: old patch face → combined patch or internal face.
    pub boundary_face_map: Vec<Vec<Vec<usize>>>,
}

/// Concatenate the members' restriction maps, shifting each member's coarse
/// cells past those of the members before it. Returns the combined map and
/// the total coarse cell count.
pub fn renumber_restrict(
    procs: &[usize],
    n_fine: &[usize],
    n_coarse: &[usize],
    maps: &[Vec<usize>],
) -> Result<(Vec<usize>, usize), AgglomError> {
    if n_fine.len() != procs.len() || n_coarse.len() != procs.len() || maps.len() != procs.len() {
        return Err(AgglomError::SizeMismatch {
            expected: procs.len(),
            found: maps.len(),
        });
    }
    let mut out = Vec::with_capacity(n_fine.iter().sum());
    let mut coarse_offset = 0;
    for (k, map) in maps.iter().enumerate() {
        if map.len() != n_fine[k] {
            return Err(AgglomError::protocol(
                procs[k],
                format!(
                    "announced {} fine cells but sent a restriction map of {}",
                    n_fine[k],
                    map.len()
                ),
            ));
        }
        if let Some(&bad) = map.iter().find(|&&c| c >= n_coarse[k]) {
            return Err(AgglomError::protocol(
                procs[k],
                format!("restriction entry {bad} outside {} coarse cells", n_coarse[k]),
            ));
        }
        out.extend(map.iter().map(|&c| c + coarse_offset));
        coarse_offset += n_coarse[k];
    }
    Ok((out, coarse_offset))
}
