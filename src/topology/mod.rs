//! Level connectivity: LDU addressing, boundary patches and restriction maps.
//!
//! - [`ldu::LduAddressing`] owner/neighbour faces with per-cell offsets
//! - [`mesh::LduMesh`] addressing plus patches, and the merge of a process group
//! - [`restrict`] cell and face restriction between two levels
//! - [`adjacency`] growable per-cell lists used while a coarse level is built

pub mod adjacency;
pub mod ldu;
pub mod mesh;
pub mod restrict;

pub use ldu::LduAddressing;
pub use mesh::{CombinedMesh, LduMesh, Patch, PatchKind};
pub use restrict::{FaceRestrict, RestrictionMap};
