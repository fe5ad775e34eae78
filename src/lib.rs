#![cfg_attr(docsrs, feature(doc_cfg))]
//! # ldu-agglom
//!
//! Connectivity coarsening for algebraic multigrid on matrices stored in LDU
//! (lower/diagonal/upper) form. Given a fine mesh's face addressing and a
//! fine-to-coarse cell restriction map, ldu-agglom derives the coarse face
//! addressing, the fine-to-coarse face restriction with orientation flips,
//! and the coarse boundary interfaces. Levels can be telescoped into one and
//! handed from several ranks to a single master.
//!
//! ## Features
//! - Coarse LDU addressing with collapsed-face detection and flip maps
//! - Mirrored host/device addressing with sort/target/offset grouping for
//!   data-parallel reductions on a Rayon pool
//! - Boundary, cyclic and processor interface coarsening through a pluggable
//!   constructor registry
//! - Level combination and processor agglomeration over pluggable
//!   communication backends (serial, Rayon threads, MPI)
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! ldu-agglom = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! ```
//! use ldu_agglom::prelude::*;
//!
//! let addr = LduAddressing::new(4, vec![0, 1, 2], vec![1, 2, 3]).unwrap();
//! let mut agg = Agglomeration::new(LduMesh::from_addressing(addr), Default::default()).unwrap();
//! let level = agg
//!     .agglomerate(&NoComm, RestrictionMap::new(vec![0, 0, 1, 1], 2).unwrap())
//!     .unwrap();
//! assert_eq!(agg.mesh_level(level).unwrap().n_faces(), 1);
//! ```
//!
//! ## Determinism
//!
//! Coarse face numbering depends only on the fine addressing and the
//! restriction map, never on thread count.

pub mod agglomeration;
pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::agglomeration::{
        Agglomeration, AgglomerationConfig, CoarseInterface, InterfaceRegistry, LduCoeffs,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm};
    pub use crate::algs::compressed::CompressedAddressing;
    pub use crate::data::{Device, Mirrored};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::AgglomError;
    pub use crate::topology::{
        FaceRestrict, LduAddressing, LduMesh, Patch, PatchKind, RestrictionMap,
    };
}
