//! Algorithms over addressing arrays and the transport they run on.

pub mod communicator;
pub mod compressed;
pub mod gather;
pub mod ldu_ops;
pub mod primitives;
pub mod wire;

pub use compressed::CompressedAddressing;
