//! Data module: device runtime, storage backends and mirrored host/device arrays
#![warn(missing_docs)]

pub mod device;
pub mod mirrored;
pub mod storage;

pub use device::Device;
pub use mirrored::{Mirrored, Residency};
pub use storage::{DeviceStorage, HostStorage, Storage};
