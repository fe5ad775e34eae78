//! Arrays mirrored between host and device storage.
//!
//! A [`Mirrored`] value owns both copies. Nothing is cached implicitly: the
//! caller moves data with [`Mirrored::upload`] or [`Mirrored::download`], and
//! reading the stale side returns [`AgglomError::DeviceOutOfSync`].

use crate::data::device::Device;
use crate::data::storage::{DeviceStorage, HostStorage, Storage};
use crate::mesh_error::AgglomError;

/// Which copy holds the latest data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Residency {
    /// Both copies agree.
    Synced,
    /// Host was written after the last transfer.
    HostAhead,
    /// Device was written after the last transfer.
    DeviceAhead,
}

/// Host buffer plus device buffer with explicit synchronisation.
#[derive(Clone, Debug)]
pub struct Mirrored<V> {
    name: &'static str,
    host: HostStorage<V>,
    device: DeviceStorage<V>,
    residency: Residency,
}

impl<V> Mirrored<V>
where
    V: Clone + Send + Sync,
{
    /// Wrap host data; the device copy is empty until [`upload`](Self::upload).
    pub fn from_host(name: &'static str, host: Vec<V>) -> Self {
        Self {
            name,
            host: HostStorage::from(host),
            device: DeviceStorage::default(),
            residency: Residency::HostAhead,
        }
    }

    /// Wrap host data and immediately mirror it to `device`.
    pub fn mirrored(name: &'static str, host: Vec<V>, device: &Device) -> Self {
        let mut m = Self::from_host(name, host);
        m.upload(device);
        m
    }

    /// Host → device.
    pub fn upload(&mut self, device: &Device) {
        self.device.copy_from_host(device, self.host.as_slice());
        self.residency = Residency::Synced;
    }

    /// Device → host.
    pub fn download(&mut self, device: &Device) {
        self.device.copy_to_host(device, &mut self.host.0);
        self.residency = Residency::Synced;
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn is_synced(&self) -> bool {
        self.residency == Residency::Synced
    }

    /// Host copy; fails when the device holds newer data.
    pub fn host(&self) -> Result<&[V], AgglomError> {
        match self.residency {
            Residency::DeviceAhead => Err(AgglomError::DeviceOutOfSync(self.name)),
            _ => Ok(self.host.as_slice()),
        }
    }

    /// Device copy; fails when the host holds newer data.
    pub fn device(&self) -> Result<&[V], AgglomError> {
        match self.residency {
            Residency::HostAhead => Err(AgglomError::DeviceOutOfSync(self.name)),
            _ => Ok(self.device.as_slice()),
        }
    }

    /// Mutable device copy; marks the host copy stale.
    pub fn device_mut(&mut self) -> Result<&mut [V], AgglomError> {
        if self.residency == Residency::HostAhead {
            return Err(AgglomError::DeviceOutOfSync(self.name));
        }
        self.residency = Residency::DeviceAhead;
        Ok(self.device.as_mut_slice())
    }

    /// Length of the authoritative copy.
    pub fn len(&self) -> usize {
        match self.residency {
            Residency::DeviceAhead => self.device.len(),
            _ => self.host.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free both copies.
    pub fn release(&mut self) {
        self.host.release();
        self.device.release();
        self.residency = Residency::Synced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_sides_are_rejected() {
        let dev = Device::global();
        let mut m = Mirrored::from_host("restrict", vec![1usize, 2, 3]);
        assert_eq!(m.device(), Err(AgglomError::DeviceOutOfSync("restrict")));
        m.upload(&dev);
        assert_eq!(m.device().unwrap(), &[1, 2, 3]);

        m.device_mut().unwrap()[0] = 9;
        assert!(m.host().is_err());
        m.download(&dev);
        assert_eq!(m.host().unwrap(), &[9, 2, 3]);
        assert!(m.is_synced());
    }

    #[test]
    fn release_frees_both_sides() {
        let dev = Device::global();
        let mut m = Mirrored::mirrored("flip", vec![true, false], &dev);
        m.release();
        assert!(m.is_empty());
        assert!(m.device().unwrap().is_empty());
    }

    #[test]
    fn element_type_needs_no_default() {
        #[derive(Clone, Debug, PartialEq)]
        struct Cell(usize);

        let dev = Device::global();
        let mut m = Mirrored::from_host("cells", vec![Cell(2), Cell(0)]);
        assert_eq!(m.residency(), Residency::HostAhead);
        m.upload(&dev);
        assert_eq!(m.device().unwrap(), &[Cell(2), Cell(0)]);
    }
}
