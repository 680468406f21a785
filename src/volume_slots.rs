//! The volume slot table: a caller-owned array of mounted volumes.
//!
//! `ff.c` keeps a process-wide array of `FATFS*` indexed by drive number
//! (`FatFs[_DRIVES]`) that every `f_*` call looks up by the path's drive
//! prefix. This crate has no process-wide anything — `VolumeSlots<D, N>` is
//! a plain struct the caller places wherever suits them (a local, a field
//! on their own driver struct, or — behind the `static-slots` feature — a
//! `static` guarded by [`crate::mutex::Mutex`]) and owns the array and the
//! mount-generation counter shared by every slot in it.

use crate::device::BlockDevice;
use crate::error::{FResult, FatError};
use crate::fat::Volume;
use crate::path;

/// `N` owned, possibly-unmounted volumes, indexed by the drive number a
/// path's `N:` prefix names (an unprefixed path routes to drive 0).
pub struct VolumeSlots<D: BlockDevice, const N: usize> {
    slots: [Option<Volume<D>>; N],
    next_mount_id: u16,
}

impl<D: BlockDevice, const N: usize> Default for VolumeSlots<D, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: BlockDevice, const N: usize> VolumeSlots<D, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            next_mount_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }

    /// Places `volume` in `drive`'s slot, returning whatever was there
    /// before. `FatError::InvalidDrive` if `drive` is out of range.
    pub fn install(&mut self, drive: u8, volume: Volume<D>) -> FResult<Option<Volume<D>>> {
        let slot = self.slots.get_mut(drive as usize).ok_or(FatError::InvalidDrive)?;
        Ok(core::mem::replace(slot, Some(volume)))
    }

    /// Empties `drive`'s slot, returning its volume if one was mounted
    /// there.
    pub fn remove(&mut self, drive: u8) -> FResult<Option<Volume<D>>> {
        let slot = self.slots.get_mut(drive as usize).ok_or(FatError::InvalidDrive)?;
        Ok(slot.take())
    }

    pub fn get(&self, drive: u8) -> FResult<&Volume<D>> {
        self.slots
            .get(drive as usize)
            .and_then(Option::as_ref)
            .ok_or(FatError::InvalidDrive)
    }

    pub fn get_mut(&mut self, drive: u8) -> FResult<&mut Volume<D>> {
        self.slots
            .get_mut(drive as usize)
            .and_then(Option::as_mut)
            .ok_or(FatError::InvalidDrive)
    }

    /// Resolves `path`'s drive prefix (defaulting to drive 0 if absent) to
    /// its slot, returning both the volume and the mount-generation counter
    /// every operation on it needs. Every `*_at` helper in [`fat`] and
    /// metadata/directory operation takes `next_mount_id: &mut u16` as an
    /// explicit argument rather than reading it off `self` — this is where
    /// that counter actually lives when a caller chooses to route through
    /// `VolumeSlots` instead of holding its own `Volume` directly.
    ///
    /// [`fat`]: crate::fat
    pub fn resolve(&mut self, path: &[u8]) -> FResult<(&mut Volume<D>, &mut u16)> {
        let (drive, _) = path::split_drive_prefix(path);
        let drive = drive.unwrap_or(0);
        let volume = self
            .slots
            .get_mut(drive as usize)
            .and_then(Option::as_mut)
            .ok_or(FatError::InvalidDrive)?;
        Ok((volume, &mut self.next_mount_id))
    }
}

#[cfg(feature = "static-slots")]
pub mod statik {
    //! A `static`, lock-guarded [`VolumeSlots`] for callers who want one
    //! globally reachable table rather than threading it through their own
    //! call chain — an opt-in convenience, not something the core driver
    //! ever reaches for on its own.

    use super::VolumeSlots;
    use crate::device::BlockDevice;
    use crate::mutex::{Mutex, MutexInterface};

    /// Wraps a [`VolumeSlots`] in [`crate::mutex::Mutex`] so it can live in
    /// a `static` and be touched from an interrupt handler. `f` runs with
    /// exclusive access to the table for the duration of the call.
    pub struct StaticSlots<D: BlockDevice, const N: usize> {
        inner: Mutex<VolumeSlots<D, N>>,
    }

    impl<D: BlockDevice + Send, const N: usize> StaticSlots<D, N> {
        pub fn new(slots: VolumeSlots<D, N>) -> Self {
            Self { inner: Mutex::new(slots) }
        }

        pub fn with<F: FnOnce(&mut VolumeSlots<D, N>) -> R, R>(&self, f: F) -> R {
            self.inner.cs(f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::tests_support::MemDevice;

    #[test]
    fn fresh_table_has_no_mounted_slots() {
        let slots: VolumeSlots<MemDevice, 2> = VolumeSlots::new();
        assert!(slots.get(0).is_err());
        assert!(slots.get(1).is_err());
    }

    #[test]
    fn out_of_range_drive_is_invalid() {
        let mut slots: VolumeSlots<MemDevice, 2> = VolumeSlots::new();
        assert_eq!(slots.get_mut(5).err(), Some(FatError::InvalidDrive));
    }

    #[test]
    fn install_then_resolve_routes_by_drive_prefix() {
        let mut slots: VolumeSlots<MemDevice, 2> = VolumeSlots::new();
        let device = MemDevice::new(4096);
        slots.install(1, Volume::new(device, 1)).unwrap();

        assert!(slots.resolve(b"0:/foo.txt").is_err());
        let (volume, _next_id) = slots.resolve(b"1:/foo.txt").unwrap();
        assert_eq!(volume.drive_id, 1);
    }

    #[test]
    fn unprefixed_path_routes_to_drive_zero() {
        let mut slots: VolumeSlots<MemDevice, 1> = VolumeSlots::new();
        let device = MemDevice::new(4096);
        slots.install(0, Volume::new(device, 0)).unwrap();

        let (volume, _next_id) = slots.resolve(b"foo.txt").unwrap();
        assert_eq!(volume.drive_id, 0);
    }
}
