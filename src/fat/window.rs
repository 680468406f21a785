//! The per-volume window: the single 512-byte buffer every FAT and
//! directory access flows through.
//!
//! A single-entry write-back cache: exactly one sector is resident at a
//! time, and it is flushed back to the device on eviction rather than
//! tracked by an age/LRU counter.

use crate::device::{BlockDevice, DResult};
use crate::error::{FResult, FatError};

/// Describes where the FAT region lives, so [`Window::move_window`] knows
/// when an eviction must be mirrored across every FAT copy.
#[derive(Debug, Clone, Copy)]
pub struct FatRegion {
    pub fat_base: u32,
    pub sectors_per_fat: u32,
    pub fat_copies: u8,
}

impl FatRegion {
    fn contains(&self, sector: u32) -> bool {
        sector >= self.fat_base && sector < self.fat_base + self.sectors_per_fat
    }
}

pub struct Window {
    buf: [u8; 512],
    /// 0 means "holds no meaningful sector".
    sector: u32,
    dirty: bool,
    /// Set once at mount time (see `Volume::sync_window_region`) and
    /// consulted on every eviction, regardless of which sector the window
    /// is moving *to* — mirroring `ff.c`'s `sync_window`, which always
    /// checks `wsect - fatbase < fsize` rather than taking the FAT region
    /// as a per-call argument.
    fat_region: Option<FatRegion>,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            buf: [0u8; 512],
            sector: 0,
            dirty: false,
            fat_region: None,
        }
    }
}

impl Window {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.buf
    }

    pub fn current_sector(&self) -> u32 {
        self.sector
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Records where the FAT region lives, so every later eviction — no
    /// matter which sector the window is moving *to* — mirrors a dirty FAT
    /// sector to every copy. Called once by `Volume::sync_window_region`
    /// after geometry is known (mount, or a hand-built test volume).
    pub fn set_fat_region(&mut self, region: FatRegion) {
        self.fat_region = Some(region);
    }

    fn write_back<D: BlockDevice>(&mut self, device: &mut D) -> FResult<()> {
        if !self.dirty {
            return Ok(());
        }

        write_sector(device, self.sector, &self.buf)?;

        if let Some(region) = self.fat_region {
            if region.contains(self.sector) {
                for copy in 1..(region.fat_copies as u32) {
                    let mirror = self.sector + copy * region.sectors_per_fat;
                    write_sector(device, mirror, &self.buf)?;
                }
            }
        }

        self.dirty = false;
        Ok(())
    }

    /// If `target_sector` equals the resident sector, succeeds with no I/O.
    /// Otherwise evicts (writing back, mirrored across every FAT copy if
    /// the evicted sector fell in the FAT region — see `set_fat_region`)
    /// and, unless `target_sector` is 0 (the "flush only" form), loads the
    /// new sector.
    pub fn move_window<D: BlockDevice>(&mut self, device: &mut D, target_sector: u32) -> FResult<()> {
        if target_sector == self.sector && target_sector != 0 {
            return Ok(());
        }

        self.write_back(device)?;

        if target_sector == 0 {
            self.sector = 0;
            return Ok(());
        }

        read_sector(device, target_sector, &mut self.buf)?;
        self.sector = target_sector;
        Ok(())
    }

    pub fn flush<D: BlockDevice>(&mut self, device: &mut D) -> FResult<()> {
        self.move_window(device, 0)
    }
}

fn dresult_to_error(r: DResult) -> FatError {
    match r {
        DResult::Ok => unreachable!(),
        DResult::Error => FatError::IoError,
        DResult::WriteProtected => FatError::WriteProtected,
        DResult::NotReady => FatError::NotReady,
        DResult::ParamError => FatError::IoError,
    }
}

pub(crate) fn read_sector<D: BlockDevice>(device: &mut D, lba: u32, buf: &mut [u8]) -> FResult<()> {
    match device.read(lba, 1, buf) {
        DResult::Ok => Ok(()),
        e => {
            log::error!("read failed at sector {}: {:?}", lba, e);
            Err(dresult_to_error(e))
        }
    }
}

pub(crate) fn write_sector<D: BlockDevice>(device: &mut D, lba: u32, buf: &[u8]) -> FResult<()> {
    match device.write(lba, 1, buf) {
        DResult::Ok => Ok(()),
        e => {
            log::error!("write failed at sector {}: {:?}", lba, e);
            Err(dresult_to_error(e))
        }
    }
}

/// Reads `count` contiguous sectors directly into a caller buffer,
/// bypassing the window — used by [`crate::fat::file`] for whole-sector
/// transfers that have no business going through the single-sector cache.
pub(crate) fn read_sector_multi<D: BlockDevice>(device: &mut D, lba: u32, count: u32, buf: &mut [u8]) -> FResult<()> {
    match device.read(lba, count, buf) {
        DResult::Ok => Ok(()),
        e => {
            log::error!("read failed at sector {}..+{}: {:?}", lba, count, e);
            Err(dresult_to_error(e))
        }
    }
}

pub(crate) fn write_sector_multi<D: BlockDevice>(device: &mut D, lba: u32, count: u32, buf: &[u8]) -> FResult<()> {
    match device.write(lba, count, buf) {
        DResult::Ok => Ok(()),
        e => {
            log::error!("write failed at sector {}..+{}: {:?}", lba, count, e);
            Err(dresult_to_error(e))
        }
    }
}
