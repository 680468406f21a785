//! Volumes: one per mounted logical drive.

pub mod window;
pub mod table;
pub mod boot_sector;
pub mod dir;
pub mod file;
pub mod meta;

#[cfg(test)]
pub(crate) mod tests_support;

use crate::clock::Clock;
use crate::device::BlockDevice;
use crate::error::{FResult, FatError};
use boot_sector::BootSector;
use window::{FatRegion, Window};

/// End-of-chain thresholds, per type. Any cell value at or above the
/// threshold (masked to the significant bits for FAT32) marks the last
/// cluster of a chain.
pub const EOC_FAT12: u32 = 0xFF8;
pub const EOC_FAT16: u32 = 0xFFF8;
pub const EOC_FAT32: u32 = 0x0FFF_FFF8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// Classifies by cluster count, per `ff.c`'s `auto_mount`: FAT12 below
    /// 0xFF7 clusters, FAT16 below 0xFFF7, else FAT32.
    pub fn classify(max_cluster_plus_one: u32) -> Self {
        if max_cluster_plus_one < 0xFF7 {
            FatType::Fat12
        } else if max_cluster_plus_one < 0xFFF7 {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    pub fn eoc_threshold(self) -> u32 {
        match self {
            FatType::Fat12 => EOC_FAT12,
            FatType::Fat16 => EOC_FAT16,
            FatType::Fat32 => EOC_FAT32,
        }
    }
}

/// One mounted logical drive. Owned by the caller; borrowed for the
/// duration of each public call (see `volume_slots`).
pub struct Volume<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) drive_id: u8,

    mounted: bool,
    pub(crate) fs_type: FatType,
    pub(crate) sectors_per_cluster: u8,
    pub(crate) fat_copies: u8,
    pub(crate) mount_id: u16,
    pub(crate) root_dir_entry_count: u16,

    pub(crate) sectors_per_fat: u32,
    pub(crate) max_cluster_plus_one: u32,
    pub(crate) fat_base: u32,
    /// LBA of the static root directory (FAT12/16), or the root cluster
    /// number (FAT32) — distinguished by `fs_type`.
    pub(crate) dir_base: u32,
    pub(crate) data_base: u32,
    pub(crate) last_allocated: u32,

    pub(crate) window: Window,
}

impl<D: BlockDevice> Volume<D> {
    /// Constructs an unmounted volume shell around a caller-owned device.
    /// `drive_id` is only used for diagnostics; slotting is the caller's
    /// job (see [`crate::VolumeSlots`]).
    pub fn new(device: D, drive_id: u8) -> Self {
        Self {
            device,
            drive_id,
            mounted: false,
            fs_type: FatType::Fat12,
            sectors_per_cluster: 1,
            fat_copies: 0,
            mount_id: 0,
            root_dir_entry_count: 0,
            sectors_per_fat: 0,
            max_cluster_plus_one: 0,
            fat_base: 0,
            dir_base: 0,
            data_base: 0,
            last_allocated: 1,
            window: Window::default(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn fs_type(&self) -> FatType {
        self.fs_type
    }

    pub fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    pub fn fat_copies(&self) -> u8 {
        self.fat_copies
    }

    pub fn root_dir_entry_count(&self) -> u16 {
        self.root_dir_entry_count
    }

    pub fn max_cluster_plus_one(&self) -> u32 {
        self.max_cluster_plus_one
    }

    pub fn mount_id(&self) -> u16 {
        self.mount_id
    }

    pub(crate) fn fat_region(&self) -> FatRegion {
        FatRegion {
            fat_base: self.fat_base,
            sectors_per_fat: self.sectors_per_fat,
            fat_copies: self.fat_copies,
        }
    }

    /// Hands the window its FAT region so every later eviction mirrors a
    /// dirty FAT sector to every copy, regardless of which sector the
    /// window is moving to next (see `window::Window::set_fat_region`).
    /// Called once geometry is known: at the end of `auto_mount`, and by
    /// hand-built test volumes that set geometry fields directly instead
    /// of mounting.
    pub(crate) fn sync_window_region(&mut self) {
        let region = self.fat_region();
        self.window.set_fat_region(region);
    }

    /// `auto_mount`: idempotent if already mounted and the device is still
    /// initialized. Otherwise reads sector 0, falling back to the first
    /// partition-table entry if sector 0 is a partition table rather than
    /// a boot sector directly, then derives geometry from the BPB.
    ///
    /// `mount_id` is handed in by the caller (the volume slot table owns
    /// the monotonically increasing generation counter per the design
    /// notes) so that this function never needs process-wide state.
    pub fn auto_mount(&mut self, next_mount_id: &mut u16) -> FResult<()> {
        if self.mounted {
            let status = self.device.status();
            if status.contains(crate::device::DStatus::NOT_INITIALIZED) {
                self.mounted = false;
            } else {
                return Ok(());
            }
        }

        self.window = Window::default();
        let status = self.device.initialize();
        if status.contains(crate::device::DStatus::NO_MEDIA) {
            return Err(FatError::NotReady);
        }
        if status.contains(crate::device::DStatus::NOT_INITIALIZED) {
            return Err(FatError::NotReady);
        }

        let mut sector0 = [0u8; 512];
        window::read_sector(&mut self.device, 0, &mut sector0)?;

        let (partition_lba, boot) = if BootSector::looks_like_boot_sector(&sector0) {
            (0u32, BootSector::read(&sector0))
        } else {
            let entry = crate::partition::read_first_entry(&sector0).ok_or_else(|| {
                log::error!("drive {}: no boot sector and no partition entry", self.drive_id);
                FatError::NoFilesystem
            })?;

            let mut part_sector = [0u8; 512];
            window::read_sector(&mut self.device, entry.start_lba, &mut part_sector)?;

            if !BootSector::looks_like_boot_sector(&part_sector) {
                log::error!("drive {}: partition at lba {} is not FAT", self.drive_id, entry.start_lba);
                return Err(FatError::NoFilesystem);
            }

            (entry.start_lba, BootSector::read(&part_sector))
        };

        let bpb = &boot.bpb;

        let fat_base = partition_lba + bpb.reserved_sectors as u32;
        let sectors_per_fat = if bpb.sectors_per_fat_16 != 0 {
            bpb.sectors_per_fat_16 as u32
        } else {
            bpb.sectors_per_fat_32
        };
        let root_dir_entry_count = bpb.root_entry_count;
        let total_sectors = if bpb.total_sectors_16 != 0 {
            bpb.total_sectors_16 as u32
        } else {
            bpb.total_sectors_32
        };
        let sectors_per_cluster = bpb.sectors_per_cluster;
        let fat_copies = bpb.num_fats;

        if sectors_per_fat == 0 || sectors_per_cluster == 0 || fat_copies == 0 {
            return Err(FatError::NoFilesystem);
        }

        let root_dir_sectors = (root_dir_entry_count as u32 * 32 + 511) / 512;
        let data_base = fat_base + fat_copies as u32 * sectors_per_fat + root_dir_sectors;

        let data_sectors = total_sectors
            .saturating_sub(bpb.reserved_sectors as u32)
            .saturating_sub(fat_copies as u32 * sectors_per_fat)
            .saturating_sub(root_dir_sectors);
        let max_cluster_plus_one = data_sectors / sectors_per_cluster as u32 + 2;

        let fs_type = FatType::classify(max_cluster_plus_one);

        let dir_base = if fs_type == FatType::Fat32 {
            bpb.root_cluster
        } else {
            fat_base + fat_copies as u32 * sectors_per_fat
        };

        self.fs_type = fs_type;
        self.sectors_per_cluster = sectors_per_cluster;
        self.fat_copies = fat_copies;
        self.root_dir_entry_count = root_dir_entry_count;
        self.sectors_per_fat = sectors_per_fat;
        self.max_cluster_plus_one = max_cluster_plus_one;
        self.fat_base = fat_base;
        self.dir_base = dir_base;
        self.data_base = data_base;
        self.last_allocated = 1;

        *next_mount_id = next_mount_id.wrapping_add(1).max(1);
        self.mount_id = *next_mount_id;
        self.mounted = true;
        self.sync_window_region();

        Ok(())
    }

    /// Checked per public operation: `complement` must be the bit-inverse
    /// of the live `mount_id`, and the device must still be ready.
    pub(crate) fn validate(&self, complement: u16) -> FResult<()> {
        if !self.mounted || complement != !self.mount_id {
            return Err(FatError::InvalidObject);
        }
        if self.device.status().contains(crate::device::DStatus::NOT_INITIALIZED) {
            return Err(FatError::NotReady);
        }
        Ok(())
    }

    /// `cluster_to_sector(c)`: `data_base + (c - 2) * sectors_per_cluster`,
    /// or `None` for an invalid cluster index.
    pub fn cluster_to_sector(&self, cluster: u32) -> Option<u32> {
        if cluster < 2 || cluster >= self.max_cluster_plus_one {
            return None;
        }
        Some(self.data_base + (cluster - 2) * self.sectors_per_cluster as u32)
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster as u32 * 512
    }

    /// The cluster a directory scan should start from to read the root:
    /// the FAT32 root cluster, or `0` as the static-root sentinel for
    /// FAT12/16.
    pub fn root_dir_cluster(&self) -> u32 {
        if self.fs_type == FatType::Fat32 {
            self.dir_base
        } else {
            0
        }
    }
}
