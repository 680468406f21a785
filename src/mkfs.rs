//! `f_mkfs`: lays down a fresh FAT12/16/32 filesystem on an unformatted
//! block device. Gated by [`crate::config::Config::enable_mkfs`], the
//! runtime equivalent of `ff.h`'s `_USE_MKFS` `#ifdef`.

use crate::codec::set_le32;
use crate::config::Config;
use crate::device::{BlockDevice, DStatus, IoCtl};
use crate::error::{FResult, FatError};
use crate::fat::boot_sector::{BiosParameterBlock, BootSector};
use crate::partition;

/// FDISK lays down a single primary partition starting at LBA 63 and
/// writes the partition table to sector 0. SFD ("super floppy disk")
/// treats the whole device as the filesystem, with no partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStyle {
    Fdisk,
    Sfd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fmt {
    Fat12,
    Fat16,
    Fat32,
}

const FAT_COPIES: u32 = 2;
const ROOT_DIR_ENTRIES: u32 = 512;
const ERASE_BLOCK: u32 = 32;

/// Formats `device`. `sectors_per_cluster` must be a power of two between
/// 1 and 64; anything else, or a device/geometry that can't host a FAT16
/// table with at least 0xFF7 clusters (or FAT32 with at least 0xFFF7),
/// fails with [`FatError::MkfsAborted`].
pub fn mkfs<D: BlockDevice>(device: &mut D, sectors_per_cluster: u8, partition: PartitionStyle, config: &Config) -> FResult<()> {
    if !config.enable_mkfs {
        return Err(FatError::NotEnabled);
    }
    if !matches!(sectors_per_cluster, 1 | 2 | 4 | 8 | 16 | 32 | 64) {
        return Err(FatError::MkfsAborted);
    }

    let status = device.initialize();
    if status.contains(DStatus::NOT_INITIALIZED) {
        return Err(FatError::NotReady);
    }
    if status.contains(DStatus::WRITE_PROTECTED) {
        return Err(FatError::WriteProtected);
    }

    // 128 sectors is the smallest SFD device that still has room for a
    // reserved sector, both FAT copies, a root directory and at least one
    // data cluster once the data area is rounded up to an erase block.
    let total_sectors = device.ioctl(IoCtl::GetSectors).ok_or(FatError::MkfsAborted)?;
    if total_sectors < 128 {
        return Err(FatError::MkfsAborted);
    }

    let (partition_base, partition_flag) = match partition {
        PartitionStyle::Fdisk => (63u32, 0u32),
        PartitionStyle::Sfd => (0u32, 1u32),
    };
    let partition_sectors = total_sectors - partition_base;

    let allocsize = sectors_per_cluster as u32;
    let cluster_estimate = partition_sectors / allocsize;
    let fmt = if cluster_estimate >= 0xFFF7 {
        Fmt::Fat32
    } else if cluster_estimate >= 0xFF7 {
        Fmt::Fat16
    } else {
        Fmt::Fat12
    };

    let mut n_fat = match fmt {
        Fmt::Fat12 => (cluster_estimate * 2 + 1) / 3 + 3 + 511,
        Fmt::Fat16 => cluster_estimate * 2 + 4 + 511,
        Fmt::Fat32 => cluster_estimate * 4 + 8 + 511,
    } / 512;
    let n_rsv = match fmt {
        Fmt::Fat32 => 33 - partition_flag,
        _ => 1 + partition_flag,
    };
    let n_dir = match fmt {
        Fmt::Fat32 => 0,
        _ => ROOT_DIR_ENTRIES * 32 / 512,
    };

    let b_fat = partition_base + n_rsv;
    let mut b_dir = b_fat + n_fat * FAT_COPIES;
    let b_data_unaligned = b_dir + n_dir;

    // Round the data area's start up to an erase-block boundary, growing
    // the FAT area (split evenly across both copies) to absorb the slack.
    let aligned = (b_data_unaligned + ERASE_BLOCK - 1) & !(ERASE_BLOCK - 1);
    let slack = aligned - b_data_unaligned;
    b_dir += slack;
    n_fat += slack / FAT_COPIES;

    let cluster_count = (partition_sectors - n_rsv - n_fat * FAT_COPIES - n_dir) / allocsize;
    if (fmt == Fmt::Fat16 && cluster_count < 0xFF7) || (fmt == Fmt::Fat32 && cluster_count < 0xFFF7) {
        return Err(FatError::MkfsAborted);
    }
    let b_data = b_fat + n_fat * FAT_COPIES + n_dir;

    if let PartitionStyle::Fdisk = partition {
        let system_id = partition::system_id_for(fmt == Fmt::Fat32, partition_sectors);
        let mut sector0 = [0u8; 512];
        partition::write_fdisk_table(&mut sector0, system_id, partition_base, partition_sectors);
        crate::fat::window::write_sector(device, 0, &sector0)?;
    }

    let bpb = BiosParameterBlock {
        bytes_per_sector: 512,
        sectors_per_cluster,
        reserved_sectors: n_rsv as u16,
        num_fats: FAT_COPIES as u8,
        root_entry_count: if fmt == Fmt::Fat32 { 0 } else { (n_dir * 16) as u16 },
        total_sectors_16: if partition_sectors < 0x10000 { partition_sectors as u16 } else { 0 },
        media_descriptor: 0xF8,
        sectors_per_fat_16: if fmt == Fmt::Fat32 { 0 } else { n_fat as u16 },
        sectors_per_track: 63,
        num_heads: 255,
        hidden_sectors: partition_base,
        total_sectors_32: if partition_sectors >= 0x10000 { partition_sectors } else { 0 },
        sectors_per_fat_32: if fmt == Fmt::Fat32 { n_fat } else { 0 },
        ext_flags: 0,
        fs_version: 0,
        root_cluster: if fmt == Fmt::Fat32 { 2 } else { 0 },
        fs_info_sector: if fmt == Fmt::Fat32 { 1 } else { 0 },
        backup_boot_sector: if fmt == Fmt::Fat32 { 6 } else { 0 },
        drive_number: 0x80,
        volume_id: 0,
        volume_label: *b"NO NAME    ",
        file_system_type: match fmt {
            Fmt::Fat12 => *b"FAT12   ",
            Fmt::Fat16 => *b"FAT16   ",
            Fmt::Fat32 => *b"FAT32   ",
        },
    };
    let boot = BootSector { oem_name: [0u8; 8], bpb };
    let mut boot_sector = [0u8; 512];
    boot.write(&mut boot_sector);
    crate::fat::window::write_sector(device, partition_base, &boot_sector)?;
    if fmt == Fmt::Fat32 {
        crate::fat::window::write_sector(device, partition_base + 6, &boot_sector)?;
    }

    if fmt == Fmt::Fat32 {
        let mut fsinfo = [0u8; 512];
        set_le32(&mut fsinfo, 0, 0x4161_5252);
        set_le32(&mut fsinfo, 484, 0x6141_7272);
        set_le32(&mut fsinfo, 488, 0xFFFF_FFFF);
        set_le32(&mut fsinfo, 492, 0xFFFF_FFFF);
        crate::codec::set_le16(&mut fsinfo, 510, 0xAA55);
        crate::fat::window::write_sector(device, partition_base + 1, &fsinfo)?;
        crate::fat::window::write_sector(device, partition_base + 7, &fsinfo)?;
    }

    for copy in 0..FAT_COPIES {
        let base = b_fat + copy * n_fat;
        let mut first = [0u8; 512];
        match fmt {
            Fmt::Fat12 => set_le32(&mut first, 0, 0x00FF_FFF8),
            Fmt::Fat16 => set_le32(&mut first, 0, 0xFFFF_FFF8),
            Fmt::Fat32 => {
                set_le32(&mut first, 0, 0xFFFF_FFF8);
                set_le32(&mut first, 4, 0xFFFF_FFFF);
                set_le32(&mut first, 8, 0x0FFF_FFFF);
            }
        }
        crate::fat::window::write_sector(device, base, &first)?;

        let zero = [0u8; 512];
        for s in 1..n_fat {
            crate::fat::window::write_sector(device, base + s, &zero)?;
        }
    }

    // Zero the root directory region precisely: `n_dir` sectors for
    // FAT12/16's static table, or just the root cluster for FAT32 (rather
    // than the source's unconditional 64-sector loop, which doesn't track
    // `n_dir` and can overrun a small partition's data area).
    let zero = [0u8; 512];
    let root_zero_sectors = if fmt == Fmt::Fat32 { sectors_per_cluster as u32 } else { n_dir };
    for s in 0..root_zero_sectors {
        crate::fat::window::write_sector(device, b_data + s, &zero)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::tests_support::MemDevice;
    use crate::fat::Volume;

    #[test]
    fn formats_a_small_device_as_fat12_and_mounts() {
        let mut device = MemDevice::new(2000);
        let config = Config::default();

        mkfs(&mut device, 1, PartitionStyle::Sfd, &config).unwrap();

        let mut volume = Volume::new(device, 0);
        let mut next_id = 0u16;
        volume.auto_mount(&mut next_id).unwrap();
        assert_eq!(volume.fs_type, crate::fat::FatType::Fat12);
    }

    #[test]
    fn formats_a_larger_device_as_fat32_and_mounts() {
        let mut device = MemDevice::new(1 << 17);
        let config = Config::default();

        mkfs(&mut device, 1, PartitionStyle::Fdisk, &config).unwrap();

        let mut volume = Volume::new(device, 0);
        let mut next_id = 0u16;
        volume.auto_mount(&mut next_id).unwrap();
        assert_eq!(volume.fs_type, crate::fat::FatType::Fat32);
    }

    #[test]
    fn refuses_when_disabled() {
        let mut device = MemDevice::new(1 << 16);
        let config = Config { enable_mkfs: false, ..Config::default() };
        assert_eq!(mkfs(&mut device, 1, PartitionStyle::Sfd, &config), Err(FatError::NotEnabled));
    }

    #[test]
    fn rejects_non_power_of_two_cluster_size() {
        let mut device = MemDevice::new(1 << 16);
        let config = Config::default();
        assert_eq!(mkfs(&mut device, 3, PartitionStyle::Sfd, &config), Err(FatError::MkfsAborted));
    }
}
