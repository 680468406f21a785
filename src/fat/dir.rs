//! Directory entries and the directory scan/mutate primitives built on
//! top of them: `dir_next`/`dir_find`/`dir_register`/`dir_remove` from
//! `ff.c`, ported onto the single window and `Volume<D>`.

use super::Volume;
use crate::codec::{le16, le32, set_le16, set_le32};
use crate::device::BlockDevice;
use crate::error::{FResult, FatError};

/// The one-byte attribute field. Plain bits, not a derive-generated
/// bitflags type, since only `contains`/`|` are ever needed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes(pub u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// Masked against the low six bits, marks a long-name fragment, which
    /// this driver skips rather than reassembling.
    pub const LONG_NAME: u8 = 0x0F;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }
}

/// A decoded 32-byte directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub cluster_low: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn empty(name: [u8; 11], attr: u8) -> Self {
        Self {
            name,
            attr,
            nt_reserved: 0,
            create_time_tenth: 0,
            create_time: 0,
            create_date: 0,
            access_date: 0,
            cluster_high: 0,
            write_time: 0,
            write_date: 0,
            cluster_low: 0,
            size: 0,
        }
    }

    pub fn from_bytes(b: &[u8; 32]) -> Self {
        Self {
            name: b[0..11].try_into().unwrap(),
            attr: b[11],
            nt_reserved: b[12],
            create_time_tenth: b[13],
            create_time: le16(b, 14),
            create_date: le16(b, 16),
            access_date: le16(b, 18),
            cluster_high: le16(b, 20),
            write_time: le16(b, 22),
            write_date: le16(b, 24),
            cluster_low: le16(b, 26),
            size: le32(b, 28),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut b = [0u8; 32];
        b[0..11].copy_from_slice(&self.name);
        b[11] = self.attr;
        b[12] = self.nt_reserved;
        b[13] = self.create_time_tenth;
        set_le16(&mut b, 14, self.create_time);
        set_le16(&mut b, 16, self.create_date);
        set_le16(&mut b, 18, self.access_date);
        set_le16(&mut b, 20, self.cluster_high);
        set_le16(&mut b, 22, self.write_time);
        set_le16(&mut b, 24, self.write_date);
        set_le16(&mut b, 26, self.cluster_low);
        set_le32(&mut b, 28, self.size);
        b
    }

    pub fn cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | self.cluster_low as u32
    }

    pub fn set_cluster(&mut self, cluster: u32) {
        self.cluster_high = (cluster >> 16) as u16;
        self.cluster_low = (cluster & 0xFFFF) as u16;
    }

    pub fn attributes(&self) -> Attributes {
        Attributes(self.attr)
    }
}

/// Where one directory entry lives: the sector holding it and its
/// 32-byte-aligned offset within that sector. Stable across the window
/// moving elsewhere and back, unlike a raw reference into the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub sector: u32,
    pub offset: usize,
}

impl EntryLocation {
    pub fn read<D: BlockDevice>(&self, volume: &mut Volume<D>) -> FResult<DirEntry> {
        volume.window.move_window(&mut volume.device, self.sector)?;
        let bytes: [u8; 32] = volume.window.as_slice()[self.offset..self.offset + 32]
            .try_into()
            .unwrap();
        Ok(DirEntry::from_bytes(&bytes))
    }

    pub fn write<D: BlockDevice>(&self, volume: &mut Volume<D>, entry: &DirEntry) -> FResult<()> {
        volume.window.move_window(&mut volume.device, self.sector)?;
        volume.window.as_mut_slice()[self.offset..self.offset + 32].copy_from_slice(&entry.to_bytes());
        Ok(())
    }

    pub fn attributes<D: BlockDevice>(&self, volume: &mut Volume<D>) -> FResult<Attributes> {
        Ok(self.read(volume)?.attributes())
    }

    pub fn cluster_num<D: BlockDevice>(&self, volume: &mut Volume<D>) -> FResult<u32> {
        Ok(self.read(volume)?.cluster())
    }

    /// Marks the slot deleted (`0xE5`) without disturbing the rest of the
    /// entry. Freeing its cluster chain is the caller's job.
    pub fn mark_deleted<D: BlockDevice>(&self, volume: &mut Volume<D>) -> FResult<()> {
        volume.window.move_window(&mut volume.device, self.sector)?;
        volume.window.as_mut_slice()[self.offset] = 0xE5;
        Ok(())
    }
}

fn is_long_name_fragment(attr: u8) -> bool {
    attr & 0x3F == Attributes::LONG_NAME
}

/// Entries `DirIter` walks past without surfacing: long-name fragments and
/// volume-label entries, neither of which name a file or directory a path
/// segment can match.
fn is_skippable(attr: u8) -> bool {
    is_long_name_fragment(attr) || attr & Attributes::VOLUME_ID != 0
}

/// A forward-only scan over one directory's entries, starting at
/// `start_cluster` (`0` meaning the static FAT12/16 root).
pub struct DirIter<'v, D: BlockDevice> {
    volume: &'v mut Volume<D>,
    is_static_root: bool,
    cluster: u32,
    sector: u32,
    sector_in_cluster: u32,
    index: usize,
    entries_seen: u32,
    done: bool,
}

impl<'v, D: BlockDevice> DirIter<'v, D> {
    /// `start_cluster == 0` means the static root (FAT12/16); any other
    /// value, including the FAT32 root cluster, is a regular chain.
    pub fn at_cluster(volume: &'v mut Volume<D>, start_cluster: u32) -> Self {
        let is_static_root = start_cluster == 0;
        let sector = if is_static_root {
            volume.dir_base
        } else {
            volume.cluster_to_sector(start_cluster).unwrap_or(volume.dir_base)
        };

        Self {
            volume,
            is_static_root,
            cluster: start_cluster,
            sector,
            sector_in_cluster: 0,
            index: 0,
            entries_seen: 0,
            done: false,
        }
    }

    fn current_location(&self) -> EntryLocation {
        EntryLocation { sector: self.sector, offset: self.index * 32 }
    }

    fn load_current(&mut self) -> FResult<[u8; 32]> {
        self.volume.window.move_window(&mut self.volume.device, self.sector)?;
        let bytes: [u8; 32] = self.volume.window.as_slice()[self.index * 32..self.index * 32 + 32]
            .try_into()
            .unwrap();
        Ok(bytes)
    }

    /// Moves to the next slot, crossing sector and cluster boundaries as
    /// needed. Returns `false` when the directory has no more slots (end
    /// of the static root, or end of the chain).
    fn advance_slot(&mut self) -> FResult<bool> {
        self.index += 1;
        self.entries_seen += 1;
        if self.index < 16 {
            return Ok(true);
        }
        self.index = 0;

        if self.is_static_root {
            if self.entries_seen >= self.volume.root_dir_entry_count as u32 {
                return Ok(false);
            }
            self.sector += 1;
            return Ok(true);
        }

        self.sector_in_cluster += 1;
        if self.sector_in_cluster < self.volume.sectors_per_cluster as u32 {
            self.sector += 1;
            return Ok(true);
        }

        match self.volume.get_link(self.cluster)? {
            super::table::ClusterLink::Next(next) => {
                self.cluster = next;
                self.sector_in_cluster = 0;
                self.sector = self.volume.cluster_to_sector(next).ok_or(FatError::IoError)?;
                Ok(true)
            }
            super::table::ClusterLink::EndOfChain | super::table::ClusterLink::Free => Ok(false),
        }
    }

    /// Returns the next live entry, skipping deleted slots (`0xE5`) and
    /// long-name fragments. `None` at the end marker or end of chain.
    pub fn next_entry(&mut self) -> FResult<Option<(DirEntry, EntryLocation)>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let raw = self.load_current()?;
            let loc = self.current_location();

            if raw[0] == 0x00 {
                self.done = true;
                return Ok(None);
            }

            let skip = raw[0] == 0xE5 || is_skippable(raw[11]);
            if !skip {
                let entry = DirEntry::from_bytes(&raw);
                if !self.advance_slot()? {
                    self.done = true;
                }
                return Ok(Some((entry, loc)));
            }

            if !self.advance_slot()? {
                self.done = true;
                return Ok(None);
            }
        }
    }

    /// `dir_find`: scans for the first live entry whose name matches.
    pub fn next_matching(&mut self, name: &[u8; 11]) -> FResult<Option<EntryLocation>> {
        while let Some((entry, loc)) = self.next_entry()? {
            if entry.name == *name {
                return Ok(Some(loc));
            }
        }
        Ok(None)
    }
}

fn zero_cluster<D: BlockDevice>(volume: &mut Volume<D>, cluster: u32) -> FResult<()> {
    let base = volume.cluster_to_sector(cluster).ok_or(FatError::IoError)?;
    for s in 0..volume.sectors_per_cluster as u32 {
        volume.window.move_window(&mut volume.device, base + s)?;
        for byte in volume.window.as_mut_slice().iter_mut() {
            *byte = 0;
        }
    }
    Ok(())
}

/// `dir_register`: finds the first deleted-or-unused slot in the chain
/// rooted at `start_cluster`, extending the chain by one freshly zeroed
/// cluster if every existing slot is occupied. The static root never
/// grows; it reports [`FatError::DiskFull`] instead.
pub fn reserve_entry<D: BlockDevice>(volume: &mut Volume<D>, start_cluster: u32) -> FResult<EntryLocation> {
    let is_static_root = start_cluster == 0;
    let mut cluster = start_cluster;
    let mut sector = if is_static_root {
        volume.dir_base
    } else {
        volume.cluster_to_sector(cluster).ok_or(FatError::IoError)?
    };
    let mut sector_in_cluster = 0u32;
    let mut entries_seen = 0u32;

    loop {
        for index in 0..16usize {
            if is_static_root && entries_seen >= volume.root_dir_entry_count as u32 {
                return Err(FatError::DiskFull);
            }

            volume.window.move_window(&mut volume.device, sector)?;
            let marker = volume.window.as_slice()[index * 32];
            if marker == 0x00 || marker == 0xE5 {
                return Ok(EntryLocation { sector, offset: index * 32 });
            }
            entries_seen += 1;
        }

        if is_static_root {
            sector += 1;
            continue;
        }

        sector_in_cluster += 1;
        if sector_in_cluster < volume.sectors_per_cluster as u32 {
            sector += 1;
            continue;
        }

        let next = volume.extend_or_follow(cluster)?;
        cluster = next;
        sector_in_cluster = 0;
        sector = volume.cluster_to_sector(cluster).ok_or(FatError::IoError)?;
        zero_cluster(volume, cluster)?;
    }
}

/// `dir_remove`: marks the entry deleted. Freeing its cluster chain (for
/// files and empty subdirectories) is the caller's responsibility.
pub fn delete_entry<D: BlockDevice>(volume: &mut Volume<D>, loc: EntryLocation) -> FResult<()> {
    loc.mark_deleted(volume)
}

/// Overwrites an entry's name in place, preserving every other field.
pub fn rename_entry<D: BlockDevice>(volume: &mut Volume<D>, loc: EntryLocation, new_name: [u8; 11]) -> FResult<()> {
    let mut entry = loc.read(volume)?;
    entry.name = new_name;
    loc.write(volume, &entry)
}

/// Populates a freshly allocated subdirectory cluster with the `.` and
/// `..` entries, per `ff.c`'s `create_dir`. `parent_cluster` is `0` when
/// the new directory's parent is the static FAT12/16 root.
pub fn init_subdirectory<D: BlockDevice>(
    volume: &mut Volume<D>,
    own_cluster: u32,
    parent_cluster: u32,
) -> FResult<()> {
    zero_cluster(volume, own_cluster)?;

    let mut dot = DirEntry::empty(*b".          ", Attributes::DIRECTORY);
    dot.set_cluster(own_cluster);
    let mut dotdot = DirEntry::empty(*b"..         ", Attributes::DIRECTORY);
    dotdot.set_cluster(parent_cluster);

    let base = volume.cluster_to_sector(own_cluster).ok_or(FatError::IoError)?;
    volume.window.move_window(&mut volume.device, base)?;
    volume.window.as_mut_slice()[0..32].copy_from_slice(&dot.to_bytes());
    volume.window.as_mut_slice()[32..64].copy_from_slice(&dotdot.to_bytes());

    Ok(())
}
