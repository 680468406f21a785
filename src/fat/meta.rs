//! Metadata and directory-listing operations: `f_stat`/`f_getfree`/
//! `f_unlink`/`f_mkdir`/`f_chmod`/`f_rename`/`f_opendir`/`f_readdir`, gated
//! by [`crate::config::Minimize`] the way `ff.h`'s `_FS_MINIMIZE` gates the
//! matching `#if` blocks.

use super::dir::{self, Attributes, DirEntry, DirIter};
use super::table::ClusterLink;
use super::{FatType, Volume};
use crate::clock::Clock;
use crate::config::Config;
use crate::device::BlockDevice;
use crate::error::{FResult, FatError};
use crate::path;

/// A snapshot of one directory entry's metadata, the short-name-only shape
/// of `FILINFO` (no long-name reassembly, per the purpose & scope).
#[derive(Debug, Clone, Copy)]
pub struct FileInfo {
    pub size: u32,
    pub attr: u8,
    pub write_date: u16,
    pub write_time: u16,
    name: [u8; 12],
    name_len: u8,
}

impl FileInfo {
    /// The entry's display name: `BASE` or `BASE.EXT`, case-folded per its
    /// NT reserved-byte flags, with the `0x05`-aliased leading `0xE5` byte
    /// restored.
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    pub fn attributes(&self) -> Attributes {
        Attributes(self.attr)
    }

    fn from_entry(entry: &DirEntry) -> Self {
        let (name, name_len) = format_short_name(&entry.name, entry.nt_reserved);
        FileInfo {
            size: entry.size,
            attr: entry.attr,
            write_date: entry.write_date,
            write_time: entry.write_time,
            name,
            name_len,
        }
    }
}

/// `get_fileinfo`'s name-formatting half: body, then `.`, then extension,
/// spaces trimmed, case restored from the NT reserved byte.
fn format_short_name(name: &[u8; 11], nt: u8) -> ([u8; 12], u8) {
    let mut out = [0u8; 12];
    let mut n = 0usize;

    for &raw in &name[0..8] {
        if raw == b' ' {
            break;
        }
        let mut c = raw;
        if c == 0x05 {
            c = 0xE5;
        }
        if nt & path::NT_LOWER_BASE != 0 && c.is_ascii_uppercase() {
            c = c.to_ascii_lowercase();
        }
        out[n] = c;
        n += 1;
    }

    if name[8] != b' ' {
        out[n] = b'.';
        n += 1;
        for &raw in &name[8..11] {
            if raw == b' ' {
                break;
            }
            let mut c = raw;
            if nt & path::NT_LOWER_EXT != 0 && c.is_ascii_uppercase() {
                c = c.to_ascii_lowercase();
            }
            out[n] = c;
            n += 1;
        }
    }

    (out, n as u8)
}

/// A handle to an open directory scan. Like [`super::file::File`], carries
/// no reference back to its volume; every operation takes the owning
/// volume explicitly.
pub struct Dir {
    mount_id_complement: u16,
    is_static_root: bool,
    cluster: u32,
    sector: u32,
    sector_in_cluster: u32,
    index: usize,
    entries_seen: u32,
    done: bool,
}

impl<D: BlockDevice> Volume<D> {
    /// `f_opendir`.
    pub fn opendir(&mut self, next_mount_id: &mut u16, path: &[u8], config: &Config) -> FResult<Dir> {
        if !config.minimize.allows_directory_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let start_cluster = if path::is_root(path) {
            self.root_dir_cluster()
        } else {
            let outcome = path::trace_for_create(self, path, config.shift_jis)?;
            let loc = outcome.found.ok_or(FatError::NoFile)?;
            if !loc.attributes(self)?.contains(Attributes::DIRECTORY) {
                return Err(FatError::NoFile);
            }
            loc.cluster_num(self)?
        };

        let is_static_root = start_cluster == 0;
        let sector = if is_static_root {
            self.dir_base
        } else {
            self.cluster_to_sector(start_cluster).ok_or(FatError::IoError)?
        };

        Ok(Dir {
            mount_id_complement: !self.mount_id,
            is_static_root,
            cluster: start_cluster,
            sector,
            sector_in_cluster: 0,
            index: 0,
            entries_seen: 0,
            done: false,
        })
    }

    /// Advances `dir` past the current slot, crossing sector and cluster
    /// boundaries as needed. Mirrors `DirIter::advance_slot`, duplicated
    /// rather than shared because `Dir` must outlive the single call that
    /// advances it, unlike `DirIter`'s borrowed cursor.
    fn advance_dir_cursor(&mut self, dir: &mut Dir) -> FResult<bool> {
        dir.index += 1;
        dir.entries_seen += 1;
        if dir.index < 16 {
            return Ok(true);
        }
        dir.index = 0;

        if dir.is_static_root {
            if dir.entries_seen >= self.root_dir_entry_count as u32 {
                return Ok(false);
            }
            dir.sector += 1;
            return Ok(true);
        }

        dir.sector_in_cluster += 1;
        if dir.sector_in_cluster < self.sectors_per_cluster as u32 {
            dir.sector += 1;
            return Ok(true);
        }

        match self.get_link(dir.cluster)? {
            ClusterLink::Next(next) => {
                dir.cluster = next;
                dir.sector_in_cluster = 0;
                dir.sector = self.cluster_to_sector(next).ok_or(FatError::IoError)?;
                Ok(true)
            }
            ClusterLink::EndOfChain | ClusterLink::Free => Ok(false),
        }
    }

    /// `f_readdir`: skips deleted slots, `.`/`..`, and volume-label
    /// entries, per `get_fileinfo`'s caller in the source. `None` marks the
    /// end of the directory.
    pub fn readdir(&mut self, dir: &mut Dir, config: &Config) -> FResult<Option<FileInfo>> {
        self.validate(dir.mount_id_complement)?;
        if !config.minimize.allows_directory_ops() {
            return Err(FatError::NotEnabled);
        }
        if dir.done {
            return Ok(None);
        }

        loop {
            self.window.move_window(&mut self.device, dir.sector)?;
            let bytes: [u8; 32] = self.window.as_slice()[dir.index * 32..dir.index * 32 + 32]
                .try_into()
                .unwrap();

            if bytes[0] == 0x00 {
                dir.done = true;
                return Ok(None);
            }

            let skip = bytes[0] == 0xE5 || bytes[0] == b'.' || bytes[11] & Attributes::VOLUME_ID != 0;
            let entry = if skip { None } else { Some(DirEntry::from_bytes(&bytes)) };

            if !self.advance_dir_cursor(dir)? {
                dir.done = true;
            }

            if let Some(e) = entry {
                return Ok(Some(FileInfo::from_entry(&e)));
            }
            if dir.done {
                return Ok(None);
            }
        }
    }

    /// `f_stat`.
    pub fn stat(&mut self, next_mount_id: &mut u16, path: &[u8], config: &Config) -> FResult<FileInfo> {
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;
        let (loc, _) = path::trace(self, path, config.shift_jis)?;
        let entry = loc.read(self)?;
        Ok(FileInfo::from_entry(&entry))
    }

    /// `f_getfree`: a live scan of every FAT cell, since this driver (like
    /// the source) never trusts the FSInfo free-count hint.
    pub fn getfree(&mut self, next_mount_id: &mut u16, config: &Config) -> FResult<u32> {
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let mut free = 0u32;
        for c in 2..self.max_cluster_plus_one {
            if let ClusterLink::Free = self.get_link(c)? {
                free += 1;
            }
        }
        Ok(free)
    }

    /// `f_unlink`. Refuses a read-only target and a non-empty directory
    /// (any live entry besides `.`/`..`/a volume label).
    pub fn unlink(&mut self, next_mount_id: &mut u16, path: &[u8], config: &Config) -> FResult<()> {
        if config.read_only {
            return Err(FatError::WriteProtected);
        }
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let outcome = path::trace_for_create(self, path, config.shift_jis)?;
        let loc = outcome.found.ok_or(FatError::NoFile)?;
        let entry = loc.read(self)?;
        if entry.attributes().contains(Attributes::READ_ONLY) {
            return Err(FatError::Denied);
        }
        let cluster = entry.cluster();

        if entry.attributes().contains(Attributes::DIRECTORY) {
            let mut scan = DirIter::at_cluster(self, cluster);
            while let Some((child, _)) = scan.next_entry()? {
                if child.name[0] != b'.' && !child.attributes().contains(Attributes::VOLUME_ID) {
                    return Err(FatError::Denied);
                }
            }
        }

        dir::delete_entry(self, loc)?;
        self.truncate_chain(cluster)?;
        self.window.flush(&mut self.device)?;
        Ok(())
    }

    /// `f_mkdir`.
    pub fn mkdir(&mut self, next_mount_id: &mut u16, path: &[u8], clock: &dyn Clock, config: &Config) -> FResult<()> {
        if config.read_only {
            return Err(FatError::WriteProtected);
        }
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let outcome = path::trace_for_create(self, path, config.shift_jis)?;
        if outcome.found.is_some() {
            return Err(FatError::Denied);
        }

        let loc = dir::reserve_entry(self, outcome.parent_cluster)?;
        let new_cluster = self.extend_or_follow(0)?;

        let mut parent_for_dotdot = outcome.parent_cluster;
        if self.fs_type == FatType::Fat32 && parent_for_dotdot == self.dir_base {
            parent_for_dotdot = 0;
        }
        dir::init_subdirectory(self, new_cluster, parent_for_dotdot)?;

        let now = clock.now();
        let mut entry = DirEntry::empty(outcome.name, Attributes::DIRECTORY);
        entry.nt_reserved = outcome.nt_flag;
        entry.set_cluster(new_cluster);
        entry.create_time = now.time();
        entry.create_date = now.date();
        entry.write_time = now.time();
        entry.write_date = now.date();
        loc.write(self, &entry)?;

        self.window.flush(&mut self.device)?;
        Ok(())
    }

    /// `f_chmod`. `mask` is clipped to the bits the source allows changing
    /// (`RDO`/`HID`/`SYS`/`ARC` — `DIR` and `VOL` are never touched here).
    pub fn chmod(&mut self, next_mount_id: &mut u16, path: &[u8], value: u8, mask: u8, config: &Config) -> FResult<()> {
        if config.read_only {
            return Err(FatError::WriteProtected);
        }
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let (loc, _) = path::trace(self, path, config.shift_jis)?;
        let mask = mask & (Attributes::READ_ONLY | Attributes::HIDDEN | Attributes::SYSTEM | Attributes::ARCHIVE);

        let mut entry = loc.read(self)?;
        entry.attr = (value & mask) | (entry.attr & !mask);
        loc.write(self, &entry)?;

        self.window.flush(&mut self.device)?;
        Ok(())
    }

    /// `f_rename`. Preserves every field but the name (and its NT case
    /// flags) by copying the old entry into a freshly reserved slot, then
    /// deleting the old one.
    pub fn rename(&mut self, next_mount_id: &mut u16, old_path: &[u8], new_path: &[u8], config: &Config) -> FResult<()> {
        if config.read_only {
            return Err(FatError::WriteProtected);
        }
        if !config.minimize.allows_metadata_ops() {
            return Err(FatError::NotEnabled);
        }
        self.auto_mount(next_mount_id)?;

        let (old_loc, _) = path::trace(self, old_path, config.shift_jis)?;
        let saved = old_loc.read(self)?;

        let new_outcome = path::trace_for_create(self, new_path, config.shift_jis)?;
        if new_outcome.found.is_some() {
            return Err(FatError::Denied);
        }

        let new_loc = dir::reserve_entry(self, new_outcome.parent_cluster)?;
        let mut entry = saved;
        entry.name = new_outcome.name;
        entry.nt_reserved = new_outcome.nt_flag;
        new_loc.write(self, &entry)?;

        dir::delete_entry(self, old_loc)?;
        self.window.flush(&mut self.device)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::tests_support::MemDevice;

    fn test_volume() -> Volume<MemDevice> {
        let mut v = Volume::new(MemDevice::new(1 << 16), 0);
        v.fs_type = FatType::Fat32;
        v.sectors_per_cluster = 1;
        v.fat_copies = 2;
        v.sectors_per_fat = 8;
        v.fat_base = 8;
        v.data_base = 8 + 2 * 8;
        v.max_cluster_plus_one = 512;
        v.dir_base = 2;
        v.root_dir_entry_count = 0;
        v.mounted = true;
        v.sync_window_region();
        v.set_link(2, ClusterLink::EndOfChain).unwrap();
        v
    }

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn mkdir_then_opendir_then_readdir_finds_it() {
        let mut v = test_volume();
        let clock = crate::clock::NullClock;
        let mut next_id = 0u16;

        v.mkdir(&mut next_id, b"SUB", &clock, &cfg()).unwrap();

        let mut dir = v.opendir(&mut next_id, b"", &cfg()).unwrap();
        let found = v.readdir(&mut dir, &cfg()).unwrap().unwrap();
        assert_eq!(found.name(), b"SUB");
        assert!(found.attributes().contains(Attributes::DIRECTORY));
        assert!(v.readdir(&mut dir, &cfg()).unwrap().is_none());
    }

    #[test]
    fn stat_reports_size_and_name() {
        let mut v = test_volume();
        let clock = crate::clock::NullClock;
        let mut next_id = 0u16;

        let loc = dir::reserve_entry(&mut v, v.root_dir_cluster()).unwrap();
        let mut entry = DirEntry::empty(*b"HELLO   TXT", Attributes::ARCHIVE);
        entry.size = 7;
        loc.write(&mut v, &entry).unwrap();
        let _ = clock;

        let info = v.stat(&mut next_id, b"hello.txt", &cfg()).unwrap();
        assert_eq!(info.size, 7);
        assert_eq!(info.name(), b"hello.txt");
    }

    #[test]
    fn unlink_refuses_nonempty_directory() {
        let mut v = test_volume();
        let clock = crate::clock::NullClock;
        let mut next_id = 0u16;

        v.mkdir(&mut next_id, b"SUB", &clock, &cfg()).unwrap();
        v.mkdir(&mut next_id, b"SUB/INNER", &clock, &cfg()).unwrap();

        assert_eq!(v.unlink(&mut next_id, b"SUB", &cfg()), Err(FatError::Denied));
        v.unlink(&mut next_id, b"SUB/INNER", &cfg()).unwrap();
        v.unlink(&mut next_id, b"SUB", &cfg()).unwrap();
    }

    #[test]
    fn rename_preserves_size_under_new_name() {
        let mut v = test_volume();
        let mut next_id = 0u16;

        let loc = dir::reserve_entry(&mut v, v.root_dir_cluster()).unwrap();
        let mut entry = DirEntry::empty(*b"OLD     TXT", Attributes::ARCHIVE);
        entry.size = 99;
        loc.write(&mut v, &entry).unwrap();

        v.rename(&mut next_id, b"old.txt", b"new.txt", &cfg()).unwrap();

        assert_eq!(v.stat(&mut next_id, b"old.txt", &cfg()), Err(FatError::NoFile));
        let info = v.stat(&mut next_id, b"new.txt", &cfg()).unwrap();
        assert_eq!(info.size, 99);
    }

    #[test]
    fn getfree_counts_every_unused_cluster() {
        let mut v = test_volume();
        let mut next_id = 0u16;
        let total_free_before = v.getfree(&mut next_id, &cfg()).unwrap();

        v.mkdir(&mut next_id, b"SUB", &crate::clock::NullClock, &cfg()).unwrap();
        let total_free_after = v.getfree(&mut next_id, &cfg()).unwrap();

        assert_eq!(total_free_after, total_free_before - 1);
    }
}
