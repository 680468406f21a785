//! The per-file state machine: `f_open`/`f_read`/`f_write`/`f_lseek`/
//! `f_sync`/`f_close`, ported onto the single window and the caller-owned
//! [`File`] handle described in the data model.
//!
//! `File` itself carries no reference back to its volume — every method
//! below takes the owning [`Volume`] as an explicit argument, mirroring
//! `FIL`'s `fs` pointer but without the lifetime that would tie a handle
//! to one borrow of the volume for its whole lifetime.

use super::dir::{Attributes, DirEntry, EntryLocation};
use super::Volume;
use crate::clock::Clock;
use crate::config::Config;
use crate::device::BlockDevice;
use crate::error::{FResult, FatError};
use crate::path;

/// Open-mode flags, the Rust shape of `ff.h`'s `FA_*` constants. `READ`
/// and `WRITE` are also the bits latched into the handle's access flags;
/// `ERROR`/`DIRTY`/`WRITTEN` below extend the same byte with internal
/// state, exactly as `FA__ERROR`/`FA__DIRTY`/`FA__WRITTEN` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(pub u8);

impl OpenMode {
    pub const READ: OpenMode = OpenMode(0x01);
    pub const WRITE: OpenMode = OpenMode(0x02);
    pub const CREATE_ALWAYS: OpenMode = OpenMode(0x08);
    pub const OPEN_ALWAYS: OpenMode = OpenMode(0x10);

    pub fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for OpenMode {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        OpenMode(self.0 | rhs.0)
    }
}

const WRITTEN: u8 = 0x20;
const DIRTY: u8 = 0x40;
const ERROR: u8 = 0x80;

/// A handle to an open file. Owned by the caller; every operation below
/// borrows the volume it was opened against for the call's duration.
pub struct File {
    mount_id_complement: u16,
    flags: u8,
    file_position: u32,
    file_size: u32,
    origin_cluster: u32,
    current_cluster: u32,
    current_sector: u32,
    sectors_left_in_cluster: u8,
    directory_sector: u32,
    directory_entry_offset: usize,
    buffer: [u8; 512],
}

impl File {
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn position(&self) -> u32 {
        self.file_position
    }

    fn has_error(&self) -> bool {
        self.flags & ERROR != 0
    }

    fn latch_error<T>(&mut self, e: FatError) -> FResult<T> {
        self.flags |= ERROR;
        Err(e)
    }
}

impl<D: BlockDevice> Volume<D> {
    /// `f_open`. `next_mount_id` is the same counter `auto_mount` uses;
    /// see [`Volume::auto_mount`].
    pub fn open(
        &mut self,
        next_mount_id: &mut u16,
        path: &[u8],
        mode: OpenMode,
        clock: &dyn Clock,
        config: &Config,
    ) -> FResult<File> {
        self.auto_mount(next_mount_id)?;

        let wants_write = mode.contains(OpenMode::WRITE)
            || mode.contains(OpenMode::CREATE_ALWAYS)
            || mode.contains(OpenMode::OPEN_ALWAYS);

        if config.read_only && wants_write {
            return Err(FatError::WriteProtected);
        }

        let outcome = path::trace_for_create(self, path, config.shift_jis)?;

        let loc;
        if mode.contains(OpenMode::CREATE_ALWAYS) || mode.contains(OpenMode::OPEN_ALWAYS) {
            match outcome.found {
                None => {
                    let new_loc = crate::fat::dir::reserve_entry(self, outcome.parent_cluster)?;
                    let now = clock.now();
                    let mut entry = DirEntry::empty(outcome.name, Attributes::ARCHIVE);
                    entry.nt_reserved = outcome.nt_flag;
                    entry.create_time = now.time();
                    entry.create_date = now.date();
                    entry.write_time = now.time();
                    entry.write_date = now.date();
                    new_loc.write(self, &entry)?;
                    loc = new_loc;
                }
                Some(existing) => {
                    let entry = existing.read(self)?;
                    if entry.attributes().contains(Attributes::READ_ONLY)
                        || entry.attributes().contains(Attributes::DIRECTORY)
                    {
                        return Err(FatError::Denied);
                    }

                    if mode.contains(OpenMode::CREATE_ALWAYS) {
                        let original_cluster = entry.cluster();
                        let saved_sector = self.window.current_sector();

                        let mut truncated = entry;
                        truncated.set_cluster(0);
                        truncated.size = 0;
                        existing.write(self, &truncated)?;

                        self.truncate_chain(original_cluster)?;
                        self.window.move_window(&mut self.device, saved_sector)?;
                    }

                    loc = existing;
                }
            }
        } else {
            let found = outcome.found.ok_or(FatError::NoFile)?;
            let entry = found.read(self)?;
            if entry.attributes().contains(Attributes::DIRECTORY) {
                return Err(FatError::NoFile);
            }
            if mode.contains(OpenMode::WRITE) && entry.attributes().contains(Attributes::READ_ONLY) {
                return Err(FatError::Denied);
            }
            loc = found;
        }

        let entry = loc.read(self)?;
        let mut flags = 0u8;
        if mode.contains(OpenMode::READ) {
            flags |= OpenMode::READ.0;
        }
        if wants_write {
            flags |= OpenMode::WRITE.0;
        }

        Ok(File {
            mount_id_complement: !self.mount_id,
            flags,
            file_position: 0,
            file_size: entry.size,
            origin_cluster: entry.cluster(),
            current_cluster: 0,
            current_sector: 0,
            sectors_left_in_cluster: 1,
            directory_sector: loc.sector,
            directory_entry_offset: loc.offset,
            buffer: [0u8; 512],
        })
    }

    fn flush_file_buffer(&mut self, file: &mut File) -> FResult<()> {
        if file.flags & DIRTY != 0 {
            crate::fat::window::write_sector(&mut self.device, file.current_sector, &file.buffer)?;
            file.flags &= !DIRTY;
        }
        Ok(())
    }

    /// `f_read`.
    pub fn read(&mut self, file: &mut File, buf: &mut [u8]) -> FResult<usize> {
        self.validate(file.mount_id_complement)?;
        if file.has_error() {
            return Err(FatError::IoError);
        }
        if file.flags & OpenMode::READ.0 == 0 {
            return Err(FatError::Denied);
        }

        let remaining = (file.file_size - file.file_position) as usize;
        let mut to_read = buf.len().min(remaining);
        let mut done = 0usize;

        while to_read > 0 {
            if file.file_position % 512 == 0 {
                let sector = if file.sectors_left_in_cluster > 1 {
                    file.sectors_left_in_cluster -= 1;
                    file.current_sector + 1
                } else {
                    let next_cluster = if file.file_position == 0 {
                        file.origin_cluster
                    } else {
                        match self.get_link(file.current_cluster) {
                            Ok(crate::fat::table::ClusterLink::Next(c)) => c,
                            _ => return file.latch_error(FatError::IoError),
                        }
                    };
                    if next_cluster < 2 || next_cluster >= self.max_cluster_plus_one {
                        return file.latch_error(FatError::IoError);
                    }
                    let s = match self.cluster_to_sector(next_cluster) {
                        Some(s) => s,
                        None => return file.latch_error(FatError::IoError),
                    };
                    file.current_cluster = next_cluster;
                    file.sectors_left_in_cluster = self.sectors_per_cluster;
                    s
                };

                self.flush_file_buffer(file)?;
                file.current_sector = sector;

                let whole_sectors = to_read / 512;
                if whole_sectors > 0 {
                    let cc = whole_sectors.min(file.sectors_left_in_cluster as usize);
                    crate::fat::window::read_sector_multi(&mut self.device, sector, cc as u32, &mut buf[done..done + cc * 512])?;
                    file.sectors_left_in_cluster -= (cc - 1) as u8;
                    file.current_sector += (cc - 1) as u32;
                    let n = cc * 512;
                    file.file_position += n as u32;
                    done += n;
                    to_read -= n;
                    continue;
                }

                if crate::fat::window::read_sector(&mut self.device, sector, &mut file.buffer).is_err() {
                    return file.latch_error(FatError::IoError);
                }
            }

            let offset = (file.file_position % 512) as usize;
            let n = (512 - offset).min(to_read);
            buf[done..done + n].copy_from_slice(&file.buffer[offset..offset + n]);
            file.file_position += n as u32;
            done += n;
            to_read -= n;
        }

        Ok(done)
    }

    /// `f_write`.
    pub fn write(&mut self, file: &mut File, buf: &[u8]) -> FResult<usize> {
        self.validate(file.mount_id_complement)?;
        if file.has_error() {
            return Err(FatError::IoError);
        }
        if file.flags & OpenMode::WRITE.0 == 0 {
            return Err(FatError::Denied);
        }

        let mut to_write = buf.len();
        if file.file_size.checked_add(to_write as u32).is_none() {
            to_write = 0;
        }
        let mut done = 0usize;

        while to_write > 0 {
            if file.file_position % 512 == 0 {
                let sector = if file.sectors_left_in_cluster > 1 {
                    file.sectors_left_in_cluster -= 1;
                    file.current_sector + 1
                } else {
                    let next_cluster = if file.file_position == 0 {
                        if file.origin_cluster == 0 {
                            file.origin_cluster = match self.extend_or_follow(0) {
                                Ok(c) => c,
                                Err(_) => break,
                            };
                        }
                        file.origin_cluster
                    } else {
                        match self.extend_or_follow(file.current_cluster) {
                            Ok(c) => c,
                            Err(_) => break,
                        }
                    };
                    if next_cluster < 2 || next_cluster >= self.max_cluster_plus_one {
                        break;
                    }
                    let s = match self.cluster_to_sector(next_cluster) {
                        Some(s) => s,
                        None => break,
                    };
                    file.current_cluster = next_cluster;
                    file.sectors_left_in_cluster = self.sectors_per_cluster;
                    s
                };

                self.flush_file_buffer(file)?;
                file.current_sector = sector;

                let whole_sectors = to_write / 512;
                if whole_sectors > 0 {
                    let cc = whole_sectors.min(file.sectors_left_in_cluster as usize);
                    if crate::fat::window::write_sector_multi(&mut self.device, sector, cc as u32, &buf[done..done + cc * 512]).is_err() {
                        return file.latch_error(FatError::IoError);
                    }
                    file.sectors_left_in_cluster -= (cc - 1) as u8;
                    file.current_sector += (cc - 1) as u32;
                    let n = cc * 512;
                    file.file_position += n as u32;
                    done += n;
                    to_write -= n;
                    continue;
                }

                if file.file_position < file.file_size {
                    if crate::fat::window::read_sector(&mut self.device, sector, &mut file.buffer).is_err() {
                        return file.latch_error(FatError::IoError);
                    }
                }
            }

            let offset = (file.file_position % 512) as usize;
            let n = (512 - offset).min(to_write);
            file.buffer[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            file.flags |= DIRTY;
            file.file_position += n as u32;
            done += n;
            to_write -= n;
        }

        if file.file_position > file.file_size {
            file.file_size = file.file_position;
        }
        file.flags |= WRITTEN;
        Ok(done)
    }

    /// `f_lseek`. Clips `offset` to `file_size` rather than extending —
    /// see the open question recorded in DESIGN.md.
    pub fn seek(&mut self, file: &mut File, offset: u32) -> FResult<()> {
        self.validate(file.mount_id_complement)?;
        if file.has_error() {
            return Err(FatError::IoError);
        }

        self.flush_file_buffer(file)?;

        let offset = offset.min(file.file_size);
        file.file_position = offset;
        file.sectors_left_in_cluster = 1;

        if offset == 0 {
            return Ok(());
        }

        let sc = self.sectors_per_cluster as u32;
        let sectors_in = (offset - 1) / 512;
        let remainder_in_cluster = sc - (sectors_in % sc);
        file.sectors_left_in_cluster = remainder_in_cluster as u8;
        let clusters_to_skip = sectors_in / sc;

        let mut cluster = file.origin_cluster;
        for _ in 0..clusters_to_skip {
            cluster = match self.get_link(cluster) {
                Ok(crate::fat::table::ClusterLink::Next(c)) => c,
                _ => return file.latch_error(FatError::IoError),
            };
        }
        if cluster < 2 || cluster >= self.max_cluster_plus_one {
            return file.latch_error(FatError::IoError);
        }
        file.current_cluster = cluster;
        let base = self.cluster_to_sector(cluster).ok_or(FatError::IoError)?;
        file.current_sector = base + sc - remainder_in_cluster;

        if offset % 512 != 0 {
            if crate::fat::window::read_sector(&mut self.device, file.current_sector, &mut file.buffer).is_err() {
                return file.latch_error(FatError::IoError);
            }
        }

        Ok(())
    }

    /// `f_sync`: flushes the private buffer, then updates the directory
    /// entry (archive bit, cluster, size, modified time) and flushes the
    /// window.
    pub fn sync(&mut self, file: &mut File, clock: &dyn Clock) -> FResult<()> {
        self.validate(file.mount_id_complement)?;

        if file.flags & WRITTEN != 0 {
            self.flush_file_buffer(file)?;

            let loc = EntryLocation { sector: file.directory_sector, offset: file.directory_entry_offset };
            let mut entry = loc.read(self)?;
            entry.attr |= Attributes::ARCHIVE;
            entry.set_cluster(file.origin_cluster);
            entry.size = file.file_size;
            let now = clock.now();
            entry.write_time = now.time();
            entry.write_date = now.date();
            loc.write(self, &entry)?;

            file.flags &= !WRITTEN;
        }

        self.window.flush(&mut self.device)?;
        Ok(())
    }

    /// `f_close`: `sync`, then drop the handle. Rust ownership does the
    /// job `FIL::fs = NULL` does in the source — `file` cannot be used
    /// again after this call.
    pub fn close(&mut self, mut file: File, clock: &dyn Clock) -> FResult<()> {
        self.sync(&mut file, clock)
    }
}
