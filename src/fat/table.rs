//! The FAT engine: `get_link`/`set_link`/`allocate_next`/`truncate_chain`,
//! on top of the single window.
//!
//! Ported from `get_cluster`/`put_cluster`/`create_chain`/`remove_chain`
//! in `ff.c`: one engine handling all three cell widths, built on the
//! shared window rather than a redundant per-call sector cache.

use super::{FatType, Volume};
use crate::codec::{le16, le32, set_le16, set_le32};
use crate::device::BlockDevice;
use crate::error::{FResult, FatError};

/// The decoded contents of a FAT cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    Free,
    Next(u32),
    EndOfChain,
}

impl FatType {
    /// The sentinel value this driver writes to mark end-of-chain. Any
    /// value at or above `eoc_threshold()` is recognized as EOC on read;
    /// this is just the canonical one written on allocation.
    fn end_of_chain_value(self) -> u32 {
        match self {
            FatType::Fat12 => 0x0FFF,
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }
}

impl<D: BlockDevice> Volume<D> {
    fn classify_link(&self, raw: u32) -> ClusterLink {
        if raw == 0 {
            ClusterLink::Free
        } else if raw == 1 || raw >= self.fs_type.eoc_threshold() {
            ClusterLink::EndOfChain
        } else {
            ClusterLink::Next(raw)
        }
    }

    /// `get_link(c)`. Fails the bounds precondition (`2 <= c <
    /// max_cluster_plus_one`) with [`FatError::IoError`], matching the
    /// source's "return value 1" (fatal to the current operation).
    pub fn get_link(&mut self, c: u32) -> FResult<ClusterLink> {
        if c < 2 || c >= self.max_cluster_plus_one {
            return Err(FatError::IoError);
        }

        let raw = match self.fs_type {
            FatType::Fat12 => {
                let byte_off = c + c / 2;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;

                self.window.move_window(&mut self.device, sector)?;
                let b0 = self.window.as_slice()[offset];
                let b1 = if offset == 511 {
                    self.window.move_window(&mut self.device, sector + 1)?;
                    self.window.as_slice()[0]
                } else {
                    self.window.as_slice()[offset + 1]
                };

                let word = (b0 as u32) | ((b1 as u32) << 8);
                if c & 1 == 0 { word & 0x0FFF } else { word >> 4 }
            }
            FatType::Fat16 => {
                let byte_off = c as u32 * 2;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;

                self.window.move_window(&mut self.device, sector)?;
                le16(self.window.as_slice(), offset) as u32
            }
            FatType::Fat32 => {
                let byte_off = c * 4;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;

                self.window.move_window(&mut self.device, sector)?;
                le32(self.window.as_slice(), offset) & 0x0FFF_FFFF
            }
        };

        Ok(self.classify_link(raw))
    }

    /// `set_link(c, v)`. For FAT12, the two touched bytes may live in
    /// adjacent sectors; per the design notes the engine writes the first
    /// byte, advances the window (which writes the first sector back),
    /// then writes the second, so only one sector is ever resident.
    pub fn set_link(&mut self, c: u32, link: ClusterLink) -> FResult<()> {
        if c < 2 || c >= self.max_cluster_plus_one {
            return Err(FatError::IoError);
        }

        let value = match link {
            ClusterLink::Free => 0u32,
            ClusterLink::Next(n) => n,
            ClusterLink::EndOfChain => self.fs_type.end_of_chain_value(),
        };

        match self.fs_type {
            FatType::Fat12 => {
                let byte_off = c + c / 2;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;
                let straddles = offset == 511;

                self.window.move_window(&mut self.device, sector)?;
                let b0 = self.window.as_slice()[offset];
                let b1 = if straddles {
                    self.window.move_window(&mut self.device, sector + 1)?;
                    self.window.as_slice()[0]
                } else {
                    self.window.as_slice()[offset + 1]
                };

                let old_word = (b0 as u32) | ((b1 as u32) << 8);
                let value12 = value & 0x0FFF;
                let new_word = if c & 1 == 0 {
                    (old_word & 0xF000) | value12
                } else {
                    (old_word & 0x000F) | (value12 << 4)
                };
                let bytes = (new_word as u16).to_le_bytes();

                if straddles {
                    self.window.move_window(&mut self.device, sector)?;
                    self.window.as_mut_slice()[offset] = bytes[0];
                    self.window.move_window(&mut self.device, sector + 1)?;
                    self.window.as_mut_slice()[0] = bytes[1];
                } else {
                    self.window.as_mut_slice()[offset] = bytes[0];
                    self.window.as_mut_slice()[offset + 1] = bytes[1];
                }
            }
            FatType::Fat16 => {
                let byte_off = c as u32 * 2;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;

                self.window.move_window(&mut self.device, sector)?;
                set_le16(self.window.as_mut_slice(), offset, value as u16);
            }
            FatType::Fat32 => {
                let byte_off = c * 4;
                let sector = self.fat_base + byte_off / 512;
                let offset = (byte_off % 512) as usize;

                self.window.move_window(&mut self.device, sector)?;
                let old = le32(self.window.as_slice(), offset);
                let new = (old & 0xF000_0000) | (value & 0x0FFF_FFFF);
                set_le32(self.window.as_mut_slice(), offset, new);
            }
        }

        Ok(())
    }

    /// `allocate_next(hint)`: a circular scan of every valid cluster
    /// index starting just after `hint` (or at cluster 2 if `hint < 2`).
    /// On success the new cluster is marked end-of-chain and
    /// `last_allocated` is updated; linking a predecessor is the caller's
    /// job (see `extend_or_follow`).
    pub fn allocate_next(&mut self, hint: u32) -> FResult<u32> {
        let range = self.max_cluster_plus_one.saturating_sub(2);
        if range == 0 {
            return Err(FatError::DiskFull);
        }

        let start_idx = if hint < 2 { 0 } else { (hint - 2 + 1) % range };

        for i in 0..range {
            let idx = (start_idx + i) % range;
            let c = idx + 2;

            if let ClusterLink::Free = self.get_link(c)? {
                self.set_link(c, ClusterLink::EndOfChain)?;
                self.last_allocated = c;
                return Ok(c);
            }
        }

        log::warn!("drive {}: no free clusters", self.drive_id);
        Err(FatError::DiskFull)
    }

    /// Used by file writes: continues an existing chain past `c`,
    /// allocating and linking a new cluster if `c` was the last one, or
    /// allocates a fresh first cluster if `c == 0`.
    pub fn extend_or_follow(&mut self, c: u32) -> FResult<u32> {
        if c == 0 {
            return self.allocate_next(self.last_allocated);
        }

        match self.get_link(c)? {
            ClusterLink::Next(n) => Ok(n),
            ClusterLink::EndOfChain => {
                let new = self.allocate_next(c)?;
                self.set_link(c, ClusterLink::Next(new))?;
                Ok(new)
            }
            ClusterLink::Free => {
                log::error!("drive {}: chain from {} hit a free cluster", self.drive_id, c);
                Err(FatError::IoError)
            }
        }
    }

    /// `truncate_chain(c)`: frees every cluster reachable from `c`. A
    /// no-op for `c == 0`. Errors are fatal and may leave a partially
    /// truncated chain, per the source's own documented behavior.
    pub fn truncate_chain(&mut self, start: u32) -> FResult<()> {
        if start == 0 {
            return Ok(());
        }

        let mut c = start;
        loop {
            let link = self.get_link(c)?;
            self.set_link(c, ClusterLink::Free)?;

            match link {
                ClusterLink::Next(n) => c = n,
                ClusterLink::EndOfChain | ClusterLink::Free => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::tests_support::MemDevice;

    fn fat32_volume() -> Volume<MemDevice> {
        let mut v = Volume::new(MemDevice::new(4096), 0);
        v.fs_type = FatType::Fat32;
        v.sectors_per_cluster = 1;
        v.fat_copies = 2;
        v.sectors_per_fat = 4;
        v.fat_base = 8;
        v.data_base = 8 + 2 * 4;
        v.max_cluster_plus_one = 512;
        v.mounted = true;
        v.sync_window_region();
        v
    }

    #[test]
    fn round_trips_through_get_and_set() {
        let mut v = fat32_volume();
        v.set_link(5, ClusterLink::Next(9)).unwrap();
        assert_eq!(v.get_link(5).unwrap(), ClusterLink::Next(9));

        v.set_link(5, ClusterLink::EndOfChain).unwrap();
        assert_eq!(v.get_link(5).unwrap(), ClusterLink::EndOfChain);
    }

    #[test]
    fn allocate_next_skips_reserved_and_used_clusters() {
        let mut v = fat32_volume();
        v.set_link(2, ClusterLink::EndOfChain).unwrap();

        let c = v.allocate_next(0).unwrap();
        assert!(c >= 2);
        assert_ne!(c, 2);
        assert_eq!(v.get_link(c).unwrap(), ClusterLink::EndOfChain);
    }

    #[test]
    fn truncate_frees_every_reachable_cluster() {
        let mut v = fat32_volume();
        v.set_link(2, ClusterLink::Next(3)).unwrap();
        v.set_link(3, ClusterLink::Next(4)).unwrap();
        v.set_link(4, ClusterLink::EndOfChain).unwrap();

        v.truncate_chain(2).unwrap();

        assert_eq!(v.get_link(2).unwrap(), ClusterLink::Free);
        assert_eq!(v.get_link(3).unwrap(), ClusterLink::Free);
        assert_eq!(v.get_link(4).unwrap(), ClusterLink::Free);
    }
}
