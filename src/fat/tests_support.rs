//! A `Vec<u8>`-backed `BlockDevice` used only by unit/integration tests.

#![cfg(test)]

use crate::device::{BlockDevice, DResult, DStatus, IoCtl};
use std::vec;
use std::vec::Vec;

pub struct MemDevice {
    sectors: Vec<u8>,
}

impl MemDevice {
    pub fn new(sector_count: usize) -> Self {
        Self { sectors: vec![0u8; sector_count * 512] }
    }
}

impl BlockDevice for MemDevice {
    fn initialize(&mut self) -> DStatus {
        DStatus::empty()
    }

    fn status(&self) -> DStatus {
        DStatus::empty()
    }

    fn read(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> DResult {
        let start = lba as usize * 512;
        let len = count as usize * 512;
        if start + len > self.sectors.len() {
            return DResult::ParamError;
        }
        buf[..len].copy_from_slice(&self.sectors[start..start + len]);
        DResult::Ok
    }

    fn write(&mut self, lba: u32, count: u32, buf: &[u8]) -> DResult {
        let start = lba as usize * 512;
        let len = count as usize * 512;
        if start + len > self.sectors.len() {
            return DResult::ParamError;
        }
        self.sectors[start..start + len].copy_from_slice(&buf[..len]);
        DResult::Ok
    }

    fn ioctl(&mut self, code: IoCtl) -> Option<u32> {
        match code {
            IoCtl::GetSectors => Some((self.sectors.len() / 512) as u32),
            _ => None,
        }
    }
}
