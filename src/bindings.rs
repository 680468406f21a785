//! C FFI surface: an `ExternDisk` [`BlockDevice`] backed by an external
//! `disk_*` implementation, shaped exactly like ChaN's `diskio.h`
//! (`disk_initialize`/`disk_status`/`disk_read`/`disk_write`/`disk_ioctl`
//! with `STA_*`/`RES_*` byte codes), covering the full `diskio.h` surface
//! this driver needs (init/status/ioctl, not just read/write).

use crate::device::{BlockDevice, DResult, DStatus, IoCtl};
use core::ffi::c_void;

const STA_NOINIT: u8 = 0x01;
const STA_NODISK: u8 = 0x02;
const STA_PROTECT: u8 = 0x04;

const RES_OK: u8 = 0;
const RES_WRPRT: u8 = 2;
const RES_NOTRDY: u8 = 3;
const RES_PARERR: u8 = 4;

const GET_SECTORS: u8 = 1;
const CTRL_POWER: u8 = 2;
const CTRL_LOCK: u8 = 3;
const CTRL_EJECT: u8 = 4;

extern "C" {
    fn disk_initialize(drv: u8) -> u8;
    fn disk_status(drv: u8) -> u8;
    fn disk_read(drv: u8, buff: *mut u8, sector: u32, count: u8) -> u8;
    fn disk_write(drv: u8, buff: *const u8, sector: u32, count: u8) -> u8;
    fn disk_ioctl(drv: u8, ctrl: u8, buff: *mut c_void) -> u8;
}

fn decode_status(raw: u8) -> DStatus {
    let mut status = DStatus::empty();
    if raw & STA_NOINIT != 0 {
        status |= DStatus::NOT_INITIALIZED;
    }
    if raw & STA_NODISK != 0 {
        status |= DStatus::NO_MEDIA;
    }
    if raw & STA_PROTECT != 0 {
        status |= DStatus::WRITE_PROTECTED;
    }
    status
}

fn decode_result(raw: u8) -> DResult {
    match raw {
        RES_OK => DResult::Ok,
        RES_WRPRT => DResult::WriteProtected,
        RES_NOTRDY => DResult::NotReady,
        RES_PARERR => DResult::ParamError,
        _ => DResult::Error,
    }
}

/// A [`BlockDevice`] addressed by the BIOS-style drive number
/// `disk_initialize`/`disk_read`/etc. take as their first argument. The
/// actual storage medium lives entirely on the C side of this boundary.
pub struct ExternDisk {
    drive_num: u8,
}

impl ExternDisk {
    pub const fn new(drive_num: u8) -> Self {
        Self { drive_num }
    }
}

impl BlockDevice for ExternDisk {
    fn initialize(&mut self) -> DStatus {
        decode_status(unsafe { disk_initialize(self.drive_num) })
    }

    fn status(&self) -> DStatus {
        decode_status(unsafe { disk_status(self.drive_num) })
    }

    fn read(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> DResult {
        if count == 0 || count > u8::MAX as u32 || buf.len() < count as usize * 512 {
            return DResult::ParamError;
        }
        decode_result(unsafe { disk_read(self.drive_num, buf.as_mut_ptr(), lba, count as u8) })
    }

    fn write(&mut self, lba: u32, count: u32, buf: &[u8]) -> DResult {
        if count == 0 || count > u8::MAX as u32 || buf.len() < count as usize * 512 {
            return DResult::ParamError;
        }
        decode_result(unsafe { disk_write(self.drive_num, buf.as_ptr(), lba, count as u8) })
    }

    fn ioctl(&mut self, code: IoCtl) -> Option<u32> {
        let ctrl = match code {
            IoCtl::GetSectors => GET_SECTORS,
            IoCtl::CtrlPower => CTRL_POWER,
            IoCtl::CtrlLock => CTRL_LOCK,
            IoCtl::CtrlEject => CTRL_EJECT,
        };

        let mut out: u32 = 0;
        let result = decode_result(unsafe { disk_ioctl(self.drive_num, ctrl, &mut out as *mut u32 as *mut c_void) });

        match result {
            DResult::Ok if code == IoCtl::GetSectors => Some(out),
            DResult::Ok => Some(0),
            _ => None,
        }
    }
}
