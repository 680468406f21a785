//! Result codes returned by every public operation.
//!
//! Mirrors `FRESULT` from the reference `ff.h`, collapsed into the five
//! kinds the design groups them into: device, geometry, namespace,
//! liveness and mkfs failures.

use core::fmt::{self, Debug, Display};

/// Everything that can go wrong, flattened into one enum so callers get a
/// single `match` instead of juggling per-layer error types.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatError {
    /// The underlying block device reported an I/O failure.
    IoError,
    /// `BlockDevice::initialize`/`status` reports the device is not ready.
    NotReady,
    /// The device (or the mounted volume) is write protected.
    WriteProtected,

    /// The boot sector at the candidate LBA carries neither the 0x55AA
    /// signature nor a recognizable "FATxx" string.
    NoFilesystem,
    /// The drive number parsed from a path has no slot in the volume table.
    InvalidDrive,
    /// The slot exists but has never been mounted.
    NotEnabled,

    /// The last path segment does not exist.
    NoFile,
    /// An intermediate path segment does not exist, or is not a directory.
    NoPath,
    /// `make_dirfile` rejected the segment.
    InvalidName,
    /// Read-only target, directory where a file was expected, an existing
    /// target for an exclusive create, or a non-empty directory for unlink.
    Denied,
    /// `allocate_next` scanned the whole table and found nothing free.
    DiskFull,

    /// The handle's mount-generation complement no longer matches the live
    /// volume (the volume was remounted since the handle was opened).
    InvalidObject,

    /// mkfs was asked for a device too small, an unsupported allocation
    /// unit, or produced a FAT16/32 table below the minimum cluster count.
    MkfsAborted,
}

impl Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

using_std! {
    impl std::error::Error for FatError {}
}

pub type FResult<T> = Result<T, FatError>;
