//! A FAT12/FAT16/FAT32 driver for resource-constrained block devices.
//!
//! The core only needs a narrow block-device contract (§ [`device`]) and a
//! wall-clock source (§ [`clock`]); it never allocates, never spawns a
//! thread, and holds a bounded amount of state: one 512-byte window per
//! mounted volume, one 512-byte buffer per open file.

#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

#[cfg(feature = "bindings")]
pub mod bindings;

pub mod mutex;

pub mod error;
pub mod codec;
pub mod device;
pub mod clock;
pub mod config;
pub mod partition;
pub mod path;
pub mod fat;
pub mod mkfs;
pub mod volume_slots;

pub use error::{FatError, FResult};
pub use device::BlockDevice;
pub use clock::{Clock, FatTimestamp};
pub use config::{Config, Minimize};
pub use fat::file::{File, OpenMode};
pub use fat::meta::{Dir, FileInfo};
pub use fat::dir::DirIter;
pub use volume_slots::VolumeSlots;
