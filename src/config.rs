//! Runtime configuration, the Rust shape of `ff.h`'s `_FS_READONLY`/
//! `_FS_MINIMIZE`/`_DRIVES`/`_USE_SJIS`/`_USE_MKFS` preprocessor switches.
//!
//! The original compiles whole functions out based on these `#define`s;
//! Rust has no equivalent of conditionally-compiled function bodies driven
//! by a runtime value, so `minimize` is a plain enum checked at the top of
//! the affected operations, returning [`crate::FatError::NotEnabled`]
//! instead of failing to compile the caller who tries to use them.

/// How much of the non-core surface is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Minimize {
    /// Everything is available.
    Full,
    /// `stat`/`getfree`/`unlink`/`mkdir`/`chmod`/`rename` are disabled.
    NoMetadataOps,
    /// The above, plus `opendir`/`readdir`.
    NoDirectoryOps,
}

impl Minimize {
    pub fn allows_metadata_ops(self) -> bool {
        matches!(self, Minimize::Full)
    }

    pub fn allows_directory_ops(self) -> bool {
        matches!(self, Minimize::Full | Minimize::NoMetadataOps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Config {
    /// Strip write operations; the engine behaves as if every volume were
    /// mounted read-only regardless of the device's own write-protect bit.
    pub read_only: bool,
    pub minimize: Minimize,
    /// Number of logical-drive slots in a [`crate::VolumeSlots`].
    pub drives: usize,
    /// Accept Shift-JIS lead bytes (0x81..0x9F, 0xE0..0xFC) in path
    /// segments, per § 4.6.
    pub shift_jis: bool,
    /// Whether [`crate::mkfs::mkfs`] is callable at all.
    pub enable_mkfs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_only: false,
            minimize: Minimize::Full,
            drives: 1,
            shift_jis: false,
            enable_mkfs: true,
        }
    }
}
