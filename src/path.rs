//! Path tokenizing, 8.3 encoding (`make_dirfile`), and path tracing
//! (`trace_path`), ported from the matching functions in `ff.c`.
//!
//! Paths are byte strings: `N:/a/b` (drive prefix optional), slash
//! separated, with an optional leading slash. An empty path names the
//! root directory.

use crate::device::BlockDevice;
use crate::error::{FResult, FatError};
use crate::fat::dir::{Attributes, DirIter, EntryLocation};
use crate::fat::Volume;

const REJECTED: &[u8] = b"\"*+,/:;<=>?[\\]|";

fn is_rejected(byte: u8) -> bool {
    byte <= b' ' || REJECTED.contains(&byte)
}

fn is_sjis_lead(byte: u8) -> bool {
    (0x81..=0x9F).contains(&byte) || (0xE0..=0xFC).contains(&byte)
}

/// The NT case-flag bits, set when the base or extension was supplied in
/// (pure) lowercase, for case-preserving read-back.
pub const NT_LOWER_BASE: u8 = 0x08;
pub const NT_LOWER_EXT: u8 = 0x10;

/// Splits a path into its drive prefix (if any) and the remainder.
pub fn split_drive_prefix(path: &[u8]) -> (Option<u8>, &[u8]) {
    if path.len() >= 2 && path[0].is_ascii_digit() && path[1] == b':' {
        (Some(path[0] - b'0'), &path[2..])
    } else {
        (None, path)
    }
}

/// An iterator over the slash-delimited segments of a path, with leading
/// and repeated slashes collapsed and a trailing empty segment (a path
/// ending in `/`) dropped.
pub struct Segments<'a> {
    rest: &'a [u8],
}

impl<'a> Segments<'a> {
    pub fn new(path: &'a [u8]) -> Self {
        let mut rest = path;
        while rest.first() == Some(&b'/') {
            rest = &rest[1..];
        }
        Self { rest }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        let end = self.rest.iter().position(|b| *b == b'/').unwrap_or(self.rest.len());
        let (segment, mut remainder) = self.rest.split_at(end);
        while remainder.first() == Some(&b'/') {
            remainder = &remainder[1..];
        }
        self.rest = remainder;
        Some(segment)
    }
}

/// `make_dirfile`: encodes one path segment into an 11-byte (8+3) name and
/// its NT case-flag byte.
pub fn make_dirfile(segment: &[u8], shift_jis: bool) -> FResult<([u8; 11], u8)> {
    if segment.is_empty() {
        return Err(FatError::InvalidName);
    }

    // Only the first dot (and any dots immediately following it) marks the
    // base/extension boundary; a later, non-consecutive dot is rejected
    // rather than treated as part of the extension.
    let split = segment.iter().position(|b| *b == b'.').unwrap_or(segment.len());
    let base_src = &segment[..split];
    let mut ext_start = split;
    while ext_start < segment.len() && segment[ext_start] == b'.' {
        ext_start += 1;
    }
    let ext_src = &segment[ext_start..];

    if base_src.is_empty() || ext_src.iter().any(|b| *b == b'.') {
        return Err(FatError::InvalidName);
    }

    let mut name = [b' '; 11];
    let mut nt = 0u8;

    encode_field(base_src, &mut name[0..8], shift_jis)?;
    if base_src.iter().any(|b| b.is_ascii_lowercase()) && !base_src.iter().any(|b| b.is_ascii_uppercase()) {
        nt |= NT_LOWER_BASE;
    }

    if !ext_src.is_empty() {
        encode_field(ext_src, &mut name[8..11], shift_jis)?;
        if ext_src.iter().any(|b| b.is_ascii_lowercase()) && !ext_src.iter().any(|b| b.is_ascii_uppercase()) {
            nt |= NT_LOWER_EXT;
        }
    }

    if name[0] == 0xE5 {
        name[0] = 0x05;
    }

    Ok((name, nt))
}

fn encode_field(src: &[u8], dst: &mut [u8], shift_jis: bool) -> FResult<()> {
    let mut out = 0usize;
    let mut i = 0usize;

    while i < src.len() {
        let b = src[i];

        if shift_jis && is_sjis_lead(b) && i + 1 < src.len() {
            if out + 2 > dst.len() {
                return Err(FatError::InvalidName);
            }
            dst[out] = b;
            dst[out + 1] = src[i + 1];
            out += 2;
            i += 2;
            continue;
        }

        if is_rejected(b) {
            return Err(FatError::InvalidName);
        }

        if out >= dst.len() {
            return Err(FatError::InvalidName);
        }

        dst[out] = b.to_ascii_uppercase();
        out += 1;
        i += 1;
    }

    Ok(())
}

/// Returns `true` if `path` (after stripping any drive prefix) names the
/// root directory itself — an empty path, or one consisting only of
/// slashes.
pub fn is_root(path: &[u8]) -> bool {
    let (_, path) = split_drive_prefix(path);
    Segments::new(path).next().is_none()
}

/// The outcome of walking every segment but the last: the cluster the
/// final segment should be looked up in (or created in), its encoded
/// name, and the matched entry, if any.
pub struct TraceOutcome {
    pub parent_cluster: u32,
    pub name: [u8; 11],
    pub nt_flag: u8,
    pub found: Option<EntryLocation>,
}

/// `trace_path`, stopping short of requiring the last segment to exist.
/// Intermediate segments must exist and be directories ([`FatError::NoPath`]
/// otherwise); the last segment's absence is reported via `found: None`
/// rather than an error, so callers that create entries (`f_open`,
/// `f_mkdir`, `f_rename`'s destination) can reuse this walk.
pub fn trace_for_create<D: BlockDevice>(
    volume: &mut Volume<D>,
    path: &[u8],
    shift_jis: bool,
) -> FResult<TraceOutcome> {
    let (_, path) = split_drive_prefix(path);
    let mut segments = Segments::new(path).peekable();

    let mut cluster = volume.root_dir_cluster();

    loop {
        let segment = match segments.next() {
            Some(s) => s,
            None => return Err(FatError::InvalidName),
        };
        let is_last = segments.peek().is_none();

        let (name, nt_flag) = make_dirfile(segment, shift_jis)?;

        let mut iter = DirIter::at_cluster(volume, cluster);
        let found = iter.next_matching(&name)?;

        if is_last {
            return Ok(TraceOutcome { parent_cluster: cluster, name, nt_flag, found });
        }

        match found {
            None => return Err(FatError::NoPath),
            Some(loc) => {
                let attrs = loc.attributes(volume)?;
                if !attrs.contains(Attributes::DIRECTORY) {
                    return Err(FatError::NoPath);
                }
                cluster = loc.cluster_num(volume)?;
            }
        }
    }
}

/// `trace_path`: walks `path` from the volume root, returning the matched
/// entry's location or the appropriate `NO_FILE`/`NO_PATH` error.
pub fn trace<D: BlockDevice>(
    volume: &mut Volume<D>,
    path: &[u8],
    shift_jis: bool,
) -> FResult<(EntryLocation, [u8; 11])> {
    let outcome = trace_for_create(volume, path, shift_jis)?;
    match outcome.found {
        Some(loc) => Ok((loc, outcome.name)),
        None => Err(FatError::NoFile),
    }
}
