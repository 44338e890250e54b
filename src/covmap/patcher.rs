//! Reading, rewriting and writing back one section of a file.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::debug;

use super::{CoverageMap, PathRegion, PrefixMap};
use crate::error::{Error, Result};
use crate::macho::SectionInfo;
use crate::stream::{read_bytes_at, write_bytes_at};

/// Rewrites the paths of a `D`-formatted region of `length` bytes at
/// `offset` in the file at `path`.
///
/// The region is written back only if at least one path changed. Returns the
/// number of paths that changed.
pub fn patch_region<D: PathRegion>(
    path: &Path,
    offset: u64,
    length: u64,
    swap: bool,
    prefixes: &PrefixMap,
) -> Result<usize> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut region = read_bytes_at(&mut file, offset, length, "section data")?;
    let patched = D::decode(&region, offset, swap)?.rewrite(&mut region, prefixes)?;

    if patched > 0 {
        write_bytes_at(&mut file, offset, &region)?;
        debug!(
            "wrote {} bytes at {:#x} ({} paths)",
            region.len(),
            offset,
            patched
        );
    }
    Ok(patched)
}

/// Patches `__llvm_covmap` sections with a fixed set of prefix rules.
#[derive(Debug, Clone, Copy)]
pub struct CovmapPatcher<'a> {
    prefixes: &'a PrefixMap,
}

impl<'a> CovmapPatcher<'a> {
    /// Creates a patcher applying `prefixes`.
    pub fn new(prefixes: &'a PrefixMap) -> Self {
        Self { prefixes }
    }

    /// Rewrites the located section in the file at `path`.
    pub fn patch(&self, path: &Path, section: &SectionInfo) -> Result<usize> {
        patch_region::<CoverageMap>(
            path,
            section.file_offset,
            section.size,
            section.swap_byte_ordering,
            self.prefixes,
        )
    }

    /// Counts the paths a patch would change, without touching any file.
    ///
    /// `base` is the file offset `region` was read from.
    pub fn preview(&self, region: &[u8], base: u64, swap: bool) -> Result<usize> {
        let mut scratch = region.to_vec();
        CoverageMap::decode(region, base, swap)?.rewrite(&mut scratch, self.prefixes)
    }
}
