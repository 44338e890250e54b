//! LLVM coverage map decoding and in-place path rewriting.
//!
//! The coverage map section stores the source file names of every
//! instrumented translation unit. Rewriting a name prefix must not change the
//! size of the section, so shortened filename groups are padded back to their
//! original size with extra filenames the coverage data never refers to.

mod map;
mod patcher;
mod prefix;

pub use map::*;
pub use patcher::*;
pub use prefix::*;

use crate::error::Result;

/// Byte range of one embedded path string within a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathExtent {
    /// Offset of the first path byte from the start of the region
    pub offset: usize,
    /// Length of the path in bytes
    pub len: usize,
}

/// A section format that embeds path strings and can rewrite them in place.
pub trait PathRegion: Sized {
    /// Decodes the structure of a region read from the file.
    ///
    /// `base` is the file offset the region was read from; alignment inside
    /// the region is relative to the start of the file.
    fn decode(region: &[u8], base: u64, swap: bool) -> Result<Self>;

    /// Lists every embedded path, in region order.
    fn path_extents(&self) -> Vec<PathExtent>;

    /// Rewrites mapped path prefixes in `region`, which must be the bytes this
    /// value was decoded from.
    ///
    /// The region keeps its length. Returns the number of paths that changed.
    fn rewrite(&self, region: &mut [u8], prefixes: &PrefixMap) -> Result<usize>;
}
