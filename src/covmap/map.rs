//! Coverage mapping records and their filename groups.
//!
//! A `__llvm_covmap` section is a sequence of records, each:
//!
//! ```text
//! u32 n_records | u32 filenames_size | u32 coverage_size | u32 version
//! function records (v1: 24 bytes each, v2: 20 bytes each, v3: none)
//! filename group:  uleb count, count x (uleb length, bytes)
//! ... remaining filename and coverage bytes ...
//! ```
//!
//! Records after the first start at a file offset that is a multiple of 8,
//! whatever the section's own alignment. The coverage data
//! refers to filenames by their index in the group, so filenames appended at
//! the end of a group are never referenced.

use tracing::{debug, trace};

use super::{PathExtent, PathRegion, PrefixMap};
use crate::error::{Error, Result};
use crate::util::{align_up, read_u32, read_uleb128_fast, uleb128_len, write_uleb128};

const RECORD_ALIGNMENT: usize = 8;

/// Largest encoded size of one padding filename: a one-byte length followed
/// by up to 127 NUL bytes.
const MAX_PADDING_FILENAME: usize = 128;

// =============================================================================
// Header
// =============================================================================

/// Format version of a coverage mapping record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovmapVersion {
    /// LLVM 3.x, function records carry a name reference and size
    V1,
    /// Function records carry a name MD5
    V2,
    /// Function records moved to `__llvm_covfun`
    V3,
}

impl CovmapVersion {
    /// Decodes the raw version field, which is zero-based.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(CovmapVersion::V1),
            1 => Ok(CovmapVersion::V2),
            2 => Ok(CovmapVersion::V3),
            _ => Err(Error::UnsupportedCovmapVersion(raw.saturating_add(1))),
        }
    }

    /// Size of one inline function record, if this version has them.
    pub fn function_record_size(self) -> Option<usize> {
        match self {
            CovmapVersion::V1 => Some(24),
            CovmapVersion::V2 => Some(20),
            CovmapVersion::V3 => None,
        }
    }
}

/// Fixed header of a coverage mapping record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CovmapHeader {
    /// Number of inline function records
    pub n_records: u32,
    /// Size of the filename data, including the group
    pub filenames_size: u32,
    /// Size of the coverage mapping data
    pub coverage_size: u32,
    /// Raw version field
    pub version: u32,
}

impl CovmapHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 16;

    fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            n_records: cursor.read_u32("record count")?,
            filenames_size: cursor.read_u32("filenames size")?,
            coverage_size: cursor.read_u32("coverage size")?,
            version: cursor.read_u32("version")?,
        })
    }
}

// =============================================================================
// Cursor
// =============================================================================

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    swap: bool,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], swap: bool) -> Self {
        Self { data, pos: 0, swap }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::covmap(
                self.pos,
                format!("truncated {what}: need {len} bytes, {} left", self.remaining()),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let swap = self.swap;
        self.take(4, what).map(|b| read_u32(b, swap))
    }

    fn read_uleb128(&mut self, what: &str) -> Result<usize> {
        let (value, len) = read_uleb128_fast(&self.data[self.pos..])
            .ok_or_else(|| Error::covmap(self.pos, format!("bad ULEB128 {what}")))?;
        let value = usize::try_from(value)
            .map_err(|_| Error::covmap(self.pos, format!("{what} {value} out of range")))?;
        self.pos += len;
        Ok(value)
    }
}

// =============================================================================
// Filename Groups
// =============================================================================

/// One filename as stored in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPath {
    /// Where the path bytes sit in the region
    pub extent: PathExtent,
    /// The path bytes
    pub bytes: Vec<u8>,
}

/// The encoded filename list at the start of a record's filename data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameGroup {
    /// Offset of the encoded group in the region
    pub offset: usize,
    /// Encoded size of the group in bytes
    pub size: usize,
    /// Filenames, in index order
    pub paths: Vec<EmbeddedPath>,
}

impl FilenameGroup {
    fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        let offset = cursor.pos;
        let count = cursor.read_uleb128("filename count")?;

        // Every filename takes at least one byte.
        let mut paths = Vec::with_capacity(count.min(cursor.remaining()));
        for _ in 0..count {
            let len = cursor.read_uleb128("filename length")?;
            let start = cursor.pos;
            let bytes = cursor.take(len, "filename")?;
            paths.push(EmbeddedPath {
                extent: PathExtent { offset: start, len },
                bytes: bytes.to_vec(),
            });
        }

        Ok(Self {
            offset,
            size: cursor.pos - offset,
            paths,
        })
    }

    /// Byte offset just past the group.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Filenames with mapped prefixes replaced, and how many changed.
    fn rewritten(&self, prefixes: &PrefixMap) -> (Vec<Vec<u8>>, usize) {
        let mut changed = 0;
        let names = self
            .paths
            .iter()
            .map(|path| match prefixes.rewrite(&path.bytes) {
                Some(new) if new != path.bytes => {
                    changed += 1;
                    new
                }
                _ => path.bytes.clone(),
            })
            .collect();
        (names, changed)
    }
}

/// Natural encoded size of a filename list.
pub fn encoded_group_size(names: &[Vec<u8>]) -> usize {
    uleb128_len(names.len() as u64)
        + names
            .iter()
            .map(|n| uleb128_len(n.len() as u64) + n.len())
            .sum::<usize>()
}

/// Chooses padding filenames that grow a group of `count` filenames by
/// exactly `padding` bytes.
///
/// Returns the encoded size of each padding filename, or `None` when no
/// split exists. Adding filenames can lengthen the encoded count, which eats
/// into the padding; the fewest filenames that still fit are used.
pub fn padding_plan(count: usize, padding: usize) -> Option<Vec<usize>> {
    if padding == 0 {
        return Some(Vec::new());
    }

    let base = uleb128_len(count as u64);
    for k in 1..=padding {
        let growth = uleb128_len((count + k) as u64) - base;
        let available = padding.checked_sub(growth)?;
        if available < k {
            return None;
        }
        if available <= k * MAX_PADDING_FILENAME {
            let mut sizes = Vec::with_capacity(k);
            let mut remaining = available;
            for i in 0..k {
                let after = k - i - 1;
                let size = (remaining - after).min(MAX_PADDING_FILENAME);
                sizes.push(size);
                remaining -= size;
            }
            return Some(sizes);
        }
    }
    None
}

/// Encodes `names` into exactly `target` bytes, appending padding filenames.
pub fn encode_group(names: &[Vec<u8>], target: usize, offset: usize) -> Result<Vec<u8>> {
    let natural = encoded_group_size(names);
    let padding = target.checked_sub(natural).ok_or_else(|| {
        Error::covmap(
            offset,
            format!("filename group grew from {target} to {natural} bytes"),
        )
    })?;
    let plan =
        padding_plan(names.len(), padding).ok_or(Error::PaddingDoesNotFit { offset, padding })?;

    let mut out = Vec::with_capacity(target);
    write_uleb128((names.len() + plan.len()) as u64, &mut out);
    for name in names {
        write_uleb128(name.len() as u64, &mut out);
        out.extend_from_slice(name);
    }
    for size in plan {
        out.push((size - 1) as u8);
        out.resize(out.len() + size - 1, 0);
    }

    if out.len() != target {
        return Err(Error::covmap(
            offset,
            format!("encoded filename group is {} bytes, expected {target}", out.len()),
        ));
    }
    Ok(out)
}

// =============================================================================
// Coverage Map
// =============================================================================

/// Decoded layout of a `__llvm_covmap` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMap {
    len: usize,
    /// One filename group per mapping record, in section order
    pub groups: Vec<FilenameGroup>,
}

impl CoverageMap {
    /// Length of the region this map was decoded from.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of filenames across all groups.
    pub fn path_count(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len()).sum()
    }
}

impl PathRegion for CoverageMap {
    fn decode(region: &[u8], base: u64, swap: bool) -> Result<Self> {
        // Distance of the region start past the previous 8-byte file boundary
        let skew = (base % RECORD_ALIGNMENT as u64) as usize;
        let mut cursor = Cursor::new(region, swap);
        let mut groups = Vec::new();

        while cursor.remaining() > 0 {
            let record_start = cursor.pos;
            let header = CovmapHeader::read(&mut cursor)?;
            let version = CovmapVersion::from_raw(header.version)?;

            let records_len = match version.function_record_size() {
                Some(size) => (header.n_records as usize).checked_mul(size),
                None if header.n_records == 0 => Some(0),
                None => {
                    return Err(Error::covmap(
                        record_start,
                        format!("{:?} mapping declares {} inline records", version, header.n_records),
                    ))
                }
            }
            .ok_or_else(|| Error::covmap(record_start, "function record table overflows"))?;
            cursor.take(records_len, "function records")?;

            let data_start = cursor.pos;
            let filenames_end = data_start + header.filenames_size as usize;
            let data_end = filenames_end
                .checked_add(header.coverage_size as usize)
                .filter(|&end| end <= region.len())
                .ok_or_else(|| {
                    Error::covmap(record_start, "mapping data extends past the end of the section")
                })?;

            let group = FilenameGroup::read(&mut cursor)?;
            if group.end() > filenames_end {
                return Err(Error::covmap(
                    group.offset,
                    format!(
                        "filename group of {} bytes overruns declared size {}",
                        group.size, header.filenames_size
                    ),
                ));
            }

            trace!(
                "{:#x}: {:?} mapping, {} function records, {} filenames",
                record_start,
                version,
                header.n_records,
                group.paths.len()
            );
            groups.push(group);

            cursor.pos = data_end;
            if data_end < region.len() {
                let next = align_up(skew + data_end, RECORD_ALIGNMENT) - skew;
                if next > region.len() {
                    return Err(Error::covmap(data_end, "unaligned trailing bytes"));
                }
                cursor.pos = next;
            }
        }

        Ok(Self {
            len: region.len(),
            groups,
        })
    }

    fn path_extents(&self) -> Vec<PathExtent> {
        self.groups
            .iter()
            .flat_map(|g| g.paths.iter().map(|p| p.extent))
            .collect()
    }

    fn rewrite(&self, region: &mut [u8], prefixes: &PrefixMap) -> Result<usize> {
        if region.len() != self.len {
            return Err(Error::covmap(
                0,
                format!("region is {} bytes, decoded {}", region.len(), self.len),
            ));
        }

        let mut patched = 0;
        for group in &self.groups {
            let (names, changed) = group.rewritten(prefixes);
            if changed == 0 {
                continue;
            }

            let bytes = encode_group(&names, group.size, group.offset)?;
            region[group.offset..group.end()].copy_from_slice(&bytes);
            debug!(
                "{:#x}: rewrote {} of {} filenames",
                group.offset,
                changed,
                group.paths.len()
            );
            patched += changed;
        }
        Ok(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixture::{self, Mapping};

    fn prefixes(old: &str, new: &str) -> PrefixMap {
        PrefixMap::single(old, new).unwrap()
    }

    fn names(map: &CoverageMap) -> Vec<Vec<String>> {
        map.groups
            .iter()
            .map(|g| {
                g.paths
                    .iter()
                    .map(|p| String::from_utf8_lossy(&p.bytes).into_owned())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_version_from_raw() {
        assert_eq!(CovmapVersion::from_raw(0).unwrap(), CovmapVersion::V1);
        assert_eq!(CovmapVersion::V2.function_record_size(), Some(20));
        assert_eq!(CovmapVersion::V3.function_record_size(), None);

        let err = CovmapVersion::from_raw(3).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCovmapVersion(4)));
        assert_eq!(err.kind(), ErrorKind::InvalidFile);
    }

    #[test]
    fn test_decode_all_versions() {
        let region = fixture::covmap(
            &[
                Mapping::new(0, 2, &["/build/a.c", "/build/a.h"]),
                Mapping::new(1, 3, &["/build/b.c"]),
                Mapping::new(2, 0, &["/build/c.c", "/usr/include/stdio.h"]),
            ],
            false,
        );
        let map = CoverageMap::decode(&region, 0, false).unwrap();

        assert_eq!(map.len(), region.len());
        assert_eq!(
            names(&map),
            [
                vec!["/build/a.c", "/build/a.h"],
                vec!["/build/b.c"],
                vec!["/build/c.c", "/usr/include/stdio.h"],
            ]
        );
        assert_eq!(map.path_count(), 5);

        for extent in map.path_extents() {
            assert_eq!(region[extent.offset], b'/');
            assert_eq!(region[extent.offset - 1] as usize, extent.len);
        }
    }

    #[test]
    fn test_decode_swapped() {
        let mappings = [Mapping::new(1, 1, &["/build/x.c"])];
        let native = CoverageMap::decode(&fixture::covmap(&mappings, false), 0, false).unwrap();
        let swapped = CoverageMap::decode(&fixture::covmap(&mappings, true), 0, true).unwrap();
        assert_eq!(native, swapped);

        // Read with the wrong byte order, the sizes run off the section.
        assert!(CoverageMap::decode(&fixture::covmap(&mappings, true), 0, false).is_err());
    }

    #[test]
    fn test_decode_errors() {
        let good = fixture::covmap(&[Mapping::new(1, 1, &["/build/a.c"])], false);
        let err = CoverageMap::decode(&good[..good.len() - 4], 0, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFile);

        // Truncated header
        assert!(CoverageMap::decode(&good[..10], 0, false).is_err());

        // Version 4 stores compressed filenames.
        let v4 = fixture::covmap(&[Mapping::new(3, 0, &["/build/a.c"])], false);
        assert!(matches!(
            CoverageMap::decode(&v4, 0, false).unwrap_err(),
            Error::UnsupportedCovmapVersion(4)
        ));

        // v3 cannot carry inline function records.
        let mut v3 = fixture::covmap(&[Mapping::new(2, 0, &["/build/a.c"])], false);
        v3[..4].copy_from_slice(&1u32.to_ne_bytes());
        assert!(CoverageMap::decode(&v3, 0, false).is_err());

        // Trailing bytes that cannot start another record
        let mut odd = fixture::covmap(&[Mapping::new(1, 0, &["/a"])], false);
        odd.truncate(odd.len() - 1);
        odd.extend_from_slice(&[0; 3]);
        assert!(CoverageMap::decode(&odd, 0, false).is_err());
    }

    #[test]
    fn test_records_align_to_file_offset() {
        // A section starting 4 bytes past an 8-byte boundary
        let base = 0x1004;
        let mappings = [
            Mapping::new(2, 0, &["/build/a.c"]),
            Mapping::new(2, 0, &["/build/b.c"]),
        ];
        let region = fixture::covmap_at(&mappings, base, false);
        let map = CoverageMap::decode(&region, base, false).unwrap();
        assert_eq!(names(&map), [vec!["/build/a.c"], vec!["/build/b.c"]]);

        let second = map.groups[1].offset - 16;
        assert_eq!((base as usize + second) % 8, 0);
        assert_ne!(second % 8, 0);

        // Aligned relative to the region, the second header is misread.
        let misread = CoverageMap::decode(&region, 0, false);
        assert!(misread.map_or(true, |m| names(&m) != [vec!["/build/a.c"], vec!["/build/b.c"]]));
    }

    #[test]
    fn test_empty_region() {
        let map = CoverageMap::decode(&[], 0, false).unwrap();
        assert!(map.is_empty());
        assert!(map.groups.is_empty());
    }

    #[test]
    fn test_padding_plan() {
        assert_eq!(padding_plan(3, 0), Some(vec![]));
        assert_eq!(padding_plan(1, 1), Some(vec![1]));
        assert_eq!(padding_plan(1, 7), Some(vec![7]));
        assert_eq!(padding_plan(1, 128), Some(vec![128]));
        assert_eq!(padding_plan(1, 129), Some(vec![128, 1]));
        assert_eq!(padding_plan(2, 300), Some(vec![128, 128, 44]));

        // 127 + 1 filenames needs a two-byte count.
        assert_eq!(padding_plan(127, 1), None);
        assert_eq!(padding_plan(127, 2), Some(vec![1]));
        assert_eq!(padding_plan(126, 3), Some(vec![3]));
    }

    #[test]
    fn test_encode_group_exact_size() {
        let names = vec![b"/src/a.c".to_vec(), b"/src/b.c".to_vec()];
        let natural = encoded_group_size(&names);
        assert_eq!(natural, 1 + 2 * 9);

        for target in [natural, natural + 1, natural + 200] {
            let bytes = encode_group(&names, target, 0).unwrap();
            assert_eq!(bytes.len(), target);
            assert_eq!(&bytes[1..10], b"\x08/src/a.c");
        }

        let padded = encode_group(&names, natural + 5, 0).unwrap();
        assert_eq!(padded[0], 3);
        assert_eq!(&padded[natural..], &[4, 0, 0, 0, 0]);

        assert!(encode_group(&names, natural - 1, 0).is_err());
    }

    #[test]
    fn test_encode_group_size_sweep() {
        // 126 and 127 names sit at the edge of a one-byte count.
        for count in [1, 2, 126, 127] {
            let names: Vec<Vec<u8>> = (0..count).map(|i| format!("/n/{i}").into_bytes()).collect();
            let natural = encoded_group_size(&names);
            for padding in 0..400 {
                match encode_group(&names, natural + padding, 0) {
                    Ok(bytes) => assert_eq!(bytes.len(), natural + padding),
                    Err(err) => assert!(
                        matches!(err, Error::PaddingDoesNotFit { .. }),
                        "{count} names, {padding} bytes: {err}"
                    ),
                }
            }
        }
    }

    #[test]
    fn test_rewrite_pads_group() {
        let region = fixture::covmap(
            &[
                Mapping::new(1, 2, &["/home/ci/build/a.c", "/usr/include/stdio.h"]),
                Mapping::new(1, 1, &["/opt/other.c"]),
            ],
            false,
        );
        let map = CoverageMap::decode(&region, 0, false).unwrap();

        let mut patched = region.clone();
        let count = map
            .rewrite(&mut patched, &prefixes("/home/ci/build", "/src"))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(patched.len(), region.len());

        let after = CoverageMap::decode(&patched, 0, false).unwrap();
        assert_eq!(after.groups[0].size, map.groups[0].size);
        assert_eq!(after.groups[0].paths[0].bytes, b"/src/a.c");
        assert_eq!(after.groups[0].paths[1].bytes, b"/usr/include/stdio.h");
        // Padding filenames are all NUL.
        assert!(after.groups[0].paths[2..]
            .iter()
            .all(|p| p.bytes.iter().all(|&b| b == 0)));

        // Bytes outside the rewritten group are untouched.
        let group = &map.groups[0];
        assert_eq!(region[..group.offset], patched[..group.offset]);
        assert_eq!(region[group.end()..], patched[group.end()..]);
    }

    #[test]
    fn test_rewrite_unchanged_paths() {
        let region = fixture::covmap(&[Mapping::new(1, 1, &["/build/a.c"])], false);
        let map = CoverageMap::decode(&region, 0, false).unwrap();

        let mut patched = region.clone();
        assert_eq!(map.rewrite(&mut patched, &prefixes("/build", "/build")).unwrap(), 0);
        assert_eq!(map.rewrite(&mut patched, &prefixes("/other", "/x")).unwrap(), 0);
        assert_eq!(patched, region);
    }

    #[test]
    fn test_rewrite_without_room_for_padding() {
        // 127 filenames; shrinking one by a byte would need a 128th filename
        // and a two-byte count.
        let mut paths: Vec<String> = (0..126).map(|i| format!("/x/{i}")).collect();
        paths.push("/build/ab".to_string());
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let region = fixture::covmap(&[Mapping::new(1, 0, &refs)], false);
        let map = CoverageMap::decode(&region, 0, false).unwrap();

        let mut patched = region.clone();
        let err = map
            .rewrite(&mut patched, &prefixes("/build/a", "/build/"))
            .unwrap_err();
        assert!(matches!(err, Error::PaddingDoesNotFit { padding: 1, .. }));
    }
}
