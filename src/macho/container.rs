//! Mach-O container reader and section locator.
//!
//! A container is either a thin Mach-O file (one 32-bit or 64-bit image) or
//! a fat file holding several slices. Reading walks the header and load
//! commands of each image and keeps the segment and section tables, which is
//! all the locator needs to find a named section's bytes in the file.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::constants::*;
use super::describe::load_command_info;
use super::structs::{FatArch, FatHeader, LoadCommand};
use super::width::{
    HeaderRecord, MachWidth, Record, SectionRecord, SegmentRecord, Width32, Width64,
};
use crate::error::{Error, Result};
use crate::stream::{peek_magic, peek_record, position, read_bytes_at, read_record, seek_to};
use crate::util::fixed_name;

// =============================================================================
// File Format
// =============================================================================

/// Outer format of a container, as identified by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Thin 32-bit image
    Mach32,
    /// Thin 64-bit image
    Mach64,
    /// Fat (universal) container
    Fat,
}

/// Classifies a magic value read in host order.
///
/// Returns the format and whether the structure was written in the opposite
/// byte order.
pub fn classify_magic(magic: u32) -> Option<(FileFormat, bool)> {
    match magic {
        MH_MAGIC => Some((FileFormat::Mach32, false)),
        MH_CIGAM => Some((FileFormat::Mach32, true)),
        MH_MAGIC_64 => Some((FileFormat::Mach64, false)),
        MH_CIGAM_64 => Some((FileFormat::Mach64, true)),
        FAT_MAGIC => Some((FileFormat::Fat, false)),
        FAT_CIGAM => Some((FileFormat::Fat, true)),
        _ => None,
    }
}

fn read_format<S: Read + Seek>(stream: &mut S) -> Result<(FileFormat, bool)> {
    let (magic, offset) = peek_magic(stream)?;
    classify_magic(magic).ok_or(Error::InvalidMagic { magic, offset })
}

// =============================================================================
// Section Info
// =============================================================================

/// Location of a section's bytes within the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    /// Absolute file offset of the first byte
    pub file_offset: u64,
    /// Size in bytes
    pub size: u64,
    /// Whether multi-byte values in the owning slice are byte-swapped
    pub swap_byte_ordering: bool,
}

// =============================================================================
// Segments
// =============================================================================

/// A segment command together with its section headers.
#[derive(Debug, Clone)]
pub struct MachSegment<W: MachWidth> {
    /// The segment command
    pub command: W::SegmentCommand,
    /// Section headers, in file order
    pub sections: Vec<W::Section>,
}

impl<W: MachWidth> MachSegment<W> {
    fn read<S: Read + Seek>(stream: &mut S, swap: bool, offset: u64) -> Result<Self> {
        let command: W::SegmentCommand = read_record(stream, swap, "segment command")?;
        let nsects = command.nsects();

        let needed = (nsects as u64) * (<W::Section as Record>::SIZE as u64)
            + <W::SegmentCommand as Record>::SIZE as u64;
        if needed > command.cmdsize() as u64 {
            return Err(Error::MalformedLoadCommand {
                offset,
                cmdsize: command.cmdsize(),
            });
        }

        let mut sections = Vec::new();
        sections
            .try_reserve_exact(nsects as usize)
            .map_err(|_| Error::OutOfMemory {
                what: "section",
                count: nsects as u64,
            })?;
        for _ in 0..nsects {
            sections.push(read_record::<W::Section, _>(stream, swap, "section")?);
        }

        debug!("  {}", command);
        for section in &sections {
            trace!("    {}", section);
        }

        Ok(Self { command, sections })
    }

    /// Segment name without padding.
    pub fn name(&self) -> &[u8] {
        fixed_name(self.command.segname())
    }

    /// Finds a section of this segment by name.
    pub fn section(&self, name: &str) -> Option<&W::Section> {
        self.sections
            .iter()
            .find(|s| fixed_name(s.sectname()) == name.as_bytes())
    }
}

// =============================================================================
// Mach Content
// =============================================================================

/// The parsed header and segment table of one image.
#[derive(Debug, Clone)]
pub struct MachContent<W: MachWidth> {
    /// Absolute offset of the image header in the file (0 for thin files)
    pub file_offset: u64,
    /// Whether the image was written in the opposite byte order
    pub swap_byte_ordering: bool,
    /// The Mach header
    pub header: W::Header,
    /// Segments, in load command order
    pub segments: Vec<MachSegment<W>>,
}

impl<W: MachWidth> MachContent<W> {
    /// Reads an image whose header starts at `file_offset`.
    ///
    /// Every load command is stepped over by its declared size; only segment
    /// commands of this width are decoded.
    pub fn read<S: Read + Seek>(stream: &mut S, file_offset: u64, swap: bool) -> Result<Self> {
        seek_to(stream, file_offset, "mach header")?;
        let header: W::Header = read_record(stream, swap, "mach header")?;

        debug!(
            "{} {} image at {:#x}: arch {}, {} load commands{}",
            W::NAME,
            file_type_name(header.filetype()),
            file_offset,
            cpu_type_name(header.cputype()),
            header.ncmds(),
            if swap { ", byte-swapped" } else { "" }
        );

        let mut segments = Vec::new();
        for _ in 0..header.ncmds() {
            let start = position(stream, "load command")?;
            let lc: LoadCommand = peek_record(stream, swap, "load command")?;
            trace!("{:#x}: {}", start, load_command_info(lc.cmd));

            if (lc.cmdsize as usize) < LoadCommand::SIZE {
                return Err(Error::MalformedLoadCommand {
                    offset: start,
                    cmdsize: lc.cmdsize,
                });
            }

            if lc.cmd == W::SEGMENT_COMMAND {
                segments.push(MachSegment::read(stream, swap, start)?);
            }

            seek_to(stream, start + lc.cmdsize as u64, "load command")?;
        }

        Ok(Self {
            file_offset,
            swap_byte_ordering: swap,
            header,
            segments,
        })
    }

    /// Architecture name of the image.
    pub fn arch_name(&self) -> &'static str {
        cpu_type_name(self.header.cputype())
    }

    /// File type name of the image.
    pub fn file_type(&self) -> &'static str {
        file_type_name(self.header.filetype())
    }

    /// Finds a section by segment and section name.
    ///
    /// Segments sharing a name are searched in order; the first match wins.
    pub fn section_info(&self, segment_name: &str, section_name: &str) -> Option<SectionInfo> {
        self.segments
            .iter()
            .filter(|seg| seg.name() == segment_name.as_bytes())
            .find_map(|seg| seg.section(section_name))
            .map(|sect| SectionInfo {
                file_offset: self.file_offset + sect.offset() as u64,
                size: sect.size(),
                swap_byte_ordering: self.swap_byte_ordering,
            })
    }
}

// =============================================================================
// Container
// =============================================================================

/// A Mach-O file holding at most one 32-bit and one 64-bit image.
#[derive(Debug)]
pub struct MachOContainer {
    path: PathBuf,
    file: Option<BufReader<File>>,
    format: Option<FileFormat>,
    content_32: Option<MachContent<Width32>>,
    content_64: Option<MachContent<Width64>>,
}

impl MachOContainer {
    /// Creates an unread container for `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            format: None,
            content_32: None,
            content_64: None,
        }
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens and parses the file, replacing anything read before.
    pub fn read(&mut self) -> Result<()> {
        self.file = None;
        self.format = None;
        self.content_32 = None;
        self.content_64 = None;

        let mut reader = BufReader::new(self.open()?);
        let (format, swap) = read_format(&mut reader)?;
        debug!("{}: {:?} container", self.path.display(), format);

        let (content_32, content_64) = match format {
            FileFormat::Mach32 => (Some(MachContent::read(&mut reader, 0, swap)?), None),
            FileFormat::Mach64 => (None, Some(MachContent::read(&mut reader, 0, swap)?)),
            FileFormat::Fat => read_fat(&mut reader, swap)?,
        };

        self.file = Some(reader);
        self.format = Some(format);
        self.content_32 = content_32;
        self.content_64 = content_64;
        Ok(())
    }

    /// Outer format, once read.
    pub fn format(&self) -> Option<FileFormat> {
        self.format
    }

    /// Whether a 32-bit image was found.
    pub fn has_32_bit(&self) -> bool {
        self.content_32.is_some()
    }

    /// Whether a 64-bit image was found.
    pub fn has_64_bit(&self) -> bool {
        self.content_64.is_some()
    }

    /// The 32-bit image, if any.
    pub fn content_32(&self) -> Option<&MachContent<Width32>> {
        self.content_32.as_ref()
    }

    /// The 64-bit image, if any.
    pub fn content_64(&self) -> Option<&MachContent<Width64>> {
        self.content_64.as_ref()
    }

    /// Locates a section in the 32-bit image.
    pub fn section_info_32(&self, segment_name: &str, section_name: &str) -> Option<SectionInfo> {
        self.content_32
            .as_ref()
            .and_then(|c| c.section_info(segment_name, section_name))
    }

    /// Locates a section in the 64-bit image.
    pub fn section_info_64(&self, segment_name: &str, section_name: &str) -> Option<SectionInfo> {
        self.content_64
            .as_ref()
            .and_then(|c| c.section_info(segment_name, section_name))
    }

    /// Reads the bytes of a located section through the container's handle.
    pub fn read_section(&mut self, info: &SectionInfo) -> Result<Vec<u8>> {
        let mut reader = match self.file.take() {
            Some(reader) => reader,
            None => BufReader::new(self.open()?),
        };
        let data = read_bytes_at(&mut reader, info.file_offset, info.size, "section data");
        self.file = Some(reader);
        data
    }

    fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|source| Error::OpenFailed {
            path: self.path.clone(),
            source,
        })
    }
}

type FatContents = (Option<MachContent<Width32>>, Option<MachContent<Width64>>);

fn read_fat<S: Read + Seek>(stream: &mut S, swap: bool) -> Result<FatContents> {
    let header: FatHeader = read_record(stream, swap, "fat header")?;
    let count = header.nfat_arch;

    let mut archs: Vec<FatArch> = Vec::new();
    archs
        .try_reserve_exact(count as usize)
        .map_err(|_| Error::OutOfMemory {
            what: "fat_arch",
            count: count as u64,
        })?;
    for _ in 0..count {
        archs.push(read_record(stream, swap, "fat arch")?);
    }

    let mut content_32: Option<MachContent<Width32>> = None;
    let mut content_64: Option<MachContent<Width64>> = None;

    for (index, arch) in (0u32..).zip(&archs) {
        debug!("slice {}: {}", index, arch);
        let offset = arch.offset as u64;
        seek_to(stream, offset, "fat slice")?;

        let (format, slice_swap) = read_format(stream)?;
        let superseded = match format {
            FileFormat::Mach32 => content_32
                .replace(MachContent::read(stream, offset, slice_swap)?)
                .map(|prev| (Width32::NAME, prev.file_offset)),
            FileFormat::Mach64 => content_64
                .replace(MachContent::read(stream, offset, slice_swap)?)
                .map(|prev| (Width64::NAME, prev.file_offset)),
            FileFormat::Fat => return Err(Error::NestedFat { index, offset }),
        };

        if let Some((width, prev_offset)) = superseded {
            warn!(
                "fat slice {} replaces the {} slice at {:#x}; only one slice per width is patched",
                index, width, prev_offset
            );
        }
    }

    Ok((content_32, content_64))
}
