//! Word-width descriptors for 32-bit and 64-bit Mach-O layouts.
//!
//! The two layouts differ only in record shapes and in the identifier of the
//! segment load command, so parsing code is written once against
//! [`MachWidth`] and instantiated for [`Width32`] and [`Width64`].

use std::fmt::{Debug, Display};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::{LC_SEGMENT, LC_SEGMENT_64};
use super::structs::*;

/// A fixed-size on-disk record that can be read in place and byte-swapped.
pub trait Record:
    FromBytes + IntoBytes + KnownLayout + Immutable + SwapBytes + Copy + Debug
{
    /// Size of the record in bytes.
    const SIZE: usize;
}

/// Fields of a Mach-O header the parser needs.
pub trait HeaderRecord: Record {
    /// CPU type
    fn cputype(&self) -> u32;
    /// File type (`MH_OBJECT`, `MH_EXECUTE`, ...)
    fn filetype(&self) -> u32;
    /// Number of load commands
    fn ncmds(&self) -> u32;
}

/// Fields of a segment command the parser needs.
pub trait SegmentRecord: Record + Display {
    /// Segment name field
    fn segname(&self) -> &[u8; 16];
    /// Size of the command, including its sections
    fn cmdsize(&self) -> u32;
    /// Number of sections
    fn nsects(&self) -> u32;
}

/// Fields of a section the locator needs.
pub trait SectionRecord: Record + Display {
    /// Section name field
    fn sectname(&self) -> &[u8; 16];
    /// File offset, relative to the start of the containing slice
    fn offset(&self) -> u32;
    /// Size in bytes
    fn size(&self) -> u64;
}

/// Compile-time description of one Mach-O word width.
pub trait MachWidth: 'static {
    /// Human-readable width, e.g. `"64-bit"`.
    const NAME: &'static str;
    /// Identifier of the segment load command for this width.
    const SEGMENT_COMMAND: u32;

    /// Mach header record
    type Header: HeaderRecord;
    /// Segment command record
    type SegmentCommand: SegmentRecord;
    /// Section record
    type Section: SectionRecord;
}

/// 32-bit layout (`mach_header`, `segment_command`, `section`).
#[derive(Debug, Clone, Copy)]
pub struct Width32;

/// 64-bit layout (`mach_header_64`, `segment_command_64`, `section_64`).
#[derive(Debug, Clone, Copy)]
pub struct Width64;

impl MachWidth for Width32 {
    const NAME: &'static str = "32-bit";
    const SEGMENT_COMMAND: u32 = LC_SEGMENT;

    type Header = MachHeader;
    type SegmentCommand = SegmentCommand;
    type Section = Section;
}

impl MachWidth for Width64 {
    const NAME: &'static str = "64-bit";
    const SEGMENT_COMMAND: u32 = LC_SEGMENT_64;

    type Header = MachHeader64;
    type SegmentCommand = SegmentCommand64;
    type Section = Section64;
}

// =============================================================================
// Record Implementations
// =============================================================================

macro_rules! impl_record {
    ($($ty:ty),* $(,)?) => {
        $(impl Record for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
        })*
    };
}

impl_record!(
    FatHeader,
    FatArch,
    LoadCommand,
    MachHeader,
    MachHeader64,
    SegmentCommand,
    SegmentCommand64,
    Section,
    Section64,
);

impl HeaderRecord for MachHeader {
    fn cputype(&self) -> u32 {
        self.cputype
    }

    fn filetype(&self) -> u32 {
        self.filetype
    }

    fn ncmds(&self) -> u32 {
        self.ncmds
    }
}

impl HeaderRecord for MachHeader64 {
    fn cputype(&self) -> u32 {
        self.cputype
    }

    fn filetype(&self) -> u32 {
        self.filetype
    }

    fn ncmds(&self) -> u32 {
        self.ncmds
    }
}

impl SegmentRecord for SegmentCommand {
    fn segname(&self) -> &[u8; 16] {
        &self.segname
    }

    fn cmdsize(&self) -> u32 {
        self.cmdsize
    }

    fn nsects(&self) -> u32 {
        self.nsects
    }
}

impl SegmentRecord for SegmentCommand64 {
    fn segname(&self) -> &[u8; 16] {
        &self.segname
    }

    fn cmdsize(&self) -> u32 {
        self.cmdsize
    }

    fn nsects(&self) -> u32 {
        self.nsects
    }
}

impl SectionRecord for Section {
    fn sectname(&self) -> &[u8; 16] {
        &self.sectname
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size as u64
    }
}

impl SectionRecord for Section64 {
    fn sectname(&self) -> &[u8; 16] {
        &self.sectname
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u64 {
        self.size
    }
}
