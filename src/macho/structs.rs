//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files. They are read
//! in host byte order and corrected with [`SwapBytes`] when the container was
//! written in the opposite order.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::*;
use crate::util::display_name;

// =============================================================================
// Byte Swapping
// =============================================================================

/// Reverses the byte order of every integer field of an on-disk record.
///
/// Name fields are byte arrays and are left untouched.
pub trait SwapBytes {
    /// Swaps all integer fields in place.
    fn swap_bytes(&mut self);
}

macro_rules! impl_swap_bytes {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl SwapBytes for $ty {
            #[inline]
            fn swap_bytes(&mut self) {
                $(self.$field = self.$field.swap_bytes();)*
            }
        }
    };
}

// =============================================================================
// Fat Structures
// =============================================================================

/// Fat (universal) binary header. Stored big-endian on disk.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC
    pub magic: u32,
    /// Number of architecture slices that follow
    pub nfat_arch: u32,
}

impl FatHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;
}

impl_swap_bytes!(FatHeader { magic, nfat_arch });

/// Descriptor of one architecture slice inside a fat binary.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u32,
    /// Size of the slice
    pub size: u32,
    /// Alignment (power of 2)
    pub align: u32,
}

impl FatArch {
    /// Size of a descriptor in bytes.
    pub const SIZE: usize = 20;
}

impl_swap_bytes!(FatArch {
    cputype,
    cpusubtype,
    offset,
    size,
    align
});

// =============================================================================
// Header Structures
// =============================================================================

/// 32-bit Mach-O header.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader {
    /// Magic number (MH_MAGIC)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
}

impl MachHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 28;
}

impl_swap_bytes!(MachHeader {
    magic,
    cputype,
    cpusubtype,
    filetype,
    ncmds,
    sizeofcmds,
    flags
});

/// 64-bit Mach-O header.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;
}

impl_swap_bytes!(MachHeader64 {
    magic,
    cputype,
    cpusubtype,
    filetype,
    ncmds,
    sizeofcmds,
    flags,
    reserved
});

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

impl_swap_bytes!(LoadCommand { cmd, cmdsize });

// =============================================================================
// Segment Commands
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand {
    /// LC_SEGMENT
    pub cmd: u32,
    /// Size of this load command, including its sections
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u32,
    /// Virtual memory size
    pub vmsize: u32,
    /// File offset
    pub fileoff: u32,
    /// Amount of file to map
    pub filesize: u32,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 56;
}

impl_swap_bytes!(SegmentCommand {
    cmd,
    cmdsize,
    vmaddr,
    vmsize,
    fileoff,
    filesize,
    maxprot,
    initprot,
    nsects,
    flags
});

/// 64-bit segment command.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: u32,
    /// Size of this load command, including its sections
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file to map
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand64 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 72;
}

impl_swap_bytes!(SegmentCommand64 {
    cmd,
    cmdsize,
    vmaddr,
    vmsize,
    fileoff,
    filesize,
    maxprot,
    initprot,
    nsects,
    flags
});

// =============================================================================
// Sections
// =============================================================================

/// 32-bit section.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u32,
    /// Size in bytes
    pub size: u32,
    /// File offset
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
}

impl Section {
    /// Size of a section entry.
    pub const SIZE: usize = 68;
}

impl_swap_bytes!(Section {
    addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2
});

/// 64-bit section.
#[derive(Debug, Default, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section64 {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
    /// Reserved
    pub reserved3: u32,
}

impl Section64 {
    /// Size of a section entry.
    pub const SIZE: usize = 80;
}

impl_swap_bytes!(Section64 {
    addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2, reserved3
});

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for FatArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FatArch {{ arch: {}, file: {:#x}+{:#x}, align: 2^{} }}",
            cpu_type_name(self.cputype),
            self.offset,
            self.size,
            self.align
        )
    }
}

impl fmt::Display for SegmentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment {{ name: \"{}\", vm: {:#x}+{:#x}, file: {:#x}+{:#x}, prot: {}/{}, sects: {} }}",
            display_name(&self.segname),
            self.vmaddr,
            self.vmsize,
            self.fileoff,
            self.filesize,
            VmProt::from_bits_truncate(self.initprot).rwx(),
            VmProt::from_bits_truncate(self.maxprot).rwx(),
            self.nsects
        )
    }
}

impl fmt::Display for SegmentCommand64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment {{ name: \"{}\", vm: {:#x}+{:#x}, file: {:#x}+{:#x}, prot: {}/{}, sects: {} }}",
            display_name(&self.segname),
            self.vmaddr,
            self.vmsize,
            self.fileoff,
            self.filesize,
            VmProt::from_bits_truncate(self.initprot).rwx(),
            VmProt::from_bits_truncate(self.maxprot).rwx(),
            self.nsects
        )
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Section {{ name: \"{},{}\", addr: {:#x}+{:#x}, offset: {:#x} }}",
            display_name(&self.segname),
            display_name(&self.sectname),
            self.addr,
            self.size,
            self.offset
        )
    }
}

impl fmt::Display for Section64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Section {{ name: \"{},{}\", addr: {:#x}+{:#x}, offset: {:#x} }}",
            display_name(&self.segname),
            display_name(&self.sectname),
            self.addr,
            self.size,
            self.offset
        )
    }
}
