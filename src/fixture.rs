//! Synthetic Mach-O and coverage map images for tests.
//!
//! Builders write integers in host order, or in the opposite order when
//! `swap` is set, so both byte orders are exercised on any host.

use std::io::Write;

use crate::macho::{
    CPU_TYPE_X86, CPU_TYPE_X86_64, FAT_MAGIC, LC_SEGMENT, LC_SEGMENT_64, LC_UUID, MH_MAGIC,
    MH_MAGIC_64, MH_OBJECT,
};
use crate::util::{align_up, to_fixed_name, write_uleb128};

fn push_u32(out: &mut Vec<u8>, value: u32, swap: bool) {
    let value = if swap { value.swap_bytes() } else { value };
    out.extend_from_slice(&value.to_ne_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64, swap: bool) {
    let value = if swap { value.swap_bytes() } else { value };
    out.extend_from_slice(&value.to_ne_bytes());
}

/// Writes `bytes` to a fresh temporary file.
pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

// =============================================================================
// Coverage Maps
// =============================================================================

/// One coverage mapping record.
pub struct Mapping<'a> {
    pub version: u32,
    pub n_records: u32,
    pub filenames: &'a [&'a str],
    pub coverage: Vec<u8>,
}

impl<'a> Mapping<'a> {
    pub fn new(version: u32, n_records: u32, filenames: &'a [&'a str]) -> Self {
        Self {
            version,
            n_records,
            filenames,
            coverage: vec![0x01, 0x02, 0x03],
        }
    }
}

/// Encodes a `__llvm_covmap` section that starts at an 8-byte aligned file
/// offset.
pub fn covmap(mappings: &[Mapping<'_>], swap: bool) -> Vec<u8> {
    covmap_at(mappings, 0, swap)
}

/// Encodes a `__llvm_covmap` section placed at file offset `base`, each
/// record padded to the next 8-byte file offset.
pub fn covmap_at(mappings: &[Mapping<'_>], base: u64, swap: bool) -> Vec<u8> {
    let base = base as usize;
    let mut out = Vec::new();
    for mapping in mappings {
        let record_size = match mapping.version {
            0 => 24,
            1 => 20,
            _ => 0,
        };

        let mut group = Vec::new();
        write_uleb128(mapping.filenames.len() as u64, &mut group);
        for name in mapping.filenames {
            write_uleb128(name.len() as u64, &mut group);
            group.extend_from_slice(name.as_bytes());
        }

        push_u32(&mut out, mapping.n_records, swap);
        push_u32(&mut out, group.len() as u32, swap);
        push_u32(&mut out, mapping.coverage.len() as u32, swap);
        push_u32(&mut out, mapping.version, swap);
        out.extend(std::iter::repeat(0x5A).take(mapping.n_records as usize * record_size));
        out.extend_from_slice(&group);
        out.extend_from_slice(&mapping.coverage);
        out.resize(align_up(base + out.len(), 8) - base, 0);
    }
    out
}

// =============================================================================
// Mach-O Images
// =============================================================================

/// A section and the segment it belongs to.
pub struct SectionSpec {
    pub segment: &'static str,
    pub section: &'static str,
    pub data: Vec<u8>,
}

impl SectionSpec {
    pub fn new(segment: &'static str, section: &'static str, data: Vec<u8>) -> Self {
        Self {
            segment,
            section,
            data,
        }
    }
}

/// Builds a thin object file of the given width.
///
/// The load commands are an `LC_UUID` followed by one segment command per
/// distinct segment name, in first-appearance order. Section data follows
/// the load commands.
pub fn macho(bits: u32, swap: bool, sections: &[SectionSpec]) -> Vec<u8> {
    let wide = bits == 64;
    let (header_size, segment_size, section_size) = if wide { (32, 72, 80) } else { (28, 56, 68) };

    let mut segments: Vec<(&str, Vec<usize>)> = Vec::new();
    for (index, spec) in sections.iter().enumerate() {
        match segments.iter_mut().find(|(name, _)| *name == spec.segment) {
            Some((_, members)) => members.push(index),
            None => segments.push((spec.segment, vec![index])),
        }
    }

    let uuid_size = 24;
    let sizeofcmds: usize = uuid_size
        + segments
            .iter()
            .map(|(_, members)| segment_size + members.len() * section_size)
            .sum::<usize>();

    // Section data offsets, relative to the start of the image
    let mut offsets = Vec::with_capacity(sections.len());
    let mut cursor = align_up(header_size + sizeofcmds, 16);
    for spec in sections {
        offsets.push(cursor);
        cursor = align_up(cursor + spec.data.len(), 8);
    }
    let total = cursor;

    let mut out = Vec::with_capacity(total);
    push_u32(&mut out, if wide { MH_MAGIC_64 } else { MH_MAGIC }, swap);
    push_u32(&mut out, if wide { CPU_TYPE_X86_64 } else { CPU_TYPE_X86 }, swap);
    push_u32(&mut out, 3, swap);
    push_u32(&mut out, MH_OBJECT, swap);
    push_u32(&mut out, 1 + segments.len() as u32, swap);
    push_u32(&mut out, sizeofcmds as u32, swap);
    push_u32(&mut out, 0, swap);
    if wide {
        push_u32(&mut out, 0, swap);
    }

    push_u32(&mut out, LC_UUID, swap);
    push_u32(&mut out, uuid_size as u32, swap);
    out.extend_from_slice(&[0x11; 16]);

    let mut vmaddr = 0u64;
    for (name, members) in &segments {
        let cmdsize = segment_size + members.len() * section_size;
        let fileoff = offsets[members[0]] as u64;
        let last = members[members.len() - 1];
        let filesize = (offsets[last] + sections[last].data.len()) as u64 - fileoff;

        if wide {
            push_u32(&mut out, LC_SEGMENT_64, swap);
            push_u32(&mut out, cmdsize as u32, swap);
            out.extend_from_slice(&to_fixed_name(name));
            push_u64(&mut out, vmaddr, swap);
            push_u64(&mut out, filesize, swap);
            push_u64(&mut out, fileoff, swap);
            push_u64(&mut out, filesize, swap);
        } else {
            push_u32(&mut out, LC_SEGMENT, swap);
            push_u32(&mut out, cmdsize as u32, swap);
            out.extend_from_slice(&to_fixed_name(name));
            push_u32(&mut out, vmaddr as u32, swap);
            push_u32(&mut out, filesize as u32, swap);
            push_u32(&mut out, fileoff as u32, swap);
            push_u32(&mut out, filesize as u32, swap);
        }
        push_u32(&mut out, 7, swap);
        push_u32(&mut out, 3, swap);
        push_u32(&mut out, members.len() as u32, swap);
        push_u32(&mut out, 0, swap);

        for &index in members {
            let spec = &sections[index];
            let addr = vmaddr + (offsets[index] as u64 - fileoff);
            out.extend_from_slice(&to_fixed_name(spec.section));
            out.extend_from_slice(&to_fixed_name(spec.segment));
            if wide {
                push_u64(&mut out, addr, swap);
                push_u64(&mut out, spec.data.len() as u64, swap);
            } else {
                push_u32(&mut out, addr as u32, swap);
                push_u32(&mut out, spec.data.len() as u32, swap);
            }
            push_u32(&mut out, offsets[index] as u32, swap);
            // align, reloff, nreloc, flags, reserved1, reserved2
            for _ in 0..6 {
                push_u32(&mut out, 0, swap);
            }
            if wide {
                push_u32(&mut out, 0, swap);
            }
        }
        vmaddr += align_up(filesize as usize, 0x1000) as u64;
    }

    debug_assert_eq!(out.len(), header_size + sizeofcmds);
    for (spec, &offset) in sections.iter().zip(&offsets) {
        out.resize(offset, 0);
        out.extend_from_slice(&spec.data);
    }
    out.resize(total, 0);
    out
}

/// Wraps images in a fat container, each slice aligned to 256 bytes.
pub fn fat(slices: &[(u32, Vec<u8>)], swap: bool) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, FAT_MAGIC, swap);
    push_u32(&mut out, slices.len() as u32, swap);

    let mut offset = align_up(8 + 20 * slices.len(), 256);
    let mut placed = Vec::with_capacity(slices.len());
    for (cputype, image) in slices {
        push_u32(&mut out, *cputype, swap);
        push_u32(&mut out, 3, swap);
        push_u32(&mut out, offset as u32, swap);
        push_u32(&mut out, image.len() as u32, swap);
        push_u32(&mut out, 8, swap);
        placed.push(offset);
        offset = align_up(offset + image.len(), 256);
    }

    for ((_, image), &at) in slices.iter().zip(&placed) {
        out.resize(at, 0);
        out.extend_from_slice(image);
    }
    out
}
