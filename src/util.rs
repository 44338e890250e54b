//! Small helpers for binary data processing.
//!
//! This module provides:
//! - Host-order integer reads with optional byte swapping (via byteorder)
//! - ULEB128 encoding and decoding
//! - Alignment arithmetic
//! - Fixed-width, NUL-padded name handling

use byteorder::{ByteOrder, NativeEndian};

// =============================================================================
// Host-Order Reads
// =============================================================================

/// Reads a u32 stored in host order, byte-swapping it when `swap` is set.
///
/// # Panics
///
/// Panics if `data.len() < 4`.
#[inline(always)]
pub fn read_u32(data: &[u8], swap: bool) -> u32 {
    let value = NativeEndian::read_u32(data);
    if swap {
        value.swap_bytes()
    } else {
        value
    }
}

// =============================================================================
// ULEB128
// =============================================================================

/// Reads an unsigned LEB128 value with fast paths for common cases.
///
/// Filename counts and lengths in coverage maps are almost always below 128,
/// so the single-byte path handles nearly every call.
///
/// # Returns
///
/// `(value, bytes_consumed)` or `None` if the encoding is truncated or
/// overflows 64 bits.
#[inline(always)]
pub fn read_uleb128_fast(data: &[u8]) -> Option<(u64, usize)> {
    let &b0 = data.first()?;

    // Fast path: single byte (0-127)
    if b0 < 0x80 {
        return Some((b0 as u64, 1));
    }

    let mut result: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte < 0x80 {
            return Some((result, i + 1));
        }
    }

    None
}

/// Writes an unsigned LEB128 value to a buffer.
pub fn write_uleb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Returns the number of bytes the minimal ULEB128 encoding of `value` takes.
#[inline]
pub const fn uleb128_len(mut value: u64) -> usize {
    let mut len = 1;
    value >>= 7;
    while value != 0 {
        value >>= 7;
        len += 1;
    }
    len
}

// =============================================================================
// Alignment Utilities
// =============================================================================

/// Aligns a value up to the given power-of-two alignment.
///
/// # Panics
///
/// Debug assertion fails if `alignment` is not a power of 2.
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

// =============================================================================
// Fixed-Width Names
// =============================================================================

/// Strips the trailing NUL padding from a fixed-width name field.
///
/// Mach-O segment and section names occupy 16 bytes and are only
/// NUL-terminated when shorter than the field.
#[inline]
pub fn fixed_name(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &field[..end]
}

/// Builds a fixed-width, NUL-padded name field. Longer names are truncated.
pub fn to_fixed_name(name: &str) -> [u8; 16] {
    let mut field = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(16);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Renders a fixed-width name for diagnostics.
pub fn display_name(field: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(fixed_name(field))
}
