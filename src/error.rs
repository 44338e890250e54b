//! Error types for the coverage map patcher.
//!
//! Every failure the library can report is a variant of [`Error`]. Variants
//! carry enough context (paths, offsets, the underlying I/O error) to produce
//! a useful diagnostic, and each one maps onto a coarse [`ErrorKind`] that
//! determines the process exit status.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for parsing and patching operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("failed to open file '{path}': {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {what} at offset {offset:#x}: {source}")]
    ReadFailed {
        what: &'static str,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {len} bytes at offset {offset:#x}: {source}")]
    WriteFailed {
        offset: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to allocate {count} entries for the {what} table")]
    OutOfMemory { what: &'static str, count: u64 },

    // ==================== Mach-O Errors ====================
    #[error("invalid magic value {magic:#010x} at offset {offset:#x}")]
    InvalidMagic { magic: u32, offset: u64 },

    #[error("fat slice {index} at offset {offset:#x} is itself a fat container")]
    NestedFat { index: u32, offset: u64 },

    #[error("load command at offset {offset:#x} has invalid size {cmdsize}")]
    MalformedLoadCommand { offset: u64, cmdsize: u32 },

    // ==================== Coverage Map Errors ====================
    #[error("invalid coverage map at section offset {offset:#x}: {reason}")]
    InvalidCoverageMap { offset: usize, reason: String },

    #[error("coverage mapping version {0} is not supported")]
    UnsupportedCovmapVersion(u32),

    #[error("cannot pad filename group at section offset {offset:#x}: {padding} bytes to fill")]
    PaddingDoesNotFit { offset: usize, padding: usize },

    // ==================== Usage Errors ====================
    #[error("replacement prefix '{new}' is longer than '{old}'; sections cannot grow")]
    PrefixGrows { old: String, new: String },

    #[error("invalid prefix map line {line} in '{path}': {reason}")]
    InvalidPrefixMap {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("no path prefixes to rewrite")]
    NoPrefixes,
}

/// A specialized Result type for patcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input file could not be opened.
    OpenFailed,
    /// A read came up short or failed.
    ReadFailed,
    /// A write came up short or failed.
    WriteFailed,
    /// The file is not a structurally valid Mach-O or coverage map.
    InvalidFile,
    /// A table sized by file contents could not be allocated.
    OutOfMemory,
    /// The invocation itself is invalid.
    Usage,
}

impl ErrorKind {
    /// Process exit status for this kind of failure.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Usage => 1,
            ErrorKind::OpenFailed => 10,
            ErrorKind::ReadFailed => 11,
            ErrorKind::InvalidFile => 12,
            ErrorKind::OutOfMemory => 13,
            ErrorKind::WriteFailed => 20,
        }
    }
}

impl Error {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OpenFailed { .. } => ErrorKind::OpenFailed,
            Error::ReadFailed { .. } => ErrorKind::ReadFailed,
            Error::WriteFailed { .. } => ErrorKind::WriteFailed,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Error::InvalidMagic { .. }
            | Error::NestedFat { .. }
            | Error::MalformedLoadCommand { .. }
            | Error::InvalidCoverageMap { .. }
            | Error::UnsupportedCovmapVersion(_)
            | Error::PaddingDoesNotFit { .. } => ErrorKind::InvalidFile,
            Error::PrefixGrows { .. } | Error::InvalidPrefixMap { .. } | Error::NoPrefixes => {
                ErrorKind::Usage
            }
        }
    }

    /// Shorthand for `self.kind().exit_code()`.
    #[inline]
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Creates a read error.
    #[inline]
    pub fn read(what: &'static str, offset: u64, source: std::io::Error) -> Self {
        Error::ReadFailed {
            what,
            offset,
            source,
        }
    }

    /// Creates a coverage map decoding error with a formatted message.
    #[inline]
    pub fn covmap(offset: usize, reason: impl Into<String>) -> Self {
        Error::InvalidCoverageMap {
            offset,
            reason: reason.into(),
        }
    }
}
