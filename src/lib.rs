//! covmap-patcher - Rewrites source paths in Mach-O LLVM coverage maps.
//!
//! Coverage data produced by a build in one directory (a sandbox, a CI
//! worker) records absolute source paths under that directory. This library
//! rewrites those path prefixes in the `__llvm_covmap` section of Mach-O
//! object files so reports resolve against a local checkout. Patching is done
//! in place and never changes the size of the file.
//!
//! # Features
//!
//! - Thin 32-bit and 64-bit images and fat (universal) containers
//! - Either byte order
//! - Coverage mapping versions 1 to 3
//! - Several prefix rules at once, longest match first
//!
//! # Example
//!
//! ```no_run
//! use covmap_patcher::{patch_file, PatchOptions, PrefixMap};
//!
//! fn main() -> covmap_patcher::Result<()> {
//!     let prefixes = PrefixMap::single("/private/var/build/src", "/Users/me/src")?;
//!     let report = patch_file("out/foo.o", &PatchOptions::new(prefixes))?;
//!     println!("patched {} paths", report.total_patched());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod covmap;
pub mod error;
pub mod macho;
pub mod stream;
pub mod util;

#[cfg(test)]
mod fixture;

// Re-export main types
pub use covmap::{CoverageMap, CovmapPatcher, PathRegion, PrefixMap};
pub use error::{Error, ErrorKind, Result};
pub use macho::{MachOContainer, SectionInfo};

use std::path::Path;

use tracing::{info, warn};

use macho::{MachWidth, Width32, Width64, SECT_LLVM_COVMAP, SEG_DATA};

/// Options for patching a file.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Prefix rules to apply
    pub prefixes: PrefixMap,
    /// Segment holding the coverage map
    pub segment: String,
    /// Coverage map section name
    pub section: String,
    /// Count what would change without writing
    pub dry_run: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            prefixes: PrefixMap::new(),
            segment: SEG_DATA.to_string(),
            section: SECT_LLVM_COVMAP.to_string(),
            dry_run: false,
        }
    }
}

impl PatchOptions {
    /// Options applying `prefixes` to the default section.
    pub fn new(prefixes: PrefixMap) -> Self {
        Self {
            prefixes,
            ..Default::default()
        }
    }

    /// Targets a different segment and section.
    pub fn with_section(mut self, segment: impl Into<String>, section: impl Into<String>) -> Self {
        self.segment = segment.into();
        self.section = section.into();
        self
    }

    /// Sets dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What happened to one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchOutcome {
    /// The image has no coverage map section
    SectionMissing,
    /// The section was processed; the number of paths that changed
    Patched(usize),
}

/// Result for one architecture image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchReport {
    /// `"32-bit"` or `"64-bit"`
    pub width: &'static str,
    /// CPU architecture name
    pub arch: &'static str,
    /// Outcome
    pub outcome: ArchOutcome,
}

/// Result of [`patch_file`], one entry per architecture present, 32-bit first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Per-architecture results
    pub architectures: Vec<ArchReport>,
}

impl PatchReport {
    /// Total number of paths changed across architectures.
    pub fn total_patched(&self) -> usize {
        self.architectures
            .iter()
            .map(|a| match a.outcome {
                ArchOutcome::Patched(n) => n,
                ArchOutcome::SectionMissing => 0,
            })
            .sum()
    }

    /// Outcome for a word width, if that width was present.
    pub fn outcome(&self, width: &str) -> Option<ArchOutcome> {
        self.architectures
            .iter()
            .find(|a| a.width == width)
            .map(|a| a.outcome)
    }
}

/// Embedded paths of one architecture's coverage map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchPaths {
    /// `"32-bit"` or `"64-bit"`
    pub width: &'static str,
    /// CPU architecture name
    pub arch: &'static str,
    /// Paths in section order, or `None` when the section is missing
    pub paths: Option<Vec<Vec<u8>>>,
}

struct Target {
    width: &'static str,
    arch: &'static str,
    section: Option<SectionInfo>,
}

fn targets(container: &MachOContainer, options: &PatchOptions) -> Vec<Target> {
    let (segment, section) = (options.segment.as_str(), options.section.as_str());
    let mut targets = Vec::with_capacity(2);
    if let Some(content) = container.content_32() {
        targets.push(Target {
            width: Width32::NAME,
            arch: content.arch_name(),
            section: content.section_info(segment, section),
        });
    }
    if let Some(content) = container.content_64() {
        targets.push(Target {
            width: Width64::NAME,
            arch: content.arch_name(),
            section: content.section_info(segment, section),
        });
    }
    targets
}

/// Rewrites the coverage map paths of every architecture in a file.
///
/// Architectures are processed 32-bit first. A missing section is reported
/// and skipped; any other failure stops the run, leaving architectures
/// already patched as they are.
pub fn patch_file<P: AsRef<Path>>(path: P, options: &PatchOptions) -> Result<PatchReport> {
    let path = path.as_ref();
    if options.prefixes.is_empty() {
        return Err(Error::NoPrefixes);
    }

    let mut container = MachOContainer::new(path);
    container.read()?;

    let patcher = CovmapPatcher::new(&options.prefixes);
    let mut report = PatchReport::default();

    for target in targets(&container, options) {
        let outcome = match target.section {
            None => {
                warn!(
                    "{}: no {},{} section in {} ({}) image",
                    path.display(),
                    options.segment,
                    options.section,
                    target.width,
                    target.arch
                );
                ArchOutcome::SectionMissing
            }
            Some(section) if options.dry_run => {
                let region = container.read_section(&section)?;
                let count =
                    patcher.preview(&region, section.file_offset, section.swap_byte_ordering)?;
                info!(
                    "{} ({}): would patch {} paths",
                    target.width, target.arch, count
                );
                ArchOutcome::Patched(count)
            }
            Some(section) => {
                let count = patcher.patch(path, &section)?;
                info!("{} ({}): patched {} paths", target.width, target.arch, count);
                ArchOutcome::Patched(count)
            }
        };

        report.architectures.push(ArchReport {
            width: target.width,
            arch: target.arch,
            outcome,
        });
    }

    Ok(report)
}

/// Lists the coverage map paths of every architecture in a file.
pub fn list_paths<P: AsRef<Path>>(path: P, options: &PatchOptions) -> Result<Vec<ArchPaths>> {
    let mut container = MachOContainer::new(path.as_ref());
    container.read()?;

    let mut listing = Vec::new();
    for target in targets(&container, options) {
        let paths = match target.section {
            Some(section) => {
                let region = container.read_section(&section)?;
                let map =
                    CoverageMap::decode(&region, section.file_offset, section.swap_byte_ordering)?;
                Some(
                    map.groups
                        .into_iter()
                        .flat_map(|g| g.paths.into_iter().map(|p| p.bytes))
                        .collect(),
                )
            }
            None => None,
        };
        listing.push(ArchPaths {
            width: target.width,
            arch: target.arch,
            paths,
        });
    }
    Ok(listing)
}
