//! Mach-O file format handling.
//!
//! This module provides the on-disk record types, the width descriptors that
//! let one parser serve both 32-bit and 64-bit images, and the container
//! reader that locates sections inside thin and fat files.

mod constants;
mod container;
pub mod describe;
mod structs;
mod width;

pub use constants::*;
pub use container::*;
pub use structs::*;
pub use width::*;
