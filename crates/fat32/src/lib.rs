//! Pure code for driving a FAT32 volume that is already mapped into memory.
//! Used in our kernel, where the boot loader hands over the disk image as a
//! plain byte region.
//!
//! There is no block device layer and no cache: every operation reads and
//! writes the image directly, so a mutation is visible to every other holder
//! of the image as soon as the call returns.
//!
//! # Resources
//!
//! - <https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system>
//! - <https://academy.cba.mit.edu/classes/networking_communications/SD/FAT.pdf>
//! - <https://wiki.osdev.org/FAT>

#![cfg_attr(not(test), no_std)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cargo_common_metadata,
    clippy::doc_markdown,
    clippy::implicit_hasher,
    clippy::implicit_return,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::redundant_pub_crate,
    clippy::suboptimal_flops,
    clippy::upper_case_acronyms,
    clippy::wildcard_imports
)]

mod allocator;
mod boot;
mod directory;
mod error;
pub mod fd;
mod file;
mod name;
mod path;
mod table;
mod transmute;
mod volume;

#[cfg(test)]
mod testing;

pub use boot::*;
pub use directory::*;
pub use error::*;
pub use file::*;
pub use name::*;
pub use path::*;
pub use table::*;
pub use volume::*;
