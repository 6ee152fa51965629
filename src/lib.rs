//! fatnav - A read-only FAT12/16 image navigator
//!
//! This library mounts FAT12 and FAT16 volumes stored as flat disk images,
//! walks their directories and cluster chains, and reads files through a
//! sequential cursor.
//!
//! ```no_run
//! use fatnav::fs::fat::{DirLocation, FatVolume};
//!
//! let mut vol = FatVolume::open_image("floppy.img")?;
//! for entry in vol.list_directory(DirLocation::Root)? {
//!     println!("{} {}", entry.short_name(), entry.size());
//! }
//! # Ok::<(), fatnav::fs::fat::FatError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod drivers;
pub mod fs;
#[cfg(feature = "std")]
pub mod logger;

pub use drivers::block::{BlockDevice, BlockDeviceInfo, BlockError, MemoryBlockDevice, SectorCache};
#[cfg(feature = "std")]
pub use drivers::image::ImageFile;
pub use fs::fat::{FatError, FatVolume};
