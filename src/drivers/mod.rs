//! Storage backends for fatnav
//!
//! This module contains the block devices a volume can be mounted on.

pub mod block;
#[cfg(feature = "std")]
pub mod image;
