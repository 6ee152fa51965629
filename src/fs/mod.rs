//! Filesystem support
//!
//! This module provides read-only FAT12/16 support for disk images.

pub mod fat;

/// Split a path into its components
///
/// - Accepts forward slashes and backslashes as separators
/// - Drops empty components, so leading, trailing and doubled separators
///   are ignored
///
/// # Arguments
///
/// * `path` - Path relative to the root (e.g., "/boot/kernel.sys" or "BOOT\\KERNEL.SYS")
pub fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty())
}
