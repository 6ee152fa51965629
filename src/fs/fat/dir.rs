//! Directory entries and directory scanning
//!
//! Entries are copied out of the sector cache as soon as they are decoded, so
//! nothing returned from here borrows the volume.

use alloc::vec::Vec;
use core::fmt;
use core::ops::ControlFlow;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{FatError, FatVolume};
use crate::drivers::block::BlockDevice;
use crate::fs::path_components;

/// Size of one on-disk directory entry
pub const DIR_ENTRY_SIZE: usize = 32;

/// Capacity of a rendered 8.3 name. Bytes outside ASCII render as two UTF-8
/// bytes each.
pub const SHORT_NAME_CAPACITY: usize = 2 * 11 + 1;

/// Capacity of a rendered extension
pub const FILE_TYPE_CAPACITY: usize = 2 * 3;

/// First name byte of the entry that ends a directory
const NAME_END: u8 = 0x00;
/// First name byte of a deleted entry
const NAME_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 character
const NAME_KANJI_E5: u8 = 0x05;

/// Attribute bits
pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// Long-name continuation marker
    pub const LONG_NAME: u8 = READ_ONLY | HIDDEN | SYSTEM | VOLUME_ID;
}

/// FAT directory entry
#[repr(C)]
#[derive(
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
)]
pub struct DirectoryEntry {
    /// Short name, space padded
    name: [u8; 8],
    /// Extension, space padded
    ext: [u8; 3],
    /// Attributes
    attr: u8,
    reserved: [u8; 2],
    /// Creation time
    create_time: [u8; 2],
    /// Creation date
    create_date: [u8; 2],
    reserved2: [u8; 4],
    /// Last modification time
    modified_time: [u8; 2],
    /// Last modification date
    modified_date: [u8; 2],
    /// First cluster of the contents
    start_cluster: [u8; 2],
    /// File size in bytes
    size: [u8; 4],
}

impl DirectoryEntry {
    /// Decode an entry from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let Ok((entry, _)) = Self::read_from_prefix(bytes) else {
            return None;
        };
        Some(entry)
    }

    /// Build an entry from its parts. Times and dates are left zero.
    pub fn new(name: [u8; 8], ext: [u8; 3], attributes: u8, start_cluster: u16, size: u32) -> Self {
        Self {
            name,
            ext,
            attr: attributes,
            start_cluster: start_cluster.to_le_bytes(),
            size: size.to_le_bytes(),
            ..Self::default()
        }
    }

    /// Set the modification stamp from raw FAT date and time words
    pub fn with_modified(mut self, date: u16, time: u16) -> Self {
        self.modified_date = date.to_le_bytes();
        self.modified_time = time.to_le_bytes();
        self
    }

    /// Set the creation stamp from raw FAT date and time words
    pub fn with_created(mut self, date: u16, time: u16) -> Self {
        self.create_date = date.to_le_bytes();
        self.create_time = time.to_le_bytes();
        self
    }

    /// Raw name field
    pub fn name_bytes(&self) -> &[u8; 8] {
        &self.name
    }

    /// Raw extension field
    pub fn ext_bytes(&self) -> &[u8; 3] {
        &self.ext
    }

    pub fn attributes(&self) -> u8 {
        self.attr
    }

    pub fn start_cluster(&self) -> u16 {
        u16::from_le_bytes(self.start_cluster)
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }

    /// Check if this is the end of directory marker
    pub fn is_end(&self) -> bool {
        self.name[0] == NAME_END
    }

    /// Check if this entry was deleted
    pub fn is_deleted(&self) -> bool {
        self.name[0] == NAME_DELETED
    }

    /// Check if this is a long filename entry
    pub fn is_long_name(&self) -> bool {
        self.attr == attr::LONG_NAME
    }

    /// Check if this is a directory
    pub fn is_directory(&self) -> bool {
        (self.attr & attr::DIRECTORY) != 0
    }

    /// Check if this is the volume label
    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && (self.attr & attr::VOLUME_ID) != 0
    }

    /// Check if this is a plain file
    pub fn is_file(&self) -> bool {
        !self.is_directory() && !self.is_volume_label() && !self.is_long_name()
    }

    /// `.` or `..`
    pub fn is_dot(&self) -> bool {
        self.name[0] == b'.'
    }

    /// Get the short name as a string
    pub fn short_name(&self) -> heapless::String<SHORT_NAME_CAPACITY> {
        let mut s = heapless::String::new();

        for (i, &c) in self.name.iter().enumerate() {
            if c == b' ' {
                break;
            }
            let c = if i == 0 && c == NAME_KANJI_E5 { NAME_DELETED } else { c };
            let _ = s.push(c as char);
        }

        if self.ext[0] != b' ' {
            let _ = s.push('.');
            s.push_str(&self.file_type()).ok();
        }

        s
    }

    /// Get the extension as a string
    pub fn file_type(&self) -> heapless::String<FILE_TYPE_CAPACITY> {
        let mut s = heapless::String::new();
        self.ext.iter().take_while(|&&c| c != b' ').for_each(|&c| {
            let _ = s.push(c as char);
        });
        s
    }

    /// Case-insensitive comparison against an 8.3 name
    pub fn matches_name(&self, name: &str) -> bool {
        let entry_name = self.short_name();
        entry_name.len() == name.len()
            && entry_name
                .bytes()
                .zip(name.bytes())
                .all(|(a, b)| a.eq_ignore_ascii_case(&b))
    }

    pub fn created_date(&self) -> FatDate {
        FatDate::from_raw(u16::from_le_bytes(self.create_date))
    }

    pub fn created_time(&self) -> FatTime {
        FatTime::from_raw(u16::from_le_bytes(self.create_time))
    }

    pub fn modified_date(&self) -> FatDate {
        FatDate::from_raw(u16::from_le_bytes(self.modified_date))
    }

    pub fn modified_time(&self) -> FatTime {
        FatTime::from_raw(u16::from_le_bytes(self.modified_time))
    }

    /// Where the contents of this directory live
    pub fn location(&self) -> Result<DirLocation, FatError> {
        if !self.is_directory() {
            return Err(FatError::NotADirectory);
        }
        Ok(DirLocation::from_start_cluster(self.start_cluster()))
    }
}

/// Date stamp: day[4:0], month[8:5], years since 1980[15:9]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatDate {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl FatDate {
    pub fn from_raw(raw: u16) -> Self {
        Self {
            day: (raw & 0x1F) as u8,
            month: ((raw >> 5) & 0x0F) as u8,
            year: 1980 + (raw >> 9),
        }
    }
}

impl fmt::Display for FatDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}/{}", self.day, self.month, self.year)
    }
}

/// Time stamp: seconds/2[4:0], minutes[10:5], hours[15:11]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatTime {
    pub hours: u8,
    pub minutes: u8,
    /// Always even, the field has two-second resolution
    pub seconds: u8,
}

impl FatTime {
    pub fn from_raw(raw: u16) -> Self {
        Self {
            hours: (raw >> 11) as u8,
            minutes: ((raw >> 5) & 0x3F) as u8,
            seconds: ((raw & 0x1F) * 2) as u8,
        }
    }
}

impl fmt::Display for FatTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Which directory to scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirLocation {
    /// The fixed root directory region
    Root,
    /// A sub-directory starting at this cluster
    Cluster(u16),
}

impl DirLocation {
    /// Start cluster 0 (as stored in `..` of a first-level directory) is the root
    pub fn from_start_cluster(cluster: u16) -> Self {
        if cluster == 0 {
            DirLocation::Root
        } else {
            DirLocation::Cluster(cluster)
        }
    }
}

impl<D: BlockDevice> FatVolume<D> {
    /// Get the entry at a 1-based ordinal.
    ///
    /// Long-name entries are not counted. Deleted entries and the terminator
    /// are counted and returned like any other; callers check
    /// [`DirectoryEntry::is_end`] and [`DirectoryEntry::is_deleted`].
    pub fn get_entry(
        &mut self,
        ordinal: u32,
        location: DirLocation,
    ) -> Result<DirectoryEntry, FatError> {
        if ordinal == 0 {
            return Err(FatError::NotFound);
        }

        let mut seen = 0u32;
        let found = self.scan_directory(location, |entry| {
            if entry.is_long_name() {
                return ControlFlow::Continue(());
            }
            seen += 1;
            if seen == ordinal {
                ControlFlow::Break(entry)
            } else {
                ControlFlow::Continue(())
            }
        })?;

        found.ok_or(FatError::NotFound)
    }

    /// List the live entries of a directory.
    ///
    /// Skips long-name and deleted entries and stops at the terminator.
    pub fn list_directory(
        &mut self,
        location: DirLocation,
    ) -> Result<Vec<DirectoryEntry>, FatError> {
        let mut entries = Vec::new();
        self.scan_directory(location, |entry| {
            if entry.is_end() {
                return ControlFlow::Break(());
            }
            if !entry.is_long_name() && !entry.is_deleted() {
                entries.push(entry);
            }
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    /// Find an entry in a directory by its 8.3 name
    pub fn find_entry(
        &mut self,
        location: DirLocation,
        name: &str,
    ) -> Result<DirectoryEntry, FatError> {
        let found = self.scan_directory(location, |entry| {
            if entry.is_end() {
                return ControlFlow::Break(None);
            }
            let live = !entry.is_long_name() && !entry.is_deleted() && !entry.is_volume_label();
            if live && entry.matches_name(name) {
                return ControlFlow::Break(Some(entry));
            }
            ControlFlow::Continue(())
        })?;

        found.flatten().ok_or_else(|| {
            log::debug!("FAT: {} not found in {:?}", name, location);
            FatError::NotFound
        })
    }

    /// Find a file or directory by path
    pub fn lookup(&mut self, path: &str) -> Result<DirectoryEntry, FatError> {
        let mut parts = path_components(path).peekable();
        let mut location = DirLocation::Root;

        while let Some(part) = parts.next() {
            let entry = self.find_entry(location, part)?;
            if parts.peek().is_none() {
                return Ok(entry);
            }
            location = entry.location()?;
        }

        Err(FatError::NotFound)
    }

    /// Resolve a path to a directory. An empty path or `/` is the root.
    pub fn resolve_dir(&mut self, path: &str) -> Result<DirLocation, FatError> {
        if path_components(path).next().is_none() {
            return Ok(DirLocation::Root);
        }
        self.lookup(path)?.location()
    }

    /// Visit every 32-byte record of a directory in on-disk order until
    /// `visit` breaks or the directory runs out.
    fn scan_directory<T, F>(
        &mut self,
        location: DirLocation,
        mut visit: F,
    ) -> Result<Option<T>, FatError>
    where
        F: FnMut(DirectoryEntry) -> ControlFlow<T>,
    {
        match location {
            DirLocation::Root => {
                let start = self.geometry.root_dir_start_sector();
                for lba in start..start + self.geometry.root_dir_sector_count() {
                    if let ControlFlow::Break(t) = self.scan_sector(lba, &mut visit)? {
                        return Ok(Some(t));
                    }
                }
            }
            DirLocation::Cluster(first) => {
                let limit = self.chain_limit();
                let spc = self.geometry.sectors_per_cluster() as u64;
                let mut cluster = first;
                let mut visited = 0usize;

                loop {
                    visited += 1;
                    if visited > limit {
                        return Err(FatError::ChainTooLong);
                    }

                    let base = self.geometry.sector_of_cluster(cluster)?;
                    for lba in base..base + spc {
                        if let ControlFlow::Break(t) = self.scan_sector(lba, &mut visit)? {
                            return Ok(Some(t));
                        }
                    }

                    match self.next_cluster(cluster)? {
                        Some(next) => cluster = next,
                        None => break,
                    }
                }
            }
        }
        Ok(None)
    }

    fn scan_sector<T, F>(&mut self, lba: u64, visit: &mut F) -> Result<ControlFlow<T>, FatError>
    where
        F: FnMut(DirectoryEntry) -> ControlFlow<T>,
    {
        let entries = self.geometry.entries_per_sector();
        let sector = self.cache.get_sector(lba)?;
        for raw in sector.chunks_exact(DIR_ENTRY_SIZE).take(entries) {
            let Some(entry) = DirectoryEntry::from_bytes(raw) else {
                continue;
            };
            if let ControlFlow::Break(t) = visit(entry) {
                return Ok(ControlFlow::Break(t));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}
