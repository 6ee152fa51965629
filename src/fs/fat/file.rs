//! Sequential file access over a cluster chain

use alloc::vec;
use alloc::vec::Vec;

use super::dir::DirectoryEntry;
use super::table::is_end_of_chain;
use super::{FatError, FatVolume};
use crate::drivers::block::BlockDevice;

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Offset from the start of the file
    Start(u32),
    /// Forward offset from the current position
    Current(u32),
}

/// Outcome of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The whole buffer was filled from the file
    Complete,
    /// The chain ended after `filled` bytes; the rest of the buffer is zeroed
    EndOfChain { filled: usize },
}

/// Read position within a file's cluster chain.
///
/// A plain value: it holds no borrow of the volume and does no I/O until it
/// is passed to [`FatVolume::read`] or [`FatVolume::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCursor {
    start_cluster: u16,
    /// `None` once the chain is exhausted
    cluster: Option<u16>,
    /// Sector index within the cluster
    sector: u32,
    /// Byte index within the sector
    byte: usize,
    /// Bytes advanced since the start of the file
    position: u64,
}

impl FileCursor {
    /// Open a cursor at the first byte of `entry`
    pub fn open(entry: &DirectoryEntry) -> Self {
        Self::at_cluster(entry.start_cluster())
    }

    /// Open a cursor at the first byte of the chain starting at `start_cluster`.
    ///
    /// Start cluster 0 is an empty file and the cursor starts at the end.
    pub fn at_cluster(start_cluster: u16) -> Self {
        Self {
            start_cluster,
            cluster: (start_cluster != 0).then_some(start_cluster),
            sector: 0,
            byte: 0,
            position: 0,
        }
    }

    /// Release the cursor
    pub fn close(self) {
        log::trace!(
            "FAT: close cursor on cluster {} at offset {}",
            self.start_cluster,
            self.position
        );
    }

    /// First cluster of the file
    pub fn start_cluster(&self) -> u16 {
        self.start_cluster
    }

    /// Current cluster, `None` once the chain is exhausted
    pub fn cluster(&self) -> Option<u16> {
        self.cluster
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub fn byte(&self) -> usize {
        self.byte
    }

    /// Byte offset from the start of the file
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the cursor is parked past the last cluster
    pub fn is_at_end(&self) -> bool {
        self.cluster.is_none()
    }

    fn rewind(&mut self) {
        *self = Self::at_cluster(self.start_cluster);
    }
}

impl<D: BlockDevice> FatVolume<D> {
    /// Fill `buffer` from the cursor position.
    ///
    /// When the chain runs out the remainder of `buffer` is zero-filled and
    /// `ReadStatus::EndOfChain` reports how many bytes came from the file.
    pub fn read(
        &mut self,
        cursor: &mut FileCursor,
        buffer: &mut [u8],
    ) -> Result<ReadStatus, FatError> {
        let bytes_per_sector = self.geometry.bytes_per_sector();
        let mut filled = 0;

        while filled < buffer.len() {
            let Some(cluster) = self.live_cluster(cursor) else {
                buffer[filled..].fill(0);
                return Ok(ReadStatus::EndOfChain { filled });
            };

            let lba = self.geometry.sector_of_cluster(cluster)? + cursor.sector as u64;
            let count = (bytes_per_sector - cursor.byte).min(buffer.len() - filled);
            {
                let sector = self.cache.get_sector(lba)?;
                buffer[filled..filled + count]
                    .copy_from_slice(&sector[cursor.byte..cursor.byte + count]);
            }
            filled += count;
            self.advance_in_sector(cursor, count)?;
        }

        Ok(ReadStatus::Complete)
    }

    /// Move the cursor forward.
    ///
    /// `SeekFrom::Start` rewinds to the first cluster before advancing. A
    /// cursor that reaches the end of the chain stays parked there.
    pub fn seek(&mut self, cursor: &mut FileCursor, from: SeekFrom) -> Result<(), FatError> {
        let mut remaining = match from {
            SeekFrom::Start(offset) => {
                cursor.rewind();
                offset as usize
            }
            SeekFrom::Current(offset) => offset as usize,
        };

        let bytes_per_sector = self.geometry.bytes_per_sector();
        while remaining > 0 && self.live_cluster(cursor).is_some() {
            let step = (bytes_per_sector - cursor.byte).min(remaining);
            self.advance_in_sector(cursor, step)?;
            remaining -= step;
        }
        Ok(())
    }

    /// Read a whole file, truncated to the size recorded in its entry
    pub fn read_file(&mut self, entry: &DirectoryEntry) -> Result<Vec<u8>, FatError> {
        if entry.is_directory() || entry.is_volume_label() {
            return Err(FatError::NotAFile);
        }

        let mut data = vec![0u8; entry.size() as usize];
        let mut cursor = FileCursor::open(entry);
        if let ReadStatus::EndOfChain { filled } = self.read(&mut cursor, &mut data)? {
            log::warn!(
                "FAT: {} is {} bytes but its chain holds only {}",
                entry.short_name(),
                entry.size(),
                filled
            );
            data.truncate(filled);
        }
        cursor.close();

        Ok(data)
    }

    /// Current cluster of `cursor`, parking it if the cluster is an
    /// end-of-chain marker
    fn live_cluster(&self, cursor: &mut FileCursor) -> Option<u16> {
        let cluster = cursor.cluster?;
        if is_end_of_chain(self.geometry.fat_type(), cluster) {
            cursor.cluster = None;
            return None;
        }
        Some(cluster)
    }

    /// Advance by `count` bytes, never crossing more than one sector boundary
    fn advance_in_sector(
        &mut self,
        cursor: &mut FileCursor,
        count: usize,
    ) -> Result<(), FatError> {
        let Some(cluster) = self.live_cluster(cursor) else {
            return Ok(());
        };

        cursor.byte += count;
        cursor.position += count as u64;
        if cursor.byte < self.geometry.bytes_per_sector() {
            return Ok(());
        }

        cursor.byte = 0;
        cursor.sector += 1;
        if cursor.sector < self.geometry.sectors_per_cluster() {
            return Ok(());
        }

        cursor.sector = 0;
        cursor.cluster = self.next_cluster(cluster)?;
        Ok(())
    }
}
