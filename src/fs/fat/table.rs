//! File Allocation Table decoding and cluster chain navigation

use alloc::vec::Vec;

use super::bpb::FatType;
use super::FatError;
use super::FatVolume;
use crate::drivers::block::BlockDevice;

/// Canonical FAT12 end-of-chain value
pub const EOC: u16 = 0x0FFF;

/// Smallest FAT12 value that marks the end of a chain
const FAT12_EOC_MIN: u16 = 0x0FF8;

/// Smallest FAT16 value that marks the end of a chain
const FAT16_EOC_MIN: u16 = 0xFFF8;

/// Decode a FAT12 entry from its two bytes.
///
/// `low` is the byte at `cluster * 3 / 2`, `high` the byte after it. Odd
/// clusters live in the upper 12 bits of the pair, even ones in the lower 12.
pub fn decode_fat12(cluster: u16, low: u8, high: u8) -> u16 {
    let (low, high) = (low as u16, high as u16);
    if cluster & 1 != 0 {
        (high << 4) | (low >> 4)
    } else {
        low | ((high & 0x0F) << 8)
    }
}

/// Whether a raw FAT value terminates a chain
pub fn is_end_of_chain(fat_type: FatType, value: u16) -> bool {
    match fat_type {
        FatType::Fat12 => value >= FAT12_EOC_MIN,
        FatType::Fat16 => value >= FAT16_EOC_MIN,
    }
}

impl<D: BlockDevice> FatVolume<D> {
    /// Read the raw FAT entry of `cluster`
    pub fn fat_entry(&mut self, cluster: u16) -> Result<u16, FatError> {
        let fat_type = self.geometry.fat_type();
        let offset = match fat_type {
            FatType::Fat12 => cluster as u64 * 3 / 2,
            FatType::Fat16 => cluster as u64 * 2,
        };
        let (low, high) = self.fat_byte_pair(offset)?;

        Ok(match fat_type {
            FatType::Fat12 => decode_fat12(cluster, low, high),
            FatType::Fat16 => u16::from_le_bytes([low, high]),
        })
    }

    /// Follow the chain one step.
    ///
    /// Returns `None` once `cluster` is the last one of its chain.
    pub fn next_cluster(&mut self, cluster: u16) -> Result<Option<u16>, FatError> {
        let value = self.fat_entry(cluster)?;
        log::trace!("FAT: {} -> {:#05x}", cluster, value);

        if is_end_of_chain(self.geometry.fat_type(), value) {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    /// Collect every cluster of the chain starting at `start`.
    ///
    /// A start cluster of 0 is an empty chain (zero-length file).
    pub fn cluster_chain(&mut self, start: u16) -> Result<Vec<u16>, FatError> {
        let mut chain = Vec::new();
        if start == 0 {
            return Ok(chain);
        }
        if start < 2 {
            return Err(FatError::InvalidCluster);
        }

        let limit = self.chain_limit();
        let mut cluster = start;
        loop {
            chain.push(cluster);
            if chain.len() > limit {
                return Err(FatError::ChainTooLong);
            }
            match self.next_cluster(cluster)? {
                Some(next) => cluster = next,
                None => break,
            }
        }
        Ok(chain)
    }

    /// Longest chain the FAT can describe
    pub(crate) fn chain_limit(&self) -> usize {
        self.geometry.fat_capacity() as usize
    }

    /// Read the bytes at `offset` and `offset + 1` of the first FAT.
    ///
    /// The pair may straddle two sectors, in which case the second sector is
    /// fetched separately.
    fn fat_byte_pair(&mut self, offset: u64) -> Result<(u8, u8), FatError> {
        let bps = self.geometry.bytes_per_sector() as u64;
        let fat_bytes = self.geometry.fat_sectors() * bps;
        if offset + 1 >= fat_bytes {
            log::debug!(
                "FAT: offset {} past end of table ({} bytes)",
                offset,
                fat_bytes
            );
            return Err(FatError::InvalidCluster);
        }

        let lba = self.geometry.fat_start_sector() + offset / bps;
        let index = (offset % bps) as usize;

        let (low, next) = {
            let sector = self.cache.get_sector(lba)?;
            (sector[index], sector.get(index + 1).copied())
        };
        let high = match next {
            Some(byte) => byte,
            None => self.cache.get_sector(lba + 1)?[0],
        };
        Ok((low, high))
    }
}
