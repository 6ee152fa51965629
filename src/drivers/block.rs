//! Block Device Abstraction
//!
//! This module provides the sector-level interface the FAT code reads through.
//!
//! # Architecture
//!
//! Every backing store implements the `BlockDevice` trait, providing:
//! - Device information (block count, block size)
//! - Uncached block read operations
//!
//! On top of a device sits the `SectorCache`, which keeps the most recently
//! fetched sector. The cached bytes are handed out as a borrow of the cache,
//! so a caller cannot hold on to them across a fetch of a different sector.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Information about a block device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockDeviceInfo {
    /// Total number of blocks on the device
    pub num_blocks: u64,
    /// Size of each block in bytes
    pub block_size: u32,
}

/// Unified error type for block operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Generic device error (short read, I/O failure)
    DeviceError,
    /// Invalid parameter (buffer too small, zero block size, etc.)
    InvalidParameter,
    /// LBA out of range
    OutOfRange,
    /// The backing image could not be opened
    OpenFailed,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::DeviceError => write!(f, "device read failed"),
            BlockError::InvalidParameter => write!(f, "invalid block request"),
            BlockError::OutOfRange => write!(f, "sector index out of range"),
            BlockError::OpenFailed => write!(f, "image could not be opened"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BlockError {}

/// Trait for block-level storage devices
pub trait BlockDevice {
    /// Get device information
    fn info(&self) -> BlockDeviceInfo;

    /// Read blocks from the device
    ///
    /// # Arguments
    /// * `lba` - Starting logical block address
    /// * `count` - Number of blocks to read
    /// * `buffer` - Buffer to read into (must be at least count * block_size bytes)
    fn read_blocks(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Read a single block (convenience method)
    fn read_block(&mut self, lba: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        self.read_blocks(lba, 1, buffer)
    }
}

/// Validate a read request against the device geometry.
///
/// Returns the number of bytes the request covers.
pub(crate) fn check_request(
    info: &BlockDeviceInfo,
    lba: u64,
    count: u32,
    buffer_len: usize,
) -> Result<usize, BlockError> {
    let end = lba.checked_add(count as u64).ok_or(BlockError::OutOfRange)?;
    if end > info.num_blocks {
        log::debug!(
            "block: read of {} blocks at LBA {} past end ({} blocks)",
            count,
            lba,
            info.num_blocks
        );
        return Err(BlockError::OutOfRange);
    }

    let len = count as usize * info.block_size as usize;
    if buffer_len < len {
        return Err(BlockError::InvalidParameter);
    }
    Ok(len)
}

// ============================================================================
// Memory Block Device
// ============================================================================

/// Block device backed by an in-memory image
///
/// Used for images already loaded into memory and by the unit tests.
pub struct MemoryBlockDevice {
    /// Raw image bytes
    data: Vec<u8>,
    /// Block size in bytes
    block_size: u32,
}

impl MemoryBlockDevice {
    /// Wrap an image. Trailing bytes that do not fill a whole block are ignored.
    pub fn new(data: Vec<u8>, block_size: u32) -> Result<Self, BlockError> {
        if block_size == 0 {
            return Err(BlockError::InvalidParameter);
        }
        Ok(Self { data, block_size })
    }

    /// Raw image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn info(&self) -> BlockDeviceInfo {
        BlockDeviceInfo {
            num_blocks: self.data.len() as u64 / self.block_size as u64,
            block_size: self.block_size,
        }
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError> {
        let len = check_request(&self.info(), lba, count, buffer.len())?;
        let start = lba as usize * self.block_size as usize;
        buffer[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }
}

// ============================================================================
// Sector Cache
// ============================================================================

/// Single-sector cache in front of a block device
pub struct SectorCache<D: BlockDevice> {
    device: D,
    buffer: Vec<u8>,
    /// LBA currently held in `buffer`
    cached: Option<u64>,
}

impl<D: BlockDevice> SectorCache<D> {
    /// Create an empty cache over `device`
    pub fn new(device: D) -> Self {
        let block_size = device.info().block_size as usize;
        Self {
            device,
            buffer: vec![0u8; block_size],
            cached: None,
        }
    }

    /// Block size of the underlying device
    pub fn block_size(&self) -> usize {
        self.buffer.len()
    }

    /// Device information
    pub fn info(&self) -> BlockDeviceInfo {
        self.device.info()
    }

    /// Fetch a sector through the cache.
    ///
    /// Requesting the cached LBA again does not touch the device. The returned
    /// slice borrows the cache and must be released before the next fetch.
    pub fn get_sector(&mut self, lba: u64) -> Result<&[u8], BlockError> {
        if self.cached != Some(lba) {
            // Drop the old contents first so a failed read never leaves
            // another sector's bytes tagged with this LBA.
            self.cached = None;
            log::trace!("cache: refill LBA {}", lba);
            self.device.read_block(lba, &mut self.buffer)?;
            self.cached = Some(lba);
        }
        Ok(&self.buffer)
    }

    /// Uncached single-sector read into `buffer`
    pub fn read_sector(&mut self, lba: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        self.device.read_block(lba, buffer)
    }

    /// Uncached multi-sector read into `buffer`
    pub fn read_sectors(
        &mut self,
        lba: u64,
        count: u32,
        buffer: &mut [u8],
    ) -> Result<(), BlockError> {
        self.device.read_blocks(lba, count, buffer)
    }

    /// Forget the cached sector
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Give back the underlying device
    pub fn into_inner(self) -> D {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device that counts how often it is actually read
    struct CountingDevice {
        inner: MemoryBlockDevice,
        reads: usize,
    }

    impl BlockDevice for CountingDevice {
        fn info(&self) -> BlockDeviceInfo {
            self.inner.info()
        }

        fn read_blocks(
            &mut self,
            lba: u64,
            count: u32,
            buffer: &mut [u8],
        ) -> Result<(), BlockError> {
            self.reads += 1;
            self.inner.read_blocks(lba, count, buffer)
        }
    }

    const SECTOR_SIZE: usize = 512;

    fn patterned(sectors: usize) -> Vec<u8> {
        (0..sectors * SECTOR_SIZE).map(|i| (i / SECTOR_SIZE) as u8 ^ i as u8).collect()
    }

    #[test]
    fn test_memory_device_reads_blocks() {
        let image = patterned(4);
        let mut dev = MemoryBlockDevice::new(image.clone(), 512).unwrap();
        assert_eq!(dev.info().num_blocks, 4);

        let mut buf = [0u8; 1024];
        dev.read_blocks(2, 2, &mut buf).unwrap();
        assert_eq!(&buf[..], &image[1024..2048]);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let mut dev = MemoryBlockDevice::new(patterned(2), 512).unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(dev.read_block(2, &mut buf), Err(BlockError::OutOfRange));
        assert_eq!(dev.read_block(u64::MAX, &mut buf), Err(BlockError::OutOfRange));

        let mut small = [0u8; 100];
        assert_eq!(dev.read_block(0, &mut small), Err(BlockError::InvalidParameter));
    }

    #[test]
    fn test_cache_is_idempotent_for_same_sector() {
        let image = patterned(3);
        let dev = CountingDevice {
            inner: MemoryBlockDevice::new(image.clone(), 512).unwrap(),
            reads: 0,
        };
        let mut cache = SectorCache::new(dev);

        let first = cache.get_sector(1).unwrap().to_vec();
        let second = cache.get_sector(1).unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(first, &image[512..1024]);
        assert_eq!(cache.into_inner().reads, 1);
    }

    #[test]
    fn test_cache_refills_on_different_sector() {
        let image = patterned(3);
        let dev = CountingDevice {
            inner: MemoryBlockDevice::new(image.clone(), 512).unwrap(),
            reads: 0,
        };
        let mut cache = SectorCache::new(dev);

        let a = cache.get_sector(0).unwrap().to_vec();
        let b = cache.get_sector(2).unwrap().to_vec();
        let a_again = cache.get_sector(0).unwrap().to_vec();
        assert_eq!(a, &image[..512]);
        assert_eq!(b, &image[1024..1536]);
        assert_eq!(a, a_again);
        assert_eq!(cache.into_inner().reads, 3);
    }

    #[test]
    fn test_uncached_reads_bypass_cache() {
        let image = patterned(4);
        let dev = CountingDevice {
            inner: MemoryBlockDevice::new(image.clone(), 512).unwrap(),
            reads: 0,
        };
        let mut cache = SectorCache::new(dev);
        cache.get_sector(0).unwrap();

        let mut buf = [0u8; 1024];
        cache.read_sectors(1, 2, &mut buf).unwrap();
        assert_eq!(&buf[..], &image[512..1536]);

        // Still cached after the uncached read, refetched after invalidate
        cache.get_sector(0).unwrap();
        cache.invalidate();
        cache.get_sector(0).unwrap();
        assert_eq!(cache.into_inner().reads, 3);
    }

    #[test]
    fn test_failed_fetch_does_not_poison_cache() {
        let mut cache = SectorCache::new(MemoryBlockDevice::new(patterned(2), 512).unwrap());
        cache.get_sector(1).unwrap();
        assert_eq!(cache.get_sector(9).unwrap_err(), BlockError::OutOfRange);
        // Must re-read sector 1 rather than trust a half-overwritten buffer.
        let expected = patterned(2)[512..1024].to_vec();
        assert_eq!(cache.get_sector(1).unwrap(), &expected[..]);
    }
}
