//! Disk image files
//!
//! A `BlockDevice` over a flat image file on the host filesystem. The block
//! size is taken from the bytes-per-sector field of the image's BPB.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::block::{check_request, BlockDevice, BlockDeviceInfo, BlockError};

/// Byte offset of the bytes-per-sector field in sector 0
const BYTES_PER_SECTOR_OFFSET: u64 = 0x00B;

/// Block device backed by an image file, opened read-only
#[derive(Debug)]
pub struct ImageFile {
    file: File,
    block_size: u32,
    num_blocks: u64,
}

impl ImageFile {
    /// Open an image, probing the block size from its BPB
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlockError> {
        let path = path.as_ref();
        let mut file = open_read_only(path)?;

        let mut raw = [0u8; 2];
        file.seek(SeekFrom::Start(BYTES_PER_SECTOR_OFFSET))
            .and_then(|_| file.read_exact(&mut raw))
            .map_err(|e| {
                log::error!("image: {}: cannot read BPB: {}", path.display(), e);
                BlockError::DeviceError
            })?;

        let block_size = u16::from_le_bytes(raw) as u32;
        if block_size == 0 {
            log::debug!("image: {}: bytes_per_sector is 0", path.display());
            return Err(BlockError::InvalidParameter);
        }

        Self::from_file(file, block_size)
    }

    /// Open an image with an explicit block size
    pub fn with_block_size<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Self, BlockError> {
        if block_size == 0 {
            return Err(BlockError::InvalidParameter);
        }
        Self::from_file(open_read_only(path.as_ref())?, block_size)
    }

    fn from_file(file: File, block_size: u32) -> Result<Self, BlockError> {
        let len = file
            .metadata()
            .map_err(|e| {
                log::error!("image: cannot stat: {}", e);
                BlockError::DeviceError
            })?
            .len();

        let num_blocks = len / block_size as u64;
        log::debug!(
            "image: {} bytes, {} blocks of {} bytes",
            len,
            num_blocks,
            block_size
        );

        Ok(Self {
            file,
            block_size,
            num_blocks,
        })
    }
}

fn open_read_only(path: &Path) -> Result<File, BlockError> {
    File::open(path).map_err(|e| {
        log::error!("image: cannot open {}: {}", path.display(), e);
        BlockError::OpenFailed
    })
}

impl BlockDevice for ImageFile {
    fn info(&self) -> BlockDeviceInfo {
        BlockDeviceInfo {
            num_blocks: self.num_blocks,
            block_size: self.block_size,
        }
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError> {
        let len = check_request(&self.info(), lba, count, buffer.len())?;
        let offset = lba * self.block_size as u64;

        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut buffer[..len]))
            .map_err(|e| {
                log::warn!("image: read of {} bytes at {:#x} failed: {}", len, offset, e);
                BlockError::DeviceError
            })
    }
}
