//! FAT12/16 Filesystem Driver
//!
//! Read-only access to FAT12 and FAT16 volumes stored as flat images.
//!
//! The volume is described by the BIOS Parameter Block in sector 0. Behind
//! the reserved sectors come the FAT copies, then the fixed-size root
//! directory, then the data region, addressed in clusters starting at 2.
//! Files and sub-directories are chains of clusters linked through the FAT.

pub mod bpb;
pub mod dir;
pub mod file;
pub mod table;

#[cfg(test)]
pub(crate) mod testimg;

use core::fmt;

use crate::drivers::block::{BlockDevice, BlockError, SectorCache};

pub use bpb::{BiosParameterBlock, FatType, Geometry};
pub use dir::{attr, DirLocation, DirectoryEntry, FatDate, FatTime};
pub use file::{FileCursor, ReadStatus, SeekFrom};
pub use table::EOC;

/// FAT filesystem error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    /// Invalid BPB
    InvalidBpb,
    /// Not a FAT12/16 volume
    Unsupported,
    /// BPB sector size differs from the device block size
    SectorSizeMismatch,
    /// Cluster number outside the data region or the FAT
    InvalidCluster,
    /// File or entry not found
    NotFound,
    /// Not a directory
    NotADirectory,
    /// Not a file
    NotAFile,
    /// Cluster chain longer than the FAT allows (cycle)
    ChainTooLong,
    /// Underlying device error
    Block(BlockError),
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatError::InvalidBpb => write!(f, "invalid BIOS parameter block"),
            FatError::Unsupported => write!(f, "not a FAT12/16 volume"),
            FatError::SectorSizeMismatch => write!(f, "BPB sector size does not match the device"),
            FatError::InvalidCluster => write!(f, "invalid cluster number"),
            FatError::NotFound => write!(f, "not found"),
            FatError::NotADirectory => write!(f, "not a directory"),
            FatError::NotAFile => write!(f, "not a file"),
            FatError::ChainTooLong => write!(f, "cluster chain does not terminate"),
            FatError::Block(e) => write!(f, "block device: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FatError::Block(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BlockError> for FatError {
    fn from(e: BlockError) -> Self {
        FatError::Block(e)
    }
}

/// A mounted FAT12/16 volume
pub struct FatVolume<D: BlockDevice> {
    cache: SectorCache<D>,
    geometry: Geometry,
}

impl<D: BlockDevice> FatVolume<D> {
    /// Mount the volume on `device`, reading the BPB from sector 0
    pub fn mount(device: D) -> Result<Self, FatError> {
        let mut cache = SectorCache::new(device);
        let info = cache.info();

        let bpb = BiosParameterBlock::parse(cache.get_sector(0)?)?;
        let geometry = Geometry::new(bpb)?;

        if geometry.bytes_per_sector() != info.block_size as usize {
            log::debug!(
                "BPB sector size {} != device block size {}",
                geometry.bytes_per_sector(),
                info.block_size
            );
            return Err(FatError::SectorSizeMismatch);
        }

        let total = bpb.total_sectors() as u64;
        if total > info.num_blocks {
            log::warn!(
                "FAT: BPB claims {} sectors, image holds {}",
                total,
                info.num_blocks
            );
        }

        log::info!(
            "{:?}: {} clusters, {} bytes per cluster, data at sector {}",
            geometry.fat_type(),
            geometry.cluster_count(),
            geometry.bytes_per_cluster(),
            geometry.data_region_start_sector()
        );

        Ok(Self { cache, geometry })
    }

    /// Volume layout
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Unmount, giving back the device
    pub fn into_inner(self) -> D {
        self.cache.into_inner()
    }
}

#[cfg(feature = "std")]
impl FatVolume<crate::drivers::image::ImageFile> {
    /// Open and mount an image file
    pub fn open_image<P: AsRef<std::path::Path>>(path: P) -> Result<Self, FatError> {
        Self::mount(crate::drivers::image::ImageFile::open(path)?)
    }
}
