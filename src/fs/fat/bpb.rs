//! BIOS Parameter Block and volume geometry
//!
//! | Offset | Size | Field                         |
//! |--------|------|-------------------------------|
//! | 0x0B   | 2    | Bytes per sector              |
//! | 0x0D   | 1    | Sectors per cluster           |
//! | 0x0E   | 2    | Reserved sectors              |
//! | 0x10   | 1    | Number of FATs                |
//! | 0x11   | 2    | Root entries (FAT12/16)       |
//! | 0x13   | 2    | Total sectors (16-bit)        |
//! | 0x15   | 1    | Media descriptor              |
//! | 0x16   | 2    | Sectors per FAT               |
//! | 0x18   | 2    | Sectors per track             |
//! | 0x1A   | 2    | Number of heads               |
//! | 0x1C   | 4    | Hidden sectors                |
//! | 0x20   | 4    | Total sectors (32-bit)        |

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::dir::DIR_ENTRY_SIZE;
use super::FatError;

/// Byte offset of the BPB within sector 0
pub const BPB_OFFSET: usize = 0x00B;

/// FAT12 volumes have fewer data clusters than this
const FAT12_MAX_CLUSTERS: u32 = 4085;

/// FAT16 volumes have fewer data clusters than this
const FAT16_MAX_CLUSTERS: u32 = 65525;

/// On-disk BPB layout, starting at `BPB_OFFSET`
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, Debug, Default)]
pub struct RawBpb {
    /// Bytes per sector
    pub bytes_per_sector: [u8; 2],
    /// Sectors per cluster
    pub sectors_per_cluster: u8,
    /// Reserved sectors (before first FAT)
    pub reserved_sectors: [u8; 2],
    /// Number of FATs
    pub num_fats: u8,
    /// Root entry count
    pub root_entry_count: [u8; 2],
    /// Total sectors (16-bit, 0 if over 65535)
    pub total_sectors_16: [u8; 2],
    /// Media type
    pub media_type: u8,
    /// Sectors per FAT
    pub sectors_per_fat: [u8; 2],
    /// Sectors per track
    pub sectors_per_track: [u8; 2],
    /// Number of heads
    pub num_heads: [u8; 2],
    /// Hidden sectors
    pub hidden_sectors: [u8; 4],
    /// Total sectors (32-bit)
    pub total_sectors_32: [u8; 4],
}

/// Decoded BIOS Parameter Block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media_type: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
}

impl BiosParameterBlock {
    /// Decode the BPB from the raw bytes of sector 0
    pub fn parse(boot_sector: &[u8]) -> Result<Self, FatError> {
        let Some(bytes) = boot_sector.get(BPB_OFFSET..) else {
            return Err(FatError::InvalidBpb);
        };
        let Ok((raw, _)) = RawBpb::read_from_prefix(bytes) else {
            log::debug!("BPB: boot sector too short ({} bytes)", boot_sector.len());
            return Err(FatError::InvalidBpb);
        };
        Ok(Self::from(&raw))
    }

    /// Total sector count, whichever field holds it
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }
}

impl From<&RawBpb> for BiosParameterBlock {
    fn from(raw: &RawBpb) -> Self {
        Self {
            bytes_per_sector: u16::from_le_bytes(raw.bytes_per_sector),
            sectors_per_cluster: raw.sectors_per_cluster,
            reserved_sectors: u16::from_le_bytes(raw.reserved_sectors),
            num_fats: raw.num_fats,
            root_entry_count: u16::from_le_bytes(raw.root_entry_count),
            total_sectors_16: u16::from_le_bytes(raw.total_sectors_16),
            media_type: raw.media_type,
            sectors_per_fat: u16::from_le_bytes(raw.sectors_per_fat),
            sectors_per_track: u16::from_le_bytes(raw.sectors_per_track),
            num_heads: u16::from_le_bytes(raw.num_heads),
            hidden_sectors: u32::from_le_bytes(raw.hidden_sectors),
            total_sectors_32: u32::from_le_bytes(raw.total_sectors_32),
        }
    }
}

impl From<&BiosParameterBlock> for RawBpb {
    fn from(bpb: &BiosParameterBlock) -> Self {
        Self {
            bytes_per_sector: bpb.bytes_per_sector.to_le_bytes(),
            sectors_per_cluster: bpb.sectors_per_cluster,
            reserved_sectors: bpb.reserved_sectors.to_le_bytes(),
            num_fats: bpb.num_fats,
            root_entry_count: bpb.root_entry_count.to_le_bytes(),
            total_sectors_16: bpb.total_sectors_16.to_le_bytes(),
            media_type: bpb.media_type,
            sectors_per_fat: bpb.sectors_per_fat.to_le_bytes(),
            sectors_per_track: bpb.sectors_per_track.to_le_bytes(),
            num_heads: bpb.num_heads.to_le_bytes(),
            hidden_sectors: bpb.hidden_sectors.to_le_bytes(),
            total_sectors_32: bpb.total_sectors_32.to_le_bytes(),
        }
    }
}

/// FAT filesystem type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
}

/// Sector layout derived from a validated BPB
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    bpb: BiosParameterBlock,
    fat_type: FatType,
    root_dir_start: u64,
    root_dir_sectors: u64,
    data_start: u64,
    cluster_count: u32,
}

impl Geometry {
    /// Validate the BPB and compute the layout
    pub fn new(bpb: BiosParameterBlock) -> Result<Self, FatError> {
        if bpb.bytes_per_sector == 0 {
            log::debug!("Invalid bytes_per_sector: 0");
            return Err(FatError::InvalidBpb);
        }
        if bpb.sectors_per_cluster == 0 {
            log::debug!("Invalid sectors_per_cluster: 0");
            return Err(FatError::InvalidBpb);
        }
        if bpb.num_fats == 0 {
            log::debug!("Invalid num_fats: 0 (expected >= 1)");
            return Err(FatError::InvalidBpb);
        }
        if bpb.sectors_per_fat == 0 {
            // FAT32 keeps its FAT size in the extended BPB
            log::debug!("sectors_per_fat is 0, not a FAT12/16 volume");
            return Err(FatError::Unsupported);
        }

        let root_dir_start =
            bpb.reserved_sectors as u64 + bpb.num_fats as u64 * bpb.sectors_per_fat as u64;
        let root_dir_sectors = (bpb.root_entry_count as u64 * DIR_ENTRY_SIZE as u64)
            .div_ceil(bpb.bytes_per_sector as u64);
        let data_start = root_dir_start + root_dir_sectors;

        let total_sectors = bpb.total_sectors() as u64;
        if total_sectors < data_start {
            log::warn!(
                "BPB: total sectors {} smaller than data region start {}",
                total_sectors,
                data_start
            );
        }
        let cluster_count =
            (total_sectors.saturating_sub(data_start) / bpb.sectors_per_cluster as u64) as u32;

        let fat_type = if cluster_count < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if cluster_count < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            log::debug!("{} clusters: FAT32 volumes are not supported", cluster_count);
            return Err(FatError::Unsupported);
        };

        Ok(Self {
            bpb,
            fat_type,
            root_dir_start,
            root_dir_sectors,
            data_start,
            cluster_count,
        })
    }

    /// The BPB this layout was derived from
    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn bytes_per_sector(&self) -> usize {
        self.bpb.bytes_per_sector as usize
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        self.bpb.sectors_per_cluster as u32
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_sector() * self.bpb.sectors_per_cluster as usize
    }

    /// Directory entries held by one sector
    pub fn entries_per_sector(&self) -> usize {
        self.bytes_per_sector() / DIR_ENTRY_SIZE
    }

    /// First sector of the first FAT
    pub fn fat_start_sector(&self) -> u64 {
        self.bpb.reserved_sectors as u64
    }

    /// Sectors occupied by one FAT copy
    pub fn fat_sectors(&self) -> u64 {
        self.bpb.sectors_per_fat as u64
    }

    /// Number of entries one FAT copy has room for
    pub fn fat_capacity(&self) -> u32 {
        let fat_bytes = self.fat_sectors() * self.bytes_per_sector() as u64;
        let entries = match self.fat_type {
            FatType::Fat12 => fat_bytes * 2 / 3,
            FatType::Fat16 => fat_bytes / 2,
        };
        entries.min(u32::MAX as u64) as u32
    }

    /// Number of data clusters on the volume
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// First sector of the fixed root directory
    pub fn root_dir_start_sector(&self) -> u64 {
        self.root_dir_start
    }

    /// Sectors occupied by the fixed root directory
    pub fn root_dir_sector_count(&self) -> u64 {
        self.root_dir_sectors
    }

    /// First sector of cluster 2
    pub fn data_region_start_sector(&self) -> u64 {
        self.data_start
    }

    /// First sector of a data cluster
    pub fn sector_of_cluster(&self, cluster: u16) -> Result<u64, FatError> {
        if cluster < 2 {
            return Err(FatError::InvalidCluster);
        }
        Ok(self.data_start + (cluster as u64 - 2) * self.sectors_per_cluster() as u64)
    }
}
