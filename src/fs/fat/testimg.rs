//! In-memory FAT12/16 images for unit tests

use alloc::vec;
use alloc::vec::Vec;

use zerocopy::IntoBytes;

use super::bpb::{BiosParameterBlock, FatType, Geometry, RawBpb, BPB_OFFSET};
use super::dir::{attr, DirLocation, DirectoryEntry, DIR_ENTRY_SIZE};
use super::table::{decode_fat12, is_end_of_chain, EOC};
use super::FatVolume;
use crate::drivers::block::MemoryBlockDevice;

/// Sector of the first FAT in every image built here
pub const FAT_START: usize = 1;

const SECTOR: usize = 512;

/// Long-name continuation entry
pub fn lfn() -> DirectoryEntry {
    DirectoryEntry::new(*b"A\0b\0c\0d\0", *b"\0\0\0", attr::LONG_NAME, 0, 0)
}

/// Builds a 1.44M floppy (or a small FAT16) layout and lets tests poke at the
/// FAT and the directories directly.
pub struct ImageBuilder {
    image: Vec<u8>,
    bpb: BiosParameterBlock,
    fat_type: FatType,
    next_free: u16,
    /// Slots used per directory, keyed by first cluster (0 for the root)
    used: Vec<(u16, usize)>,
}

impl ImageBuilder {
    pub fn floppy() -> Self {
        Self::with_cluster_sectors(1)
    }

    pub fn with_cluster_sectors(sectors_per_cluster: u8) -> Self {
        Self::from_bpb(BiosParameterBlock {
            bytes_per_sector: SECTOR as u16,
            sectors_per_cluster,
            reserved_sectors: FAT_START as u16,
            num_fats: 2,
            root_entry_count: 224,
            total_sectors_16: 2880,
            media_type: 0xF0,
            sectors_per_fat: 9,
            sectors_per_track: 18,
            num_heads: 2,
            hidden_sectors: 0,
            total_sectors_32: 0,
        })
    }

    /// A FAT16 volume: 4200 clusters of 4 sectors, 80-sector FATs
    pub fn fat16() -> Self {
        Self::from_bpb(BiosParameterBlock {
            bytes_per_sector: SECTOR as u16,
            sectors_per_cluster: 4,
            reserved_sectors: FAT_START as u16,
            num_fats: 2,
            root_entry_count: 512,
            total_sectors_16: 193 + 4 * 4200,
            media_type: 0xF8,
            sectors_per_fat: 80,
            sectors_per_track: 63,
            num_heads: 16,
            hidden_sectors: 0,
            total_sectors_32: 0,
        })
    }

    fn from_bpb(bpb: BiosParameterBlock) -> Self {
        let fat_type = Geometry::new(bpb).unwrap().fat_type();

        let mut image = vec![0u8; bpb.total_sectors() as usize * SECTOR];
        image[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        image[3..11].copy_from_slice(b"MSDOS5.0");
        image[BPB_OFFSET..BPB_OFFSET + core::mem::size_of::<RawBpb>()]
            .copy_from_slice(RawBpb::from(&bpb).as_bytes());
        image[510] = 0x55;
        image[511] = 0xAA;

        let mut builder = Self {
            image,
            bpb,
            fat_type,
            next_free: 2,
            used: vec![(0, 0)],
        };
        let media = [bpb.media_type, 0xFF, 0xFF, 0xFF];
        match fat_type {
            FatType::Fat12 => builder.fat_bytes(0, &media[..3]),
            FatType::Fat16 => builder.fat_bytes(0, &media),
        }
        builder
    }

    /// Write raw bytes at `offset` into every FAT copy
    pub fn fat_bytes(&mut self, offset: usize, bytes: &[u8]) {
        for fat in 0..self.bpb.num_fats as usize {
            let base = self.fat_base(fat) + offset;
            self.image[base..base + bytes.len()].copy_from_slice(bytes);
        }
    }

    /// Store a 12-bit FAT value, leaving the neighbouring nibbles alone
    pub fn set_fat12(&mut self, cluster: u16, value: u16) {
        let offset = cluster as usize * 3 / 2;
        for fat in 0..self.bpb.num_fats as usize {
            let i = self.fat_base(fat) + offset;
            if cluster & 1 != 0 {
                self.image[i] = (self.image[i] & 0x0F) | ((value as u8 & 0x0F) << 4);
                self.image[i + 1] = (value >> 4) as u8;
            } else {
                self.image[i] = value as u8;
                self.image[i + 1] = (self.image[i + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
            }
        }
        self.next_free = self.next_free.max(cluster + 1);
    }

    /// Store a 16-bit FAT value
    pub fn set_fat16(&mut self, cluster: u16, value: u16) {
        self.fat_bytes(cluster as usize * 2, &value.to_le_bytes());
        self.next_free = self.next_free.max(cluster + 1);
    }

    /// Store a FAT value in the format of this volume
    pub fn set_fat(&mut self, cluster: u16, value: u16) {
        match self.fat_type {
            FatType::Fat12 => self.set_fat12(cluster, value),
            FatType::Fat16 => self.set_fat16(cluster, value),
        }
    }

    /// Link `clusters` in order and terminate the chain
    pub fn chain(&mut self, clusters: &[u16]) {
        let eoc = match self.fat_type {
            FatType::Fat12 => EOC,
            FatType::Fat16 => 0xFFFF,
        };
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, eoc);
        }
    }

    /// Append an entry to the root directory
    pub fn root_entry(&mut self, entry: DirectoryEntry) {
        self.append(DirLocation::Root, entry);
    }

    /// Store `data` in freshly allocated clusters and add its entry.
    ///
    /// Returns the start cluster, 0 for empty data.
    pub fn add_file(
        &mut self,
        parent: DirLocation,
        name: [u8; 8],
        ext: [u8; 3],
        data: &[u8],
    ) -> u16 {
        let clusters = self.allocate(data.len().div_ceil(self.cluster_bytes()));
        self.add_file_at(parent, name, ext, data, &clusters)
    }

    /// Store `data` in the given clusters and add its entry
    pub fn add_file_at(
        &mut self,
        parent: DirLocation,
        name: [u8; 8],
        ext: [u8; 3],
        data: &[u8],
        clusters: &[u16],
    ) -> u16 {
        self.chain(clusters);
        for (chunk, &cluster) in data.chunks(self.cluster_bytes()).zip(clusters) {
            let base = self.cluster_offset(cluster);
            self.image[base..base + chunk.len()].copy_from_slice(chunk);
        }

        let start = clusters.first().copied().unwrap_or(0);
        self.append(
            parent,
            DirectoryEntry::new(name, ext, attr::ARCHIVE, start, data.len() as u32),
        );
        start
    }

    /// Create a sub-directory holding `.`, `..` and `children`.
    ///
    /// Returns its first cluster.
    pub fn add_dir(
        &mut self,
        parent: DirLocation,
        name: [u8; 8],
        children: &[DirectoryEntry],
    ) -> u16 {
        let slots = (children.len() + 2) * DIR_ENTRY_SIZE;
        let clusters = self.allocate(slots.div_ceil(self.cluster_bytes()).max(1));
        let first = clusters[0];
        self.chain(&clusters);

        let parent_cluster = match parent {
            DirLocation::Root => 0,
            DirLocation::Cluster(c) => c,
        };
        self.used.push((first, 0));
        self.append(
            DirLocation::Cluster(first),
            DirectoryEntry::new(*b".       ", *b"   ", attr::DIRECTORY, first, 0),
        );
        self.append(
            DirLocation::Cluster(first),
            DirectoryEntry::new(*b"..      ", *b"   ", attr::DIRECTORY, parent_cluster, 0),
        );
        for child in children {
            self.append(DirLocation::Cluster(first), *child);
        }

        self.append(parent, DirectoryEntry::new(name, *b"   ", attr::DIRECTORY, first, 0));
        first
    }

    pub fn build(self) -> Vec<u8> {
        self.image
    }

    pub fn mount(self) -> FatVolume<MemoryBlockDevice> {
        Self::mount_image(self.build())
    }

    pub fn mount_image(image: Vec<u8>) -> FatVolume<MemoryBlockDevice> {
        let dev = MemoryBlockDevice::new(image, SECTOR as u32).unwrap();
        FatVolume::mount(dev).unwrap()
    }

    fn fat_base(&self, fat: usize) -> usize {
        (FAT_START + fat * self.bpb.sectors_per_fat as usize) * SECTOR
    }

    fn cluster_bytes(&self) -> usize {
        self.bpb.sectors_per_cluster as usize * SECTOR
    }

    fn root_offset(&self) -> usize {
        self.fat_base(self.bpb.num_fats as usize)
    }

    fn data_offset(&self) -> usize {
        self.root_offset() + self.bpb.root_entry_count as usize * DIR_ENTRY_SIZE
    }

    fn cluster_offset(&self, cluster: u16) -> usize {
        self.data_offset() + (cluster as usize - 2) * self.cluster_bytes()
    }

    fn allocate(&mut self, count: usize) -> Vec<u16> {
        let first = self.next_free;
        self.next_free += count as u16;
        (first..first + count as u16).collect()
    }

    /// Byte offset of directory slot `index`
    fn slot_offset(&self, location: DirLocation, index: usize) -> usize {
        match location {
            DirLocation::Root => {
                assert!(index < self.bpb.root_entry_count as usize, "root directory full");
                self.root_offset() + index * DIR_ENTRY_SIZE
            }
            DirLocation::Cluster(first) => {
                let per_cluster = self.cluster_bytes() / DIR_ENTRY_SIZE;
                let mut cluster = first;
                for _ in 0..index / per_cluster {
                    cluster = self.fat_value(cluster);
                    assert!(!is_end_of_chain(self.fat_type, cluster), "sub-directory full");
                }
                self.cluster_offset(cluster) + (index % per_cluster) * DIR_ENTRY_SIZE
            }
        }
    }

    fn fat_value(&self, cluster: u16) -> u16 {
        let base = self.fat_base(0);
        match self.fat_type {
            FatType::Fat12 => {
                let i = base + cluster as usize * 3 / 2;
                decode_fat12(cluster, self.image[i], self.image[i + 1])
            }
            FatType::Fat16 => {
                let i = base + cluster as usize * 2;
                u16::from_le_bytes([self.image[i], self.image[i + 1]])
            }
        }
    }

    fn append(&mut self, location: DirLocation, entry: DirectoryEntry) {
        let key = match location {
            DirLocation::Root => 0,
            DirLocation::Cluster(c) => c,
        };
        let slot = self
            .used
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, n)| {
                *n += 1;
                *n - 1
            })
            .expect("unknown directory");

        let offset = self.slot_offset(location, slot);
        self.image[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    }
}
