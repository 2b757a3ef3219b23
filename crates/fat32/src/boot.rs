use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::FatError;
use crate::table::ClusterNumber;

/// The BIOS parameter block is the first part of the boot sector. This is the
/// FAT32 layout, including the extended boot record.
///
/// See <https://wiki.osdev.org/FAT#Boot_Record>
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct BIOSParameterBlock {
    pub jmp_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: U16<LittleEndian>,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: U16<LittleEndian>,
    pub fat_count: u8,
    pub root_dir_entries: U16<LittleEndian>,
    pub total_sectors: U16<LittleEndian>,
    pub media_descriptor: u8,
    pub sectors_per_fat: U16<LittleEndian>,
    pub sectors_per_track: U16<LittleEndian>,
    pub head_count: U16<LittleEndian>,
    pub hidden_sectors: U32<LittleEndian>,
    pub total_sectors_large: U32<LittleEndian>,

    // FAT32 extended boot record
    pub sectors_per_fat_large: U32<LittleEndian>,
    pub ext_flags: U16<LittleEndian>,
    pub fs_version: U16<LittleEndian>,
    pub root_cluster: U32<LittleEndian>,
    pub fs_info_sector: U16<LittleEndian>,
    pub backup_boot_sector: U16<LittleEndian>,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: U32<LittleEndian>,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

const _: () = assert!(core::mem::size_of::<BIOSParameterBlock>() == 90);

impl BIOSParameterBlock {
    /// Offset of the `0x55 0xAA` signature that closes the boot sector.
    pub const SIGNATURE_OFFSET: usize = 510;
    pub const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Set in `ext_flags` when only one FAT is in use. Its index is in the
    /// low 4 bits.
    pub const EXT_FLAGS_SINGLE_FAT: u16 = 0x0080;
    pub const EXT_FLAGS_ACTIVE_FAT: u16 = 0x000F;

    pub fn total_sector_count(&self) -> u32 {
        match self.total_sectors.get() {
            0 => self.total_sectors_large.get(),
            small => u32::from(small),
        }
    }
}

/// Knobs a caller can set when mounting a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    /// Write every FAT update to all FAT copies, not only the first. Other
    /// tools may read any of the copies, so this is on by default. Ignored
    /// when the volume itself names a single active FAT.
    pub mirror_fats: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self { mirror_fats: true }
    }
}

/// Geometry of a mounted volume, derived once from the BPB. Every offset is
/// in bytes from the start of the volume image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeParameters {
    pub bytes_per_sector: usize,
    pub sectors_per_cluster: usize,
    pub bytes_per_cluster: usize,

    /// Start of the first FAT copy.
    pub fat_offset: usize,

    /// Size of one FAT copy.
    pub fat_size: usize,
    pub fat_count: usize,

    /// The only FAT copy in use when the volume has mirroring turned off.
    /// `None` means every copy is kept in sync.
    pub active_fat: Option<usize>,

    /// Start of cluster 2, the first data cluster.
    pub data_offset: usize,

    /// Number of data clusters we can actually address. Valid cluster
    /// numbers are `2..cluster_count + 2`.
    pub cluster_count: u32,

    pub root_cluster: ClusterNumber,
}

impl VolumeParameters {
    /// Parses the boot sector at the start of `image` and checks that it
    /// describes a FAT32 volume that fits in `image`.
    pub fn parse(image: &[u8]) -> Result<Self, FatError> {
        let bpb = BIOSParameterBlock::ref_from_prefix(image)
            .ok_or(FatError::CorruptVolume("image is smaller than the boot sector"))?;

        let signature = image.get(
            BIOSParameterBlock::SIGNATURE_OFFSET..BIOSParameterBlock::SIGNATURE_OFFSET + 2,
        );
        if signature != Some(&BIOSParameterBlock::SIGNATURE[..]) {
            return Err(FatError::CorruptVolume("missing boot sector signature"));
        }

        let bytes_per_sector = usize::from(bpb.bytes_per_sector.get());
        if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(FatError::CorruptVolume("unsupported bytes per sector"));
        }

        let sectors_per_cluster = usize::from(bpb.sectors_per_cluster);
        if !sectors_per_cluster.is_power_of_two() {
            return Err(FatError::CorruptVolume(
                "sectors per cluster is not a power of two",
            ));
        }

        let fat_count = usize::from(bpb.fat_count);
        if fat_count == 0 {
            return Err(FatError::CorruptVolume("volume has no FAT"));
        }

        let ext_flags = bpb.ext_flags.get();
        let active_fat = if ext_flags & BIOSParameterBlock::EXT_FLAGS_SINGLE_FAT != 0 {
            let index = usize::from(ext_flags & BIOSParameterBlock::EXT_FLAGS_ACTIVE_FAT);
            if index >= fat_count {
                return Err(FatError::CorruptVolume("active FAT index out of range"));
            }
            Some(index)
        } else {
            None
        };

        // FAT12 and FAT16 use the 16 bit FAT size and a fixed root directory.
        if bpb.sectors_per_fat.get() != 0 || bpb.sectors_per_fat_large.get() == 0 {
            return Err(FatError::CorruptVolume("not a FAT32 volume"));
        }
        if bpb.root_dir_entries.get() != 0 {
            return Err(FatError::CorruptVolume("FAT32 volume with a fixed root directory"));
        }

        let bytes_per_cluster = bytes_per_sector * sectors_per_cluster;
        let fat_offset = usize::from(bpb.reserved_sectors.get()) * bytes_per_sector;
        let fat_size = bpb.sectors_per_fat_large.get() as usize * bytes_per_sector;
        let data_offset = fat_offset + fat_count * fat_size;

        // The number of clusters is bounded by the declared sector count, by
        // how many entries one FAT copy holds, and by the bytes we were given.
        let data_sectors = (bpb.total_sector_count() as usize)
            .saturating_sub(data_offset / bytes_per_sector);
        let declared_clusters = data_sectors / sectors_per_cluster;
        let indexable_clusters = (fat_size / 4).saturating_sub(2);
        let present_clusters = image.len().saturating_sub(data_offset) / bytes_per_cluster;
        if present_clusters < declared_clusters.min(indexable_clusters) {
            log::warn!(
                "volume image holds {present_clusters} clusters but the BPB declares {declared_clusters}"
            );
        }
        let cluster_count = declared_clusters
            .min(indexable_clusters)
            .min(present_clusters)
            .min(ClusterNumber::MAX_DATA_CLUSTERS);
        if cluster_count == 0 {
            return Err(FatError::CorruptVolume("volume has no data clusters"));
        }
        let cluster_count = cluster_count as u32;

        let root_cluster = ClusterNumber(bpb.root_cluster.get());
        if root_cluster.0 < ClusterNumber::FIRST_DATA.0 || root_cluster.0 >= cluster_count + 2 {
            return Err(FatError::CorruptVolume("root cluster outside the data region"));
        }

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster,
            fat_offset,
            fat_size,
            fat_count,
            active_fat,
            data_offset,
            cluster_count,
            root_cluster,
        })
    }

    /// Number of 32 byte directory entries that fit in one cluster.
    pub fn entries_per_cluster(&self) -> usize {
        self.bytes_per_cluster / crate::directory::DIRECTORY_ENTRY_SIZE
    }

    /// One past the highest valid cluster number.
    pub fn cluster_limit(&self) -> u32 {
        self.cluster_count + 2
    }
}
