use core::fmt;

use crate::boot::{MountOptions, VolumeParameters};
use crate::directory::{DirectoryEntry, EntryLocation};
use crate::error::FatError;
use crate::table::ClusterNumber;
use crate::transmute::{try_cast_bytes_ref_mut_offset, try_cast_bytes_ref_offset};

/// A mounted FAT32 volume. Holds a non-owning view of the volume image and the
/// geometry derived from its boot sector.
///
/// All state lives in the image itself, so two volumes mounted over two
/// different images are completely independent.
pub struct Volume<'a> {
    pub(crate) image: &'a mut [u8],
    pub(crate) params: VolumeParameters,
    pub(crate) options: MountOptions,
    pub(crate) stats: VolumeStats,
}

impl fmt::Debug for Volume<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("image_len", &self.image.len())
            .field("params", &self.params)
            .field("options", &self.options)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Counters for allocation activity since the volume was mounted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    /// Calls to `allocate_cluster_chain` and `extend_cluster_chain` that
    /// allocated at least one cluster.
    pub chain_allocations: usize,
    pub clusters_allocated: usize,
}

impl<'a> Volume<'a> {
    pub fn mount(image: &'a mut [u8]) -> Result<Self, FatError> {
        Self::mount_with(image, MountOptions::default())
    }

    pub fn mount_with(image: &'a mut [u8], options: MountOptions) -> Result<Self, FatError> {
        let params = VolumeParameters::parse(&*image)?;
        log::debug!(
            "mounted FAT32 volume: {} bytes/cluster, {} clusters, {} FATs at {:#x}, data at {:#x}, root cluster {}",
            params.bytes_per_cluster,
            params.cluster_count,
            params.fat_count,
            params.fat_offset,
            params.data_offset,
            params.root_cluster.0,
        );
        Ok(Self {
            image,
            params,
            options,
            stats: VolumeStats::default(),
        })
    }

    /// Mounts the volume image the boot loader placed at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for `'a`, and
    /// nothing else may access that memory while the volume is alive.
    pub unsafe fn from_raw_parts(
        ptr: *mut u8,
        len: usize,
        options: MountOptions,
    ) -> Result<Self, FatError> {
        let image = core::slice::from_raw_parts_mut(ptr, len);
        Self::mount_with(image, options)
    }

    pub fn params(&self) -> &VolumeParameters {
        &self.params
    }

    pub fn stats(&self) -> VolumeStats {
        self.stats
    }

    pub fn root_cluster(&self) -> ClusterNumber {
        self.params.root_cluster
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.params.bytes_per_cluster
    }

    /// The whole volume image.
    pub fn image(&self) -> &[u8] {
        &*self.image
    }

    /// Byte offset of the first byte of `cluster` within the image:
    ///
    /// ```text
    /// data_offset + (cluster - 2) * bytes_per_cluster
    /// ```
    ///
    /// Clusters 0 and 1 are reserved and have no data, so passing them is a
    /// bug in the caller.
    pub fn cluster_offset(&self, cluster: ClusterNumber) -> usize {
        assert!(
            self.is_data_cluster(cluster),
            "cluster {} is not a data cluster",
            cluster.0
        );
        self.params.data_offset
            + (cluster.0 - ClusterNumber::FIRST_DATA.0) as usize * self.params.bytes_per_cluster
    }

    /// Absolute memory address of the first byte of `cluster`.
    pub fn cluster_address(&self, cluster: ClusterNumber) -> *const u8 {
        self.image[self.cluster_offset(cluster)..].as_ptr()
    }

    pub fn cluster_bytes(&self, cluster: ClusterNumber) -> &[u8] {
        let start = self.cluster_offset(cluster);
        &self.image[start..start + self.params.bytes_per_cluster]
    }

    pub fn cluster_bytes_mut(&mut self, cluster: ClusterNumber) -> &mut [u8] {
        let start = self.cluster_offset(cluster);
        let end = start + self.params.bytes_per_cluster;
        &mut self.image[start..end]
    }

    pub(crate) fn is_data_cluster(&self, cluster: ClusterNumber) -> bool {
        cluster.0 >= ClusterNumber::FIRST_DATA.0 && cluster.0 < self.params.cluster_limit()
    }

    /// The directory entry stored at `location`.
    pub fn entry(&self, location: EntryLocation) -> &DirectoryEntry {
        // Invariant: locations are only handed out for slots inside the
        // data region of this volume.
        try_cast_bytes_ref_offset(&*self.image, location.offset())
            .expect("INTERNAL ERROR: directory entry location outside the volume image")
    }

    pub fn entry_mut(&mut self, location: EntryLocation) -> &mut DirectoryEntry {
        try_cast_bytes_ref_mut_offset(&mut *self.image, location.offset())
            .expect("INTERNAL ERROR: directory entry location outside the volume image")
    }
}
