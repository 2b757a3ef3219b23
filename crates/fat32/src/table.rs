//! The file allocation table: one 32 bit link per cluster, forming singly
//! linked chains.
//!
//! The table in the image is the only record of which clusters are in use.
//! Free clusters are found by a first-fit linear scan, so placement is
//! deterministic for a given image.

use zerocopy::byteorder::{LittleEndian, U32};

use crate::error::FatError;
use crate::transmute::{try_cast_bytes_ref_mut_offset, try_cast_bytes_ref_offset};
use crate::volume::Volume;

/// Number of a cluster in the data region. Clusters 0 and 1 are reserved, so
/// the first data cluster is 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterNumber(pub u32);

impl ClusterNumber {
    pub const FIRST_DATA: Self = Self(2);

    /// The largest cluster number FAT32 can express is `0x0FFFFFF6`.
    pub(crate) const MAX_DATA_CLUSTERS: usize = 0x0FFF_FFF5;

    /// Directory entries store 0 for "no cluster allocated".
    pub fn from_entry(raw: u32) -> Option<Self> {
        (raw >= Self::FIRST_DATA.0).then_some(Self(raw))
    }
}

/// Value written to terminate a chain.
pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// Every value at or above this marks the end of a chain.
const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;

const BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// Only the low 28 bits of an entry are the link. The top 4 bits are reserved
/// and must be preserved on writes.
const ENTRY_MASK: u32 = 0x0FFF_FFFF;

const FAT_ENTRY_SIZE: usize = 4;

pub fn is_end_of_chain(value: u32) -> bool {
    value & ENTRY_MASK >= END_OF_CHAIN_MIN
}

/// Decoded meaning of a FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Next(ClusterNumber),
    EndOfChain,

    /// Reserved values, bad cluster markers, and links that point outside the
    /// data region.
    Invalid(u32),
}

impl FatEntry {
    fn decode(raw: u32, cluster_limit: u32) -> Self {
        let value = raw & ENTRY_MASK;
        match value {
            0 => Self::Free,
            _ if is_end_of_chain(value) => Self::EndOfChain,
            BAD_CLUSTER => Self::Invalid(value),
            _ if value >= ClusterNumber::FIRST_DATA.0 && value < cluster_limit => {
                Self::Next(ClusterNumber(value))
            }
            _ => Self::Invalid(value),
        }
    }
}

/// Clusters linked by a single allocation call, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRun {
    pub first: ClusterNumber,
    pub last: ClusterNumber,

    /// How many clusters were linked. May be less than requested when the
    /// volume ran out of free clusters.
    pub count: usize,
}

impl<'a> Volume<'a> {
    fn fat_entry_offset(&self, copy: usize, cluster: ClusterNumber) -> usize {
        self.params.fat_offset
            + copy * self.params.fat_size
            + cluster.0 as usize * FAT_ENTRY_SIZE
    }

    fn raw_fat_entry(&self, cluster: ClusterNumber) -> u32 {
        let offset = self.fat_entry_offset(self.params.active_fat.unwrap_or(0), cluster);
        let entry: &U32<LittleEndian> = try_cast_bytes_ref_offset(&*self.image, offset)
            .expect("INTERNAL ERROR: FAT entry outside the volume image");
        entry.get() & ENTRY_MASK
    }

    /// Reads the entry for `cluster` from the active FAT, which is the first
    /// one unless the volume selects another.
    pub fn fat_entry(&self, cluster: ClusterNumber) -> FatEntry {
        FatEntry::decode(self.raw_fat_entry(cluster), self.params.cluster_limit())
    }

    fn set_fat_entry(&mut self, cluster: ClusterNumber, value: u32) {
        let copies = match self.params.active_fat {
            Some(active) => active..active + 1,
            None if self.options.mirror_fats => 0..self.params.fat_count,
            None => 0..1,
        };
        for copy in copies {
            let offset = self.fat_entry_offset(copy, cluster);
            let entry: &mut U32<LittleEndian> =
                try_cast_bytes_ref_mut_offset(&mut *self.image, offset)
                    .expect("INTERNAL ERROR: FAT entry outside the volume image");
            let reserved = entry.get() & !ENTRY_MASK;
            entry.set(reserved | (value & ENTRY_MASK));
        }
    }

    /// Returns the cluster after `cluster` in its chain, or `None` at the end
    /// of the chain. A free or invalid link is treated as the end of the chain
    /// so traversal over a damaged table still terminates.
    pub fn next_cluster(&self, cluster: ClusterNumber) -> Option<ClusterNumber> {
        match self.fat_entry(cluster) {
            FatEntry::Next(next) => Some(next),
            FatEntry::EndOfChain => None,
            entry @ (FatEntry::Free | FatEntry::Invalid(_)) => {
                log::warn!(
                    "cluster chain broken at cluster {}: {entry:?}, treating as end of chain",
                    cluster.0
                );
                None
            }
        }
    }

    /// Iterates over the chain starting at `start`, `start` included.
    pub fn chain(&self, start: ClusterNumber) -> ClusterChain<'_, 'a> {
        ClusterChain {
            volume: self,
            next: self.is_data_cluster(start).then_some(start),
            remaining: self.params.cluster_count,
        }
    }

    pub fn chain_len(&self, start: ClusterNumber) -> usize {
        self.chain(start).count()
    }

    /// The final cluster of the chain containing `cluster`.
    pub fn last_cluster(&self, cluster: ClusterNumber) -> ClusterNumber {
        self.chain(cluster).last().unwrap_or(cluster)
    }

    fn find_free_cluster(&self, from: u32) -> Option<ClusterNumber> {
        (from..self.params.cluster_limit())
            .map(ClusterNumber)
            .find(|&cluster| self.raw_fat_entry(cluster) == 0)
    }

    /// Appends up to `n` free clusters to the chain that contains `tail`.
    ///
    /// New clusters are taken first-fit in ascending order and zero filled. If
    /// fewer than `n` clusters are free, the ones found are still linked and
    /// the returned run reports the shorter count. Returns `NoSpace`, without
    /// touching the volume, if no cluster is free at all.
    pub fn extend_cluster_chain(
        &mut self,
        tail: ClusterNumber,
        n: usize,
    ) -> Result<ClusterRun, FatError> {
        assert!(
            self.is_data_cluster(tail),
            "cluster {} is not a data cluster",
            tail.0
        );
        let tail = self.last_cluster(tail);
        self.link_free_clusters(Some(tail), n)
    }

    /// Allocates a new chain of up to `n` clusters. Same short-allocation
    /// rules as [`Volume::extend_cluster_chain`].
    pub fn allocate_cluster_chain(&mut self, n: usize) -> Result<ClusterRun, FatError> {
        self.link_free_clusters(None, n)
    }

    fn link_free_clusters(
        &mut self,
        tail: Option<ClusterNumber>,
        n: usize,
    ) -> Result<ClusterRun, FatError> {
        assert!(n > 0, "cannot allocate 0 clusters");

        let mut current = tail;
        let mut first = None;
        let mut count = 0;
        let mut candidate = ClusterNumber::FIRST_DATA.0;
        while count < n {
            let Some(free) = self.find_free_cluster(candidate) else {
                break;
            };
            candidate = free.0 + 1;

            // Claim the cluster before linking it, so the chain always ends
            // in an end-of-chain marker.
            self.cluster_bytes_mut(free).fill(0);
            self.set_fat_entry(free, END_OF_CHAIN);
            if let Some(previous) = current {
                self.set_fat_entry(previous, free.0);
            }

            first.get_or_insert(free);
            current = Some(free);
            count += 1;
        }

        let (Some(first), Some(last)) = (first, current) else {
            log::warn!("no free cluster left for an allocation of {n} clusters");
            return Err(FatError::NoSpace);
        };
        if count < n {
            log::warn!("short cluster allocation: wanted {n} clusters, got {count}");
        }
        log::debug!(
            "allocated {count} clusters {}..={} after {:?}",
            first.0,
            last.0,
            tail.map(|cluster| cluster.0)
        );

        self.stats.chain_allocations += 1;
        self.stats.clusters_allocated += count;
        Ok(ClusterRun { first, last, count })
    }
}

/// Iterator over the clusters of a chain. Stops after as many steps as the
/// volume has clusters, so a cycle in a corrupted table cannot hang it.
#[derive(Debug)]
pub struct ClusterChain<'v, 'a> {
    volume: &'v Volume<'a>,
    next: Option<ClusterNumber>,
    remaining: u32,
}

impl Iterator for ClusterChain<'_, '_> {
    type Item = ClusterNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.next?;
        if self.remaining == 0 {
            log::warn!("cluster chain loops back on itself at cluster {}", cluster.0);
            self.next = None;
            return None;
        }
        self.remaining -= 1;
        self.next = self.volume.next_cluster(cluster);
        Some(cluster)
    }
}
