//! Synthetic FAT32 images for tests.
//!
//! The builder writes the on-disk structures by hand rather than through the
//! driver, so tests compare the driver against an independent description of
//! the format. Geometry is tiny (512 byte sectors, a few hundred clusters) so
//! every test can afford a fresh image.

use crate::table::END_OF_CHAIN;

const BYTES_PER_SECTOR: usize = 512;
const FAT_COUNT: usize = 2;
const ENTRY_SIZE: usize = 32;

pub(crate) struct ImageBuilder {
    sectors_per_cluster: u8,
    clusters: u32,
}

impl ImageBuilder {
    pub(crate) const RESERVED_SECTORS: usize = 32;
    pub(crate) const DEFAULT_CLUSTERS: u32 = 512;

    pub(crate) fn new() -> Self {
        Self {
            sectors_per_cluster: 1,
            clusters: Self::DEFAULT_CLUSTERS,
        }
    }

    pub(crate) fn sectors_per_cluster(mut self, sectors_per_cluster: u8) -> Self {
        self.sectors_per_cluster = sectors_per_cluster;
        self
    }

    pub(crate) fn clusters(mut self, clusters: u32) -> Self {
        self.clusters = clusters;
        self
    }

    /// Formats an image whose root directory is the single cluster 2.
    pub(crate) fn build(self) -> TestImage {
        let sectors_per_cluster = usize::from(self.sectors_per_cluster);
        let clusters = self.clusters as usize;
        let fat_sectors = ((clusters + 2) * 4).div_ceil(BYTES_PER_SECTOR);
        let total_sectors =
            Self::RESERVED_SECTORS + FAT_COUNT * fat_sectors + clusters * sectors_per_cluster;
        let mut bytes = vec![0u8; total_sectors * BYTES_PER_SECTOR];

        let bpb = &mut bytes[..BYTES_PER_SECTOR];
        bpb[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bpb[3..11].copy_from_slice(b"MSWIN4.1");
        bpb[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        bpb[13] = self.sectors_per_cluster;
        bpb[14..16].copy_from_slice(&(Self::RESERVED_SECTORS as u16).to_le_bytes());
        bpb[16] = FAT_COUNT as u8;
        bpb[21] = 0xF8;
        bpb[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes());
        bpb[36..40].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
        bpb[44..48].copy_from_slice(&2u32.to_le_bytes());
        bpb[48..50].copy_from_slice(&1u16.to_le_bytes());
        bpb[50..52].copy_from_slice(&6u16.to_le_bytes());
        bpb[66] = 0x29;
        bpb[71..82].copy_from_slice(b"NO NAME    ");
        bpb[82..90].copy_from_slice(b"FAT32   ");
        bpb[510] = 0x55;
        bpb[511] = 0xAA;

        let mut image = TestImage {
            bytes,
            bytes_per_cluster: BYTES_PER_SECTOR * sectors_per_cluster,
            fat_offset: Self::RESERVED_SECTORS * BYTES_PER_SECTOR,
            fat_size: fat_sectors * BYTES_PER_SECTOR,
            data_offset: (Self::RESERVED_SECTORS + FAT_COUNT * fat_sectors) * BYTES_PER_SECTOR,
            next_free: 3,
        };
        image.set_fat(0, 0x0FFF_FFF8);
        image.set_fat(1, END_OF_CHAIN);
        image.set_fat(2, END_OF_CHAIN);
        image
    }
}

/// A formatted image plus the bookkeeping needed to populate it.
pub(crate) struct TestImage {
    pub(crate) bytes: Vec<u8>,
    bytes_per_cluster: usize,
    fat_offset: usize,
    fat_size: usize,
    data_offset: usize,
    next_free: u32,
}

impl TestImage {
    pub(crate) const ROOT: u32 = 2;

    pub(crate) fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_cluster
    }

    pub(crate) fn cluster_offset(&self, cluster: u32) -> usize {
        self.data_offset + (cluster as usize - 2) * self.bytes_per_cluster
    }

    /// Writes a raw value to entry `cluster` of every FAT copy.
    pub(crate) fn set_fat(&mut self, cluster: u32, value: u32) {
        for copy in 0..FAT_COUNT {
            self.set_fat_copy(copy, cluster, value);
        }
    }

    pub(crate) fn set_fat_copy(&mut self, copy: usize, cluster: u32, value: u32) {
        let offset = self.fat_offset + copy * self.fat_size + cluster as usize * 4;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn fat_copy(&self, copy: usize, cluster: u32) -> u32 {
        let offset = self.fat_offset + copy * self.fat_size + cluster as usize * 4;
        u32::from_le_bytes(self.bytes[offset..offset + 4].try_into().unwrap())
    }

    /// Reserves `n` consecutive clusters after everything allocated so far and
    /// links them into a chain.
    pub(crate) fn alloc_chain(&mut self, n: usize) -> Vec<u32> {
        let chain: Vec<u32> = (self.next_free..self.next_free + n as u32).collect();
        self.next_free += n as u32;
        for pair in chain.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        self.set_fat(*chain.last().unwrap(), END_OF_CHAIN);
        chain
    }

    /// Clusters of the chain starting at `start`, read from the first FAT.
    pub(crate) fn chain(&self, start: u32) -> Vec<u32> {
        let mut chain = vec![start];
        loop {
            let next = self.fat_copy(0, *chain.last().unwrap()) & 0x0FFF_FFFF;
            if next >= 0x0FFF_FFF8 {
                return chain;
            }
            chain.push(next);
        }
    }

    /// Writes a raw 32 byte entry into the first slot of `dir` whose first
    /// name byte is 0x00. Returns the byte offset of the slot.
    pub(crate) fn put_entry(
        &mut self,
        dir: u32,
        name: &[u8; 11],
        attr: u8,
        cluster: u32,
        size: u32,
    ) -> usize {
        let offset = self
            .chain(dir)
            .into_iter()
            .flat_map(|cluster| {
                let start = self.cluster_offset(cluster);
                (0..self.bytes_per_cluster / ENTRY_SIZE).map(move |i| start + i * ENTRY_SIZE)
            })
            .find(|&offset| self.bytes[offset] == 0)
            .expect("test directory is full");

        let slot = &mut self.bytes[offset..offset + ENTRY_SIZE];
        slot.fill(0);
        slot[0..11].copy_from_slice(name);
        slot[11] = attr;
        slot[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        slot[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
        slot[28..32].copy_from_slice(&size.to_le_bytes());
        offset
    }

    /// Adds a regular file to `dir`, storing `contents` in a fresh chain.
    /// Returns the first cluster, or 0 for empty contents.
    pub(crate) fn add_file(&mut self, dir: u32, name: &[u8; 11], contents: &[u8]) -> u32 {
        let first = if contents.is_empty() {
            0
        } else {
            let chain = self.alloc_chain(contents.len().div_ceil(self.bytes_per_cluster));
            for (cluster, chunk) in chain.iter().zip(contents.chunks(self.bytes_per_cluster)) {
                let offset = self.cluster_offset(*cluster);
                self.bytes[offset..offset + chunk.len()].copy_from_slice(chunk);
            }
            chain[0]
        };
        self.put_entry(dir, name, 0x20, first, contents.len() as u32);
        first
    }

    /// Adds a one cluster subdirectory with `.` and `..` entries.
    pub(crate) fn add_dir(&mut self, parent: u32, name: &[u8; 11]) -> u32 {
        let cluster = self.alloc_chain(1)[0];
        self.put_entry(parent, name, 0x10, cluster, 0);
        let parent_link = if parent == Self::ROOT { 0 } else { parent };
        self.put_entry(cluster, b".          ", 0x10, cluster, 0);
        self.put_entry(cluster, b"..         ", 0x10, parent_link, 0);
        cluster
    }

    /// Fills every remaining free slot of `dir` with empty files named
    /// `F0000000.DAT`, `F0000001.DAT`, ...
    pub(crate) fn fill_dir(&mut self, dir: u32) {
        let mut index = 0;
        loop {
            let has_free = self.chain(dir).into_iter().any(|cluster| {
                let start = self.cluster_offset(cluster);
                (0..self.bytes_per_cluster / ENTRY_SIZE)
                    .any(|i| self.bytes[start + i * ENTRY_SIZE] == 0)
            });
            if !has_free {
                return;
            }
            let mut name = *b"F0000000DAT";
            let digits = format!("{index:07}");
            name[1..8].copy_from_slice(digits.as_bytes());
            self.put_entry(dir, &name, 0x20, 0, 0);
            index += 1;
        }
    }

    /// Marks the slot at `offset` as deleted.
    pub(crate) fn delete_entry(&mut self, offset: usize) {
        self.bytes[offset] = 0xE5;
    }
}
