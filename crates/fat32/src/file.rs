//! File descriptors over directory entries.

use core::convert::Infallible;

use crate::directory::{DirectoryEntry, EntryLocation};
use crate::error::FatError;
use crate::fd::FileDescriptor;
use crate::table::ClusterNumber;
use crate::volume::Volume;

/// Largest size a FAT32 directory entry can record.
const MAX_FILE_SIZE: usize = u32::MAX as usize;

/// Position of a sequential cursor within a cluster chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// No cluster has been touched yet. The first transfer starts at the
    /// entry's first cluster, which may not be allocated yet.
    Unstarted,

    /// The next byte is at `offset` within `cluster`. An offset equal to the
    /// cluster size means the cluster is used up and the chain has to be
    /// followed before the next transfer.
    Positioned { cluster: ClusterNumber, offset: usize },

    /// The chain ended before the recorded size. Terminal for reads.
    EndOfChain,
}

/// An open regular file: an entry in the volume plus independent read and
/// write cursors.
#[derive(Debug)]
pub struct FatFileDescriptor<'v, 'a> {
    volume: &'v mut Volume<'a>,
    location: EntryLocation,
    read_pos: usize,
    read: Cursor,
    write_pos: usize,
    write: Cursor,
}

impl<'v, 'a> FatFileDescriptor<'v, 'a> {
    pub fn new(volume: &'v mut Volume<'a>, location: EntryLocation) -> Self {
        Self {
            volume,
            location,
            read_pos: 0,
            read: Cursor::Unstarted,
            write_pos: 0,
            write: Cursor::Unstarted,
        }
    }

    pub fn location(&self) -> EntryLocation {
        self.location
    }

    pub fn entry(&self) -> &DirectoryEntry {
        self.volume.entry(self.location)
    }

    /// `Ok(None)` when no cluster is allocated yet.
    fn first_cluster(&self) -> Result<Option<ClusterNumber>, FatError> {
        match ClusterNumber::from_entry(self.entry().first_cluster()) {
            Some(cluster) if !self.volume.is_data_cluster(cluster) => Err(
                FatError::CorruptVolume("first cluster of entry outside the data region"),
            ),
            first => Ok(first),
        }
    }

    fn clusters_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.volume.bytes_per_cluster())
    }

    /// Where the next read transfer starts, following the chain if the
    /// current cluster is used up. `None` when there is nothing to read.
    fn next_read_position(&mut self) -> Option<(ClusterNumber, usize)> {
        let bytes_per_cluster = self.volume.bytes_per_cluster();
        match self.read {
            Cursor::Unstarted => match self.first_cluster() {
                Ok(Some(first)) => return Some((first, 0)),
                Ok(None) => log::warn!(
                    "entry at {:#x} records {} bytes but has no clusters",
                    self.location.offset(),
                    self.size()
                ),
                Err(err) => log::warn!("entry at {:#x}: {err}", self.location.offset()),
            },
            Cursor::Positioned { cluster, offset } if offset == bytes_per_cluster => {
                if let Some(next) = self.volume.next_cluster(cluster) {
                    return Some((next, 0));
                }
                log::warn!(
                    "chain of entry at {:#x} ends before its recorded size of {} bytes",
                    self.location.offset(),
                    self.size()
                );
            }
            Cursor::Positioned { cluster, offset } => return Some((cluster, offset)),
            Cursor::EndOfChain => return None,
        }
        self.read = Cursor::EndOfChain;
        None
    }

    /// Where the next write transfer starts. Allocates the first chain or
    /// extends the current one by enough clusters to hold `remaining` bytes
    /// when the cursor is at the end of the chain.
    fn next_write_position(
        &mut self,
        remaining: usize,
    ) -> Result<(ClusterNumber, usize), FatError> {
        let bytes_per_cluster = self.volume.bytes_per_cluster();
        match self.write {
            Cursor::Unstarted => {
                if let Some(first) = self.first_cluster()? {
                    return Ok((first, 0));
                }
                let clusters = self.clusters_for(remaining);
                let run = self.volume.allocate_cluster_chain(clusters)?;
                self.volume
                    .entry_mut(self.location)
                    .set_first_cluster(run.first.0);
                Ok((run.first, 0))
            }
            Cursor::Positioned { cluster, offset } if offset == bytes_per_cluster => {
                if let Some(next) = self.volume.next_cluster(cluster) {
                    return Ok((next, 0));
                }
                // Continue in the first of the new clusters, not the last.
                let clusters = self.clusters_for(remaining);
                let run = self.volume.extend_cluster_chain(cluster, clusters)?;
                Ok((run.first, 0))
            }
            Cursor::Positioned { cluster, offset } => Ok((cluster, offset)),
            Cursor::EndOfChain => unreachable!("write cursor never ends"),
        }
    }
}

impl FileDescriptor for FatFileDescriptor<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.size().saturating_sub(self.read_pos));
        let bytes_per_cluster = self.volume.bytes_per_cluster();

        let mut total = 0;
        while total < len {
            let Some((cluster, offset)) = self.next_read_position() else {
                break;
            };
            let n = (bytes_per_cluster - offset).min(len - total);
            buf[total..total + n]
                .copy_from_slice(&self.volume.cluster_bytes(cluster)[offset..offset + n]);
            total += n;
            self.read = Cursor::Positioned {
                cluster,
                offset: offset + n,
            };
        }

        self.read_pos += total;
        total
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let len = buf.len().min(MAX_FILE_SIZE.saturating_sub(self.write_pos));
        if len < buf.len() {
            log::warn!(
                "write of {} bytes clamped to {len} bytes at the FAT32 file size limit",
                buf.len()
            );
        }
        let bytes_per_cluster = self.volume.bytes_per_cluster();

        let mut total = 0;
        while total < len {
            let (cluster, offset) = match self.next_write_position(len - total) {
                Ok(position) => position,
                Err(err) => {
                    log::warn!("short write of {total} of {len} bytes: {err}");
                    break;
                }
            };
            let n = (bytes_per_cluster - offset).min(len - total);
            self.volume.cluster_bytes_mut(cluster)[offset..offset + n]
                .copy_from_slice(&buf[total..total + n]);
            total += n;
            self.write = Cursor::Positioned {
                cluster,
                offset: offset + n,
            };
        }

        self.write_pos += total;
        if self.write_pos > self.size() {
            // Fits: `write_pos` is clamped to `MAX_FILE_SIZE` above.
            let size = self.write_pos as u32;
            self.volume.entry_mut(self.location).file_size.set(size);
        }
        total
    }

    fn size(&self) -> usize {
        self.entry().file_size() as usize
    }

    fn load(&mut self, buf: &mut [u8], offset: usize) -> usize {
        self.volume.read_at(self.location, offset, buf)
    }
}

impl genio::Read for FatFileDescriptor<'_, '_> {
    type ReadError = Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::ReadError> {
        Ok(FileDescriptor::read(self, buf))
    }
}

impl<'a> Volume<'a> {
    /// Opens the regular file at `path`.
    pub fn open(&mut self, path: &str) -> Result<FatFileDescriptor<'_, 'a>, FatError> {
        let location = self.open_entry(path)?;
        Ok(FatFileDescriptor::new(self, location))
    }

    /// Copies file bytes starting at `offset` into `buf`, walking the chain
    /// from the first cluster. Returns the number of bytes copied, which is
    /// short at the end of the file or of the chain.
    pub fn read_at(&self, location: EntryLocation, offset: usize, buf: &mut [u8]) -> usize {
        let entry = self.entry(location);
        let size = entry.file_size() as usize;
        if offset >= size {
            return 0;
        }
        let len = buf.len().min(size - offset);
        let Some(first) = ClusterNumber::from_entry(entry.first_cluster())
            .filter(|&cluster| self.is_data_cluster(cluster))
        else {
            return 0;
        };

        let bytes_per_cluster = self.params.bytes_per_cluster;
        let mut clusters = self.chain(first).skip(offset / bytes_per_cluster);
        let mut cluster_offset = offset % bytes_per_cluster;
        let mut total = 0;
        while total < len {
            let Some(cluster) = clusters.next() else {
                break;
            };
            let n = (bytes_per_cluster - cluster_offset).min(len - total);
            buf[total..total + n]
                .copy_from_slice(&self.cluster_bytes(cluster)[cluster_offset..cluster_offset + n]);
            total += n;
            cluster_offset = 0;
        }
        total
    }

    /// Loads a whole file into `buf`, or as much of it as fits.
    pub fn load_file(&self, location: EntryLocation, buf: &mut [u8]) -> usize {
        self.read_at(location, 0, buf)
    }
}
