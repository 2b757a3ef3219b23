//! Directory entry allocation and file creation.

use zerocopy::AsBytes;

use crate::directory::{Attributes, EntryLocation};
use crate::error::FatError;
use crate::name::ShortName;
use crate::table::ClusterNumber;
use crate::volume::Volume;

impl<'a> Volume<'a> {
    /// Returns the first free slot of the directory at `dir`, growing the
    /// directory by one cluster when every slot is taken. Directories never
    /// shrink, so the new cluster stays part of the directory for good.
    pub fn allocate_entry(&mut self, dir: ClusterNumber) -> Result<EntryLocation, FatError> {
        if !self.is_data_cluster(dir) {
            log::warn!("directory cluster {} is outside the data region", dir.0);
            return Err(FatError::CorruptVolume(
                "directory cluster outside the data region",
            ));
        }

        let free = self
            .directory_slots(dir)
            .find(|&location| self.entry(location).is_free());
        if let Some(location) = free {
            return Ok(location);
        }

        // New clusters are zero filled, so every slot in it starts out as an
        // end marker.
        let run = self.extend_cluster_chain(dir, 1)?;
        log::debug!(
            "directory at cluster {} grown by cluster {}",
            dir.0,
            run.first.0
        );
        let location = self
            .directory_slots(run.first)
            .next()
            .expect("INTERNAL ERROR: freshly allocated cluster has no slots");
        Ok(location)
    }

    /// Creates an empty regular file at `path`. No cluster is allocated until
    /// the first write.
    pub fn create_file(&mut self, path: &str) -> Result<EntryLocation, FatError> {
        if path.ends_with('/') {
            return Err(FatError::IsDirectory);
        }

        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        let dir = self
            .open_directory(parent)
            .map_err(|_| FatError::NotFound)?;

        let short_name = ShortName::parse(name)?;
        if self.find_in_directory(dir, name).is_some() {
            return Err(FatError::AlreadyExists);
        }

        let location = self.allocate_entry(dir)?;
        let entry = self.entry_mut(location);
        entry.as_bytes_mut().fill(0);
        entry.name = short_name;
        entry.attr = Attributes::ARCHIVE;
        log::debug!(
            "created {short_name} in directory at cluster {} (slot {:#x})",
            dir.0,
            location.offset()
        );
        Ok(location)
    }
}
