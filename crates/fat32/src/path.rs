//! Resolution of `/` separated paths to directory entries.

use crate::directory::EntryLocation;
use crate::error::FatError;
use crate::table::ClusterNumber;
use crate::volume::Volume;

/// What a path resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTarget {
    /// A file or directory that has its own directory entry.
    Entry(EntryLocation),

    /// A directory without an entry of its own: the root, or the directory
    /// the lookup started in when the path has no components.
    Directory(ClusterNumber),
}

/// Result of [`Volume::find_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub target: Option<PathTarget>,

    /// Whether a `/` followed the last component that was looked at. For a
    /// successful lookup this means the path had a trailing slash; when a
    /// regular file was used as a directory it is always set.
    pub trailing_slash: bool,
}

impl Lookup {
    fn found(target: PathTarget, trailing_slash: bool) -> Self {
        Self {
            target: Some(target),
            trailing_slash,
        }
    }
}

impl<'a> Volume<'a> {
    /// Resolves `path` component by component, starting at `start` (the root
    /// when `None`). A leading `/` always starts at the root, and empty
    /// components are ignored.
    ///
    /// Resolution stops early at a component that names a regular file;
    /// that entry is returned with `trailing_slash` set so the caller can
    /// tell it was used as a directory.
    pub fn find_file(&self, path: &str, start: Option<ClusterNumber>) -> Lookup {
        let mut dir = match (path.starts_with('/'), start) {
            (false, Some(start)) => start,
            _ => self.params.root_cluster,
        };

        let mut rest = path.trim_start_matches('/');
        while !rest.is_empty() {
            let (name, remainder, slash) = match rest.split_once('/') {
                Some((name, remainder)) => (name, remainder.trim_start_matches('/'), true),
                None => (rest, "", false),
            };

            let Some(location) = self.find_in_directory(dir, name) else {
                return Lookup {
                    target: None,
                    trailing_slash: slash,
                };
            };

            let entry = self.entry(location);
            if remainder.is_empty() || !entry.is_directory() {
                return Lookup::found(PathTarget::Entry(location), slash);
            }
            dir = self.directory_cluster(entry);
            rest = remainder;
        }

        Lookup::found(PathTarget::Directory(dir), false)
    }

    /// Resolves `path` to the entry of a regular file.
    pub fn open_entry(&self, path: &str) -> Result<EntryLocation, FatError> {
        let lookup = self.find_file(path, None);
        match lookup.target {
            None => Err(FatError::NotFound),
            Some(PathTarget::Directory(_)) => Err(FatError::IsDirectory),
            Some(PathTarget::Entry(location)) => {
                if self.entry(location).is_directory() {
                    Err(FatError::IsDirectory)
                } else if lookup.trailing_slash {
                    Err(FatError::NotDirectory)
                } else {
                    Ok(location)
                }
            }
        }
    }

    /// Resolves `path` to the first cluster of a directory.
    pub fn open_directory(&self, path: &str) -> Result<ClusterNumber, FatError> {
        match self.find_file(path, None).target {
            None => Err(FatError::NotFound),
            Some(PathTarget::Directory(cluster)) => Ok(cluster),
            Some(PathTarget::Entry(location)) => {
                let entry = self.entry(location);
                if entry.is_directory() {
                    Ok(self.directory_cluster(entry))
                } else {
                    Err(FatError::NotDirectory)
                }
            }
        }
    }
}
