use core::fmt;

/// Everything that can go wrong while operating on a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    /// A path component does not exist.
    NotFound,

    /// The operation needs a regular file but the path names a directory.
    IsDirectory,

    /// The operation needs a directory but the path names a regular file.
    NotDirectory,

    /// An entry with the requested name is already present.
    AlreadyExists,

    /// No free cluster was left to satisfy an allocation.
    NoSpace,

    /// The name cannot be encoded as an 8.3 short name.
    InvalidName,

    /// The image does not describe a FAT32 volume we can mount.
    CorruptVolume(&'static str),
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::IsDirectory => write!(f, "is a directory"),
            Self::NotDirectory => write!(f, "not a directory"),
            Self::AlreadyExists => write!(f, "file exists"),
            Self::NoSpace => write!(f, "no space left on volume"),
            Self::InvalidName => write!(f, "invalid 8.3 file name"),
            Self::CorruptVolume(reason) => write!(f, "corrupt volume: {reason}"),
        }
    }
}
