use bitflags::bitflags;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::name::ShortName;
use crate::table::{ClusterChain, ClusterNumber};
use crate::volume::Volume;

pub const DIRECTORY_ENTRY_SIZE: usize = 32;

/// A 32 byte short-name directory entry.
///
/// See <https://wiki.osdev.org/FAT#Standard_8.3_format>
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct DirectoryEntry {
    pub name: ShortName,
    pub attr: Attributes,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: U16<LittleEndian>,
    pub create_date: U16<LittleEndian>,
    pub last_access_date: U16<LittleEndian>,
    pub first_cluster_high: U16<LittleEndian>,
    pub write_time: U16<LittleEndian>,
    pub write_date: U16<LittleEndian>,
    pub first_cluster_low: U16<LittleEndian>,
    pub file_size: U32<LittleEndian>,
}

const _: () = assert!(core::mem::size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

impl DirectoryEntry {
    /// First name byte of the slot that ends a directory. No entry after it
    /// is in use, in this cluster or any later one.
    pub const END_MARKER: u8 = 0x00;

    /// First name byte of a deleted entry. The slot can be reused, but later
    /// slots may still be in use.
    pub const DELETED_MARKER: u8 = 0xE5;

    /// Raw first cluster. 0 means no chain is allocated.
    pub fn first_cluster(&self) -> u32 {
        u32::from(self.first_cluster_low.get()) | (u32::from(self.first_cluster_high.get()) << 16)
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_low.set(cluster as u16);
        self.first_cluster_high.set((cluster >> 16) as u16);
    }

    /// Recorded size in bytes. Always 0 for directories, whatever the
    /// on-disk field says.
    pub fn file_size(&self) -> u32 {
        if self.is_directory() {
            0
        } else {
            self.file_size.get()
        }
    }

    pub fn is_end(&self) -> bool {
        self.name.0[0] == Self::END_MARKER
    }

    pub fn is_deleted(&self) -> bool {
        self.name.0[0] == Self::DELETED_MARKER
    }

    /// The slot can hold a new entry.
    pub fn is_free(&self) -> bool {
        self.is_end() || self.is_deleted()
    }

    /// A fragment of a long file name rather than a real entry.
    pub fn is_long_name(&self) -> bool {
        self.attr.bits() & Attributes::LONG_NAME_MASK == Attributes::LONG_NAME.bits()
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_long_name() && self.attr.contains(Attributes::VOLUME_ID)
    }

    pub fn is_directory(&self) -> bool {
        !self.is_long_name() && self.attr.contains(Attributes::DIRECTORY)
    }

    /// A live entry that names a file or a directory.
    pub fn is_visible(&self) -> bool {
        !self.is_free() && !self.is_long_name() && !self.is_volume_label()
    }
}

/// See <https://wiki.osdev.org/FAT#Directories_on_FAT12.2F16.2F32>
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Attributes(u8);

bitflags! {
    impl Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;

        /// Long file name fragments set all four low bits.
        const LONG_NAME = 0x0F;
    }
}

impl Attributes {
    const LONG_NAME_MASK: u8 = 0x3F;
}

/// Where a directory entry lives: its byte offset within the volume image.
/// Entries are never copied out of the image; this is the handle used to read
/// and mutate them in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryLocation(usize);

impl EntryLocation {
    pub fn offset(self) -> usize {
        self.0
    }
}

impl<'a> Volume<'a> {
    /// Every slot of the directory starting at `dir`, in order, across its
    /// whole cluster chain.
    pub fn directory_slots(&self, dir: ClusterNumber) -> DirectorySlots<'_, 'a> {
        DirectorySlots {
            volume: self,
            clusters: self.chain(dir),
            current: None,
            index: 0,
        }
    }

    /// Live entries of the directory at `dir`. Stops at the end marker, and
    /// skips deleted slots, long name fragments, and the volume label.
    pub fn read_dir(&self, dir: ClusterNumber) -> DirEntries<'_, 'a> {
        DirEntries {
            slots: self.directory_slots(dir),
        }
    }

    /// Looks up `name` in the directory at `dir` by case-insensitive short
    /// name comparison.
    pub fn find_in_directory(&self, dir: ClusterNumber, name: &str) -> Option<EntryLocation> {
        self.read_dir(dir)
            .find(|(_, entry)| entry.name.matches(name))
            .map(|(location, _)| location)
    }

    /// First cluster of the directory an entry points at. A directory entry
    /// with cluster 0 is the `..` of a root child and means the root.
    pub(crate) fn directory_cluster(&self, entry: &DirectoryEntry) -> ClusterNumber {
        ClusterNumber::from_entry(entry.first_cluster()).unwrap_or(self.params.root_cluster)
    }
}

/// Iterator over every slot of a directory, free or not.
#[derive(Debug)]
pub struct DirectorySlots<'v, 'a> {
    volume: &'v Volume<'a>,
    clusters: ClusterChain<'v, 'a>,
    current: Option<ClusterNumber>,
    index: usize,
}

impl DirectorySlots<'_, '_> {
    /// The cluster holding the slot most recently returned.
    pub fn current_cluster(&self) -> Option<ClusterNumber> {
        self.current
    }
}

impl Iterator for DirectorySlots<'_, '_> {
    type Item = EntryLocation;

    fn next(&mut self) -> Option<Self::Item> {
        let entries_per_cluster = self.volume.params.entries_per_cluster();
        loop {
            if let Some(cluster) = self.current {
                if self.index < entries_per_cluster {
                    let offset = self.volume.cluster_offset(cluster)
                        + self.index * DIRECTORY_ENTRY_SIZE;
                    self.index += 1;
                    return Some(EntryLocation(offset));
                }
            }
            self.current = Some(self.clusters.next()?);
            self.index = 0;
        }
    }
}

/// Iterator over the live entries of a directory.
#[derive(Debug)]
pub struct DirEntries<'v, 'a> {
    slots: DirectorySlots<'v, 'a>,
}

impl<'v> Iterator for DirEntries<'v, '_> {
    type Item = (EntryLocation, &'v DirectoryEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let volume = self.slots.volume;
        for location in self.slots.by_ref() {
            let entry = volume.entry(location);
            if entry.is_end() {
                break;
            }
            if entry.is_visible() {
                return Some((location, entry));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{ImageBuilder, TestImage};

    #[test]
    fn entry_field_layout() {
        let mut bytes = [0u8; DIRECTORY_ENTRY_SIZE];
        bytes[0..11].copy_from_slice(b"HELLO   TXT");
        bytes[11] = 0x20;
        bytes[20..22].copy_from_slice(&0x0001u16.to_le_bytes());
        bytes[26..28].copy_from_slice(&0x0203u16.to_le_bytes());
        bytes[28..32].copy_from_slice(&12u32.to_le_bytes());

        let entry = DirectoryEntry::ref_from(&bytes[..]).unwrap();
        assert_eq!(entry.first_cluster(), 0x0001_0203);
        assert_eq!(entry.file_size(), 12);
        assert_eq!(entry.attr, Attributes::ARCHIVE);
        assert!(!entry.is_directory());
        assert!(entry.is_visible());
    }

    #[test]
    fn set_first_cluster_splits_halves() {
        let mut entry = DirectoryEntry::new_zeroed();
        entry.set_first_cluster(0x0ABC_1234);
        assert_eq!(entry.first_cluster_low.get(), 0x1234);
        assert_eq!(entry.first_cluster_high.get(), 0x0ABC);
        assert_eq!(entry.first_cluster(), 0x0ABC_1234);
    }

    #[test]
    fn directory_size_reads_as_zero() {
        let mut entry = DirectoryEntry::new_zeroed();
        entry.attr = Attributes::DIRECTORY;
        entry.file_size.set(4096);
        assert_eq!(entry.file_size(), 0);
    }

    #[test]
    fn slot_kinds() {
        let mut entry = DirectoryEntry::new_zeroed();
        assert!(entry.is_end() && entry.is_free() && !entry.is_visible());

        entry.name.0[0] = DirectoryEntry::DELETED_MARKER;
        assert!(entry.is_deleted() && entry.is_free() && !entry.is_end());

        entry.name.0[0] = b'A';
        entry.attr = Attributes::LONG_NAME;
        assert!(entry.is_long_name());
        assert!(!entry.is_directory() && !entry.is_volume_label() && !entry.is_visible());

        entry.attr = Attributes::VOLUME_ID | Attributes::ARCHIVE;
        assert!(entry.is_volume_label() && !entry.is_visible());
    }

    #[test]
    fn slots_span_the_whole_chain() {
        let mut image = ImageBuilder::new().build();
        let extra = image.alloc_chain(1)[0];
        image.set_fat(TestImage::ROOT, extra);
        let volume = Volume::mount(&mut image.bytes).unwrap();

        let per_cluster = volume.params().entries_per_cluster();
        let slots: Vec<EntryLocation> = volume.directory_slots(volume.root_cluster()).collect();
        assert_eq!(slots.len(), 2 * per_cluster);
        assert_eq!(slots[0].offset(), volume.cluster_offset(ClusterNumber(2)));
        assert_eq!(
            slots[per_cluster].offset(),
            volume.cluster_offset(ClusterNumber(extra))
        );
    }

    #[test]
    fn read_dir_skips_deleted_and_special_slots() {
        let mut image = ImageBuilder::new().build();
        image.put_entry(TestImage::ROOT, b"MYVOLUME   ", 0x08, 0, 0);
        image.put_entry(TestImage::ROOT, b"Bx\0y\0t\0e\0s\0", 0x0F, 0, 0);
        let deleted = image.put_entry(TestImage::ROOT, b"GONE    TXT", 0x20, 0, 0);
        image.delete_entry(deleted);
        image.add_file(TestImage::ROOT, b"KEEP    TXT", b"data");
        image.add_dir(TestImage::ROOT, b"SUB        ");

        let volume = Volume::mount(&mut image.bytes).unwrap();
        let names: Vec<String> = volume
            .read_dir(volume.root_cluster())
            .map(|(_, entry)| entry.name.format().as_str().to_string())
            .collect();
        assert_eq!(names, vec!["KEEP.TXT", "SUB"]);
    }

    #[test]
    fn read_dir_stops_at_end_marker() {
        let mut image = ImageBuilder::new().build();
        image.add_file(TestImage::ROOT, b"FIRST   TXT", b"");
        let root = image.cluster_offset(TestImage::ROOT);
        // An entry after the end marker must never be reported.
        image.bytes[root + 2 * 32..root + 2 * 32 + 11]
            .copy_from_slice(b"HIDDEN  TXT");
        image.bytes[root + 2 * 32 + 11] = 0x20;

        let volume = Volume::mount(&mut image.bytes).unwrap();
        assert_eq!(volume.read_dir(volume.root_cluster()).count(), 1);
        assert!(volume
            .find_in_directory(volume.root_cluster(), "HIDDEN.TXT")
            .is_none());
    }

    #[test]
    fn find_is_case_insensitive() {
        let mut image = ImageBuilder::new().build();
        let offset = image.put_entry(TestImage::ROOT, b"README  TXT", 0x20, 0, 0);
        let volume = Volume::mount(&mut image.bytes).unwrap();
        for query in ["README.TXT", "readme.txt", "ReadMe.Txt"] {
            let found = volume.find_in_directory(volume.root_cluster(), query).unwrap();
            assert_eq!(found.offset(), offset);
        }
        assert!(volume
            .find_in_directory(volume.root_cluster(), "README")
            .is_none());
    }
}
