use core::fmt;

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::directory::DirectoryEntry;
use crate::error::FatError;

/// An 8.3 short name as stored on disk: 8 bytes of base name and 3 bytes of
/// extension, both upper case and padded with spaces. The dot is implied.
#[derive(Copy, Clone, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct ShortName(pub [u8; 11]);

const BASE_LEN: usize = 8;
const EXTENSION_LEN: usize = 3;
const PADDING: u8 = b' ';

/// Stored in place of a leading `0xE5`, which would mark the slot deleted.
const ESCAPED_E5: u8 = 0x05;

impl ShortName {
    pub const DOT: Self = Self(*b".          ");
    pub const DOT_DOT: Self = Self(*b"..         ");

    /// Encodes a `BASE.EXT` name. Names that do not fit the 8.3 format are
    /// rejected rather than truncated, so two different long names can never
    /// collapse into the same short name.
    pub fn parse(name: &str) -> Result<Self, FatError> {
        let (base, extension) = name.split_once('.').unwrap_or((name, ""));
        if base.is_empty()
            || base.len() > BASE_LEN
            || extension.len() > EXTENSION_LEN
            || (extension.is_empty() && name.ends_with('.'))
        {
            return Err(FatError::InvalidName);
        }

        let mut encoded = [PADDING; 11];
        for (dst, src) in encoded[..BASE_LEN].iter_mut().zip(base.bytes()) {
            *dst = encode_byte(src)?;
        }
        for (dst, src) in encoded[BASE_LEN..].iter_mut().zip(extension.bytes()) {
            *dst = encode_byte(src)?;
        }
        Ok(Self(encoded))
    }

    /// Base name and extension with the padding stripped.
    pub fn parts(&self) -> (&[u8], &[u8]) {
        let (base, extension) = self.0.split_at(BASE_LEN);
        (trim_padding(base), trim_padding(extension))
    }

    /// `BASE` when the extension is empty, `BASE.EXT` otherwise.
    pub fn format(&self) -> FormattedName {
        let (base, extension) = self.parts();
        let mut name = FormattedName {
            bytes: [0; 12],
            len: 0,
        };
        name.push(base);
        if !extension.is_empty() {
            name.push(b".");
            name.push(extension);
        }
        name
    }

    /// Case-insensitive comparison against a `BASE.EXT` name. `.` and `..`
    /// match the directory self and parent entries.
    pub fn matches(&self, name: &str) -> bool {
        self.matches_bytes(name.as_bytes())
    }

    /// Like [`ShortName::matches`], but for names that are not UTF-8.
    ///
    /// The query is only padded, never validated, so entries written by
    /// other tools with spaces or non-ASCII bytes in their names can still
    /// be found. A stored lead byte of `0x05` stands for `0xE5`.
    pub fn matches_bytes(&self, name: &[u8]) -> bool {
        match name {
            b"." => *self == Self::DOT,
            b".." => *self == Self::DOT_DOT,
            _ => pad(name).is_some_and(|padded| padded.eq_ignore_ascii_case(&self.stored())),
        }
    }

    /// The name bytes with the `0x05` escape undone.
    fn stored(&self) -> [u8; 11] {
        let mut bytes = self.0;
        if bytes[0] == ESCAPED_E5 {
            bytes[0] = 0xE5;
        }
        bytes
    }
}

impl fmt::Debug for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShortName").field(&self.format().as_str()).finish()
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.format().as_str())
    }
}

impl DirectoryEntry {
    pub fn set_file_name(&mut self, name: &str) -> Result<(), FatError> {
        self.name = ShortName::parse(name)?;
        Ok(())
    }
}

/// Printable form of a short name. At most 8 + 1 + 3 bytes, so it lives on
/// the stack.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FormattedName {
    bytes: [u8; 12],
    len: usize,
}

impl FormattedName {
    fn push(&mut self, bytes: &[u8]) {
        self.bytes[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("<invalid>")
    }
}

impl fmt::Debug for FormattedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for FormattedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != PADDING)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Splits `name` at its first dot and pads both halves to the on-disk
/// layout. `None` if either half is too long to be stored.
fn pad(name: &[u8]) -> Option<[u8; 11]> {
    let (base, extension) = match name.iter().position(|&b| b == b'.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, &[][..]),
    };
    if base.is_empty() || base.len() > BASE_LEN || extension.len() > EXTENSION_LEN {
        return None;
    }

    let mut padded = [PADDING; 11];
    padded[..base.len()].copy_from_slice(base);
    padded[BASE_LEN..BASE_LEN + extension.len()].copy_from_slice(extension);
    Some(padded)
}

/// Upper cases `byte` if it may appear in a short name.
///
/// See <https://en.wikipedia.org/wiki/8.3_filename#Directory_table>
fn encode_byte(byte: u8) -> Result<u8, FatError> {
    match byte {
        b'A'..=b'Z' | b'0'..=b'9' => Ok(byte),
        b'a'..=b'z' => Ok(byte.to_ascii_uppercase()),
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_'
        | b'`' | b'{' | b'}' | b'~' => Ok(byte),
        _ => Err(FatError::InvalidName),
    }
}
