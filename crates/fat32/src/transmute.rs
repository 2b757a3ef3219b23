//! Bounds-checked casts between the volume image and its on-disk records.

use zerocopy::{AsBytes, FromBytes, Ref};

/// Casts the bytes at `offset` to a reference of the given type. Returns
/// `None` if the record would run past the end of `bytes`.
pub(crate) fn try_cast_bytes_ref_offset<T: FromBytes>(bytes: &[u8], offset: usize) -> Option<&T> {
    let bytes = bytes.get(offset..)?;
    Some(Ref::<_, T>::new_from_prefix(bytes)?.0.into_ref())
}

/// Casts the bytes at `offset` to a mutable reference of the given type.
pub(crate) fn try_cast_bytes_ref_mut_offset<T: FromBytes + AsBytes>(
    bytes: &mut [u8],
    offset: usize,
) -> Option<&mut T> {
    let bytes = bytes.get_mut(offset..)?;
    Some(Ref::<_, T>::new_from_prefix(bytes)?.0.into_mut())
}
