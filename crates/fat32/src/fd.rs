//! Generic file descriptor interface, plus helpers that work on any
//! descriptor.

use core::fmt;

/// A byte stream with a read cursor, a write cursor, and random access
/// loads. Every operation returns the number of bytes transferred; a short
/// count is how end of file and a full volume are reported.
pub trait FileDescriptor {
    /// Reads from the read cursor and advances it.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Writes at the write cursor and advances it.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Current size in bytes.
    fn size(&self) -> usize;

    /// Reads starting at `offset` without touching either cursor.
    fn load(&mut self, buf: &mut [u8], offset: usize) -> usize;
}

/// Reads bytes until `delim` (which is kept), end of file, or a full `buf`.
/// Returns the number of bytes stored.
pub fn read_delim<F: FileDescriptor + ?Sized>(fd: &mut F, delim: u8, buf: &mut [u8]) -> usize {
    let mut len = 0;
    while len < buf.len() {
        if fd.read(&mut buf[len..=len]) == 0 {
            break;
        }
        len += 1;
        if buf[len - 1] == delim {
            break;
        }
    }
    len
}

/// Adapter that lets `write!` format straight into a descriptor.
///
/// ```ignore
/// let mut fd = volume.open("/LOG.TXT")?;
/// write!(FdWriter::new(&mut fd), "{} clusters free\n", free)?;
/// ```
pub struct FdWriter<'f, F: ?Sized> {
    fd: &'f mut F,
    written: usize,
}

impl<'f, F: FileDescriptor + ?Sized> FdWriter<'f, F> {
    pub fn new(fd: &'f mut F) -> Self {
        Self { fd, written: 0 }
    }

    /// Bytes written through this adapter so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl<F: FileDescriptor + ?Sized> fmt::Write for FdWriter<'_, F> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let written = self.fd.write(s.as_bytes());
        self.written += written;
        if written < s.len() {
            return Err(fmt::Error);
        }
        Ok(())
    }
}
