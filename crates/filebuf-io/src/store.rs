//! Backing store contract for positional byte I/O.

use filebuf_common::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, IoSlice, IoSliceMut};
use std::path::Path;
use std::sync::Arc;

/// Segment limit assumed when the OS does not report one (Linux UIO_MAXIOV).
pub const DEFAULT_SEGMENT_LIMIT: usize = 1024;

/// A fixed-extent random-access byte store.
///
/// Every method transfers bytes at an absolute offset and returns how many
/// bytes actually moved, which may be fewer than requested. The store never
/// needs to append, truncate or resize.
///
/// The vectored methods are optional. Their default implementations move only
/// the first non-empty segment through the single-segment primitive, so a
/// store without real scatter/gather support still behaves correctly, one
/// call per segment.
pub trait BackingStore {
    /// Reads up to `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Writes up to `buf.len()` bytes starting at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Reads into `bufs` back to back starting at `offset`.
    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        match bufs.iter_mut().find(|b| !b.is_empty()) {
            Some(buf) => self.read_at(buf, offset),
            None => Ok(0),
        }
    }

    /// Writes `bufs` back to back starting at `offset`.
    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        match bufs.iter().find(|b| !b.is_empty()) {
            Some(buf) => self.write_at(buf, offset),
            None => Ok(0),
        }
    }

    /// Maximum number of segments one vectored call may reference.
    fn segment_limit(&self) -> usize {
        1
    }
}

impl<T: BackingStore + ?Sized> BackingStore for &T {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }

    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }

    #[inline]
    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        (**self).read_vectored_at(bufs, offset)
    }

    #[inline]
    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        (**self).write_vectored_at(bufs, offset)
    }

    #[inline]
    fn segment_limit(&self) -> usize {
        (**self).segment_limit()
    }
}

impl<T: BackingStore + ?Sized> BackingStore for Arc<T> {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }

    #[inline]
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        (**self).write_at(buf, offset)
    }

    #[inline]
    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        (**self).read_vectored_at(bufs, offset)
    }

    #[inline]
    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        (**self).write_vectored_at(bufs, offset)
    }

    #[inline]
    fn segment_limit(&self) -> usize {
        (**self).segment_limit()
    }
}

#[cfg(unix)]
impl BackingStore for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }

    #[cfg(target_os = "linux")]
    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        let offset = to_off_t(offset)?;
        nix::sys::uio::preadv(self, bufs, offset).map_err(io::Error::from)
    }

    #[cfg(target_os = "linux")]
    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        let offset = to_off_t(offset)?;
        nix::sys::uio::pwritev(self, bufs, offset).map_err(io::Error::from)
    }

    #[cfg(target_os = "linux")]
    fn segment_limit(&self) -> usize {
        os_segment_limit()
    }
}

#[cfg(windows)]
impl BackingStore for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }
}

#[cfg(target_os = "linux")]
fn to_off_t(offset: u64) -> io::Result<nix::libc::off_t> {
    nix::libc::off_t::try_from(offset).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {} does not fit in off_t", offset),
        )
    })
}

/// Returns the kernel's scatter/gather segment limit (`sysconf(_SC_IOV_MAX)`).
///
/// Queried once per process.
#[cfg(target_os = "linux")]
pub fn os_segment_limit() -> usize {
    use nix::unistd::{sysconf, SysconfVar};
    use std::sync::OnceLock;

    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(|| match sysconf(SysconfVar::IOV_MAX) {
        Ok(Some(limit)) if limit > 0 => limit as usize,
        Ok(_) => DEFAULT_SEGMENT_LIMIT,
        Err(e) => {
            tracing::debug!("sysconf(IOV_MAX) failed: {}, using {}", e, DEFAULT_SEGMENT_LIMIT);
            DEFAULT_SEGMENT_LIMIT
        }
    })
}

/// Opens an existing file and returns it together with its current length.
///
/// The length is what a buffer over this file should be constructed with.
pub fn open_file(path: impl AsRef<Path>, writable: bool) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .read(true)
        .write(writable)
        .open(path.as_ref())?;
    let file_size = file.metadata()?.len();
    Ok((file, file_size))
}
