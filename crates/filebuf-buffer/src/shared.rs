//! Lock-guarded buffer for use from several threads.

use crate::buffer::FileBuffer;
use crate::storage::{AnyPages, PageStorage};
use filebuf_common::Result;
use filebuf_io::BackingStore;
use parking_lot::{Mutex, MutexGuard};

/// A `FileBuffer` behind a mutex.
///
/// Every method takes the lock for the duration of one operation, so calls
/// from different threads are serialized. `get_at` returns an owned copy
/// because a borrowed view cannot outlive the guard.
pub struct SharedFileBuffer<B: BackingStore, P: PageStorage = AnyPages> {
    inner: Mutex<FileBuffer<B, P>>,
}

impl<B: BackingStore, P: PageStorage> SharedFileBuffer<B, P> {
    /// Wraps `buffer`.
    pub fn new(buffer: FileBuffer<B, P>) -> Self {
        Self {
            inner: Mutex::new(buffer),
        }
    }

    /// Returns a copy of `length` bytes at `offset`.
    pub fn get_at(&self, offset: i64, length: usize) -> Result<Vec<u8>> {
        let mut buffer = self.inner.lock();
        let data = buffer.get_at(offset, length)?;
        Ok(data.into_owned())
    }

    /// Fills `buf` with the bytes at `offset`.
    pub fn read_at(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        self.inner.lock().read_at(buf, offset)
    }

    /// Stores `data` at `offset`.
    pub fn put_at(&self, data: &[u8], offset: i64) -> Result<()> {
        self.inner.lock().put_at(data, offset)
    }

    /// Stores `data` at `offset` and returns its length.
    pub fn write_at(&self, data: &[u8], offset: i64) -> Result<usize> {
        self.inner.lock().write_at(data, offset)
    }

    /// Makes the pages covering the range resident.
    pub fn preread(&self, offset: i64, length: usize) -> Result<()> {
        self.inner.lock().preread(offset, length)
    }

    /// Writes every dirty page back and returns how many were written.
    pub fn flush(&self) -> Result<usize> {
        self.inner.lock().flush()
    }

    /// Returns the number of pages waiting for `flush`.
    pub fn dirty_pages(&self) -> u64 {
        self.inner.lock().dirty_pages()
    }

    /// Locks the buffer for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, FileBuffer<B, P>> {
        self.inner.lock()
    }

    /// Unwraps the buffer.
    pub fn into_inner(self) -> FileBuffer<B, P> {
        self.inner.into_inner()
    }
}
