//! In-memory backing store.
//!
//! Holds the whole byte extent in a `Vec<u8>` and records every call it
//! serves, which makes it usable both as a reference model of a file and as
//! a test double for counting I/O.

use crate::store::BackingStore;
use parking_lot::Mutex;
use std::io::{self, IoSlice, IoSliceMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single call served by a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCall {
    /// A read of `len` bytes at `offset` spread over `segments` buffers.
    Read {
        offset: u64,
        len: usize,
        segments: usize,
    },
    /// A write of `len` bytes at `offset` gathered from `segments` buffers.
    Write {
        offset: u64,
        len: usize,
        segments: usize,
    },
}

impl IoCall {
    /// Returns true for read calls.
    pub fn is_read(&self) -> bool {
        matches!(self, IoCall::Read { .. })
    }

    /// Returns the starting offset of the call.
    pub fn offset(&self) -> u64 {
        match *self {
            IoCall::Read { offset, .. } | IoCall::Write { offset, .. } => offset,
        }
    }

    /// Returns the number of bytes the call requested.
    pub fn len(&self) -> usize {
        match *self {
            IoCall::Read { len, .. } | IoCall::Write { len, .. } => len,
        }
    }

    /// Returns true if the call requested no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte store backed by memory, with a call log and fault injection.
pub struct MemoryStore {
    /// Store contents.
    data: Mutex<Vec<u8>>,
    /// Calls served so far, in order.
    calls: Mutex<Vec<IoCall>>,
    /// Maximum segments per vectored call.
    segment_limit: usize,
    /// Maximum bytes moved per call (usize::MAX = unlimited).
    max_transfer: usize,
    /// Calls covering this offset fail with an injected error.
    fail_at: Mutex<Option<u64>>,
    /// Number of upcoming calls that report `Interrupted`.
    interrupts: AtomicUsize,
}

impl MemoryStore {
    /// Creates a zero-filled store of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_vec(vec![0u8; size])
    }

    /// Creates a store holding `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            calls: Mutex::new(Vec::new()),
            segment_limit: usize::MAX,
            max_transfer: usize::MAX,
            fail_at: Mutex::new(None),
            interrupts: AtomicUsize::new(0),
        }
    }

    /// Sets the maximum number of segments per vectored call.
    ///
    /// Vectored calls with more segments fail with `InvalidInput`, like
    /// `preadv` with more than `IOV_MAX` entries.
    pub fn with_segment_limit(mut self, limit: usize) -> Self {
        self.segment_limit = limit.max(1);
        self
    }

    /// Caps the bytes moved by any single call, forcing short transfers.
    pub fn with_max_transfer(mut self, max: usize) -> Self {
        self.max_transfer = max.max(1);
        self
    }

    /// Makes every call whose byte range covers `offset` fail.
    pub fn fail_at(&self, offset: Option<u64>) {
        *self.fail_at.lock() = offset;
    }

    /// Makes the next `count` calls return `ErrorKind::Interrupted`.
    pub fn interrupt_next(&self, count: usize) {
        self.interrupts.store(count, Ordering::Release);
    }

    /// Returns a copy of the store contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Returns the current size in bytes.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Returns the calls served so far.
    pub fn calls(&self) -> Vec<IoCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls served so far and clears the log.
    pub fn take_calls(&self) -> Vec<IoCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    /// Returns only the read calls served so far.
    pub fn reads(&self) -> Vec<IoCall> {
        self.calls.lock().iter().copied().filter(IoCall::is_read).collect()
    }

    /// Returns only the write calls served so far.
    pub fn writes(&self) -> Vec<IoCall> {
        self.calls
            .lock()
            .iter()
            .copied()
            .filter(|c| !c.is_read())
            .collect()
    }

    /// Applies injected faults to a call covering `[offset, offset + len)`.
    fn check_faults(&self, offset: u64, len: usize) -> io::Result<()> {
        let pending = self.interrupts.load(Ordering::Acquire);
        if pending > 0 {
            self.interrupts.store(pending - 1, Ordering::Release);
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        if let Some(fail) = *self.fail_at.lock() {
            if offset <= fail && fail < offset + len as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("injected failure at offset {}", fail),
                ));
            }
        }
        Ok(())
    }

    fn check_segments(&self, count: usize) -> io::Result<()> {
        if count > self.segment_limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} segments exceed the limit of {}",
                    count, self.segment_limit
                ),
            ));
        }
        Ok(())
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut bufs = [IoSliceMut::new(buf)];
        self.read_vectored_at(&mut bufs, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.write_vectored_at(&[IoSlice::new(buf)], offset)
    }

    fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.check_segments(bufs.len())?;
        let requested: usize = bufs.iter().map(|b| b.len()).sum();
        self.check_faults(offset, requested)?;
        self.calls.lock().push(IoCall::Read {
            offset,
            len: requested,
            segments: bufs.len(),
        });

        let data = self.data.lock();
        let start = (offset as usize).min(data.len());
        let available = (data.len() - start).min(self.max_transfer);
        let mut src = &data[start..start + available];
        let mut read = 0;
        for buf in bufs.iter_mut() {
            if src.is_empty() {
                break;
            }
            let n = buf.len().min(src.len());
            buf[..n].copy_from_slice(&src[..n]);
            src = &src[n..];
            read += n;
        }
        Ok(read)
    }

    fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        self.check_segments(bufs.len())?;
        let requested: usize = bufs.iter().map(|b| b.len()).sum();
        self.check_faults(offset, requested)?;
        self.calls.lock().push(IoCall::Write {
            offset,
            len: requested,
            segments: bufs.len(),
        });

        let mut data = self.data.lock();
        let mut pos = offset as usize;
        let mut budget = requested.min(self.max_transfer);
        let mut written = 0;
        for buf in bufs {
            if budget == 0 {
                break;
            }
            let n = buf.len().min(budget);
            if data.len() < pos + n {
                data.resize(pos + n, 0);
            }
            data[pos..pos + n].copy_from_slice(&buf[..n]);
            pos += n;
            budget -= n;
            written += n;
        }
        Ok(written)
    }

    fn segment_limit(&self) -> usize {
        self.segment_limit
    }
}
