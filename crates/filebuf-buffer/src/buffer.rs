//! Page-aligned write-back buffer over a backing store.
//!
//! `FileBuffer` serves arbitrary byte ranges of a fixed-size file from
//! resident pages. Pages are read from the store at most once, in coalesced
//! runs, and modified pages are written back only on `flush`, again one
//! vectored call per run of dirty pages.

use crate::storage::{AnyPages, ContiguousPages, PageStorage, SparsePages};
use crate::tracker::PageBitmap;
use filebuf_common::{
    BufferConfig, FileBufError, PageGeometry, PageRange, Result, StorageStrategy,
};
use filebuf_io::{effective_segment_limit, read_full_at, write_full_at, BackingStore};
use std::borrow::Cow;

/// Buffer holding each touched page in its own allocation.
pub type PagedFileBuffer<B> = FileBuffer<B, SparsePages>;

/// Buffer mirroring the whole file in a single allocation.
pub type WholeFileBuffer<B> = FileBuffer<B, ContiguousPages>;

/// Write-back page buffer for a fixed-size file.
///
/// Every request must satisfy `offset >= 0` and `offset + length <=
/// file_size`. Requests that do not are rejected before any I/O and leave
/// the buffer untouched.
///
/// Writes stay in memory until [`flush`](Self::flush). A buffer dropped with
/// dirty pages discards them.
pub struct FileBuffer<B: BackingStore, P: PageStorage = AnyPages> {
    /// Backing store the pages come from and go back to.
    store: B,
    /// File and page sizes.
    geometry: PageGeometry,
    /// Resident page bytes.
    pages: P,
    /// Pages whose bytes are resident (read from the store or fully written).
    fetched: PageBitmap,
    /// Pages modified since they were last written back.
    dirty: PageBitmap,
    /// Segments per vectored call.
    segment_limit: usize,
}

fn checked_geometry(file_size: u64, page_size: u64) -> Result<PageGeometry> {
    if page_size == 0 {
        return Err(FileBufError::InvalidParameter {
            name: "page_size".to_string(),
            value: page_size.to_string(),
        });
    }
    Ok(PageGeometry::new(file_size, page_size))
}

impl<B: BackingStore> FileBuffer<B, AnyPages> {
    /// Creates a buffer over `file_size` bytes of `store` with default
    /// settings and the given page size.
    pub fn new(store: B, file_size: u64, page_size: u64) -> Result<Self> {
        Self::with_config(store, file_size, &BufferConfig::with_page_size(page_size))
    }

    /// Creates a buffer from a full configuration.
    pub fn with_config(store: B, file_size: u64, config: &BufferConfig) -> Result<Self> {
        config.validate()?;
        let geometry = PageGeometry::new(file_size, config.page_size);
        let pages = AnyPages::for_config(geometry, config);
        tracing::debug!(
            file_size,
            page_size = config.page_size,
            strategy = ?pages.strategy(),
            "created file buffer"
        );
        Ok(Self::assemble(store, geometry, pages, config.max_segments))
    }

    /// Returns the storage strategy the buffer resolved to.
    pub fn strategy(&self) -> StorageStrategy {
        self.pages.strategy()
    }
}

impl<B: BackingStore> FileBuffer<B, SparsePages> {
    /// Creates a buffer that allocates pages as they are touched.
    pub fn sparse(store: B, file_size: u64, page_size: u64) -> Result<Self> {
        let geometry = checked_geometry(file_size, page_size)?;
        Ok(Self::assemble(store, geometry, SparsePages::new(geometry), None))
    }
}

impl<B: BackingStore> FileBuffer<B, ContiguousPages> {
    /// Creates a buffer that allocates the whole file up front.
    pub fn contiguous(store: B, file_size: u64, page_size: u64) -> Result<Self> {
        let geometry = checked_geometry(file_size, page_size)?;
        Ok(Self::assemble(store, geometry, ContiguousPages::new(geometry), None))
    }
}

impl<B: BackingStore, P: PageStorage> FileBuffer<B, P> {
    fn assemble(store: B, geometry: PageGeometry, pages: P, max_segments: Option<usize>) -> Self {
        let segment_limit = effective_segment_limit(&store, max_segments);
        let page_count = geometry.page_count();
        Self {
            store,
            geometry,
            pages,
            fetched: PageBitmap::new(page_count),
            dirty: PageBitmap::new(page_count),
            segment_limit,
        }
    }

    /// Returns `length` bytes starting at `offset`.
    ///
    /// Pages not yet resident are read first, one call per run of missing
    /// pages. Requests within a single page, and any request on contiguous
    /// storage, borrow the resident bytes; other requests get a copy.
    pub fn get_at(&mut self, offset: i64, length: usize) -> Result<Cow<'_, [u8]>> {
        let start = self.check_bounds(offset, length)?;
        if length == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        let range = self.geometry.page_range(start, length as u64);
        self.fetch(range)?;
        Ok(self.window(start, length, range))
    }

    /// Fills `buf` with the bytes at `offset` and returns its length.
    pub fn read_at(&mut self, buf: &mut [u8], offset: i64) -> Result<usize> {
        let start = self.check_bounds(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(0);
        }
        let range = self.geometry.page_range(start, buf.len() as u64);
        self.fetch(range)?;
        self.copy_out(start, buf);
        Ok(buf.len())
    }

    /// Stores `data` at `offset`.
    ///
    /// Nothing is written to the backing store until `flush`. Pages the
    /// write covers only partially are read first if they are not resident
    /// yet, so flushing never replaces unread bytes with zeros.
    pub fn put_at(&mut self, data: &[u8], offset: i64) -> Result<()> {
        let start = self.check_bounds(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let range = self.geometry.page_range(start, data.len() as u64);
        self.fetch_partial_pages(start, data.len() as u64, range)?;

        self.copy_in(start, data);
        self.fetched.set_range(range);
        self.dirty.set_range(range);
        Ok(())
    }

    /// Stores `data` at `offset` and returns its length.
    pub fn write_at(&mut self, data: &[u8], offset: i64) -> Result<usize> {
        self.put_at(data, offset)?;
        Ok(data.len())
    }

    /// Makes the pages covering `[offset, offset + length)` resident without
    /// returning their bytes.
    pub fn preread(&mut self, offset: i64, length: usize) -> Result<()> {
        let start = self.check_bounds(offset, length)?;
        if length == 0 {
            return Ok(());
        }
        self.fetch(self.geometry.page_range(start, length as u64))
    }

    /// Writes every dirty page back to the store and returns how many pages
    /// were written.
    ///
    /// Each run of consecutive dirty pages is one vectored write. A run is
    /// marked clean as soon as its write completes, so after a failure a
    /// later flush retries only the runs that were not written.
    pub fn flush(&mut self) -> Result<usize> {
        let runs = self.dirty.coalesced_ranges();
        if runs.is_empty() {
            return Ok(0);
        }

        let mut written = 0u64;
        for run in runs {
            let (offset, bytes) = self.geometry.byte_span(run);
            let segments = self.pages.segments(run);
            write_full_at(&self.store, &segments[..], offset, self.segment_limit)?;
            self.dirty.clear_range(run);
            written += run.len();
            tracing::debug!(%run, offset, bytes, "wrote back dirty pages");
        }

        tracing::debug!(pages = written, "flush complete");
        Ok(written as usize)
    }

    /// Returns the file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.geometry.file_size()
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> u64 {
        self.geometry.page_size()
    }

    /// Returns the number of pages in the file.
    pub fn page_count(&self) -> u64 {
        self.geometry.page_count()
    }

    /// Returns the number of resident pages.
    pub fn fetched_pages(&self) -> u64 {
        self.fetched.count()
    }

    /// Returns the number of pages waiting for `flush`.
    pub fn dirty_pages(&self) -> u64 {
        self.dirty.count()
    }

    /// Returns true if any page waits for `flush`.
    pub fn has_dirty_pages(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns the runs of pages waiting for `flush`.
    pub fn dirty_ranges(&self) -> Vec<PageRange> {
        self.dirty.coalesced_ranges()
    }

    /// Returns the bytes held in memory by page buffers.
    pub fn resident_bytes(&self) -> u64 {
        self.pages.resident_bytes()
    }

    /// Returns the backing store.
    pub fn store(&self) -> &B {
        &self.store
    }

    /// Validates a request and returns its start as an unsigned offset.
    fn check_bounds(&self, offset: i64, length: usize) -> Result<u64> {
        if offset < 0 {
            return Err(FileBufError::InvalidOffset { offset });
        }
        let file_size = self.geometry.file_size();
        match (offset as u64).checked_add(length as u64) {
            Some(end) if end <= file_size => Ok(offset as u64),
            _ => Err(FileBufError::OutOfBounds {
                offset,
                length: length as u64,
                file_size,
            }),
        }
    }

    /// Reads every non-resident run of pages inside `range`.
    fn fetch(&mut self, range: PageRange) -> Result<()> {
        for missing in self.fetched.unset_ranges_within(range) {
            let (offset, bytes) = self.geometry.byte_span(missing);
            let mut segments = self.pages.segments(missing);
            read_full_at(&self.store, &mut segments[..], offset, self.segment_limit)?;
            self.fetched.set_range(missing);
            tracing::debug!(%missing, offset, bytes, "fetched pages");
        }
        Ok(())
    }

    /// Fetches the first and last pages of a write when the write does not
    /// cover them completely.
    fn fetch_partial_pages(&mut self, start: u64, length: u64, range: PageRange) -> Result<()> {
        let (span_start, span_len) = self.geometry.byte_span(range);
        let head = start > span_start;
        let tail = start + length < span_start + span_len;

        match (head, tail) {
            (true, true) if range.len() <= 2 => self.fetch(range),
            _ => {
                if head {
                    self.fetch(PageRange::single(range.start))?;
                }
                if tail {
                    self.fetch(PageRange::single(range.end))?;
                }
                Ok(())
            }
        }
    }

    /// Returns the resident bytes of `[start, start + length)`.
    fn window(&self, start: u64, length: usize, range: PageRange) -> Cow<'_, [u8]> {
        if let Some(view) = self.pages.view(start, length) {
            return Cow::Borrowed(view);
        }
        if range.start == range.end {
            let in_page = self.geometry.offset_in_page(start);
            return match self.pages.get(range.start) {
                Some(page) => Cow::Borrowed(&page[in_page..in_page + length]),
                None => Cow::Owned(vec![0u8; length]),
            };
        }
        let mut out = vec![0u8; length];
        self.copy_out(start, &mut out);
        Cow::Owned(out)
    }

    /// Copies resident bytes starting at `start` into `out`.
    ///
    /// Pages without a buffer read as zeros.
    fn copy_out(&self, start: u64, out: &mut [u8]) {
        let mut pos = start;
        let mut done = 0;
        while done < out.len() {
            let page = pos / self.geometry.page_size();
            let in_page = self.geometry.offset_in_page(pos);
            let n = (self.geometry.page_len(page) - in_page).min(out.len() - done);
            let dst = &mut out[done..done + n];
            match self.pages.get(page) {
                Some(src) => dst.copy_from_slice(&src[in_page..in_page + n]),
                None => dst.fill(0),
            }
            done += n;
            pos += n as u64;
        }
    }

    /// Copies `data` into page buffers starting at `start`.
    fn copy_in(&mut self, start: u64, data: &[u8]) {
        let mut pos = start;
        let mut done = 0;
        while done < data.len() {
            let page = pos / self.geometry.page_size();
            let in_page = self.geometry.offset_in_page(pos);
            let buf = self.pages.page(page);
            let n = (buf.len() - in_page).min(data.len() - done);
            buf[in_page..in_page + n].copy_from_slice(&data[done..done + n]);
            done += n;
            pos += n as u64;
        }
    }
}

impl<B: BackingStore, P: PageStorage> Drop for FileBuffer<B, P> {
    fn drop(&mut self) {
        if self.has_dirty_pages() {
            tracing::warn!(
                dirty_pages = self.dirty.count(),
                "file buffer dropped with unflushed pages"
            );
        }
    }
}
