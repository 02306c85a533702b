//! Page geometry for filebuf.
//!
//! A file of `file_size` bytes is split into pages of `page_size` bytes.
//! Every page has the full size except the last one, which holds whatever
//! is left of the file.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (4 KB).
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Zero-based page index within a file.
pub type PageNo = u64;

/// A closed interval `[start, end]` of page indices.
///
/// Ranges are never empty: `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    /// First page in the range.
    pub start: PageNo,
    /// Last page in the range (inclusive).
    pub end: PageNo,
}

impl PageRange {
    /// Creates a new range. `start` must not exceed `end`.
    pub fn new(start: PageNo, end: PageNo) -> Self {
        debug_assert!(start <= end, "empty page range {}..={}", start, end);
        Self { start, end }
    }

    /// Creates a range covering a single page.
    pub fn single(page: PageNo) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Returns the number of pages in the range.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Ranges are never empty; provided for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the page lies inside this range.
    #[inline]
    pub fn contains(&self, page: PageNo) -> bool {
        self.start <= page && page <= self.end
    }

    /// Iterates over the page indices in ascending order.
    pub fn pages(&self) -> std::ops::RangeInclusive<PageNo> {
        self.start..=self.end
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "page {}", self.start)
        } else {
            write!(f, "pages {}-{}", self.start, self.end)
        }
    }
}

/// Returns the page range touched by the byte range `[off, off + length)`.
///
/// `length` must be positive.
#[inline]
pub fn page_range_for_byte_range(page_size: u64, off: u64, length: u64) -> PageRange {
    debug_assert!(length > 0, "zero-length byte range");
    PageRange {
        start: off / page_size,
        end: (off + length - 1) / page_size,
    }
}

/// Returns the byte size of `page`, which is shorter than `page_size` only
/// for the last page of the file.
#[inline]
pub fn last_page_size(file_size: u64, page_size: u64, page: PageNo) -> usize {
    let start = page * page_size;
    if start + page_size > file_size {
        (file_size - start) as usize
    } else {
        page_size as usize
    }
}

/// File and page sizes of a buffer, fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    file_size: u64,
    page_size: u64,
}

impl PageGeometry {
    /// Creates a geometry. `page_size` must be positive.
    pub fn new(file_size: u64, page_size: u64) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            file_size,
            page_size,
        }
    }

    /// Returns the file size in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the page size in bytes.
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Returns the number of pages, counting a trailing short page.
    #[inline]
    pub fn page_count(&self) -> u64 {
        self.file_size.div_ceil(self.page_size)
    }

    /// Returns the byte offset where `page` starts.
    #[inline]
    pub fn page_offset(&self, page: PageNo) -> u64 {
        page * self.page_size
    }

    /// Returns the position of `offset` within its page.
    #[inline]
    pub fn offset_in_page(&self, offset: u64) -> usize {
        (offset % self.page_size) as usize
    }

    /// Returns the resident length of `page`.
    #[inline]
    pub fn page_len(&self, page: PageNo) -> usize {
        last_page_size(self.file_size, self.page_size, page)
    }

    /// Returns the page range covering `[offset, offset + length)`.
    #[inline]
    pub fn page_range(&self, offset: u64, length: u64) -> PageRange {
        page_range_for_byte_range(self.page_size, offset, length)
    }

    /// Returns the starting offset and byte length of a page range.
    pub fn byte_span(&self, range: PageRange) -> (u64, u64) {
        let start = self.page_offset(range.start);
        let end = (self.page_offset(range.end) + self.page_size).min(self.file_size);
        (start, end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range_for_byte_range() {
        assert_eq!(page_range_for_byte_range(8, 0, 1), PageRange::new(0, 0));
        assert_eq!(page_range_for_byte_range(8, 7, 2), PageRange::new(0, 1));
        assert_eq!(page_range_for_byte_range(8, 8, 8), PageRange::new(1, 1));
        assert_eq!(page_range_for_byte_range(8, 31, 19), PageRange::new(3, 6));
    }

    #[test]
    fn test_last_page_size() {
        assert_eq!(last_page_size(50, 8, 0), 8);
        assert_eq!(last_page_size(50, 8, 5), 8);
        assert_eq!(last_page_size(50, 8, 6), 2);
        assert_eq!(last_page_size(48, 8, 5), 8);
    }

    #[test]
    fn test_page_range_len_and_contains() {
        let range = PageRange::new(3, 6);
        assert_eq!(range.len(), 4);
        assert!(range.contains(3));
        assert!(range.contains(6));
        assert!(!range.contains(7));
        assert_eq!(range.pages().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert_eq!(PageRange::single(2).len(), 1);
    }

    #[test]
    fn test_page_range_display() {
        assert_eq!(PageRange::single(4).to_string(), "page 4");
        assert_eq!(PageRange::new(5, 6).to_string(), "pages 5-6");
    }

    #[test]
    fn test_geometry_page_count() {
        assert_eq!(PageGeometry::new(50, 8).page_count(), 7);
        assert_eq!(PageGeometry::new(48, 8).page_count(), 6);
        assert_eq!(PageGeometry::new(0, 8).page_count(), 0);
        assert_eq!(PageGeometry::new(1, 4096).page_count(), 1);
    }

    #[test]
    fn test_geometry_byte_span() {
        let geometry = PageGeometry::new(50, 8);
        assert_eq!(geometry.byte_span(PageRange::new(0, 1)), (0, 16));
        assert_eq!(geometry.byte_span(PageRange::single(4)), (32, 8));
        assert_eq!(geometry.byte_span(PageRange::new(5, 6)), (40, 10));
    }

    #[test]
    fn test_geometry_offsets() {
        let geometry = PageGeometry::new(50, 8);
        assert_eq!(geometry.page_offset(3), 24);
        assert_eq!(geometry.offset_in_page(31), 7);
        assert_eq!(geometry.page_len(6), 2);
        assert_eq!(geometry.page_range(47, 3), PageRange::new(5, 6));
    }

    #[test]
    #[should_panic(expected = "page size must be positive")]
    fn test_geometry_rejects_zero_page_size() {
        PageGeometry::new(50, 0);
    }

    #[test]
    fn test_page_range_serde_roundtrip() {
        let range = PageRange::new(1, 9);
        let serialized = serde_json::to_string(&range).unwrap();
        let deserialized: PageRange = serde_json::from_str(&serialized).unwrap();
        assert_eq!(range, deserialized);
    }
}
