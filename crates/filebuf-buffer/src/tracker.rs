//! Per-page bit tracking.
//!
//! A buffer keeps two independent bitmaps, one for pages already read from
//! the backing store and one for pages modified since the last flush. Both
//! answer their range queries as coalesced, ascending, non-overlapping
//! `PageRange`s so that every run turns into a single vectored call.

use filebuf_common::{PageNo, PageRange};

const WORD_BITS: u64 = 64;

/// Fixed-length bit vector with one bit per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBitmap {
    /// Bits packed 64 pages per word, page 0 in the lowest bit of word 0.
    words: Vec<u64>,
    /// Number of tracked pages.
    len: u64,
}

impl PageBitmap {
    /// Creates a bitmap for `len` pages with every bit unset.
    pub fn new(len: u64) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS) as usize],
            len,
        }
    }

    /// Returns the number of tracked pages.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit for `page`.
    #[inline]
    pub fn set(&mut self, page: PageNo) {
        debug_assert!(page < self.len, "page {} beyond bitmap of {}", page, self.len);
        self.words[(page / WORD_BITS) as usize] |= 1 << (page % WORD_BITS);
    }

    /// Returns true if the bit for `page` is set.
    #[inline]
    pub fn test(&self, page: PageNo) -> bool {
        debug_assert!(page < self.len, "page {} beyond bitmap of {}", page, self.len);
        self.words[(page / WORD_BITS) as usize] >> (page % WORD_BITS) & 1 == 1
    }

    /// Sets every bit in `range`.
    pub fn set_range(&mut self, range: PageRange) {
        self.apply_range(range, true);
    }

    /// Clears every bit in `range`.
    pub fn clear_range(&mut self, range: PageRange) {
        self.apply_range(range, false);
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Returns the number of set bits.
    pub fn count(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Returns the runs of set bits, ascending and maximally coalesced.
    pub fn coalesced_ranges(&self) -> Vec<PageRange> {
        if self.len == 0 {
            return Vec::new();
        }
        self.runs_within(PageRange::new(0, self.len - 1), true)
    }

    /// Returns the runs of unset bits inside `range`, ascending and
    /// maximally coalesced.
    pub fn unset_ranges_within(&self, range: PageRange) -> Vec<PageRange> {
        debug_assert!(range.end < self.len, "{} beyond bitmap of {}", range, self.len);
        self.runs_within(range, false)
    }

    fn apply_range(&mut self, range: PageRange, value: bool) {
        debug_assert!(range.end < self.len, "{} beyond bitmap of {}", range, self.len);
        let first = (range.start / WORD_BITS) as usize;
        let last = (range.end / WORD_BITS) as usize;

        for idx in first..=last {
            let lo = if idx == first { range.start % WORD_BITS } else { 0 };
            let hi = if idx == last { range.end % WORD_BITS } else { WORD_BITS - 1 };
            let mask = (u64::MAX << lo) & (u64::MAX >> (WORD_BITS - 1 - hi));
            if value {
                self.words[idx] |= mask;
            } else {
                self.words[idx] &= !mask;
            }
        }
    }

    /// Scans `range` for runs of bits equal to `value`.
    ///
    /// Word-aligned stretches that are entirely inside the range and
    /// uniformly zero or one are stepped over a whole word at a time.
    fn runs_within(&self, range: PageRange, value: bool) -> Vec<PageRange> {
        let mut runs = Vec::new();
        let mut run_start: Option<PageNo> = None;
        let mut page = range.start;

        while page <= range.end {
            let raw = self.words[(page / WORD_BITS) as usize];
            let word = if value { raw } else { !raw };
            let bit = page % WORD_BITS;

            if bit == 0 && range.end - page >= WORD_BITS - 1 {
                if word == 0 {
                    if let Some(start) = run_start.take() {
                        runs.push(PageRange::new(start, page - 1));
                    }
                    page += WORD_BITS;
                    continue;
                }
                if word == u64::MAX {
                    run_start.get_or_insert(page);
                    page += WORD_BITS;
                    continue;
                }
            }

            if word >> bit & 1 == 1 {
                run_start.get_or_insert(page);
            } else if let Some(start) = run_start.take() {
                runs.push(PageRange::new(start, page - 1));
            }
            page += 1;
        }

        if let Some(start) = run_start {
            runs.push(PageRange::new(start, range.end));
        }
        runs
    }
}
