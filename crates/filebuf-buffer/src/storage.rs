//! Resident page storage.
//!
//! Two strategies hold the bytes of fetched or written pages:
//! - `SparsePages` allocates one buffer per touched page, on demand
//! - `ContiguousPages` mirrors the whole file in one allocation
//!
//! `AnyPages` picks one of them at runtime from a `BufferConfig`.

use filebuf_common::{BufferConfig, PageGeometry, PageNo, PageRange, StorageStrategy};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use sysinfo::System;

/// In-memory home for page bytes.
pub trait PageStorage {
    /// Returns the buffer for `page`, zero-filled on first access.
    ///
    /// The buffer is `page_size` bytes long except for the last page of the
    /// file, which is truncated at end of file.
    fn page(&mut self, page: PageNo) -> &mut [u8];

    /// Returns the buffer for `page` if it has been allocated.
    fn get(&self, page: PageNo) -> Option<&[u8]>;

    /// Returns the buffers for `range` in page order, allocating as needed.
    ///
    /// Concatenated, the segments cover exactly the range's byte span.
    fn segments(&mut self, range: PageRange) -> Vec<&mut [u8]>;

    /// Returns `length` bytes at `offset` as one slice, if the strategy
    /// keeps pages adjacent in memory.
    fn view(&self, _offset: u64, _length: usize) -> Option<&[u8]> {
        None
    }

    /// Returns the number of pages with an allocated buffer.
    fn resident_pages(&self) -> u64;

    /// Returns the bytes held by page buffers.
    fn resident_bytes(&self) -> u64;
}

/// Lazily allocated per-page buffers.
#[derive(Debug)]
pub struct SparsePages {
    geometry: PageGeometry,
    /// Page buffers keyed by page number.
    pages: BTreeMap<PageNo, Box<[u8]>>,
    /// Sum of buffer lengths in `pages`.
    resident_bytes: u64,
}

impl SparsePages {
    /// Creates an empty store for `geometry`. Nothing is allocated yet.
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: BTreeMap::new(),
            resident_bytes: 0,
        }
    }
}

impl PageStorage for SparsePages {
    fn page(&mut self, page: PageNo) -> &mut [u8] {
        debug_assert!(page < self.geometry.page_count());
        match self.pages.entry(page) {
            Entry::Occupied(entry) => &mut entry.into_mut()[..],
            Entry::Vacant(entry) => {
                let len = self.geometry.page_len(page);
                self.resident_bytes += len as u64;
                &mut entry.insert(vec![0u8; len].into_boxed_slice())[..]
            }
        }
    }

    fn get(&self, page: PageNo) -> Option<&[u8]> {
        self.pages.get(&page).map(|buf| &buf[..])
    }

    fn segments(&mut self, range: PageRange) -> Vec<&mut [u8]> {
        for page in range.pages() {
            self.page(page);
        }
        self.pages
            .range_mut(range.start..=range.end)
            .map(|(_, buf)| &mut buf[..])
            .collect()
    }

    fn resident_pages(&self) -> u64 {
        self.pages.len() as u64
    }

    fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }
}

/// One buffer mirroring the whole file.
#[derive(Debug)]
pub struct ContiguousPages {
    geometry: PageGeometry,
    data: Vec<u8>,
}

impl ContiguousPages {
    /// Creates a zero-filled mirror of `geometry.file_size()` bytes.
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            data: vec![0u8; geometry.file_size() as usize],
        }
    }

    fn span(&self, range: PageRange) -> std::ops::Range<usize> {
        let (offset, len) = self.geometry.byte_span(range);
        offset as usize..(offset + len) as usize
    }
}

impl PageStorage for ContiguousPages {
    fn page(&mut self, page: PageNo) -> &mut [u8] {
        let span = self.span(PageRange::single(page));
        &mut self.data[span]
    }

    fn get(&self, page: PageNo) -> Option<&[u8]> {
        Some(&self.data[self.span(PageRange::single(page))])
    }

    fn segments(&mut self, range: PageRange) -> Vec<&mut [u8]> {
        let span = self.span(range);
        vec![&mut self.data[span]]
    }

    fn view(&self, offset: u64, length: usize) -> Option<&[u8]> {
        let start = offset as usize;
        Some(&self.data[start..start + length])
    }

    fn resident_pages(&self) -> u64 {
        self.geometry.page_count()
    }

    fn resident_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Storage strategy selected at runtime.
#[derive(Debug)]
pub enum AnyPages {
    Sparse(SparsePages),
    Contiguous(ContiguousPages),
}

impl AnyPages {
    /// Creates storage for `geometry` using the strategy in `config`.
    ///
    /// `Auto` queries available system memory and mirrors the file when it
    /// fits in `auto_memory_fraction` of it.
    pub fn for_config(geometry: PageGeometry, config: &BufferConfig) -> Self {
        let strategy = match config.strategy {
            StorageStrategy::Auto => {
                let mut sys = System::new();
                sys.refresh_memory();
                let budget = config.auto_budget_bytes(sys.available_memory());
                choose_strategy(geometry.file_size(), budget)
            }
            explicit => explicit,
        };
        Self::with_strategy(geometry, strategy)
    }

    /// Creates storage for `geometry` with an explicit strategy.
    ///
    /// `Auto` falls back to sparse storage.
    pub fn with_strategy(geometry: PageGeometry, strategy: StorageStrategy) -> Self {
        match strategy {
            StorageStrategy::Contiguous => AnyPages::Contiguous(ContiguousPages::new(geometry)),
            StorageStrategy::Sparse | StorageStrategy::Auto => {
                AnyPages::Sparse(SparsePages::new(geometry))
            }
        }
    }

    /// Returns the strategy in use.
    pub fn strategy(&self) -> StorageStrategy {
        match self {
            AnyPages::Sparse(_) => StorageStrategy::Sparse,
            AnyPages::Contiguous(_) => StorageStrategy::Contiguous,
        }
    }
}

/// Picks contiguous storage when a file of `file_size` bytes fits in
/// `budget_bytes`.
pub fn choose_strategy(file_size: u64, budget_bytes: u64) -> StorageStrategy {
    if file_size <= budget_bytes {
        StorageStrategy::Contiguous
    } else {
        StorageStrategy::Sparse
    }
}

impl PageStorage for AnyPages {
    fn page(&mut self, page: PageNo) -> &mut [u8] {
        match self {
            AnyPages::Sparse(p) => p.page(page),
            AnyPages::Contiguous(p) => p.page(page),
        }
    }

    fn get(&self, page: PageNo) -> Option<&[u8]> {
        match self {
            AnyPages::Sparse(p) => p.get(page),
            AnyPages::Contiguous(p) => p.get(page),
        }
    }

    fn segments(&mut self, range: PageRange) -> Vec<&mut [u8]> {
        match self {
            AnyPages::Sparse(p) => p.segments(range),
            AnyPages::Contiguous(p) => p.segments(range),
        }
    }

    fn view(&self, offset: u64, length: usize) -> Option<&[u8]> {
        match self {
            AnyPages::Sparse(p) => p.view(offset, length),
            AnyPages::Contiguous(p) => p.view(offset, length),
        }
    }

    fn resident_pages(&self) -> u64 {
        match self {
            AnyPages::Sparse(p) => p.resident_pages(),
            AnyPages::Contiguous(p) => p.resident_pages(),
        }
    }

    fn resident_bytes(&self) -> u64 {
        match self {
            AnyPages::Sparse(p) => p.resident_bytes(),
            AnyPages::Contiguous(p) => p.resident_bytes(),
        }
    }
}
