//! Shared definitions for filebuf.
//!
//! Page geometry, the error type and buffer configuration used by the I/O
//! and buffer crates.

pub mod config;
pub mod error;
pub mod page;

pub use config::{BufferConfig, StorageStrategy};
pub use error::{FileBufError, Result};
pub use page::{
    last_page_size, page_range_for_byte_range, PageGeometry, PageNo, PageRange,
    DEFAULT_PAGE_SIZE,
};
