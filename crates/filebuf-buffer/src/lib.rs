//! Page-aligned file buffering for filebuf.
//!
//! This crate provides:
//! - Per-page fetched and dirty tracking with run coalescing
//! - Sparse (per-page) and contiguous (whole-file) page storage
//! - The `FileBuffer` read/write facade with explicit write-back
//! - A mutex-guarded wrapper for shared access

mod buffer;
mod shared;
mod storage;
mod tracker;

pub use buffer::{FileBuffer, PagedFileBuffer, WholeFileBuffer};
pub use shared::SharedFileBuffer;
pub use storage::{choose_strategy, AnyPages, ContiguousPages, PageStorage, SparsePages};
pub use tracker::PageBitmap;
