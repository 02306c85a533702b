//! Positional byte I/O for filebuf.
//!
//! This crate provides:
//! - The `BackingStore` contract for fixed-extent random-access stores
//! - `File` support with scatter/gather `preadv`/`pwritev` on Linux
//! - An in-memory store with a call log for testing and modelling
//! - The vectored executor that batches segments and resumes short transfers

mod memory;
mod store;
mod vectored;

pub use memory::{IoCall, MemoryStore};
#[cfg(target_os = "linux")]
pub use store::os_segment_limit;
pub use store::{open_file, BackingStore, DEFAULT_SEGMENT_LIMIT};
pub use vectored::{effective_segment_limit, read_full_at, write_full_at};
