//! Vectored I/O executor.
//!
//! Turns an ordered list of buffers covering one contiguous byte region into
//! as few backing store calls as the store allows. Segment lists longer than
//! the per-call limit are issued in batches, and short transfers are resumed
//! from the first unconsumed byte until the whole region has moved.

use crate::store::BackingStore;
use filebuf_common::{FileBufError, Result};
use std::io::{self, IoSlice, IoSliceMut};

/// Returns the segment count to use per call for `store`.
///
/// `configured` can only lower the store's own limit. The result is at
/// least 1.
pub fn effective_segment_limit<S: BackingStore + ?Sized>(
    store: &S,
    configured: Option<usize>,
) -> usize {
    let limit = store.segment_limit();
    configured.map_or(limit, |c| c.min(limit)).max(1)
}

/// Reads `segments` back to back from `offset`, filling every byte.
///
/// At most `max_segments` segments (and never more than the store's own
/// limit) are passed to a single call.
///
/// Returns the total number of bytes read. On failure the error carries the
/// number of bytes already transferred. A store that reports end of data
/// before the region is filled yields `UnexpectedEof`.
pub fn read_full_at<S, B>(
    store: &S,
    segments: &mut [B],
    offset: u64,
    max_segments: usize,
) -> Result<usize>
where
    S: BackingStore + ?Sized,
    B: AsMut<[u8]>,
{
    let mut iovs: Vec<IoSliceMut<'_>> = segments
        .iter_mut()
        .map(|s| s.as_mut())
        .filter(|s| !s.is_empty())
        .map(IoSliceMut::new)
        .collect();
    if iovs.is_empty() {
        return Ok(0);
    }

    let limit = max_segments.min(store.segment_limit()).max(1);
    let mut bufs: &mut [IoSliceMut<'_>] = &mut iovs;
    let mut done = 0usize;

    while !bufs.is_empty() {
        let batch = bufs.len().min(limit);
        let at = offset + done as u64;
        match store.read_vectored_at(&mut bufs[..batch], at) {
            Ok(0) => {
                return Err(transfer_error(
                    at,
                    done,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "backing store returned no data"),
                ));
            }
            Ok(n) => {
                tracing::trace!(offset = at, segments = batch, bytes = n, "vectored read");
                done += n;
                IoSliceMut::advance_slices(&mut bufs, n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(transfer_error(at, done, e)),
        }
    }

    Ok(done)
}

/// Writes `segments` back to back at `offset`, persisting every byte.
///
/// Returns the total number of bytes written. On failure the error carries
/// the number of bytes already transferred. A store that accepts no bytes
/// yields `WriteZero`.
pub fn write_full_at<S, B>(
    store: &S,
    segments: &[B],
    offset: u64,
    max_segments: usize,
) -> Result<usize>
where
    S: BackingStore + ?Sized,
    B: AsRef<[u8]>,
{
    let mut iovs: Vec<IoSlice<'_>> = segments
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .map(IoSlice::new)
        .collect();
    if iovs.is_empty() {
        return Ok(0);
    }

    let limit = max_segments.min(store.segment_limit()).max(1);
    let mut bufs: &mut [IoSlice<'_>] = &mut iovs;
    let mut done = 0usize;

    while !bufs.is_empty() {
        let batch = bufs.len().min(limit);
        let at = offset + done as u64;
        match store.write_vectored_at(&bufs[..batch], at) {
            Ok(0) => {
                return Err(transfer_error(
                    at,
                    done,
                    io::Error::new(io::ErrorKind::WriteZero, "backing store accepted no data"),
                ));
            }
            Ok(n) => {
                tracing::trace!(offset = at, segments = batch, bytes = n, "vectored write");
                done += n;
                IoSlice::advance_slices(&mut bufs, n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(transfer_error(at, done, e)),
        }
    }

    Ok(done)
}

fn transfer_error(offset: u64, transferred: usize, source: io::Error) -> FileBufError {
    FileBufError::BackingStore {
        offset,
        transferred,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{IoCall, MemoryStore};

    fn pages(sizes: &[usize]) -> Vec<Vec<u8>> {
        sizes.iter().map(|&n| vec![0u8; n]).collect()
    }

    fn digits(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'0' + (i % 10) as u8).collect()
    }

    #[test]
    fn test_empty_segments_short_circuit() {
        let store = MemoryStore::new(16);
        let mut none: Vec<Vec<u8>> = Vec::new();
        assert_eq!(read_full_at(&store, &mut none, 0, 8).unwrap(), 0);

        let mut empty = pages(&[0, 0]);
        assert_eq!(read_full_at(&store, &mut empty, 0, 8).unwrap(), 0);
        assert_eq!(write_full_at(&store, &empty, 0, 8).unwrap(), 0);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_read_single_call_when_within_limit() {
        let store = MemoryStore::from_vec(digits(20));
        let mut segs = pages(&[8, 8, 4]);
        let n = read_full_at(&store, &mut segs, 0, 16).unwrap();

        assert_eq!(n, 20);
        assert_eq!(segs.concat(), digits(20));
        assert_eq!(
            store.calls(),
            vec![IoCall::Read {
                offset: 0,
                len: 20,
                segments: 3
            }]
        );
    }

    #[test]
    fn test_read_batches_by_segment_limit() {
        let store = MemoryStore::from_vec(digits(40)).with_segment_limit(2);
        let mut segs = pages(&[8, 8, 8, 8, 8]);
        let limit = effective_segment_limit(&store, None);
        let n = read_full_at(&store, &mut segs, 0, limit).unwrap();

        assert_eq!(n, 40);
        assert_eq!(segs.concat(), digits(40));
        let offsets: Vec<u64> = store.calls().iter().map(IoCall::offset).collect();
        assert_eq!(offsets, vec![0, 16, 32]);
    }

    #[test]
    fn test_read_resumes_after_short_transfer() {
        let store = MemoryStore::from_vec(digits(30)).with_max_transfer(7);
        let mut segs = pages(&[8, 8, 8, 6]);
        let n = read_full_at(&store, &mut segs, 0, 16).unwrap();

        assert_eq!(n, 30);
        assert_eq!(segs.concat(), digits(30));

        // Each reissue starts where the previous one stopped, with the
        // partially filled segment truncated.
        let calls = store.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls[1],
            IoCall::Read {
                offset: 7,
                len: 23,
                segments: 4
            }
        );
        assert_eq!(
            calls[2],
            IoCall::Read {
                offset: 14,
                len: 16,
                segments: 3
            }
        );
    }

    #[test]
    fn test_read_from_offset() {
        let store = MemoryStore::from_vec(digits(50));
        let mut segs = pages(&[8, 2]);
        read_full_at(&store, &mut segs, 40, 8).unwrap();
        assert_eq!(segs.concat(), digits(50)[40..].to_vec());
    }

    #[test]
    fn test_read_eof_reports_progress() {
        let store = MemoryStore::from_vec(digits(12));
        let mut segs = pages(&[8, 8]);
        let err = read_full_at(&store, &mut segs, 0, 8).unwrap_err();

        match err {
            FileBufError::BackingStore {
                offset,
                transferred,
                source,
            } => {
                assert_eq!(offset, 12);
                assert_eq!(transferred, 12);
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_error_is_not_retried() {
        let store = MemoryStore::from_vec(digits(32)).with_segment_limit(1);
        store.fail_at(Some(20));
        let mut segs = pages(&[8, 8, 8, 8]);
        let err = read_full_at(&store, &mut segs, 0, 1).unwrap_err();

        assert_eq!(err.transferred(), 16);
        assert_eq!(store.calls().len(), 2);
    }

    #[test]
    fn test_interrupted_calls_are_reissued() {
        let store = MemoryStore::from_vec(digits(16));
        store.interrupt_next(3);
        let mut segs = pages(&[8, 8]);
        assert_eq!(read_full_at(&store, &mut segs, 0, 4).unwrap(), 16);
        assert_eq!(segs.concat(), digits(16));
    }

    #[test]
    fn test_write_batches_and_resumes() {
        let store = MemoryStore::new(24).with_segment_limit(2).with_max_transfer(10);
        let segs: Vec<Vec<u8>> = vec![b"aaaaaaaa".to_vec(), b"bbbbbbbb".to_vec(), b"cccccccc".to_vec()];
        let n = write_full_at(&store, &segs, 0, 2).unwrap();

        assert_eq!(n, 24);
        assert_eq!(store.contents(), segs.concat());
        assert!(store.calls().iter().all(|c| !c.is_read()));
    }

    #[test]
    fn test_write_error_reports_progress() {
        let store = MemoryStore::new(24).with_segment_limit(1);
        store.fail_at(Some(9));
        let segs: Vec<Vec<u8>> = vec![vec![1u8; 8], vec![2u8; 8], vec![3u8; 8]];
        let err = write_full_at(&store, &segs, 0, 1).unwrap_err();

        assert_eq!(err.transferred(), 8);
        assert_eq!(&store.contents()[..8], &[1u8; 8]);
        assert_eq!(&store.contents()[8..], &[0u8; 16]);
    }

    #[test]
    fn test_effective_segment_limit() {
        let store = MemoryStore::new(0).with_segment_limit(64);
        assert_eq!(effective_segment_limit(&store, None), 64);
        assert_eq!(effective_segment_limit(&store, Some(8)), 8);
        assert_eq!(effective_segment_limit(&store, Some(1000)), 64);
        assert_eq!(effective_segment_limit(&store, Some(0)), 1);
    }

    #[test]
    fn test_default_vectored_falls_back_to_one_call_per_segment() {
        struct PlainStore(MemoryStore);

        impl BackingStore for PlainStore {
            fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
                self.0.read_at(buf, offset)
            }

            fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
                self.0.write_at(buf, offset)
            }
        }

        let store = PlainStore(MemoryStore::from_vec(digits(24)));
        let mut segs = pages(&[8, 8, 8]);
        let limit = effective_segment_limit(&store, None);
        assert_eq!(limit, 1);
        read_full_at(&store, &mut segs, 0, 64).unwrap();

        assert_eq!(segs.concat(), digits(24));
        let offsets: Vec<u64> = store.0.calls().iter().map(IoCall::offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
    }
}
