//! Serialising reader shared by the upload workers.
//!
//! All workers pull from one stream. A single mutex makes their reads
//! mutually exclusive, and every read fills the caller's buffer completely
//! unless EOF or an error intervenes, so each worker walks away with one
//! contiguous, non-interleaved chunk of the stream.

use std::io::{self, Read};
use std::sync::Mutex;

/// One chunk consumed from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based sequence number in stream-consumption order.
    pub seq: u64,
    /// Number of valid bytes in the caller's buffer.
    pub len: usize,
}

struct Inner<R> {
    reader: R,
    chunks: u64,
}

/// Mutex-guarded full-fill wrapper over a shared stream.
pub struct SyncReader<R> {
    inner: Mutex<Inner<R>>,
}

impl<R: Read> SyncReader<R> {
    /// Wraps `reader` for shared consumption.
    pub fn new(reader: R) -> Self {
        Self {
            inner: Mutex::new(Inner { reader, chunks: 0 }),
        }
    }

    /// Reads until `buf` is full, EOF, or an error. Serialised across callers.
    pub fn read_full(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        fill(&mut inner.reader, buf)
    }

    /// Reads the next chunk of the stream into `buf`.
    ///
    /// The sequence number is taken under the same lock as the read itself,
    /// so chunk order always equals stream order no matter how the calling
    /// workers are scheduled afterwards. Returns `None` at EOF.
    pub fn next_chunk(&self, buf: &mut [u8]) -> io::Result<Option<Chunk>> {
        let mut inner = self.inner.lock().unwrap();
        let len = fill(&mut inner.reader, buf)?;
        if len == 0 {
            return Ok(None);
        }
        inner.chunks += 1;
        Ok(Some(Chunk {
            seq: inner.chunks,
            len,
        }))
    }
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        let m = reader.read(&mut buf[n..])?;
        if m == 0 {
            break;
        }
        n += m;
    }
    Ok(n)
}
