//! Ranged sequential reader over an ordered list of parts.
//!
//! Presents the concatenation of the parts as one seekable-by-reopen byte
//! stream. Construction computes each part's absolute byte range as a prefix
//! sum; a read locates the part covering the current position, streams a
//! ranged request from it, and rolls over to the next part inside the same
//! call when the current one is exhausted.

use std::io::{self, Read};

use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// One part of a logical file, openable as a ranged byte stream.
///
/// `start` and `end` are inclusive byte offsets within the part, matching the
/// HTTP `Range` header the implementation typically maps to.
pub trait PartSource: Send + Sync {
    /// Size of the part in bytes.
    fn size(&self) -> u64;

    /// Opens a stream over `start..=end` within the part.
    fn open_range(&self, start: u64, end: u64) -> StorageResult<Box<dyn Read + Send>>;
}

/// Sequential reader across parts, starting at an arbitrary byte position.
pub struct PartedReader {
    parts: Vec<Box<dyn PartSource>>,
    // Absolute start offset of each part, aligned with `parts`.
    starts: Vec<u64>,
    total: u64,
    pos: u64,
    cur: usize,
    stream: Option<Box<dyn Read + Send>>,
    closed: bool,
}

impl std::fmt::Debug for PartedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartedReader")
            .field("parts", &self.parts.len())
            .field("starts", &self.starts)
            .field("total", &self.total)
            .field("pos", &self.pos)
            .field("cur", &self.cur)
            .field("stream", &self.stream.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl PartedReader {
    /// Builds a reader positioned at `pos`.
    ///
    /// Fails with [`StorageError::NoParts`] when the part list is empty. A
    /// position at or past the total size yields a reader that reports EOF
    /// immediately.
    pub fn new(parts: Vec<Box<dyn PartSource>>, pos: u64) -> StorageResult<Self> {
        if parts.is_empty() {
            return Err(StorageError::NoParts);
        }

        let mut starts = Vec::with_capacity(parts.len());
        let mut offset = 0u64;
        for part in &parts {
            starts.push(offset);
            offset += part.size();
        }
        let total = offset;

        let cur = if pos >= total {
            parts.len()
        } else {
            // First part whose range covers pos.
            let mut idx = 0;
            while idx < parts.len() && pos >= starts[idx] + parts[idx].size() {
                idx += 1;
            }
            idx
        };

        Ok(Self {
            parts,
            starts,
            total,
            pos,
            cur,
            stream: None,
            closed: false,
        })
    }

    /// Total size of the logical stream.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Fills `buf` from the current position, rolling across part boundaries.
    /// Returns the number of bytes copied; fewer than `buf.len()` only at the
    /// end of the stream.
    pub fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut copied = 0;
        while copied < buf.len() {
            if self.cur >= self.parts.len() {
                break;
            }
            if self.stream.is_none() {
                self.open_current()?;
            }

            let stream = self.stream.as_mut().expect("stream opened above");
            let n = stream
                .read(&mut buf[copied..])
                .map_err(|e| StorageError::Io(e.to_string()))?;
            if n > 0 {
                copied += n;
                self.pos += n as u64;
                continue;
            }

            // Current part exhausted. The stream must have delivered exactly
            // up to the recorded part boundary.
            let expected = self.starts[self.cur] + self.parts[self.cur].size();
            if self.pos != expected {
                return Err(StorageError::Io(format!(
                    "part {} ended at byte {} (expected {})",
                    self.cur + 1,
                    self.pos,
                    expected
                )));
            }
            self.stream = None;
            self.cur += 1;
        }
        Ok(copied)
    }

    /// Closes the underlying stream. Any use after close fails with
    /// [`StorageError::Closed`].
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        self.closed = true;
        self.stream = None;
        Ok(())
    }

    fn open_current(&mut self) -> StorageResult<()> {
        let part = &self.parts[self.cur];
        let offset = self.pos - self.starts[self.cur];
        debug!(
            part = self.cur + 1,
            offset,
            size = part.size(),
            "opening part stream"
        );
        self.stream = Some(part.open_range(offset, part.size() - 1)?);
        Ok(())
    }
}

impl Read for PartedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        PartedReader::read(self, buf).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory part backed by a byte vector.
    struct VecPart(Vec<u8>);

    impl PartSource for VecPart {
        fn size(&self) -> u64 {
            self.0.len() as u64
        }

        fn open_range(&self, start: u64, end: u64) -> StorageResult<Box<dyn Read + Send>> {
            let slice = self.0[start as usize..=end as usize].to_vec();
            Ok(Box::new(Cursor::new(slice)))
        }
    }

    fn parts_of(sizes: &[usize]) -> (Vec<Box<dyn PartSource>>, Vec<u8>) {
        let mut all = Vec::new();
        let mut parts: Vec<Box<dyn PartSource>> = Vec::new();
        let mut next = 0u8;
        for &size in sizes {
            let data: Vec<u8> = (0..size)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            all.extend_from_slice(&data);
            parts.push(Box::new(VecPart(data)));
        }
        (parts, all)
    }

    #[test]
    fn test_empty_part_list_is_no_parts() {
        let err = PartedReader::new(Vec::new(), 0).unwrap_err();
        assert!(matches!(err, StorageError::NoParts));
    }

    #[test]
    fn test_read_all_from_start() {
        let (parts, all) = parts_of(&[5, 3, 9]);
        let mut reader = PartedReader::new(parts, 0).unwrap();
        let mut buf = vec![0u8; all.len()];
        assert_eq!(reader.read(&mut buf).unwrap(), all.len());
        assert_eq!(buf, all);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_spans_parts_in_one_call() {
        // Parts of 100/50/75: reading 30 bytes from position 90 returns the
        // last 10 bytes of part one followed by 20 bytes of part two.
        let (parts, all) = parts_of(&[100, 50, 75]);
        let mut reader = PartedReader::new(parts, 90).unwrap();
        let mut buf = vec![0u8; 30];
        assert_eq!(reader.read(&mut buf).unwrap(), 30);
        assert_eq!(buf, &all[90..120]);
    }

    #[test]
    fn test_read_from_offset_within_later_part() {
        let (parts, all) = parts_of(&[4, 4, 4]);
        let mut reader = PartedReader::new(parts, 9).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, &all[9..]);
    }

    #[test]
    fn test_position_at_total_reads_eof() {
        let (parts, _) = parts_of(&[4, 4]);
        let mut reader = PartedReader::new(parts, 8).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_position_past_total_reads_eof() {
        let (parts, _) = parts_of(&[4, 4]);
        let mut reader = PartedReader::new(parts, 100).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_close_then_read_fails() {
        let (parts, _) = parts_of(&[4]);
        let mut reader = PartedReader::new(parts, 0).unwrap();
        reader.close().unwrap();
        let mut buf = [0u8; 2];
        assert!(matches!(
            reader.read(&mut buf).unwrap_err(),
            StorageError::Closed
        ));
        assert!(matches!(reader.close().unwrap_err(), StorageError::Closed));
    }

    #[test]
    fn test_short_part_stream_is_an_error() {
        /// Claims 8 bytes but serves only 4.
        struct LyingPart;
        impl PartSource for LyingPart {
            fn size(&self) -> u64 {
                8
            }
            fn open_range(&self, _: u64, _: u64) -> StorageResult<Box<dyn Read + Send>> {
                Ok(Box::new(Cursor::new(vec![0u8; 4])))
            }
        }

        let mut reader = PartedReader::new(vec![Box::new(LyingPart)], 0).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            reader.read(&mut buf).unwrap_err(),
            StorageError::Io(_)
        ));
    }

    #[test]
    fn test_total_size() {
        let (parts, _) = parts_of(&[10, 20, 30]);
        let reader = PartedReader::new(parts, 0).unwrap();
        assert_eq!(reader.total_size(), 60);
    }
}
