//! Open-file state machine.
//!
//! A handle borrows a node snapshot and holds at most one active stream: a
//! parted reader or a parted writer, both opened lazily. Handles are not
//! thread-safe; concurrent access to the same file goes through separate
//! handles, which interact only via the metadata store and the part index.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::debug;

use partfs_meta::{MetaFileSystem, Node};
use partfs_storage::{FileWriter, PartedReader, StorageDriver};

use crate::error::{VfsError, VfsResult};
use crate::flags::OpenFlags;

/// An open file or directory.
pub struct File {
    node: Node,
    flags: OpenFlags,
    offset: u64,
    dir_cursor: usize,
    written: u64,
    reader: Option<PartedReader>,
    writer: Option<FileWriter>,
    meta: Arc<dyn MetaFileSystem>,
    driver: Arc<dyn StorageDriver>,
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("node", &self.node)
            .field("flags", &self.flags)
            .field("offset", &self.offset)
            .field("dir_cursor", &self.dir_cursor)
            .field("written", &self.written)
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

impl File {
    pub(crate) fn new(
        flags: OpenFlags,
        node: Node,
        meta: Arc<dyn MetaFileSystem>,
        driver: Arc<dyn StorageDriver>,
    ) -> Self {
        Self {
            node,
            flags,
            offset: 0,
            dir_cursor: 0,
            written: 0,
            reader: None,
            writer: None,
            meta,
            driver,
        }
    }

    /// The node snapshot taken when the handle was opened.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Final path component of the handle's node.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// Absolute path of the handle's node.
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// True when the handle refers to a directory.
    pub fn is_dir(&self) -> bool {
        self.node.is_dir()
    }

    /// Size of the node when the handle was opened.
    pub fn size(&self) -> u64 {
        self.node.size()
    }

    fn file_id(&self) -> VfsResult<&str> {
        // Every non-directory node carries an id.
        self.node.id().ok_or(VfsError::IsADirectory)
    }

    /// Appends bytes to the file's replacement content.
    ///
    /// The first write drops the previous part list, so an overwrite that
    /// never completes leaves the old content unreadable; this matches the
    /// write-once model where content is replaced wholesale.
    pub fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        if self.is_dir() {
            return Err(VfsError::IsADirectory);
        }
        if !self.flags.writable() {
            return Err(VfsError::NotSupported);
        }

        if self.writer.is_none() {
            let id = self.file_id()?.to_string();
            self.written = 0;
            self.driver.truncate(&id)?;
            self.writer = Some(self.driver.get_writer(&id)?);
            debug!(path = %self.node.path(), "opened write stream");
        }

        let n = self.writer.as_mut().expect("writer opened above").write(data)?;
        self.written += n as u64;
        Ok(n)
    }

    /// Reads from the current offset, opening the part stream on demand.
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if self.is_dir() {
            return Err(VfsError::IsADirectory);
        }

        if self.reader.is_none() {
            let id = self.file_id()?.to_string();
            self.reader = Some(self.driver.get_reader(&id, self.offset)?);
            debug!(path = %self.node.path(), offset = self.offset, "opened read stream");
        }

        let n = self.reader.as_mut().expect("reader opened above").read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Repositions the handle.
    ///
    /// Any open read stream is dropped; the next read reopens at the new
    /// position, paying one ranged request. The offset resolves against the
    /// size snapshot taken at open.
    pub fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        if self.is_dir() {
            return Err(VfsError::IsADirectory);
        }

        let target: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.offset as i64 + delta,
            SeekFrom::End(delta) => self.node.size() as i64 + delta,
        };
        if target < 0 {
            return Err(VfsError::InvalidSeek);
        }

        if let Some(mut reader) = self.reader.take() {
            reader.close()?;
        }
        self.offset = target as u64;
        Ok(self.offset)
    }

    /// Lists up to `n` children of a directory handle, advancing an internal
    /// cursor so repeated calls paginate monotonically. `n <= 0` returns the
    /// remainder.
    pub fn read_dir(&mut self, n: i64) -> VfsResult<Vec<Node>> {
        if !self.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        let entries = self.meta.ls(self.node.path(), n, self.dir_cursor)?;
        self.dir_cursor += entries.len();
        Ok(entries)
    }

    /// Closes the active stream. A finished writer publishes the new size to
    /// the metadata store.
    pub fn close(&mut self) -> VfsResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.close()?;
            self.meta.sync(self.node.path(), self.written)?;
            debug!(path = %self.node.path(), bytes = self.written, "write handle closed");
        }
        if let Some(mut reader) = self.reader.take() {
            reader.close()?;
        }
        Ok(())
    }

    /// Shrinking or extending in place is not supported.
    pub fn set_len(&mut self, _size: u64) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    /// Random-offset writes are not supported.
    pub fn write_at(&mut self, _data: &[u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(Into::into)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        File::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(Into::into)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
