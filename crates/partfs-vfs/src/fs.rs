//! The filesystem facade binding metadata and storage.

use std::sync::Arc;

use tracing::debug;

use partfs_meta::{MetaError, MetaFileSystem, Node, Timestamp};
use partfs_storage::StorageDriver;

use crate::error::VfsResult;
use crate::file::File;
use crate::flags::OpenFlags;

/// A mounted partfs instance: every front-end operation enters here.
pub struct PartFs {
    meta: Arc<dyn MetaFileSystem>,
    driver: Arc<dyn StorageDriver>,
}

impl PartFs {
    /// Builds the facade over a metadata store and a storage driver.
    pub fn new(meta: Arc<dyn MetaFileSystem>, driver: Arc<dyn StorageDriver>) -> Self {
        Self { meta, driver }
    }

    /// Name of the underlying metadata backend.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Creates (or touches) a file and opens it for writing.
    pub fn create(&self, path: &str) -> VfsResult<File> {
        self.meta.touch(path)?;
        self.open_with(path, OpenFlags::WRITE)
    }

    /// Opens a file or directory for reading.
    pub fn open(&self, path: &str) -> VfsResult<File> {
        self.open_with(path, OpenFlags::READ)
    }

    /// Opens with explicit flags.
    pub fn open_with(&self, path: &str, flags: OpenFlags) -> VfsResult<File> {
        flags.validate()?;

        let node = match self.meta.stat(path) {
            Err(MetaError::NotFound(_)) if flags.contains(OpenFlags::CREATE) => {
                return self.create(path);
            }
            other => other?,
        };

        let node = if flags.contains(OpenFlags::TRUNCATE) && !node.is_dir() {
            // Dropping the part list orphans the old assets; the metadata
            // size goes to zero in the same breath.
            if let Some(id) = node.id() {
                self.driver.truncate(id)?;
            }
            self.meta.sync(node.path(), 0)?;
            debug!(path = %node.path(), "truncated on open");
            self.meta.stat(node.path())?
        } else {
            node
        };

        Ok(File::new(
            flags,
            node,
            Arc::clone(&self.meta),
            Arc::clone(&self.driver),
        ))
    }

    /// Looks up a node.
    pub fn stat(&self, path: &str) -> VfsResult<Node> {
        Ok(self.meta.stat(path)?)
    }

    /// Lists the immediate children of a directory.
    pub fn ls(&self, path: &str, limit: i64, offset: usize) -> VfsResult<Vec<Node>> {
        Ok(self.meta.ls(path, limit, offset)?)
    }

    /// Sets a node's modification time.
    pub fn chtimes(&self, path: &str, mtime: Timestamp) -> VfsResult<()> {
        Ok(self.meta.chtimes(path, mtime)?)
    }

    /// Creates a directory.
    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        Ok(self.meta.mkdir(path)?)
    }

    /// Creates a directory and any missing ancestors.
    pub fn mkdir_all(&self, path: &str) -> VfsResult<()> {
        Ok(self.meta.mkdir_all(path)?)
    }

    /// Removes a file or empty directory.
    pub fn remove(&self, path: &str) -> VfsResult<()> {
        Ok(self.meta.remove(path)?)
    }

    /// Removes a node and its whole subtree.
    pub fn remove_all(&self, path: &str) -> VfsResult<()> {
        Ok(self.meta.remove_all(path)?)
    }

    /// Atomically moves a node and its subtree. File ids are preserved, so
    /// content stays bound without touching the part index.
    pub fn rename(&self, old: &str, new: &str) -> VfsResult<()> {
        Ok(self.meta.rename(old, new)?)
    }
}
