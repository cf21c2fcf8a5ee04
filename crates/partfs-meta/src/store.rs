//! The transactional path-keyed metadata store.
//!
//! One flat bucket maps absolute cleaned paths to serialised [`Node`]s. Every
//! mutating operation serialises on a single writer lock and commits through
//! one atomic [`KvStore::write_batch`], so concurrent callers observe either
//! all of an operation's effects or none of them. Reads go straight to the KV
//! layer, where they run concurrently with each other.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{MetaError, MetaResult};
use crate::kvstore::{BatchOp, KvStore};
use crate::node::{decode_node, encode_node, Node, Timestamp};
use crate::path;

/// The metadata surface consumed by external collaborators.
///
/// Paths accepted by every method are cleaned before use, so callers may pass
/// unnormalised input.
pub trait MetaFileSystem: Send + Sync {
    /// A short name identifying the store backend.
    fn name(&self) -> &str;

    /// Creates a file or directory node at `path`.
    ///
    /// Fails with [`MetaError::AlreadyExists`] when the key exists, and with
    /// [`MetaError::NotFound`] when the parent is missing or not a directory.
    fn create(&self, path: &str, is_dir: bool) -> MetaResult<Node>;

    /// Looks up the node at `path`. The root is synthesised and always exists.
    fn stat(&self, path: &str) -> MetaResult<Node>;

    /// Lists the immediate children of a directory in key order.
    ///
    /// `limit <= 0` means unbounded; `offset` skips that many children.
    fn ls(&self, path: &str, limit: i64, offset: usize) -> MetaResult<Vec<Node>>;

    /// Sets the modification time of the node at `path`.
    fn chtimes(&self, path: &str, mtime: Timestamp) -> MetaResult<()>;

    /// Creates `path` as a file if absent; no-op when it is already a file.
    fn touch(&self, path: &str) -> MetaResult<()>;

    /// Creates a single directory.
    fn mkdir(&self, path: &str) -> MetaResult<()>;

    /// Creates a directory and any missing ancestors. Idempotent.
    fn mkdir_all(&self, path: &str) -> MetaResult<()>;

    /// Removes a file or an empty directory.
    fn remove(&self, path: &str) -> MetaResult<()>;

    /// Removes a node and its whole subtree. No-op when `path` is absent.
    fn remove_all(&self, path: &str) -> MetaResult<()>;

    /// Atomically moves a node and every descendant under a new path,
    /// preserving each node's id.
    fn rename(&self, old: &str, new: &str) -> MetaResult<()>;

    /// Publishes a new size for a file and bumps the modification time.
    /// For directories only the modification time changes.
    fn sync(&self, path: &str, size: u64) -> MetaResult<()>;

    /// Releases the store.
    fn close(&self) -> MetaResult<()>;
}

/// [`MetaFileSystem`] implementation over a [`KvStore`] bucket.
pub struct MetaStore {
    kv: Arc<dyn KvStore>,
    // Single-writer discipline: read-modify-write sequences of the mutating
    // operations must not interleave with each other.
    write_lock: Mutex<()>,
}

impl MetaStore {
    /// Opens the store over `kv`, creating the root entry if missing.
    pub fn new(kv: Arc<dyn KvStore>) -> MetaResult<Self> {
        let store = Self {
            kv,
            write_lock: Mutex::new(()),
        };
        if !store.kv.contains_key(b"/")? {
            let root = Node::new_dir("/");
            store.kv.put(b"/".to_vec(), encode_node(&root)?)?;
            debug!("meta store initialised with fresh root");
        }
        Ok(store)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap()
    }

    fn get_node(&self, path: &str) -> MetaResult<Node> {
        match self.kv.get(path.as_bytes())? {
            Some(data) => decode_node(&data),
            None => Err(MetaError::NotFound(path.to_string())),
        }
    }

    /// The parent of `path` must exist and be a directory. The root parent is
    /// always valid.
    fn check_parent_dir(&self, path_str: &str) -> MetaResult<()> {
        let parent = path::parent(path_str);
        if parent == "/" {
            return Ok(());
        }
        let node = self
            .get_node(&parent)
            .map_err(|_| MetaError::NotFound(parent.clone()))?;
        if !node.is_dir() {
            return Err(MetaError::NotFound(parent));
        }
        Ok(())
    }

    fn put_op(node: &Node) -> MetaResult<BatchOp> {
        Ok(BatchOp::Put {
            key: node.path().as_bytes().to_vec(),
            value: encode_node(node)?,
        })
    }
}

impl MetaFileSystem for MetaStore {
    fn name(&self) -> &str {
        "partfs"
    }

    fn create(&self, path_str: &str, is_dir: bool) -> MetaResult<Node> {
        let path_str = path::clean(path_str);
        let _guard = self.lock_writes();

        if self.kv.contains_key(path_str.as_bytes())? {
            return Err(MetaError::AlreadyExists(path_str));
        }
        self.check_parent_dir(&path_str)?;

        let node = if is_dir {
            Node::new_dir(&path_str)
        } else {
            Node::new_file(&path_str)
        };
        self.kv.write_batch(vec![Self::put_op(&node)?])?;
        debug!(path = %path_str, is_dir, "created node");
        Ok(node)
    }

    fn stat(&self, path_str: &str) -> MetaResult<Node> {
        if path_str.is_empty() || path_str == "/" {
            return Ok(Node::new_dir("/"));
        }
        self.get_node(&path::clean(path_str))
    }

    fn ls(&self, path_str: &str, limit: i64, offset: usize) -> MetaResult<Vec<Node>> {
        let clean = path::clean(path_str);
        let info = self.stat(&clean)?;
        if !info.is_dir() {
            return Err(MetaError::NotADirectory(clean));
        }

        let prefix = if clean == "/" {
            "/".to_string()
        } else {
            format!("{}/", clean)
        };

        let mut nodes = Vec::new();
        let mut skipped = 0usize;
        for (key, value) in self.kv.scan_prefix(prefix.as_bytes())? {
            let key = String::from_utf8(key).map_err(|e| MetaError::Codec(e.to_string()))?;
            // Immediate children only: the remainder after the prefix must
            // not contain another separator. The root key itself is scanned
            // by its own prefix and skipped here.
            if key == "/" {
                continue;
            }
            let rel = &key[prefix.len()..];
            if rel.contains('/') {
                continue;
            }

            if skipped < offset {
                skipped += 1;
                continue;
            }
            if limit > 0 && nodes.len() >= limit as usize {
                break;
            }
            nodes.push(decode_node(&value)?);
        }
        Ok(nodes)
    }

    fn chtimes(&self, path_str: &str, mtime: Timestamp) -> MetaResult<()> {
        let path_str = path::clean(path_str);
        let _guard = self.lock_writes();

        let mut node = self.get_node(&path_str)?;
        node.set_mod_time(mtime);
        Ok(self.kv.write_batch(vec![Self::put_op(&node)?])?)
    }

    fn touch(&self, path_str: &str) -> MetaResult<()> {
        let path_str = path::clean(path_str);
        match self.stat(&path_str) {
            Err(MetaError::NotFound(_)) => self.create(&path_str, false).map(|_| ()),
            Err(err) => Err(err),
            Ok(node) if node.is_dir() => Err(MetaError::AlreadyExists(path_str)),
            Ok(_) => Ok(()),
        }
    }

    fn mkdir(&self, path_str: &str) -> MetaResult<()> {
        self.create(path_str, true).map(|_| ())
    }

    fn mkdir_all(&self, path_str: &str) -> MetaResult<()> {
        let clean = path::clean(path_str);
        if clean == "/" {
            return Ok(());
        }

        // Walk the ancestor chain top-down, creating whatever is missing.
        // AlreadyExists from a concurrent creator is not an error.
        let mut prefix = String::new();
        for comp in clean.trim_start_matches('/').split('/') {
            prefix.push('/');
            prefix.push_str(comp);
            match self.create(&prefix, true) {
                Ok(_) | Err(MetaError::AlreadyExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn remove(&self, path_str: &str) -> MetaResult<()> {
        let path_str = path::clean(path_str);
        let _guard = self.lock_writes();

        let node = self.get_node(&path_str)?;
        if node.is_dir() {
            let prefix = format!("{}/", path_str);
            if !self.kv.scan_prefix(prefix.as_bytes())?.is_empty() {
                return Err(MetaError::NotEmpty(path_str));
            }
        }
        self.kv.write_batch(vec![BatchOp::Delete {
            key: path_str.as_bytes().to_vec(),
        }])?;
        debug!(path = %path_str, "removed node");
        Ok(())
    }

    fn remove_all(&self, path_str: &str) -> MetaResult<()> {
        let path_str = path::clean(path_str);
        if path_str == "/" {
            return Err(MetaError::InvalidRootOperation);
        }
        let _guard = self.lock_writes();

        if !self.kv.contains_key(path_str.as_bytes())? {
            return Ok(());
        }

        let prefix = format!("{}/", path_str);
        let mut batch: Vec<BatchOp> = self
            .kv
            .scan_prefix(prefix.as_bytes())?
            .into_iter()
            .map(|(key, _)| BatchOp::Delete { key })
            .collect();
        let descendants = batch.len();
        batch.push(BatchOp::Delete {
            key: path_str.as_bytes().to_vec(),
        });
        self.kv.write_batch(batch)?;
        debug!(path = %path_str, descendants, "removed subtree");
        Ok(())
    }

    fn rename(&self, old: &str, new: &str) -> MetaResult<()> {
        let old = path::clean(old);
        let new = path::clean(new);

        if old == "/" {
            return Err(MetaError::InvalidRootOperation);
        }
        if new == old || new.starts_with(&format!("{}/", old)) {
            return Err(MetaError::InvalidOperation { old, new });
        }

        let _guard = self.lock_writes();

        if self.kv.contains_key(new.as_bytes())? {
            return Err(MetaError::AlreadyExists(new));
        }
        let mut top = self.get_node(&old)?;
        self.check_parent_dir(&new)?;

        // One batch rebinds the whole subtree: the top node plus every key
        // under old + "/", each rewritten with its new path and unchanged id.
        let mut batch = Vec::new();
        top.set_path(new.clone());
        batch.push(BatchOp::Delete {
            key: old.as_bytes().to_vec(),
        });
        batch.push(Self::put_op(&top)?);

        let old_prefix = format!("{}/", old);
        let new_prefix = format!("{}/", new);
        let mut moved = 0usize;
        for (key, value) in self.kv.scan_prefix(old_prefix.as_bytes())? {
            let key = String::from_utf8(key).map_err(|e| MetaError::Codec(e.to_string()))?;
            let new_key = format!("{}{}", new_prefix, &key[old_prefix.len()..]);
            let mut node = decode_node(&value)?;
            node.set_path(new_key);
            batch.push(BatchOp::Delete {
                key: key.into_bytes(),
            });
            batch.push(Self::put_op(&node)?);
            moved += 1;
        }
        self.kv.write_batch(batch)?;
        debug!(old = %old, new = %new, descendants = moved, "renamed subtree");
        Ok(())
    }

    fn sync(&self, path_str: &str, size: u64) -> MetaResult<()> {
        let path_str = path::clean(path_str);
        let _guard = self.lock_writes();

        let mut node = self.get_node(&path_str)?;
        if !node.is_dir() {
            node.set_size(size);
        }
        node.set_mod_time(Timestamp::now());
        Ok(self.kv.write_batch(vec![Self::put_op(&node)?])?)
    }

    fn close(&self) -> MetaResult<()> {
        Ok(())
    }
}
