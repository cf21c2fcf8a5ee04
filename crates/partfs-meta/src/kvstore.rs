//! Key-value abstraction backing the persisted buckets.
//!
//! The store keeps two logical buckets, one mapping paths to nodes and one
//! mapping file ids to part lists, each held by its own `KvStore` instance.
//! The trait is the seam between the metadata semantics and whatever
//! transactional KV backend hosts them: the in-memory implementation below
//! serves tests and single-process use, and a durable backend with
//! equivalent guarantees plugs in without touching the callers.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::KvError;

/// A key-value pair returned by prefix scans.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A single operation in an atomic write batch.
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put {
        /// The key to insert or update.
        key: Vec<u8>,
        /// The value to store.
        value: Vec<u8>,
    },
    /// Delete a key. Deleting an absent key is not an error.
    Delete {
        /// The key to delete.
        key: Vec<u8>,
    },
}

impl BatchOp {
    fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Key-value store with ordered iteration and atomic batches.
///
/// Contract: `scan_prefix` yields pairs in byte-lexicographic key order;
/// `write_batch` applies all of its operations or none of them; individual
/// reads never observe a half-applied batch. Keys must be non-empty (every
/// key the store hosts is a cleaned absolute path or a file id; the empty
/// key would alias the scan-everything prefix).
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns `None` if the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Insert or overwrite a single key.
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError>;

    /// Delete a single key. Absent keys are ignored.
    fn delete(&self, key: &[u8]) -> Result<(), KvError>;

    /// All pairs whose key starts with `prefix`, in byte-lexicographic order.
    /// An empty prefix scans the whole bucket.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, KvError>;

    /// Returns true if the key exists.
    fn contains_key(&self, key: &[u8]) -> Result<bool, KvError>;

    /// Atomically apply a batch of puts and deletes.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), KvError>;
}

fn check_key(key: &[u8]) -> Result<(), KvError> {
    if key.is_empty() {
        return Err(KvError("empty key".to_string()));
    }
    Ok(())
}

/// In-memory KV store backed by a `BTreeMap`, so prefix scans fall out of
/// ordered range iteration. Reads run concurrently with each other; writes
/// are exclusive. A poisoned lock is recovered rather than surfaced: no
/// operation leaves the map mid-update, so the data is intact even if a
/// panicking thread died holding a guard.
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Creates a new empty in-memory KV store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    /// True when the bucket holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_map(&self) -> RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        check_key(key)?;
        Ok(self.read_map().get(key).cloned())
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError> {
        check_key(&key)?;
        self.write_map().insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        check_key(key)?;
        self.write_map().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>, KvError> {
        let map = self.read_map();
        Ok(map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool, KvError> {
        check_key(key)?;
        Ok(self.read_map().contains_key(key))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), KvError> {
        // Validate the whole batch before touching the map, so a bad op
        // cannot leave it half-applied.
        for op in &ops {
            check_key(op.key())?;
        }
        let mut map = self.write_map();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_put_get_path_key() {
        let store = MemoryKvStore::new();
        store
            .put(k("/srv/logs/app.log"), k(r#"{"size":42}"#))
            .unwrap();
        assert_eq!(
            store.get(b"/srv/logs/app.log").unwrap(),
            Some(k(r#"{"size":42}"#))
        );
        assert_eq!(store.get(b"/srv/logs/other.log").unwrap(), None);
    }

    #[test]
    fn test_delete_path_then_delete_again() {
        let store = MemoryKvStore::new();
        store.put(k("/tmp/scratch"), k("{}")).unwrap();
        store.delete(b"/tmp/scratch").unwrap();
        assert_eq!(store.get(b"/tmp/scratch").unwrap(), None);
        store.delete(b"/tmp/scratch").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan_prefix_lists_directory_keys_in_order() {
        let store = MemoryKvStore::new();
        store.put(k("/srv/www"), k("d")).unwrap();
        store.put(k("/srv/www/index.html"), k("f1")).unwrap();
        store.put(k("/srv/www/assets"), k("d")).unwrap();
        store.put(k("/srv/www/assets/logo.png"), k("f2")).unwrap();
        store.put(k("/tmp/x"), k("f3")).unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan_prefix(b"/srv/www/")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(
            keys,
            vec![
                k("/srv/www/assets"),
                k("/srv/www/assets/logo.png"),
                k("/srv/www/index.html"),
            ]
        );
    }

    #[test]
    fn test_scan_prefix_excludes_sibling_sharing_the_name() {
        // "/data" the node is not under the "/data/" prefix, and neither is
        // the lexicographic neighbour "/data0".
        let store = MemoryKvStore::new();
        store.put(k("/data"), k("d")).unwrap();
        store.put(k("/data/blob"), k("f")).unwrap();
        store.put(k("/data0"), k("f")).unwrap();

        let pairs = store.scan_prefix(b"/data/").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, k("/data/blob"));
    }

    #[test]
    fn test_scan_empty_prefix_walks_whole_bucket() {
        // The part index scans all file ids this way.
        let store = MemoryKvStore::new();
        store.put(k("4bf6dd0c2a7e4f0f"), k("[]")).unwrap();
        store.put(k("9f2c51b38d1a4e22"), k("[]")).unwrap();

        let pairs = store.scan_prefix(b"").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, k("4bf6dd0c2a7e4f0f"));
    }

    #[test]
    fn test_write_batch_moves_subtree_atomically() {
        // The shape a rename commits: delete the old keys, put the new ones.
        let store = MemoryKvStore::new();
        store.put(k("/projects"), k("dir")).unwrap();
        store.put(k("/projects/report.pdf"), k("file-a")).unwrap();

        store
            .write_batch(vec![
                BatchOp::Delete {
                    key: k("/projects"),
                },
                BatchOp::Delete {
                    key: k("/projects/report.pdf"),
                },
                BatchOp::Put {
                    key: k("/archive"),
                    value: k("dir"),
                },
                BatchOp::Put {
                    key: k("/archive/report.pdf"),
                    value: k("file-a"),
                },
            ])
            .unwrap();

        assert_eq!(store.get(b"/projects").unwrap(), None);
        assert_eq!(store.get(b"/projects/report.pdf").unwrap(), None);
        assert_eq!(store.get(b"/archive/report.pdf").unwrap(), Some(k("file-a")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_write_batch_with_bad_key_applies_nothing() {
        let store = MemoryKvStore::new();
        let err = store
            .write_batch(vec![
                BatchOp::Put {
                    key: k("/ok"),
                    value: k("v"),
                },
                BatchOp::Put {
                    key: Vec::new(),
                    value: k("v"),
                },
            ])
            .unwrap_err();
        assert!(err.0.contains("empty key"));
        assert_eq!(store.get(b"/ok").unwrap(), None);
    }

    #[test]
    fn test_empty_key_rejected_everywhere() {
        let store = MemoryKvStore::new();
        assert!(store.get(b"").is_err());
        assert!(store.put(Vec::new(), k("v")).is_err());
        assert!(store.delete(b"").is_err());
        assert!(store.contains_key(b"").is_err());
    }

    #[test]
    fn test_overwrite_replaces_part_list_value() {
        let store = MemoryKvStore::new();
        let file_id = k("9f2c51b38d1a4e22");
        store
            .put(file_id.clone(), k(r#"[{"part_number":1}]"#))
            .unwrap();
        store
            .put(file_id.clone(), k(r#"[{"part_number":1},{"part_number":2}]"#))
            .unwrap();
        assert_eq!(
            store.get(&file_id).unwrap(),
            Some(k(r#"[{"part_number":1},{"part_number":2}]"#))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_contains_key() {
        let store = MemoryKvStore::new();
        assert!(!store.contains_key(b"/etc/motd").unwrap());
        store.put(k("/etc/motd"), k("f")).unwrap();
        assert!(store.contains_key(b"/etc/motd").unwrap());
    }
}
