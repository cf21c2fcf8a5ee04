//! Persistent map from file id to its ordered part list.
//!
//! One KV bucket, key = file id, value = the serialised asset list. The list
//! is written in a single put on file close, entirely replaced on overwrite,
//! and deleted on truncate or removal, so a file's parts are always observed
//! all-or-nothing.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use partfs_meta::KvStore;

use crate::error::{StorageError, StorageResult};
use crate::remote::Asset;

/// Part list store over a dedicated KV bucket.
#[derive(Clone)]
pub struct PartIndex {
    kv: Arc<dyn KvStore>,
}

impl PartIndex {
    /// Opens the index over `kv`.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Atomically replaces the part list of `file_id`.
    pub fn commit(&self, file_id: &str, assets: &[Asset]) -> StorageResult<()> {
        let data =
            serde_json::to_vec(assets).map_err(|e| StorageError::Codec(e.to_string()))?;
        self.kv.put(file_id.as_bytes().to_vec(), data)?;
        debug!(file_id, parts = assets.len(), "committed part list");
        Ok(())
    }

    /// The parts of `file_id` sorted by part number. Empty when unrecorded.
    pub fn get(&self, file_id: &str) -> StorageResult<Vec<Asset>> {
        let mut assets: Vec<Asset> = match self.kv.get(file_id.as_bytes())? {
            Some(data) => {
                serde_json::from_slice(&data).map_err(|e| StorageError::Codec(e.to_string()))?
            }
            None => Vec::new(),
        };
        assets.sort_by_key(|a| a.part_number);
        Ok(assets)
    }

    /// Total byte size of the file: the sum of its part sizes.
    pub fn size(&self, file_id: &str) -> StorageResult<u64> {
        Ok(self.get(file_id)?.iter().map(|a| a.size).sum())
    }

    /// Drops the part list of `file_id`. Absent entries are ignored.
    pub fn remove(&self, file_id: &str) -> StorageResult<()> {
        self.kv.delete(file_id.as_bytes())?;
        debug!(file_id, "dropped part list");
        Ok(())
    }

    /// Remote ids of every asset referenced by any part list.
    pub fn referenced_remote_ids(&self) -> StorageResult<HashSet<u64>> {
        let mut ids = HashSet::new();
        for (_, value) in self.kv.scan_prefix(b"")? {
            let assets: Vec<Asset> =
                serde_json::from_slice(&value).map_err(|e| StorageError::Codec(e.to_string()))?;
            ids.extend(assets.iter().map(|a| a.remote_id));
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partfs_meta::MemoryKvStore;

    fn asset(remote_id: u64, size: u64, part_number: u64) -> Asset {
        Asset {
            remote_id,
            name: format!("a{}", remote_id),
            username: "owner".to_string(),
            repository: "blobs".to_string(),
            release_id: 1,
            release_tag: "v1".to_string(),
            size,
            part_number,
        }
    }

    fn new_index() -> PartIndex {
        PartIndex::new(Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn test_get_unrecorded_is_empty() {
        let index = new_index();
        assert!(index.get("ghost").unwrap().is_empty());
        assert_eq!(index.size("ghost").unwrap(), 0);
    }

    #[test]
    fn test_commit_get_sorted_by_part_number() {
        let index = new_index();
        index
            .commit("f1", &[asset(30, 10, 3), asset(10, 20, 1), asset(20, 30, 2)])
            .unwrap();

        let parts = index.get("f1").unwrap();
        let numbers: Vec<u64> = parts.iter().map(|a| a.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(index.size("f1").unwrap(), 60);
    }

    #[test]
    fn test_commit_replaces_entirely() {
        let index = new_index();
        index
            .commit("f1", &[asset(1, 10, 1), asset(2, 10, 2)])
            .unwrap();
        index.commit("f1", &[asset(3, 5, 1)]).unwrap();

        let parts = index.get("f1").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].remote_id, 3);
        assert_eq!(index.size("f1").unwrap(), 5);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let index = new_index();
        index.commit("f1", &[asset(1, 10, 1)]).unwrap();
        index.remove("f1").unwrap();
        assert!(index.get("f1").unwrap().is_empty());
        index.remove("f1").unwrap();
    }

    #[test]
    fn test_referenced_remote_ids_spans_files() {
        let index = new_index();
        index
            .commit("f1", &[asset(1, 10, 1), asset(2, 10, 2)])
            .unwrap();
        index.commit("f2", &[asset(7, 10, 1)]).unwrap();

        let ids = index.referenced_remote_ids().unwrap();
        assert_eq!(ids, HashSet::from([1, 2, 7]));
    }
}
