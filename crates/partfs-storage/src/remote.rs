//! The external blob service surface.
//!
//! The engine only assumes three operations from the remote side: create an
//! asset under a release, open a ranged stream over an asset, and delete an
//! asset (plus listing, which feeds the orphan sweeper). [`MemoryRemoteStore`]
//! is the in-process implementation used by tests and local development; the
//! HTTP implementation lives in [`crate::http`].

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::release::ReleaseRotator;

/// One uploaded part: the persisted descriptor binding a slice of a logical
/// file to an asset at the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset id assigned by the remote service.
    pub remote_id: u64,
    /// Opaque upload name of the asset.
    pub name: String,
    /// Credential key of the release owner; selects the read token.
    pub username: String,
    /// Repository holding the release.
    pub repository: String,
    /// Release the asset was uploaded under.
    pub release_id: u64,
    /// Tag of that release.
    pub release_tag: String,
    /// Size of the part in bytes.
    pub size: u64,
    /// 1-based position of the part within the logical file.
    pub part_number: u64,
}

impl Asset {
    /// The locator used for deletes and orphan matching.
    pub fn to_ref(&self) -> RemoteAssetRef {
        RemoteAssetRef {
            remote_id: self.remote_id,
            name: self.name.clone(),
            username: self.username.clone(),
            repository: self.repository.clone(),
            release_id: self.release_id,
        }
    }
}

/// Minimal locator for an asset at the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAssetRef {
    /// Asset id assigned by the remote service.
    pub remote_id: u64,
    /// Opaque upload name of the asset.
    pub name: String,
    /// Credential key of the release owner.
    pub username: String,
    /// Repository holding the release.
    pub repository: String,
    /// Release the asset lives under.
    pub release_id: u64,
}

/// Client surface over the external blob service.
pub trait RemoteStore: Send + Sync {
    /// Uploads `data` as a new asset named `name` under the next writable
    /// release. The returned descriptor has `part_number` zeroed; the caller
    /// assigns it.
    fn upload(&self, name: &str, data: &[u8]) -> StorageResult<Asset>;

    /// Opens a stream over the inclusive byte range `start..=end` of an
    /// asset, authorised by the token of the asset's owner.
    fn open_range(&self, asset: &Asset, start: u64, end: u64)
        -> StorageResult<Box<dyn Read + Send>>;

    /// Deletes an asset.
    fn delete(&self, asset: &RemoteAssetRef) -> StorageResult<()>;

    /// Lists every asset under the configured releases.
    fn list_assets(&self) -> StorageResult<Vec<RemoteAssetRef>>;
}

struct StoredAsset {
    data: Vec<u8>,
    aref: RemoteAssetRef,
}

/// In-memory [`RemoteStore`] with byte-accurate ranged reads.
pub struct MemoryRemoteStore {
    rotator: Arc<ReleaseRotator>,
    objects: Mutex<HashMap<u64, StoredAsset>>,
    next_id: AtomicU64,
    fail_uploads: AtomicBool,
}

impl MemoryRemoteStore {
    /// Creates a store rotating over the given releases.
    pub fn new(rotator: Arc<ReleaseRotator>) -> Self {
        Self {
            rotator,
            objects: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent upload fail, for error-path tests.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Number of assets currently stored.
    pub fn asset_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn upload(&self, name: &str, data: &[u8]) -> StorageResult<Asset> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Remote {
                status: 500,
                message: "injected upload failure".to_string(),
            });
        }

        let release = self.rotator.next_writable();
        let remote_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let asset = Asset {
            remote_id,
            name: name.to_string(),
            username: release.username,
            repository: release.repository,
            release_id: release.release_id,
            release_tag: release.release_tag,
            size: data.len() as u64,
            part_number: 0,
        };
        self.objects.lock().unwrap().insert(
            remote_id,
            StoredAsset {
                data: data.to_vec(),
                aref: asset.to_ref(),
            },
        );
        Ok(asset)
    }

    fn open_range(
        &self,
        asset: &Asset,
        start: u64,
        end: u64,
    ) -> StorageResult<Box<dyn Read + Send>> {
        if self.rotator.token_for(&asset.username).is_none() {
            return Err(StorageError::MissingToken {
                username: asset.username.clone(),
            });
        }

        let objects = self.objects.lock().unwrap();
        let stored = objects.get(&asset.remote_id).ok_or(StorageError::Remote {
            status: 404,
            message: format!("asset {} not found", asset.remote_id),
        })?;
        if start > end || end >= stored.data.len() as u64 {
            return Err(StorageError::Remote {
                status: 416,
                message: format!(
                    "range {}-{} outside asset of {} bytes",
                    start,
                    end,
                    stored.data.len()
                ),
            });
        }
        let slice = stored.data[start as usize..=end as usize].to_vec();
        Ok(Box::new(Cursor::new(slice)))
    }

    fn delete(&self, asset: &RemoteAssetRef) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(&asset.remote_id);
        Ok(())
    }

    fn list_assets(&self) -> StorageResult<Vec<RemoteAssetRef>> {
        let objects = self.objects.lock().unwrap();
        let mut refs: Vec<RemoteAssetRef> = objects.values().map(|s| s.aref.clone()).collect();
        refs.sort_by_key(|r| r.remote_id);
        Ok(refs)
    }
}
