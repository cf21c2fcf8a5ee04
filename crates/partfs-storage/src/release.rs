//! Upload target selection and read credentials.
//!
//! Each release is a namespaced upload target at the remote service plus the
//! credential authorising writes to it. Writable releases take uploads in
//! round-robin order; read-only releases contribute only their token to the
//! username→token map used for ranged reads.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StorageError, StorageResult};

/// One configured release: a writable (or read-only) upload namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Excluded from upload rotation when set; the token still serves reads.
    #[serde(default)]
    pub read_only: bool,
    /// Credential key owning the release's assets.
    pub username: String,
    /// Bearer token authorising uploads and reads.
    pub auth_token: String,
    /// Repository holding the release.
    pub repository: String,
    /// Numeric release handle at the remote service.
    pub release_id: u64,
    /// Human-readable release tag.
    pub release_tag: String,
}

/// Round-robin selector over writable releases.
#[derive(Debug)]
pub struct ReleaseRotator {
    all: Vec<ReleaseConfig>,
    writable: Vec<ReleaseConfig>,
    tokens: HashMap<String, String>,
    cursor: Mutex<usize>,
}

impl ReleaseRotator {
    /// Validates the release set and builds the rotation.
    ///
    /// Every release must carry a non-empty token, and at least one must be
    /// writable.
    pub fn new(releases: &[ReleaseConfig]) -> StorageResult<Self> {
        let mut tokens = HashMap::new();
        let mut writable = Vec::new();

        for release in releases {
            if release.auth_token.is_empty() {
                return Err(StorageError::InvalidConfig(format!(
                    "auth token missing for release {}",
                    release.release_id
                )));
            }
            tokens.insert(release.username.clone(), release.auth_token.clone());
            if !release.read_only {
                writable.push(release.clone());
            }
        }

        if writable.is_empty() {
            return Err(StorageError::InvalidConfig(
                "no writable release configured".to_string(),
            ));
        }

        info!(
            writable = writable.len(),
            total = releases.len(),
            "release rotation initialised"
        );
        Ok(Self {
            all: releases.to_vec(),
            writable,
            tokens,
            cursor: Mutex::new(0),
        })
    }

    /// Every configured release, read-only ones included.
    pub fn releases(&self) -> &[ReleaseConfig] {
        &self.all
    }

    /// The next writable release in round-robin order.
    pub fn next_writable(&self) -> ReleaseConfig {
        let mut cursor = self.cursor.lock().unwrap();
        let release = self.writable[*cursor].clone();
        *cursor = (*cursor + 1) % self.writable.len();
        release
    }

    /// The token for `username`, from any configured release.
    pub fn token_for(&self, username: &str) -> Option<&str> {
        self.tokens.get(username).map(String::as_str)
    }
}
