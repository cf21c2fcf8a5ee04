//! Storage engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::release::ReleaseConfig;

/// Largest allowed base part size. Chosen so a part jittered up by 20% still
/// fits under the remote service's 2 GiB single-upload limit.
pub const MAX_PART_SIZE: u64 = 2 * 1024 * 1024 * 1024 - (2 * 1024 * 1024 * 1024) / 5;

/// Configuration recognised by the storage core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base part size in bytes; each writer jitters it by ±20%.
    pub part_size: u64,
    /// Number of parallel upload workers per writer.
    pub concurrency: usize,
    /// Upload targets and read credentials.
    pub releases: Vec<ReleaseConfig>,
}

impl StorageConfig {
    /// Checks the configuration invariants.
    pub fn validate(&self) -> StorageResult<()> {
        if self.part_size == 0 || self.part_size > MAX_PART_SIZE {
            return Err(StorageError::InvalidConfig(format!(
                "part size must be in 1..={} bytes, got {}",
                MAX_PART_SIZE, self.part_size
            )));
        }
        if self.concurrency == 0 {
            return Err(StorageError::InvalidConfig(
                "concurrency must be positive".to_string(),
            ));
        }
        if self.releases.is_empty() {
            return Err(StorageError::InvalidConfig(
                "at least one release must be configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> ReleaseConfig {
        ReleaseConfig {
            read_only: false,
            username: "owner".to_string(),
            auth_token: "tok".to_string(),
            repository: "blobs".to_string(),
            release_id: 1,
            release_tag: "v1".to_string(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = StorageConfig {
            part_size: 1024,
            concurrency: 4,
            releases: vec![release()],
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_max_part_size_respects_upload_limit() {
        // part_size * 1.2 must stay within 2 GiB.
        let limit = 2u64 * 1024 * 1024 * 1024;
        assert!(MAX_PART_SIZE + MAX_PART_SIZE / 5 <= limit);
    }

    #[test]
    fn test_zero_part_size_rejected() {
        let config = StorageConfig {
            part_size: 0,
            concurrency: 4,
            releases: vec![release()],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_part_rejected() {
        let config = StorageConfig {
            part_size: MAX_PART_SIZE + 1,
            concurrency: 4,
            releases: vec![release()],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = StorageConfig {
            part_size: 1024,
            concurrency: 0,
            releases: vec![release()],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_releases_rejected() {
        let config = StorageConfig {
            part_size: 1024,
            concurrency: 1,
            releases: Vec::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialises_from_json() {
        let raw = r#"{
            "part_size": 8388608,
            "concurrency": 3,
            "releases": [{
                "username": "owner",
                "auth_token": "tok",
                "repository": "blobs",
                "release_id": 5,
                "release_tag": "v5"
            }]
        }"#;
        let config: StorageConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert!(!config.releases[0].read_only);
        config.validate().unwrap();
    }
}
