//! End-to-end driver tests: write streams out as parts, read stitches them
//! back, truncation and the orphan sweep manage the remote side.

use std::sync::Arc;

use partfs_meta::MemoryKvStore;
use partfs_storage::{
    Driver, MemoryRemoteStore, PartIndex, ReleaseConfig, ReleaseRotator, StorageConfig,
    StorageDriver, StorageError,
};

fn release(username: &str, id: u64, read_only: bool) -> ReleaseConfig {
    ReleaseConfig {
        read_only,
        username: username.to_string(),
        auth_token: format!("token-{}", username),
        repository: "blobs".to_string(),
        release_id: id,
        release_tag: format!("v{}", id),
    }
}

struct Fixture {
    driver: Driver,
    remote: Arc<MemoryRemoteStore>,
    index: PartIndex,
}

fn fixture(part_size: u64, concurrency: usize, releases: &[ReleaseConfig]) -> Fixture {
    let rotator = Arc::new(ReleaseRotator::new(releases).unwrap());
    let remote = Arc::new(MemoryRemoteStore::new(rotator));
    let index = PartIndex::new(Arc::new(MemoryKvStore::new()));
    let config = StorageConfig {
        part_size,
        concurrency,
        releases: releases.to_vec(),
    };
    let remote_dyn: Arc<dyn partfs_storage::RemoteStore> = remote.clone();
    let driver = Driver::new(&config, remote_dyn, index.clone()).unwrap();
    Fixture {
        driver,
        remote,
        index,
    }
}

fn write_file(driver: &Driver, file_id: &str, data: &[u8]) {
    let mut writer = driver.get_writer(file_id).unwrap();
    for piece in data.chunks(333) {
        writer.write(piece).unwrap();
    }
    writer.close().unwrap();
}

fn read_file(driver: &Driver, file_id: &str, pos: u64) -> Vec<u8> {
    let mut reader = driver.get_reader(file_id, pos).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 777];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn write_then_read_back_roundtrip() {
    let f = fixture(1024, 3, &[release("a", 1, false)]);
    let data = pattern(10_000);
    write_file(&f.driver, "file1", &data);

    assert_eq!(f.driver.get_size("file1").unwrap(), 10_000);
    assert_eq!(read_file(&f.driver, "file1", 0), data);
}

#[test]
fn read_from_offset_returns_suffix() {
    let f = fixture(512, 2, &[release("a", 1, false)]);
    let data = pattern(5_000);
    write_file(&f.driver, "file1", &data);

    for pos in [0usize, 1, 511, 512, 513, 4_999] {
        assert_eq!(
            read_file(&f.driver, "file1", pos as u64),
            &data[pos..],
            "offset {}",
            pos
        );
    }
    assert!(read_file(&f.driver, "file1", 5_000).is_empty());
}

#[test]
fn empty_write_commits_no_parts() {
    let f = fixture(1024, 2, &[release("a", 1, false)]);
    let mut writer = f.driver.get_writer("empty").unwrap();
    writer.close().unwrap();

    assert_eq!(f.driver.get_size("empty").unwrap(), 0);
    assert!(matches!(
        f.driver.get_reader("empty", 0).unwrap_err(),
        StorageError::NoParts
    ));
}

#[test]
fn uploads_rotate_across_writable_releases() {
    let releases = [
        release("a", 1, false),
        release("ro", 2, true),
        release("b", 3, false),
    ];
    let f = fixture(100, 1, &releases);
    write_file(&f.driver, "file1", &pattern(1_000));

    let parts = f.index.get("file1").unwrap();
    assert!(parts.len() >= 2);
    let owners: std::collections::HashSet<&str> =
        parts.iter().map(|a| a.username.as_str()).collect();
    assert!(owners.contains("a"));
    assert!(owners.contains("b"));
    assert!(!owners.contains("ro"));
}

#[test]
fn part_numbers_are_contiguous_and_sizes_sum() {
    let f = fixture(256, 4, &[release("a", 1, false)]);
    let data = pattern(3_000);
    write_file(&f.driver, "file1", &data);

    let parts = f.index.get("file1").unwrap();
    let numbers: Vec<u64> = parts.iter().map(|a| a.part_number).collect();
    assert_eq!(numbers, (1..=parts.len() as u64).collect::<Vec<_>>());
    assert_eq!(parts.iter().map(|a| a.size).sum::<u64>(), 3_000);
}

#[test]
fn overwrite_replaces_part_list_and_orphans_old_assets() {
    let f = fixture(100, 2, &[release("a", 1, false)]);
    write_file(&f.driver, "file1", &pattern(1_000));
    let first_assets = f.remote.asset_count();
    assert!(first_assets > 0);

    // Overwrite: truncate then write, as the file layer does.
    f.driver.truncate("file1").unwrap();
    let data = pattern(300);
    write_file(&f.driver, "file1", &data);

    assert_eq!(read_file(&f.driver, "file1", 0), data);
    // Old assets are still on the remote until swept.
    assert!(f.remote.asset_count() > f.index.get("file1").unwrap().len());

    let swept = f.driver.sweep_orphans().unwrap();
    assert_eq!(swept, first_assets);
    assert_eq!(
        f.remote.asset_count(),
        f.index.get("file1").unwrap().len()
    );
}

#[test]
fn failed_upload_commits_nothing() {
    let f = fixture(64, 2, &[release("a", 1, false)]);
    f.remote.fail_uploads(true);

    let mut writer = f.driver.get_writer("file1").unwrap();
    let mut result = Ok(0);
    for _ in 0..5000 {
        result = writer.write(&pattern(64));
        if result.is_err() {
            break;
        }
    }
    assert!(result.is_err() || writer.close().is_err());
    assert!(f.index.get("file1").unwrap().is_empty());
}

#[test]
fn sweep_with_no_orphans_deletes_nothing() {
    let f = fixture(128, 2, &[release("a", 1, false)]);
    write_file(&f.driver, "file1", &pattern(500));
    assert_eq!(f.driver.sweep_orphans().unwrap(), 0);
    assert_eq!(read_file(&f.driver, "file1", 0), pattern(500));
}
