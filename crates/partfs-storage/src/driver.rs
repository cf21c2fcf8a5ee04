//! Binds the parted I/O engine to the remote service and the part index.

use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::part_index::PartIndex;
use crate::parted_reader::{PartSource, PartedReader};
use crate::parted_writer::{PartHandler, PartedWriter};
use crate::remote::{Asset, RemoteStore};

/// Byte I/O surface consumed by the filesystem layer.
pub trait StorageDriver: Send + Sync {
    /// Opens a reader over the file's parts, positioned at `pos`.
    fn get_reader(&self, file_id: &str, pos: u64) -> StorageResult<PartedReader>;

    /// Opens a writer that uploads parts and commits the list on close.
    fn get_writer(&self, file_id: &str) -> StorageResult<FileWriter>;

    /// The file's size: the sum of its recorded part sizes.
    fn get_size(&self, file_id: &str) -> StorageResult<u64>;

    /// Drops the file's part list, orphaning its uploaded assets.
    fn truncate(&self, file_id: &str) -> StorageResult<()>;
}

/// [`StorageDriver`] over a [`RemoteStore`] and a [`PartIndex`].
pub struct Driver {
    remote: Arc<dyn RemoteStore>,
    index: PartIndex,
    part_size: u64,
    concurrency: usize,
}

impl Driver {
    /// Validates `config` and builds the driver.
    pub fn new(
        config: &StorageConfig,
        remote: Arc<dyn RemoteStore>,
        index: PartIndex,
    ) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self {
            remote,
            index,
            part_size: config.part_size,
            concurrency: config.concurrency,
        })
    }

    /// Deletes every remote asset that no part list references.
    ///
    /// Interrupted and truncated writes leave orphans behind; this sweep is
    /// the explicit collection pass for them. Returns the number of assets
    /// deleted.
    pub fn sweep_orphans(&self) -> StorageResult<usize> {
        let referenced = self.index.referenced_remote_ids()?;
        let mut deleted = 0;
        for aref in self.remote.list_assets()? {
            if !referenced.contains(&aref.remote_id) {
                self.remote.delete(&aref)?;
                deleted += 1;
            }
        }
        info!(deleted, "swept orphaned assets");
        Ok(deleted)
    }
}

impl StorageDriver for Driver {
    fn get_reader(&self, file_id: &str, pos: u64) -> StorageResult<PartedReader> {
        let assets = self.index.get(file_id)?;
        let sources: Vec<Box<dyn PartSource>> = assets
            .into_iter()
            .map(|asset| {
                Box::new(RemotePartSource {
                    asset,
                    remote: Arc::clone(&self.remote),
                }) as Box<dyn PartSource>
            })
            .collect();
        PartedReader::new(sources, pos)
    }

    fn get_writer(&self, file_id: &str) -> StorageResult<FileWriter> {
        let part_size = jittered_part_size(self.part_size);
        debug!(file_id, part_size, "opening parted writer");

        let collected: Arc<Mutex<Vec<Asset>>> = Arc::new(Mutex::new(Vec::new()));
        let remote = Arc::clone(&self.remote);
        let sink = Arc::clone(&collected);
        let handler: PartHandler = Arc::new(move |part_number, data| {
            let name = random_asset_name();
            let mut asset = remote.upload(&name, data)?;
            asset.part_number = part_number;
            sink.lock().unwrap().push(asset);
            Ok(())
        });

        let writer = PartedWriter::new(part_size as usize, self.concurrency, handler)?;
        Ok(FileWriter {
            file_id: file_id.to_string(),
            writer,
            collected,
            index: self.index.clone(),
        })
    }

    fn get_size(&self, file_id: &str) -> StorageResult<u64> {
        self.index.size(file_id)
    }

    fn truncate(&self, file_id: &str) -> StorageResult<()> {
        self.index.remove(file_id)
    }
}

/// Per-part binding of an asset descriptor to the remote client.
struct RemotePartSource {
    asset: Asset,
    remote: Arc<dyn RemoteStore>,
}

impl PartSource for RemotePartSource {
    fn size(&self) -> u64 {
        self.asset.size
    }

    fn open_range(&self, start: u64, end: u64) -> StorageResult<Box<dyn std::io::Read + Send>> {
        self.remote.open_range(&self.asset, start, end)
    }
}

/// Write stream for one file: parts upload as the stream is fed, and the
/// collected descriptors are committed to the part index on close.
pub struct FileWriter {
    file_id: String,
    writer: PartedWriter,
    collected: Arc<Mutex<Vec<Asset>>>,
    index: PartIndex,
}

impl FileWriter {
    /// Feeds bytes to the upload pipeline.
    pub fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        self.writer.write(data)
    }

    /// Finishes every in-flight part and commits the part list.
    ///
    /// On failure nothing is committed: assets uploaded so far stay orphaned
    /// until the next successful write to the same file id replaces the list.
    pub fn close(&mut self) -> StorageResult<()> {
        self.writer.close()?;
        let mut assets = self.collected.lock().unwrap().clone();
        assets.sort_by_key(|a| a.part_number);
        self.index.commit(&self.file_id, &assets)?;
        info!(
            file_id = %self.file_id,
            parts = assets.len(),
            bytes = assets.iter().map(|a| a.size).sum::<u64>(),
            "committed upload"
        );
        Ok(())
    }
}

impl std::io::Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        FileWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Base part size jittered uniformly within ±20%, spreading the part-size
/// distribution across uploads.
fn jittered_part_size(base: u64) -> u64 {
    let spread = base / 5;
    if spread == 0 {
        return base;
    }
    rand::thread_rng().gen_range(base - spread..=base + spread)
}

fn random_asset_name() -> String {
    let token: u128 = rand::thread_rng().gen();
    format!("{:032x}", token)
}
