//! partfs storage subsystem: the parted I/O engine, the release rotation,
//! and the driver binding both to the external blob service.
//!
//! A write stream is chunked into at-most-part-size pieces uploaded by a
//! pool of workers; a read stitches ranged requests over the recorded parts
//! back into one sequential stream. The part index persists which assets
//! make up which file.

pub mod buffer_pool;
pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod part_index;
pub mod parted_reader;
pub mod parted_writer;
pub mod pipe;
pub mod ratelimit;
pub mod release;
pub mod remote;
pub mod sync_reader;

pub use buffer_pool::BufferPool;
pub use config::{StorageConfig, MAX_PART_SIZE};
pub use driver::{Driver, FileWriter, StorageDriver};
pub use error::{StorageError, StorageResult};
pub use http::HttpRemoteStore;
pub use part_index::PartIndex;
pub use parted_reader::{PartSource, PartedReader};
pub use parted_writer::{PartHandler, PartedWriter};
pub use release::{ReleaseConfig, ReleaseRotator};
pub use remote::{Asset, MemoryRemoteStore, RemoteAssetRef, RemoteStore};
