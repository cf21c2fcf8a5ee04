//! The filesystem node entity and its persisted form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MetaError, MetaResult};
use crate::path;

/// Mode bit marking a node as a directory, mirroring `S_IFDIR`.
pub const MODE_DIR: u32 = 0o040000;

/// POSIX-style permission bits plus the directory flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    /// Default mode for regular files (`0644`).
    pub fn file_default() -> Self {
        FileMode(0o644)
    }

    /// Default mode for directories (`0755` with the directory bit set).
    pub fn dir_default() -> Self {
        FileMode(0o755 | MODE_DIR)
    }

    /// Creates a mode from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        FileMode(bits)
    }

    /// Returns the raw mode bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if the directory bit is set.
    pub fn is_dir(self) -> bool {
        self.0 & MODE_DIR != 0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

/// A point in time with second and nanosecond precision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub secs: u64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl Timestamp {
    /// Returns the current timestamp.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before epoch");
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs
            .cmp(&other.secs)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One entry in the tree: a file or a directory, keyed by its absolute path.
///
/// Files carry a stable opaque `id` that survives renames; it is the key into
/// the part index on the storage side. Directories have no id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: Option<String>,
    path: String,
    is_dir: bool,
    size: u64,
    mode: FileMode,
    created_at: Timestamp,
    mod_time: Timestamp,
}

impl Node {
    /// Creates a new file node at `path` with a freshly allocated id.
    pub fn new_file(path: &str) -> Self {
        let now = Timestamp::now();
        Self {
            id: Some(uuid::Uuid::new_v4().simple().to_string()),
            path: path.to_string(),
            is_dir: false,
            size: 0,
            mode: FileMode::file_default(),
            created_at: now,
            mod_time: now,
        }
    }

    /// Creates a new directory node at `path`.
    pub fn new_dir(path: &str) -> Self {
        let now = Timestamp::now();
        Self {
            id: None,
            path: path.to_string(),
            is_dir: true,
            size: 0,
            mode: FileMode::dir_default(),
            created_at: now,
            mod_time: now,
        }
    }

    /// The node's opaque id. `Some` iff the node is a file.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The absolute cleaned path of the node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The final path component; `"/"` for the root.
    pub fn name(&self) -> &str {
        path::base(&self.path)
    }

    /// True if the node is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Byte size of the node's content. Always 0 for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Permission bits plus the directory flag.
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last modification timestamp.
    pub fn mod_time(&self) -> Timestamp {
        self.mod_time
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub(crate) fn set_mod_time(&mut self, mtime: Timestamp) {
        self.mod_time = mtime;
    }
}

/// Encodes a node into its persisted form.
pub fn encode_node(node: &Node) -> MetaResult<Vec<u8>> {
    serde_json::to_vec(node).map_err(|e| MetaError::Codec(e.to_string()))
}

/// Decodes a node from its persisted form.
pub fn decode_node(data: &[u8]) -> MetaResult<Node> {
    serde_json::from_slice(data).map_err(|e| MetaError::Codec(e.to_string()))
}
