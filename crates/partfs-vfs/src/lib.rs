//! partfs filesystem layer: open-file handles over the metadata store and
//! the storage driver.

pub mod error;
pub mod file;
pub mod flags;
pub mod fs;

pub use error::{VfsError, VfsResult};
pub use file::File;
pub use flags::OpenFlags;
pub use fs::PartFs;
