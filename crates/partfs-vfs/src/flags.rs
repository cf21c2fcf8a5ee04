//! Open flags accepted by the filesystem.

use bitflags::bitflags;

use crate::error::{VfsError, VfsResult};

bitflags! {
    /// Flags for opening a file. Only this set is supported; anything else
    /// is rejected at open time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const READ = 1 << 0;
        /// Open for writing. Writing always replaces the file's content.
        const WRITE = 1 << 1;
        /// Create the file if it does not exist.
        const CREATE = 1 << 2;
        /// Drop any existing content on open.
        const TRUNCATE = 1 << 3;
    }
}

impl OpenFlags {
    /// Validates a flag combination.
    ///
    /// Read-write handles are not supported: content is immutable once
    /// written, so a handle either streams bytes in or streams bytes out.
    pub fn validate(self) -> VfsResult<()> {
        if self.contains(OpenFlags::READ) && self.contains(OpenFlags::WRITE) {
            return Err(VfsError::NotSupported);
        }
        Ok(())
    }

    /// True if the handle accepts `write` calls.
    pub fn writable(self) -> bool {
        self.contains(OpenFlags::WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_combination_rejected() {
        assert!((OpenFlags::READ | OpenFlags::WRITE).validate().is_err());
    }

    #[test]
    fn test_supported_combinations_accepted() {
        OpenFlags::READ.validate().unwrap();
        OpenFlags::WRITE.validate().unwrap();
        (OpenFlags::WRITE | OpenFlags::CREATE).validate().unwrap();
        (OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_unknown_bits_rejected_by_bitflags() {
        assert!(OpenFlags::from_bits(1 << 7).is_none());
    }

    #[test]
    fn test_writable() {
        assert!(OpenFlags::WRITE.writable());
        assert!(!OpenFlags::READ.writable());
        assert!(!OpenFlags::CREATE.writable());
    }
}
