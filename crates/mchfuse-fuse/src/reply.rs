//! Reply types for FUSE operations.
//!
//! Each operation produces one of these replies, consumed by the FUSE
//! transport to send the kernel response. Keeping them as plain structs
//! lets the whole filesystem be exercised without a kernel connection.

use std::time::Duration;

use crate::types::{FileAttr, FuseDirEntry, FuseEntryParam};

/// Reply for operations that return an entry (lookup, mkdir, create).
#[derive(Debug, Clone)]
pub struct ReplyEntry {
    pub entry: FuseEntryParam,
}

/// Reply for getattr/setattr.
#[derive(Debug, Clone)]
pub struct ReplyAttr {
    pub attr: FileAttr,
    pub attr_timeout: Duration,
}

/// Reply for open/opendir.
#[derive(Debug, Clone)]
pub struct ReplyOpen {
    /// File handle assigned by the filesystem.
    pub fh: u64,
    /// Flags back to the kernel (direct_io, keep_cache, etc.).
    pub flags: u32,
}

/// Reply for read operations.
#[derive(Debug)]
pub struct ReplyData {
    pub data: Vec<u8>,
}

/// Reply for write operations.
#[derive(Debug, Clone, Copy)]
pub struct ReplyWrite {
    /// Number of bytes written.
    pub written: u32,
}

/// Reply for readdir operations.
#[derive(Debug)]
pub struct ReplyDirectory {
    pub entries: Vec<FuseDirEntry>,
}

/// Reply for create (returns both entry and open info).
#[derive(Debug, Clone)]
pub struct ReplyCreate {
    pub entry: FuseEntryParam,
    pub fh: u64,
    pub flags: u32,
}

/// Reply for xattr operations that return data.
#[derive(Debug)]
pub struct ReplyXattr {
    /// If `data` is `Some`, the xattr value; if `None`, just the size.
    pub data: Option<Vec<u8>>,
    /// Size of the xattr value (always set).
    pub size: u32,
}

/// Result type for FUSE operations.
///
/// The error is an errno value (positive integer).
pub type FuseResult<T> = std::result::Result<T, i32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_write() {
        let r = ReplyWrite { written: 4096 };
        assert_eq!(r.written, 4096);
    }

    #[test]
    fn test_reply_data() {
        let r = ReplyData {
            data: vec![1, 2, 3, 4],
        };
        assert_eq!(r.data.len(), 4);
    }

    #[test]
    fn test_fuse_result_err() {
        let result: FuseResult<ReplyWrite> = Err(libc::EIO);
        assert_eq!(result.unwrap_err(), libc::EIO);
    }
}
