//! Types mirroring the FUSE kernel protocol structures.
//!
//! These abstract the raw protocol so the filesystem can be driven by any
//! FUSE transport that delivers VFS callbacks, and tested without one.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The FUSE root inode number (always 1 in the kernel protocol).
pub const FUSE_ROOT_ID: u64 = 1;

/// Regular file type bit.
pub const S_IFREG: u32 = libc::S_IFREG as u32;
/// Directory type bit.
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;

/// `renameat2` exchange flag; atomic exchange is not supported.
pub const RENAME_EXCHANGE: u32 = 0x2;

/// File attributes returned by getattr/lookup operations.
#[derive(Debug, Clone)]
pub struct FileAttr {
    /// Inode number.
    pub ino: u64,
    /// File size in bytes.
    pub size: u64,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// File mode (type + permission bits).
    pub mode: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Owner UID.
    pub uid: u32,
    /// Owner GID.
    pub gid: u32,
    /// Device number (unused, always 0).
    pub rdev: u32,
    /// Preferred I/O block size.
    pub blksize: u32,
}

impl Default for FileAttr {
    fn default() -> Self {
        Self {
            ino: 0,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 0,
        }
    }
}

/// Entry returned by lookup and create operations.
///
/// Mirrors `struct fuse_entry_param` from the FUSE protocol.
#[derive(Debug, Clone)]
pub struct FuseEntryParam {
    /// Inode number of the entry.
    pub ino: u64,
    /// Generation number for the entry (0 for this implementation).
    pub generation: u64,
    /// File attributes.
    pub attr: FileAttr,
    /// Attribute cache validity duration.
    pub attr_timeout: Duration,
    /// Entry (name lookup) cache validity duration.
    pub entry_timeout: Duration,
}

/// A single directory entry returned by readdir.
#[derive(Debug, Clone)]
pub struct FuseDirEntry {
    /// Inode number.
    pub ino: u64,
    /// Offset for the next entry (opaque cursor).
    pub offset: i64,
    /// File type (DT_REG, DT_DIR).
    pub file_type: u32,
    /// Entry name.
    pub name: String,
}

/// Context information about the caller making a FUSE request.
#[derive(Debug, Clone, Copy)]
pub struct FuseRequestContext {
    /// UID of the calling process.
    pub uid: u32,
    /// GID of the calling process.
    pub gid: u32,
    /// PID of the calling process.
    pub pid: u32,
}

/// A time value for setattr, which can be an explicit time or "now".
#[derive(Debug, Clone)]
pub enum SetAttrTime {
    /// Set to the current time.
    Now,
    /// Set to a specific time.
    Specific(SystemTime),
}

impl SetAttrTime {
    pub fn resolve(&self) -> SystemTime {
        match self {
            SetAttrTime::Now => SystemTime::now(),
            SetAttrTime::Specific(t) => *t,
        }
    }
}

/// Values to set in a setattr operation.
///
/// Each field is `Some` if that attribute should be changed.
#[derive(Debug, Clone, Default)]
pub struct SetAttrValues {
    /// New file size (truncate).
    pub size: Option<u64>,
    /// New access time.
    pub atime: Option<SetAttrTime>,
    /// New modification time.
    pub mtime: Option<SetAttrTime>,
    /// New status change time.
    pub ctime: Option<SetAttrTime>,
}
