//! FUSE operations trait.
//!
//! `FuseOps` defines the VFS operation surface delivered by the FUSE
//! transport. Default implementations return `ENOSYS` so a filesystem
//! only implements what it supports.

use crate::reply::*;
use crate::types::*;

/// Trait defining the FUSE filesystem operations.
///
/// Each method corresponds to a FUSE low-level operation; the `ctx`
/// parameter carries the UID/GID/PID of the calling process.
///
/// # Error handling
///
/// Operations return `FuseResult<T>` where the error value is an errno
/// (positive integer, e.g. `libc::ENOENT`).
#[async_trait::async_trait]
pub trait FuseOps: Send + Sync + 'static {
    /// Called when the filesystem is mounted.
    async fn init(&self) -> FuseResult<()> {
        Ok(())
    }

    /// Called when the filesystem is unmounted.
    async fn destroy(&self) {}

    /// Look up a directory entry by name and return its attributes.
    async fn lookup(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
    ) -> FuseResult<ReplyEntry> {
        let _ = (ctx, parent, name);
        Err(libc::ENOSYS)
    }

    /// Forget about an inode, decrementing its lookup count.
    async fn forget(&self, ino: u64, nlookup: u64) {
        let _ = (ino, nlookup);
    }

    /// Get file attributes.
    async fn getattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: Option<u64>,
    ) -> FuseResult<ReplyAttr> {
        let _ = (ctx, ino, fh);
        Err(libc::ENOSYS)
    }

    /// Set file attributes (truncate, utimes).
    async fn setattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        attrs: &SetAttrValues,
        fh: Option<u64>,
    ) -> FuseResult<ReplyAttr> {
        let _ = (ctx, ino, attrs, fh);
        Err(libc::ENOSYS)
    }

    /// Create a file node (special files included).
    async fn mknod(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
        rdev: u32,
    ) -> FuseResult<ReplyEntry> {
        let _ = (ctx, parent, name, mode, rdev);
        Err(libc::ENOSYS)
    }

    /// Create a directory.
    async fn mkdir(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
    ) -> FuseResult<ReplyEntry> {
        let _ = (ctx, parent, name, mode);
        Err(libc::ENOSYS)
    }

    /// Remove a file.
    async fn unlink(&self, ctx: FuseRequestContext, parent: u64, name: &str) -> FuseResult<()> {
        let _ = (ctx, parent, name);
        Err(libc::ENOSYS)
    }

    /// Remove a directory.
    async fn rmdir(&self, ctx: FuseRequestContext, parent: u64, name: &str) -> FuseResult<()> {
        let _ = (ctx, parent, name);
        Err(libc::ENOSYS)
    }

    /// Rename a file or directory.
    async fn rename(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
        flags: u32,
    ) -> FuseResult<()> {
        let _ = (ctx, parent, name, new_parent, new_name, flags);
        Err(libc::ENOSYS)
    }

    /// Open a file.
    async fn open(&self, ctx: FuseRequestContext, ino: u64, flags: i32) -> FuseResult<ReplyOpen> {
        let _ = (ctx, ino, flags);
        Err(libc::ENOSYS)
    }

    /// Read data from an open file.
    async fn read(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let _ = (ctx, ino, fh, offset, size);
        Err(libc::ENOSYS)
    }

    /// Write data to an open file.
    async fn write(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        flags: i32,
    ) -> FuseResult<ReplyWrite> {
        let _ = (ctx, ino, fh, offset, data, flags);
        Err(libc::ENOSYS)
    }

    /// Flush buffered data on each close of a file descriptor.
    async fn flush(&self, ctx: FuseRequestContext, ino: u64, fh: u64) -> FuseResult<()> {
        let _ = (ctx, ino, fh);
        Ok(())
    }

    /// Release (close) an open file.
    async fn release(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        flags: i32,
    ) -> FuseResult<()> {
        let _ = (ctx, ino, fh, flags);
        Ok(())
    }

    /// Open a directory for reading.
    async fn opendir(&self, ctx: FuseRequestContext, ino: u64) -> FuseResult<ReplyOpen> {
        let _ = (ctx, ino);
        Err(libc::ENOSYS)
    }

    /// Read directory entries. `offset` is an opaque cursor; 0 means start
    /// from the beginning.
    async fn readdir(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory> {
        let _ = (ctx, ino, fh, offset);
        Err(libc::ENOSYS)
    }

    /// Release (close) an open directory.
    async fn releasedir(&self, ctx: FuseRequestContext, ino: u64, fh: u64) -> FuseResult<()> {
        let _ = (ctx, ino, fh);
        Ok(())
    }

    /// Atomically create and open a file.
    async fn create(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
        flags: i32,
    ) -> FuseResult<ReplyCreate> {
        let _ = (ctx, parent, name, mode, flags);
        Err(libc::ENOSYS)
    }

    /// Get an extended attribute.
    async fn getxattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        name: &str,
        size: u32,
    ) -> FuseResult<ReplyXattr> {
        let _ = (ctx, ino, name, size);
        Err(libc::ENOSYS)
    }

    /// Set an extended attribute.
    async fn setxattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> FuseResult<()> {
        let _ = (ctx, ino, name, value, flags);
        Err(libc::ENOSYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal no-op implementation for testing default methods.
    struct NoopFs;

    #[async_trait::async_trait]
    impl FuseOps for NoopFs {}

    fn make_ctx() -> FuseRequestContext {
        FuseRequestContext {
            uid: 1000,
            gid: 1000,
            pid: 1234,
        }
    }

    #[tokio::test]
    async fn test_default_lookup_returns_enosys() {
        let fs = NoopFs;
        let result = fs.lookup(make_ctx(), 1, "test").await;
        assert_eq!(result.unwrap_err(), libc::ENOSYS);
    }

    #[tokio::test]
    async fn test_default_init_succeeds() {
        let fs = NoopFs;
        assert!(fs.init().await.is_ok());
    }

    #[tokio::test]
    async fn test_default_flush_and_release_succeed() {
        let fs = NoopFs;
        assert!(fs.flush(make_ctx(), 1, 0).await.is_ok());
        assert!(fs.release(make_ctx(), 1, 0, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_default_io_ops_return_enosys() {
        let fs = NoopFs;
        let ctx = make_ctx();
        assert_eq!(fs.getattr(ctx, 1, None).await.unwrap_err(), libc::ENOSYS);
        assert_eq!(fs.read(ctx, 1, 0, 0, 4096).await.unwrap_err(), libc::ENOSYS);
        assert_eq!(
            fs.write(ctx, 1, 0, 0, &[0u8; 4], 0).await.unwrap_err(),
            libc::ENOSYS
        );
        assert_eq!(fs.readdir(ctx, 1, 0, 0).await.unwrap_err(), libc::ENOSYS);
        assert_eq!(
            fs.rename(ctx, 1, "old", 1, "new", 0).await.unwrap_err(),
            libc::ENOSYS
        );
    }
}
