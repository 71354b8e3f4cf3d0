//! Main filesystem implementation.
//!
//! `MchFilesystem` implements the `FuseOps` trait over an `Arc<dyn
//! RemoteFs>`. It keeps a cached tree of nodes that it reconciles against
//! remote listings before the kernel sees an answer, and it is the single
//! point where rich client errors are translated into errno values.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use mchfuse_client::{ClientError, ClientResult, IsoTime, RemoteFile};

use crate::config::MountOptions;
use crate::node::{HandleTable, InvalidFilesystemState, Node, NodeTable};
use crate::ops::FuseOps;
use crate::reply::*;
use crate::types::*;

// ── Remote seam ─────────────────────────────────────────────────────────────

/// Abstraction over the remote file API.
///
/// In production this is backed by a `Device`; in tests it can be mocked.
#[async_trait::async_trait]
pub trait RemoteFs: Send + Sync + 'static {
    /// Fetch the root directory.
    async fn root(&self) -> ClientResult<RemoteFile>;

    /// Re-fetch a file's metadata.
    async fn refresh(&self, file: &RemoteFile) -> ClientResult<RemoteFile>;

    /// List a directory, keyed by entry name.
    async fn list_directory(
        &self,
        dir: &RemoteFile,
    ) -> ClientResult<HashMap<String, RemoteFile>>;

    /// Look up a single child by name; `None` when absent.
    async fn lookup_directory(
        &self,
        dir: &RemoteFile,
        name: &str,
    ) -> ClientResult<Option<RemoteFile>>;

    /// Create an empty regular file.
    async fn create_file(&self, parent: &RemoteFile, name: &str) -> ClientResult<RemoteFile>;

    /// Create an empty directory.
    async fn create_directory(&self, parent: &RemoteFile, name: &str)
        -> ClientResult<RemoteFile>;

    /// Delete a file or directory.
    async fn delete(&self, file: &RemoteFile) -> ClientResult<()>;

    /// Move a file under a new parent with a new name.
    async fn rename(
        &self,
        file: &RemoteFile,
        new_parent: &RemoteFile,
        new_name: &str,
    ) -> ClientResult<()>;

    /// Patch metadata fields (`mTime`, `cTime`).
    async fn set_meta(&self, file: &RemoteFile, changes: serde_json::Value) -> ClientResult<()>;

    /// Read a byte range into `dest`, returning the bytes copied.
    async fn read(&self, file: &RemoteFile, dest: &mut [u8], offset: u64) -> ClientResult<usize>;

    /// Write bytes at an offset.
    async fn write(&self, file: &RemoteFile, data: &[u8], offset: u64) -> ClientResult<()>;

    /// Cut the file off at an offset.
    async fn truncate(&self, file: &RemoteFile, offset: u64) -> ClientResult<()>;
}

// ── Reconcile error ─────────────────────────────────────────────────────────

enum ReconcileError {
    Remote(ClientError),
    State(InvalidFilesystemState),
}

impl ReconcileError {
    /// Map to an errno. Cache-state inconsistencies surface as
    /// `state_errno` (operation-dependent); everything else is `EIO`.
    fn errno(self, op: &str, state_errno: i32) -> i32 {
        match self {
            ReconcileError::Remote(err) => {
                warn!(op, error = %err, "remote operation failed");
                libc::EIO
            }
            ReconcileError::State(err) => {
                warn!(op, error = %err, "filesystem state inconsistency");
                state_errno
            }
        }
    }
}

// ── Filesystem ──────────────────────────────────────────────────────────────

/// The mounted filesystem.
pub struct MchFilesystem {
    remote: Arc<dyn RemoteFs>,
    options: MountOptions,
    nodes: NodeTable,
    handles: HandleTable,
}

impl MchFilesystem {
    /// Build a filesystem rooted at an already-resolved remote file.
    ///
    /// `root` may be any directory on the device, which is how a
    /// `deviceName:devicePath` source spec mounts a subtree.
    pub fn new(remote: Arc<dyn RemoteFs>, root: RemoteFile, options: MountOptions) -> Self {
        MchFilesystem {
            nodes: NodeTable::new(root),
            handles: HandleTable::new(),
            remote,
            options,
        }
    }

    /// Build a filesystem rooted at the device's root directory.
    pub async fn mount(remote: Arc<dyn RemoteFs>, options: MountOptions) -> ClientResult<Self> {
        let root = remote.root().await?;
        Ok(Self::new(remote, root, options))
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// Number of nodes currently exposed to the kernel.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn node(&self, ino: u64) -> FuseResult<Arc<Node>> {
        self.nodes.get(ino).ok_or(libc::ENOENT)
    }

    fn dir_node(&self, ino: u64) -> FuseResult<Arc<Node>> {
        let node = self.node(ino)?;
        if !node.is_directory() {
            return Err(libc::ENOTDIR);
        }
        Ok(node)
    }

    /// Resolve read/write targets through the handle first, falling back
    /// to the node table.
    fn io_node(&self, ino: u64, fh: u64) -> FuseResult<Arc<Node>> {
        self.handles
            .get(fh)
            .or_else(|| self.nodes.get(ino))
            .ok_or(libc::ENOENT)
    }

    fn io_err(&self, op: &str, err: ClientError) -> i32 {
        warn!(op, error = %err, "remote operation failed");
        libc::EIO
    }

    fn fill_attr(&self, node: &Node) -> FileAttr {
        let file = node.file();
        let mtime = file.mtime.to_system_time();
        let ctime = file.ctime.to_system_time();
        FileAttr {
            ino: node.ino,
            size: file.size,
            blocks: (file.size + 511) / 512,
            atime: mtime,
            mtime,
            ctime,
            mode: node.mode(),
            nlink: 1,
            uid: self.options.uid,
            gid: self.options.gid,
            rdev: 0,
            blksize: 4096,
        }
    }

    fn make_entry(&self, node: &Node) -> FuseEntryParam {
        let attr = self.fill_attr(node);
        FuseEntryParam {
            ino: attr.ino,
            generation: 0,
            attr,
            attr_timeout: self.options.attr_timeout_duration(),
            entry_timeout: self.options.entry_timeout_duration(),
        }
    }

    /// Refresh the node's record from the remote and report its attributes.
    async fn getattr_node(&self, node: &Arc<Node>) -> FuseResult<FileAttr> {
        let fresh = self
            .remote
            .refresh(&node.file())
            .await
            .map_err(|e| self.io_err("getattr", e))?;
        node.update_file(&fresh).map_err(|e| {
            warn!(error = %e, "refresh changed node kind");
            libc::EIO
        })?;
        Ok(self.fill_attr(node))
    }

    /// Add or refresh the cached child `name` of `parent` from `file`.
    fn update_child(
        &self,
        parent: &Arc<Node>,
        name: &str,
        file: &RemoteFile,
    ) -> Result<Arc<Node>, InvalidFilesystemState> {
        if let Some(ino) = parent.child(name) {
            if let Some(child) = self.nodes.get(ino) {
                child.update_file(file)?;
                return Ok(child);
            }
        }
        let child = self.nodes.insert(file.clone());
        parent.set_child(name, child.ino);
        Ok(child)
    }

    /// Full reconcile: make the cached child set match a fresh listing.
    async fn reconcile(&self, node: &Arc<Node>) -> Result<(), ReconcileError> {
        let listing = self
            .remote
            .list_directory(&node.file())
            .await
            .map_err(ReconcileError::Remote)?;

        for (name, ino) in node.children_snapshot() {
            if !listing.contains_key(&name) {
                node.remove_child(&name);
                self.nodes.remove(ino);
            }
        }
        for (name, file) in &listing {
            self.update_child(node, name, file)
                .map_err(ReconcileError::State)?;
        }
        Ok(())
    }

    /// Single-name reconcile: bring the cached child `name` in line with
    /// the remote, returning it when it exists.
    async fn reconcile_name(
        &self,
        parent: &Arc<Node>,
        name: &str,
    ) -> Result<Option<Arc<Node>>, ReconcileError> {
        let found = self
            .remote
            .lookup_directory(&parent.file(), name)
            .await
            .map_err(ReconcileError::Remote)?;

        match found {
            None => {
                // Make sure no stale cached child remains.
                if let Some(ino) = parent.remove_child(name) {
                    self.nodes.remove(ino);
                }
                Ok(None)
            }
            Some(file) => self
                .update_child(parent, name, &file)
                .map(Some)
                .map_err(ReconcileError::State),
        }
    }
}

#[async_trait::async_trait]
impl FuseOps for MchFilesystem {
    async fn init(&self) -> FuseResult<()> {
        info!(fs_name = %self.options.fs_name, "filesystem initialized");
        Ok(())
    }

    async fn destroy(&self) {
        info!(fs_name = %self.options.fs_name, "filesystem destroyed");
    }

    async fn lookup(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
    ) -> FuseResult<ReplyEntry> {
        debug!(parent, name, pid = ctx.pid, "lookup");
        let parent_node = self.dir_node(parent)?;

        let child = match parent_node.child(name).and_then(|ino| self.nodes.get(ino)) {
            Some(child) => child,
            None => match self
                .reconcile_name(&parent_node, name)
                .await
                .map_err(|e| e.errno("lookup", libc::EIO))?
            {
                Some(child) => child,
                None => return Err(libc::ENOENT),
            },
        };

        Ok(ReplyEntry {
            entry: self.make_entry(&child),
        })
    }

    async fn forget(&self, ino: u64, nlookup: u64) {
        debug!(ino, nlookup, "forget");
    }

    async fn getattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: Option<u64>,
    ) -> FuseResult<ReplyAttr> {
        debug!(ino, pid = ctx.pid, "getattr");
        let node = match fh.and_then(|fh| self.handles.get(fh)) {
            Some(node) => node,
            None => self.node(ino)?,
        };
        let attr = self.getattr_node(&node).await?;
        Ok(ReplyAttr {
            attr,
            attr_timeout: self.options.attr_timeout_duration(),
        })
    }

    async fn setattr(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        attrs: &SetAttrValues,
        fh: Option<u64>,
    ) -> FuseResult<ReplyAttr> {
        debug!(ino, pid = ctx.pid, "setattr");
        let node = match fh.and_then(|fh| self.handles.get(fh)) {
            Some(node) => node,
            None => self.node(ino)?,
        };

        if let Some(size) = attrs.size {
            self.remote
                .truncate(&node.file(), size)
                .await
                .map_err(|e| self.io_err("setattr/truncate", e))?;
        }

        let mut changes = serde_json::Map::new();
        if let Some(mtime) = &attrs.mtime {
            let value = serde_json::to_value(IsoTime::from_system_time(mtime.resolve()))
                .map_err(|_| libc::EIO)?;
            changes.insert("mTime".to_string(), value);
        }
        if let Some(ctime) = &attrs.ctime {
            let value = serde_json::to_value(IsoTime::from_system_time(ctime.resolve()))
                .map_err(|_| libc::EIO)?;
            changes.insert("cTime".to_string(), value);
        }
        if !changes.is_empty() {
            self.remote
                .set_meta(&node.file(), serde_json::Value::Object(changes))
                .await
                .map_err(|e| self.io_err("setattr/meta", e))?;
        }

        let attr = self.getattr_node(&node).await?;
        Ok(ReplyAttr {
            attr,
            attr_timeout: self.options.attr_timeout_duration(),
        })
    }

    async fn mknod(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
        _rdev: u32,
    ) -> FuseResult<ReplyEntry> {
        debug!(parent, name, mode, pid = ctx.pid, "mknod");
        Err(libc::ENOSYS)
    }

    async fn mkdir(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
    ) -> FuseResult<ReplyEntry> {
        debug!(parent, name, mode, pid = ctx.pid, "mkdir");
        let parent_node = self.dir_node(parent)?;

        if self
            .reconcile_name(&parent_node, name)
            .await
            .map_err(|e| e.errno("mkdir", libc::EIO))?
            .is_some()
        {
            return Err(libc::EEXIST);
        }

        let file = self
            .remote
            .create_directory(&parent_node.file(), name)
            .await
            .map_err(|e| self.io_err("mkdir", e))?;
        let child = self
            .update_child(&parent_node, name, &file)
            .map_err(|e| ReconcileError::State(e).errno("mkdir", libc::EIO))?;

        let attr = self.getattr_node(&child).await?;
        Ok(ReplyEntry {
            entry: FuseEntryParam {
                ino: attr.ino,
                generation: 0,
                attr,
                attr_timeout: self.options.attr_timeout_duration(),
                entry_timeout: self.options.entry_timeout_duration(),
            },
        })
    }

    async fn unlink(&self, ctx: FuseRequestContext, parent: u64, name: &str) -> FuseResult<()> {
        debug!(parent, name, pid = ctx.pid, "unlink");
        let parent_node = self.dir_node(parent)?;

        let child = self
            .reconcile_name(&parent_node, name)
            .await
            .map_err(|e| e.errno("unlink", libc::EIO))?
            .ok_or(libc::ENOENT)?;

        self.remote
            .delete(&child.file())
            .await
            .map_err(|e| self.io_err("unlink", e))?;

        parent_node.remove_child(name);
        self.nodes.remove(child.ino);
        Ok(())
    }

    async fn rmdir(&self, ctx: FuseRequestContext, parent: u64, name: &str) -> FuseResult<()> {
        debug!(parent, name, pid = ctx.pid, "rmdir");
        let parent_node = self.dir_node(parent)?;

        let child = self
            .reconcile_name(&parent_node, name)
            .await
            .map_err(|e| e.errno("rmdir", libc::EIO))?
            .ok_or(libc::ENOENT)?;

        if child.file().child_count > 0 {
            return Err(libc::ENOTEMPTY);
        }

        self.remote
            .delete(&child.file())
            .await
            .map_err(|e| self.io_err("rmdir", e))?;

        parent_node.remove_child(name);
        self.nodes.remove(child.ino);
        Ok(())
    }

    async fn rename(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
        flags: u32,
    ) -> FuseResult<()> {
        debug!(parent, name, new_parent, new_name, flags, pid = ctx.pid, "rename");

        // Atomic exchange semantics are not supported; reject before any
        // remote traffic.
        if flags & RENAME_EXCHANGE != 0 {
            return Err(libc::EINVAL);
        }

        let src_parent = self.dir_node(parent)?;
        let dst_parent = self.dir_node(new_parent)?;

        let src = self
            .reconcile_name(&src_parent, name)
            .await
            .map_err(|e| e.errno("rename", libc::ENOSYS))?
            .ok_or(libc::ENOENT)?;

        if self
            .reconcile_name(&dst_parent, new_name)
            .await
            .map_err(|e| e.errno("rename", libc::ENOSYS))?
            .is_some()
        {
            return Err(libc::EEXIST);
        }

        let dst_parent_file = dst_parent.file();
        self.remote
            .rename(&src.file(), &dst_parent_file, new_name)
            .await
            .map_err(|e| self.io_err("rename", e))?;

        // Move the cached child so lookups observe the new location.
        src_parent.remove_child(name);
        dst_parent.set_child(new_name, src.ino);
        src.rename_record(&dst_parent_file.id, new_name);
        Ok(())
    }

    async fn open(&self, ctx: FuseRequestContext, ino: u64, flags: i32) -> FuseResult<ReplyOpen> {
        debug!(ino, flags, pid = ctx.pid, "open");
        let node = self.node(ino)?;
        let fh = self.handles.insert(node);
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        debug!(ino, fh, offset, size, pid = ctx.pid, "read");
        let node = self.io_node(ino, fh)?;
        let file = node.file();
        let offset = offset as u64;

        if offset > file.size {
            return Err(libc::ENXIO);
        }
        let want = (size as u64).min(file.size - offset) as usize;
        if want == 0 {
            return Ok(ReplyData { data: Vec::new() });
        }

        let mut data = vec![0u8; want];
        let read = self
            .remote
            .read(&file, &mut data, offset)
            .await
            .map_err(|e| self.io_err("read", e))?;
        data.truncate(read);
        Ok(ReplyData { data })
    }

    async fn write(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _flags: i32,
    ) -> FuseResult<ReplyWrite> {
        debug!(ino, fh, offset, size = data.len(), pid = ctx.pid, "write");
        let node = self.io_node(ino, fh)?;

        self.remote
            .write(&node.file(), data, offset as u64)
            .await
            .map_err(|e| self.io_err("write", e))?;
        Ok(ReplyWrite {
            written: data.len() as u32,
        })
    }

    async fn release(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        fh: u64,
        _flags: i32,
    ) -> FuseResult<()> {
        debug!(ino, fh, pid = ctx.pid, "release");
        self.handles.remove(fh);
        Ok(())
    }

    async fn opendir(&self, ctx: FuseRequestContext, ino: u64) -> FuseResult<ReplyOpen> {
        debug!(ino, pid = ctx.pid, "opendir");
        self.dir_node(ino)?;
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn readdir(
        &self,
        ctx: FuseRequestContext,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory> {
        debug!(ino, offset, pid = ctx.pid, "readdir");
        let node = self.dir_node(ino)?;

        self.reconcile(&node)
            .await
            .map_err(|e| e.errno("readdir", libc::EIO))?;

        let entries = node
            .children_snapshot()
            .into_iter()
            .filter_map(|(name, child_ino)| {
                self.nodes.get(child_ino).map(|child| (name, child))
            })
            .enumerate()
            .skip(offset as usize)
            .map(|(idx, (name, child))| FuseDirEntry {
                ino: child.ino,
                offset: (idx + 1) as i64,
                file_type: child.kind.dirent_type(),
                name,
            })
            .collect();

        Ok(ReplyDirectory { entries })
    }

    async fn create(
        &self,
        ctx: FuseRequestContext,
        parent: u64,
        name: &str,
        mode: u32,
        flags: i32,
    ) -> FuseResult<ReplyCreate> {
        debug!(parent, name, mode, flags, pid = ctx.pid, "create");
        let parent_node = self.dir_node(parent)?;

        if self
            .reconcile_name(&parent_node, name)
            .await
            .map_err(|e| e.errno("create", libc::EIO))?
            .is_some()
        {
            return Err(libc::EEXIST);
        }

        let file = self
            .remote
            .create_file(&parent_node.file(), name)
            .await
            .map_err(|e| self.io_err("create", e))?;
        let child = self
            .update_child(&parent_node, name, &file)
            .map_err(|e| ReconcileError::State(e).errno("create", libc::EIO))?;

        let attr = self.getattr_node(&child).await?;
        let fh = self.handles.insert(child.clone());
        Ok(ReplyCreate {
            entry: FuseEntryParam {
                ino: attr.ino,
                generation: 0,
                attr,
                attr_timeout: self.options.attr_timeout_duration(),
                entry_timeout: self.options.entry_timeout_duration(),
            },
            fh,
            flags: 0,
        })
    }

    async fn getxattr(
        &self,
        _ctx: FuseRequestContext,
        _ino: u64,
        _name: &str,
        _size: u32,
    ) -> FuseResult<ReplyXattr> {
        Err(libc::ENOSYS)
    }

    async fn setxattr(
        &self,
        _ctx: FuseRequestContext,
        _ino: u64,
        _name: &str,
        _value: &[u8],
        _flags: i32,
    ) -> FuseResult<()> {
        Err(libc::ENOSYS)
    }
}

impl std::fmt::Debug for MchFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MchFilesystem")
            .field("fs_name", &self.options.fs_name)
            .field("node_count", &self.nodes.len())
            .field("open_handles", &self.handles.len())
            .finish()
    }
}
