//! Node and handle state for the filesystem.
//!
//! Each node wraps one remote file record and, for directories, a cached
//! map of child names to inode numbers. The child map is a subset snapshot
//! of the remote directory; reconciliation in the filesystem layer keeps
//! it consistent before the kernel sees it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use mchfuse_client::RemoteFile;

use crate::types::{FUSE_ROOT_ID, S_IFDIR, S_IFREG};

/// The kernel-visible kind of a node, fixed at node creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn of(file: &RemoteFile) -> NodeKind {
        if file.is_directory() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    /// Full mode bits: type plus the fixed permission bits.
    pub fn mode(&self) -> u32 {
        match self {
            NodeKind::Directory => S_IFDIR | 0o755,
            NodeKind::File => S_IFREG | 0o644,
        }
    }

    /// Directory-entry type for readdir.
    pub fn dirent_type(&self) -> u32 {
        match self {
            NodeKind::Directory => libc::DT_DIR as u32,
            NodeKind::File => libc::DT_REG as u32,
        }
    }
}

/// Cache inconsistency: a cached node no longer matches the kind the
/// kernel was told about.
#[derive(Debug)]
pub struct InvalidFilesystemState(pub String);

impl std::fmt::Display for InvalidFilesystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid filesystem state: {}", self.0)
    }
}

impl std::error::Error for InvalidFilesystemState {}

/// One inode exposed to the kernel.
pub struct Node {
    /// Kernel-assigned inode number.
    pub ino: u64,
    /// Kernel-visible kind, fixed for the node's lifetime.
    pub kind: NodeKind,
    file: RwLock<RemoteFile>,
    children: Mutex<HashMap<String, u64>>,
}

impl Node {
    pub fn new(ino: u64, file: RemoteFile) -> Node {
        Node {
            ino,
            kind: NodeKind::of(&file),
            file: RwLock::new(file),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn mode(&self) -> u32 {
        self.kind.mode()
    }

    /// Snapshot of the wrapped remote file record.
    pub fn file(&self) -> RemoteFile {
        self.file.read().clone()
    }

    /// Replace the wrapped record with fresher metadata.
    ///
    /// The replacement is atomic: concurrent readers observe either the
    /// old or the new record. A record of a different kind means the cache
    /// and the remote disagree about what this inode is.
    pub fn update_file(&self, file: &RemoteFile) -> Result<(), InvalidFilesystemState> {
        if NodeKind::of(file) != self.kind {
            return Err(InvalidFilesystemState(format!(
                "node {} ({}) changed kind on the remote",
                self.ino, file.id
            )));
        }
        let mut guard = self.file.write();
        if *guard != *file {
            *guard = file.clone();
        }
        Ok(())
    }

    /// Rewrite the record's location after a successful rename.
    pub fn rename_record(&self, new_parent_id: &str, new_name: &str) {
        let mut guard = self.file.write();
        guard.parent_id = new_parent_id.to_string();
        guard.name = new_name.to_string();
    }

    pub fn child(&self, name: &str) -> Option<u64> {
        self.children.lock().get(name).copied()
    }

    pub fn set_child(&self, name: &str, ino: u64) {
        self.children.lock().insert(name.to_string(), ino);
    }

    pub fn remove_child(&self, name: &str) -> Option<u64> {
        self.children.lock().remove(name)
    }

    /// Snapshot of the cached children.
    pub fn children_snapshot(&self) -> Vec<(String, u64)> {
        self.children
            .lock()
            .iter()
            .map(|(name, ino)| (name.clone(), *ino))
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ino", &self.ino)
            .field("kind", &self.kind)
            .field("file_id", &self.file.read().id)
            .finish()
    }
}

/// Thread-safe table of all nodes exposed to the kernel.
pub struct NodeTable {
    nodes: dashmap::DashMap<u64, Arc<Node>>,
    next_ino: AtomicU64,
}

impl NodeTable {
    /// Create a table with the given file registered as the root inode.
    pub fn new(root: RemoteFile) -> NodeTable {
        let nodes = dashmap::DashMap::new();
        nodes.insert(FUSE_ROOT_ID, Arc::new(Node::new(FUSE_ROOT_ID, root)));
        NodeTable {
            nodes,
            next_ino: AtomicU64::new(FUSE_ROOT_ID + 1),
        }
    }

    /// Register a new node for `file`, allocating a fresh inode number.
    pub fn insert(&self, file: RemoteFile) -> Arc<Node> {
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(Node::new(ino, file));
        self.nodes.insert(ino, node.clone());
        node
    }

    pub fn get(&self, ino: u64) -> Option<Arc<Node>> {
        self.nodes.get(&ino).map(|n| n.value().clone())
    }

    pub fn remove(&self, ino: u64) -> Option<Arc<Node>> {
        self.nodes.remove(&ino).map(|(_, n)| n)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// State associated with an open file descriptor.
///
/// The handle is a stateless adapter: it carries no offset or buffer,
/// only the node it is bound to.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub node: Arc<Node>,
}

/// Thread-safe table mapping file handle IDs to their state.
pub struct HandleTable {
    next_id: AtomicU64,
    handles: dashmap::DashMap<u64, FileHandle>,
}

impl HandleTable {
    pub fn new() -> HandleTable {
        HandleTable {
            next_id: AtomicU64::new(1),
            handles: dashmap::DashMap::new(),
        }
    }

    /// Allocate a new handle ID bound to `node`.
    pub fn insert(&self, node: Arc<Node>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, FileHandle { node });
        id
    }

    /// Resolve a handle to its node.
    pub fn get(&self, id: u64) -> Option<Arc<Node>> {
        self.handles.get(&id).map(|h| h.node.clone())
    }

    pub fn remove(&self, id: u64) -> Option<FileHandle> {
        self.handles.remove(&id).map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mchfuse_client::DIRECTORY_MIME_TYPE;

    fn make_file(id: &str, name: &str) -> RemoteFile {
        RemoteFile {
            id: id.into(),
            etag: String::new(),
            parent_id: "root".into(),
            child_count: 0,
            mime_type: "application/octet-stream".into(),
            name: name.into(),
            size: 100,
            mtime: Default::default(),
            ctime: Default::default(),
        }
    }

    fn make_dir(id: &str, name: &str) -> RemoteFile {
        RemoteFile {
            mime_type: DIRECTORY_MIME_TYPE.into(),
            size: 0,
            ..make_file(id, name)
        }
    }

    #[test]
    fn test_node_kind_and_mode() {
        let file_node = Node::new(2, make_file("f1", "a.txt"));
        assert_eq!(file_node.kind, NodeKind::File);
        assert_eq!(file_node.mode(), S_IFREG | 0o644);

        let dir_node = Node::new(3, make_dir("d1", "docs"));
        assert!(dir_node.is_directory());
        assert_eq!(dir_node.mode(), S_IFDIR | 0o755);
    }

    #[test]
    fn test_update_file_replaces_record() {
        let node = Node::new(2, make_file("f1", "a.txt"));
        let mut fresh = make_file("f1", "a.txt");
        fresh.size = 4096;
        node.update_file(&fresh).unwrap();
        assert_eq!(node.file().size, 4096);
    }

    #[test]
    fn test_update_file_rejects_kind_change() {
        let node = Node::new(2, make_file("f1", "a.txt"));
        let err = node.update_file(&make_dir("f1", "a.txt")).unwrap_err();
        assert!(err.to_string().contains("invalid filesystem state"));
        // The original record is untouched.
        assert_eq!(node.file().size, 100);
    }

    #[test]
    fn test_rename_record() {
        let node = Node::new(2, make_file("f1", "a.txt"));
        node.rename_record("d1", "b.txt");
        let file = node.file();
        assert_eq!(file.parent_id, "d1");
        assert_eq!(file.name, "b.txt");
    }

    #[test]
    fn test_child_map() {
        let node = Node::new(1, make_dir("root", ""));
        assert!(node.child("a").is_none());
        node.set_child("a", 2);
        node.set_child("b", 3);
        assert_eq!(node.child("a"), Some(2));
        assert_eq!(node.child_count(), 2);
        assert_eq!(node.remove_child("a"), Some(2));
        assert!(node.child("a").is_none());

        let mut snapshot = node.children_snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![("b".to_string(), 3)]);
    }

    #[test]
    fn test_node_table_root_preregistered() {
        let table = NodeTable::new(make_dir("root", ""));
        assert_eq!(table.len(), 1);
        let root = table.get(FUSE_ROOT_ID).unwrap();
        assert!(root.is_directory());
        assert_eq!(root.file().id, "root");
    }

    #[test]
    fn test_node_table_insert_allocates_fresh_inos() {
        let table = NodeTable::new(make_dir("root", ""));
        let a = table.insert(make_file("f1", "a.txt"));
        let b = table.insert(make_file("f2", "b.txt"));
        assert_ne!(a.ino, b.ino);
        assert_ne!(a.ino, FUSE_ROOT_ID);
        assert_eq!(table.len(), 3);

        table.remove(a.ino);
        assert!(table.get(a.ino).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_handle_table() {
        let table = HandleTable::new();
        let node = Arc::new(Node::new(2, make_file("f1", "a.txt")));

        let fh = table.insert(node.clone());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(fh).unwrap().ino, node.ino);

        assert!(table.remove(fh).is_some());
        assert!(table.get(fh).is_none());
        assert_eq!(table.len(), 0);
    }
}
