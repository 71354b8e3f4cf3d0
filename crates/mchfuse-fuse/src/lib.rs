//! mchfuse-fuse: FUSE node adapter for My Cloud Home devices.
//!
//! This crate maps kernel VFS callbacks onto the remote file API from
//! `mchfuse-client`, maintaining a cached directory tree that is
//! reconciled against remote listings before any answer reaches the
//! kernel.
//!
//! # Architecture
//!
//! - **[`types`]** - FUSE protocol types (`FileAttr`, `FuseEntryParam`,
//!   request context, setattr values).
//!
//! - **[`reply`]** - Reply structs for each operation and the errno-based
//!   `FuseResult`.
//!
//! - **[`ops`]** - The `FuseOps` trait with all VFS operations. Default
//!   implementations return `ENOSYS`.
//!
//! - **[`node`]** - Node and handle state: each node wraps one remote
//!   file record plus a cached child map; handles are stateless adapters
//!   bound to a node.
//!
//! - **[`filesystem`]** - `MchFilesystem`, the `FuseOps` implementation,
//!   and the `RemoteFs` seam it drives. The filesystem is the single
//!   translation point from client errors to errno values.
//!
//! - **[`config`]** - `MountOptions` fixed at mount time (uid/gid,
//!   cache timeouts, allow-other).
//!
//! The `FuseOps` trait is transport-agnostic: any FUSE library that
//! delivers VFS callbacks can drive it, and the whole filesystem is
//! testable without a kernel mount.

pub mod config;
pub mod filesystem;
pub mod node;
pub mod ops;
mod remote;
pub mod reply;
pub mod types;

pub use config::MountOptions;
pub use filesystem::{MchFilesystem, RemoteFs};
pub use ops::FuseOps;
pub use reply::FuseResult;
pub use types::{FileAttr, FuseEntryParam, FuseRequestContext, FUSE_ROOT_ID};
