//! mchfuse-client: authenticated REST client for WD My Cloud Home devices.
//!
//! This crate speaks the My Cloud Home SDK protocol: it bootstraps the
//! service endpoint directory, maintains an authenticated session with
//! token refresh, resolves per-device LAN/WAN reachability, and exposes
//! the remote file operations used by the FUSE layer.
//!
//! # Architecture
//!
//! - **[`config`]** - `ServiceConfig`, the endpoint directory fetched once
//!   from the well-known bootstrap URL.
//!
//! - **[`session`]** - `Session`, owner of the OAuth tokens and the shared
//!   HTTP transport. Produces authorized requests and transparently
//!   refreshes an expired access token.
//!
//! - **[`device`]** - `Device` and `DeviceList`, plus the connectivity
//!   resolver that probes the device's internal DNS name and routes API
//!   calls over the LAN or WAN endpoint accordingly.
//!
//! - **[`files`]** - `RemoteFile` metadata and all per-file operations:
//!   listing, lookup, create, delete, rename, ranged reads and resumable
//!   writes.
//!
//! - **[`multipart`]** - the `multipart/related` metadata envelope used by
//!   create operations.
//!
//! - **[`time`]** - `IsoTime`, ISO-8601 timestamps preserving sub-second
//!   precision and timezone offset across round-trips.
//!
//! - **[`error`]** - the `ClientError` taxonomy shared by every operation.

pub mod config;
pub mod device;
pub mod error;
pub mod files;
mod jwt;
pub mod multipart;
pub mod session;
pub mod time;

pub use config::ServiceConfig;
pub use device::{ConnectionMode, Device, DeviceList};
pub use error::{ClientError, ClientResult};
pub use files::{RemoteFile, DIRECTORY_MIME_TYPE, FILE_FIELDS};
pub use session::{OsType, Session};
pub use time::IsoTime;
